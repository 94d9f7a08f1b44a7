//! Proto schema analysis
//!
//! Parses `.proto` trees on disk into normalized `Package` models. The
//! parser is permissive and never type-checks: it exists to answer "what
//! messages, services and HTTP-mapped RPCs does this package declare",
//! not to validate schemas.
//!
//! Parsing is a pure function of filesystem content. Callers that parse
//! the same tree repeatedly may pass a `Cache` keyed by the queried path;
//! the cache is caller-owned and never shared behind the API.

mod builder;
mod package;
pub(crate) mod parser;

pub use package::{files_of, File, HttpRule, Message, Package, RpcFunc, Service};

use crate::error::{Result, SchemascanError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const PROTO_FILE_EXTENSION: &str = "proto";

/// Caller-owned cache of parse results, keyed by the queried path
pub type Cache = HashMap<PathBuf, Vec<Package>>;

/// Parse every proto package under `path` (a directory walked recursively,
/// or a single `.proto` file).
///
/// Files are grouped into packages by their declared package name; a file
/// that fails to parse fails the whole call with its path in the error.
pub fn parse(cache: Option<&mut Cache>, path: &Path) -> Result<Vec<Package>> {
    if let Some(cache) = &cache {
        if let Some(packages) = cache.get(path) {
            return Ok(packages.clone());
        }
    }

    let mut parser = parser::Parser::default();
    for file in find_proto_files(path)? {
        debug!(file = %file.display(), "parsing proto file");
        parser.parse_path(&file)?;
    }

    let packages: Vec<Package> = parser.packages.iter().map(builder::build).collect();

    if let Some(cache) = cache {
        cache.insert(path.to_path_buf(), packages.clone());
    }

    Ok(packages)
}

/// Parse a single proto file at `path`
pub fn parse_file(path: &Path) -> Result<File> {
    let packages = parse(None, path)?;
    let mut files = files_of(&packages);
    if files.len() != 1 {
        return Err(SchemascanError::NotASingleFile(path.to_path_buf()));
    }
    Ok(files.remove(0))
}

/// Check that the proto packages under `path` declare every message in `names`
pub fn has_messages(path: &Path, names: &[&str]) -> Result<()> {
    let packages = parse(None, path)?;

    for name in names {
        let found = packages
            .iter()
            .any(|pkg| pkg.messages.iter().any(|msg| msg.name == *name));
        if !found {
            return Err(SchemascanError::MessageNotFound((*name).to_string()));
        }
    }
    Ok(())
}

/// Check that the proto file at `path` imports every entry of `dependencies`
pub fn is_imported(path: &Path, dependencies: &[&str]) -> Result<()> {
    let file = parse_file(path)?;

    for wanted in dependencies {
        if !file.dependencies.iter().any(|dep| dep == wanted) {
            return Err(SchemascanError::ImportNotFound(format!(
                "{} for file {}",
                wanted,
                path.display()
            )));
        }
    }
    Ok(())
}

/// Enumerate `*.proto` files under `path`, sorted for a stable walk order
/// within one platform. `path` may itself be a proto file.
fn find_proto_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_proto = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext == PROTO_FILE_EXTENSION);
        if is_proto {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

// =============================================================================
// TESTS
// =============================================================================
