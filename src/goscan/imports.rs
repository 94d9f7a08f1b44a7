//! Go import table extraction
//!
//! Maps the import aliases of a single Go file to their import paths.
//! Unaliased imports are keyed by the last path segment, which is how Go
//! resolves the package identifier in the common case.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Query, QueryCursor};

use crate::error::Result;

static IMPORT_QUERY: Lazy<Query> = Lazy::new(|| {
    Query::new(&tree_sitter_go::LANGUAGE.into(), "(import_spec) @spec").expect("import query")
});

/// Read the import table of the Go file at `path`: alias -> import path
pub fn find_imported_packages(path: &Path) -> Result<HashMap<String, String>> {
    let src = fs::read_to_string(path)?;
    let tree = super::parse_go_source(&src, path)?;
    let source = src.as_bytes();

    let mut packages = HashMap::new();

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&IMPORT_QUERY, tree.root_node(), source);

    while let Some(m) = matches.next() {
        for capture in m.captures {
            let spec = capture.node;

            let Some(import_path) = spec
                .child_by_field_name("path")
                .and_then(|n| n.utf8_text(source).ok())
                .map(|s| s.trim_matches('"').to_string())
            else {
                continue;
            };

            let alias = match spec
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
            {
                Some(name) => name.to_string(),
                None => import_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&import_path)
                    .to_string(),
            };

            packages.insert(alias, import_path);
        }
    }

    Ok(packages)
}
