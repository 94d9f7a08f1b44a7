//! Module discovery
//!
//! Correlates schema packages, root-file registrations and Go method-set
//! matches into the `Module` inventory: which packages are actually wired
//! into the application, and how each package's messages classify into
//! commands, HTTP queries and plain data types.
//!
//! Discovery is purely functional over its filesystem inputs: a run never
//! mutates previously returned state, and running it twice over an
//! unchanged tree yields structurally equal inventories.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::goscan::{self, root::locate_root_file};
use crate::proto::{self, HttpRule, Package};
use crate::registry::find_registered_modules;

/// Method names a transaction-message type must declare
pub const MESSAGE_IMPLEMENTATION: &[&str] =
    &["Route", "Type", "GetSigners", "GetSignBytes", "ValidateBasic"];

/// Genesis-state messages are wiring, not data types, by convention
const GENESIS_STATE_MESSAGE: &str = "GenesisState";

/// Inventory of one schema package proven to be registered in the app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Module name: the last dot-segment of the schema package name
    pub name: String,

    /// Import-path prefix of the owning application
    pub go_module_path: String,

    /// The schema package the module was built from
    pub pkg: Package,

    /// Transaction messages of the module
    pub msgs: Vec<Msg>,

    /// RPCs of the module exposed over HTTP
    pub http_queries: Vec<HttpQuery>,

    /// Plain proto data types the module may use
    pub types: Vec<TypeDef>,
}

/// A schema message backed by a Go transaction-message implementation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Msg {
    pub name: String,

    /// Fully qualified schema URI: `<package>.<name>`
    pub uri: String,

    /// Path of the .proto file defining the message
    pub file_path: PathBuf,
}

/// An RPC exposed over HTTP
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpQuery {
    /// Name of the RPC function
    pub name: String,

    /// Service name and RPC function name joined
    pub full_name: String,

    /// Derived HTTP rules of the RPC
    pub rules: Vec<HttpRule>,
}

/// A plain proto type: not a command, not an RPC request/response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,

    /// Path of the .proto file defining the message
    pub file_path: PathBuf,
}

struct ModuleDiscoverer<'a> {
    source_path: &'a Path,
    base_import_path: &'a str,
    registered_modules: Vec<String>,
}

/// Discover the modules registered in the application and their types.
///
/// `chain_root` is the project root holding the app's root file;
/// `source_path` is the root of the Go module the schemas belong to;
/// `proto_dir` is the schema directory relative to `source_path`;
/// `base_import_path` is the application's own import-path prefix, already
/// resolved by the caller from its dependency manifest. `None` means the
/// manifest was absent, which yields an empty inventory rather than an
/// error (some projects simply have no schema-backed modules).
pub fn discover(
    chain_root: &Path,
    source_path: &Path,
    proto_dir: &str,
    base_import_path: Option<&str>,
) -> Result<Vec<Module>> {
    let Some(base_import_path) = base_import_path else {
        return Ok(Vec::new());
    };

    let root_file = locate_root_file(chain_root)?;
    let registered = find_registered_modules(&root_file)?;

    // third-party and framework modules resolve through a separate path;
    // only the app's own registrations matter here
    let registered_modules: Vec<String> = registered
        .into_iter()
        .filter(|m| m.starts_with(base_import_path))
        .collect();
    if registered_modules.is_empty() {
        return Ok(Vec::new());
    }

    let packages = proto::parse(None, &source_path.join(proto_dir))?;
    let own_packages: Vec<Package> = packages
        .into_iter()
        .filter(|pkg| pkg.go_import_name.starts_with(base_import_path))
        .collect();

    let discoverer = ModuleDiscoverer {
        source_path,
        base_import_path,
        registered_modules,
    };

    let mut modules = Vec::new();
    for pkg in own_packages {
        if let Some(module) = discoverer.discover_package(&pkg)? {
            modules.push(module);
        }
    }

    Ok(modules)
}

impl ModuleDiscoverer<'_> {
    /// Build the `Module` for one schema package, or `None` when the package
    /// is not proven to be registered (or carries nothing worth reporting)
    fn discover_package(&self, pkg: &Package) -> Result<Option<Module>> {
        if !self.package_is_registered(pkg)? {
            debug!(package = %pkg.name, "package not registered; skipping");
            return Ok(None);
        }

        let pkg_path = self.dir_for_import(pkg.go_import_path());
        let msgs = goscan::find_implementation(&pkg_path, MESSAGE_IMPLEMENTATION)?;

        if pkg.services.is_empty() && msgs.is_empty() {
            return Ok(None);
        }

        let name = pkg
            .name
            .rsplit('.')
            .next()
            .unwrap_or(&pkg.name)
            .to_string();

        let mut module = Module {
            name,
            go_module_path: self.base_import_path.to_string(),
            pkg: pkg.clone(),
            ..Default::default()
        };

        for msg in &msgs {
            // an sdk message with no proto counterpart is internal-only;
            // it is simply not part of the schema surface
            let Ok(proto_msg) = pkg.message_by_name(msg) else {
                continue;
            };
            module.msgs.push(Msg {
                name: msg.clone(),
                uri: format!("{}.{}", pkg.name, msg),
                file_path: proto_msg.path.clone(),
            });
        }

        let is_type = |name: &str| {
            if name == GENESIS_STATE_MESSAGE {
                return false;
            }
            if msgs.iter().any(|m| m == name) {
                return false;
            }
            for svc in &pkg.services {
                for rpc in &svc.rpc_funcs {
                    if rpc.request_type == name || rpc.returns_type == name {
                        return false;
                    }
                }
            }
            true
        };

        for proto_msg in &pkg.messages {
            if !is_type(&proto_msg.name) {
                continue;
            }
            module.types.push(TypeDef {
                name: proto_msg.name.clone(),
                file_path: proto_msg.path.clone(),
            });
        }

        for svc in &pkg.services {
            for rpc in &svc.rpc_funcs {
                if rpc.http_rules.is_empty() {
                    continue;
                }
                module.http_queries.push(HttpQuery {
                    name: rpc.name.clone(),
                    full_name: format!("{}{}", svc.name, rpc.name),
                    rules: rpc.http_rules.clone(),
                });
            }
        }

        Ok(Some(module))
    }

    /// A package belongs to a registered module when some registered import
    /// path's directory (or the package's own directory, when the package
    /// import prefixes the registration) implements the method names of one
    /// of the package's services
    fn package_is_registered(&self, pkg: &Package) -> Result<bool> {
        for registered in &self.registered_modules {
            let impl_path = self.dir_for_import(registered);

            for svc in &pkg.services {
                let methods: Vec<&str> =
                    svc.rpc_funcs.iter().map(|rpc| rpc.name.as_str()).collect();

                let mut found = goscan::deep_find_implementation(&impl_path, &methods)?;

                // some modules register one directory level above the
                // package's own source; retry against the package's path
                if found.is_empty() && registered.starts_with(pkg.go_import_path()) {
                    let alt_path = self.dir_for_import(pkg.go_import_path());
                    found = goscan::deep_find_implementation(&alt_path, &methods)?;
                }

                if !found.is_empty() {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Source directory for an import path inside the application's module
    fn dir_for_import(&self, import_path: &str) -> PathBuf {
        let rel = import_path
            .strip_prefix(self.base_import_path)
            .unwrap_or(import_path)
            .trim_start_matches('/');
        self.source_path.join(rel)
    }
}

// =============================================================================
// TESTS
// =============================================================================
