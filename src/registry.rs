//! Module registration scanning
//!
//! Extracts, from an application's root file, the import paths of the
//! schema-backed modules wired into the root type. Two syntactic patterns
//! are collected in one pass over the syntax tree:
//!
//! 1. arguments of the framework's `module.NewBasicManager(...)` call,
//!    either composite literals (`alias.AppModuleBasic{}`) or constructor
//!    calls (`alias.NewAppModuleBasic(...)`)
//! 2. statements inside the `RegisterAPIRoutes` declaration that call an
//!    `alias.RegisterGRPCGatewayRoutes(...)` method
//!
//! Aliases are translated through the file's import table. Pattern 2
//! aliases that do not resolve are dropped; a root file without the
//! framework's module-library import fails the whole call.

use std::fs;
use std::path::Path;

use tracing::debug;
use tree_sitter::Node;

use crate::error::{Result, SchemascanError};
use crate::goscan;
use crate::goscan::imports::find_imported_packages;

/// Import path of the framework library whose alias marks the basic-manager
/// constructor call
const MODULE_LIBRARY_IMPORT: &str = "github.com/cosmos/cosmos-sdk/types/module";

const BASIC_MANAGER_CTOR: &str = "NewBasicManager";
const REGISTER_ROUTES_FUNC: &str = "RegisterAPIRoutes";
const REGISTER_GATEWAY_METHOD: &str = "RegisterGRPCGatewayRoutes";

/// Extract the registered module import paths from the root file at `path`,
/// de-duplicated, in encounter order
pub fn find_registered_modules(path: &Path) -> Result<Vec<String>> {
    let src = fs::read_to_string(path)?;
    let tree = goscan::parse_go_source(&src, path)?;
    let source = src.as_bytes();

    let packages = find_imported_packages(path)?;
    let basic_manager_alias = packages
        .iter()
        .find(|(_, import)| import.as_str() == MODULE_LIBRARY_IMPORT)
        .map(|(alias, _)| alias.clone())
        .ok_or_else(|| SchemascanError::ModuleImportNotFound(path.to_path_buf()))?;

    let mut aliases = Vec::new();
    scan(tree.root_node(), source, &basic_manager_alias, &mut aliases);

    let mut registered = Vec::new();
    for alias in aliases {
        // pattern-2 receivers may be locals rather than imports; drop them
        let Some(import) = packages.get(&alias) else {
            continue;
        };
        if !registered.contains(import) {
            registered.push(import.clone());
        }
    }

    debug!(file = %path.display(), count = registered.len(), "registered modules");
    Ok(registered)
}

fn scan(node: Node, source: &[u8], basic_manager_alias: &str, out: &mut Vec<String>) {
    if collect_basic_manager_args(node, source, basic_manager_alias, out) {
        return;
    }
    if collect_gateway_route_calls(node, source, out) {
        return;
    }

    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        scan(child, source, basic_manager_alias, out);
    }
}

/// Pattern 1: `alias.NewBasicManager(bank.AppModuleBasic{}, staking.NewAppModuleBasic(...), ...)`
fn collect_basic_manager_args(
    node: Node,
    source: &[u8],
    basic_manager_alias: &str,
    out: &mut Vec<String>,
) -> bool {
    if node.kind() != "call_expression" {
        return false;
    }
    let Some((operand, field)) = selector_parts(node, source) else {
        return false;
    };
    if operand != basic_manager_alias || field != BASIC_MANAGER_CTOR {
        return false;
    }

    let Some(args) = node.child_by_field_name("arguments") else {
        return true;
    };

    let mut cursor = args.walk();
    for arg in args.named_children(&mut cursor) {
        match arg.kind() {
            // bank.AppModuleBasic{}
            "composite_literal" => {
                let alias = arg
                    .child_by_field_name("type")
                    .filter(|t| t.kind() == "qualified_type")
                    .and_then(|t| t.child_by_field_name("package"))
                    .and_then(|p| p.utf8_text(source).ok());
                if let Some(alias) = alias {
                    out.push(alias.to_string());
                }
            }
            // staking.NewAppModuleBasic(...)
            "call_expression" => {
                if let Some((alias, _)) = selector_parts(arg, source) {
                    out.push(alias.to_string());
                }
            }
            _ => {}
        }
    }

    true
}

/// Pattern 2: statements of `RegisterAPIRoutes` calling
/// `alias.RegisterGRPCGatewayRoutes(...)`. Only direct statements of the
/// declaration body are inspected.
fn collect_gateway_route_calls(node: Node, source: &[u8], out: &mut Vec<String>) -> bool {
    if node.kind() != "function_declaration" && node.kind() != "method_declaration" {
        return false;
    }
    let is_register_fn = node
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source).ok())
        .is_some_and(|name| name == REGISTER_ROUTES_FUNC);
    if !is_register_fn {
        return false;
    }

    let Some(body) = node.child_by_field_name("body") else {
        return true;
    };

    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        let call = match stmt.kind() {
            "expression_statement" => match stmt.named_child(0) {
                Some(expr) if expr.kind() == "call_expression" => expr,
                _ => continue,
            },
            _ => continue,
        };

        if let Some((alias, field)) = selector_parts(call, source) {
            if field == REGISTER_GATEWAY_METHOD && !alias.is_empty() {
                out.push(alias.to_string());
            }
        }
    }

    true
}

/// For a call whose function is `ident.Field`, the (`ident`, `Field`) texts
fn selector_parts<'a>(call: Node, source: &'a [u8]) -> Option<(&'a str, &'a str)> {
    let function = call.child_by_field_name("function")?;
    if function.kind() != "selector_expression" {
        return None;
    }

    let operand = function.child_by_field_name("operand")?;
    if operand.kind() != "identifier" {
        return None;
    }

    let field = function.child_by_field_name("field")?;
    Some((operand.utf8_text(source).ok()?, field.utf8_text(source).ok()?))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const APP_GO: &str = r#"
package app

import (
    "github.com/cosmos/cosmos-sdk/types/module"

    "github.com/org/app/x/bank"
    stakingmod "github.com/org/app/x/staking"
    banktypes "github.com/org/app/x/bank/types"
    govtypes "github.com/org/app/x/gov/types"
)

var ModuleBasics = module.NewBasicManager(
    bank.AppModuleBasic{},
    stakingmod.NewAppModuleBasic(someArg),
    unknownLocal{},
)

func (app *App) RegisterAPIRoutes(apiSvr *api.Server, apiConfig config.APIConfig) {
    clientCtx := apiSvr.ClientCtx
    banktypes.RegisterGRPCGatewayRoutes(clientCtx, apiSvr.GRPCGatewayRouter)
    govtypes.RegisterGRPCGatewayRoutes(clientCtx, apiSvr.GRPCGatewayRouter)
    localHelper.RegisterGRPCGatewayRoutes(clientCtx)
    banktypes.RegisterGRPCGatewayRoutes(clientCtx, apiSvr.GRPCGatewayRouter)
}
"#;

    fn write_app(content: &str) -> (TempDir, std::path::PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("app.go");
        std::fs::write(&path, content).unwrap();
        (tmp, path)
    }

    #[test]
    fn collects_both_patterns_deduplicated() {
        let (_tmp, path) = write_app(APP_GO);
        let registered = find_registered_modules(&path).unwrap();

        assert_eq!(
            registered,
            vec![
                "github.com/org/app/x/bank",
                "github.com/org/app/x/staking",
                "github.com/org/app/x/bank/types",
                "github.com/org/app/x/gov/types",
            ]
        );
    }

    #[test]
    fn missing_module_library_import_is_fatal() {
        let (_tmp, path) = write_app(
            r#"
package app

import (
    banktypes "github.com/org/app/x/bank/types"
)

func (app *App) RegisterAPIRoutes() {
    banktypes.RegisterGRPCGatewayRoutes(nil, nil)
}
"#,
        );

        let err = find_registered_modules(&path).unwrap_err();
        assert!(matches!(err, SchemascanError::ModuleImportNotFound(_)));
    }

    #[test]
    fn renamed_module_library_alias_still_matches() {
        let (_tmp, path) = write_app(
            r#"
package app

import (
    sdkmodule "github.com/cosmos/cosmos-sdk/types/module"
    "github.com/org/app/x/mint"
)

var ModuleBasics = sdkmodule.NewBasicManager(mint.AppModuleBasic{})
"#,
        );

        let registered = find_registered_modules(&path).unwrap();
        assert_eq!(registered, vec!["github.com/org/app/x/mint"]);
    }

    #[test]
    fn unresolved_gateway_aliases_are_dropped() {
        let (_tmp, path) = write_app(
            r#"
package app

import (
    "github.com/cosmos/cosmos-sdk/types/module"
)

var ModuleBasics = module.NewBasicManager()

func (app *App) RegisterAPIRoutes(apiSvr *api.Server) {
    notImported.RegisterGRPCGatewayRoutes(apiSvr.ClientCtx)
}
"#,
        );

        let registered = find_registered_modules(&path).unwrap();
        assert!(registered.is_empty());
    }
}
