//! Public schema model
//!
//! The normalized view of a parsed proto package: files, messages, services
//! and the HTTP rules derived from their `google.api.http` annotations.
//! This is the shape downstream generators consume; the raw syntax records
//! produced by the parser never leave this module's parent.

use crate::error::{Result, SchemascanError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A proto package assembled from every file sharing a declared package name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Dot-delimited package name (e.g. `cosmos.bank.v1beta1`)
    pub name: String,

    /// Directory of the package in the filesystem.
    ///
    /// When files from different directories declare the same package name,
    /// the directory of the first file encountered wins. Enumeration order
    /// is filesystem-dependent; callers must treat this as advisory.
    pub path: PathBuf,

    /// Proto files the package was built from, in encounter order
    pub files: Vec<File>,

    /// Value of the `go_package` file option, when declared
    pub go_import_name: String,

    /// Messages defined in the package (nested ones use underscore names)
    pub messages: Vec<Message>,

    /// RPC services defined in the package
    pub services: Vec<Service>,
}

impl Package {
    /// Find a message in the package by its (possibly underscore-joined) name
    pub fn message_by_name(&self, name: &str) -> Result<&Message> {
        self.messages
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| SchemascanError::MessageNotFound(name.to_string()))
    }

    /// The Go import path: `go_package` with any `;package_alias` suffix cut off
    pub fn go_import_path(&self) -> &str {
        self.go_import_name
            .split(';')
            .next()
            .unwrap_or(&self.go_import_name)
    }
}

/// Collect the files of every package in the list
pub fn files_of(packages: &[Package]) -> Vec<File> {
    packages
        .iter()
        .flat_map(|p| p.files.iter().cloned())
        .collect()
}

/// A single parsed proto file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// Path of the file in the filesystem
    pub path: PathBuf,

    /// Names of the `.proto` files this file imports
    pub dependencies: Vec<String>,
}

/// A proto message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message name. Nested messages use the underscore-joined chain of
    /// enclosing message names, outer to inner: `C` inside `B` inside `A`
    /// is `A_B_C`.
    pub name: String,

    /// Path of the file the message is defined in
    pub path: PathBuf,

    /// Highest field ordinal declared in the message, for picking the next
    /// free number when new fields are scaffolded into it
    pub highest_field_number: i64,
}

/// An RPC service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,

    /// RPC functions of the service, in declaration order
    pub rpc_funcs: Vec<RpcFunc>,
}

/// A single RPC function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcFunc {
    pub name: String,

    /// Request message type name
    pub request_type: String,

    /// Response message type name
    pub returns_type: String,

    /// HTTP rules configured on the RPC, one per binding (the base
    /// `google.api.http` option plus any `additional_bindings`).
    /// Empty when the RPC carries no HTTP annotation.
    pub http_rules: Vec<HttpRule>,
}

/// The derived mapping of one RPC binding onto an HTTP endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRule {
    /// `{param}` tokens of the endpoint template, in template order
    pub params: Vec<String>,

    /// Whether any request field is left over for the query string
    pub has_query: bool,

    /// Whether any request field is carried in the request payload
    pub has_body: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_by_name_hit_and_miss() {
        let pkg = Package {
            name: "test.pkg".into(),
            messages: vec![Message {
                name: "MsgSend".into(),
                path: PathBuf::from("tx.proto"),
                highest_field_number: 3,
            }],
            ..Default::default()
        };

        assert_eq!(pkg.message_by_name("MsgSend").unwrap().highest_field_number, 3);
        assert!(pkg.message_by_name("Missing").is_err());
    }

    #[test]
    fn go_import_path_strips_alias() {
        let pkg = Package {
            go_import_name: "github.com/org/app/x/bank/types;banktypes".into(),
            ..Default::default()
        };
        assert_eq!(pkg.go_import_path(), "github.com/org/app/x/bank/types");

        let plain = Package {
            go_import_name: "github.com/org/app/x/bank/types".into(),
            ..Default::default()
        };
        assert_eq!(plain.go_import_path(), "github.com/org/app/x/bank/types");
    }
}
