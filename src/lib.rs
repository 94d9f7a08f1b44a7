//! Schemascan - static API-model extraction for proto + Go codebases
//!
//! Extracts a structured API model from a project's Protocol Buffer schemas
//! and the Go sources implementing them, without invoking a compiler:
//! - `proto`: parse `.proto` trees into `Package` models (messages, services,
//!   HTTP rules derived from `google.api.http` annotations)
//! - `goscan`: duck-typed method-set matching over Go source directories
//! - `registry`: extract the module registrations wired into an app's root file
//! - `discover`: correlate all of the above into a `Module` inventory

pub mod discover;
pub mod error;
pub mod goscan;
pub mod proto;
pub mod registry;

pub use discover::{discover, HttpQuery, Module, Msg, TypeDef};
pub use error::{Result, SchemascanError};
pub use proto::{HttpRule, Message, Package, RpcFunc, Service};
