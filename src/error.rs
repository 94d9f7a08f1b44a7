//! Error types for schemascan

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchemascanError>;

#[derive(Error, Debug)]
pub enum SchemascanError {
    #[error("app root type not found under: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("module library import not found in: {}", .0.display())]
    ModuleImportNotFound(PathBuf),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("proto import not found: {0}")]
    ImportNotFound(String),

    #[error("path does not point to a single proto file: {}", .0.display())]
    NotASingleFile(PathBuf),

    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}
