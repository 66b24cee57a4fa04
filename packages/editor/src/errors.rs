//! Error types for the editor

use crate::mode::Mode;
use pages_evaluator::RuntimeError;
use pages_schema::SchemaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Edit error: {0}")]
    Edit(#[from] crate::mutations::EditError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("{action} is not available in {mode} mode")]
    CapabilityDisabled { action: &'static str, mode: Mode },

    #[error("Code buffer has unapplied changes")]
    UnappliedCode,

    #[error("Document is not file-backed")]
    NotFileBacked,
}
