use crate::ast::Id;
use crate::path::BlockPath;
use thiserror::Error;

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Reasons a page document is rejected. Any of these is fatal to loading
/// the document; nothing is rendered from a document that fails here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Invalid JSON at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Page document must be a JSON object")]
    NotAnObject,

    #[error("Unsupported apiVersion {found}, expected \"page/v1\"")]
    UnsupportedVersion { found: String },

    #[error("Unsupported document type {found}, expected \"page\"")]
    UnsupportedDocumentType { found: String },

    #[error("Unknown document field `{field}`")]
    UnknownField { field: String },

    #[error("Missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("Field `{field}` is invalid: {message}")]
    InvalidField { field: &'static str, message: String },

    #[error("Unknown block type \"{block_type}\" at {path}")]
    UnknownBlockType { path: BlockPath, block_type: String },

    #[error("Malformed block at {path}: {message}")]
    MalformedBlock {
        path: BlockPath,
        block_type: Option<String>,
        message: String,
    },

    #[error("Duplicate id \"{id}\" at {second} (first declared at {first})")]
    DuplicateId {
        id: Id,
        first: BlockPath,
        second: BlockPath,
    },

    #[error("Failed to serialize page document: {0}")]
    Serialize(String),
}

impl SchemaError {
    pub fn malformed(path: &BlockPath, block_type: Option<&str>, message: impl Into<String>) -> Self {
        Self::MalformedBlock {
            path: path.clone(),
            block_type: block_type.map(str::to_string),
            message: message.into(),
        }
    }

    /// True for errors raised by the document envelope rather than a block
    pub fn is_envelope_error(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::NotAnObject
                | Self::UnsupportedVersion { .. }
                | Self::UnsupportedDocumentType { .. }
                | Self::UnknownField { .. }
                | Self::MissingField { .. }
                | Self::InvalidField { .. }
        )
    }

    /// Block the error points at, when there is one
    pub fn path(&self) -> Option<&BlockPath> {
        match self {
            Self::UnknownBlockType { path, .. } | Self::MalformedBlock { path, .. } => Some(path),
            Self::DuplicateId { second, .. } => Some(second),
            _ => None,
        }
    }
}
