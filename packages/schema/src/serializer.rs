use crate::ast::PageDocument;
use crate::error::{SchemaError, SchemaResult};
use serde_json::Value;

/// Structural inverse of [`crate::parse`]: `parse(&serialize(doc)?) == Ok(doc)`
pub fn serialize(document: &PageDocument) -> SchemaResult<Value> {
    serde_json::to_value(document).map_err(|e| SchemaError::Serialize(e.to_string()))
}

/// Canonical two-space indented text, as shown in code mode
pub fn serialize_pretty(document: &PageDocument) -> SchemaResult<String> {
    serde_json::to_string_pretty(document).map_err(|e| SchemaError::Serialize(e.to_string()))
}
