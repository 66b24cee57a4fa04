//! # Page document parsing
//!
//! Validation runs outside-in so the first error is the most useful one:
//!
//! 1. The envelope: `apiVersion` is checked before anything else, so a
//!    document from a newer schema reports "unsupported version" rather than
//!    a confusing block error.
//! 2. Every block, depth first, against its variant. Children are checked
//!    before their parent so errors carry the deepest path. Each level only
//!    deserializes its own fields; the whole tree is deserialized once at the
//!    end. Unknown keys are rejected at every level.
//! 3. Document-wide rules: ids unique, pointers well formed, bounds ordered.

use crate::ast::*;
use crate::error::{SchemaError, SchemaResult};
use crate::path::BlockPath;
use crate::value::DynamicValue;
use serde_json::{Map, Value};
use std::collections::HashMap;

const ENVELOPE_KEYS: &[&str] = &["apiVersion", "type", "blocks"];

/// Parse JSON text (code mode entry point)
pub fn parse_str(source: &str) -> SchemaResult<PageDocument> {
    let raw: Value = serde_json::from_str(source).map_err(|e| SchemaError::Syntax {
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })?;
    parse(&raw)
}

/// Validate a raw JSON value into a page document
pub fn parse(raw: &Value) -> SchemaResult<PageDocument> {
    let object = raw.as_object().ok_or(SchemaError::NotAnObject)?;

    match object.get("apiVersion") {
        Some(Value::String(version)) if version == API_VERSION => {}
        Some(other) => {
            return Err(SchemaError::UnsupportedVersion {
                found: other.to_string(),
            })
        }
        None => return Err(SchemaError::MissingField { field: "apiVersion" }),
    }

    match object.get("type") {
        Some(Value::String(kind)) if kind == DOCUMENT_TYPE => {}
        Some(other) => {
            return Err(SchemaError::UnsupportedDocumentType {
                found: other.to_string(),
            })
        }
        None => return Err(SchemaError::MissingField { field: "type" }),
    }

    if let Some(field) = object.keys().find(|key| !ENVELOPE_KEYS.contains(&key.as_str())) {
        return Err(SchemaError::UnknownField {
            field: field.clone(),
        });
    }

    let blocks = object
        .get("blocks")
        .ok_or(SchemaError::MissingField { field: "blocks" })?
        .as_array()
        .ok_or_else(|| SchemaError::InvalidField {
            field: "blocks",
            message: "expected an array of blocks".to_string(),
        })?;

    let root = BlockPath::root();
    for (index, block) in blocks.iter().enumerate() {
        check_block(block, &root.child(index))?;
    }

    let document: PageDocument =
        serde_json::from_value(raw.clone()).map_err(|e| SchemaError::InvalidField {
            field: "blocks",
            message: e.to_string(),
        })?;

    check_document(&document)?;
    Ok(document)
}

fn check_block(raw: &Value, path: &BlockPath) -> SchemaResult<()> {
    let object = raw
        .as_object()
        .ok_or_else(|| SchemaError::malformed(path, None, "expected a block object"))?;

    let block_type = match object.get("type") {
        Some(Value::String(block_type)) => block_type.as_str(),
        _ => {
            return Err(SchemaError::malformed(
                path,
                None,
                "missing string `type` discriminant",
            ))
        }
    };

    if !BLOCK_TYPES.contains(&block_type) {
        return Err(SchemaError::UnknownBlockType {
            path: path.clone(),
            block_type: block_type.to_string(),
        });
    }

    if let Some(Value::Array(children)) = object.get("blocks") {
        for (index, child) in children.iter().enumerate() {
            check_block(child, &path.child(index))?;
        }
    }

    serde_json::from_value::<Block>(Value::Object(own_fields(object)))
        .map_err(|e| SchemaError::malformed(path, Some(block_type), e.to_string()))?;

    Ok(())
}

/// Copy of a block with its children emptied, so each block is only
/// deserialized once per level
fn own_fields(object: &Map<String, Value>) -> Map<String, Value> {
    object
        .iter()
        .map(|(key, value)| match value {
            Value::Array(_) if key == "blocks" => (key.clone(), Value::Array(Vec::new())),
            _ => (key.clone(), value.clone()),
        })
        .collect()
}

fn check_document(document: &PageDocument) -> SchemaResult<()> {
    let mut seen = HashMap::new();
    check_blocks(&document.blocks, &BlockPath::root(), &mut seen)
}

fn check_blocks(
    blocks: &[Block],
    parent: &BlockPath,
    seen: &mut HashMap<Id, BlockPath>,
) -> SchemaResult<()> {
    for (index, block) in blocks.iter().enumerate() {
        let path = parent.child(index);

        if let Some(id) = block.id() {
            if let Some(first) = seen.get(id) {
                return Err(SchemaError::DuplicateId {
                    id: id.clone(),
                    first: first.clone(),
                    second: path,
                });
            }
            seen.insert(id.clone(), path.clone());
        }

        for value in block.dynamic_values() {
            if let DynamicValue::Reference(reference) = value {
                if let Some(pointer) = &reference.pointer {
                    if !pointer.is_empty() && !pointer.starts_with('/') {
                        return Err(SchemaError::malformed(
                            &path,
                            Some(block.type_name()),
                            format!("pointer \"{}\" must be empty or start with '/'", pointer),
                        ));
                    }
                }
            }
        }

        check_bounds(block, &path)?;

        if let Some(children) = block.children() {
            check_blocks(children, &path, seen)?;
        }
    }
    Ok(())
}

fn check_bounds(block: &Block, path: &BlockPath) -> SchemaResult<()> {
    let inverted = match block {
        Block::StringInput(input) => matches!(
            (input.min_length, input.max_length),
            (Some(min), Some(max)) if min > max
        ),
        Block::NumberInput(input) => matches!(
            (input.min, input.max),
            (Some(min), Some(max)) if min > max
        ),
        _ => false,
    };

    if inverted {
        return Err(SchemaError::malformed(
            path,
            Some(block.type_name()),
            "lower bound is greater than upper bound",
        ));
    }
    Ok(())
}
