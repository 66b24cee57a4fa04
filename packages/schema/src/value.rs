//! Dynamic values: literals or references to another block's published output.
//!
//! On the wire a reference is `{ "ref": "<id>", "pointer": "/optional/json/pointer" }`
//! and anything else is a literal. A literal object that would itself read as a
//! reference (it has a `ref` key, or is exactly `{ "literal": .. }`) is wrapped
//! as `{ "literal": <value> }` on output so parsing it back yields the same value.

use crate::ast::Id;
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const REF_KEY: &str = "ref";
const LITERAL_KEY: &str = "literal";

#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Literal(Value),
    Reference(Reference),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reference {
    #[serde(rename = "ref")]
    pub source: Id,
    /// RFC 6901 pointer into the source's value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

impl DynamicValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        DynamicValue::Literal(value.into())
    }

    pub fn reference(source: Id) -> Self {
        DynamicValue::Reference(Reference {
            source,
            pointer: None,
        })
    }

    pub fn reference_with_pointer(source: Id, pointer: impl Into<String>) -> Self {
        DynamicValue::Reference(Reference {
            source,
            pointer: Some(pointer.into()),
        })
    }

    /// Id this value depends on, if it is a reference
    pub fn source(&self) -> Option<&Id> {
        match self {
            DynamicValue::Reference(reference) => Some(&reference.source),
            DynamicValue::Literal(_) => None,
        }
    }
}

fn needs_literal_wrapper(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key(REF_KEY) || (map.len() == 1 && map.contains_key(LITERAL_KEY))
        }
        _ => false,
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::Reference(reference) => reference.serialize(serializer),
            DynamicValue::Literal(value) if needs_literal_wrapper(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(LITERAL_KEY, value)?;
                map.end()
            }
            DynamicValue::Literal(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;

        let is_reference = matches!(&raw, Value::Object(map) if map.contains_key(REF_KEY));
        if is_reference {
            let reference = Reference::deserialize(raw).map_err(de::Error::custom)?;
            return Ok(DynamicValue::Reference(reference));
        }

        if let Value::Object(map) = &raw {
            if map.len() == 1 {
                if let Some(inner) = map.get(LITERAL_KEY) {
                    return Ok(DynamicValue::Literal(inner.clone()));
                }
            }
        }

        Ok(DynamicValue::Literal(raw))
    }
}
