//! `{placeholder}` expansion for endpoint templates.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Page-level parameters (current namespace and the like)
pub type TemplateParams = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("No value for placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("Unterminated placeholder starting at byte {0}")]
    Unterminated(usize),

    #[error("Empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
}

/// Replace every `{name}` in `template` with `lookup(name)`.
pub fn expand_template<F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(open) = rest.find('{') {
        output.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let close = after_open
            .find('}')
            .ok_or(TemplateError::Unterminated(offset + open))?;

        let name = after_open[..close].trim();
        if name.is_empty() {
            return Err(TemplateError::EmptyPlaceholder(offset + open));
        }

        let value = lookup(name).ok_or_else(|| TemplateError::UnknownPlaceholder(name.to_string()))?;
        output.push_str(&value);

        let consumed = open + 1 + close + 1;
        rest = &rest[consumed..];
        offset += consumed;
    }

    output.push_str(rest);
    Ok(output)
}

/// Text form of a scalar JSON value; `None` for null, arrays and objects
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
