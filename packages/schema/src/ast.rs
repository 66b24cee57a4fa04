use crate::value::DynamicValue;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub const API_VERSION: &str = "page/v1";
pub const DOCUMENT_TYPE: &str = "page";

/// Every `type` discriminant a block may carry. Anything else is rejected.
pub const BLOCK_TYPES: &[&str] = &[
    "headline",
    "text",
    "card",
    "query",
    "data",
    "form",
    "string-input",
    "number-input",
    "checkbox",
    "select",
];

/// Root of a page: `{ apiVersion: "page/v1", type: "page", blocks: [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PageDocument {
    pub api_version: ApiVersion,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub blocks: Vec<Block>,
}

impl PageDocument {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            api_version: ApiVersion::V1,
            kind: DocumentKind::Page,
            blocks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiVersion {
    #[serde(rename = "page/v1")]
    V1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "page")]
    Page,
}

/// Identifier of a block that publishes a value (queries, data blocks, fields).
///
/// Never empty; unique within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("id must be a non-empty string")]
pub struct EmptyId;

impl Id {
    pub fn new(id: impl Into<String>) -> Result<Self, EmptyId> {
        Self::try_from(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Id {
    type Error = EmptyId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Err(EmptyId)
        } else {
            Ok(Id(value))
        }
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One node of the page tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Block {
    Headline(Headline),
    Text(Text),
    Card(Card),
    Query(Query),
    Data(Data),
    Form(Form),
    StringInput(StringInput),
    NumberInput(NumberInput),
    Checkbox(Checkbox),
    Select(Select),
}

impl Block {
    /// The `type` discriminant as written in documents
    pub fn type_name(&self) -> &'static str {
        match self {
            Block::Headline(_) => "headline",
            Block::Text(_) => "text",
            Block::Card(_) => "card",
            Block::Query(_) => "query",
            Block::Data(_) => "data",
            Block::Form(_) => "form",
            Block::StringInput(_) => "string-input",
            Block::NumberInput(_) => "number-input",
            Block::Checkbox(_) => "checkbox",
            Block::Select(_) => "select",
        }
    }

    /// Id published by this block, if it declares one
    pub fn id(&self) -> Option<&Id> {
        match self {
            Block::Query(query) => Some(&query.id),
            Block::Data(data) => Some(&data.id),
            Block::StringInput(input) => Some(&input.id),
            Block::NumberInput(input) => Some(&input.id),
            Block::Checkbox(input) => Some(&input.id),
            Block::Select(input) => Some(&input.id),
            Block::Headline(_) | Block::Text(_) | Block::Card(_) | Block::Form(_) => None,
        }
    }

    pub fn children(&self) -> Option<&[Block]> {
        match self {
            Block::Card(card) => Some(&card.blocks),
            Block::Query(query) => Some(&query.blocks),
            Block::Form(form) => Some(&form.blocks),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Block>> {
        match self {
            Block::Card(card) => Some(&mut card.blocks),
            Block::Query(query) => Some(&mut query.blocks),
            Block::Form(form) => Some(&mut form.blocks),
            _ => None,
        }
    }

    /// View of this block as an input field
    pub fn as_field(&self) -> Option<FieldRef<'_>> {
        match self {
            Block::StringInput(input) => Some(FieldRef::String(input)),
            Block::NumberInput(input) => Some(FieldRef::Number(input)),
            Block::Checkbox(input) => Some(FieldRef::Checkbox(input)),
            Block::Select(input) => Some(FieldRef::Select(input)),
            _ => None,
        }
    }

    /// Dynamic values this block evaluates while rendering
    pub fn dynamic_values(&self) -> Vec<&DynamicValue> {
        match self {
            Block::Data(data) => vec![&data.value],
            _ => self
                .as_field()
                .and_then(|field| field.default_value())
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadlineLevel {
    H1,
    H2,
    H3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Headline {
    pub level: HeadlineLevel,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Text {
    pub content: String,
}

/// Plain container; opens no validation scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Card {
    pub blocks: Vec<Block>,
}

/// External data source. Children render once the source settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Query {
    pub id: Id,
    pub endpoint: String,
    pub blocks: Vec<Block>,
}

/// Publishes a derived value under `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Data {
    pub id: Id,
    pub value: DynamicValue,
}

/// Form boundary: owns a validation scope and fires `mutation` from `trigger`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Form {
    pub trigger: Trigger,
    pub mutation: MutationDescriptor,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Trigger {
    Button { label: String },
}

impl Trigger {
    pub fn label(&self) -> &str {
        match self {
            Trigger::Button { label } => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StringInput {
    pub id: Id,
    pub label: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(
        default,
        deserialize_with = "explicit_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<DynamicValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NumberInput {
    pub id: Id,
    pub label: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(
        default,
        deserialize_with = "explicit_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<DynamicValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Checkbox {
    pub id: Id,
    pub label: String,
    /// A required checkbox must be checked
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(
        default,
        deserialize_with = "explicit_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<DynamicValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Select {
    pub id: Id,
    pub label: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,
    pub options: Vec<String>,
    #[serde(
        default,
        deserialize_with = "explicit_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<DynamicValue>,
}

/// Borrowed view over the four input block types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    String(&'a StringInput),
    Number(&'a NumberInput),
    Checkbox(&'a Checkbox),
    Select(&'a Select),
}

impl<'a> FieldRef<'a> {
    pub fn id(&self) -> &'a Id {
        match self {
            FieldRef::String(input) => &input.id,
            FieldRef::Number(input) => &input.id,
            FieldRef::Checkbox(input) => &input.id,
            FieldRef::Select(input) => &input.id,
        }
    }

    pub fn label(&self) -> &'a str {
        match self {
            FieldRef::String(input) => &input.label,
            FieldRef::Number(input) => &input.label,
            FieldRef::Checkbox(input) => &input.label,
            FieldRef::Select(input) => &input.label,
        }
    }

    pub fn required(&self) -> bool {
        match self {
            FieldRef::String(input) => input.required,
            FieldRef::Number(input) => input.required,
            FieldRef::Checkbox(input) => input.required,
            FieldRef::Select(input) => input.required,
        }
    }

    pub fn default_value(&self) -> Option<&'a DynamicValue> {
        match self {
            FieldRef::String(input) => input.default_value.as_ref(),
            FieldRef::Number(input) => input.default_value.as_ref(),
            FieldRef::Checkbox(input) => input.default_value.as_ref(),
            FieldRef::Select(input) => input.default_value.as_ref(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldRef::String(_) => "string-input",
            FieldRef::Number(_) => "number-input",
            FieldRef::Checkbox(_) => "checkbox",
            FieldRef::Select(_) => "select",
        }
    }
}

/// Declarative mutation bound to a form's trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MutationDescriptor {
    pub method: HttpMethod,
    /// Path template; `{name}` placeholders are filled from page params and form values
    pub endpoint: String,
    #[serde(default)]
    pub body: BodyMapping,
}

/// Mutating HTTP methods. `GET` is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule that turns form values into a request body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BodyMapping {
    /// Every mounted field value keyed by field id
    #[default]
    FormValues,
    /// Explicit entries; dotted keys build nested objects
    Object { entries: Vec<BodyEntry> },
    /// No request body
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BodyEntry {
    pub key: String,
    pub value: BodySource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodySource {
    /// Current value of a field in the submitting form
    Field(Id),
    /// Page parameter such as the current namespace
    Param(String),
    Literal(serde_json::Value),
}

/// A present `defaultValue` is always a value, `null` included
fn explicit_default<'de, D>(deserializer: D) -> Result<Option<DynamicValue>, D::Error>
where
    D: Deserializer<'de>,
{
    DynamicValue::deserialize(deserializer).map(Some)
}

fn is_false(value: &bool) -> bool {
    !*value
}
