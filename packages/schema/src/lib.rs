//! # Pages Schema
//!
//! Versioned description of a page document: a tree of typed blocks under a
//! `{ apiVersion: "page/v1", type: "page" }` envelope.
//!
//! This crate is pure data. It validates raw JSON into [`PageDocument`]
//! values and serializes them back, and nothing else.
//!
//! ```rust,ignore
//! use pages_schema::{parse_str, serialize};
//!
//! let doc = parse_str(pages_schema::EXAMPLE_PAGE)?;
//! assert_eq!(doc.blocks.len(), 2);
//! let raw = serialize(&doc)?;
//! ```

pub mod ast;
pub mod error;
pub mod parser;
pub mod path;
pub mod serializer;
pub mod value;


pub use ast::*;
pub use error::{SchemaError, SchemaResult};
pub use parser::{parse, parse_str};
pub use path::{BlockPath, InvalidBlockPath};
pub use serializer::{serialize, serialize_pretty};
pub use value::{DynamicValue, Reference};

/// Bundled example page: a headline followed by a text block
pub const EXAMPLE_PAGE: &str = include_str!("../fixtures/example.page.json");
