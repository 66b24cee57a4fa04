//! # Structural Edits
//!
//! Edit operations on a page document, addressed by [`BlockPath`].
//!
//! ## Semantics
//!
//! Documents are never edited in place. [`EditOp::apply`] clones the document,
//! applies the operation to the clone and re-validates the result with the
//! schema parser, so an edit that would leave the document invalid (a
//! duplicate id, say) fails and the original stays untouched.
//!
//! ### Move
//! - `to` is the block's path *after* the move, resolved against the document
//!   with the block already removed, so a block can never land inside itself
//!
//! ### Delete
//! - Removes the block and all descendants
//!
//! ### RenameId
//! - Renames the declaring block and every reference to it

use pages_common::{children_at_mut, find_block, walk_block_mut, BlockIndex, CommonError, VisitorMut};
use pages_schema::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum EditOp {
    /// Insert `block` as the `index`-th child of `parent` (root path = top level)
    Insert {
        parent: BlockPath,
        index: usize,
        block: Block,
    },

    Move { from: BlockPath, to: BlockPath },

    Delete { path: BlockPath },

    Replace { path: BlockPath, block: Block },

    RenameId { from: Id, to: Id },
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("No block at {0}")]
    BlockNotFound(BlockPath),

    #[error("Index {index} is out of bounds under {parent} ({len} children)")]
    IndexOutOfBounds {
        parent: BlockPath,
        index: usize,
        len: usize,
    },

    #[error("The root path does not address a block")]
    RootPath,

    #[error("No block declares id \"{0}\"")]
    IdNotFound(Id),

    #[error("Edit would produce an invalid document: {0}")]
    Invalid(#[from] SchemaError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl EditOp {
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::Insert { .. } => "insert",
            EditOp::Move { .. } => "move",
            EditOp::Delete { .. } => "delete",
            EditOp::Replace { .. } => "replace",
            EditOp::RenameId { .. } => "rename-id",
        }
    }

    /// Apply to a copy of `doc` and return the edited document
    pub fn apply(&self, doc: &PageDocument) -> Result<PageDocument, EditError> {
        self.validate(doc)?;

        let mut edited = doc.clone();
        match self {
            EditOp::Insert {
                parent,
                index,
                block,
            } => Self::apply_insert(&mut edited, parent, *index, block.clone())?,

            EditOp::Move { from, to } => {
                let block = Self::apply_remove(&mut edited, from)?;
                let (parent, index) = to.split_last().ok_or(EditError::RootPath)?;
                Self::apply_insert(&mut edited, &parent, index, block)?;
            }

            EditOp::Delete { path } => {
                Self::apply_remove(&mut edited, path)?;
            }

            EditOp::Replace { path, block } => {
                let (parent, index) = path.split_last().ok_or(EditError::RootPath)?;
                let slot = children_at_mut(&mut edited, &parent)?
                    .get_mut(index)
                    .ok_or_else(|| EditError::BlockNotFound(path.clone()))?;
                *slot = block.clone();
            }

            EditOp::RenameId { from, to } => {
                IdRenamer { from, to }.visit_document_mut(&mut edited);
            }
        }

        Ok(revalidate(&edited)?)
    }

    /// Operation that undoes `self` when applied to the edited document.
    ///
    /// Must be computed against the document *before* `self` is applied.
    pub fn to_inverse(&self, doc: &PageDocument) -> Result<EditOp, EditError> {
        match self {
            EditOp::Insert { parent, index, .. } => Ok(EditOp::Delete {
                path: parent.child(*index),
            }),

            EditOp::Move { from, to } => Ok(EditOp::Move {
                from: to.clone(),
                to: from.clone(),
            }),

            EditOp::Delete { path } => {
                let (parent, index) = path.split_last().ok_or(EditError::RootPath)?;
                let block = find_block(doc, path)
                    .cloned()
                    .ok_or_else(|| EditError::BlockNotFound(path.clone()))?;
                Ok(EditOp::Insert {
                    parent,
                    index,
                    block,
                })
            }

            EditOp::Replace { path, .. } => {
                let block = find_block(doc, path)
                    .cloned()
                    .ok_or_else(|| EditError::BlockNotFound(path.clone()))?;
                Ok(EditOp::Replace {
                    path: path.clone(),
                    block,
                })
            }

            EditOp::RenameId { from, to } => Ok(EditOp::RenameId {
                from: to.clone(),
                to: from.clone(),
            }),
        }
    }

    fn validate(&self, doc: &PageDocument) -> Result<(), EditError> {
        match self {
            EditOp::Move { from, to } if from.is_root() || to.is_root() => Err(EditError::RootPath),
            EditOp::Delete { path } | EditOp::Replace { path, .. } if path.is_root() => {
                Err(EditError::RootPath)
            }
            EditOp::RenameId { from, .. } => {
                if BlockIndex::build(doc).path_of(from).is_none() {
                    return Err(EditError::IdNotFound(from.clone()));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn apply_insert(
        doc: &mut PageDocument,
        parent: &BlockPath,
        index: usize,
        block: Block,
    ) -> Result<(), EditError> {
        let children = children_at_mut(doc, parent)?;
        if index > children.len() {
            return Err(EditError::IndexOutOfBounds {
                parent: parent.clone(),
                index,
                len: children.len(),
            });
        }
        children.insert(index, block);
        Ok(())
    }

    fn apply_remove(doc: &mut PageDocument, path: &BlockPath) -> Result<Block, EditError> {
        let (parent, index) = path.split_last().ok_or(EditError::RootPath)?;
        let children = children_at_mut(doc, &parent)?;
        if index >= children.len() {
            return Err(EditError::BlockNotFound(path.clone()));
        }
        Ok(children.remove(index))
    }
}

/// Re-run every document-level rule on an edited document
fn revalidate(doc: &PageDocument) -> SchemaResult<PageDocument> {
    parse(&serialize(doc)?)
}

struct IdRenamer<'a> {
    from: &'a Id,
    to: &'a Id,
}

impl IdRenamer<'_> {
    fn rename(&self, id: &mut Id) {
        if *id == *self.from {
            *id = self.to.clone();
        }
    }
}

impl VisitorMut for IdRenamer<'_> {
    fn visit_block_mut(&mut self, block: &mut Block, path: &BlockPath) {
        match block {
            Block::Query(Query { id, .. })
            | Block::Data(Data { id, .. })
            | Block::StringInput(StringInput { id, .. })
            | Block::NumberInput(NumberInput { id, .. })
            | Block::Checkbox(Checkbox { id, .. })
            | Block::Select(Select { id, .. }) => self.rename(id),
            Block::Headline(_) | Block::Text(_) | Block::Card(_) | Block::Form(_) => {}
        }
        walk_block_mut(self, block, path);
    }

    fn visit_dynamic_value_mut(&mut self, value: &mut DynamicValue, _path: &BlockPath) {
        if let DynamicValue::Reference(reference) = value {
            self.rename(&mut reference.source);
        }
    }

    fn visit_body_source_mut(&mut self, source: &mut BodySource, _path: &BlockPath) {
        if let BodySource::Field(id) = source {
            self.rename(id);
        }
    }
}
