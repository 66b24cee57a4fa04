//! Lookup tables built over a document in one pass.

use crate::error::CommonError;
use crate::result::CommonResult;
use crate::visitor::{walk_block, Visitor};
use pages_schema::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Where ids are declared and where they are referenced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlockIndex {
    /// Declaring block of every id
    pub declarations: BTreeMap<Id, BlockPath>,
    /// Every field block, in document order
    pub fields: Vec<(BlockPath, Id)>,
    /// Every reference (referencing block, referenced id), in document order
    pub references: Vec<(BlockPath, Id)>,
    /// Every form block, in document order
    pub forms: Vec<BlockPath>,
}

impl BlockIndex {
    pub fn build(doc: &PageDocument) -> Self {
        let mut builder = IndexBuilder {
            index: BlockIndex::default(),
        };
        builder.visit_document(doc);
        builder.index
    }

    pub fn path_of(&self, id: &Id) -> Option<&BlockPath> {
        self.declarations.get(id)
    }

    /// Innermost form that encloses the block at `path`; its validation scope
    /// is the one a field there reports into
    pub fn enclosing_form(&self, path: &BlockPath) -> Option<&BlockPath> {
        self.forms
            .iter()
            .filter(|form| *form != path && path.starts_with(form))
            .max_by_key(|form| form.depth())
    }

    /// References to ids that no block declares
    pub fn dangling_references(&self) -> Vec<&(BlockPath, Id)> {
        self.references
            .iter()
            .filter(|(_, id)| !self.declarations.contains_key(id))
            .collect()
    }

    /// References whose target is declared later in document order.
    ///
    /// These fail to resolve at render time because the target has not been
    /// published yet when the referencing block is reached.
    pub fn forward_references(&self) -> Vec<&(BlockPath, Id)> {
        self.references
            .iter()
            .filter(|(path, id)| match self.declarations.get(id) {
                Some(declared) => !path.starts_with(declared) && declared > path,
                None => false,
            })
            .collect()
    }
}

struct IndexBuilder {
    index: BlockIndex,
}

impl Visitor for IndexBuilder {
    fn visit_block(&mut self, block: &Block, path: &BlockPath) {
        if let Some(id) = block.id() {
            self.index.declarations.insert(id.clone(), path.clone());
        }
        if let Block::Form(_) = block {
            self.index.forms.push(path.clone());
        }
        walk_block(self, block, path);
    }

    fn visit_field(&mut self, field: FieldRef<'_>, path: &BlockPath) {
        self.index.fields.push((path.clone(), field.id().clone()));
    }

    fn visit_dynamic_value(&mut self, value: &DynamicValue, path: &BlockPath) {
        if let Some(source) = value.source() {
            self.index.references.push((path.clone(), source.clone()));
        }
    }
}

/// Block at `path`, if there is one
pub fn find_block<'a>(doc: &'a PageDocument, path: &BlockPath) -> Option<&'a Block> {
    let (first, rest) = path.indices().split_first()?;
    let mut block = doc.blocks.get(*first)?;
    for index in rest {
        block = block.children()?.get(*index)?;
    }
    Some(block)
}

/// Block list that holds the children of `parent` (the top-level list for the root path)
pub fn children_at_mut<'a>(
    doc: &'a mut PageDocument,
    parent: &BlockPath,
) -> CommonResult<&'a mut Vec<Block>> {
    let mut blocks = &mut doc.blocks;
    for (depth, index) in parent.indices().iter().enumerate() {
        let at = BlockPath::from_indices(parent.indices()[..=depth].to_vec());
        let block = blocks
            .get_mut(*index)
            .ok_or_else(|| CommonError::BlockNotFound(at.clone()))?;
        let block_type = block.type_name();
        blocks = block.children_mut().ok_or(CommonError::NotAContainer {
            path: at,
            block_type,
        })?;
    }
    Ok(blocks)
}
