//! # Undo/Redo Stack
//!
//! Tracks edit history for edit mode.
//!
//! ## Design
//!
//! - Each edit records its inverse (computed before the edit is applied)
//! - Undo applies the inverses and moves the batch to the redo stack
//! - Redo reapplies the original edits
//! - New edits clear the redo stack
//! - Batches group several edits into one undo step (a drag that moves and
//!   renames, for instance)
//!
//! Documents are values: every method takes the current document and returns
//! the next one.

use crate::{EditError, EditOp};
use pages_schema::PageDocument;

/// A group of edits that are undone/redone together
#[derive(Debug, Clone)]
pub struct EditBatch {
    /// The edits in this batch (in application order)
    pub ops: Vec<EditOp>,

    /// The inverse edits (in reverse order for undo)
    pub inverses: Vec<EditOp>,

    pub description: Option<String>,
}

impl EditBatch {
    pub fn single(op: EditOp, inverse: EditOp) -> Self {
        Self {
            ops: vec![op],
            inverses: vec![inverse],
            description: None,
        }
    }
}

#[derive(Debug)]
pub struct UndoStack {
    /// Applied batches (most recent last)
    undo_stack: Vec<EditBatch>,

    /// Undone batches (most recent last)
    redo_stack: Vec<EditBatch>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Batch being built
    current_batch: Option<EditBatch>,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            current_batch: None,
        }
    }

    /// Apply an edit and record it for undo
    pub fn apply(&mut self, op: &EditOp, doc: &PageDocument) -> Result<PageDocument, EditError> {
        // Inverse is computed against the unedited document
        let inverse = op.to_inverse(doc)?;
        let edited = op.apply(doc)?;

        if let Some(batch) = &mut self.current_batch {
            batch.ops.push(op.clone());
            batch.inverses.insert(0, inverse);
        } else {
            self.push_batch(EditBatch::single(op.clone(), inverse));
        }

        Ok(edited)
    }

    /// Start a batch of edits (undone/redone together)
    pub fn begin_batch(&mut self) {
        self.current_batch = Some(EditBatch {
            ops: Vec::new(),
            inverses: Vec::new(),
            description: None,
        });
    }

    /// End the current batch and push it to the undo stack
    pub fn end_batch(&mut self) {
        if let Some(batch) = self.current_batch.take() {
            if !batch.ops.is_empty() {
                self.push_batch(batch);
            }
        }
    }

    pub fn set_batch_description(&mut self, description: impl Into<String>) {
        if let Some(batch) = &mut self.current_batch {
            batch.description = Some(description.into());
        }
    }

    fn push_batch(&mut self, batch: EditBatch) {
        self.undo_stack.push(batch);

        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }

        // New action invalidates the redo history
        self.redo_stack.clear();
    }

    /// Undo the most recent batch. `None` if there is nothing to undo.
    pub fn undo(&mut self, doc: &PageDocument) -> Result<Option<PageDocument>, EditError> {
        let Some(batch) = self.undo_stack.pop() else {
            return Ok(None);
        };

        match replay(&batch.inverses, doc) {
            Ok(restored) => {
                self.redo_stack.push(batch);
                Ok(Some(restored))
            }
            Err(err) => {
                self.undo_stack.push(batch);
                Err(err)
            }
        }
    }

    /// Redo the most recently undone batch. `None` if there is nothing to redo.
    pub fn redo(&mut self, doc: &PageDocument) -> Result<Option<PageDocument>, EditError> {
        let Some(batch) = self.redo_stack.pop() else {
            return Ok(None);
        };

        match replay(&batch.ops, doc) {
            Ok(restored) => {
                self.undo_stack.push(batch);
                Ok(Some(restored))
            }
            Err(err) => {
                self.redo_stack.push(batch);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.current_batch = None;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|batch| batch.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

fn replay(ops: &[EditOp], doc: &PageDocument) -> Result<PageDocument, EditError> {
    let mut current = doc.clone();
    for op in ops {
        current = op.apply(&current)?;
    }
    Ok(current)
}
