//! # Document Handle
//!
//! A Document wraps one page file and its editing state.
//! Documents can be:
//! - **Memory-backed**: for tests and pages that never touch disk
//! - **File-backed**: persisted with [`Document::save`]
//!
//! ## Lifecycle
//!
//! ```text
//! Load → Parse → Edit → Save
//!   ↓      ↓       ↓      ↓
//! File  PageDocument EditOp File
//! ```

use crate::{EditOp, EditorError};
use pages_schema::{parse_str, serialize_pretty, PageDocument};
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Editable page document
#[derive(Debug)]
pub struct Document {
    /// Path to source file (if any)
    pub path: PathBuf,

    /// Current version number (increments on each change)
    pub version: u64,

    storage: DocumentStorage,
}

/// Storage backend for document
#[derive(Debug)]
pub enum DocumentStorage {
    /// In-memory only
    Memory { page: PageDocument },

    /// File-backed
    File { page: PageDocument, dirty: bool },
}

impl Document {
    /// Create document from source text (memory-backed)
    pub fn from_source(path: PathBuf, source: &str) -> Result<Self, EditorError> {
        let page = parse_str(source)?;

        Ok(Self {
            path,
            version: 0,
            storage: DocumentStorage::Memory { page },
        })
    }

    pub fn from_page(path: PathBuf, page: PageDocument) -> Self {
        Self {
            path,
            version: 0,
            storage: DocumentStorage::Memory { page },
        }
    }

    /// Load document from file (file-backed)
    #[instrument]
    pub fn load(path: PathBuf) -> Result<Self, EditorError> {
        let source = std::fs::read_to_string(&path)?;
        let page = parse_str(&source)?;
        debug!(blocks = page.blocks.len(), "Loaded page");

        Ok(Self {
            path,
            version: 0,
            storage: DocumentStorage::File { page, dirty: false },
        })
    }

    pub fn page(&self) -> &PageDocument {
        match &self.storage {
            DocumentStorage::Memory { page } | DocumentStorage::File { page, .. } => page,
        }
    }

    /// Apply an edit. The stored page is only replaced when the edit succeeds.
    pub fn apply(&mut self, op: &EditOp) -> Result<&PageDocument, EditorError> {
        let edited = op.apply(self.page())?;
        Ok(self.replace_page(edited))
    }

    /// Swap in a new page (from undo/redo or a code-mode re-parse)
    pub fn replace_page(&mut self, next: PageDocument) -> &PageDocument {
        self.version += 1;

        match &mut self.storage {
            DocumentStorage::Memory { page } => {
                *page = next;
                page
            }
            DocumentStorage::File { page, dirty } => {
                *page = next;
                *dirty = true;
                page
            }
        }
    }

    /// Check if document has unsaved changes
    pub fn is_dirty(&self) -> bool {
        match &self.storage {
            DocumentStorage::File { dirty, .. } => *dirty,
            DocumentStorage::Memory { .. } => false,
        }
    }

    /// Canonical source text
    pub fn source(&self) -> Result<String, EditorError> {
        Ok(serialize_pretty(self.page())?)
    }

    /// Save document to disk (if file-backed)
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn save(&mut self) -> Result<(), EditorError> {
        let source = self.source()?;

        match &mut self.storage {
            DocumentStorage::File { dirty, .. } => {
                std::fs::write(&self.path, source)?;
                *dirty = false;
                debug!("Saved page");
                Ok(())
            }
            DocumentStorage::Memory { .. } => Err(EditorError::NotFileBacked),
        }
    }
}
