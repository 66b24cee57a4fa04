//! # Pages Editor
//!
//! Authoring engine for page documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ schema: JSON text → PageDocument            │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: modes, edits and history            │
//! │  - Load/save documents                      │
//! │  - Code buffer with debounced re-parse      │
//! │  - Structural edits with undo/redo          │
//! │  - Live triggers through the executor       │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ evaluator: PageDocument → RenderTree        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Document is source of truth**: the render tree is a derived view
//! 2. **Edits are values**: every edit produces a new, re-validated document
//! 3. **Modes gate actions**: no mode both edits structure and executes mutations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pages_editor::{Document, EditOp, Mode, ModeController};
//!
//! let doc = Document::load("page.json".into())?;
//! let mut controller = ModeController::new(doc, params, Default::default())?;
//!
//! controller.apply_edit(&EditOp::Delete { path })?;
//! controller.set_mode(Mode::Live)?;
//! let outcome = controller.trigger(&form_path, &executor).await?;
//! ```

mod code_buffer;
mod document;
mod errors;
mod mode;
mod mutations;
mod undo_stack;

pub use code_buffer::{CodeBuffer, CodeBufferConfig, PollResult};
pub use document::{Document, DocumentStorage};
pub use errors::EditorError;
pub use mode::{Mode, ModeController};
pub use mutations::{EditError, EditOp};
pub use undo_stack::{EditBatch, UndoStack};
