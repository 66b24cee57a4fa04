//! # Mode Controller
//!
//! Owns a page while it is being authored or used, and gates every action on
//! the current [`Mode`]:
//!
//! - **code**: raw text edits, re-parsed after a debounce
//! - **edit**: structural [`EditOp`]s with undo/redo; mutations never execute
//! - **live**: form triggers execute mutations; structure is frozen
//!
//! Every change to the document goes through the runtime, so form scopes never
//! outlive the document they were mounted for. Code mode works on text only:
//! the runtime is suspended and nothing renders until the mode is left.

use crate::code_buffer::{CodeBuffer, CodeBufferConfig, PollResult};
use crate::document::Document;
use crate::undo_stack::UndoStack;
use crate::{EditOp, EditorError};
use pages_evaluator::{
    Capabilities, MutationClient, MutationExecutor, MutationOutcome, PageRuntime, RenderTree,
    TemplateParams,
};
use pages_schema::{BlockPath, PageDocument};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub use pages_evaluator::Mode;

pub struct ModeController {
    mode: Mode,
    document: Document,
    history: UndoStack,
    code: CodeBuffer,
    runtime: PageRuntime,
}

impl ModeController {
    /// Start in edit mode with the document rendered
    pub fn new(
        document: Document,
        params: TemplateParams,
        config: CodeBufferConfig,
    ) -> Result<Self, EditorError> {
        let mode = Mode::default();
        let code = CodeBuffer::new(document.source()?, config);
        let mut runtime = PageRuntime::new(
            document.page().clone(),
            params,
            Capabilities::for_mode(mode),
        );
        runtime.render();

        Ok(Self {
            mode,
            document,
            history: UndoStack::new(),
            code,
            runtime,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_mode(self.mode)
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn page(&self) -> &PageDocument {
        self.document.page()
    }

    pub fn tree(&self) -> &RenderTree {
        self.runtime.tree()
    }

    pub fn runtime(&self) -> &PageRuntime {
        &self.runtime
    }

    /// For hosts that publish query results and field input
    pub fn runtime_mut(&mut self) -> &mut PageRuntime {
        &mut self.runtime
    }

    pub fn code(&self) -> &CodeBuffer {
        &self.code
    }

    pub fn history(&self) -> &UndoStack {
        &self.history
    }

    /// Switch modes.
    ///
    /// Leaving code mode parses any buffered text first; if it does not parse
    /// the switch is refused and the mode stays `code`.
    #[instrument(skip(self), fields(from = %self.mode))]
    pub fn set_mode(&mut self, mode: Mode) -> Result<(), EditorError> {
        if mode == self.mode {
            return Ok(());
        }

        if self.mode == Mode::Code {
            match self.code.flush() {
                PollResult::Parsed(page) => self.load_page(page),
                PollResult::Rejected(err) => {
                    warn!(error = %err, "Refusing to leave code mode");
                    return Err(err.into());
                }
                PollResult::Idle | PollResult::Waiting => {
                    if self.code.is_unapplied() {
                        return Err(EditorError::UnappliedCode);
                    }
                }
            }
        }

        if mode == Mode::Code {
            self.code.reset(self.document.source()?);
        }

        self.mode = mode;
        if mode == Mode::Code {
            self.runtime.suspend(Capabilities::for_mode(mode));
        } else {
            self.runtime.set_capabilities(Capabilities::for_mode(mode));
        }
        info!("Mode changed");
        Ok(())
    }

    /// Buffer new document text (code mode only)
    pub fn edit_code(&mut self, text: String, now: Instant) -> Result<(), EditorError> {
        self.require_mode(Mode::Code, "Editing code")?;
        self.code.edit(text, now);
        Ok(())
    }

    /// Re-parse the code buffer once the debounce has elapsed. A document
    /// that parses replaces the loaded one; an error becomes the overlay and
    /// the last good document stays.
    pub fn poll(&mut self, now: Instant) -> Result<PollResult, EditorError> {
        self.require_mode(Mode::Code, "Parsing code")?;

        let result = self.code.poll(now);
        if let PollResult::Parsed(page) = &result {
            self.load_page(page.clone());
        }
        Ok(result)
    }

    /// Apply a structural edit (edit mode only)
    #[instrument(skip(self, op), fields(op = op.name()))]
    pub fn apply_edit(&mut self, op: &EditOp) -> Result<&RenderTree, EditorError> {
        if !self.capabilities().structural_editing() {
            return Err(self.disabled("Structural editing"));
        }

        let edited = self.history.apply(op, self.document.page())?;
        self.document.replace_page(edited.clone());
        Ok(self.runtime.replace_document(edited))
    }

    /// Undo the last edit. Returns false if there was nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditorError> {
        if !self.capabilities().structural_editing() {
            return Err(self.disabled("Undo"));
        }

        let Some(page) = self.history.undo(self.document.page())? else {
            return Ok(false);
        };
        self.document.replace_page(page.clone());
        self.runtime.replace_document(page);
        Ok(true)
    }

    /// Redo the last undone edit. Returns false if there was nothing to redo.
    pub fn redo(&mut self) -> Result<bool, EditorError> {
        if !self.capabilities().structural_editing() {
            return Err(self.disabled("Redo"));
        }

        let Some(page) = self.history.redo(self.document.page())? else {
            return Ok(false);
        };
        self.document.replace_page(page.clone());
        self.runtime.replace_document(page);
        Ok(true)
    }

    /// Press the trigger of the form at `form`.
    ///
    /// In edit mode the executor only previews the request
    /// ([`MutationOutcome::Inert`]); in code mode there is no rendered form to
    /// press.
    #[instrument(skip(self, executor))]
    pub async fn trigger<C: MutationClient>(
        &mut self,
        form: &BlockPath,
        executor: &MutationExecutor<C>,
    ) -> Result<MutationOutcome, EditorError> {
        if self.mode == Mode::Code {
            return Err(self.disabled("Triggering a form"));
        }

        let submission = self.runtime.submission(form)?;
        let outcome = submission.execute(executor).await;
        debug!(outcome = outcome.kind(), "Trigger finished");

        self.runtime.sync_forms();
        Ok(outcome)
    }

    fn load_page(&mut self, page: PageDocument) {
        // Paths recorded in the history no longer line up with the new text
        self.history.clear();
        self.document.replace_page(page.clone());
        if self.mode == Mode::Code {
            self.runtime.load_document(page);
        } else {
            self.runtime.replace_document(page);
        }
    }

    fn require_mode(&self, mode: Mode, action: &'static str) -> Result<(), EditorError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(self.disabled(action))
        }
    }

    fn disabled(&self, action: &'static str) -> EditorError {
        EditorError::CapabilityDisabled {
            action,
            mode: self.mode,
        }
    }
}
