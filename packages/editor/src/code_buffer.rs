//! Raw text buffer for code mode.
//!
//! Keystrokes land in the buffer; the text is only re-parsed once it has been
//! quiet for the debounce delay. Callers pass the current [`Instant`] so the
//! buffer never reads the clock itself.

use pages_schema::{parse_str, PageDocument, SchemaError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for the code buffer
#[derive(Debug, Clone, Copy)]
pub struct CodeBufferConfig {
    /// Debounce delay in milliseconds
    pub debounce_ms: u64,
}

impl Default for CodeBufferConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

/// What a poll did
#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    /// No unparsed edit
    Idle,
    /// An edit is buffered but still inside the debounce window
    Waiting,
    /// The buffer parsed into a new document
    Parsed(PageDocument),
    /// The buffer failed to parse; the error is kept as the overlay
    Rejected(SchemaError),
}

#[derive(Debug)]
pub struct CodeBuffer {
    text: String,
    debounce: Duration,
    /// Time of the last unparsed edit
    pending_since: Option<Instant>,
    overlay: Option<SchemaError>,
}

impl CodeBuffer {
    pub fn new(text: String, config: CodeBufferConfig) -> Self {
        Self {
            text,
            debounce: Duration::from_millis(config.debounce_ms),
            pending_since: None,
            overlay: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last parse error, shown over the editor until the text parses again
    pub fn overlay(&self) -> Option<&SchemaError> {
        self.overlay.as_ref()
    }

    /// True when the text has changed since it last parsed
    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// Replace the buffer text; restarts the debounce window
    pub fn edit(&mut self, text: String, now: Instant) {
        self.text = text;
        self.pending_since = Some(now);
    }

    /// Re-parse if the last edit is older than the debounce delay
    pub fn poll(&mut self, now: Instant) -> PollResult {
        let Some(since) = self.pending_since else {
            return PollResult::Idle;
        };

        if now.saturating_duration_since(since) < self.debounce {
            return PollResult::Waiting;
        }

        self.flush()
    }

    /// Parse right away, ignoring the debounce window
    pub fn flush(&mut self) -> PollResult {
        if self.pending_since.is_none() {
            return PollResult::Idle;
        }

        match parse_str(&self.text) {
            Ok(page) => {
                self.pending_since = None;
                self.overlay = None;
                debug!(blocks = page.blocks.len(), "Code buffer parsed");
                PollResult::Parsed(page)
            }
            Err(err) => {
                debug!(error = %err, "Code buffer rejected");
                self.pending_since = None;
                self.overlay = Some(err.clone());
                PollResult::Rejected(err)
            }
        }
    }

    /// Load text produced elsewhere (after a structural edit), dropping any
    /// unparsed edit and overlay
    pub fn reset(&mut self, text: String) {
        self.text = text;
        self.pending_since = None;
        self.overlay = None;
    }

    /// True when the buffer holds text that has not become the document
    pub fn is_unapplied(&self) -> bool {
        self.pending_since.is_some() || self.overlay.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pages_schema::EXAMPLE_PAGE;

    fn buffer() -> CodeBuffer {
        CodeBuffer::new(EXAMPLE_PAGE.to_string(), CodeBufferConfig { debounce_ms: 100 })
    }

    #[test]
    fn test_poll_without_edit_is_idle() {
        let mut buffer = buffer();
        assert_eq!(buffer.poll(Instant::now()), PollResult::Idle);
    }

    #[test]
    fn test_parse_waits_for_debounce() {
        let mut buffer = buffer();
        let start = Instant::now();
        buffer.edit(EXAMPLE_PAGE.replace("Welcome to", "Hello from"), start);

        assert_eq!(buffer.poll(start + Duration::from_millis(50)), PollResult::Waiting);
        assert!(matches!(
            buffer.poll(start + Duration::from_millis(100)),
            PollResult::Parsed(_)
        ));
        assert!(!buffer.is_pending());
    }

    #[test]
    fn test_new_edit_restarts_window() {
        let mut buffer = buffer();
        let start = Instant::now();
        buffer.edit("{".to_string(), start);
        buffer.edit(EXAMPLE_PAGE.to_string(), start + Duration::from_millis(80));

        assert_eq!(buffer.poll(start + Duration::from_millis(120)), PollResult::Waiting);
        assert!(matches!(
            buffer.poll(start + Duration::from_millis(180)),
            PollResult::Parsed(_)
        ));
    }

    #[test]
    fn test_parse_error_becomes_overlay() {
        let mut buffer = buffer();
        let start = Instant::now();
        buffer.edit("{ \"apiVersion\": ".to_string(), start);

        let result = buffer.poll(start + Duration::from_millis(100));
        assert!(matches!(result, PollResult::Rejected(SchemaError::Syntax { .. })));
        assert!(buffer.overlay().is_some());
        assert!(buffer.is_unapplied());

        buffer.edit(EXAMPLE_PAGE.to_string(), start + Duration::from_millis(200));
        assert!(matches!(buffer.flush(), PollResult::Parsed(_)));
        assert!(buffer.overlay().is_none());
        assert!(!buffer.is_unapplied());
    }
}
