//! Caller-supplied diagnostic sink.
//!
//! The core has no logging-crate dependency of its own (logging is one of
//! the external collaborators this translator defers to), but several
//! conditions in the error taxonomy are "logged, not fatal" rather than
//! propagated as a `Result::Err`. Those conditions are reported through
//! this trait instead, so embedders can route them into whatever logging
//! stack they already run without this crate committing to one.

/// A non-fatal condition worth surfacing to the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    /// An opcode with no table entry (or an explicitly unimplemented one)
    /// was translated into a trap sequence instead of real code.
    IllegalOpcode { guest_pc: u32, opcode: u16 },
    /// An EA generator call was made with a size the addressing mode
    /// cannot service (see [`crate::error::TranslateError::InvalidEaSize`]).
    InvalidEaSize { guest_pc: u32, mode: u8 },
}

/// Sink for [`Diagnostic`] events emitted during translation.
pub trait Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// A `Diagnostics` implementation that discards everything. Useful for
/// callers that don't care, and as the default in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDiagnostics;

impl Diagnostics for NullDiagnostics {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

/// A `Diagnostics` implementation that records events into a `Vec`, used by
/// tests that need to assert a particular condition was reported.
#[derive(Debug, Default, Clone)]
pub struct RecordingDiagnostics {
    pub events: Vec<Diagnostic>,
}

impl Diagnostics for RecordingDiagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.events.push(diagnostic);
    }
}
