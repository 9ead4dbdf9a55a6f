//! Error taxonomy for the translation core.

use thiserror::Error;

/// Faults that are internal to translation and therefore fatal to the
/// current block. Guest-runtime faults (MMU traps, illegal-instruction
/// exceptions) are not represented here — they are m68k exceptions raised
/// by the *emitted* code, not Rust-level errors (see `Diagnostics` for the
/// non-fatal "logged" half of the taxonomy).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TranslateError {
    /// The EA generator was asked to operate on an addressing mode at a
    /// size it does not support (e.g. byte-sized `An` direct). A translator
    /// bug, not a guest fault: no host code is emitted for the attempt.
    #[error("invalid EA size for mode {mode} at size {size:?}")]
    InvalidEaSize { mode: u8, size: crate::ea::Size },

    /// The register allocator could not satisfy an allocation even after
    /// attempting to spill every spillable guest register.
    #[error("host register file exhausted")]
    RegisterExhausted,

    /// Debug-assertion-only: a cursor would have read or written past the
    /// caller-declared buffer bounds. Never raised in release builds —
    /// bounds are a caller contract (see spec §7), not a runtime check.
    #[error("host or guest buffer bounds exceeded")]
    BufferOverrun,
}

/// Convenience alias used throughout the crate's fallible entry points.
pub type Result<T> = core::result::Result<T, TranslateError>;
