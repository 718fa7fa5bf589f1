//! # `gost::error`
//!
//! Error taxonomy for the recovery engine. Every fallible core operation returns
//! `Result<T, GostError>`; nothing in the analysis path panics on attacker- or
//! user-controlled input.
//!

use thiserror::Error;

/// Errors surfaced by the recovery engine
#[derive(Debug, Error)]
pub enum GostError {
    /// The first bytes of the input didn't match any known object format magic
    #[error("unknown executable format")]
    UnknownExecutableFormat,

    /// A section the engine depends on (`.text`, `.rodata`, `.gopclntab`, ...) is absent
    #[error("section missing: {0}")]
    SectionMissing(String),

    /// A symbol the engine depends on is absent, and no fallback policy applies
    #[error("symbol missing: {0}")]
    SymbolMissing(String),

    /// The heuristic string-blob locator found no plausible ASCII runs
    #[error("string blob not detected")]
    StringBlobNotDetected,

    /// A positional read against a section's backing bytes failed
    #[error("read failure: {0}")]
    ReadFailure(String),

    /// Underlying object-file parsing failed
    #[error("failed to parse object file: {0}")]
    ObjectParse(String),

    /// I/O failure opening or mapping the input file
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GostError>;
