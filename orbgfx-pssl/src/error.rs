//! Error types for shader binary parsing and recompilation.
//!
//! All errors here are per-shader: a failed parse or an unsupported stage
//! means the shader must not be run, and the owning pipeline build is
//! aborted. Nothing in this crate panics on untrusted input.

use thiserror::Error;

/// Errors produced while locating, decoding or recompiling a shader binary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    /// The embedded binary-info signature was not found within the search
    /// bound. The buffer is not a shader binary we understand; the caller
    /// must treat the shader as malformed rather than substitute a default.
    #[error("shader binary signature not found within the first {searched} bytes")]
    NotFound { searched: usize },

    /// The binary-info header or one of its associated tables is
    /// inconsistent with the containing buffer (bad length, slot count out
    /// of range, table address outside the buffer, ...).
    #[error("malformed shader binary header: {reason}")]
    MalformedHeader { reason: String },

    /// The header names a stage we recognize but do not implement
    /// (the LS/ES geometry-pipeline stages). No bytecode is produced.
    #[error("unsupported shader stage: {0}")]
    UnsupportedStage(&'static str),

    /// The instruction decoder violated one of its own invariants or ran
    /// off the end of the code slice. This is a defect or a truncated
    /// binary, not a recoverable condition.
    #[error("instruction decode error at dword {offset}: {reason}")]
    DecodeError { offset: usize, reason: String },
}

impl ShaderError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedHeader { reason: reason.into() }
    }

    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Self::DecodeError { offset, reason: reason.into() }
    }
}
