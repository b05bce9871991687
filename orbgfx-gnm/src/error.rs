//! Error types for command-stream interpretation and submission.

use std::fmt;

use thiserror::Error;

/// Status code from the native graphics backend, propagated unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeError(pub i32);

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "native status {}", self.0)
    }
}

/// Errors raised by the command-stream interpreter, the framebuffer
/// aggregator and the submission driver.
///
/// All of these are per-submission: the failing submission is aborted,
/// prior frames' presented output stays intact and no global state is
/// corrupted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GnmError {
    /// The command buffer could not be decoded. Partial translation of a
    /// corrupt stream is never attempted; an omitted state mutation
    /// would silently corrupt subsequent draws.
    #[error("malformed command stream at dword {offset}: {reason}")]
    MalformedCommandStream { offset: usize, reason: String },

    /// More than one command-buffer pair per submission call.
    /// Submissions are deliberately serialized rather than interleaved.
    #[error("unsupported batch of {count} command buffer pairs (exactly 1 supported)")]
    UnsupportedBatch { count: usize },

    /// The selected parser/context slot does not exist.
    #[error("display buffer index {index} out of range ({count} contexts)")]
    InvalidBufferIndex { index: usize, count: usize },

    /// Framebuffer creation requires a render pass.
    #[error("no render pass supplied")]
    NoRenderPass,

    /// The native framebuffer creation call was rejected.
    #[error("framebuffer creation failed: {0}")]
    FramebufferCreationFailed(NativeError),

    /// Any other native-API failure; fatal to the current frame, never
    /// retried automatically.
    #[error("native call failed: {0}")]
    Native(NativeError),
}

impl GnmError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedCommandStream { offset, reason: reason.into() }
    }
}

/// Status code surface of the submission API, mirroring the console's
/// driver contract: callers see `Ok` or `ErrorUnknown`, never a typed
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SubmitStatus {
    Ok,
    ErrorUnknown,
}

impl SubmitStatus {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}
