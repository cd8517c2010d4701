//! Error taxonomy for the capture engine.
//!
//! Only `InvalidArgument` ever aborts a call. The other variants are recovered
//! locally by the engine, logged, and surfaced through `TickResult`.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureError {
    /// No idle slot was available for a newly stable track.
    PoolExhausted { track_id: u64 },
    /// A pending crop write did not fit in the memory budget.
    InsufficientMemory {
        slot: usize,
        requested: usize,
        available: usize,
    },
    /// Bad mode value or configuration threshold.
    InvalidArgument(String),
    /// The external cropper failed to produce pixels.
    CropFailed { slot: usize, reason: String },
}

impl CaptureError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CaptureError::InvalidArgument(message.into())
    }

    /// Stable code for log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::PoolExhausted { .. } => "CAPTURE_POOL_EXHAUSTED",
            CaptureError::InsufficientMemory { .. } => "CAPTURE_INSUFFICIENT_MEMORY",
            CaptureError::InvalidArgument(_) => "CAPTURE_INVALID_ARGUMENT",
            CaptureError::CropFailed { .. } => "CAPTURE_CROP_FAILED",
        }
    }

    /// True for errors the engine recovers from within the tick.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::InvalidArgument(_))
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PoolExhausted { track_id } => {
                write!(f, "{}: no free slot for track {}", self.code(), track_id)
            }
            CaptureError::InsufficientMemory {
                slot,
                requested,
                available,
            } => write!(
                f,
                "{}: slot {} needs {} bytes, {} available",
                self.code(),
                slot,
                requested,
                available
            ),
            CaptureError::InvalidArgument(message) => write!(f, "{}: {}", self.code(), message),
            CaptureError::CropFailed { slot, reason } => {
                write!(f, "{}: slot {}: {}", self.code(), slot, reason)
            }
        }
    }
}

impl std::error::Error for CaptureError {}
