//! Typed errors for read algorithms and scan sources.

use arrow::error::ArrowError;
use thiserror::Error;

pub type Result<T, E = ScanError> = std::result::Result<T, E>;

/// Errors a read can fail with.
///
/// A failure raised on a background worker is carried back to the pipeline
/// thread as-is, so the variant seen by the caller is the one the read
/// algorithm produced.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    /// The read was abandoned because the query was cancelled.
    #[error("read cancelled")]
    Cancelled,

    /// The read algorithm panicked on a background worker.
    #[error("read panicked: {0}")]
    Panicked(String),

    /// The task runner dropped a background read without running it.
    #[error("background read was dropped before it ran")]
    TaskDropped,

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Read(#[from] anyhow::Error),
}

impl ScanError {
    /// Cancellation ends a scan early but is not a query failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }

    /// Build a [`ScanError::Panicked`] from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ScanError::Panicked(msg)
    }
}
