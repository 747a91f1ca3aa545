//! Error types for core primitives.

use thiserror::Error;

/// Errors from the core primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A main-thread message exceeded the atomic pipe-write bound.
    #[error("message of {len} bytes exceeds the {max}-byte pipe record limit")]
    MessageTooLong {
        /// Encoded record length.
        len: usize,
        /// Maximum record length.
        max: usize,
    },

    /// The pipe write did not transmit the full record.
    #[error("short write: {written} of {len} bytes")]
    ShortWrite {
        /// Bytes actually written.
        written: usize,
        /// Record length.
        len: usize,
    },

    /// Message encoding failed.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// Pipe creation or write failed at the OS level.
    #[error("pipe error: {0}")]
    Pipe(#[from] std::io::Error),
}
