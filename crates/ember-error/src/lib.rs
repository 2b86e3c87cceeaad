#![forbid(unsafe_code)]
//! Error types for EmberFS.
//!
//! Defines `EmberError` and a `Result<T>` alias used throughout the
//! workspace. The `Empty` and `Range` variants are internal control-flow
//! signals for the log scanner and never surface to callers of the mount
//! path.

use thiserror::Error;

/// Unified error type for all EmberFS operations.
#[derive(Debug, Error)]
pub enum EmberError {
    /// Underlying storage read or write failed. Always fatal to a mount.
    #[error("flash I/O error: {0}")]
    Flash(#[from] std::io::Error),

    /// Magic mismatch, duplicate (id, seq), unmet recovery preconditions,
    /// or no mountable filesystem on the device.
    #[error("corrupt filesystem: {detail}")]
    Corrupt { detail: String },

    /// Erased-flash word at a record position; marks the end of an area's
    /// log.
    #[error("end of log")]
    Empty,

    /// A read would cross the end of the area. Treated as end-of-log by the
    /// scanner.
    #[error("read beyond area bounds: offset {offset} + len {len} > area length {area_len}")]
    Range { offset: u32, len: u32, area_len: u32 },

    /// Object index lookup miss. Drives placeholder creation during
    /// reconstruction.
    #[error("object {0} not found")]
    NotFound(u32),

    /// An object pool is exhausted.
    #[error("{pool} pool exhausted")]
    OutOfMemory { pool: &'static str },

    /// Impossible argument or state.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

impl EmberError {
    /// Build a `Corrupt` error from anything displayable.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// True for the conditions that end an area scan without failing it.
    #[must_use]
    pub fn is_scan_end(&self) -> bool {
        matches!(self, Self::Empty | Self::Range { .. })
    }
}

/// Result alias using `EmberError`.
pub type Result<T> = std::result::Result<T, EmberError>;
