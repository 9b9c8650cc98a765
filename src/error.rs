//! # Error Types
//!
//! Central error type for the live-streaming core: TS/PES parsing, codec
//! header extraction, protocol framing, and the timeshift ring buffer all
//! report through `RoboTvError`.
//!
//! ## Example Usage
//!
//! ```rust
//! use robotv_live::error::{Result, RoboTvError};
//!
//! fn validate_payload(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(RoboTvError::InvalidData("empty TS payload".to_string()));
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::num::ParseIntError;
use thiserror::Error;

/// Primary error type for the live-streaming core.
#[derive(Error, Debug)]
pub enum RoboTvError {
    /// I/O errors from sockets, ring files, or configuration loading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A codec header failed to parse (SPS/PPS/ADTS/AC-3/...).
    #[error("codec error: {0}")]
    Codec(String),

    /// Wire protocol violations: bad message id, version mismatch, truncated frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// TS/PES/PAT/PMT structural errors.
    #[error("parser error: {0}")]
    Parser(String),

    /// Malformed or out-of-range input data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The timeshift ring buffer is in an unrecoverable state (overrun with no
    /// room to force the reader forward).
    #[error("ring buffer error: {0}")]
    RingOverrun(String),

    /// A capacity bound was exceeded and the newest item was dropped
    /// (writer queue, pre-queue). Not necessarily fatal; callers may choose
    /// to log and continue.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Integer parsing failure while reading a configuration file.
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// A specialized `Result` type for the live-streaming core.
pub type Result<T> = std::result::Result<T, RoboTvError>;
