//! Error types for the BDAE library

use std::io;
use thiserror::Error;

/// Result type alias for BDAE operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for BDAE operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Archive entry or file not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container or BRES magic mismatch
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Short read while parsing a header or section
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// Compression method other than stored/deflate
    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// Decompression error
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Patch-archive or local-index capacity exceeded
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Invalid format or violated hard invariant
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl Error {
    /// Create a new InvalidFormat error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Error::InvalidFormat(msg.into())
    }

    /// Create a new InvalidSignature error
    pub fn invalid_signature<S: Into<String>>(msg: S) -> Self {
        Error::InvalidSignature(msg.into())
    }

    /// Create a new Truncated error
    pub fn truncated<S: Into<String>>(msg: S) -> Self {
        Error::Truncated(msg.into())
    }

    /// Create a new Decompression error
    pub fn decompression<S: Into<String>>(msg: S) -> Self {
        Error::Decompression(msg.into())
    }

    /// Check if this error indicates corrupted input
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::InvalidSignature(_)
                | Error::Truncated(_)
                | Error::Decompression(_)
                | Error::InvalidFormat(_)
        )
    }

    /// Check if this error is recoverable for the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::UnsupportedCompression(_) | Error::CapacityExceeded(_)
        )
    }
}
