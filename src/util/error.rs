//! Error types for the archive library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for archive operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File does not exist or cannot be accessed
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Archive signature does not belong to the requested client version
    #[error("Signature mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    SignatureMismatch { expected: u32, actual: u32 },

    /// Flag byte not defined for the metadata format in use
    #[error("Unknown flag 0x{flag:02X} in {category} {id} (previous flag 0x{previous:02X})")]
    UnknownFlag {
        flag: u8,
        previous: u8,
        category: &'static str,
        id: u32,
    },

    /// File is truncated or corrupted
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Invalid data structure in file
    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    /// A hard format limit would be exceeded
    #[error("Capacity exceeded: {what} (limit {limit})")]
    CapacityExceeded { what: &'static str, limit: u64 },

    /// Record id outside the addressable range
    #[error("Id {id} out of range (count: {count})")]
    IndexOutOfRange { id: u32, count: u32 },

    /// Version descriptor has a zero value or signature
    #[error("Invalid client version: {0}")]
    InvalidVersion(String),

    /// Store cannot accept the operation right now (e.g. compiling)
    #[error("Store not ready: {0}")]
    NotReady(&'static str),

    /// Store was disposed
    #[error("Store has been disposed")]
    Disposed,

    /// Layout or operation that is recognised but not implemented
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog or settings (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an "other" error from a string.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an invalid structure error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Signature or flag-table mismatch: the file was written for another client.
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, Self::SignatureMismatch { .. } | Self::UnknownFlag { .. })
    }

    /// Map an `UnexpectedEof` I/O error to our positional variant.
    pub(crate) fn from_read(err: std::io::Error, pos: u64) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof(pos)
        } else {
            Self::Io(err)
        }
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;
