//! Unified error handling for the INC transport.
//!
//! Mirrors the teacher's `CommyError`: a single `thiserror`-derived enum,
//! a `category()`/`is_retryable()` pair for callers building retry policy,
//! and an `ErrorContext` extension trait for `.context(...)`.

use std::io;
use thiserror::Error;

/// Error type for all INC operations.
#[derive(Error, Debug)]
pub enum IncError {
    // Framing / wire errors (spec.md §7)
    #[error("bad magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("payload size {size} exceeds maximum message size {max}")]
    TooLarge { size: u32, max: u32 },

    #[error("truncated record: expected {expected} bytes, had {available}")]
    Truncated { expected: usize, available: usize },

    #[error("type mismatch: expected tag {expected:?}, found {found:?}")]
    TypeMismatch { expected: &'static str, found: u8 },

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("unknown or unattached shared-memory id {0}")]
    BadShmRef(u32),

    #[error("unsupported protocol version {offered} (accepted range {min}-{max})")]
    VersionUnsupported { offered: u16, min: u16, max: u16 },

    #[error("transport closed")]
    TransportClosed,

    #[error("compressed payloads are not supported yet")]
    CompressionUnsupported,

    // Shared memory
    #[error("shared memory unavailable: {0}")]
    ShmUnavailable(String),

    #[error("shared memory operation failed: {0}")]
    Shm(String),

    // Configuration
    #[error("configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    #[error("failed to parse config line {line}: {reason}")]
    ConfigParse { line: usize, reason: String },

    // I/O
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Operation lifecycle
    #[error("operation {0} not found in pending table")]
    UnknownOperation(u32),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for INC operations.
pub type IncResult<T> = Result<T, IncError>;

/// Error category for grouping related errors, mirrors spec.md §7's taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Framing,
    Codec,
    Shm,
    Configuration,
    Io,
    Protocol,
    Internal,
}

impl IncError {
    /// Category of this error, for callers that branch on error class.
    pub fn category(&self) -> ErrorCategory {
        match self {
            IncError::BadMagic { .. }
            | IncError::TooLarge { .. }
            | IncError::VersionUnsupported { .. }
            | IncError::CompressionUnsupported => ErrorCategory::Framing,

            IncError::TypeMismatch { .. } | IncError::Truncated { .. } | IncError::InvalidUtf8 => {
                ErrorCategory::Codec
            }

            IncError::BadShmRef(_) | IncError::ShmUnavailable(_) | IncError::Shm(_) => {
                ErrorCategory::Shm
            }

            IncError::Configuration { .. } | IncError::ConfigParse { .. } => {
                ErrorCategory::Configuration
            }

            IncError::Io(_) => ErrorCategory::Io,

            IncError::TransportClosed | IncError::UnknownOperation(_) | IncError::Cancelled => {
                ErrorCategory::Protocol
            }

            IncError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a caller driving retry/reconnect logic should retry the
    /// operation that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            IncError::TransportClosed => true,
            IncError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

/// Adds `.context(...)` to `Result`s that don't already carry enough
/// information about what failed.
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> IncResult<T>
    where
        F: FnOnce() -> String;

    fn context(self, msg: &str) -> IncResult<T>;
}

impl<T> ErrorContext<T> for IncResult<T> {
    fn with_context<F>(self, f: F) -> IncResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| IncError::Internal(format!("{}: {}", f(), e)))
    }

    fn context(self, msg: &str) -> IncResult<T> {
        self.map_err(|e| IncError::Internal(format!("{}: {}", msg, e)))
    }
}

impl<T> ErrorContext<T> for Result<T, io::Error> {
    fn with_context<F>(self, f: F) -> IncResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| IncError::Internal(format!("{}: {}", f(), e)))
    }

    fn context(self, msg: &str) -> IncResult<T> {
        self.map_err(|e| IncError::Internal(format!("{}: {}", msg, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categorizes_framing_errors() {
        let err = IncError::BadMagic {
            expected: 0x494e_4300,
            actual: 0,
        };
        assert_eq!(err.category(), ErrorCategory::Framing);
    }

    #[test]
    fn io_would_block_is_retryable() {
        let err = IncError::Io(io::Error::new(io::ErrorKind::WouldBlock, "nope"));
        assert!(err.is_retryable());
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        let err = IncError::Configuration {
            field: "max_message_size".into(),
            message: "must be nonzero".into(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn context_wraps_message() {
        let result: Result<(), io::Error> = Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let wrapped = result.context("loading server config");
        assert!(wrapped
            .unwrap_err()
            .to_string()
            .contains("loading server config"));
    }
}
