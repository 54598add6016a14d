//! Error types for the table crate.

use thiserror::Error;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur while encoding or decoding tables.
#[derive(Error, Debug)]
pub enum TableError {
    /// Failed to encode a row.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a line of a JSON-lines table.
    #[error("decoding failed at line {line}: {message}")]
    DecodingFailed {
        /// 1-based line number.
        line: usize,
        /// Description of the decoding error.
        message: String,
    },
}

impl TableError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(line: usize, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            line,
            message: message.into(),
        }
    }
}
