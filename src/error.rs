//! Error types for the post-processor.
//!
//! Every failure either aborts the whole file's transformation or is not
//! an error at all: lines that match no known command shape pass through
//! untouched, and running past the end of the buffer is the normal loop
//! terminator for a pass.

use thiserror::Error;

/// Post-processing error
#[derive(Debug, Error)]
pub enum Error {
    /// The first line of the file matches none of the known slicer headers
    #[error("unsupported G-code dialect, first line: {0:?}")]
    UnrecognizedDialect(String),

    /// A line matched a command shape but a numeric field failed to parse
    #[error("malformed numeric field in line: {line:?}")]
    MalformedNumber {
        /// The offending line, verbatim
        line: String,
    },

    /// I/O failure while reading the source or writing the result
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
