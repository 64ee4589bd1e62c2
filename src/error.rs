//! Error and Result types for decoding, encoding and merging logs.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A convenience `Result` type for log codec operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// The error type for log codec and merge operations.
///
/// Every variant is fatal for the file being processed. Nothing in this
/// crate retries; the caller decides whether to skip the source or abort.
#[derive(Debug, Error)]
pub enum LogError {
    /// The first four bytes are not the binary log magic.
    #[error("invalid magic bytes: expected CF B2 AB 1B, got {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// The header names a format version this crate cannot read.
    #[error("unsupported log version {0}")]
    UnsupportedVersion(u8),

    /// The header pointer size is neither 4 nor 8.
    #[error("invalid pointer size {0} in header")]
    InvalidPointerSize(u8),

    /// The stream ended before the header was complete.
    #[error("log data ends inside the file header")]
    TruncatedHeader,

    /// A record's severity byte is not a known level.
    #[error("invalid severity {0} in record")]
    InvalidLevel(u8),

    /// The stream ended part way through a record.
    #[error("log data ends in the middle of record {record}")]
    Truncated {
        /// Zero based index of the incomplete record.
        record: u64,
    },

    /// A varint ran past 64 bits.
    #[error("varint does not fit in 64 bits")]
    VarintOverflow,

    /// A format string holds a conversion the binary format cannot carry.
    #[error("unknown conversion {} in format string {format:?}", display_conversion(.conversion))]
    UnknownConversion {
        /// The offending conversion character, `None` for a trailing `%`.
        conversion: Option<char>,
        /// The full format string.
        format: String,
    },

    /// The typed arguments of a record do not match its format string.
    #[error("arguments do not match format string {format:?}")]
    ArgumentMismatch {
        /// The format string the arguments were checked against.
        format: String,
    },

    /// An elapsed-time prefix in a text log could not be parsed.
    #[error("invalid timestamp {0:?} in text log")]
    InvalidTimestamp(String),

    /// A computed time fell outside the representable range.
    #[error("timestamp out of range")]
    TimestampOutOfRange,

    /// A text log name does not carry a level and start time.
    #[error("cannot derive level and start time from text log name {}", .0.display())]
    UnrecognizedFileName(PathBuf),

    /// A record lacks a token the binary format requires.
    #[error("log line has no {0} and cannot be binary encoded")]
    MissingToken(&'static str),

    /// A pointer argument's width differs from the width already declared
    /// in the output header.
    #[error("pointer argument is {argument} bytes but the file declares {header}")]
    PointerSizeMismatch {
        /// Width in the header.
        header: u8,
        /// Width of the argument.
        argument: u8,
    },

    /// A token argument was normalized by a different merge session.
    #[error("token argument belongs to session {found}, encoder is bound to session {expected}")]
    SessionMismatch {
        /// Session the encoder writes with.
        expected: u64,
        /// Session the argument was tagged with.
        found: u64,
    },

    /// Opening or accessing a file failed.
    #[error("{}: {source}", path.display())]
    File {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LogError {
    /// Wraps an I/O error with the path it happened on.
    pub fn at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LogError::File {
            path: path.into(),
            source,
        }
    }

    /// Like `at`, for writers that may not have a path.
    pub(crate) fn io_at(path: Option<&Path>, source: io::Error) -> Self {
        match path {
            Some(path) => LogError::at(path, source),
            None => LogError::Io(source),
        }
    }
}

fn display_conversion(conversion: &Option<char>) -> String {
    match conversion {
        Some(c) => format!("'%{}'", c),
        None => "at end of string".to_string(),
    }
}
