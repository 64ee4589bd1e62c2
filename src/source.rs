//! Detecting and opening log files of either kind.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::config::MergeConfig;
use crate::decoder::{LogDecoder, LOG_MAGIC};
use crate::error::{LogError, Result};
use crate::record::LogLine;
use crate::text::TextLogReader;

/// Opening line of every text log.
pub const TEXT_LOG_BANNER: &[u8] = b"---- CouchbaseLite";

/// Bytes read from the front of a file to decide what it is.
pub const SNIFF_LEN: usize = TEXT_LOG_BANNER.len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileKind {
    NotALog,
    Binary,
    Text,
}

impl LogFileKind {
    /// Classifies the file at `path` from its first bytes. Unreadable files
    /// are not logs.
    pub fn sniff(path: impl AsRef<Path>) -> Self {
        let mut sample = [0u8; SNIFF_LEN];
        let read = File::open(path).and_then(|mut file| file.read_exact(&mut sample));
        match read {
            Ok(()) => Self::detect(&sample),
            Err(_) => Self::NotALog,
        }
    }

    /// Classifies a sample taken from the start of a file.
    pub fn detect(sample: &[u8]) -> Self {
        if sample.len() < SNIFF_LEN {
            Self::NotALog
        } else if sample.starts_with(&LOG_MAGIC) {
            Self::Binary
        } else if sample.starts_with(TEXT_LOG_BANNER) {
            Self::Text
        } else {
            Self::NotALog
        }
    }
}

/// A single pass over one log file of either kind.
pub enum LogSource {
    Binary(LogDecoder<File>),
    Text(TextLogReader<BufReader<File>>),
}

impl LogSource {
    /// Sniffs and opens `path`, returning `None` for files that are not logs.
    pub fn open(path: impl AsRef<Path>, config: &MergeConfig) -> Result<Option<Self>> {
        let path = path.as_ref();
        let source = match LogFileKind::sniff(path) {
            LogFileKind::NotALog => {
                // Distinguish a missing file from a file that simply isn't a log
                if let Err(e) = std::fs::metadata(path) {
                    if e.kind() == ErrorKind::NotFound {
                        return Err(LogError::at(path, e));
                    }
                }
                return Ok(None);
            }
            LogFileKind::Binary => Self::Binary(LogDecoder::open(path)?),
            LogFileKind::Text => Self::Text(TextLogReader::open(path, config.use_utc)?),
        };
        Ok(Some(source))
    }

    pub fn kind(&self) -> LogFileKind {
        match self {
            Self::Binary(_) => LogFileKind::Binary,
            Self::Text(_) => LogFileKind::Text,
        }
    }
}

impl Iterator for LogSource {
    type Item = Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Binary(decoder) => decoder.next(),
            Self::Text(reader) => reader.next(),
        }
    }
}
