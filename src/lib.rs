//! # Log Merge
//!
//! Reads compact binary logs and their plain-text companions, merges any
//! number of them into one time-ordered stream and writes that stream back
//! out as text or as a single binary log.
//!
//! ## Key Features
//!
//! * Lossless binary decoding: every record keeps its typed arguments, so it
//!   can be re-encoded without re-parsing the rendered message
//! * String deduplication on the wire: each token literal is written once per
//!   file, every later use is just an ID
//! * Token normalization across files, so a merged binary log has one
//!   consistent ID space
//! * Day rollover detection for text logs that only carry the time of day
//!
//! ## Main Components
//!
//! * `LogDecoder` / `LogEncoder`: the binary format, record by record
//! * `TextLogReader`: the text format
//! * `LogLineCollection`: the time-ordered merge buffer and its normalization
//! * `LogMerger`: reads a set of files and writes the merged result
//!
//! ## Quick Start
//!
//! ```no_run
//! use log_merge::{LogMerger, MergeConfig, OutputKind};
//!
//! # fn example() -> log_merge::Result<()> {
//! let config = MergeConfig::default().with_utc(true).with_output(OutputKind::Text);
//! let mut merger = LogMerger::new(config);
//! merger.add_files(&["cbl_info_1704067200000.cbllog", "cbl_error_1704067200000.cbllog"])?;
//! merger.merge_into("merged.txt")?;
//! # Ok(())
//! # }
//! ```

pub mod argument;
pub mod collection;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod merge;
pub mod output;
pub mod record;
pub mod source;
pub mod text;
pub mod token;
pub mod varint;

pub use argument::{LogArgument, PointerSize, TokenArgument};
pub use collection::LogLineCollection;
pub use config::{MergeConfig, OutputKind};
pub use decoder::LogDecoder;
pub use encoder::LogEncoder;
pub use error::{LogError, Result};
pub use format::{ArgKind, FormatString};
pub use merge::{LogMerger, SourceSummary, MAX_READERS};
pub use output::{BinaryOutput, LogOutput, TextOutput};
pub use record::{LogLevel, LogLine};
pub use source::{LogFileKind, LogSource};
pub use text::TextLogReader;
pub use token::{TokenSession, TokenString};
