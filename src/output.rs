//! Sinks for merged logs.
//!
//! Every call renders its whole line into memory before writing it, so a
//! sink never leaves a partial line behind on its own. Sinks created from a
//! path report write errors against that path.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::config::MergeConfig;
use crate::encoder::LogEncoder;
use crate::error::{LogError, Result};
use crate::record::LogLine;
use crate::token::TokenSession;

/// Destination for merged records and free-form text such as metadata.
pub trait LogOutput {
    fn write_line(&mut self, line: &LogLine) -> Result<()>;

    fn write_text(&mut self, text: &str) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// Human-readable output, one line per record:
///
/// ```text
/// I 13:45:10.500000| [DB]: {7|DB@0x1} opened
/// ```
pub struct TextOutput<W: Write> {
    out: W,
    path: Option<PathBuf>,
    use_utc: bool,
    last_day: Option<NaiveDate>,
    last_object: u64,
    line: String,
}

impl TextOutput<BufWriter<File>> {
    /// Creates `path`; write errors name it.
    pub fn create(path: impl AsRef<Path>, config: &MergeConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = config.create_file(path)?;
        let mut output = Self::new(BufWriter::new(file), config.use_utc);
        output.path = Some(path.to_path_buf());
        Ok(output)
    }
}

impl<W: Write> TextOutput<W> {
    pub fn new(out: W, use_utc: bool) -> Self {
        Self {
            out,
            path: None,
            use_utc,
            last_day: None,
            last_object: 0,
            line: String::new(),
        }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        LogOutput::flush(&mut self)?;
        Ok(self.out)
    }

    fn display_time(&self, time: DateTime<Utc>) -> DateTime<FixedOffset> {
        if self.use_utc {
            time.fixed_offset()
        } else {
            time.with_timezone(&Local).fixed_offset()
        }
    }

    // `[domain]: {id|object} message`, naming each object in full only the
    // first time a higher ID shows up
    fn decorate(&mut self, line: &LogLine) {
        use std::fmt::Write as _;

        if let Some(domain) = line.domain().filter(|d| !d.value().is_empty()) {
            let _ = write!(self.line, "[{}]: ", domain.value());
        }
        match line.object() {
            Some(object) if object.id() > self.last_object => {
                self.last_object = object.id();
                let _ = write!(self.line, "{{{}|{}}} ", object.id(), object.value());
            }
            Some(object) if object.id() > 0 => {
                let _ = write!(self.line, "{{{}}} ", object.id());
            }
            _ => {}
        }
        self.line.push_str(line.message());
    }
}

impl<W: Write> LogOutput for TextOutput<W> {
    fn write_line(&mut self, line: &LogLine) -> Result<()> {
        let time = self.display_time(line.time());
        let day = time.date_naive();
        if self.last_day.is_some_and(|last| last != day) {
            let marker = format!("---- Date change to {} ----", time.format("%A, %m/%d/%y"));
            self.write_text(&marker)?;
        }
        self.last_day = Some(day);

        self.line.clear();
        self.line.push(line.level().initial());
        self.line.push(' ');
        self.line.push_str(&time.format("%H:%M:%S%.6f| ").to_string());
        self.decorate(line);
        self.line.push('\n');
        self.out
            .write_all(self.line.as_bytes())
            .map_err(|e| LogError::io_at(self.path.as_deref(), e))
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let mut buf = String::with_capacity(text.len() + 1);
        buf.push_str(text);
        buf.push('\n');
        self.out
            .write_all(buf.as_bytes())
            .map_err(|e| LogError::io_at(self.path.as_deref(), e))
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| LogError::io_at(self.path.as_deref(), e))
    }
}

/// Binary output: records are re-encoded, text goes to a side file.
///
/// Records that came from text logs have no domain or format string to
/// encode; they are skipped and counted.
pub struct BinaryOutput<W: Write + Seek, M: Write> {
    encoder: LogEncoder<W>,
    meta: M,
    meta_path: Option<PathBuf>,
    skipped: u64,
}

impl BinaryOutput<BufWriter<File>, BufWriter<File>> {
    /// Creates `path` and its `<stem>-meta.txt` sibling.
    pub fn create(
        path: impl AsRef<Path>,
        start: DateTime<Utc>,
        session: TokenSession,
        config: &MergeConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        let encoder = LogEncoder::create(path, start, session, config)?;
        let meta_path = meta_path(path);
        let meta = config.create_file(&meta_path)?;
        let mut output = Self::new(encoder, BufWriter::new(meta));
        output.meta_path = Some(meta_path);
        Ok(output)
    }
}

impl<W: Write + Seek, M: Write> BinaryOutput<W, M> {
    pub fn new(encoder: LogEncoder<W>, meta: M) -> Self {
        Self {
            encoder,
            meta,
            meta_path: None,
            skipped: 0,
        }
    }

    pub fn encoder(&self) -> &LogEncoder<W> {
        &self.encoder
    }

    /// Text-only records left out of the binary log.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn flush_meta(&mut self) -> Result<()> {
        self.meta.flush().map_err(|e| LogError::io_at(self.meta_path.as_deref(), e))
    }

    /// Flushes both files and returns the log and metadata writers.
    pub fn finish(mut self) -> Result<(W, M)> {
        self.flush_meta()?;
        let out = self.encoder.finish()?;
        Ok((out, self.meta))
    }
}

impl<W: Write + Seek, M: Write> LogOutput for BinaryOutput<W, M> {
    fn write_line(&mut self, line: &LogLine) -> Result<()> {
        if line.domain().is_none() {
            if self.skipped == 0 {
                warn!("text log records cannot be binary encoded, skipping them");
            }
            self.skipped += 1;
            return Ok(());
        }
        self.encoder.write_line(line)
    }

    fn write_text(&mut self, text: &str) -> Result<()> {
        let mut buf = String::with_capacity(text.len() + 1);
        buf.push_str(text);
        buf.push('\n');
        self.meta
            .write_all(buf.as_bytes())
            .map_err(|e| LogError::io_at(self.meta_path.as_deref(), e))
    }

    fn flush(&mut self) -> Result<()> {
        if self.skipped > 0 {
            debug!(skipped = self.skipped, "text records left out of binary output");
        }
        self.flush_meta()?;
        self.encoder.flush()
    }
}

/// `dir/merged.cbllog` -> `dir/merged-meta.txt`
pub fn meta_path(path: &Path) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!("{}-meta.txt", stem))
}
