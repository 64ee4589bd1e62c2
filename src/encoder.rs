use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::argument::{LogArgument, PointerSize};
use crate::config::MergeConfig;
use crate::decoder::{LOG_MAGIC, LOG_VERSION, POINTER_SIZE_OFFSET};
use crate::error::{LogError, Result};
use crate::record::LogLine;
use crate::token::{write_literal, TokenSession, TokenString};
use crate::varint::write_varint;

/// Writer for the binary log format; the mirror image of `LogDecoder`.
///
/// The encoder keeps its own first-use bookkeeping, independent of whatever
/// decoder produced the records:
///
/// * domain, format and `%-s` token IDs are tracked in one set, since they
///   share one ID space on the wire
/// * object IDs are tracked separately; object 0 never carries a literal
///
/// The `TokenSession` is only used to reject `%-s` arguments numbered by a
/// different merge.
///
/// Records are assembled in memory and written in one piece, so a record
/// that fails validation leaves neither bytes nor bookkeeping behind.
///
/// The pointer width is only known once a `%p` argument shows up, so the
/// header is written with width 4 and patched in place by the first pointer
/// argument. That needs `Seek` on the output.
///
/// # Examples
///
/// ```
/// # use log_merge::{LogArgument, LogEncoder, LogLevel, LogLine, TokenString};
/// # use std::io::Cursor;
/// # fn example() -> log_merge::Result<()> {
/// let start = chrono::Utc::now();
/// let mut encoder = LogEncoder::new(Cursor::new(Vec::new()), start)?;
/// let line = LogLine::new(
///     start,
///     LogLevel::Info,
///     TokenString::new(0, "DB"),
///     None,
///     TokenString::new(1, "opened %-s"),
///     vec![LogArgument::token(TokenString::new(2, "db1"))],
/// )?;
/// encoder.write_line(&line)?;
/// let bytes = encoder.finish()?.into_inner();
/// # Ok(())
/// # }
/// ```
pub struct LogEncoder<W: Write + Seek> {
    out: W,
    path: Option<PathBuf>,
    header_offset: u64,
    session: TokenSession,
    written_tokens: HashSet<u64>,
    written_objects: HashSet<u64>,
    record: Vec<u8>,
    current: DateTime<Utc>,
    start: DateTime<Utc>,
    pointer_size: Option<PointerSize>,
    records: u64,
}

impl LogEncoder<BufWriter<File>> {
    /// Creates the file at `path` (honouring the overwrite policy of
    /// `config`) and writes the header. Later I/O errors name `path`.
    pub fn create(path: impl AsRef<Path>, start: DateTime<Utc>, session: TokenSession, config: &MergeConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = config.create_file(path)?;
        Self::start_log(BufWriter::new(file), start, session, Some(path.to_path_buf()))
    }
}

impl<W: Write + Seek> LogEncoder<W> {
    /// Starts a log in `out` with a fresh token session.
    pub fn new(out: W, start: DateTime<Utc>) -> Result<Self> {
        Self::with_session(out, start, TokenSession::new())
    }

    /// Starts a log in `out` that accepts `%-s` arguments tagged by `session`.
    ///
    /// Records normalized by a merge must be written with that merge's
    /// session; see `LogLineCollection::encoder`.
    ///
    /// # Errors
    ///
    /// `TimestampOutOfRange` for a start before the Unix epoch, or any I/O
    /// error from writing the header.
    pub fn with_session(out: W, start: DateTime<Utc>, session: TokenSession) -> Result<Self> {
        Self::start_log(out, start, session, None)
    }

    fn start_log(mut out: W, start: DateTime<Utc>, session: TokenSession, path: Option<PathBuf>) -> Result<Self> {
        let secs = start.timestamp();
        let secs = u64::try_from(secs).map_err(|_| LogError::TimestampOutOfRange)?;

        let mut header = Vec::with_capacity(16);
        header.extend_from_slice(&LOG_MAGIC);
        // Pointer size is a guess until the first %p argument
        header.extend_from_slice(&[LOG_VERSION, PointerSize::Four.bytes()]);
        write_varint(&mut header, secs)?;

        let header_offset = out
            .stream_position()
            .and_then(|offset| out.write_all(&header).map(|_| offset))
            .map_err(|e| LogError::io_at(path.as_deref(), e))?;

        // The reader's clock starts from the whole second in the header
        let whole_second = DateTime::from_timestamp(secs as i64, 0).ok_or(LogError::TimestampOutOfRange)?;

        Ok(Self {
            out,
            path,
            header_offset,
            session,
            written_tokens: HashSet::new(),
            written_objects: HashSet::new(),
            record: Vec::with_capacity(64),
            current: whole_second,
            start: whole_second,
            pointer_size: None,
            records: 0,
        })
    }

    pub fn session(&self) -> &TokenSession {
        &self.session
    }

    /// Start time as written to the header.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// The pointer width declared so far, `None` until a `%p` was written.
    pub fn pointer_size(&self) -> Option<PointerSize> {
        self.pointer_size
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Appends one record.
    ///
    /// Validation happens before anything is written, so a rejected record
    /// leaves the output and the encoder exactly as they were.
    ///
    /// # Errors
    ///
    /// `MissingToken` when the record has no domain (text records cannot be
    /// represented) or its format string has ID 0, which readers take as
    /// "no format". `PointerSizeMismatch` when a pointer argument disagrees
    /// with the width already declared, `SessionMismatch` for token
    /// arguments normalized by another merge.
    pub fn write_line(&mut self, line: &LogLine) -> Result<()> {
        let domain = line.domain().ok_or(LogError::MissingToken("domain"))?;
        if line.format().is_some_and(|format| format.id() == 0) {
            return Err(LogError::MissingToken("format string ID"));
        }
        let declare = self.check_arguments(line)?;
        let (elapsed, current) = self.elapsed_to(line.time())?;

        // IDs first used by this record, committed after the write
        let mut fresh_tokens = HashSet::new();
        let mut fresh_object = None;

        let mut record = std::mem::take(&mut self.record);
        record.clear();
        write_varint(&mut record, elapsed)?;
        record.push(line.level().as_byte());
        self.encode_token(&mut record, domain, &mut fresh_tokens)?;
        match line.object().filter(|object| object.id() != 0) {
            Some(object) => {
                write_varint(&mut record, object.id())?;
                if !self.written_objects.contains(&object.id()) {
                    write_literal(&mut record, object.value())?;
                    fresh_object = Some(object.id());
                }
            }
            None => write_varint(&mut record, 0)?,
        }
        match line.format() {
            Some(format) => self.encode_token(&mut record, format, &mut fresh_tokens)?,
            None => write_varint(&mut record, 0)?,
        }
        for argument in line.arguments() {
            argument.write_to(&mut record, |id| {
                !self.written_tokens.contains(&id) && fresh_tokens.insert(id)
            })?;
        }

        let written = self.write_record(&record, declare);
        self.record = record;
        written.map_err(|e| LogError::io_at(self.path.as_deref(), e))?;

        if let Some(size) = declare {
            self.pointer_size = Some(size);
            debug!(pointer_size = size.bytes(), "patched header pointer size");
        }
        self.written_tokens.extend(fresh_tokens);
        self.written_objects.extend(fresh_object);
        self.current = current;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(|e| LogError::io_at(self.path.as_deref(), e))
    }

    /// Flushes and returns the output.
    pub fn finish(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.out)
    }

    /// Checks session tags and pointer widths. Returns the width to declare
    /// in the header when this record holds the first `%p` argument.
    fn check_arguments(&self, line: &LogLine) -> Result<Option<PointerSize>> {
        let mut declared = self.pointer_size;
        let mut declare = None;
        for argument in line.arguments() {
            if let LogArgument::Token(token) = argument {
                self.session.check(token.session())?;
            }
            let Some(size) = argument.pointer_size() else {
                continue;
            };
            match declared {
                Some(width) if width == size => {}
                Some(width) => {
                    return Err(LogError::PointerSizeMismatch {
                        header: width.bytes(),
                        argument: size.bytes(),
                    })
                }
                None => {
                    declared = Some(size);
                    declare = Some(size);
                }
            }
        }
        Ok(declare)
    }

    /// Microseconds since the previous record, and the clock after it.
    ///
    /// The clock advances by exactly what was written, so truncating to
    /// microseconds never accumulates drift. Out of order records are
    /// written with an elapsed time of zero.
    fn elapsed_to(&self, time: DateTime<Utc>) -> Result<(u64, DateTime<Utc>)> {
        let micros = (time - self.current)
            .num_microseconds()
            .ok_or(LogError::TimestampOutOfRange)?;
        if micros < 0 {
            warn!(%time, previous = %self.current, "record is older than its predecessor, writing zero elapsed");
            return Ok((0, self.current));
        }

        let current = self
            .current
            .checked_add_signed(TimeDelta::microseconds(micros))
            .ok_or(LogError::TimestampOutOfRange)?;
        Ok((micros as u64, current))
    }

    fn encode_token(&self, record: &mut Vec<u8>, token: &TokenString, fresh: &mut HashSet<u64>) -> io::Result<()> {
        write_varint(record, token.id())?;
        if !self.written_tokens.contains(&token.id()) && fresh.insert(token.id()) {
            write_literal(record, token.value())?;
        }
        Ok(())
    }

    fn write_record(&mut self, record: &[u8], declare: Option<PointerSize>) -> io::Result<()> {
        self.out.write_all(record)?;
        if let Some(size) = declare {
            let resume = self.out.stream_position()?;
            self.out.seek(SeekFrom::Start(self.header_offset + POINTER_SIZE_OFFSET))?;
            self.out.write_all(&[size.bytes()])?;
            self.out.seek(SeekFrom::Start(resume))?;
        }
        Ok(())
    }
}
