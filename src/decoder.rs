//! Reader for binary log files.
//!
//! File layout (all integers little-endian, varints base-128):
//!
//! ```text
//! Header:
//!   magic            CF B2 AB 1B
//!   version          [byte]      always 1
//!   pointer size     [byte]      4 or 8
//!   start time       [varint]    seconds since the Unix epoch
//!
//! Record, repeated until EOF:
//!   elapsed          [varint]    microseconds since the previous record
//!   severity         [byte]      0=debug .. 4=error
//!   domain           [token]     0 is an ordinary ID
//!   object           [token]     numbered from 1, 0 = none, never a literal
//!   format string    [token]     0 = none
//!   arguments                    as implied by the format string
//!
//! token = [varint id] followed by [nul-terminated UTF-8] on first use only
//! ```
//!
//! Domains, format strings and `%-s` arguments share one token ID space.
//! There is no trailer: end of file right before a record is the clean end.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::argument::{LogArgument, PointerSize};
use crate::error::{LogError, Result};
use crate::format::{ArgKind, FormatString};
use crate::record::{LogLevel, LogLine};
use crate::token::{TokenString, TokenTable, ZeroId};
use crate::varint::{read_f64_le, read_signed, read_u32_le, read_u64_le, read_u8, read_varint};

/// Magic number at the start of every binary log.
pub const LOG_MAGIC: [u8; 4] = [0xCF, 0xB2, 0xAB, 0x1B];

/// The only format version this crate reads and writes.
pub const LOG_VERSION: u8 = 1;

/// Byte offset of the pointer size within the header.
pub(crate) const POINTER_SIZE_OFFSET: u64 = 5;

/// Sequential decoder for one binary log.
///
/// Each decoder owns its input and token tables exclusively, so separate
/// files can be decoded on separate threads.
///
/// # Examples
///
/// ```
/// # use log_merge::LogDecoder;
/// # fn example() -> log_merge::Result<()> {
/// let mut decoder = LogDecoder::open("cbl_info.cbllog")?;
/// while let Some(line) = decoder.read_line()? {
///     println!("{} {}", line.time(), line.message());
/// }
/// # Ok(())
/// # }
/// ```
pub struct LogDecoder<R> {
    input: BufReader<R>,
    version: u8,
    pointer_size: PointerSize,
    start: DateTime<Utc>,
    current: DateTime<Utc>,
    tokens: TokenTable,
    objects: TokenTable,
    formats: HashMap<u64, Arc<FormatString>>,
    records: u64,
    failed: bool,
}

impl LogDecoder<File> {
    /// Opens the binary log at `path` and reads its header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| LogError::at(path, e))?;
        Self::new(file)
    }
}

impl<R: Read> LogDecoder<R> {
    /// Wraps `reader` and consumes the file header.
    ///
    /// # Errors
    ///
    /// `InvalidMagic`, `UnsupportedVersion` or `InvalidPointerSize` for a
    /// bad header, `TruncatedHeader` if the input ends inside it.
    pub fn new(reader: R) -> Result<Self> {
        let mut input = BufReader::new(reader);

        let mut magic = [0u8; 4];
        input.read_exact(&mut magic).map_err(header_error)?;
        if magic != LOG_MAGIC {
            return Err(LogError::InvalidMagic(magic));
        }

        let version = read_u8(&mut input).map_err(header_error)?;
        if version != LOG_VERSION {
            return Err(LogError::UnsupportedVersion(version));
        }

        let size_byte = read_u8(&mut input).map_err(header_error)?;
        let pointer_size = PointerSize::from_byte(size_byte).ok_or(LogError::InvalidPointerSize(size_byte))?;

        let start_secs = read_varint(&mut input).map_err(header_error)?;
        let start = i64::try_from(start_secs)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(LogError::TimestampOutOfRange)?;

        debug!(version, pointer_size = pointer_size.bytes(), %start, "opened binary log");

        Ok(Self {
            input,
            version,
            pointer_size,
            start,
            current: start,
            tokens: TokenTable::new(),
            objects: TokenTable::new(),
            formats: HashMap::new(),
            records: 0,
            failed: false,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn pointer_size(&self) -> PointerSize {
        self.pointer_size
    }

    /// Start time from the header, whole seconds.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Number of records decoded so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// True when the input sits exactly at end of file.
    pub fn is_finished(&mut self) -> Result<bool> {
        Ok(self.input.fill_buf()?.is_empty())
    }

    /// Decodes the next record.
    ///
    /// Returns `Ok(None)` when the input ends cleanly between records. Running
    /// out of data anywhere inside a record is `Truncated`.
    pub fn read_line(&mut self) -> Result<Option<LogLine>> {
        if self.is_finished()? {
            return Ok(None);
        }

        let record = self.records;
        let line = self.read_record().map_err(|e| classify(e, record))?;
        self.records += 1;
        Ok(Some(line))
    }

    fn read_record(&mut self) -> Result<LogLine> {
        // Elapsed time since the previous record, in microseconds
        let elapsed = read_varint(&mut self.input)?;
        let elapsed = i64::try_from(elapsed).map_err(|_| LogError::TimestampOutOfRange)?;
        self.current = self
            .current
            .checked_add_signed(TimeDelta::microseconds(elapsed))
            .ok_or(LogError::TimestampOutOfRange)?;

        let severity = read_u8(&mut self.input)?;
        let level = LogLevel::from_byte(severity).ok_or(LogError::InvalidLevel(severity))?;

        let domain = self.tokens.resolve_required(&mut self.input)?;
        let object = self.objects.resolve(&mut self.input, ZeroId::Absent)?;
        let format = self.tokens.resolve(&mut self.input, ZeroId::Absent)?;

        // A record without a format string has no arguments and no text
        let (arguments, message) = match &format {
            Some(token) => {
                let parsed = self.parsed_format(token)?;
                let arguments = self.read_arguments(&parsed)?;
                let message = parsed.render(&arguments)?;
                (arguments, message)
            }
            None => (Vec::new(), String::new()),
        };

        Ok(LogLine::from_parts(
            self.current,
            level,
            Some(domain),
            object,
            format,
            arguments,
            message,
        ))
    }

    /// Format strings repeat constantly, so each ID is scanned once.
    fn parsed_format(&mut self, token: &TokenString) -> Result<Arc<FormatString>> {
        if let Some(parsed) = self.formats.get(&token.id()) {
            return Ok(Arc::clone(parsed));
        }
        let parsed = Arc::new(FormatString::parse(token.value())?);
        self.formats.insert(token.id(), Arc::clone(&parsed));
        Ok(parsed)
    }

    fn read_arguments(&mut self, parsed: &FormatString) -> Result<Vec<LogArgument>> {
        let mut arguments = Vec::with_capacity(parsed.argument_count());
        for kind in parsed.argument_kinds() {
            let argument = match kind {
                ArgKind::Char | ArgKind::Signed => {
                    let (magnitude, negative) = read_signed(&mut self.input)?;
                    LogArgument::SignedVarint { magnitude, negative }
                }
                ArgKind::Unsigned | ArgKind::Hex => LogArgument::Varint(read_varint(&mut self.input)?),
                ArgKind::Double => LogArgument::Double(read_f64_le(&mut self.input)?),
                ArgKind::Pointer => {
                    let value = match self.pointer_size {
                        PointerSize::Four => read_u32_le(&mut self.input)? as u64,
                        PointerSize::Eight => read_u64_le(&mut self.input)?,
                    };
                    LogArgument::pointer(value, self.pointer_size)
                }
                ArgKind::Token => LogArgument::token(self.tokens.resolve_required(&mut self.input)?),
                ArgKind::Bytes | ArgKind::HexBytes => LogArgument::Bytes(self.read_sized_bytes()?),
            };
            arguments.push(argument);
        }
        Ok(arguments)
    }

    fn read_sized_bytes(&mut self) -> Result<Vec<u8>> {
        let len = read_varint(&mut self.input)?;
        let mut bytes = Vec::new();
        // take() bounds the allocation by what the input actually holds
        (&mut self.input).take(len).read_to_end(&mut bytes)?;
        if (bytes.len() as u64) < len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(bytes)
    }
}

impl<R: Read> Iterator for LogDecoder<R> {
    type Item = Result<LogLine>;

    /// Yields records until the end of the file. After the first error the
    /// decoder yields nothing further.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_line() {
            Ok(line) => line.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

fn header_error(e: io::Error) -> LogError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => LogError::TruncatedHeader,
        io::ErrorKind::InvalidData => LogError::VarintOverflow,
        _ => LogError::Io(e),
    }
}

/// Maps low level read failures inside a record to format errors.
fn classify(e: LogError, record: u64) -> LogError {
    match e {
        LogError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => LogError::Truncated { record },
        LogError::Io(io) if io.kind() == io::ErrorKind::InvalidData => LogError::VarintOverflow,
        other => other,
    }
}
