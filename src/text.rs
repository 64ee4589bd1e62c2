//! Reader for plain-text logs.
//!
//! Text logs come one file per level per run, named
//! `<prefix>_<level>_<startMillis>.<ext>`. The first line is a banner
//! starting with `----`; every later line is `HH:MM:SS[.fffffff]|message`,
//! where the time is the time of day. A time earlier than the previous
//! line's means midnight was crossed.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Local, NaiveTime, TimeDelta, TimeZone, Utc};

use crate::error::{LogError, Result};
use crate::record::{LogLevel, LogLine};

/// Prefix of the banner line at the top of every text log.
pub const BANNER_PREFIX: &str = "----";

/// Level and start time encoded in a text log's file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLogName {
    pub level: LogLevel,
    pub start: DateTime<Utc>,
}

impl TextLogName {
    /// Parses `<prefix>_<level>_<startMillis>.<ext>`.
    pub fn parse(path: &Path) -> Result<Self> {
        let unrecognized = || LogError::UnrecognizedFileName(path.to_path_buf());
        let stem = path.file_stem().and_then(|stem| stem.to_str()).ok_or_else(unrecognized)?;

        let parts: Vec<&str> = stem.split('_').collect();
        let [_, level, millis] = parts.as_slice() else {
            return Err(unrecognized());
        };

        let level = LogLevel::from_file_tag(level).ok_or_else(unrecognized)?;
        let start = millis
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(unrecognized)?;
        Ok(Self { level, start })
    }
}

/// Sequential reader producing text-only `LogLine`s.
pub struct TextLogReader<R> {
    input: R,
    level: LogLevel,
    day_start: DateTime<Utc>,
    days: i32,
    last_offset: TimeDelta,
    buf: Vec<u8>,
    failed: bool,
}

impl TextLogReader<BufReader<File>> {
    /// Opens a text log, taking level and start time from its file name.
    pub fn open(path: impl AsRef<Path>, use_utc: bool) -> Result<Self> {
        let path = path.as_ref();
        let name = TextLogName::parse(path)?;
        let file = File::open(path).map_err(|e| LogError::at(path, e))?;
        Ok(Self::new(BufReader::new(file), name.start, name.level, use_utc))
    }
}

impl<R: BufRead> TextLogReader<R> {
    /// Wraps `input`. Times are counted from midnight of the day `start`
    /// falls on, in UTC or local time per `use_utc`.
    pub fn new(input: R, start: DateTime<Utc>, level: LogLevel, use_utc: bool) -> Self {
        Self {
            input,
            level,
            day_start: start_of_day(start, use_utc),
            days: 0,
            last_offset: TimeDelta::zero(),
            buf: Vec::new(),
            failed: false,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Midnight of the file's first day.
    pub fn day_start(&self) -> DateTime<Utc> {
        self.day_start
    }

    /// Reads the next line, `Ok(None)` at end of input.
    pub fn read_line(&mut self) -> Result<Option<LogLine>> {
        self.buf.clear();
        if self.input.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        let raw = String::from_utf8_lossy(&self.buf).into_owned();

        if raw.starts_with(BANNER_PREFIX) {
            return Ok(Some(LogLine::text(self.day_start, self.level, raw)));
        }

        // A line without a separator belongs to the previous timestamp
        let (offset, message) = match raw.split_once('|') {
            Some((stamp, message)) => (parse_time_of_day(stamp)?, message.to_string()),
            None => (self.last_offset, raw),
        };

        if offset < self.last_offset {
            self.days += 1;
        }
        self.last_offset = offset;

        let time = self
            .day_start
            .checked_add_signed(TimeDelta::days(self.days as i64))
            .and_then(|day| day.checked_add_signed(offset))
            .ok_or(LogError::TimestampOutOfRange)?;
        Ok(Some(LogLine::text(time, self.level, message)))
    }
}

impl<R: BufRead> Iterator for TextLogReader<R> {
    type Item = Result<LogLine>;

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

/// Midnight of the day `time` falls on, in UTC or local time.
pub fn start_of_day(time: DateTime<Utc>, use_utc: bool) -> DateTime<Utc> {
    let utc_midnight = time.date_naive().and_time(NaiveTime::MIN).and_utc();
    if use_utc {
        return utc_midnight;
    }

    let midnight = time.with_timezone(&Local).date_naive().and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(utc_midnight)
}

/// Parses an elapsed time of day: `[d.]HH:MM:SS[.f{1,7}]`, optionally
/// followed by a `Z` marking UTC.
pub fn parse_time_of_day(text: &str) -> Result<TimeDelta> {
    let invalid = || LogError::InvalidTimestamp(text.to_string());
    let trimmed = text.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);

    // A day count may precede the clock, separated by a dot
    let colon = trimmed.find(':').ok_or_else(invalid)?;
    let (days, clock) = match trimmed[..colon].split_once('.') {
        Some((days, _)) => (parse_digits(days).ok_or_else(invalid)?, &trimmed[days.len() + 1..]),
        None => (0, trimmed),
    };

    let (hms, fraction) = clock.split_once('.').unwrap_or((clock, ""));
    let mut fields = hms.split(':');
    let (Some(hours), Some(minutes), Some(seconds), None) = (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(invalid());
    };

    let hours = parse_digits(hours).filter(|h| *h < 24).ok_or_else(invalid)?;
    let minutes = parse_digits(minutes).filter(|m| *m < 60).ok_or_else(invalid)?;
    let seconds = parse_digits(seconds).filter(|s| *s < 60).ok_or_else(invalid)?;

    // Fractions carry up to seven digits (100ns units)
    let nanos = if clock.contains('.') {
        if fraction.is_empty() || fraction.len() > 7 {
            return Err(invalid());
        }
        let digits = parse_digits(fraction).ok_or_else(invalid)?;
        digits * 10i64.pow(9 - fraction.len() as u32)
    } else {
        0
    };

    let total_seconds = days
        .checked_mul(86_400)
        .and_then(|d| d.checked_add(hours * 3_600 + minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    TimeDelta::try_seconds(total_seconds)
        .and_then(|delta| delta.checked_add(&TimeDelta::nanoseconds(nanos)))
        .ok_or_else(invalid)
}

fn parse_digits(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
