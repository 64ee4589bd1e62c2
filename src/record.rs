use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};

use crate::argument::LogArgument;
use crate::error::Result;
use crate::format::FormatString;
use crate::token::TokenString;

/// Severity of a log record, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    /// Noisy low level detail, debug builds only.
    Debug = 0,
    Verbose = 1,
    Info = 2,
    Warn = 3,
    /// Something has most likely gone wrong.
    Error = 4,
}

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Verbose,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// The level for a wire severity byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.get(byte as usize).copied()
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// The level named by the middle part of a text log's file name.
    pub fn from_file_tag(tag: &str) -> Option<Self> {
        match tag {
            "error" => Some(LogLevel::Error),
            "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "verbose" => Some(LogLevel::Verbose),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// Single letter used at the start of rendered lines.
    pub fn initial(self) -> char {
        match self {
            LogLevel::Debug => 'D',
            LogLevel::Verbose => 'V',
            LogLevel::Info => 'I',
            LogLevel::Warn => 'W',
            LogLevel::Error => 'E',
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "Debug",
            LogLevel::Verbose => "Verbose",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
        };
        f.write_str(name)
    }
}

/// One decoded log record.
///
/// Binary records carry their domain, object, format token and typed
/// arguments so they can be re-encoded losslessly; text records only carry
/// time, level and the already rendered message. Two records are equal when
/// their time and rendered message are equal.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub(crate) time: DateTime<Utc>,
    pub(crate) level: LogLevel,
    pub(crate) domain: Option<TokenString>,
    pub(crate) object: Option<TokenString>,
    pub(crate) format: Option<TokenString>,
    pub(crate) arguments: Vec<LogArgument>,
    pub(crate) message: String,
}

impl LogLine {
    /// Builds a structured record, rendering its message from `format` and
    /// `arguments`.
    ///
    /// # Errors
    ///
    /// `UnknownConversion` for a bad format string, `ArgumentMismatch` when
    /// the arguments do not fit its conversions.
    pub fn new(
        time: DateTime<Utc>,
        level: LogLevel,
        domain: TokenString,
        object: Option<TokenString>,
        format: TokenString,
        arguments: Vec<LogArgument>,
    ) -> Result<Self> {
        let message = FormatString::parse(format.value())?.render(&arguments)?;
        Ok(Self::from_parts(time, level, Some(domain), object, Some(format), arguments, message))
    }

    /// Builds a text-only record.
    pub fn text(time: DateTime<Utc>, level: LogLevel, message: impl Into<String>) -> Self {
        Self::from_parts(time, level, None, None, None, Vec::new(), message.into())
    }

    pub(crate) fn from_parts(
        time: DateTime<Utc>,
        level: LogLevel,
        domain: Option<TokenString>,
        object: Option<TokenString>,
        format: Option<TokenString>,
        arguments: Vec<LogArgument>,
        message: String,
    ) -> Self {
        Self {
            time,
            level,
            domain,
            object,
            format,
            arguments,
            message,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn domain(&self) -> Option<&TokenString> {
        self.domain.as_ref()
    }

    /// The object this record is about, `None` when there is none.
    pub fn object(&self) -> Option<&TokenString> {
        self.object.as_ref()
    }

    pub fn format(&self) -> Option<&TokenString> {
        self.format.as_ref()
    }

    pub fn arguments(&self) -> &[LogArgument] {
        &self.arguments
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq for LogLine {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.message == other.message
    }
}

impl Eq for LogLine {}

impl Hash for LogLine {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.time.hash(state);
        self.message.hash(state);
    }
}
