//! Time-ordered buffer that merges records from any number of sources.

use std::collections::{BTreeMap, HashMap};
use std::io::{Seek, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::argument::LogArgument;
use crate::encoder::LogEncoder;
use crate::error::Result;
use crate::record::LogLine;
use crate::token::{TokenSession, TokenString};

/// Records from several logs, ordered by time and then by arrival.
///
/// Every source numbers its own domain and format tokens, so the same ID
/// can mean different strings in different files. Before the buffer is
/// iterated, `normalize` renumbers those tokens from one shared table and
/// binds `%-s` arguments to a fresh [`TokenSession`]. Object tokens keep
/// the IDs their source gave them.
///
/// Adding records after a normalization invalidates it; the next iteration
/// normalizes again.
///
/// # Examples
///
/// ```no_run
/// # use log_merge::{LogDecoder, LogLineCollection};
/// # fn example() -> log_merge::Result<()> {
/// let mut merged = LogLineCollection::new();
/// for path in ["a.cbllog", "b.cbllog"] {
///     for line in LogDecoder::open(path)? {
///         merged.add(line?);
///     }
/// }
/// for line in merged.iter() {
///     println!("{} {}", line.time(), line.message());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LogLineCollection {
    lines: BTreeMap<DateTime<Utc>, Vec<LogLine>>,
    len: usize,
    session: TokenSession,
    normalized: bool,
}

impl LogLineCollection {
    pub fn new() -> Self {
        Self {
            lines: BTreeMap::new(),
            len: 0,
            session: TokenSession::new(),
            normalized: false,
        }
    }

    /// Inserts a record after any others with the same time.
    pub fn add(&mut self, line: LogLine) {
        self.lines.entry(line.time()).or_default().push(line);
        self.len += 1;
        self.normalized = false;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether a record with the same time and message is present.
    pub fn contains(&self, line: &LogLine) -> bool {
        self.lines
            .get(&line.time())
            .is_some_and(|bucket| bucket.contains(line))
    }

    /// Removes the first record equal to `line`, returning it.
    pub fn remove(&mut self, line: &LogLine) -> Option<LogLine> {
        let bucket = self.lines.get_mut(&line.time())?;
        let index = bucket.iter().position(|candidate| candidate == line)?;
        let removed = bucket.remove(index);
        if bucket.is_empty() {
            self.lines.remove(&line.time());
        }
        self.len -= 1;
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.len = 0;
        self.normalized = false;
    }

    /// Session of the latest normalization.
    pub fn session(&self) -> &TokenSession {
        &self.session
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Renumbers domain, format and `%-s` tokens from one table shared by
    /// all sources. Does nothing if the buffer has not changed since the
    /// last run.
    pub fn normalize(&mut self) {
        if self.normalized {
            return;
        }

        self.session = TokenSession::new();
        let session_id = self.session.id();

        let mut ids: HashMap<Arc<str>, u64> = HashMap::new();
        let mut renumber = |token: &mut TokenString| {
            let next = ids.len() as u64 + 1;
            let id = *ids.entry(token.shared_value()).or_insert(next);
            token.set_id(id);
        };

        for line in self.lines.values_mut().flatten() {
            if let Some(domain) = line.domain.as_mut() {
                renumber(domain);
            }
            if let Some(format) = line.format.as_mut() {
                renumber(format);
            }
            for argument in &mut line.arguments {
                if let LogArgument::Token(arg) = argument {
                    renumber(&mut arg.token);
                    arg.bind(session_id);
                }
            }
        }

        debug!(records = self.len, tokens = ids.len(), session = session_id, "normalized merge buffer");
        self.normalized = true;
    }

    /// Normalizes if needed, then yields records in time order.
    pub fn iter(&mut self) -> impl Iterator<Item = &LogLine> + '_ {
        self.normalize();
        self.lines.values().flatten()
    }

    /// Normalizes if needed, then starts an encoder bound to this buffer's
    /// session. Each encoder tracks its own written literals, so the buffer
    /// can be encoded any number of times.
    pub fn encoder<W: Write + Seek>(&mut self, out: W, start: DateTime<Utc>) -> Result<LogEncoder<W>> {
        self.normalize();
        LogEncoder::with_session(out, start, self.session)
    }
}

impl Default for LogLineCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<LogLine> for LogLineCollection {
    fn extend<I: IntoIterator<Item = LogLine>>(&mut self, iter: I) {
        for line in iter {
            self.add(line);
        }
    }
}
