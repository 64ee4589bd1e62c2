//! Token deduplication for the binary log format.
//!
//! Repeated strings (domain names, format strings, `%-s` arguments, object
//! descriptions) are written once with their numeric ID and referenced by ID
//! alone afterwards. Decoding keeps one `TokenTable` per namespace; encoding
//! tracks which IDs it already wrote itself.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::LogError;
use crate::varint::read_varint;

/// Counter for session IDs. Starts at 1 so 0 never names a session.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A deduplicated string: a numeric ID plus its literal value.
///
/// Two tokens with the same ID are the same entity, whatever their literal.
/// The literal is shared, so cloning a token is cheap.
#[derive(Clone, Debug)]
pub struct TokenString {
    id: u64,
    value: Arc<str>,
}

impl TokenString {
    pub fn new(id: u64, value: impl Into<Arc<str>>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub(crate) fn shared_value(&self) -> Arc<str> {
        Arc::clone(&self.value)
    }

    pub(crate) fn set_id(&mut self, id: u64) {
        self.id = id;
    }
}

impl PartialEq for TokenString {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TokenString {}

impl fmt::Display for TokenString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// How a namespace treats ID 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroId {
    /// 0 is an ordinary ID and carries a literal on first use (domains).
    Literal,
    /// 0 means "no token": no literal follows and nothing is cached
    /// (objects, format strings).
    Absent,
}

/// Decode-side cache of the tokens seen so far in one namespace.
///
/// The first time an ID appears, its nul-terminated literal follows on the
/// wire. Every later occurrence is the ID alone.
#[derive(Debug, Default)]
pub struct TokenTable {
    seen: HashMap<u64, TokenString>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads one token reference, consuming its literal on first use.
    ///
    /// Returns `None` only for ID 0 under `ZeroId::Absent`.
    pub fn resolve<R: BufRead + ?Sized>(
        &mut self,
        input: &mut R,
        zero: ZeroId,
    ) -> io::Result<Option<TokenString>> {
        let id = read_varint(input)?;
        if id == 0 && zero == ZeroId::Absent {
            return Ok(None);
        }
        self.lookup_or_read(id, input).map(Some)
    }

    /// Like `resolve` with `ZeroId::Literal`, which always yields a token.
    pub fn resolve_required<R: BufRead + ?Sized>(&mut self, input: &mut R) -> io::Result<TokenString> {
        let id = read_varint(input)?;
        self.lookup_or_read(id, input)
    }

    fn lookup_or_read<R: BufRead + ?Sized>(&mut self, id: u64, input: &mut R) -> io::Result<TokenString> {
        if let Some(token) = self.seen.get(&id) {
            return Ok(token.clone());
        }

        let token = TokenString::new(id, read_literal(input)?);
        self.seen.insert(id, token.clone());
        Ok(token)
    }

    pub fn get(&self, id: u64) -> Option<&TokenString> {
        self.seen.get(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Reads a nul-terminated UTF-8 literal. Invalid UTF-8 is replaced.
pub fn read_literal<R: BufRead + ?Sized>(input: &mut R) -> io::Result<String> {
    let mut bytes = Vec::new();
    input.read_until(0, &mut bytes)?;
    if bytes.pop() != Some(0) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "token literal is missing its terminator",
        ));
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn write_literal<W: Write + ?Sized>(out: &mut W, value: &str) -> io::Result<()> {
    out.write_all(value.as_bytes())?;
    out.write_all(&[0])
}

/// Identity of one merge's token numbering.
///
/// A merge renumbers `%-s` arguments and tags them with its session ID. An
/// encoder bound to a session rejects arguments tagged by any other, since
/// their IDs mean nothing in its numbering. Which literals were already
/// written is tracked by each encoder, not by the session, so one session
/// can back any number of outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TokenSession {
    id: u64,
}

impl TokenSession {
    pub fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fails with `SessionMismatch` when `tag` names another session.
    /// Untagged arguments are accepted.
    pub fn check(&self, tag: Option<u64>) -> Result<(), LogError> {
        match tag {
            Some(found) if found != self.id => Err(LogError::SessionMismatch {
                expected: self.id,
                found,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for TokenSession {
    fn default() -> Self {
        Self::new()
    }
}
