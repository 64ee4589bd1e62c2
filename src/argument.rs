use std::fmt::Write as _;
use std::io::{self, Write};

use crate::format::{push_hex, ArgKind};
use crate::token::{write_literal, TokenString};
use crate::varint::{write_f64_le, write_signed, write_u32_le, write_u64_le, write_varint};

/// Width of `%p` arguments, as declared in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerSize {
    Four,
    Eight,
}

impl PointerSize {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            4 => Some(PointerSize::Four),
            8 => Some(PointerSize::Eight),
            _ => None,
        }
    }

    pub fn bytes(self) -> u8 {
        match self {
            PointerSize::Four => 4,
            PointerSize::Eight => 8,
        }
    }
}

/// A `%-s` argument: a token reference, optionally tagged with the merge
/// session that assigned its ID.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenArgument {
    pub token: TokenString,
    session: Option<u64>,
}

impl TokenArgument {
    pub fn new(token: TokenString) -> Self {
        Self { token, session: None }
    }

    /// ID of the merge session that normalized this token, if any.
    pub fn session(&self) -> Option<u64> {
        self.session
    }

    pub(crate) fn bind(&mut self, session: u64) {
        self.session = Some(session);
    }
}

/// One typed argument of a log record, kept exactly as it was on the wire so
/// a record can be re-encoded without re-parsing its rendered text.
#[derive(Debug, Clone, PartialEq)]
pub enum LogArgument {
    /// `%u %x %X`
    Varint(u64),
    /// `%c %d %i`: magnitude plus explicit sign.
    SignedVarint { magnitude: u64, negative: bool },
    /// `%p`
    LittleEndian { value: u64, size: PointerSize },
    /// `%e %f %g %a` and uppercase forms
    Double(f64),
    /// `%s %.*s %-.*s`
    Bytes(Vec<u8>),
    /// `%-s`
    Token(TokenArgument),
}

impl LogArgument {
    pub fn signed(value: i64) -> Self {
        LogArgument::SignedVarint {
            magnitude: value.unsigned_abs(),
            negative: value < 0,
        }
    }

    pub fn pointer(value: u64, size: PointerSize) -> Self {
        LogArgument::LittleEndian { value, size }
    }

    pub fn token(token: TokenString) -> Self {
        LogArgument::Token(TokenArgument::new(token))
    }

    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        LogArgument::Bytes(bytes.into())
    }

    pub fn pointer_size(&self) -> Option<PointerSize> {
        match self {
            LogArgument::LittleEndian { size, .. } => Some(*size),
            _ => None,
        }
    }

    /// Serializes the argument in its wire form.
    ///
    /// For `%-s` tokens, `first_use` is asked whether the ID still needs its
    /// literal. Session tags are not checked here; see `TokenSession::check`.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W, mut first_use: impl FnMut(u64) -> bool) -> io::Result<()> {
        match self {
            LogArgument::Varint(value) => write_varint(out, *value)?,
            LogArgument::SignedVarint { magnitude, negative } => write_signed(out, *magnitude, *negative)?,
            LogArgument::LittleEndian { value, size } => match size {
                PointerSize::Four => write_u32_le(out, *value as u32)?,
                PointerSize::Eight => write_u64_le(out, *value)?,
            },
            LogArgument::Double(value) => write_f64_le(out, *value)?,
            LogArgument::Bytes(bytes) => {
                write_varint(out, bytes.len() as u64)?;
                out.write_all(bytes)?;
            }
            LogArgument::Token(argument) => {
                let id = argument.token.id();
                write_varint(out, id)?;
                if first_use(id) {
                    write_literal(out, argument.token.value())?;
                }
            }
        }
        Ok(())
    }

    /// Appends the text for conversion `kind`. Returns false when this
    /// argument cannot satisfy that conversion.
    pub fn render(&self, kind: ArgKind, out: &mut String) -> bool {
        match (kind, self) {
            (ArgKind::Signed, LogArgument::SignedVarint { magnitude, negative }) => {
                if *negative && *magnitude != 0 {
                    out.push('-');
                }
                let _ = write!(out, "{}", magnitude);
            }
            (ArgKind::Char, LogArgument::SignedVarint { magnitude, negative }) => {
                let value = if *negative {
                    (*magnitude as i64).wrapping_neg()
                } else {
                    *magnitude as i64
                };
                // Characters are UTF-16 code units; surrogates do not render
                let unit = value as u16;
                out.push(char::from_u32(unit as u32).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            (ArgKind::Unsigned, LogArgument::Varint(value)) => {
                let _ = write!(out, "{}", value);
            }
            (ArgKind::Hex, LogArgument::Varint(value)) => {
                let _ = write!(out, "{:X}", value);
            }
            (ArgKind::Double, LogArgument::Double(value)) => push_double(out, *value),
            (ArgKind::Pointer, LogArgument::LittleEndian { value, size }) => {
                let _ = match size {
                    PointerSize::Four => write!(out, "0x{:08x}", value),
                    PointerSize::Eight => write!(out, "0x{:016x}", value),
                };
            }
            (ArgKind::Token, LogArgument::Token(argument)) => out.push_str(argument.token.value()),
            (ArgKind::Bytes, LogArgument::Bytes(bytes)) => out.push_str(&String::from_utf8_lossy(bytes)),
            (ArgKind::HexBytes, LogArgument::Bytes(bytes)) => push_hex(out, bytes),
            _ => return false,
        }
        true
    }
}

/// Shortest round-trip digits, switching to exponent form (`1E+21`,
/// `1.5E-05`) for magnitudes of 1e15 and up or below 1e-4, the way the
/// producing runtime prints doubles.
fn push_double(out: &mut String, value: f64) {
    if value.is_nan() {
        out.push_str("NaN");
        return;
    }
    if value.is_infinite() {
        out.push_str(if value < 0.0 { "-Infinity" } else { "Infinity" });
        return;
    }

    let magnitude = value.abs();
    if magnitude == 0.0 || (1e-4..1e15).contains(&magnitude) {
        let _ = write!(out, "{}", value);
        return;
    }

    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let _ = write!(out, "{}E{}{:02}", mantissa, sign, exponent.unsigned_abs());
}
