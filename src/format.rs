//! printf-style format strings as used by the binary log format.
//!
//! The binary format carries no per-argument type tags: the wire layout of a
//! record's arguments is implied by the conversions in its format string.
//! `FormatString::parse` scans the string once and records, for every
//! conversion, which typed argument it reads. The same parsed form drives
//! rendering, so decoded and hand-built records produce text the same way.

use std::fmt::Write as _;

use crate::argument::LogArgument;
use crate::error::{LogError, Result};

/// Flag characters skipped after `%` (a leading `-` is handled first).
const FLAGS: &[char] = &['#', '0', '-', ' ', '+', '\''];

/// Length modifiers, which never change the wire representation.
const LENGTH_MODIFIERS: &[char] = &['h', 'l', 'j', 't', 'z', 'q'];

/// What a conversion reads from the wire and how it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `%c`: signed varint rendered as a character.
    Char,
    /// `%d %i`: signed varint rendered in decimal.
    Signed,
    /// `%u`: unsigned varint rendered in decimal.
    Unsigned,
    /// `%x %X`: unsigned varint rendered as uppercase hex.
    Hex,
    /// `%e %E %f %F %g %G %a %A`: little-endian double.
    Double,
    /// `%p`: pointer-sized little-endian integer.
    Pointer,
    /// `%-s %-@`: token reference rendered as its literal.
    Token,
    /// `%s %@ %.*s`: length-prefixed bytes rendered as UTF-8.
    Bytes,
    /// `%-.*s`: length-prefixed bytes rendered as uppercase hex.
    HexBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied to the output as is (`%%` already folded in).
    Literal(String),
    /// A conversion consuming one argument.
    Argument(ArgKind),
}

/// A parsed format string.
#[derive(Debug, Clone)]
pub struct FormatString {
    text: String,
    segments: Vec<Segment>,
}

impl FormatString {
    /// Scans `format` for conversions.
    ///
    /// A conversion is `%`, an optional `-`, further flags, width digits, an
    /// optional `.` with precision digits or `*`, length modifiers, and the
    /// conversion character. A `-` only counts when it directly follows the
    /// `%`. Any conversion character outside the table, or a `%` at the end
    /// of the string, is an error.
    pub fn parse(format: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }

            let minus = chars.next_if_eq(&'-').is_some();
            while chars.next_if(|c| FLAGS.contains(c)).is_some() {}
            while chars.next_if(char::is_ascii_digit).is_some() {}

            let mut dot_star = false;
            if chars.next_if_eq(&'.').is_some() {
                if chars.next_if_eq(&'*').is_some() {
                    dot_star = true;
                } else {
                    while chars.next_if(char::is_ascii_digit).is_some() {}
                }
            }
            while chars.next_if(|c| LENGTH_MODIFIERS.contains(c)).is_some() {}

            let kind = match chars.next() {
                Some('%') => {
                    literal.push('%');
                    continue;
                }
                Some('c') => ArgKind::Char,
                Some('d' | 'i') => ArgKind::Signed,
                Some('x' | 'X') => ArgKind::Hex,
                Some('u') => ArgKind::Unsigned,
                Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | 'a' | 'A') => ArgKind::Double,
                Some('p') => ArgKind::Pointer,
                Some('s' | '@') if minus && !dot_star => ArgKind::Token,
                Some('s' | '@') if minus => ArgKind::HexBytes,
                Some('s' | '@') => ArgKind::Bytes,
                other => {
                    return Err(LogError::UnknownConversion {
                        conversion: other,
                        format: format.to_string(),
                    })
                }
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Argument(kind));
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            text: format.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The argument kinds in wire order.
    pub fn argument_kinds(&self) -> impl Iterator<Item = ArgKind> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Argument(kind) => Some(*kind),
            Segment::Literal(_) => None,
        })
    }

    pub fn argument_count(&self) -> usize {
        self.argument_kinds().count()
    }

    /// Renders the format with `arguments` substituted.
    ///
    /// Fails if the number or variants of the arguments do not match the
    /// conversions.
    pub fn render(&self, arguments: &[LogArgument]) -> Result<String> {
        let mut out = String::with_capacity(self.text.len());
        let mut arguments = arguments.iter();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Argument(kind) => {
                    let rendered = arguments
                        .next()
                        .is_some_and(|argument| argument.render(*kind, &mut out));
                    if !rendered {
                        return Err(self.mismatch());
                    }
                }
            }
        }

        if arguments.next().is_some() {
            return Err(self.mismatch());
        }
        Ok(out)
    }

    fn mismatch(&self) -> LogError {
        LogError::ArgumentMismatch {
            format: self.text.clone(),
        }
    }
}

/// Appends `bytes` as uppercase hex with no separators.
pub(crate) fn push_hex(out: &mut String, bytes: &[u8]) {
    for byte in bytes {
        let _ = write!(out, "{:02X}", byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenString;

    fn kinds(format: &str) -> Vec<ArgKind> {
        FormatString::parse(format).unwrap().argument_kinds().collect()
    }

    #[test]
    fn test_conversion_table() {
        assert_eq!(kinds("%c %d %i"), vec![ArgKind::Char, ArgKind::Signed, ArgKind::Signed]);
        assert_eq!(kinds("%x %X %u"), vec![ArgKind::Hex, ArgKind::Hex, ArgKind::Unsigned]);
        assert_eq!(kinds("%e%E%f%F%g%G%a%A").len(), 8);
        assert!(kinds("%e%E%f%F%g%G%a%A").iter().all(|k| *k == ArgKind::Double));
        assert_eq!(kinds("%p"), vec![ArgKind::Pointer]);
    }

    #[test]
    fn test_minus_flag_overloads_string_conversions() {
        assert_eq!(kinds("%s %@"), vec![ArgKind::Bytes, ArgKind::Bytes]);
        assert_eq!(kinds("%.*s"), vec![ArgKind::Bytes]);
        assert_eq!(kinds("%-s %-@"), vec![ArgKind::Token, ArgKind::Token]);
        assert_eq!(kinds("%-.*s"), vec![ArgKind::HexBytes]);
        assert_eq!(kinds("%-.8s"), vec![ArgKind::Token]);
        // Only a minus right after the percent sign counts
        assert_eq!(kinds("%0-s"), vec![ArgKind::Bytes]);
    }

    #[test]
    fn test_flags_width_precision_and_modifiers_are_skipped() {
        assert_eq!(kinds("%-08.3lld"), vec![ArgKind::Signed]);
        assert_eq!(kinds("%+ #'12zu"), vec![ArgKind::Unsigned]);
        assert_eq!(kinds("%.2f%%"), vec![ArgKind::Double]);
        assert_eq!(kinds("%hhx %jd %td %qu"), vec![ArgKind::Hex, ArgKind::Signed, ArgKind::Signed, ArgKind::Unsigned]);
    }

    #[test]
    fn test_literal_percent_and_segments() {
        let format = FormatString::parse("100%% of %d items").unwrap();
        assert_eq!(
            format.segments(),
            &[
                Segment::Literal("100% of ".to_string()),
                Segment::Argument(ArgKind::Signed),
                Segment::Literal(" items".to_string()),
            ]
        );
        assert_eq!(format.argument_count(), 1);
        assert_eq!(format.as_str(), "100%% of %d items");
    }

    #[test]
    fn test_unknown_conversion_is_error() {
        match FormatString::parse("value=%k") {
            Err(LogError::UnknownConversion { conversion, format }) => {
                assert_eq!(conversion, Some('k'));
                assert_eq!(format, "value=%k");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(matches!(
            FormatString::parse("trailing %"),
            Err(LogError::UnknownConversion { conversion: None, .. })
        ));
    }

    #[test]
    fn test_non_ascii_text_survives() {
        let format = FormatString::parse("größe=%u ✓").unwrap();
        let text = format.render(&[LogArgument::Varint(3)]).unwrap();
        assert_eq!(text, "größe=3 ✓");
    }

    #[test]
    fn test_render_checks_arguments() {
        let format = FormatString::parse("%d/%-s").unwrap();
        let good = [LogArgument::signed(-2), LogArgument::token(TokenString::new(1, "db"))];
        assert_eq!(format.render(&good).unwrap(), "-2/db");

        let too_few = [LogArgument::signed(1)];
        assert!(matches!(format.render(&too_few), Err(LogError::ArgumentMismatch { .. })));

        let wrong_kind = [LogArgument::Varint(1), LogArgument::token(TokenString::new(1, "db"))];
        assert!(format.render(&wrong_kind).is_err());

        let too_many = [good[0].clone(), good[1].clone(), LogArgument::Varint(9)];
        assert!(format.render(&too_many).is_err());
    }
}
