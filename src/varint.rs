//! Primitive codec shared by the decoder and encoder.
//!
//! Unsigned integers use standard base-128 varints, least significant group
//! first, continuation flag in the high bit. There is no zig-zag: signed
//! values travel as a sign byte (0 or 1) followed by the varint magnitude.
//! Pointers and doubles are fixed width little-endian.

use std::io::{self, Read, Write};

/// A u64 never needs more than this many varint bytes.
pub const MAX_VARINT_BYTES: usize = 10;

/// Writes `value` as a base-128 varint.
pub fn write_varint<W: Write + ?Sized>(out: &mut W, mut value: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_BYTES];
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    out.write_all(&buf[..len])
}

/// Reads a base-128 varint.
///
/// A stream that ends before the final group fails with
/// `UnexpectedEof`; more than ten groups fail with `InvalidData`.
pub fn read_varint<R: Read + ?Sized>(input: &mut R) -> io::Result<u64> {
    let mut result: u64 = 0;
    for i in 0..MAX_VARINT_BYTES {
        let byte = read_u8(input)?;
        let group = (byte & 0x7F) as u64;
        let shift = 7 * i as u32;
        if shift == 63 && group > 1 {
            return Err(overflow());
        }
        result |= group << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(overflow())
}

/// Number of bytes `write_varint` emits for `value`.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Writes a sign byte followed by the varint magnitude.
pub fn write_signed<W: Write + ?Sized>(out: &mut W, magnitude: u64, negative: bool) -> io::Result<()> {
    out.write_all(&[negative as u8])?;
    write_varint(out, magnitude)
}

/// Reads a sign byte and varint magnitude, returning `(magnitude, negative)`.
///
/// Any non-zero sign byte means negative.
pub fn read_signed<R: Read + ?Sized>(input: &mut R) -> io::Result<(u64, bool)> {
    let negative = read_u8(input)? > 0;
    let magnitude = read_varint(input)?;
    Ok((magnitude, negative))
}

pub fn read_u8<R: Read + ?Sized>(input: &mut R) -> io::Result<u8> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}

pub fn write_u32_le<W: Write + ?Sized>(out: &mut W, value: u32) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub fn read_u32_le<R: Read + ?Sized>(input: &mut R) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

pub fn write_u64_le<W: Write + ?Sized>(out: &mut W, value: u64) -> io::Result<()> {
    out.write_all(&value.to_le_bytes())
}

pub fn read_u64_le<R: Read + ?Sized>(input: &mut R) -> io::Result<u64> {
    let mut bytes = [0u8; 8];
    input.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

/// Writes the IEEE-754 bits of `value`, little-endian.
pub fn write_f64_le<W: Write + ?Sized>(out: &mut W, value: f64) -> io::Result<()> {
    write_u64_le(out, value.to_bits())
}

pub fn read_f64_le<R: Read + ?Sized>(input: &mut R) -> io::Result<f64> {
    read_u64_le(input).map(f64::from_bits)
}

fn overflow() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "varint does not fit in 64 bits")
}
