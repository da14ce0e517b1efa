//! Pure functions for base-128 varints and zigzag signed integers.

use crate::io::read::{Error, Result};

/// The maximum number of bytes a 64-bit varint can take on the wire
pub const MAX_VARINT_SIZE: usize = 10;
/// The maximum number of bytes a 32-bit varint can take on the wire
pub const MAX_VARINT32_SIZE: usize = 5;

/// Encodes a 32-bit value as a varint into the buffer, returning the number of bytes used.
///
/// # Examples
///
/// ```
/// use protowire::io::varint;
///
/// let mut buf = [0; varint::MAX_VARINT_SIZE];
/// let len = varint::encode_varint32(300, &mut buf);
/// assert_eq!(&buf[..len], &[0xAC, 0x02]);
/// ```
#[inline]
pub fn encode_varint32(value: u32, buf: &mut [u8; MAX_VARINT_SIZE]) -> usize {
    encode_varint64(u64::from(value), buf)
}

/// Encodes a 64-bit value as a varint into the buffer, returning the number of bytes used.
#[inline]
pub fn encode_varint64(mut value: u64, buf: &mut [u8; MAX_VARINT_SIZE]) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        buf[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decodes a varint from the start of the slice, returning the value and the number of bytes it took.
///
/// Fails with `TruncatedMessage` if the slice ends before the varint does and
/// `MalformedVarint` if the varint is longer than 10 bytes or its 10th byte carries more than one bit.
///
/// # Examples
///
/// ```
/// use protowire::io::varint;
///
/// assert_eq!(varint::decode_varint64(&[0xAC, 0x02, 0xFF]).unwrap(), (300, 2));
/// ```
#[inline]
pub fn decode_varint64(buf: &[u8]) -> Result<(u64, usize)> {
    match buf.first() {
        Some(&b) if b < 0x80 => return Ok((u64::from(b), 1)),
        Some(_) => { },
        None => return Err(Error::TruncatedMessage),
    }
    if buf.len() >= MAX_VARINT_SIZE {
        return decode_varint64_unrolled(&buf[..MAX_VARINT_SIZE]);
    }

    let mut result = 0u64;
    for (i, &b) in buf.iter().enumerate() {
        result |= u64::from(b & 0x7F) << (7 * i);
        if b < 0x80 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::TruncatedMessage)
}

// Accumulates 28 bits at a time in 32-bit halves, with every byte in bounds.
#[inline]
fn decode_varint64_unrolled(buf: &[u8]) -> Result<(u64, usize)> {
    let buf = &buf[..MAX_VARINT_SIZE];

    let mut b = buf[0];
    let mut part0 = u32::from(b);
    if b < 0x80 { return Ok((u64::from(part0), 1)); }
    part0 -= 0x80;
    b = buf[1];
    part0 += u32::from(b) << 7;
    if b < 0x80 { return Ok((u64::from(part0), 2)); }
    part0 -= 0x80 << 7;
    b = buf[2];
    part0 += u32::from(b) << 14;
    if b < 0x80 { return Ok((u64::from(part0), 3)); }
    part0 -= 0x80 << 14;
    b = buf[3];
    part0 += u32::from(b) << 21;
    if b < 0x80 { return Ok((u64::from(part0), 4)); }
    part0 -= 0x80 << 21;
    let low = u64::from(part0);

    b = buf[4];
    let mut part1 = u32::from(b);
    if b < 0x80 { return Ok((low | u64::from(part1) << 28, 5)); }
    part1 -= 0x80;
    b = buf[5];
    part1 += u32::from(b) << 7;
    if b < 0x80 { return Ok((low | u64::from(part1) << 28, 6)); }
    part1 -= 0x80 << 7;
    b = buf[6];
    part1 += u32::from(b) << 14;
    if b < 0x80 { return Ok((low | u64::from(part1) << 28, 7)); }
    part1 -= 0x80 << 14;
    b = buf[7];
    part1 += u32::from(b) << 21;
    if b < 0x80 { return Ok((low | u64::from(part1) << 28, 8)); }
    part1 -= 0x80 << 21;
    let low = low | u64::from(part1) << 28;

    b = buf[8];
    let mut part2 = u32::from(b);
    if b < 0x80 { return Ok((low | u64::from(part2) << 56, 9)); }
    part2 -= 0x80;
    b = buf[9];
    part2 += u32::from(b) << 7;
    if b <= 1 { return Ok((low | u64::from(part2) << 56, 10)); }

    Err(Error::MalformedVarint)
}

/// Decodes a varint from the start of the slice, discarding any bits above the low 32.
#[inline]
pub fn decode_varint32(buf: &[u8]) -> Result<(u32, usize)> {
    decode_varint64(buf).map(|(v, len)| (v as u32, len))
}

/// Maps a signed 32-bit value to an unsigned one keeping small magnitudes small.
#[inline]
pub const fn encode_zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Maps a signed 64-bit value to an unsigned one keeping small magnitudes small.
#[inline]
pub const fn encode_zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Reverses [`encode_zigzag32`](fn.encode_zigzag32.html)
#[inline]
pub const fn decode_zigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Reverses [`encode_zigzag64`](fn.encode_zigzag64.html)
#[inline]
pub const fn decode_zigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}
