//! Functions computing the exact number of bytes each write operation produces.
//!
//! Length-delimited framing needs the length of a value before its bytes are written,
//! so every `write_*` operation of a [`CodedOutput`](../write/trait.CodedOutput.html)
//! has a matching size function here.

use crate::io::{make_tag, message_set, WireType};

/// Gets the size of a 32-bit varint
///
/// # Examples
///
/// ```
/// use protowire::io::size::raw_varint32_size;
///
/// assert_eq!(raw_varint32_size(0), 1);
/// assert_eq!(raw_varint32_size(127), 1);
/// assert_eq!(raw_varint32_size(128), 2);
/// assert_eq!(raw_varint32_size(u32::max_value()), 5);
/// ```
#[inline]
pub const fn raw_varint32_size(value: u32) -> usize {
    (((31 ^ (value | 1).leading_zeros()) * 9 + 73) / 64) as usize
}

/// Gets the size of a 64-bit varint
#[inline]
pub const fn raw_varint64_size(value: u64) -> usize {
    (((63 ^ (value | 1).leading_zeros()) * 9 + 73) / 64) as usize
}

/// Gets the size of a tag with the specified field number
#[inline]
pub const fn tag_size(field_number: u32) -> usize {
    raw_varint32_size(make_tag(field_number, WireType::Varint))
}

/// Gets the size of a length prefix followed by `len` bytes
#[inline]
pub const fn length_delimited_size(len: usize) -> usize {
    raw_varint32_size(len as u32) + len
}

/// Gets the size of an int32 value. Negative values are sign extended to 10 bytes.
#[inline]
pub const fn int32_size_no_tag(value: i32) -> usize {
    if value >= 0 {
        raw_varint32_size(value as u32)
    } else {
        10
    }
}

/// Gets the size of an int64 value
#[inline]
pub const fn int64_size_no_tag(value: i64) -> usize {
    raw_varint64_size(value as u64)
}

/// Gets the size of a uint32 value
#[inline]
pub const fn uint32_size_no_tag(value: u32) -> usize {
    raw_varint32_size(value)
}

/// Gets the size of a uint64 value
#[inline]
pub const fn uint64_size_no_tag(value: u64) -> usize {
    raw_varint64_size(value)
}

/// Gets the size of a sint32 value
#[inline]
pub const fn sint32_size_no_tag(value: i32) -> usize {
    raw_varint32_size(crate::io::varint::encode_zigzag32(value))
}

/// Gets the size of a sint64 value
#[inline]
pub const fn sint64_size_no_tag(value: i64) -> usize {
    raw_varint64_size(crate::io::varint::encode_zigzag64(value))
}

/// The size of any fixed32, sfixed32 or float value
pub const FIXED32_SIZE: usize = 4;
/// The size of any fixed64, sfixed64 or double value
pub const FIXED64_SIZE: usize = 8;
/// The size of any bool value
pub const BOOL_SIZE: usize = 1;

/// Gets the size of an enum value, encoded as an int32
#[inline]
pub const fn enum_size_no_tag(value: i32) -> usize {
    int32_size_no_tag(value)
}

/// Gets the size of a string value
#[inline]
pub fn string_size_no_tag(value: &str) -> usize {
    length_delimited_size(value.len())
}

/// Gets the size of a bytes value
#[inline]
pub fn bytes_size_no_tag(value: &[u8]) -> usize {
    length_delimited_size(value.len())
}

/// Gets the size of an embedded message with the specified encoded length
#[inline]
pub const fn message_size_no_tag(len: usize) -> usize {
    length_delimited_size(len)
}

/// Gets the size of a group with the specified field number and body length, including both tags
#[inline]
pub const fn group_size(field_number: u32, len: usize) -> usize {
    tag_size(field_number) * 2 + len
}

/// Gets the size of a message-set item containing a message with the specified encoded length
#[inline]
pub const fn message_set_extension_size(type_id: u32, len: usize) -> usize {
    tag_size(message_set::ITEM) * 2 +
    tag_size(message_set::TYPE_ID) + raw_varint32_size(type_id) +
    tag_size(message_set::MESSAGE) + length_delimited_size(len)
}
