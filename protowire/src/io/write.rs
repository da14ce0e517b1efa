//! Defines the `CodedWriter`, a writer for writing protobuf encoded values to streams,
//! and the `CodedOutput` trait shared by every writer in this crate.

use core::cmp;
use crate::io::{make_tag, message_set, varint, FieldNumber, WireType, DEFAULT_BUF_SIZE};
use crate::io::stream::{self, Write};
use crate::raw::{self, Packable, Value};
use either::Either;
use thiserror::Error;
use tracing::warn;
use trapper::Wrapper;

const MIN_BUF_SIZE: usize = 16;
const MAX_LENGTH: usize = i32::max_value() as usize;

/// The error type for [`CodedWriter`](struct.CodedWriter.html)
#[derive(Debug, Error)]
pub enum Error {
    /// A fixed size output ran out of room
    #[error("the output ran out of space")]
    OutOfSpace,
    /// A value was provided that was too large to frame with a length prefix
    #[error("the value was too large to write to the output")]
    ValueTooLarge,
    /// A fixed size output had space left over after all values were written
    #[error("the output had {0} bytes of space left after writing")]
    SpaceLeft(usize),
    /// An error occured while writing data to the output
    #[error("an error occured while writing to the output")]
    Stream(#[from] stream::Error),
}

/// A result for a [`CodedWriter`](struct.CodedWriter.html) write operation
pub type Result = core::result::Result<(), Error>;

/// A value that can write itself as the body of a message or group.
pub trait Encode {
    /// Gets the number of bytes [`encode`](#tymethod.encode) will write
    fn encoded_len(&self) -> usize;
    /// Writes the value to the output
    fn encode<O: CodedOutput + ?Sized>(&self, output: &mut O) -> Result;
}

fn check_length(len: usize) -> core::result::Result<u32, Error> {
    if len > MAX_LENGTH {
        Err(Error::ValueTooLarge)
    } else {
        Ok(len as u32)
    }
}

macro_rules! tagged_writes {
    ($($(#[$m:meta])* fn $name:ident($ty:ty) => $no_tag:ident, $wt:ident;)*) => {
        $(
            $(#[$m])*
            #[inline]
            fn $name(&mut self, number: u32, value: $ty) -> Result {
                self.write_tag(number, WireType::$wt)?;
                self.$no_tag(value)
            }
        )*
    };
}

/// The typed write contract of a protobuf output.
///
/// Implementors provide raw byte output; every encoding is built on top of it.
/// Field numbers passed to tagged writes must be valid, nonzero field numbers.
pub trait CodedOutput {
    /// Writes raw bytes to the output
    fn write_raw_bytes(&mut self, value: &[u8]) -> Result;

    /// Writes any buffered bytes to the underlying sink
    fn flush(&mut self) -> Result;

    /// Gets the number of bytes written, including bytes still buffered
    fn total_bytes_written(&self) -> usize;

    /// Writes a single raw byte to the output
    #[inline]
    fn write_raw_byte(&mut self, value: u8) -> Result {
        self.write_raw_bytes(&[value])
    }

    /// Writes a 32-bit varint to the output
    #[inline]
    fn write_raw_varint32(&mut self, value: u32) -> Result {
        let mut buf = [0; varint::MAX_VARINT_SIZE];
        let len = varint::encode_varint32(value, &mut buf);
        self.write_raw_bytes(&buf[..len])
    }

    /// Writes a 64-bit varint to the output
    #[inline]
    fn write_raw_varint64(&mut self, value: u64) -> Result {
        let mut buf = [0; varint::MAX_VARINT_SIZE];
        let len = varint::encode_varint64(value, &mut buf);
        self.write_raw_bytes(&buf[..len])
    }

    /// Writes a 4-byte little endian value to the output
    #[inline]
    fn write_raw_little_endian32(&mut self, value: u32) -> Result {
        self.write_raw_bytes(&value.to_le_bytes())
    }

    /// Writes an 8-byte little endian value to the output
    #[inline]
    fn write_raw_little_endian64(&mut self, value: u64) -> Result {
        self.write_raw_bytes(&value.to_le_bytes())
    }

    /// Writes a tag with the specified field number and wire type
    #[inline]
    fn write_tag(&mut self, number: u32, wire_type: WireType) -> Result {
        debug_assert!(number != 0 && number <= FieldNumber::MAX_VALUE, "field number {} is out of range", number);
        self.write_raw_varint32(make_tag(number, wire_type))
    }

    /// Writes a double value without a tag
    #[inline]
    fn write_double_no_tag(&mut self, value: f64) -> Result {
        self.write_raw_little_endian64(value.to_bits())
    }
    /// Writes a float value without a tag
    #[inline]
    fn write_float_no_tag(&mut self, value: f32) -> Result {
        self.write_raw_little_endian32(value.to_bits())
    }
    /// Writes a uint64 value without a tag
    #[inline]
    fn write_uint64_no_tag(&mut self, value: u64) -> Result {
        self.write_raw_varint64(value)
    }
    /// Writes an int64 value without a tag
    #[inline]
    fn write_int64_no_tag(&mut self, value: i64) -> Result {
        self.write_raw_varint64(value as u64)
    }
    /// Writes an int32 value without a tag. Negative values are sign extended to 10 bytes.
    #[inline]
    fn write_int32_no_tag(&mut self, value: i32) -> Result {
        if value >= 0 {
            self.write_raw_varint32(value as u32)
        } else {
            self.write_raw_varint64(i64::from(value) as u64)
        }
    }
    /// Writes a fixed64 value without a tag
    #[inline]
    fn write_fixed64_no_tag(&mut self, value: u64) -> Result {
        self.write_raw_little_endian64(value)
    }
    /// Writes a fixed32 value without a tag
    #[inline]
    fn write_fixed32_no_tag(&mut self, value: u32) -> Result {
        self.write_raw_little_endian32(value)
    }
    /// Writes a bool value without a tag
    #[inline]
    fn write_bool_no_tag(&mut self, value: bool) -> Result {
        self.write_raw_byte(value as u8)
    }
    /// Writes a uint32 value without a tag
    #[inline]
    fn write_uint32_no_tag(&mut self, value: u32) -> Result {
        self.write_raw_varint32(value)
    }
    /// Writes an enum value without a tag
    #[inline]
    fn write_enum_no_tag(&mut self, value: i32) -> Result {
        self.write_int32_no_tag(value)
    }
    /// Writes an sfixed32 value without a tag
    #[inline]
    fn write_sfixed32_no_tag(&mut self, value: i32) -> Result {
        self.write_raw_little_endian32(value as u32)
    }
    /// Writes an sfixed64 value without a tag
    #[inline]
    fn write_sfixed64_no_tag(&mut self, value: i64) -> Result {
        self.write_raw_little_endian64(value as u64)
    }
    /// Writes an sint32 value without a tag
    #[inline]
    fn write_sint32_no_tag(&mut self, value: i32) -> Result {
        self.write_raw_varint32(varint::encode_zigzag32(value))
    }
    /// Writes an sint64 value without a tag
    #[inline]
    fn write_sint64_no_tag(&mut self, value: i64) -> Result {
        self.write_raw_varint64(varint::encode_zigzag64(value))
    }
    /// Writes a length prefixed string without a tag
    #[inline]
    fn write_string_no_tag(&mut self, value: &str) -> Result {
        self.write_bytes_no_tag(value.as_bytes())
    }
    /// Writes a length prefixed byte string without a tag
    fn write_bytes_no_tag(&mut self, value: &[u8]) -> Result {
        let len = check_length(value.len())?;
        self.write_raw_varint32(len)?;
        self.write_raw_bytes(value)
    }
    /// Writes UTF-16 text as a length prefixed UTF8 string without a tag.
    ///
    /// Unpaired surrogates are replaced with U+FFFD rather than failing the write.
    fn write_utf16_string_no_tag(&mut self, value: &[u16]) -> Result {
        match String::from_utf16(value) {
            Ok(s) => self.write_string_no_tag(&s),
            Err(_) => {
                warn!(len = value.len(), "writing string with unpaired surrogates, replacing them with U+FFFD");
                self.write_string_no_tag(&String::from_utf16_lossy(value))
            }
        }
    }
    /// Writes a length prefixed embedded message without a tag
    fn write_message_no_tag<M: Encode + ?Sized>(&mut self, value: &M) -> Result {
        let len = check_length(value.encoded_len())?;
        self.write_raw_varint32(len)?;
        value.encode(self)
    }

    tagged_writes! {
        /// Writes a double field
        fn write_double(f64) => write_double_no_tag, Bit64;
        /// Writes a float field
        fn write_float(f32) => write_float_no_tag, Bit32;
        /// Writes a uint64 field
        fn write_uint64(u64) => write_uint64_no_tag, Varint;
        /// Writes an int64 field
        fn write_int64(i64) => write_int64_no_tag, Varint;
        /// Writes an int32 field
        fn write_int32(i32) => write_int32_no_tag, Varint;
        /// Writes a fixed64 field
        fn write_fixed64(u64) => write_fixed64_no_tag, Bit64;
        /// Writes a fixed32 field
        fn write_fixed32(u32) => write_fixed32_no_tag, Bit32;
        /// Writes a bool field
        fn write_bool(bool) => write_bool_no_tag, Varint;
        /// Writes a uint32 field
        fn write_uint32(u32) => write_uint32_no_tag, Varint;
        /// Writes an enum field
        fn write_enum(i32) => write_enum_no_tag, Varint;
        /// Writes an sfixed32 field
        fn write_sfixed32(i32) => write_sfixed32_no_tag, Bit32;
        /// Writes an sfixed64 field
        fn write_sfixed64(i64) => write_sfixed64_no_tag, Bit64;
        /// Writes an sint32 field
        fn write_sint32(i32) => write_sint32_no_tag, Varint;
        /// Writes an sint64 field
        fn write_sint64(i64) => write_sint64_no_tag, Varint;
        /// Writes a string field
        fn write_string(&str) => write_string_no_tag, LengthDelimited;
        /// Writes a bytes field
        fn write_bytes(&[u8]) => write_bytes_no_tag, LengthDelimited;
        /// Writes a string field from UTF-16 text
        fn write_utf16_string(&[u16]) => write_utf16_string_no_tag, LengthDelimited;
    }

    /// Writes an embedded message field
    fn write_message<M: Encode + ?Sized>(&mut self, number: u32, value: &M) -> Result {
        self.write_tag(number, WireType::LengthDelimited)?;
        self.write_message_no_tag(value)
    }

    /// Writes a group field, bracketing the value with start and end group tags
    fn write_group<M: Encode + ?Sized>(&mut self, number: u32, value: &M) -> Result {
        self.write_tag(number, WireType::StartGroup)?;
        value.encode(self)?;
        self.write_tag(number, WireType::EndGroup)
    }

    /// Writes a value using the encoding of the specified value type, without a tag
    #[inline]
    fn write_value<V: Value>(&mut self, value: &V::Inner) -> Result {
        V::wrap_ref(value).write_to(self)
    }

    /// Writes a field using the encoding of the specified value type
    fn write_field<V: Value>(&mut self, number: u32, value: &V::Inner) -> Result {
        self.write_tag(number, V::WIRE_TYPE)?;
        self.write_value::<V>(value)
    }

    /// Writes a packed repeated field. Nothing is written if there are no values.
    fn write_packed<V: Packable>(&mut self, number: u32, values: &[V::Inner]) -> Result {
        if values.is_empty() {
            return Ok(());
        }
        self.write_tag(number, WireType::LengthDelimited)?;
        self.write_raw_varint32(check_length(raw::packed_size::<V>(values))?)?;
        for value in values {
            self.write_value::<V>(value)?;
        }
        Ok(())
    }

    /// Writes a message-set item containing the specified extension message
    fn write_message_set_extension<M: Encode + ?Sized>(&mut self, type_id: u32, value: &M) -> Result {
        self.write_tag(message_set::ITEM, WireType::StartGroup)?;
        self.write_uint32(message_set::TYPE_ID, type_id)?;
        self.write_message(message_set::MESSAGE, value)?;
        self.write_tag(message_set::ITEM, WireType::EndGroup)
    }

    /// Writes a message-set item containing an already encoded extension message
    fn write_raw_message_set_extension(&mut self, type_id: u32, value: &[u8]) -> Result {
        self.write_tag(message_set::ITEM, WireType::StartGroup)?;
        self.write_uint32(message_set::TYPE_ID, type_id)?;
        self.write_bytes(message_set::MESSAGE, value)?;
        self.write_tag(message_set::ITEM, WireType::EndGroup)
    }
}

/// A builder used to construct [`CodedWriter`](struct.CodedWriter.html) instances
#[derive(Clone, Debug)]
pub struct Builder {
    buffer_capacity: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Builder { buffer_capacity: DEFAULT_BUF_SIZE }
    }
}

impl Builder {
    /// Creates a new builder with the default configuration
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }
    /// Sets the capacity of the buffer used when writing to a stream. The default is 4096 bytes.
    #[inline]
    pub fn buffer_capacity(mut self, value: usize) -> Self {
        self.buffer_capacity = cmp::max(value, MIN_BUF_SIZE);
        self
    }
    /// Constructs a [`CodedWriter`](struct.CodedWriter.html) writing to the specified slice.
    ///
    /// Slices are never buffered, so the capacity of this builder is ignored.
    #[inline]
    pub fn with_slice<'a>(&self, inner: &'a mut [u8]) -> CodedWriter<'a> {
        CodedWriter { inner: Either::Right(inner), pos: 0, flushed: 0 }
    }
    /// Constructs a [`CodedWriter`](struct.CodedWriter.html) writing to the specified [`Write`](../stream/trait.Write.html) object
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::{CodedOutput, WriterBuilder};
    ///
    /// let mut output = Vec::new();
    /// let mut writer = WriterBuilder::new().buffer_capacity(64).with_write(&mut output);
    /// writer.write_int32(1, 150).unwrap();
    /// writer.flush().unwrap();
    /// # drop(writer);
    /// assert_eq!(output, [0x08, 0x96, 0x01]);
    /// ```
    #[inline]
    pub fn with_write<'a>(&self, inner: &'a mut dyn Write) -> CodedWriter<'a> {
        let output = StreamOutput {
            output: inner,
            buf: vec![0; self.buffer_capacity].into_boxed_slice(),
        };
        CodedWriter { inner: Either::Left(output), pos: 0, flushed: 0 }
    }
}

struct StreamOutput<'a> {
    output: &'a mut dyn Write,
    buf: Box<[u8]>,
}

/// A protobuf coded writer that writes to a fixed size slice or a buffered stream.
///
/// Writes to a stream are buffered until the buffer fills or [`flush`](trait.CodedOutput.html#tymethod.flush)
/// is called; dropping the writer discards any buffered bytes. Writes to a slice
/// fail with `OutOfSpace` once the slice is full.
pub struct CodedWriter<'a> {
    inner: Either<StreamOutput<'a>, &'a mut [u8]>,
    pos: usize,
    flushed: usize,
}

impl<'a> CodedWriter<'a> {
    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) writing to the specified slice
    #[inline]
    pub fn with_slice(inner: &'a mut [u8]) -> Self {
        Builder::new().with_slice(inner)
    }

    /// Creates a new [`CodedWriter`](struct.CodedWriter.html) writing to the specified stream with the default buffer capacity
    #[inline]
    pub fn with_write(inner: &'a mut dyn Write) -> Self {
        Builder::new().with_write(inner)
    }

    /// Gets the space left in a slice output, or `None` if the writer is writing to a stream
    pub fn space_left(&self) -> Option<usize> {
        match &self.inner {
            Either::Left(_) => None,
            Either::Right(slice) => Some(slice.len() - self.pos),
        }
    }

    /// Checks a slice output was filled exactly
    pub fn check_no_space_left(&self) -> Result {
        match self.space_left() {
            Some(0) | None => Ok(()),
            Some(left) => Err(Error::SpaceLeft(left)),
        }
    }

    fn flush_buffer(stream: &mut StreamOutput, pos: &mut usize, flushed: &mut usize) -> Result {
        stream.output.write(&stream.buf[..*pos])?;
        *flushed += *pos;
        *pos = 0;
        Ok(())
    }
}

impl CodedOutput for CodedWriter<'_> {
    fn write_raw_bytes(&mut self, value: &[u8]) -> Result {
        match &mut self.inner {
            Either::Right(slice) => {
                let end = self.pos.checked_add(value.len()).ok_or(Error::OutOfSpace)?;
                if end > slice.len() {
                    return Err(Error::OutOfSpace);
                }
                slice[self.pos..end].copy_from_slice(value);
                self.pos = end;
            },
            Either::Left(stream) => {
                let space = stream.buf.len() - self.pos;
                if value.len() <= space {
                    stream.buf[self.pos..self.pos + value.len()].copy_from_slice(value);
                    self.pos += value.len();
                    return Ok(());
                }

                let (head, rest) = value.split_at(space);
                stream.buf[self.pos..].copy_from_slice(head);
                self.pos = stream.buf.len();
                Self::flush_buffer(stream, &mut self.pos, &mut self.flushed)?;

                if rest.len() <= stream.buf.len() {
                    stream.buf[..rest.len()].copy_from_slice(rest);
                    self.pos = rest.len();
                } else {
                    stream.output.write(rest)?;
                    self.flushed += rest.len();
                }
            },
        }
        Ok(())
    }

    fn flush(&mut self) -> Result {
        if let Either::Left(stream) = &mut self.inner {
            Self::flush_buffer(stream, &mut self.pos, &mut self.flushed)?;
            stream.output.flush()?;
        }
        Ok(())
    }

    fn total_bytes_written(&self) -> usize {
        self.flushed + self.pos
    }
}
