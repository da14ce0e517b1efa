//! Defines the `CodedReader`, a reader for reading values from a protobuf encoded byte stream.

use core::cmp;
use core::convert::TryFrom;
use crate::io::{make_tag, tag_field_number, FieldNumber, Tag, WireType, DEFAULT_BUF_SIZE};
use crate::io::stream::{self, Read};
use crate::io::varint::{self, MAX_VARINT_SIZE};
use crate::io::write::{self, CodedOutput};
use either::Either;
use std::borrow::Cow;
use std::string::FromUtf8Error;
use thiserror::Error;
use tracing::debug;

/// The default maximum depth of nested messages and groups
pub const DEFAULT_RECURSION_LIMIT: u32 = 64;
/// The default maximum number of bytes read from a stream
pub const DEFAULT_SIZE_LIMIT: usize = 64 << 20;

const MIN_BUF_SIZE: usize = 16;
const NO_LIMIT: usize = usize::MAX;

/// The error type for [`CodedReader`](struct.CodedReader.html)
#[derive(Debug, Error)]
pub enum Error {
    /// The input contained a malformed variable length integer
    #[error("the input contained an invalid variable length integer")]
    MalformedVarint,
    /// The input ended, or the current limit was reached, in the middle of a value
    #[error("the input ended unexpectedly in the middle of a field; this could mean a length delimited field reported the wrong size")]
    TruncatedMessage,
    /// The input contained a length delimited value which reported it had a negative size
    #[error("the input contained a length delimited value which reported it had a negative size")]
    NegativeSize,
    /// The input contained a tag with a wire type of 6 or 7
    #[error("the input contained a tag with an invalid wire type: {0}")]
    InvalidWireType(u32),
    /// The input contained a tag with a field number of 0
    #[error("the input contained an invalid tag (zero): {0}")]
    InvalidTag(u32),
    /// A message or group ended with an unexpected tag
    #[error("the input contained a message or group that ended with an unexpected tag")]
    InvalidEndTag,
    /// Messages and groups were nested deeper than the reader's recursion limit
    #[error("the input contained messages nested too deeply; use ReaderBuilder::recursion_limit to increase the limit")]
    RecursionLimitExceeded,
    /// More bytes were read from a stream than the reader's size limit
    #[error("the input was too large; use ReaderBuilder::size_limit to increase the limit")]
    SizeLimitExceeded,
    /// The input contained an invalid UTF8 string where a valid one was required
    #[error("the input contained an invalid UTF8 string")]
    InvalidUtf8(#[source] FromUtf8Error),
    /// An error occured while reading from the underlying `Read` object
    #[error("an error occured in the underlying input")]
    Stream(#[from] stream::Error),
    /// An error occured while copying skipped data to an output
    #[error("an error occured while copying skipped data")]
    Output(#[from] write::Error),
}

/// A result for a [`CodedReader`](struct.CodedReader.html) read operation
pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug)]
struct ReaderOptions {
    recursion_limit: u32,
    size_limit: usize,
    buffer_capacity: usize,
    aliasing: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            size_limit: DEFAULT_SIZE_LIMIT,
            buffer_capacity: DEFAULT_BUF_SIZE,
            aliasing: false,
        }
    }
}

/// A builder used to construct [`CodedReader`](struct.CodedReader.html) instances
#[derive(Clone, Debug, Default)]
pub struct Builder {
    options: ReaderOptions
}

impl Builder {
    /// Creates a new builder with the default configuration
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }
    /// Sets the maximum depth of nested messages and groups. The default is 64.
    #[inline]
    pub fn recursion_limit(mut self, value: u32) -> Self {
        self.options.recursion_limit = value;
        self
    }
    /// Sets the maximum number of bytes a reader will pull from a stream. The default is 64 MiB.
    ///
    /// Readers over slices ignore this limit since the slice bounds the input already.
    #[inline]
    pub fn size_limit(mut self, value: usize) -> Self {
        self.options.size_limit = value;
        self
    }
    /// Sets the capacity of the buffer used when reading from a stream. The default is 4096 bytes.
    #[inline]
    pub fn buffer_capacity(mut self, value: usize) -> Self {
        self.options.buffer_capacity = cmp::max(value, MIN_BUF_SIZE);
        self
    }
    /// Sets whether length delimited reads from a slice may borrow the slice instead of copying.
    #[inline]
    pub fn enable_aliasing(mut self, value: bool) -> Self {
        self.options.aliasing = value;
        self
    }
    /// Constructs a [`CodedReader`](struct.CodedReader.html) using this builder and
    /// the specified slice of bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::ReaderBuilder;
    ///
    /// let data = [8, 15];
    /// let mut reader =
    ///     ReaderBuilder::new()
    ///         .recursion_limit(16)
    ///         .with_slice(&data);
    /// ```
    #[inline]
    pub fn with_slice<'a>(&self, inner: &'a [u8]) -> CodedReader<'a> {
        CodedReader::new(Either::Right(inner), inner.len(), self.options.clone())
    }
    /// Constructs a [`CodedReader`](struct.CodedReader.html) using this builder and
    /// the specified [`Read`](../stream/trait.Read.html) object
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::ReaderBuilder;
    ///
    /// let mut data: &[u8] = &[8, 15];
    /// let mut reader =
    ///     ReaderBuilder::new()
    ///         .buffer_capacity(64)
    ///         .with_stream(&mut data);
    /// ```
    #[inline]
    pub fn with_stream<'a>(&self, inner: &'a mut dyn Read) -> CodedReader<'a> {
        let input = StreamInput {
            input: inner,
            buf: vec![0; self.options.buffer_capacity].into_boxed_slice(),
        };
        CodedReader::new(Either::Left(input), 0, self.options.clone())
    }
}

struct StreamInput<'a> {
    input: &'a mut dyn Read,
    buf: Box<[u8]>,
}

/// The limit that was active before a call to [`push_limit`](struct.CodedReader.html#method.push_limit).
///
/// It must be handed back to [`pop_limit`](struct.CodedReader.html#method.pop_limit) once the nested value is read.
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limit(usize);

/// A protobuf coded reader that reads from a slice or a buffered stream.
///
/// The reader tracks a limit on how far it may read, the depth of nested
/// messages and groups, and for streams, how many bytes it has pulled in total.
pub struct CodedReader<'a> {
    inner: Either<StreamInput<'a>, &'a [u8]>,
    pos: usize,
    size: usize,
    size_after_limit: usize,
    retired: usize,
    counter_start: usize,
    current_limit: usize,
    last_tag: u32,
    depth: u32,
    options: ReaderOptions,
}

impl<'a> CodedReader<'a> {
    fn new(inner: Either<StreamInput<'a>, &'a [u8]>, size: usize, options: ReaderOptions) -> Self {
        CodedReader {
            inner,
            pos: 0,
            size,
            size_after_limit: 0,
            retired: 0,
            counter_start: 0,
            current_limit: NO_LIMIT,
            last_tag: 0,
            depth: 0,
            options,
        }
    }

    /// Creates a new [`CodedReader`] with the default options reading from the specified slice
    ///
    /// [`CodedReader`]: struct.CodedReader.html
    #[inline]
    pub fn with_slice(inner: &'a [u8]) -> Self {
        Builder::new().with_slice(inner)
    }

    /// Creates a new [`CodedReader`] with the default options reading from the specified stream
    ///
    /// [`CodedReader`]: struct.CodedReader.html
    #[inline]
    pub fn with_stream(inner: &'a mut dyn Read) -> Self {
        Builder::new().with_stream(inner)
    }

    #[inline]
    fn buf(&self) -> &[u8] {
        match &self.inner {
            Either::Left(stream) => &stream.buf,
            Either::Right(slice) => slice,
        }
    }

    #[inline]
    fn available(&self) -> usize {
        self.size - self.pos
    }

    #[inline]
    fn position(&self) -> usize {
        self.retired + self.pos
    }

    /// Sets the maximum depth of nested messages and groups, returning the old limit
    pub fn set_recursion_limit(&mut self, value: u32) -> u32 {
        core::mem::replace(&mut self.options.recursion_limit, value)
    }

    /// Sets the maximum number of bytes this reader will pull from a stream, returning the old limit
    pub fn set_size_limit(&mut self, value: usize) -> usize {
        core::mem::replace(&mut self.options.size_limit, value)
    }

    /// Resets the count of bytes checked against the size limit, and reported by
    /// [`total_bytes_read`](#method.total_bytes_read), to zero.
    pub fn reset_size_counter(&mut self) {
        self.counter_start = self.position();
    }

    /// Gets the number of bytes read since the reader was created or its size counter was reset
    pub fn total_bytes_read(&self) -> usize {
        self.position() - self.counter_start
    }

    /// Gets the current nesting depth of messages and groups
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Gets whether length delimited reads from a slice borrow the slice
    pub fn aliasing_enabled(&self) -> bool {
        self.options.aliasing
    }

    /// Gets the last tag read by [`read_tag`](#method.read_tag). Returns `None` if the end of input was reached.
    pub fn last_tag(&self) -> Option<Tag> {
        Tag::try_from(self.last_tag).ok()
    }

    /// Checks the last tag read was the specified raw value, where 0 means the end of input.
    ///
    /// Used after reading a message or group to verify it ended where it should have.
    pub fn check_last_tag_was(&self, value: u32) -> Result<()> {
        if self.last_tag != value {
            Err(Error::InvalidEndTag)
        } else {
            Ok(())
        }
    }

    /// Limits the reader to the next `len` bytes, returning the previous limit.
    ///
    /// Fails with `NegativeSize` if `len` is negative and `TruncatedMessage`
    /// if the new limit would extend past the current one.
    pub fn push_limit(&mut self, len: i32) -> Result<Limit> {
        if len < 0 {
            return Err(Error::NegativeSize);
        }
        let new_limit = self.position().checked_add(len as usize).ok_or(Error::TruncatedMessage)?;
        let old_limit = self.current_limit;
        if new_limit > old_limit {
            return Err(Error::TruncatedMessage);
        }
        self.current_limit = new_limit;
        self.recompute_size_after_limit();

        Ok(Limit(old_limit))
    }

    /// Restores the limit that was active before the matching call to [`push_limit`](#method.push_limit)
    pub fn pop_limit(&mut self, old: Limit) {
        self.current_limit = old.0;
        self.recompute_size_after_limit();
    }

    fn recompute_size_after_limit(&mut self) {
        self.size += self.size_after_limit;
        let buffer_end = self.retired + self.size;
        if buffer_end > self.current_limit {
            self.size_after_limit = buffer_end - self.current_limit;
            self.size -= self.size_after_limit;
        } else {
            self.size_after_limit = 0;
        }
    }

    /// Gets the number of bytes left before the current limit, or `None` if no limit is active
    pub fn bytes_until_limit(&self) -> Option<usize> {
        if self.current_limit == NO_LIMIT {
            None
        } else {
            Some(self.current_limit - self.position())
        }
    }

    /// Returns true if the reader has reached the end of the input or the current limit
    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.pos == self.size && !self.try_refill(1)?)
    }

    /// Makes at least `n` bytes available in the buffer, failing with `TruncatedMessage` if the input ends first.
    #[inline]
    fn ensure_available(&mut self, n: usize) -> Result<()> {
        if self.available() < n {
            self.refill(n)?;
        }
        Ok(())
    }

    fn refill(&mut self, n: usize) -> Result<()> {
        if self.try_refill(n)? {
            Ok(())
        } else {
            Err(Error::TruncatedMessage)
        }
    }

    /// Tries to make `n` bytes available in the buffer, returning false if the end of
    /// the input or the current limit is reached. `n` must not exceed the buffer capacity.
    fn try_refill(&mut self, n: usize) -> Result<bool> {
        debug_assert!(self.pos + n > self.size, "refill called with {} bytes already available", n);

        loop {
            if self.position().saturating_add(n) > self.current_limit {
                return Ok(false);
            }

            let stream = match &mut self.inner {
                Either::Left(stream) => stream,
                Either::Right(_) => return Ok(false),
            };

            if self.pos > 0 {
                stream.buf.copy_within(self.pos..self.size, 0);
                self.retired += self.pos;
                self.size -= self.pos;
                self.pos = 0;
            }

            let read = stream.input.read(&mut stream.buf[self.size..])?;
            if read == 0 {
                return Ok(false);
            }
            self.size += read;

            if (self.retired - self.counter_start).saturating_add(n) > self.options.size_limit {
                debug!(limit = self.options.size_limit, "reader exceeded its size limit");
                return Err(Error::SizeLimitExceeded);
            }
            self.recompute_size_after_limit();
            if self.size >= n {
                return Ok(true);
            }
        }
    }

    /// Reads a field tag from the input, returning `None` at the end of the input or current limit.
    ///
    /// Fails with `InvalidTag` if the tag's field number is 0.
    pub fn read_tag(&mut self) -> Result<Option<Tag>> {
        if self.is_at_end()? {
            self.last_tag = 0;
            return Ok(None);
        }

        let raw = self.read_varint32()?;
        self.last_tag = raw;
        if tag_field_number(raw) == 0 {
            return Err(Error::InvalidTag(raw));
        }
        match Tag::try_from(raw) {
            Ok(tag) => Ok(Some(tag)),
            Err(_) => Err(Error::InvalidWireType(raw)),
        }
    }

    /// Reads a 32-bit varint field value. Bits above the low 32 of a longer varint are discarded.
    #[inline]
    pub fn read_varint32(&mut self) -> Result<u32> {
        self.read_varint64().map(|v| v as u32)
    }

    /// Reads a 64-bit varint field value
    pub fn read_varint64(&mut self) -> Result<u64> {
        if self.available() != 0 {
            let buf = &self.buf()[self.pos..self.size];
            match varint::decode_varint64(buf) {
                Ok((value, len)) => {
                    self.pos += len;
                    return Ok(value);
                },
                Err(Error::TruncatedMessage) => { },
                Err(e) => return Err(e),
            }
        }
        self.read_varint64_slow()
    }

    fn read_varint64_slow(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for i in 0..MAX_VARINT_SIZE {
            let b = self.read_raw_byte()?;
            if i == MAX_VARINT_SIZE - 1 && b > 1 {
                return Err(Error::MalformedVarint);
            }
            result |= u64::from(b & 0x7F) << (7 * i);
            if b < 0x80 {
                return Ok(result);
            }
        }
        Err(Error::MalformedVarint)
    }

    /// Reads a 4-byte little endian value
    pub fn read_raw_little_endian32(&mut self) -> Result<u32> {
        self.ensure_available(4)?;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&self.buf()[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads an 8-byte little endian value
    pub fn read_raw_little_endian64(&mut self) -> Result<u64> {
        self.ensure_available(8)?;
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&self.buf()[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Reads a single byte from the input
    pub fn read_raw_byte(&mut self) -> Result<u8> {
        if self.pos == self.size {
            self.refill(1)?;
        }
        let b = self.buf()[self.pos];
        self.pos += 1;
        Ok(b)
    }

    /// Reads a fixed number of bytes from the input.
    ///
    /// Reads larger than the buffer are collected in buffer sized chunks, so a bogus
    /// length can't make the reader allocate more than the input actually contains.
    pub fn read_raw_bytes(&mut self, size: usize) -> Result<Vec<u8>> {
        if size <= self.available() {
            let bytes = self.buf()[self.pos..self.pos + size].to_vec();
            self.pos += size;
            return Ok(bytes);
        }

        let position = self.position();
        if position.saturating_add(size) > self.current_limit {
            // read to the limit anyway
            self.skip_raw_bytes(self.current_limit - position)?;
            return Err(Error::TruncatedMessage);
        }

        let mut bytes = Vec::with_capacity(cmp::min(size, self.options.buffer_capacity));
        let mut left = size;
        loop {
            let amnt = cmp::min(left, self.available());
            bytes.extend_from_slice(&self.buf()[self.pos..self.pos + amnt]);
            self.pos += amnt;
            left -= amnt;
            if left == 0 {
                return Ok(bytes);
            }
            self.refill(1)?;
        }
    }

    /// Skips a fixed number of bytes in the input
    pub fn skip_raw_bytes(&mut self, size: usize) -> Result<()> {
        if size <= self.available() {
            self.pos += size;
            return Ok(());
        }

        let position = self.position();
        if position.saturating_add(size) > self.current_limit {
            self.skip_raw_bytes(self.current_limit - position)?;
            return Err(Error::TruncatedMessage);
        }

        let left = size - self.available();
        let stream = match &mut self.inner {
            Either::Left(stream) => stream,
            Either::Right(_) => return Err(Error::TruncatedMessage),
        };

        // the rest of the skip bypasses the buffer
        self.retired += self.size;
        self.size = 0;
        self.pos = 0;
        if (self.retired - self.counter_start).saturating_add(left) > self.options.size_limit {
            debug!(limit = self.options.size_limit, "reader exceeded its size limit");
            return Err(Error::SizeLimitExceeded);
        }
        let skipped = stream.input.skip(left)?;
        self.retired += skipped;
        self.recompute_size_after_limit();

        if skipped < left {
            Err(Error::TruncatedMessage)
        } else {
            Ok(())
        }
    }

    /// Reads a length prefix, which may be negative on malformed input
    #[inline]
    pub fn read_length(&mut self) -> Result<i32> {
        self.read_varint32().map(|v| v as i32)
    }

    fn read_size(&mut self) -> Result<usize> {
        let len = self.read_length()?;
        if len < 0 {
            Err(Error::NegativeSize)
        } else {
            Ok(len as usize)
        }
    }

    /// Reads a double field value
    #[inline]
    pub fn read_double(&mut self) -> Result<f64> {
        self.read_raw_little_endian64().map(f64::from_bits)
    }
    /// Reads a float field value
    #[inline]
    pub fn read_float(&mut self) -> Result<f32> {
        self.read_raw_little_endian32().map(f32::from_bits)
    }
    /// Reads a uint64 field value
    #[inline]
    pub fn read_uint64(&mut self) -> Result<u64> {
        self.read_varint64()
    }
    /// Reads an int64 field value
    #[inline]
    pub fn read_int64(&mut self) -> Result<i64> {
        self.read_varint64().map(|v| v as i64)
    }
    /// Reads an int32 field value
    #[inline]
    pub fn read_int32(&mut self) -> Result<i32> {
        self.read_varint32().map(|v| v as i32)
    }
    /// Reads a fixed64 field value
    #[inline]
    pub fn read_fixed64(&mut self) -> Result<u64> {
        self.read_raw_little_endian64()
    }
    /// Reads a fixed32 field value
    #[inline]
    pub fn read_fixed32(&mut self) -> Result<u32> {
        self.read_raw_little_endian32()
    }
    /// Reads a bool field value. Any nonzero varint is true.
    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_varint64().map(|v| v != 0)
    }
    /// Reads a uint32 field value
    #[inline]
    pub fn read_uint32(&mut self) -> Result<u32> {
        self.read_varint32()
    }
    /// Reads an enum field value as its raw number
    #[inline]
    pub fn read_enum(&mut self) -> Result<i32> {
        self.read_varint32().map(|v| v as i32)
    }
    /// Reads an sfixed32 field value
    #[inline]
    pub fn read_sfixed32(&mut self) -> Result<i32> {
        self.read_raw_little_endian32().map(|v| v as i32)
    }
    /// Reads an sfixed64 field value
    #[inline]
    pub fn read_sfixed64(&mut self) -> Result<i64> {
        self.read_raw_little_endian64().map(|v| v as i64)
    }
    /// Reads an sint32 field value
    #[inline]
    pub fn read_sint32(&mut self) -> Result<i32> {
        self.read_varint32().map(varint::decode_zigzag32)
    }
    /// Reads an sint64 field value
    #[inline]
    pub fn read_sint64(&mut self) -> Result<i64> {
        self.read_varint64().map(varint::decode_zigzag64)
    }

    /// Reads a length delimited bytes field value.
    ///
    /// If aliasing is enabled and the reader is reading from a slice, the value borrows the slice.
    pub fn read_bytes(&mut self) -> Result<Cow<'a, [u8]>> {
        let len = self.read_size()?;
        if len == 0 {
            return Ok(Cow::Borrowed(&[]));
        }

        if self.options.aliasing && len <= self.available() {
            if let Either::Right(slice) = &self.inner {
                let slice: &'a [u8] = *slice;
                let value = &slice[self.pos..self.pos + len];
                self.pos += len;
                return Ok(Cow::Borrowed(value));
            }
        }

        self.read_raw_bytes(len).map(Cow::Owned)
    }

    /// Reads a length delimited bytes field value into a new vector
    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let len = self.read_size()?;
        if len == 0 {
            return Ok(Vec::new());
        }
        self.read_raw_bytes(len)
    }

    /// Reads a string field value, replacing invalid UTF8 sequences with U+FFFD
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a string field value, failing with `InvalidUtf8` if it isn't valid UTF8
    pub fn read_string_require_utf8(&mut self) -> Result<String> {
        let bytes = self.read_byte_array()?;
        String::from_utf8(bytes).map_err(Error::InvalidUtf8)
    }

    fn check_recursion_limit(&self) -> Result<()> {
        if self.depth >= self.options.recursion_limit {
            debug!(limit = self.options.recursion_limit, "reader exceeded its recursion limit");
            Err(Error::RecursionLimitExceeded)
        } else {
            Ok(())
        }
    }

    /// Reads a length delimited embedded message, calling `f` to merge its fields.
    ///
    /// The reader is limited to the message's length while `f` runs, and the
    /// limit and depth are restored whether or not `f` succeeds. `f` must read
    /// up to the end of the message.
    pub fn read_message<T, F>(&mut self, f: F) -> Result<T>
        where F: FnOnce(&mut Self) -> Result<T>
    {
        let len = self.read_length()?;
        self.check_recursion_limit()?;
        let old = self.push_limit(len)?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        self.pop_limit(old);

        let value = result?;
        self.check_last_tag_was(0)?;
        Ok(value)
    }

    /// Reads a message from bytes taken out of this reader earlier, calling `f` to merge its fields.
    ///
    /// The bytes are read with this reader's options one level deeper than the reader's
    /// current depth, so deferred values are held to the same recursion limit as values read in place.
    pub fn read_buffered_message<T, F>(&mut self, data: &[u8], f: F) -> Result<T>
        where F: FnOnce(&mut CodedReader) -> Result<T>
    {
        self.check_recursion_limit()?;
        let mut input = CodedReader::new(Either::Right(data), data.len(), self.options.clone());
        input.depth = self.depth + 1;

        let value = f(&mut input)?;
        input.check_last_tag_was(0)?;
        Ok(value)
    }

    /// Reads a group with the specified field number, calling `f` to merge its fields.
    ///
    /// The start tag must already have been read. `f` must read up to the group's end tag.
    pub fn read_group<T, F>(&mut self, number: FieldNumber, f: F) -> Result<T>
        where F: FnOnce(&mut Self) -> Result<T>
    {
        self.check_recursion_limit()?;
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;

        let value = result?;
        self.check_last_tag_was(make_tag(number.get(), WireType::EndGroup))?;
        Ok(value)
    }

    /// Skips the value of the field with the specified tag.
    ///
    /// Returns false without reading anything if the tag is an end group tag,
    /// which means the caller has reached the end of the enclosing group.
    pub fn skip_field(&mut self, tag: Tag) -> Result<bool> {
        match tag.wire_type() {
            WireType::Varint => { self.read_varint64()?; },
            WireType::Bit64 => self.skip_raw_bytes(8)?,
            WireType::LengthDelimited => {
                let len = self.read_size()?;
                self.skip_raw_bytes(len)?;
            },
            WireType::StartGroup => self.read_group(tag.field(), Self::skip_message)?,
            WireType::EndGroup => return Ok(false),
            WireType::Bit32 => self.skip_raw_bytes(4)?,
        }
        Ok(true)
    }

    /// Skips fields until the end of the input, the current limit, or an end group tag
    pub fn skip_message(&mut self) -> Result<()> {
        while let Some(tag) = self.read_tag()? {
            if !self.skip_field(tag)? {
                break;
            }
        }
        Ok(())
    }

    /// Skips the value of the field with the specified tag, writing the tag and value to the output.
    ///
    /// Returns false without reading or writing anything if the tag is an end group tag.
    pub fn skip_field_to<O: CodedOutput + ?Sized>(&mut self, tag: Tag, output: &mut O) -> Result<bool> {
        match tag.wire_type() {
            WireType::Varint => {
                let value = self.read_varint64()?;
                output.write_raw_varint32(tag.get())?;
                output.write_raw_varint64(value)?;
            },
            WireType::Bit64 => {
                let value = self.read_raw_little_endian64()?;
                output.write_raw_varint32(tag.get())?;
                output.write_raw_little_endian64(value)?;
            },
            WireType::LengthDelimited => {
                let value = self.read_bytes()?;
                output.write_raw_varint32(tag.get())?;
                output.write_bytes_no_tag(&value)?;
            },
            WireType::StartGroup => {
                output.write_raw_varint32(tag.get())?;
                self.read_group(tag.field(), |r| r.skip_message_to(output))?;
                output.write_raw_varint32(make_tag(tag.field().get(), WireType::EndGroup))?;
            },
            WireType::EndGroup => return Ok(false),
            WireType::Bit32 => {
                let value = self.read_raw_little_endian32()?;
                output.write_raw_varint32(tag.get())?;
                output.write_raw_little_endian32(value)?;
            },
        }
        Ok(true)
    }

    /// Skips fields like [`skip_message`](#method.skip_message), writing every skipped field to the output
    pub fn skip_message_to<O: CodedOutput + ?Sized>(&mut self, output: &mut O) -> Result<()> {
        while let Some(tag) = self.read_tag()? {
            if !self.skip_field_to(tag, output)? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use crate::io::{CodedOutput, CodedReader, CodedWriter, ReaderBuilder, Tag, FieldNumber, WireType, read::Error};
    use crate::io::stream;
    use core::cmp;
    use core::convert::TryFrom;
    use std::borrow::Cow;

    fn tag(raw: u32) -> Tag {
        Tag::try_from(raw).unwrap()
    }

    #[test]
    fn varint32_decode() {
        fn try_decode(bytes: &[u8], expected: u32) {
            let mut reader = CodedReader::with_slice(bytes);
            let value = reader.read_varint32().unwrap();

            assert_eq!(expected, value);

            let mut bytes = bytes;
            let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut bytes);
            let value = reader.read_varint32().unwrap();

            assert_eq!(expected, value);
        }

        try_decode(&[0x00], 0);
        try_decode(&[0x7F], 127);
        try_decode(&[0xAC, 0x02], 300);
        try_decode(&[0xFF, 0x7F], 16_383);
        try_decode(&[0xFF, 0xFF, 0x7F], 2_097_151);
        try_decode(&[0xFF, 0xFF, 0xFF, 0x7F], 268_435_455);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::max_value());
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u32::max_value()); // test that we discard the top 32 bits
    }

    #[test]
    fn varint64_decode() {
        fn try_decode(bytes: &[u8], expected: u64) {
            let mut reader = CodedReader::with_slice(bytes);
            let value = reader.read_varint64().unwrap();

            assert_eq!(expected, value);

            let mut bytes = bytes;
            let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut bytes);
            let value = reader.read_varint64().unwrap();

            assert_eq!(expected, value);
        }

        try_decode(&[0x00], 0);
        try_decode(&[0x7F], 127);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::max_value() as u64);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F], i64::max_value() as u64);
        try_decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01], u64::max_value());
    }

    #[test]
    fn malformed_varint() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        let mut reader = CodedReader::with_slice(&data);

        assert_matches!(reader.read_varint64(), Err(Error::MalformedVarint));

        let mut read = data.as_ref();
        let mut reader = CodedReader::with_stream(&mut read);

        assert_matches!(reader.read_varint64(), Err(Error::MalformedVarint));

        let data = [0xFF; 11];
        let mut reader = CodedReader::with_slice(&data);

        assert_matches!(reader.read_varint32(), Err(Error::MalformedVarint));
    }

    #[test]
    fn truncated_varint() {
        let data = [0xFF, 0xFF];
        let mut reader = CodedReader::with_slice(&data);

        assert_matches!(reader.read_varint64(), Err(Error::TruncatedMessage));

        let mut read = data.as_ref();
        let mut reader = CodedReader::with_stream(&mut read);

        assert_matches!(reader.read_varint64(), Err(Error::TruncatedMessage));
    }

    #[test]
    fn varint_across_refill() {
        // 14 filler bytes put the varint across the end of a 16 byte buffer
        let mut data = vec![0u8; 14];
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
        let mut read = data.as_slice();
        let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut read);

        reader.skip_raw_bytes(14).unwrap();
        assert_eq!(reader.read_varint32().unwrap(), u32::max_value());
        assert!(reader.is_at_end().unwrap());
        assert_eq!(reader.total_bytes_read(), 19);
    }

    #[test]
    fn read_tag() {
        let data = [0x08, 0x96, 0x01];
        let mut reader = CodedReader::with_slice(&data);

        assert_eq!(reader.read_tag().unwrap(), Some(tag(8)));
        assert_eq!(reader.read_int32().unwrap(), 150);
        assert_eq!(reader.read_tag().unwrap(), None);
        assert_eq!(reader.last_tag(), None);
        assert!(reader.check_last_tag_was(0).is_ok());
    }

    #[test]
    fn invalid_tags() {
        let mut reader = CodedReader::with_slice(&[0]);
        assert_matches!(reader.read_tag(), Err(Error::InvalidTag(0)));

        let mut reader = CodedReader::with_slice(&[7]);
        assert_matches!(reader.read_tag(), Err(Error::InvalidTag(7)));

        let mut reader = CodedReader::with_slice(&[14]);
        assert_matches!(reader.read_tag(), Err(Error::InvalidWireType(14)));
    }

    #[test]
    fn fixed_values() {
        let data = [
            0x78, 0x56, 0x34, 0x12,
            0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12,
            0x00, 0x00, 0x80, 0x3F,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF0, 0xBF,
        ];
        let mut reader = CodedReader::with_slice(&data);

        assert_eq!(reader.read_fixed32().unwrap(), 0x1234_5678);
        assert_eq!(reader.read_fixed64().unwrap(), 0x1234_5678_9ABC_DEF0);
        assert_eq!(reader.read_float().unwrap(), 1.0);
        assert_eq!(reader.read_double().unwrap(), -1.0);
        assert_matches!(reader.read_fixed32(), Err(Error::TruncatedMessage));
    }

    #[test]
    fn signed_values() {
        let data = [0x03, 0xFE, 0xFF, 0xFF, 0xFF, 0x0F, 0x02];
        let mut reader = CodedReader::with_slice(&data);

        assert_eq!(reader.read_sint32().unwrap(), -2);
        assert_eq!(reader.read_sint64().unwrap(), i32::max_value() as i64);
        assert_eq!(reader.read_bool().unwrap(), true);
    }

    #[test]
    fn limit_nesting() {
        let data = [1u8; 20];
        let mut reader = CodedReader::with_slice(&data);

        assert_eq!(reader.bytes_until_limit(), None);
        let old = reader.push_limit(10).unwrap();
        assert_eq!(reader.bytes_until_limit(), Some(10));
        assert_matches!(reader.read_raw_bytes(11), Err(Error::TruncatedMessage));
        assert!(reader.is_at_end().unwrap());
        reader.pop_limit(old);

        assert_eq!(reader.bytes_until_limit(), None);
        assert!(!reader.is_at_end().unwrap());
        assert_eq!(reader.read_raw_bytes(10).unwrap(), vec![1u8; 10]);
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn limit_nesting_stream() {
        let data = [1u8; 40];
        let mut read = data.as_ref();
        let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut read);

        let outer = reader.push_limit(30).unwrap();
        let inner = reader.push_limit(10).unwrap();
        assert_matches!(reader.read_raw_bytes(11), Err(Error::TruncatedMessage));
        assert_eq!(reader.total_bytes_read(), 10);
        reader.pop_limit(inner);

        assert_eq!(reader.bytes_until_limit(), Some(20));
        assert_eq!(reader.read_raw_bytes(20).unwrap(), vec![1u8; 20]);
        assert!(reader.is_at_end().unwrap());
        reader.pop_limit(outer);

        assert_eq!(reader.read_raw_bytes(10).unwrap(), vec![1u8; 10]);
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn invalid_limits() {
        let data = [0u8; 4];
        let mut reader = CodedReader::with_slice(&data);

        assert_matches!(reader.push_limit(-1), Err(Error::NegativeSize));
        let old = reader.push_limit(2).unwrap();
        assert_matches!(reader.push_limit(3), Err(Error::TruncatedMessage));
        reader.pop_limit(old);
    }

    #[test]
    fn large_bytes_are_chunked() {
        let mut data = vec![0x80, 0x02];
        data.extend((0..256).map(|i| i as u8));
        let mut read = data.as_slice();
        let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut read);

        let value = reader.read_byte_array().unwrap();
        assert_eq!(value.len(), 256);
        assert!(value.iter().enumerate().all(|(i, b)| *b == i as u8));
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn bogus_length() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x07, 1, 2, 3];
        let mut reader = CodedReader::with_slice(&data);
        assert_matches!(reader.read_byte_array(), Err(Error::TruncatedMessage));

        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let mut reader = CodedReader::with_slice(&data);
        assert_matches!(reader.read_byte_array(), Err(Error::NegativeSize));
    }

    #[test]
    fn size_limit() {
        let data = [0u8; 64];
        let mut read = data.as_ref();
        let mut reader =
            ReaderBuilder::new()
                .buffer_capacity(16)
                .size_limit(20)
                .with_stream(&mut read);

        assert_matches!(reader.read_raw_bytes(40), Err(Error::SizeLimitExceeded));

        let mut read = data.as_ref();
        let mut reader =
            ReaderBuilder::new()
                .buffer_capacity(16)
                .size_limit(20)
                .with_stream(&mut read);

        reader.read_raw_bytes(16).unwrap();
        reader.reset_size_counter();
        assert_eq!(reader.total_bytes_read(), 0);
        reader.read_raw_bytes(16).unwrap();
        assert_eq!(reader.set_size_limit(100), 20);
        reader.read_raw_bytes(32).unwrap();
        assert!(reader.is_at_end().unwrap());
    }

    #[test]
    fn slices_ignore_size_limit() {
        let data = [0u8; 64];
        let mut reader = ReaderBuilder::new().size_limit(8).with_slice(&data);

        reader.read_raw_bytes(64).unwrap();
    }

    #[test]
    fn aliasing() {
        let data = [0x03, 1, 2, 3];

        let mut reader = ReaderBuilder::new().enable_aliasing(true).with_slice(&data);
        assert_matches!(reader.read_bytes(), Ok(Cow::Borrowed(&[1, 2, 3])));

        let mut reader = CodedReader::with_slice(&data);
        assert_matches!(reader.read_bytes(), Ok(Cow::Owned(ref v)) if v == &[1, 2, 3]);

        let mut read = data.as_ref();
        let mut reader = ReaderBuilder::new().enable_aliasing(true).with_stream(&mut read);
        assert_matches!(reader.read_bytes(), Ok(Cow::Owned(ref v)) if v == &[1, 2, 3]);

        let mut reader = CodedReader::with_slice(&[0]);
        assert_matches!(reader.read_bytes(), Ok(Cow::Borrowed(&[])));
    }

    #[test]
    fn strings() {
        let data = [0x02, 0xC3, 0x28, 0x02, 0xC3, 0x28, 0x02, 0x68, 0x69];
        let mut reader = CodedReader::with_slice(&data);

        assert_eq!(reader.read_string().unwrap(), "\u{FFFD}(");
        assert_matches!(reader.read_string_require_utf8(), Err(Error::InvalidUtf8(_)));
        assert_eq!(reader.read_string_require_utf8().unwrap(), "hi");
    }

    #[test]
    fn skip_advances_exactly() {
        fn try_skip(data: &[u8]) {
            let mut reader = CodedReader::with_slice(data);
            let tag = reader.read_tag().unwrap().unwrap();
            assert!(reader.skip_field(tag).unwrap());
            assert_eq!(reader.total_bytes_read(), data.len() - 1);
            assert_eq!(reader.read_raw_byte().unwrap(), 0xEE);
        }

        try_skip(&[0x08, 0x96, 0x01, 0xEE]);
        try_skip(&[0x09, 1, 2, 3, 4, 5, 6, 7, 8, 0xEE]);
        try_skip(&[0x0A, 0x03, 1, 2, 3, 0xEE]);
        try_skip(&[0x0B, 0x10, 0x01, 0x1A, 0x00, 0x0C, 0xEE]);
        try_skip(&[0x0D, 1, 2, 3, 4, 0xEE]);
    }

    struct CountingSkips<'a> {
        data: &'a [u8],
        skips: usize,
    }

    impl stream::Read for CountingSkips<'_> {
        fn read(&mut self, buf: &mut [u8]) -> stream::Result<usize> {
            let len = cmp::min(buf.len(), self.data.len());
            buf[..len].copy_from_slice(&self.data[..len]);
            self.data = &self.data[len..];
            Ok(len)
        }
        fn skip(&mut self, len: usize) -> stream::Result<usize> {
            self.skips += 1;
            let len = cmp::min(len, self.data.len());
            self.data = &self.data[len..];
            Ok(len)
        }
    }

    #[test]
    fn large_skips_use_source_skip() {
        let mut data = Vec::new();
        {
            let mut writer = CodedWriter::with_write(&mut data);
            writer.write_bytes(1, &[0xAB; 1000]).unwrap();
            writer.write_uint32(2, 7).unwrap();
            writer.flush().unwrap();
        }

        let mut source = CountingSkips { data: &data, skips: 0 };
        {
            let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut source);
            let tag = reader.read_tag().unwrap().unwrap();
            assert!(reader.skip_field(tag).unwrap());
            assert_eq!(reader.total_bytes_read(), data.len() - 2);
            assert_eq!(reader.read_tag().unwrap(), Some(self::tag(0x10)));
            assert_eq!(reader.read_uint32().unwrap(), 7);
            assert!(reader.is_at_end().unwrap());
        }
        assert_eq!(source.skips, 1);

        let mut source = CountingSkips { data: &data[..100], skips: 0 };
        let mut reader = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut source);
        let tag = reader.read_tag().unwrap().unwrap();
        assert_matches!(reader.skip_field(tag), Err(Error::TruncatedMessage));

        let mut source = CountingSkips { data: &data, skips: 0 };
        let mut reader = ReaderBuilder::new().buffer_capacity(16).size_limit(500).with_stream(&mut source);
        let tag = reader.read_tag().unwrap().unwrap();
        assert_matches!(reader.skip_field(tag), Err(Error::SizeLimitExceeded));
    }

    #[test]
    fn skip_end_group() {
        let data = [0x0C, 0x08];
        let mut reader = CodedReader::with_slice(&data);
        let tag = reader.read_tag().unwrap().unwrap();

        assert_eq!(tag.wire_type(), WireType::EndGroup);
        assert!(!reader.skip_field(tag).unwrap());
        assert_eq!(reader.total_bytes_read(), 1);
    }

    #[test]
    fn skip_mismatched_group() {
        // group 1 closed by an end group tag for field 2
        let data = [0x0B, 0x14];
        let mut reader = CodedReader::with_slice(&data);
        let tag = reader.read_tag().unwrap().unwrap();

        assert_matches!(reader.skip_field(tag), Err(Error::InvalidEndTag));
        assert_eq!(reader.depth(), 0);
    }

    #[test]
    fn skip_to_copies() {
        let data = [0x08, 0x96, 0x01, 0x1A, 0x02, 0x68, 0x69, 0x0B, 0x15, 1, 2, 3, 4, 0x0C, 0x21, 1, 2, 3, 4, 5, 6, 7, 8];
        let mut reader = CodedReader::with_slice(&data);
        let mut output = Vec::new();
        {
            let mut writer = CodedWriter::with_write(&mut output);
            reader.skip_message_to(&mut writer).unwrap();
            writer.flush().unwrap();
        }

        assert_eq!(output.as_slice(), &data[..]);
    }

    fn nested_groups(depth: usize) -> Vec<u8> {
        let mut data = vec![0x0B; depth];
        data.extend(core::iter::repeat(0x0C).take(depth));
        data
    }

    #[test]
    fn recursion_limit() {
        let data = nested_groups(64);
        let mut reader = CodedReader::with_slice(&data);
        let tag = reader.read_tag().unwrap().unwrap();
        assert!(reader.skip_field(tag).unwrap());
        assert!(reader.is_at_end().unwrap());

        let data = nested_groups(65);
        let mut reader = CodedReader::with_slice(&data);
        let tag = reader.read_tag().unwrap().unwrap();
        assert_matches!(reader.skip_field(tag), Err(Error::RecursionLimitExceeded));

        let mut reader = ReaderBuilder::new().recursion_limit(65).with_slice(&data);
        assert_eq!(reader.set_recursion_limit(66), 65);
        let tag = reader.read_tag().unwrap().unwrap();
        assert!(reader.skip_field(tag).unwrap());
    }

    #[test]
    fn read_message() {
        // field 1 message { field 1: 150 }, field 2: 1
        let data = [0x0A, 0x03, 0x08, 0x96, 0x01, 0x10, 0x01];
        let mut reader = CodedReader::with_slice(&data);

        assert_eq!(reader.read_tag().unwrap(), Some(tag(10)));
        let inner = reader.read_message(|r| {
            assert_eq!(r.depth(), 1);
            let mut value = 0;
            while let Some(tag) = r.read_tag()? {
                assert_eq!(tag.field(), FieldNumber::new(1).unwrap());
                value = r.read_int32()?;
            }
            Ok(value)
        }).unwrap();

        assert_eq!(inner, 150);
        assert_eq!(reader.depth(), 0);
        assert_eq!(reader.bytes_until_limit(), None);
        assert_eq!(reader.read_tag().unwrap(), Some(tag(16)));
        assert_eq!(reader.read_bool().unwrap(), true);
    }

    #[test]
    fn read_message_restores_limit_on_error() {
        let data = [0x0A, 0x02, 0x08, 0xFF, 0x10, 0x01];
        let mut reader = CodedReader::with_slice(&data);

        reader.read_tag().unwrap();
        let result = reader.read_message(|r| r.skip_message());
        assert_matches!(result, Err(Error::TruncatedMessage));
        assert_eq!(reader.depth(), 0);
        assert_eq!(reader.bytes_until_limit(), None);
    }
}
