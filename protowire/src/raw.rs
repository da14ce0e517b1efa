//! Contains types for protobuf values and traits for value operations.
//! Each type wraps the Rust type a protobuf scalar decodes to and selects
//! the encoding used to read, write, and size it.

use crate::internal::Sealed;
use crate::io::{read, size, write, CodedOutput, CodedReader, WireType};
use trapper::{newtype, Wrapper};

/// A value capable of reading itself from an input, writing itself to an output, and calculating its size.
pub trait Value: Sized + Wrapper + Sealed {
    /// A value indicating the wire type of the value without packing.
    const WIRE_TYPE: WireType;

    /// Calculates the size of the value as encoded on the wire, without a tag
    fn size(&self) -> usize;

    /// Reads a new instance of the value from the [`CodedReader`](../io/struct.CodedReader.html)
    fn read_new(input: &mut CodedReader) -> read::Result<Self>;

    /// Writes the value to the output without a tag
    fn write_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result;
}

/// A value eligible for repeated field packing. Its wire type is Varint, Bit32, or Bit64.
pub trait Packable: Value { }

macro_rules! scalars {
    ($($(#[$m:meta])* $name:ident($inner:ty): $wt:ident, $size:expr, $read:ident, $write:ident;)*) => {
        $(
            newtype! {
                $(#[$m])*
                pub type $name($inner);
            }

            impl Sealed for $name { }
            impl Value for $name {
                const WIRE_TYPE: WireType = WireType::$wt;

                #[inline]
                fn size(&self) -> usize {
                    ($size)(self.0)
                }
                #[inline]
                fn read_new(input: &mut CodedReader) -> read::Result<Self> {
                    input.$read().map(Self)
                }
                #[inline]
                fn write_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
                    output.$write(self.0)
                }
            }
            impl Packable for $name { }
        )*
    };
}

scalars! {
    /// A varint encoded 32-bit value. Negative values are encoded as 10-byte varints.
    Int32(i32): Varint, size::int32_size_no_tag, read_int32, write_int32_no_tag;
    /// A varint encoded 32-bit value. Can be at most 5 bytes.
    Uint32(u32): Varint, size::uint32_size_no_tag, read_uint32, write_uint32_no_tag;
    /// A varint encoded 64-bit value. Can be at most 10 bytes.
    Int64(i64): Varint, size::int64_size_no_tag, read_int64, write_int64_no_tag;
    /// A varint encoded 64-bit value. Can be at most 10 bytes.
    Uint64(u64): Varint, size::uint64_size_no_tag, read_uint64, write_uint64_no_tag;
    /// A varint encoded 32-bit value. This is encoded using zig-zag encoding,
    /// which makes it more effecient at encoding negative values.
    Sint32(i32): Varint, size::sint32_size_no_tag, read_sint32, write_sint32_no_tag;
    /// A varint encoded 64-bit value. This is encoded using zig-zag encoding,
    /// which makes it more effecient at encoding negative values.
    Sint64(i64): Varint, size::sint64_size_no_tag, read_sint64, write_sint64_no_tag;
    /// A fixed 32-bit value. This is encoded as 4 little endian bytes.
    Fixed32(u32): Bit32, |_| size::FIXED32_SIZE, read_fixed32, write_fixed32_no_tag;
    /// A fixed 64-bit value. This is encoded as 8 little endian bytes.
    Fixed64(u64): Bit64, |_| size::FIXED64_SIZE, read_fixed64, write_fixed64_no_tag;
    /// A fixed signed 32-bit value. This is encoded as 4 little endian bytes.
    Sfixed32(i32): Bit32, |_| size::FIXED32_SIZE, read_sfixed32, write_sfixed32_no_tag;
    /// A fixed signed 64-bit value. This is encoded as 8 little endian bytes.
    Sfixed64(i64): Bit64, |_| size::FIXED64_SIZE, read_sfixed64, write_sfixed64_no_tag;
    /// A 32-bit floating point value. This is encoded as 4 little endian bytes.
    Float(f32): Bit32, |_| size::FIXED32_SIZE, read_float, write_float_no_tag;
    /// A 64-bit floating point value. This is encoded as 8 little endian bytes.
    Double(f64): Bit64, |_| size::FIXED64_SIZE, read_double, write_double_no_tag;
    /// A bool value. This is encoded as a varint value, but is always written as 1 byte.
    Bool(bool): Varint, |_| size::BOOL_SIZE, read_bool, write_bool_no_tag;
    /// An enum value, carried as its number. This is encoded as a 32-bit varint value.
    Enum(i32): Varint, size::enum_size_no_tag, read_enum, write_enum_no_tag;
}

newtype! {
    /// A string value. This is encoded as a length-delimited series of UTF8 bytes.
    pub type String(std::string::String);
}

impl Sealed for String { }
impl Value for String {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn size(&self) -> usize {
        size::string_size_no_tag(&self.0)
    }
    fn read_new(input: &mut CodedReader) -> read::Result<Self> {
        input.read_string_require_utf8().map(Self)
    }
    fn write_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        output.write_string_no_tag(&self.0)
    }
}

newtype! {
    /// A bytes value. This is encoded as a length-delimited series of bytes.
    pub type Bytes(Vec<u8>);
}

impl Sealed for Bytes { }
impl Value for Bytes {
    const WIRE_TYPE: WireType = WireType::LengthDelimited;

    fn size(&self) -> usize {
        size::bytes_size_no_tag(&self.0)
    }
    fn read_new(input: &mut CodedReader) -> read::Result<Self> {
        input.read_byte_array().map(Self)
    }
    fn write_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        output.write_bytes_no_tag(&self.0)
    }
}

/// Gets the size of a value without a tag
#[inline]
pub fn value_size<V: Value>(value: &V::Inner) -> usize {
    V::wrap_ref(value).size()
}

/// Gets the size of a value with a tag for the specified field number
#[inline]
pub fn field_size<V: Value>(number: u32, value: &V::Inner) -> usize {
    size::tag_size(number) + value_size::<V>(value)
}

/// Gets the size of the body of a packed repeated field, without its tag or length prefix
#[inline]
pub fn packed_size<V: Packable>(values: &[V::Inner]) -> usize {
    values.iter().map(value_size::<V>).sum()
}

/// Gets the size of a packed repeated field including its tag and length prefix. Empty fields aren't written.
pub fn packed_field_size<V: Packable>(number: u32, values: &[V::Inner]) -> usize {
    if values.is_empty() {
        0
    } else {
        size::tag_size(number) + size::length_delimited_size(packed_size::<V>(values))
    }
}

impl CodedReader<'_> {
    /// Reads a value using the encoding of the specified value type
    #[inline]
    pub fn read_value<V: Value>(&mut self) -> read::Result<V::Inner> {
        V::read_new(self).map(V::unwrap)
    }

    /// Reads a length delimited run of packed values, appending them to `values`
    pub fn read_packed<V: Packable>(&mut self, values: &mut Vec<V::Inner>) -> read::Result<()> {
        let len = self.read_length()?;
        let old = self.push_limit(len)?;
        let result = self.read_packed_values::<V>(values);
        self.pop_limit(old);
        result
    }

    fn read_packed_values<V: Packable>(&mut self, values: &mut Vec<V::Inner>) -> read::Result<()> {
        while !self.is_at_end()? {
            values.push(self.read_value::<V>()?);
        }
        Ok(())
    }
}
