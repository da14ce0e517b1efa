//! Schema lookups consumed while merging and writing dynamic messages.
//!
//! A schema answers two questions for the dispatcher: which field a number refers to, and
//! which symbol an enum number resolves to. Generated code or hand written types can implement
//! [`MessageSchema`](trait.MessageSchema.html) and [`EnumSchema`](trait.EnumSchema.html) directly;
//! [`MessageDescriptor`](struct.MessageDescriptor.html) and [`EnumDescriptor`](struct.EnumDescriptor.html)
//! are table driven implementations built at runtime.

use crate::io::{FieldNumber, WireType};
use core::fmt::{self, Debug, Formatter};
use core::ops::Range;
use hashbrown::HashMap;

/// Field lookup for a message type
pub trait MessageSchema {
    /// Gets the schema of the field with the specified number, searching extensions if `is_extension` is set
    fn field(&self, number: FieldNumber, is_extension: bool) -> Option<FieldSchema<'_>>;

    /// Returns true if the field number falls in one of the message's extension ranges
    fn is_extension_number(&self, number: FieldNumber) -> bool;

    /// Returns true if extensions of this message are encoded as message-set items
    fn message_set_wire_format(&self) -> bool {
        false
    }
}

/// Symbol lookup for an enum type
pub trait EnumSchema {
    /// Gets the name of the enum value with the specified number
    fn resolve(&self, number: i32) -> Option<&str>;
}

/// A message schema with no fields. Every field read with it is kept as an unknown field.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySchema;

impl MessageSchema for EmptySchema {
    fn field(&self, _: FieldNumber, _: bool) -> Option<FieldSchema<'_>> {
        None
    }
    fn is_extension_number(&self, _: FieldNumber) -> bool {
        false
    }
}

/// The declared type of a field
#[derive(Clone, Copy)]
pub enum FieldType<'a> {
    /// A 64-bit float
    Double,
    /// A 32-bit float
    Float,
    /// A varint encoded signed 64-bit integer
    Int64,
    /// A varint encoded unsigned 64-bit integer
    Uint64,
    /// A varint encoded signed 32-bit integer
    Int32,
    /// A little endian unsigned 64-bit integer
    Fixed64,
    /// A little endian unsigned 32-bit integer
    Fixed32,
    /// A boolean
    Bool,
    /// A UTF8 string
    String,
    /// An arbitrary byte string
    Bytes,
    /// A varint encoded unsigned 32-bit integer
    Uint32,
    /// A little endian signed 32-bit integer
    Sfixed32,
    /// A little endian signed 64-bit integer
    Sfixed64,
    /// A zigzag varint encoded signed 32-bit integer
    Sint32,
    /// A zigzag varint encoded signed 64-bit integer
    Sint64,
    /// An enum value, resolved with the enum's schema
    Enum(&'a dyn EnumSchema),
    /// A length delimited embedded message
    Message(&'a dyn MessageSchema),
    /// A group delimited by start and end group tags
    Group(&'a dyn MessageSchema),
}

impl FieldType<'_> {
    /// Gets the wire type values of this type are encoded with when not packed
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Double | FieldType::Fixed64 | FieldType::Sfixed64 => WireType::Bit64,
            FieldType::Float | FieldType::Fixed32 | FieldType::Sfixed32 => WireType::Bit32,
            FieldType::Int64 |
            FieldType::Uint64 |
            FieldType::Int32 |
            FieldType::Bool |
            FieldType::Uint32 |
            FieldType::Sint32 |
            FieldType::Sint64 |
            FieldType::Enum(_) => WireType::Varint,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => WireType::LengthDelimited,
            FieldType::Group(_) => WireType::StartGroup,
        }
    }

    /// Returns true if repeated fields of this type can be packed
    pub fn is_packable(&self) -> bool {
        self.wire_type().is_packable()
    }

    fn name(&self) -> &'static str {
        match self {
            FieldType::Double => "Double",
            FieldType::Float => "Float",
            FieldType::Int64 => "Int64",
            FieldType::Uint64 => "Uint64",
            FieldType::Int32 => "Int32",
            FieldType::Fixed64 => "Fixed64",
            FieldType::Fixed32 => "Fixed32",
            FieldType::Bool => "Bool",
            FieldType::String => "String",
            FieldType::Bytes => "Bytes",
            FieldType::Uint32 => "Uint32",
            FieldType::Sfixed32 => "Sfixed32",
            FieldType::Sfixed64 => "Sfixed64",
            FieldType::Sint32 => "Sint32",
            FieldType::Sint64 => "Sint64",
            FieldType::Enum(_) => "Enum",
            FieldType::Message(_) => "Message",
            FieldType::Group(_) => "Group",
        }
    }
}

impl Debug for FieldType<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Label {
    Singular,
    Repeated,
    Packed,
}

/// The schema of a single field of a message
#[derive(Clone, Copy, Debug)]
pub struct FieldSchema<'a> {
    number: FieldNumber,
    field_type: FieldType<'a>,
    label: Label,
}

impl<'a> FieldSchema<'a> {
    /// Creates the schema of a singular field
    pub fn singular(number: FieldNumber, field_type: FieldType<'a>) -> Self {
        FieldSchema { number, field_type, label: Label::Singular }
    }

    /// Creates the schema of a repeated field written with one tag per value
    pub fn repeated(number: FieldNumber, field_type: FieldType<'a>) -> Self {
        FieldSchema { number, field_type, label: Label::Repeated }
    }

    /// Creates the schema of a repeated field written as a single length delimited run.
    /// Types that can't be packed are written unpacked.
    pub fn packed(number: FieldNumber, field_type: FieldType<'a>) -> Self {
        let label = if field_type.is_packable() { Label::Packed } else { Label::Repeated };
        FieldSchema { number, field_type, label }
    }

    /// Gets the field number
    pub fn number(&self) -> FieldNumber {
        self.number
    }

    /// Gets the declared type of the field
    pub fn field_type(&self) -> FieldType<'a> {
        self.field_type
    }

    /// Returns true if the field can hold more than one value
    pub fn is_repeated(&self) -> bool {
        self.label != Label::Singular
    }

    /// Returns true if the field's values are written as a packed run
    pub fn is_packed(&self) -> bool {
        self.label == Label::Packed
    }
}

/// A table driven enum schema
#[derive(Clone, Debug, Default)]
pub struct EnumDescriptor {
    name: String,
    values: HashMap<i32, String>,
}

impl EnumDescriptor {
    /// Creates a new enum descriptor with no values
    pub fn new(name: impl Into<String>) -> Self {
        EnumDescriptor { name: name.into(), values: HashMap::new() }
    }

    /// Adds a value to the enum. A later value with the same number replaces the earlier one.
    pub fn with_value(mut self, name: impl Into<String>, number: i32) -> Self {
        self.values.insert(number, name.into());
        self
    }

    /// Gets the name of the enum type
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl EnumSchema for EnumDescriptor {
    fn resolve(&self, number: i32) -> Option<&str> {
        self.values.get(&number).map(String::as_str)
    }
}

/// A table driven message schema.
///
/// Nested types are borrowed from descriptors that outlive this one. Recursive message types
/// need a [`MessageSchema`](trait.MessageSchema.html) implementation that can refer to itself.
#[derive(Clone, Debug, Default)]
pub struct MessageDescriptor<'a> {
    name: String,
    fields: HashMap<FieldNumber, FieldSchema<'a>>,
    extensions: HashMap<FieldNumber, FieldSchema<'a>>,
    extension_ranges: Vec<Range<u32>>,
    message_set: bool,
}

impl<'a> MessageDescriptor<'a> {
    /// Creates a new message descriptor with no fields
    pub fn new(name: impl Into<String>) -> Self {
        MessageDescriptor {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a field to the message
    pub fn with_field(mut self, field: FieldSchema<'a>) -> Self {
        self.fields.insert(field.number(), field);
        self
    }

    /// Declares a range of field numbers reserved for extensions. The end of the range is exclusive.
    pub fn with_extension_range(mut self, range: Range<u32>) -> Self {
        self.extension_ranges.push(range);
        self
    }

    /// Adds an extension to the message
    pub fn with_extension(mut self, field: FieldSchema<'a>) -> Self {
        self.extensions.insert(field.number(), field);
        self
    }

    /// Marks the message as using the message-set wire format for its extensions
    pub fn with_message_set_wire_format(mut self) -> Self {
        self.message_set = true;
        self
    }

    /// Gets the name of the message type
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl MessageSchema for MessageDescriptor<'_> {
    fn field(&self, number: FieldNumber, is_extension: bool) -> Option<FieldSchema<'_>> {
        if is_extension {
            self.extensions.get(&number).copied()
        } else {
            self.fields.get(&number).copied()
        }
    }

    fn is_extension_number(&self, number: FieldNumber) -> bool {
        self.extensions.contains_key(&number) ||
        self.extension_ranges.iter().any(|r| r.contains(&number.get()))
    }

    fn message_set_wire_format(&self) -> bool {
        self.message_set
    }
}
