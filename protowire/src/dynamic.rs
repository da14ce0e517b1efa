//! Messages decoded against a runtime schema.
//!
//! A [`DynamicMessageBuilder`](struct.DynamicMessageBuilder.html) collects values while a message is merged
//! and freezes into a [`DynamicMessage`](struct.DynamicMessage.html). Values are stored by field number
//! along with the unknown fields the schema didn't recognize.

use crate::io::{read, size, write, CodedOutput, CodedReader, CodedWriter, Encode, FieldNumber, WireType};
use crate::merge;
use crate::schema::{EmptySchema, FieldSchema, FieldType, MessageSchema};
use crate::unknown_fields::{UnknownFieldSet, UnknownFieldSetBuilder};
use std::collections::BTreeMap;
use std::{mem, slice};

static EMPTY_SCHEMA: EmptySchema = EmptySchema;

/// A single decoded value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A double value
    Double(f64),
    /// A float value
    Float(f32),
    /// An int32 value
    Int32(i32),
    /// An int64 value
    Int64(i64),
    /// A uint32 value
    Uint32(u32),
    /// A uint64 value
    Uint64(u64),
    /// An sint32 value
    Sint32(i32),
    /// An sint64 value
    Sint64(i64),
    /// A fixed32 value
    Fixed32(u32),
    /// A fixed64 value
    Fixed64(u64),
    /// An sfixed32 value
    Sfixed32(i32),
    /// An sfixed64 value
    Sfixed64(i64),
    /// A bool value
    Bool(bool),
    /// A string value
    String(String),
    /// A bytes value
    Bytes(Vec<u8>),
    /// An enum value known to the field's enum type
    Enum(i32),
    /// An embedded message
    Message(DynamicMessage),
    /// A group
    Group(DynamicMessage),
}

impl Value {
    /// Gets the wire type this value is written with when not packed
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::Double(_) | Value::Fixed64(_) | Value::Sfixed64(_) => WireType::Bit64,
            Value::Float(_) | Value::Fixed32(_) | Value::Sfixed32(_) => WireType::Bit32,
            Value::Int32(_) |
            Value::Int64(_) |
            Value::Uint32(_) |
            Value::Uint64(_) |
            Value::Sint32(_) |
            Value::Sint64(_) |
            Value::Bool(_) |
            Value::Enum(_) => WireType::Varint,
            Value::String(_) | Value::Bytes(_) | Value::Message(_) => WireType::LengthDelimited,
            Value::Group(_) => WireType::StartGroup,
        }
    }

    /// Gets the embedded message or group of this value
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            Value::Message(m) | Value::Group(m) => Some(m),
            _ => None,
        }
    }

    fn size_with(&self, nested: &dyn MessageSchema) -> usize {
        match self {
            Value::Double(_) | Value::Fixed64(_) | Value::Sfixed64(_) => size::FIXED64_SIZE,
            Value::Float(_) | Value::Fixed32(_) | Value::Sfixed32(_) => size::FIXED32_SIZE,
            Value::Int32(v) => size::int32_size_no_tag(*v),
            Value::Int64(v) => size::int64_size_no_tag(*v),
            Value::Uint32(v) => size::uint32_size_no_tag(*v),
            Value::Uint64(v) => size::uint64_size_no_tag(*v),
            Value::Sint32(v) => size::sint32_size_no_tag(*v),
            Value::Sint64(v) => size::sint64_size_no_tag(*v),
            Value::Bool(_) => size::BOOL_SIZE,
            Value::String(v) => size::string_size_no_tag(v),
            Value::Bytes(v) => size::bytes_size_no_tag(v),
            Value::Enum(v) => size::enum_size_no_tag(*v),
            Value::Message(m) => size::message_size_no_tag(m.encoded_len(nested)),
            Value::Group(m) => m.encoded_len(nested),
        }
    }

    fn write_with<O: CodedOutput + ?Sized>(&self, nested: &dyn MessageSchema, output: &mut O) -> write::Result {
        match self {
            Value::Double(v) => output.write_double_no_tag(*v),
            Value::Float(v) => output.write_float_no_tag(*v),
            Value::Int32(v) => output.write_int32_no_tag(*v),
            Value::Int64(v) => output.write_int64_no_tag(*v),
            Value::Uint32(v) => output.write_uint32_no_tag(*v),
            Value::Uint64(v) => output.write_uint64_no_tag(*v),
            Value::Sint32(v) => output.write_sint32_no_tag(*v),
            Value::Sint64(v) => output.write_sint64_no_tag(*v),
            Value::Fixed32(v) => output.write_fixed32_no_tag(*v),
            Value::Fixed64(v) => output.write_fixed64_no_tag(*v),
            Value::Sfixed32(v) => output.write_sfixed32_no_tag(*v),
            Value::Sfixed64(v) => output.write_sfixed64_no_tag(*v),
            Value::Bool(v) => output.write_bool_no_tag(*v),
            Value::String(v) => output.write_string_no_tag(v),
            Value::Bytes(v) => output.write_bytes_no_tag(v),
            Value::Enum(v) => output.write_enum_no_tag(*v),
            Value::Message(m) => output.write_message_no_tag(&m.encode_with(nested)),
            Value::Group(m) => m.encode_with(nested).encode(output),
        }
    }
}

/// The value or values of a field
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// The value of a singular field
    Singular(Value),
    /// The values of a repeated field in the order they were read
    Repeated(Vec<Value>),
}

impl FieldValue {
    /// Gets the value of a singular field
    pub fn as_singular(&self) -> Option<&Value> {
        match self {
            FieldValue::Singular(v) => Some(v),
            FieldValue::Repeated(_) => None,
        }
    }

    /// Gets every value of the field. A singular field has one value.
    pub fn values(&self) -> &[Value] {
        match self {
            FieldValue::Singular(v) => slice::from_ref(v),
            FieldValue::Repeated(v) => v,
        }
    }
}

/// A mutable dynamic message, filled while merging
#[derive(Clone, Debug, Default)]
pub struct DynamicMessageBuilder {
    fields: BTreeMap<FieldNumber, FieldValue>,
    unknown_fields: UnknownFieldSetBuilder,
}

impl DynamicMessageBuilder {
    /// Creates a new empty builder
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the value of a field
    pub fn get(&self, number: FieldNumber) -> Option<&FieldValue> {
        self.fields.get(&number)
    }

    /// Sets the value of a singular field, replacing any existing value
    pub fn set(&mut self, number: FieldNumber, value: Value) -> &mut Self {
        self.fields.insert(number, FieldValue::Singular(value));
        self
    }

    /// Appends a value to a repeated field. A singular value already in the field becomes its first value.
    pub fn push(&mut self, number: FieldNumber, value: Value) -> &mut Self {
        let slot = self.fields.entry(number).or_insert_with(|| FieldValue::Repeated(Vec::new()));
        let mut values = match mem::replace(slot, FieldValue::Repeated(Vec::new())) {
            FieldValue::Singular(first) => vec![first],
            FieldValue::Repeated(values) => values,
        };
        values.push(value);
        *slot = FieldValue::Repeated(values);
        self
    }

    /// Removes the value of a field
    pub fn clear_field(&mut self, number: FieldNumber) -> &mut Self {
        self.fields.remove(&number);
        self
    }

    /// Merges the fields of a length prefixed message written by
    /// [`DynamicMessage::write_delimited_to`](struct.DynamicMessage.html#method.write_delimited_to).
    ///
    /// Returns false if the input was already at its end.
    pub fn merge_delimited_from(&mut self, schema: &dyn MessageSchema, input: &mut CodedReader) -> read::Result<bool> {
        if input.is_at_end()? {
            return Ok(false);
        }
        input.read_message(|input| merge::merge_from(input, schema, self))?;
        Ok(true)
    }

    /// Gets the unknown fields of the message
    pub fn unknown_fields(&self) -> &UnknownFieldSetBuilder {
        &self.unknown_fields
    }

    /// Gets a mutable reference to the unknown fields of the message
    pub fn unknown_fields_mut(&mut self) -> &mut UnknownFieldSetBuilder {
        &mut self.unknown_fields
    }

    /// Freezes the builder into a message
    pub fn build(self) -> DynamicMessage {
        DynamicMessage {
            fields: self.fields,
            unknown_fields: self.unknown_fields.build(),
        }
    }
}

/// A frozen dynamic message
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DynamicMessage {
    fields: BTreeMap<FieldNumber, FieldValue>,
    unknown_fields: UnknownFieldSet,
}

impl DynamicMessage {
    /// Creates a builder containing a copy of this message's values
    pub fn to_builder(&self) -> DynamicMessageBuilder {
        DynamicMessageBuilder {
            fields: self.fields.clone(),
            unknown_fields: self.unknown_fields.to_builder(),
        }
    }

    /// Gets the value of a field
    pub fn get(&self, number: FieldNumber) -> Option<&FieldValue> {
        self.fields.get(&number)
    }

    /// Returns an iterator over the set fields of the message in ascending field number order
    pub fn fields(&self) -> impl Iterator<Item = (FieldNumber, &FieldValue)> + '_ {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    /// Gets the unknown fields of the message
    pub fn unknown_fields(&self) -> &UnknownFieldSet {
        &self.unknown_fields
    }

    /// Returns true if the message has no known or unknown fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unknown_fields.is_empty()
    }

    /// Pairs the message with the schema used to write it
    pub fn encode_with<'a>(&'a self, schema: &'a dyn MessageSchema) -> Encoded<'a> {
        Encoded { message: self, schema }
    }

    /// Gets the size of the message as written with the specified schema
    pub fn encoded_len(&self, schema: &dyn MessageSchema) -> usize {
        let fields: usize = self.fields
            .iter()
            .map(|(number, value)| field_size(schema, *number, value))
            .sum();
        let unknown = if schema.message_set_wire_format() {
            self.unknown_fields.serialized_size_as_message_set()
        } else {
            self.unknown_fields.serialized_size()
        };
        fields + unknown
    }

    /// Writes the message with the specified schema
    pub fn write_to<O: CodedOutput + ?Sized>(&self, schema: &dyn MessageSchema, output: &mut O) -> write::Result {
        for (number, value) in &self.fields {
            write_field(schema, *number, value, output)?;
        }
        if schema.message_set_wire_format() {
            self.unknown_fields.write_as_message_set_to(output)
        } else {
            self.unknown_fields.write_to(output)
        }
    }

    /// Encodes the message into a new vector
    pub fn to_bytes(&self, schema: &dyn MessageSchema) -> Result<Vec<u8>, write::Error> {
        let mut output = vec![0; self.encoded_len(schema)];
        let mut writer = CodedWriter::with_slice(&mut output);
        self.write_to(schema, &mut writer)?;
        writer.check_no_space_left()?;
        Ok(output)
    }

    /// Writes the message prefixed with its length
    pub fn write_delimited_to<O: CodedOutput + ?Sized>(&self, schema: &dyn MessageSchema, output: &mut O) -> write::Result {
        output.write_message_no_tag(&self.encode_with(schema))
    }

    /// Decodes a message from the rest of the input
    pub fn from_reader(schema: &dyn MessageSchema, input: &mut CodedReader) -> read::Result<Self> {
        let mut builder = DynamicMessageBuilder::new();
        merge::merge_from(input, schema, &mut builder)?;
        input.check_last_tag_was(0)?;
        Ok(builder.build())
    }

    /// Decodes a message from the specified bytes
    pub fn from_bytes(schema: &dyn MessageSchema, data: &[u8]) -> read::Result<Self> {
        Self::from_reader(schema, &mut CodedReader::with_slice(data))
    }
}

/// A message paired with the schema it's written with
#[derive(Clone, Copy)]
pub struct Encoded<'a> {
    message: &'a DynamicMessage,
    schema: &'a dyn MessageSchema,
}

impl Encode for Encoded<'_> {
    fn encoded_len(&self) -> usize {
        self.message.encoded_len(self.schema)
    }
    fn encode<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        self.message.write_to(self.schema, output)
    }
}

struct Packed<'a> {
    values: &'a [Value],
}

impl Encode for Packed<'_> {
    fn encoded_len(&self) -> usize {
        self.values.iter().map(|v| v.size_with(&EMPTY_SCHEMA)).sum()
    }
    fn encode<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        for value in self.values {
            value.write_with(&EMPTY_SCHEMA, output)?;
        }
        Ok(())
    }
}

fn lookup(schema: &dyn MessageSchema, number: FieldNumber) -> Option<(FieldSchema<'_>, bool)> {
    let is_extension = schema.is_extension_number(number);
    schema.field(number, is_extension).map(|f| (f, is_extension))
}

fn nested<'a>(field: Option<&FieldSchema<'a>>) -> &'a dyn MessageSchema {
    match field.map(FieldSchema::field_type) {
        Some(FieldType::Message(schema)) | Some(FieldType::Group(schema)) => schema,
        _ => &EMPTY_SCHEMA,
    }
}

fn is_packed(field: Option<&FieldSchema>, values: &[Value]) -> bool {
    field.map_or(false, FieldSchema::is_packed) && values.iter().all(|v| v.wire_type().is_packable())
}

fn is_message_set_item(schema: &dyn MessageSchema, is_extension: bool, value: &FieldValue) -> bool {
    schema.message_set_wire_format() && is_extension && matches!(value, FieldValue::Singular(Value::Message(_)))
}

fn value_size(number: FieldNumber, value: &Value, nested: &dyn MessageSchema) -> usize {
    match value {
        Value::Group(m) => size::group_size(number.get(), m.encoded_len(nested)),
        _ => size::tag_size(number.get()) + value.size_with(nested),
    }
}

fn field_size(schema: &dyn MessageSchema, number: FieldNumber, value: &FieldValue) -> usize {
    let field = lookup(schema, number);
    let is_extension = field.map_or(false, |(_, e)| e);
    let field = field.map(|(f, _)| f);
    let nested = nested(field.as_ref());

    if is_message_set_item(schema, is_extension, value) {
        return value
            .values()
            .iter()
            .filter_map(Value::as_message)
            .map(|m| size::message_set_extension_size(number.get(), m.encoded_len(nested)))
            .sum();
    }

    let values = value.values();
    if values.is_empty() {
        0
    } else if is_packed(field.as_ref(), values) {
        size::tag_size(number.get()) + size::message_size_no_tag(Packed { values }.encoded_len())
    } else {
        values.iter().map(|v| value_size(number, v, nested)).sum()
    }
}

fn write_field<O: CodedOutput + ?Sized>(schema: &dyn MessageSchema, number: FieldNumber, value: &FieldValue, output: &mut O) -> write::Result {
    let field = lookup(schema, number);
    let is_extension = field.map_or(false, |(_, e)| e);
    let field = field.map(|(f, _)| f);
    let nested = nested(field.as_ref());

    if is_message_set_item(schema, is_extension, value) {
        for message in value.values().iter().filter_map(Value::as_message) {
            output.write_message_set_extension(number.get(), &message.encode_with(nested))?;
        }
        return Ok(());
    }

    let values = value.values();
    if values.is_empty() {
        Ok(())
    } else if is_packed(field.as_ref(), values) {
        output.write_message(number.get(), &Packed { values })
    } else {
        for v in values {
            match v {
                Value::Group(m) => output.write_group(number.get(), &m.encode_with(nested))?,
                _ => {
                    output.write_tag(number.get(), v.wire_type())?;
                    v.write_with(nested, output)?;
                },
            }
        }
        Ok(())
    }
}
