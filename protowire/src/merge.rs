//! Merges encoded fields into a [`DynamicMessageBuilder`](../dynamic/struct.DynamicMessageBuilder.html)
//! using a [`MessageSchema`](../schema/trait.MessageSchema.html).
//!
//! Fields the schema doesn't know, fields read with a wire type other than the one the schema declares,
//! and enum numbers the enum doesn't define are never errors. They are kept in the message's unknown fields
//! so they can be written back out unchanged.

use crate::dynamic::{DynamicMessageBuilder, Value};
use crate::io::{message_set, read, CodedReader, FieldNumber, Tag, WireType};
use crate::schema::{FieldSchema, FieldType, MessageSchema};
use tracing::debug;

/// Reads fields into the builder until the end of the input, the current limit, or an end group tag
pub fn merge_from(input: &mut CodedReader, schema: &dyn MessageSchema, builder: &mut DynamicMessageBuilder) -> read::Result<()> {
    while let Some(tag) = input.read_tag()? {
        if !merge_field_from(input, schema, builder, tag)? {
            break;
        }
    }
    Ok(())
}

/// Reads the value of the field with the specified tag into the builder.
///
/// Returns false without reading anything if the tag is an end group tag.
pub fn merge_field_from(input: &mut CodedReader, schema: &dyn MessageSchema, builder: &mut DynamicMessageBuilder, tag: Tag) -> read::Result<bool> {
    if schema.message_set_wire_format() && tag.get() == message_set::ITEM_TAG {
        merge_message_set_item(input, schema, builder, tag.field())?;
        return Ok(true);
    }

    let number = tag.field();
    let field = match schema.field(number, schema.is_extension_number(number)) {
        Some(field) => field,
        None => return builder.unknown_fields_mut().merge_field_from(tag, input),
    };

    let wire_type = tag.wire_type();
    let field_type = field.field_type();
    let packed = field.is_repeated() && field_type.is_packable() && wire_type == WireType::LengthDelimited;
    if !packed && wire_type != field_type.wire_type() {
        if wire_type != WireType::EndGroup {
            debug!(field = number.get(), ?wire_type, expected = ?field_type.wire_type(), "wire type mismatch, keeping field as unknown");
        }
        return builder.unknown_fields_mut().merge_field_from(tag, input);
    }

    if packed {
        let len = input.read_length()?;
        let old = input.push_limit(len)?;
        let result = merge_packed_values(input, &field, builder);
        input.pop_limit(old);
        result?;
    } else {
        let value = read_value(input, &field, builder)?;
        store(builder, &field, value);
    }
    Ok(true)
}

fn merge_packed_values(input: &mut CodedReader, field: &FieldSchema, builder: &mut DynamicMessageBuilder) -> read::Result<()> {
    while !input.is_at_end()? {
        let value = read_value(input, field, builder)?;
        store(builder, field, value);
    }
    Ok(())
}

fn read_value(input: &mut CodedReader, field: &FieldSchema, builder: &DynamicMessageBuilder) -> read::Result<Value> {
    Ok(match field.field_type() {
        FieldType::Double => Value::Double(input.read_double()?),
        FieldType::Float => Value::Float(input.read_float()?),
        FieldType::Int64 => Value::Int64(input.read_int64()?),
        FieldType::Uint64 => Value::Uint64(input.read_uint64()?),
        FieldType::Int32 => Value::Int32(input.read_int32()?),
        FieldType::Fixed64 => Value::Fixed64(input.read_fixed64()?),
        FieldType::Fixed32 => Value::Fixed32(input.read_fixed32()?),
        FieldType::Bool => Value::Bool(input.read_bool()?),
        FieldType::String => Value::String(input.read_string_require_utf8()?),
        FieldType::Bytes => Value::Bytes(input.read_byte_array()?),
        FieldType::Uint32 => Value::Uint32(input.read_uint32()?),
        FieldType::Sfixed32 => Value::Sfixed32(input.read_sfixed32()?),
        FieldType::Sfixed64 => Value::Sfixed64(input.read_sfixed64()?),
        FieldType::Sint32 => Value::Sint32(input.read_sint32()?),
        FieldType::Sint64 => Value::Sint64(input.read_sint64()?),
        FieldType::Enum(_) => Value::Enum(input.read_enum()?),
        FieldType::Message(nested) => {
            let mut message = existing_message(builder, field);
            input.read_message(|input| merge_from(input, nested, &mut message))?;
            Value::Message(message.build())
        },
        FieldType::Group(nested) => {
            let mut group = existing_message(builder, field);
            input.read_group(field.number(), |input| merge_from(input, nested, &mut group))?;
            Value::Group(group.build())
        },
    })
}

fn existing_message(builder: &DynamicMessageBuilder, field: &FieldSchema) -> DynamicMessageBuilder {
    if field.is_repeated() {
        DynamicMessageBuilder::new()
    } else {
        singular_message(builder, field.number())
    }
}

fn singular_message(builder: &DynamicMessageBuilder, number: FieldNumber) -> DynamicMessageBuilder {
    builder
        .get(number)
        .and_then(|v| v.as_singular())
        .and_then(Value::as_message)
        .map(|m| m.to_builder())
        .unwrap_or_default()
}

fn store(builder: &mut DynamicMessageBuilder, field: &FieldSchema, value: Value) {
    let number = field.number();
    if let (FieldType::Enum(schema), Value::Enum(n)) = (field.field_type(), &value) {
        if schema.resolve(*n).is_none() {
            debug!(field = number.get(), value = *n, "unknown enum value, keeping it as an unknown varint");
            builder.unknown_fields_mut().merge_varint_field(number, *n as i64 as u64);
            return;
        }
    }

    if field.is_repeated() {
        builder.push(number, value);
    } else {
        builder.set(number, value);
    }
}

/// Reads a message-set item after its start group tag.
///
/// The type id may come before or after the message. A message read before its type id is known is kept as raw
/// bytes and parsed once the rest of the item has been read, one level deeper than the item's group. Items with
/// an unrecognized type id are kept as unknown length delimited fields, and items without a type id are dropped.
fn merge_message_set_item(input: &mut CodedReader, schema: &dyn MessageSchema, builder: &mut DynamicMessageBuilder, item: FieldNumber) -> read::Result<()> {
    input.read_group(item, |input| {
        let mut type_id = 0;
        let mut raw = None;
        while let Some(tag) = input.read_tag()? {
            match tag.get() {
                message_set::TYPE_ID_TAG => type_id = input.read_uint32()?,
                message_set::MESSAGE_TAG => {
                    match (raw.is_none(), extension(schema, type_id)) {
                        (true, Some((number, nested))) => {
                            let mut message = singular_message(builder, number);
                            input.read_message(|input| merge_from(input, nested, &mut message))?;
                            builder.set(number, Value::Message(message.build()));
                        },
                        _ => raw = Some(input.read_byte_array()?),
                    }
                },
                _ => if !input.skip_field(tag)? {
                    break;
                },
            }
        }

        let (raw, number) = match (raw, FieldNumber::new(type_id)) {
            (Some(raw), Some(number)) => (raw, number),
            _ => return Ok(()),
        };
        match extension(schema, type_id) {
            Some((number, nested)) => {
                let mut message = singular_message(builder, number);
                input.read_buffered_message(&raw, |input| merge_from(input, nested, &mut message))?;
                builder.set(number, Value::Message(message.build()));
            },
            None => {
                debug!(type_id, "unknown message set extension, keeping it as an unknown field");
                builder.unknown_fields_mut().merge_length_delimited_field(number, raw);
            },
        }
        Ok(())
    })
}

fn extension(schema: &dyn MessageSchema, type_id: u32) -> Option<(FieldNumber, &dyn MessageSchema)> {
    let number = FieldNumber::new(type_id)?;
    match schema.field(number, true)?.field_type() {
        FieldType::Message(nested) => Some((number, nested)),
        _ => None,
    }
}
