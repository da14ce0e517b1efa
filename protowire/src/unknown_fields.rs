//! Defines the `UnknownFieldSet`, a struct used to contain unknown fields as they were read from coded readers.
//!
//! As APIs are updated, certain fields may be removed or added from proto file definitions. If an old version of a message
//! encounters fields it doesn't recognize it can still read them to be returned again via unknown fields.
//!
//! Unknown fields for unique field numbers can exist for multiple wire types at once to ensure that all data is properly returned.
//! Sets are written back out in ascending field number order.
//!
//! Sets are built with an [`UnknownFieldSetBuilder`](struct.UnknownFieldSetBuilder.html) while parsing
//! and frozen into an [`UnknownFieldSet`](struct.UnknownFieldSet.html) once the owning message is complete.

use crate::io::{read, size, write, CodedOutput, CodedReader, CodedWriter, Encode, FieldNumber, Tag, WireType};
use std::collections::{btree_map, BTreeMap};

/// The values of a single field number in an unknown field set, partitioned by wire type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Field {
    varint: Vec<u64>,
    fixed32: Vec<u32>,
    fixed64: Vec<u64>,
    length_delimited: Vec<Vec<u8>>,
    group: Vec<UnknownFieldSet>,
}

static EMPTY_FIELD: Field = Field {
    varint: Vec::new(),
    fixed32: Vec::new(),
    fixed64: Vec::new(),
    length_delimited: Vec::new(),
    group: Vec::new(),
};

impl Field {
    /// Creates a new field with no values
    pub fn new() -> Self {
        Default::default()
    }

    /// Gets the varint values of this field
    pub fn varint(&self) -> &[u64] {
        &self.varint
    }
    /// Gets the fixed 32-bit values of this field
    pub fn fixed32(&self) -> &[u32] {
        &self.fixed32
    }
    /// Gets the fixed 64-bit values of this field
    pub fn fixed64(&self) -> &[u64] {
        &self.fixed64
    }
    /// Gets the length delimited values of this field
    pub fn length_delimited(&self) -> &[Vec<u8>] {
        &self.length_delimited
    }
    /// Gets the group values of this field
    pub fn group(&self) -> &[UnknownFieldSet] {
        &self.group
    }

    /// Adds a varint value to this field
    pub fn add_varint(&mut self, value: u64) -> &mut Self {
        self.varint.push(value);
        self
    }
    /// Adds a fixed 32-bit value to this field
    pub fn add_fixed32(&mut self, value: u32) -> &mut Self {
        self.fixed32.push(value);
        self
    }
    /// Adds a fixed 64-bit value to this field
    pub fn add_fixed64(&mut self, value: u64) -> &mut Self {
        self.fixed64.push(value);
        self
    }
    /// Adds a length delimited value to this field
    pub fn add_length_delimited(&mut self, value: Vec<u8>) -> &mut Self {
        self.length_delimited.push(value);
        self
    }
    /// Adds a group value to this field
    pub fn add_group(&mut self, value: UnknownFieldSet) -> &mut Self {
        self.group.push(value);
        self
    }

    /// Returns true if this field has no values
    pub fn is_empty(&self) -> bool {
        self.varint.is_empty() &&
        self.fixed32.is_empty() &&
        self.fixed64.is_empty() &&
        self.length_delimited.is_empty() &&
        self.group.is_empty()
    }

    /// Appends the values of another field after the values of this field
    pub fn merge(&mut self, other: &Field) {
        self.varint.extend_from_slice(&other.varint);
        self.fixed32.extend_from_slice(&other.fixed32);
        self.fixed64.extend_from_slice(&other.fixed64);
        self.length_delimited.extend(other.length_delimited.iter().cloned());
        self.group.extend(other.group.iter().cloned());
    }

    /// Gets the size of all the values of this field as encoded with the specified field number
    pub fn serialized_size(&self, number: FieldNumber) -> usize {
        let tag = size::tag_size(number.get());
        let mut result = 0;
        result += self.varint.iter().map(|v| tag + size::uint64_size_no_tag(*v)).sum::<usize>();
        result += self.fixed32.len() * (tag + size::FIXED32_SIZE);
        result += self.fixed64.len() * (tag + size::FIXED64_SIZE);
        result += self.length_delimited.iter().map(|v| tag + size::bytes_size_no_tag(v)).sum::<usize>();
        result += self.group.iter().map(|v| size::group_size(number.get(), v.serialized_size())).sum::<usize>();
        result
    }

    /// Writes all the values of this field with the specified field number
    pub fn write_to<O: CodedOutput + ?Sized>(&self, number: FieldNumber, output: &mut O) -> write::Result {
        let number = number.get();
        for value in &self.varint {
            output.write_uint64(number, *value)?;
        }
        for value in &self.fixed32 {
            output.write_fixed32(number, *value)?;
        }
        for value in &self.fixed64 {
            output.write_fixed64(number, *value)?;
        }
        for value in &self.length_delimited {
            output.write_bytes(number, value)?;
        }
        for value in &self.group {
            output.write_group(number, value)?;
        }
        Ok(())
    }

    /// Gets the size of the length delimited values of this field written as message-set items
    pub fn serialized_size_as_message_set_extension(&self, number: FieldNumber) -> usize {
        self.length_delimited
            .iter()
            .map(|v| size::message_set_extension_size(number.get(), v.len()))
            .sum()
    }

    /// Writes the length delimited values of this field as message-set items with the field number as their type id
    pub fn write_as_message_set_extension_to<O: CodedOutput + ?Sized>(&self, number: FieldNumber, output: &mut O) -> write::Result {
        for value in &self.length_delimited {
            output.write_raw_message_set_extension(number.get(), value)?;
        }
        Ok(())
    }
}

/// A mutable set of unknown fields, filled while parsing and frozen with [`build`](#method.build).
#[derive(Clone, Debug, Default)]
pub struct UnknownFieldSetBuilder {
    fields: BTreeMap<FieldNumber, Field>,
}

impl UnknownFieldSetBuilder {
    /// Creates a new empty builder
    pub fn new() -> Self {
        Default::default()
    }

    fn field_mut(&mut self, number: FieldNumber) -> &mut Field {
        self.fields.entry(number).or_default()
    }

    /// Returns true if the builder has values for the specified field
    pub fn has_field(&self, number: FieldNumber) -> bool {
        self.fields.contains_key(&number)
    }

    /// Returns true if the builder has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads the value of the field with the specified tag into the set, using the wire type of the tag.
    ///
    /// Returns false without reading anything if the tag is an end group tag.
    pub fn merge_field_from(&mut self, tag: Tag, input: &mut CodedReader) -> read::Result<bool> {
        let number = tag.field();
        match tag.wire_type() {
            WireType::Varint => {
                let value = input.read_uint64()?;
                self.field_mut(number).add_varint(value);
            },
            WireType::Bit64 => {
                let value = input.read_fixed64()?;
                self.field_mut(number).add_fixed64(value);
            },
            WireType::LengthDelimited => {
                let value = input.read_byte_array()?;
                self.field_mut(number).add_length_delimited(value);
            },
            WireType::StartGroup => {
                let group = input.read_group(number, |input| {
                    let mut builder = UnknownFieldSetBuilder::new();
                    builder.merge_from(input)?;
                    Ok(builder.build())
                })?;
                self.field_mut(number).add_group(group);
            },
            WireType::EndGroup => return Ok(false),
            WireType::Bit32 => {
                let value = input.read_fixed32()?;
                self.field_mut(number).add_fixed32(value);
            },
        }
        Ok(true)
    }

    /// Reads fields into the set until the end of the input, the current limit, or an end group tag
    pub fn merge_from(&mut self, input: &mut CodedReader) -> read::Result<()> {
        while let Some(tag) = input.read_tag()? {
            if !self.merge_field_from(tag, input)? {
                break;
            }
        }
        Ok(())
    }

    /// Merges a length prefixed set written by [`UnknownFieldSet::write_delimited_to`](struct.UnknownFieldSet.html#method.write_delimited_to).
    ///
    /// Returns false if the input was already at its end.
    pub fn merge_delimited_from(&mut self, input: &mut CodedReader) -> read::Result<bool> {
        if input.is_at_end()? {
            return Ok(false);
        }
        input.read_message(|input| self.merge_from(input))?;
        Ok(true)
    }

    /// Appends the values of a field to the values already in the set for that number
    pub fn merge_field(&mut self, number: FieldNumber, field: &Field) -> &mut Self {
        self.field_mut(number).merge(field);
        self
    }

    /// Sets a field, replacing any values already in the set for that number
    pub fn add_field(&mut self, number: FieldNumber, field: Field) -> &mut Self {
        self.fields.insert(number, field);
        self
    }

    /// Adds a varint value for the specified field
    pub fn merge_varint_field(&mut self, number: FieldNumber, value: u64) -> &mut Self {
        self.field_mut(number).add_varint(value);
        self
    }

    /// Adds a length delimited value for the specified field
    pub fn merge_length_delimited_field(&mut self, number: FieldNumber, value: Vec<u8>) -> &mut Self {
        self.field_mut(number).add_length_delimited(value);
        self
    }

    /// Appends all the fields of another set
    pub fn merge(&mut self, other: &UnknownFieldSet) -> &mut Self {
        for (number, field) in &other.fields {
            self.merge_field(*number, field);
        }
        self
    }

    /// Removes all fields
    pub fn clear(&mut self) -> &mut Self {
        self.fields.clear();
        self
    }

    /// Removes all values of a single field
    pub fn clear_field(&mut self, number: FieldNumber) -> &mut Self {
        self.fields.remove(&number);
        self
    }

    /// Freezes the builder into an unknown field set
    pub fn build(self) -> UnknownFieldSet {
        UnknownFieldSet { fields: self.fields }
    }
}

/// A set of unknown fields encountered while parsing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnknownFieldSet {
    fields: BTreeMap<FieldNumber, Field>,
}

impl UnknownFieldSet {
    /// Creates a new empty set
    pub fn new() -> Self {
        Default::default()
    }

    /// Creates a builder containing a copy of this set's fields
    pub fn to_builder(&self) -> UnknownFieldSetBuilder {
        UnknownFieldSetBuilder { fields: self.fields.clone() }
    }

    /// Returns true if the set has values for the specified field
    pub fn has(&self, number: FieldNumber) -> bool {
        self.fields.contains_key(&number)
    }

    /// Gets the values of the specified field. Absent fields are returned as empty fields.
    pub fn get(&self, number: FieldNumber) -> &Field {
        self.fields.get(&number).unwrap_or(&EMPTY_FIELD)
    }

    /// Gets the number of distinct field numbers in the set
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the set has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns an iterator over the fields of the set in ascending field number order
    pub fn iter(&self) -> Iter {
        Iter(self.fields.iter())
    }

    /// Gets the size of the set as encoded on the wire
    pub fn serialized_size(&self) -> usize {
        self.fields.iter().map(|(number, field)| field.serialized_size(*number)).sum()
    }

    /// Writes every value in the set using the wire type it was read with
    pub fn write_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        for (number, field) in &self.fields {
            field.write_to(*number, output)?;
        }
        Ok(())
    }

    /// Gets the size of the set written in the message-set wire format
    pub fn serialized_size_as_message_set(&self) -> usize {
        self.fields
            .iter()
            .map(|(number, field)| field.serialized_size_as_message_set_extension(*number))
            .sum()
    }

    /// Writes the length delimited values of the set as message-set items. Other values are dropped.
    pub fn write_as_message_set_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        for (number, field) in &self.fields {
            field.write_as_message_set_extension_to(*number, output)?;
        }
        Ok(())
    }

    /// Encodes the set into a new vector
    pub fn to_bytes(&self) -> Result<Vec<u8>, write::Error> {
        let mut output = vec![0; self.serialized_size()];
        let mut writer = CodedWriter::with_slice(&mut output);
        self.write_to(&mut writer)?;
        writer.check_no_space_left()?;
        Ok(output)
    }

    /// Writes the set prefixed with its length, so that more values can follow it in the same output
    pub fn write_delimited_to<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        output.write_message_no_tag(self)
    }

    /// Decodes a set from the rest of the input
    pub fn from_reader(input: &mut CodedReader) -> read::Result<Self> {
        let mut builder = UnknownFieldSetBuilder::new();
        builder.merge_from(input)?;
        input.check_last_tag_was(0)?;
        Ok(builder.build())
    }

    /// Decodes a set from the specified bytes
    pub fn from_bytes(data: &[u8]) -> read::Result<Self> {
        Self::from_reader(&mut CodedReader::with_slice(data))
    }
}

impl Encode for UnknownFieldSet {
    fn encoded_len(&self) -> usize {
        self.serialized_size()
    }
    fn encode<O: CodedOutput + ?Sized>(&self, output: &mut O) -> write::Result {
        self.write_to(output)
    }
}

impl<'a> IntoIterator for &'a UnknownFieldSet {
    type Item = (FieldNumber, &'a Field);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

/// An iterator over the fields of an unknown field set.
///
/// This `struct` is created by the [`iter`] method on [`UnknownFieldSet`].
///
/// [`iter`]: struct.UnknownFieldSet.html#method.iter
/// [`UnknownFieldSet`]: struct.UnknownFieldSet.html
pub struct Iter<'a>(btree_map::Iter<'a, FieldNumber, Field>);

impl<'a> Iterator for Iter<'a> {
    type Item = (FieldNumber, &'a Field);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, v)| (*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;
    use super::{Field, UnknownFieldSet, UnknownFieldSetBuilder};
    use crate::io::{CodedOutput, CodedReader, CodedWriter, FieldNumber, ReaderBuilder, WireType, read::Error};

    fn num(n: u32) -> FieldNumber {
        FieldNumber::new(n).unwrap()
    }

    fn encode<F: FnOnce(&mut CodedWriter) -> crate::io::write::Result>(f: F) -> Vec<u8> {
        let mut output = Vec::new();
        {
            let mut writer = CodedWriter::with_write(&mut output);
            f(&mut writer).unwrap();
            writer.flush().unwrap();
        }
        output
    }

    #[test]
    fn unknown_field_fidelity() {
        // field 99, varint 7
        let data = [0x98, 0x06, 0x07];
        let set = UnknownFieldSet::from_bytes(&data).unwrap();

        assert!(set.has(num(99)));
        assert_eq!(set.get(num(99)).varint(), &[7]);
        assert_eq!(set.serialized_size(), 3);
        assert_eq!(set.to_bytes().unwrap(), data);
    }

    #[test]
    fn every_wire_type_round_trips() {
        let data = encode(|w| {
            w.write_uint64(1, 150)?;
            w.write_fixed32(2, 3)?;
            w.write_fixed64(3, 4)?;
            w.write_bytes(4, b"abc")?;
            w.write_tag(5, crate::io::WireType::StartGroup)?;
            w.write_int32(1, 1)?;
            w.write_tag(5, crate::io::WireType::EndGroup)
        });

        let set = UnknownFieldSet::from_bytes(&data).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(num(5)).group()[0].get(num(1)).varint(), &[1]);
        assert_eq!(set.to_bytes().unwrap(), data);
    }

    #[test]
    fn sorted_by_number_then_wire_type() {
        let data = encode(|w| {
            w.write_bytes(7, &[1])?;
            w.write_fixed32(1, 9)?;
            w.write_uint32(1, 2)
        });

        let set = UnknownFieldSet::from_bytes(&data).unwrap();
        let expected = encode(|w| {
            w.write_uint32(1, 2)?;
            w.write_fixed32(1, 9)?;
            w.write_bytes(7, &[1])
        });

        assert_eq!(set.to_bytes().unwrap(), expected);
        let numbers: Vec<u32> = set.iter().map(|(n, _)| n.get()).collect();
        assert_eq!(numbers, [1, 7]);
    }

    #[test]
    fn absent_fields_are_empty() {
        let set = UnknownFieldSet::new();
        assert!(!set.has(num(3)));
        assert!(set.get(num(3)).is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn nested_groups_from_stream() {
        let data = encode(|w| {
            w.write_string(1, "a string longer than the buffer")?;
            w.write_tag(2, WireType::StartGroup)?;
            w.write_fixed64(3, 5)?;
            w.write_tag(4, WireType::StartGroup)?;
            w.write_uint64(5, u64::max_value())?;
            w.write_tag(4, WireType::EndGroup)?;
            w.write_tag(2, WireType::EndGroup)?;
            w.write_bytes(6, &[0xAA; 40])
        });

        let mut read = data.as_slice();
        let mut input = ReaderBuilder::new().buffer_capacity(16).with_stream(&mut read);
        let set = UnknownFieldSet::from_reader(&mut input).unwrap();
        assert_eq!(set, UnknownFieldSet::from_bytes(&data).unwrap());

        let inner = &set.get(num(2)).group()[0];
        assert_eq!(inner.get(num(3)).fixed64(), &[5]);
        assert_eq!(inner.get(num(4)).group()[0].get(num(5)).varint(), &[u64::max_value()]);
        assert_eq!(set.to_bytes().unwrap(), data);
    }

    #[test]
    fn delimited_sets() {
        let first = UnknownFieldSet::from_bytes(&[0x08, 0x01]).unwrap();
        let second = UnknownFieldSet::from_bytes(&[0x98, 0x06, 0x07]).unwrap();
        let data = encode(|w| {
            first.write_delimited_to(w)?;
            second.write_delimited_to(w)
        });
        assert_eq!(data, [0x02, 0x08, 0x01, 0x03, 0x98, 0x06, 0x07]);

        let mut input = CodedReader::with_slice(&data);
        let mut builder = UnknownFieldSetBuilder::new();
        assert!(builder.merge_delimited_from(&mut input).unwrap());
        assert_eq!(builder.build(), first);

        let mut builder = UnknownFieldSetBuilder::new();
        assert!(builder.merge_delimited_from(&mut input).unwrap());
        assert!(!builder.merge_delimited_from(&mut input).unwrap());
        assert_eq!(builder.build(), second);
    }

    #[test]
    fn end_group_stops_merge() {
        let data = [0x08, 0x01, 0x0C, 0x10, 0x02];
        let mut reader = CodedReader::with_slice(&data);
        let mut builder = UnknownFieldSetBuilder::new();

        builder.merge_from(&mut reader).unwrap();
        assert!(reader.check_last_tag_was(0x0C).is_ok());
        assert!(builder.has_field(num(1)));
        assert!(!builder.has_field(num(2)));

        assert_matches!(UnknownFieldSet::from_bytes(&data), Err(Error::InvalidEndTag));
    }

    #[test]
    fn recursion_limit() {
        fn nested_groups(depth: usize) -> Vec<u8> {
            let mut data = vec![0x0B; depth];
            data.extend(std::iter::repeat(0x0C).take(depth));
            data
        }

        let data = nested_groups(64);
        let set = UnknownFieldSet::from_bytes(&data).unwrap();
        assert_eq!(set.to_bytes().unwrap(), data);

        let data = nested_groups(65);
        assert_matches!(UnknownFieldSet::from_bytes(&data), Err(Error::RecursionLimitExceeded));

        let mut reader = ReaderBuilder::new().recursion_limit(65).with_slice(&data);
        UnknownFieldSetBuilder::new().merge_from(&mut reader).unwrap();
    }

    #[test]
    fn builder_operations() {
        let mut field = Field::new();
        field.add_varint(1).add_length_delimited(vec![2]);

        let mut builder = UnknownFieldSetBuilder::new();
        builder
            .merge_field(num(1), &field)
            .merge_field(num(1), &field)
            .merge_varint_field(num(2), 5)
            .merge_length_delimited_field(num(3), vec![6]);

        let set = builder.build();
        assert_eq!(set.get(num(1)).varint(), &[1, 1]);
        assert_eq!(set.get(num(1)).length_delimited(), &[vec![2], vec![2]]);

        let mut builder = set.to_builder();
        builder.add_field(num(1), field.clone()).clear_field(num(2));
        let replaced = builder.build();
        assert_eq!(replaced.get(num(1)), &field);
        assert!(!replaced.has(num(2)));

        let mut merged = UnknownFieldSetBuilder::new();
        merged.merge(&set).merge(&replaced);
        let merged = merged.build();
        assert_eq!(merged.get(num(1)).varint(), &[1, 1, 1]);
        assert_eq!(merged.get(num(3)).length_delimited(), &[vec![6], vec![6]]);

        let mut cleared = merged.to_builder();
        cleared.clear();
        assert!(cleared.is_empty());
    }

    #[test]
    fn message_set_form() {
        let mut builder = UnknownFieldSetBuilder::new();
        builder
            .merge_length_delimited_field(num(5), vec![0x08, 0x01])
            .merge_varint_field(num(6), 1);
        let set = builder.build();

        let output = encode(|w| set.write_as_message_set_to(w));
        assert_eq!(output, [0x0B, 0x10, 0x05, 0x1A, 0x02, 0x08, 0x01, 0x0C]);
        assert_eq!(set.serialized_size_as_message_set(), output.len());
    }

    #[test]
    fn group_sizes() {
        let inner = UnknownFieldSet::from_bytes(&[0x0D, 1, 2, 0, 0]).unwrap();
        assert_eq!(inner.serialized_size(), 5);

        let mut builder = UnknownFieldSetBuilder::new();
        let mut field = Field::new();
        field.add_group(inner);
        builder.add_field(num(1), field);
        let outer = builder.build();

        assert_eq!(outer.serialized_size(), 7);
        assert_eq!(outer.to_bytes().unwrap(), [0x0B, 0x0D, 1, 2, 0, 0, 0x0C]);
    }
}
