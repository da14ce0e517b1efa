//! Contains types and traits for reading and writing protobuf coded data.

pub mod read;
pub mod size;
pub mod stream;
pub mod streaming;
pub mod varint;
pub mod write;

pub use read::{Builder as ReaderBuilder, CodedReader, Limit};
pub use streaming::StreamingWriter;
pub use write::{Builder as WriterBuilder, CodedOutput, CodedWriter, Encode};

use core::convert::TryFrom;
use core::fmt::{self, Display, Formatter};
use core::num::NonZeroU32;
use thiserror::Error;

/// The default size of the internal buffers used by readers and writers.
pub const DEFAULT_BUF_SIZE: usize = 4096;

/// The wire type of a protobuf value.
///
/// A wire type is paired with a field number between 1 and 536,870,911 to create a tag,
/// a unique identifier for a field on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum WireType {
    /// A value read as a variable length integer.
    ///
    /// See the protobuf docs for more information on this encoding: https://developers.google.com/protocol-buffers/docs/encoding#varints
    Varint = 0,
    /// A 64-bit value encoded as 8 little endian bytes
    Bit64 = 1,
    /// A length delimited value. The length is encoded as a varint
    LengthDelimited = 2,
    /// A start group tag, deprecated in proto3.
    StartGroup = 3,
    /// An end group tag, deprecated in proto3.
    EndGroup = 4,
    /// A 32-bit value encoded as 4 little endian bytes
    Bit32 = 5,
}

/// The error returned when a 3-bit value does not name a wire type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("{0} is not a valid wire type")]
pub struct InvalidWireType(pub u8);

impl WireType {
    /// Gets whether a wire type is eligible for repeated field packing.
    /// The valid packable wire types are Bit32, Bit64, and Varint.
    pub const fn is_packable(self) -> bool {
        (self as u8 == WireType::Varint as u8) ||
        (self as u8 == WireType::Bit64 as u8) ||
        (self as u8 == WireType::Bit32 as u8)
    }
}

impl TryFrom<u8> for WireType {
    type Error = InvalidWireType;

    fn try_from(value: u8) -> Result<WireType, InvalidWireType> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Bit64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Bit32),
            _ => Err(InvalidWireType(value)),
        }
    }
}

/// A protobuf field number. Its value is known to be less than or equal to 536870911 and not 0.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldNumber(NonZeroU32);

impl FieldNumber {
    /// The max value of a field number as a u32
    pub const MAX_VALUE: u32 = 536_870_911;

    /// Creates a field number if the given value is not zero or more than 536870911
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::FieldNumber;
    ///
    /// assert_eq!(FieldNumber::new(0), None);
    /// assert_eq!(FieldNumber::new(1).map(FieldNumber::get), Some(1));
    /// assert_eq!(FieldNumber::new(FieldNumber::MAX_VALUE + 1), None);
    /// ```
    #[inline]
    pub fn new(n: u32) -> Option<FieldNumber> {
        if n <= Self::MAX_VALUE {
            NonZeroU32::new(n).map(FieldNumber)
        } else {
            None
        }
    }

    /// Returns the value as a [`u32`](https://doc.rust-lang.org/nightly/std/primitive.u32.html)
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl Display for FieldNumber {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<FieldNumber> for u32 {
    fn from(x: FieldNumber) -> u32 {
        x.get()
    }
}

/// A tag containing a wire type and field number. Its value is known to not be 0, and both field number and wire type are valid values
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(NonZeroU32);

impl Tag {
    /// Creates a new tag value
    #[inline]
    pub fn new(f: FieldNumber, wt: WireType) -> Tag {
        Tag(NonZeroU32::new((f.get() << 3) | wt as u32).unwrap_or(NonZeroU32::MIN))
    }

    /// Gets the wire type from this tag
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::{Tag, WireType};
    /// # use std::convert::TryFrom;
    ///
    /// assert_eq!(Tag::try_from(8).unwrap().wire_type(), WireType::Varint);
    /// assert_eq!(Tag::try_from(17).unwrap().wire_type(), WireType::Bit64);
    /// ```
    #[inline]
    pub fn wire_type(self) -> WireType {
        match tag_wire_type(self.get()) {
            Ok(wt) => wt,
            // tags are validated on construction
            Err(_) => WireType::Varint,
        }
    }

    /// Gets the field number from this tag
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::Tag;
    /// # use std::convert::TryFrom;
    ///
    /// assert_eq!(Tag::try_from(8).unwrap().field().get(), 1);
    /// assert_eq!(Tag::try_from(17).unwrap().field().get(), 2);
    /// ```
    #[inline]
    pub fn field(self) -> FieldNumber {
        FieldNumber(NonZeroU32::new(tag_field_number(self.get())).unwrap_or(NonZeroU32::MIN))
    }

    /// Returns the value as a [`u32`](https://doc.rust-lang.org/nightly/std/primitive.u32.html)
    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Tag> for u32 {
    fn from(x: Tag) -> u32 {
        x.get()
    }
}

/// The error returned when an attempt to convert a 32-bit value to a tag fails due to an invalid field number or wire type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid tag {0}; this could be caused by an invalid wire type or a 0 field number")]
pub struct TryTagFromRawError(pub u32);

impl TryFrom<u32> for Tag {
    type Error = TryTagFromRawError;

    /// Creates a new tag if the value is not zero and has a valid field number and wire type
    ///
    /// # Examples
    ///
    /// ```
    /// use protowire::io::Tag;
    /// # use std::convert::TryFrom;
    ///
    /// assert!(Tag::try_from(1).is_err());
    /// assert!(Tag::try_from(8).is_ok());
    /// assert!(Tag::try_from(16).is_ok());
    /// assert!(Tag::try_from(14).is_err());
    /// ```
    #[inline]
    fn try_from(n: u32) -> Result<Tag, TryTagFromRawError> {
        match (n & TAG_TYPE_MASK, n >> TAG_TYPE_BITS) {
            // (wire type, field number)
            (6, _) | (7, _) | (_, 0) => Err(TryTagFromRawError(n)),
            _ => NonZeroU32::new(n).map(Tag).ok_or(TryTagFromRawError(n)),
        }
    }
}

const TAG_TYPE_BITS: u32 = 3;
const TAG_TYPE_MASK: u32 = (1 << TAG_TYPE_BITS) - 1;

/// Packs a field number and wire type into a raw tag value.
#[inline]
pub const fn make_tag(field_number: u32, wire_type: WireType) -> u32 {
    (field_number << TAG_TYPE_BITS) | wire_type as u32
}

/// Extracts the field number of a raw tag value.
#[inline]
pub const fn tag_field_number(tag: u32) -> u32 {
    tag >> TAG_TYPE_BITS
}

/// Extracts the wire type of a raw tag value.
#[inline]
pub fn tag_wire_type(tag: u32) -> Result<WireType, InvalidWireType> {
    WireType::try_from((tag & TAG_TYPE_MASK) as u8)
}

/// Field numbers and tags of the legacy message-set encoding.
///
/// ```text
/// message MessageSet {
///   repeated group Item = 1 {
///     required int32 type_id = 2;
///     required bytes message = 3;
///   }
/// }
/// ```
pub mod message_set {
    use super::{make_tag, WireType};

    /// The field number of the item group
    pub const ITEM: u32 = 1;
    /// The field number of the type id inside an item
    pub const TYPE_ID: u32 = 2;
    /// The field number of the message bytes inside an item
    pub const MESSAGE: u32 = 3;

    /// The tag opening an item group
    pub const ITEM_TAG: u32 = make_tag(ITEM, WireType::StartGroup);
    /// The tag closing an item group
    pub const ITEM_END_TAG: u32 = make_tag(ITEM, WireType::EndGroup);
    /// The tag of the type id
    pub const TYPE_ID_TAG: u32 = make_tag(TYPE_ID, WireType::Varint);
    /// The tag of the message bytes
    pub const MESSAGE_TAG: u32 = make_tag(MESSAGE, WireType::LengthDelimited);
}

#[cfg(test)]
mod test {
    use super::{make_tag, message_set, tag_field_number, tag_wire_type, FieldNumber, Tag, WireType};
    use core::convert::TryFrom;
    use proptest::prelude::*;

    const WIRE_TYPES: [WireType; 6] = [
        WireType::Varint,
        WireType::Bit64,
        WireType::LengthDelimited,
        WireType::StartGroup,
        WireType::EndGroup,
        WireType::Bit32,
    ];

    #[test]
    fn message_set_tags() {
        assert_eq!(message_set::ITEM_TAG, 11);
        assert_eq!(message_set::ITEM_END_TAG, 12);
        assert_eq!(message_set::TYPE_ID_TAG, 16);
        assert_eq!(message_set::MESSAGE_TAG, 26);
    }

    #[test]
    fn invalid_wire_types() {
        assert!(tag_wire_type(make_tag(1, WireType::Varint) | 6).is_err());
        assert!(tag_wire_type(15).is_err());
        assert!(!WireType::LengthDelimited.is_packable());
        assert!(WireType::Bit32.is_packable());
    }

    #[test]
    fn max_field_number() {
        let max = FieldNumber::new(FieldNumber::MAX_VALUE).unwrap();
        let tag = Tag::new(max, WireType::Bit32);
        assert_eq!(tag.field(), max);
        assert_eq!(tag.wire_type(), WireType::Bit32);
    }

    proptest! {
        #[test]
        fn tag_round_trip(number in 1u32..=FieldNumber::MAX_VALUE, wt in 0usize..6) {
            let wire_type = WIRE_TYPES[wt];
            let raw = make_tag(number, wire_type);

            prop_assert_eq!(tag_field_number(raw), number);
            prop_assert_eq!(tag_wire_type(raw).unwrap(), wire_type);

            let tag = Tag::try_from(raw).unwrap();
            prop_assert_eq!(tag.field().get(), number);
            prop_assert_eq!(tag.wire_type(), wire_type);
            prop_assert_eq!(Tag::new(FieldNumber::new(number).unwrap(), wire_type), tag);
        }
    }
}
