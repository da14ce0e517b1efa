//! A streaming protobuf wire format codec.
//!
//! The [`io`](io/index.html) module reads and writes the wire format: varints, tags, length delimited values,
//! groups and message-set items, with limits on nesting depth and input size. [`raw`](raw/index.html) adds a
//! typed layer over it. Messages can be merged against a runtime [`schema`](schema/index.html) with
//! [`merge`](merge/index.html) into a [`DynamicMessage`](dynamic/struct.DynamicMessage.html), keeping every
//! field the schema doesn't recognize in an [`UnknownFieldSet`](unknown_fields/struct.UnknownFieldSet.html).

#![warn(missing_docs)]

mod internal {
    pub trait Sealed { }
}
pub mod dynamic;
pub mod io;
pub mod merge;
pub mod raw;
pub mod schema;
pub mod unknown_fields;

pub use dynamic::{DynamicMessage, DynamicMessageBuilder};
pub use schema::{EnumSchema, MessageSchema};
pub use unknown_fields::{UnknownFieldSet, UnknownFieldSetBuilder};
