//! The `Field` descriptor and its ten kinds (§4.2/§4.3).

pub mod array;
pub mod base;
pub mod bit;
pub mod bytes;
pub mod conditional;
pub mod constant;
pub mod enum_field;
pub mod integer;
pub mod structure_field;
pub mod switch;

pub use base::{decode_field, encode_field, Codec, Field, FieldKind, SizeSpec};
