//! A declarative binary-format engine for bidirectional (decode/encode)
//! record parsing: describe a structure as a sequence of [`Field`]
//! descriptors and get both directions for free, instead of hand-writing a
//! parser and a serializer that silently drift apart.
//!
//! ```
//! use declarative_format::field::{Field, FieldKind};
//! use declarative_format::structure::Structure;
//! use declarative_format::value::Value;
//! use byteordered::Endianness;
//! use std::io::Cursor;
//!
//! let point = Structure::new(
//!     "Point",
//!     vec![
//!         Field::new("x", FieldKind::Integer { size: 2, signed: true, order: Some(Endianness::Big) }),
//!         Field::new("y", FieldKind::Integer { size: 2, signed: true, order: Some(Endianness::Big) }),
//!     ],
//! );
//! let record = point.decode(Cursor::new(vec![0x00, 0x05, 0xff, 0xfb])).unwrap();
//! assert_eq!(record.get("x"), Some(&Value::Int(5)));
//! assert_eq!(record.get("y"), Some(&Value::Int(-5)));
//!
//! let mut out = Vec::new();
//! point.encode(Cursor::new(&mut out), &record).unwrap();
//! assert_eq!(out, vec![0x00, 0x05, 0xff, 0xfb]);
//! ```

pub mod context;
pub mod error;
pub mod expr;
pub mod field;
pub mod stream;
pub mod structure;
pub mod value;

pub use error::{Error, ErrorKind, Result};
pub use field::{Field, FieldKind};
pub use structure::Structure;
pub use value::{Record, Value};
