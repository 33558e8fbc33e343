//! The `Field` descriptor (§4.2/§4.3): attributes common to every variant
//! plus the ten tagged kinds, and the decode/encode dispatch the
//! `Structure` driver calls into. Ported from `destructify.fields.base.Field`
//! and `destructify.fields.base_field.BaseField`, collapsed from a class
//! hierarchy into one tagged enum per the Design Notes' guidance for
//! systems-language ports (spec.md §9).

use crate::context::{FieldRecord, NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::stream::BitStream;
use crate::value::Value;
use byteordered::Endianness;
use internment::Intern;
use std::io::{Read, Seek, Write};
use std::rc::Rc;

use super::{array, bit, bytes, conditional, constant, enum_field, integer, structure_field, switch};

/// A text codec layered just inside the byte layer of a `Fixed`/`Terminated`
/// field, mirroring `StringField` layering on `BytesField` in
/// `destructify.fields.common`.
#[derive(Clone)]
pub struct Codec {
    pub name: &'static str,
    pub decode: Rc<dyn Fn(&[u8]) -> Result<Value>>,
    pub encode: Rc<dyn Fn(&Value) -> Result<Vec<u8>>>,
}

impl Codec {
    pub fn utf8() -> Self {
        Codec {
            name: "utf8",
            decode: Rc::new(|raw| {
                String::from_utf8(raw.to_vec())
                    .map(Value::Str)
                    .map_err(|e| Error::parse("", e.to_string()))
            }),
            encode: Rc::new(|v| {
                v.as_str()
                    .map(|s| s.as_bytes().to_vec())
                    .ok_or_else(|| Error::write("", "expected a string value"))
            }),
        }
    }
}

/// A field's declared length/count where the distilled schema may name
/// either a literal/computed [`Expr`] or another field by name. A
/// `SizeSpec::Field` installs an automatic `override` on the referenced
/// field at structure-build time (see `crate::structure::install_overrides`),
/// mirroring `BytesField.initialize`/`ArrayField.initialize` in
/// `destructify.fields.common`.
#[derive(Clone)]
pub enum SizeSpec {
    Expr(Expr),
    Field(String),
}

impl SizeSpec {
    pub fn eval(&self, ctx: &ParsingContext, node: NodeId) -> Result<Value> {
        match self {
            SizeSpec::Expr(e) => e.eval(ctx, node),
            SizeSpec::Field(name) => ctx.get(node, name).cloned(),
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            SizeSpec::Field(name) => Some(name),
            SizeSpec::Expr(_) => None,
        }
    }
}

impl From<Expr> for SizeSpec {
    fn from(e: Expr) -> Self {
        SizeSpec::Expr(e)
    }
}
impl From<i64> for SizeSpec {
    fn from(v: i64) -> Self {
        SizeSpec::Expr(Expr::from(v))
    }
}
impl From<i32> for SizeSpec {
    fn from(v: i32) -> Self {
        SizeSpec::Expr(Expr::from(v))
    }
}
impl From<usize> for SizeSpec {
    fn from(v: usize) -> Self {
        SizeSpec::Expr(Expr::from(v))
    }
}
impl From<&str> for SizeSpec {
    fn from(name: &str) -> Self {
        SizeSpec::Field(name.to_owned())
    }
}

pub enum FieldKind {
    Fixed {
        length: SizeSpec,
        padding: Option<u8>,
        codec: Option<Codec>,
    },
    Terminated {
        terminator: Vec<u8>,
        include: bool,
        codec: Option<Codec>,
    },
    Bit {
        bits: usize,
        signed: bool,
        realign: bool,
    },
    Integer {
        size: usize,
        signed: bool,
        order: Option<Endianness>,
    },
    Enum {
        inner: Box<Field>,
        variants: Vec<(i64, Intern<String>)>,
    },
    Array {
        inner: Box<Field>,
        count: Option<SizeSpec>,
        length: Option<SizeSpec>,
        until: Option<Rc<dyn Fn(&Value) -> bool>>,
    },
    Switch {
        on: Expr,
        cases: Vec<(Value, Field)>,
        default: Option<Box<Field>>,
    },
    Conditional {
        condition: Expr,
        inner: Box<Field>,
    },
    Constant {
        value: Value,
        inner: Box<Field>,
    },
    Structure {
        fields: Vec<Field>,
    },
}

/// A single field descriptor: the common attributes of §4.2 plus one of the
/// ten `FieldKind`s of §4.3.
pub struct Field {
    pub name: Intern<String>,
    pub offset: Option<Expr>,
    pub skip: Option<Expr>,
    pub lazy: bool,
    pub check: Option<Expr>,
    pub override_expr: Option<Expr>,
    /// When false, a `Fixed`/`Terminated` field degrades instead of failing
    /// on a short read or short write (§4.3.1): it keeps whatever bytes were
    /// actually available rather than raising `STREAM_EXHAUSTED`/`WRITE_ERROR`.
    /// Defaults to `true`; only `Fixed`/`Terminated` honor it.
    pub strict: bool,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Field {
            name: Intern::new(name.into()),
            offset: None,
            skip: None,
            lazy: false,
            check: None,
            override_expr: None,
            strict: true,
            kind,
        }
    }

    pub fn with_offset(mut self, e: impl Into<Expr>) -> Self {
        self.offset = Some(e.into());
        self
    }

    pub fn with_skip(mut self, e: impl Into<Expr>) -> Self {
        self.skip = Some(e.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn with_check(mut self, e: Expr) -> Self {
        self.check = Some(e);
        self
    }

    pub fn with_override(mut self, e: Expr) -> Self {
        self.override_expr = Some(e);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// True when this field can be resolved out of declaration order: it is
    /// `lazy` and its `offset` is a literal, non-negative constant (§4.4
    /// "Preparse").
    pub fn is_preparsable(&self) -> bool {
        self.lazy
            && matches!(&self.offset, Some(Expr::Const(v)) if v.as_int().is_some_and(|n| n >= 0))
    }

    /// A one-line C member declaration for `Structure::as_c_struct` (§6,
    /// "ctype introspection"), mirroring `destructify.fields.base.Field.ctype`.
    pub fn ctype(&self) -> String {
        let ty = match &self.kind {
            FieldKind::Fixed { .. } | FieldKind::Terminated { .. } => "char*".to_owned(),
            FieldKind::Bit { bits, signed, .. } => {
                format!("{}int{}_t", if *signed { "" } else { "u" }, bits.next_power_of_two().max(8))
            }
            FieldKind::Integer { size, signed, .. } => {
                format!("{}int{}_t", if *signed { "" } else { "u" }, size * 8)
            }
            FieldKind::Enum { inner, .. } => inner.ctype(),
            FieldKind::Array { inner, .. } => format!("{}[]", inner.ctype()),
            FieldKind::Switch { .. } => "void*".to_owned(),
            FieldKind::Conditional { inner, .. } => format!("{}?", inner.ctype()),
            FieldKind::Constant { inner, .. } => inner.ctype(),
            FieldKind::Structure { .. } => "struct".to_owned(),
        };
        format!("{} {};", ty, self.name.as_str())
    }

    /// The field's fixed size in bits, when it has one independent of any
    /// runtime value (§4.3/§6 "Structure.len"). `None` for anything whose
    /// size depends on a referenced field, a terminator search, or runtime
    /// dispatch — callers treat that as making the enclosing structure's
    /// length impossible to compute statically.
    pub fn static_bit_len(&self) -> Option<u64> {
        match &self.kind {
            FieldKind::Fixed { length: SizeSpec::Expr(Expr::Const(v)), .. } => {
                v.as_uint().map(|n| n * 8)
            }
            FieldKind::Fixed { .. } => None,
            FieldKind::Terminated { .. } => None,
            FieldKind::Bit { bits, .. } => Some(*bits as u64),
            FieldKind::Integer { size, .. } => Some(*size as u64 * 8),
            FieldKind::Enum { inner, .. } => inner.static_bit_len(),
            FieldKind::Array { inner, count: Some(SizeSpec::Expr(Expr::Const(v))), length: None, until: None } => {
                v.as_uint().and_then(|n| inner.static_bit_len().map(|bits| bits * n))
            }
            FieldKind::Array { .. } => None,
            FieldKind::Switch { .. } => None,
            FieldKind::Conditional { .. } => None,
            FieldKind::Constant { inner, .. } => inner.static_bit_len(),
            FieldKind::Structure { fields } => {
                fields.iter().try_fold(0u64, |acc, f| f.static_bit_len().map(|b| acc + b))
            }
        }
    }
}

/// Decodes `field` starting at the stream's current position, records the
/// result in `ctx`, and returns the decoded value. `path` is the dotted
/// field path of `field`'s *parent* (the field's own name is appended by
/// the caller via `Error::with_prefix` on failure).
pub fn decode_field<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    let full_path = join_path(path, field.name.as_str());
    let value = decode_inner(field, bs, ctx, node, &full_path)?;
    ctx.set(node, field.name, FieldRecord::new(value.clone()));
    if let Some(check) = &field.check {
        let ok = check
            .eval(ctx, node)
            .map_err(|e| e.with_prefix(path))?
            .as_bool()
            .unwrap_or(false);
        if !ok {
            return Err(Error::check(full_path, "check expression evaluated to false"));
        }
    }
    Ok(value)
}

/// Dispatches to the kind-specific decode logic without touching `ctx`
/// (no record is stored, no `check` is run). Used both by `decode_field`
/// for top-level fields and by wrapper kinds (`Enum`, `Conditional`,
/// `Constant`, `Array`, `Switch`) to decode the value they own.
pub(crate) fn decode_inner<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    match &field.kind {
        FieldKind::Fixed { .. } | FieldKind::Terminated { .. } => bytes::decode(field, bs, ctx, node, path),
        FieldKind::Bit { .. } => bit::decode(field, bs, path),
        FieldKind::Integer { .. } => integer::decode(field, bs, ctx, node, path),
        FieldKind::Enum { .. } => enum_field::decode(field, bs, ctx, node, path),
        FieldKind::Array { .. } => array::decode(field, bs, ctx, node, path),
        FieldKind::Switch { .. } => switch::decode(field, bs, ctx, node, path),
        FieldKind::Conditional { .. } => conditional::decode(field, bs, ctx, node, path),
        FieldKind::Constant { .. } => constant::decode(field, bs, ctx, node, path),
        FieldKind::Structure { .. } => structure_field::decode(field, bs, ctx, node, path),
    }
}

/// Encodes `value` for `field` at the stream's current position.
pub fn encode_field<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let full_path = join_path(path, field.name.as_str());
    encode_inner(field, bs, ctx, node, value, &full_path)
}

/// Dispatches to the kind-specific encode logic. Used both by `encode_field`
/// for top-level fields and by wrapper kinds to encode the value they own.
pub(crate) fn encode_inner<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    match &field.kind {
        FieldKind::Fixed { .. } | FieldKind::Terminated { .. } => bytes::encode(field, bs, ctx, node, value, path),
        FieldKind::Bit { .. } => bit::encode(field, bs, value, path),
        FieldKind::Integer { .. } => integer::encode(field, bs, ctx, node, value, path),
        FieldKind::Enum { .. } => enum_field::encode(field, bs, ctx, node, value, path),
        FieldKind::Array { .. } => array::encode(field, bs, ctx, node, value, path),
        FieldKind::Switch { .. } => switch::encode(field, bs, ctx, node, value, path),
        FieldKind::Conditional { .. } => conditional::encode(field, bs, ctx, node, value, path),
        FieldKind::Constant { .. } => constant::encode(field, bs, ctx, node, value, path),
        FieldKind::Structure { .. } => structure_field::encode(field, bs, ctx, node, value, path),
    }
}

pub fn join_path(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_owned()
    } else {
        format!("{path}.{name}")
    }
}
