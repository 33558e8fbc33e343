//! Lifts an integer-shaped inner field to a named enumeration (§4.3.5),
//! grounded in `destructify.fields.common.EnumField`. An unknown
//! raw value is not an error, it decodes to `Value::Enum { name: None, .. }`
//! (destructify's `EnumField` likewise keeps the raw int when no member
//! matches, unless `strict=True` — we only ever implement the permissive
//! form for unknown-variant lookups; `Field::strict` is an orthogonal
//! attribute of the inner field and flows through `decode_inner`/
//! `encode_inner` unchanged).

use super::base::{decode_inner, encode_inner, Field, FieldKind};
use crate::context::{NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::stream::BitStream;
use crate::value::Value;
use std::io::{Read, Seek, Write};

pub fn decode<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    let FieldKind::Enum { inner, variants } = &field.kind else {
        unreachable!("enum_field::decode called with a non-enum field kind")
    };
    let raw_value = decode_inner(inner, bs, ctx, node, path)?;
    let raw = raw_value
        .as_int()
        .ok_or_else(|| Error::definition(path, "enum field's inner field must decode to an integer"))?;
    let name = variants.iter().find(|(r, _)| *r == raw).map(|(_, n)| *n);
    Ok(Value::Enum { raw, name })
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Enum { inner, variants } = &field.kind else {
        unreachable!("enum_field::encode called with a non-enum field kind")
    };
    let raw = match value {
        Value::Enum { raw, .. } => *raw,
        Value::Str(name) => variants
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(r, _)| *r)
            .ok_or_else(|| Error::write(path, format!("unknown enum variant name '{name}'")))?,
        other => other
            .as_int()
            .ok_or_else(|| Error::write(path, "expected an enum, name, or integer value"))?,
    };
    encode_inner(inner, bs, ctx, node, &Value::Int(raw), path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::ParsingContext;
    use internment::Intern;
    use std::io::Cursor;

    fn field() -> Field {
        Field::new(
            "kind",
            FieldKind::Enum {
                inner: Box::new(Field::new(
                    "kind",
                    FieldKind::Integer {
                        size: 1,
                        signed: false,
                        order: Some(byteordered::Endianness::Big),
                    },
                )),
                variants: vec![(0, Intern::new("Ping".to_owned())), (1, Intern::new("Pong".to_owned()))],
            },
        )
    }

    #[test]
    fn known_raw_value_resolves_name() {
        let f = field();
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        let mut bs = BitStream::new(Cursor::new(vec![1u8]));
        let v = decode(&f, &mut bs, &mut ctx, node, "").unwrap();
        assert_eq!(v, Value::Enum { raw: 1, name: Some(Intern::new("Pong".to_owned())) });
    }

    #[test]
    fn unknown_raw_value_keeps_raw_without_name() {
        let f = field();
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        let mut bs = BitStream::new(Cursor::new(vec![9u8]));
        let v = decode(&f, &mut bs, &mut ctx, node, "").unwrap();
        assert_eq!(v, Value::Enum { raw: 9, name: None });
    }
}
