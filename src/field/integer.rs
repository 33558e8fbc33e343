//! Byte-aligned integer fields (§4.3.4), using `byteordered` for the
//! runtime-selected (not compile-time generic) endianness destructify's
//! `IntegerField(byte_order=...)` expects.

use super::base::{Field, FieldKind};
use crate::context::{NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::stream::BitStream;
use crate::value::Value;
use byteordered::{ByteOrdered, Endianness};
use std::io::{Cursor, Read, Seek, Write};

/// Resolves an `Integer` field's effective byte order (§4.3.3): an explicit
/// `order` on the field always wins; a single byte has no order to disagree
/// about and defaults to big-endian; otherwise the field inherits whatever
/// the enclosing structure declared via `Structure::with_byte_order`.
fn resolve_order(
    order: &Option<Endianness>,
    size: usize,
    ctx: &ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Endianness> {
    if let Some(order) = order {
        return Ok(*order);
    }
    if size == 1 {
        return Ok(Endianness::Big);
    }
    ctx.byte_order_of(node)
        .ok_or_else(|| Error::definition(path, "integer field has no byte order and the structure declares none"))
}

pub fn decode<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    let FieldKind::Integer { size, signed, order } = &field.kind else {
        unreachable!("integer::decode called with a non-integer field kind")
    };
    let order = resolve_order(order, *size, ctx, node, path)?;
    let raw = bs.read_bytes(*size, path)?;
    let mut rdr = ByteOrdered::new(Cursor::new(&raw), order);
    let v: i64 = match (*size, *signed) {
        (1, false) => rdr.read_u8().map_err(|e| Error::io(path, e))? as i64,
        (1, true) => rdr.read_i8().map_err(|e| Error::io(path, e))? as i64,
        (2, false) => rdr.read_u16().map_err(|e| Error::io(path, e))? as i64,
        (2, true) => rdr.read_i16().map_err(|e| Error::io(path, e))? as i64,
        (4, false) => rdr.read_u32().map_err(|e| Error::io(path, e))? as i64,
        (4, true) => rdr.read_i32().map_err(|e| Error::io(path, e))? as i64,
        (8, false) => rdr.read_u64().map_err(|e| Error::io(path, e))? as i64,
        (8, true) => rdr.read_i64().map_err(|e| Error::io(path, e))?,
        _ => return Err(Error::definition(path, "integer field size must be 1, 2, 4 or 8 bytes")),
    };
    Ok(if *signed { Value::Int(v) } else { Value::UInt(v as u64) })
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Integer { size, signed, order } = &field.kind else {
        unreachable!("integer::encode called with a non-integer field kind")
    };
    let order = resolve_order(order, *size, ctx, node, path)?;
    let mut buf = Vec::new();
    {
        let mut wtr = ByteOrdered::new(&mut buf, order);
        match (*size, *signed) {
            (1, false) => wtr
                .write_u8(expect_uint(value, path)? as u8)
                .map_err(|e| Error::io(path, e))?,
            (1, true) => wtr
                .write_i8(expect_int(value, path)? as i8)
                .map_err(|e| Error::io(path, e))?,
            (2, false) => wtr
                .write_u16(expect_uint(value, path)? as u16)
                .map_err(|e| Error::io(path, e))?,
            (2, true) => wtr
                .write_i16(expect_int(value, path)? as i16)
                .map_err(|e| Error::io(path, e))?,
            (4, false) => wtr
                .write_u32(expect_uint(value, path)? as u32)
                .map_err(|e| Error::io(path, e))?,
            (4, true) => wtr
                .write_i32(expect_int(value, path)? as i32)
                .map_err(|e| Error::io(path, e))?,
            (8, false) => wtr
                .write_u64(expect_uint(value, path)?)
                .map_err(|e| Error::io(path, e))?,
            (8, true) => wtr
                .write_i64(expect_int(value, path)?)
                .map_err(|e| Error::io(path, e))?,
            _ => return Err(Error::definition(path, "integer field size must be 1, 2, 4 or 8 bytes")),
        }
    }
    bs.write_bytes(&buf, path)
}

fn expect_uint(value: &Value, path: &str) -> Result<u64> {
    value.as_uint().ok_or_else(|| Error::write(path, "expected an unsigned integer value"))
}

fn expect_int(value: &Value, path: &str) -> Result<i64> {
    value.as_int().ok_or_else(|| Error::write(path, "expected an integer value"))
}

#[cfg(test)]
mod test {
    use super::*;
    use byteordered::Endianness;
    use std::io::Cursor as IoCursor;

    #[test]
    fn big_endian_round_trip() {
        let field = Field::new(
            "n",
            FieldKind::Integer {
                size: 2,
                signed: false,
                order: Some(Endianness::Big),
            },
        );
        let ctx = ParsingContext::new();
        let node = ctx.root();
        let mut out = Vec::new();
        {
            let mut bs = BitStream::new(IoCursor::new(&mut out));
            encode(&field, &mut bs, &ctx, node, &Value::UInt(0x1234), "").unwrap();
        }
        assert_eq!(out, vec![0x12, 0x34]);
        let mut bs = BitStream::new(IoCursor::new(&out));
        assert_eq!(decode(&field, &mut bs, &ctx, node, "").unwrap(), Value::UInt(0x1234));
    }

    #[test]
    fn single_byte_defaults_to_big_endian_without_structure_order() {
        let field = Field::new(
            "n",
            FieldKind::Integer {
                size: 1,
                signed: false,
                order: None,
            },
        );
        let ctx = ParsingContext::new();
        let node = ctx.root();
        let mut bs = BitStream::new(IoCursor::new(vec![0xABu8]));
        assert_eq!(decode(&field, &mut bs, &ctx, node, "").unwrap(), Value::UInt(0xAB));
    }

    #[test]
    fn inherits_byte_order_from_structure_when_field_order_unset() {
        let field = Field::new(
            "n",
            FieldKind::Integer {
                size: 2,
                signed: false,
                order: None,
            },
        );
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        ctx.set_byte_order(node, Some(Endianness::Little));
        let mut out = Vec::new();
        {
            let mut bs = BitStream::new(IoCursor::new(&mut out));
            encode(&field, &mut bs, &ctx, node, &Value::UInt(0x1234), "").unwrap();
        }
        assert_eq!(out, vec![0x34, 0x12]);
    }
}
