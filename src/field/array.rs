//! Repetition of an inner field (§4.3.6), grounded in
//! `destructify.fields.common.ArrayField`. `count` and `length` are mutually
//! exclusive: `count` repeats a fixed number of times, `length` repeats
//! until a byte budget is spent. A negative `length` repeats until the
//! stream is exhausted, swallowing the final `STREAM_EXHAUSTED` the same
//! way `ArrayField.parse` does in the original — an explicit Open Question
//! in spec.md §9 resolved here by keeping the original's behavior.

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
    let FieldKind::Array { inner, count, length, until } = &field.kind else {
        unreachable!("array::decode called with a non-array field kind")
    };
    let mut items = Vec::new();
    match (count, length) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(Error::definition(path, "array field needs exactly one of count or length"))
        }
        (Some(count_spec), None) => {
            let n = count_spec
                .eval(ctx, node)?
                .as_usize()
                .ok_or_else(|| Error::impossible_length(path))?;
            for _ in 0..n {
                let v = decode_inner(inner, bs, ctx, node, path)?;
                let stop = until.as_ref().is_some_and(|f| f(&v));
                items.push(v);
                if stop {
                    break;
                }
            }
        }
        (None, Some(length_spec)) => {
            let total = length_spec.eval(ctx, node)?;
            let start = bs.stream_position(path)?;
            if total.as_int().is_some_and(|n| n < 0) {
                loop {
                    match decode_inner(inner, bs, ctx, node, path) {
                        Ok(v) => {
                            let stop = until.as_ref().is_some_and(|f| f(&v));
                            items.push(v);
                            if stop {
                                break;
                            }
                        }
                        Err(Error::StreamExhausted { .. }) => break,
                        Err(e) => return Err(e),
                    }
                }
            } else {
                let want = total.as_usize().ok_or_else(|| Error::impossible_length(path))?;
                loop {
                    let consumed = bs.stream_position(path)?.saturating_sub(start);
                    if consumed >= want as u64 {
                        break;
                    }
                    let v = decode_inner(inner, bs, ctx, node, path)?;
                    let stop = until.as_ref().is_some_and(|f| f(&v));
                    items.push(v);
                    if stop {
                        break;
                    }
                }
            }
        }
    }
    Ok(Value::Array(items))
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Array { inner, .. } = &field.kind else {
        unreachable!("array::encode called with a non-array field kind")
    };
    let items = value
        .as_array()
        .ok_or_else(|| Error::write(path, "expected an array value"))?;
    for item in items {
        encode_inner(inner, bs, ctx, node, item, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use byteordered::Endianness;
    use std::io::Cursor;

    fn byte_field() -> Field {
        Field::new(
            "elem",
            FieldKind::Integer {
                size: 1,
                signed: false,
                order: Some(Endianness::Big),
            },
        )
    }

    #[test]
    fn decodes_fixed_count() {
        let field = Field::new(
            "xs",
            FieldKind::Array {
                inner: Box::new(byte_field()),
                count: Some(3.into()),
                length: None,
                until: None,
            },
        );
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        let mut bs = BitStream::new(Cursor::new(vec![1, 2, 3, 4]));
        let v = decode(&field, &mut bs, &mut ctx, node, "").unwrap();
        assert_eq!(v, Value::Array(vec![Value::UInt(1), Value::UInt(2), Value::UInt(3)]));
    }

    #[test]
    fn negative_length_swallows_final_exhaustion() {
        let field = Field::new(
            "xs",
            FieldKind::Array {
                inner: Box::new(byte_field()),
                count: None,
                length: Some((-1i64).into()),
                until: None,
            },
        );
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        let mut bs = BitStream::new(Cursor::new(vec![9, 8, 7]));
        let v = decode(&field, &mut bs, &mut ctx, node, "").unwrap();
        assert_eq!(v, Value::Array(vec![Value::UInt(9), Value::UInt(8), Value::UInt(7)]));
    }
}
