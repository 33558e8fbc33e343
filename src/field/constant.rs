//! A field whose decoded value must equal a fixed constant (§4.3.9),
//! grounded in `destructify.fields.common.ConstantField` — typically used
//! for magic numbers, where a mismatch is a format-identification failure
//! rather than an ordinary parse error (§7, `WRONG_MAGIC`).

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
    let FieldKind::Constant { value, inner } = &field.kind else {
        unreachable!("constant::decode called with a non-constant field kind")
    };
    let decoded = decode_inner(inner, bs, ctx, node, path)?;
    if &decoded != value {
        return Err(Error::wrong_magic(path));
    }
    Ok(decoded)
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Constant { value: expected, inner } = &field.kind else {
        unreachable!("constant::encode called with a non-constant field kind")
    };
    encode_inner(inner, bs, ctx, node, expected, path)?;
    let _ = value;
    Ok(())
}
