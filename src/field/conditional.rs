//! A field present only when a condition over already-decoded siblings
//! holds (§4.3.8), grounded in `destructify.fields.common.ConditionalField`.
//! Absent fields decode to `Value::None`.

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
    let FieldKind::Conditional { condition, inner } = &field.kind else {
        unreachable!("conditional::decode called with a non-conditional field kind")
    };
    if condition
        .eval(ctx, node)?
        .as_bool()
        .ok_or_else(|| Error::definition(path, "conditional field's condition must be boolean-coercible"))?
    {
        decode_inner(inner, bs, ctx, node, path)
    } else {
        Ok(Value::None)
    }
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Conditional { condition, inner } = &field.kind else {
        unreachable!("conditional::encode called with a non-conditional field kind")
    };
    let present = condition
        .eval(ctx, node)?
        .as_bool()
        .ok_or_else(|| Error::definition(path, "conditional field's condition must be boolean-coercible"))?;
    match (present, value) {
        (true, Value::None) => Err(Error::write(path, "condition holds but no value was supplied")),
        (true, v) => encode_inner(inner, bs, ctx, node, v, path),
        (false, _) => Ok(()),
    }
}
