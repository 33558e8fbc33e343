//! Embeds a nested field sequence as a single field (§4.3.10), grounded in
//! `destructify.fields.struct.StructField`. Shares the same sequential/
//! preparse driver as a top-level `Structure` (`crate::structure::
//! decode_fields`/`encode_prepare`/`encode_write`) over a freshly pushed
//! child context node. Unlike a top-level `Structure`, a nested embedding
//! has no `alignment`, `capture_raw`, `initialize`, or `finalize` of its
//! own — only `byte_order`/`encoding` flow in, via the context parent-chain.

use super::base::{Field, FieldKind};
use crate::context::{NodeId, ParsingContext};
use crate::error::Result;
use crate::stream::BitStream;
use crate::structure::{decode_fields, encode_prepare, encode_write};
use crate::value::Value;
use std::io::{Read, Seek, Write};

pub fn decode<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    let FieldKind::Structure { fields } = &field.kind else {
        unreachable!("structure_field::decode called with a non-structure field kind")
    };
    let child = ctx.push_child(node, false);
    // A nested embedding gets no alignment of its own (§4.3.10 scope);
    // byte_order/encoding still flow in via the parent-chain walk in
    // `ParsingContext::byte_order_of`/`encoding_of`.
    decode_fields(fields, bs, ctx, child, path, None)?;
    Ok(Value::Record(ctx.to_record(child)))
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Structure { fields } = &field.kind else {
        unreachable!("structure_field::encode called with a non-structure field kind")
    };
    let record = value
        .as_record()
        .ok_or_else(|| crate::error::Error::write(path, "expected a record value"))?;
    let child = ctx.push_child(node, false);
    encode_prepare(fields, ctx, child, record, path)?;
    encode_write(fields, bs, ctx, child, path, None)
}
