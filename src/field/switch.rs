//! Chooses a field variant based on an already-decoded sibling (§4.3.7),
//! grounded in `destructify.fields.common.SwitchField`.

use super::base::{decode_inner, encode_inner, Field, FieldKind};
use crate::context::{NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::stream::BitStream;
use crate::value::Value;
use std::io::{Read, Seek, Write};

fn select<'a>(cases: &'a [(Value, Field)], default: &'a Option<Box<Field>>, key: &Value, path: &str) -> Result<&'a Field> {
    if let Some((_, f)) = cases.iter().find(|(v, _)| v == key) {
        Ok(f)
    } else if let Some(f) = default {
        Ok(f)
    } else {
        Err(Error::definition(path, format!("no switch case matches {key:?} and no default is set")))
    }
}

pub fn decode<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    let FieldKind::Switch { on, cases, default } = &field.kind else {
        unreachable!("switch::decode called with a non-switch field kind")
    };
    let key = on.eval(ctx, node)?;
    let chosen = select(cases, default, &key, path)?;
    decode_inner(chosen, bs, ctx, node, path)
}

pub fn encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    value: &Value,
    path: &str,
) -> Result<()> {
    let FieldKind::Switch { on, cases, default } = &field.kind else {
        unreachable!("switch::encode called with a non-switch field kind")
    };
    let key = on.eval(ctx, node)?;
    let chosen = select(cases, default, &key, path)?;
    encode_inner(chosen, bs, ctx, node, value, path)
}
