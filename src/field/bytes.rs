//! `Fixed`/`Terminated` byte-run fields (§4.3.1/§4.3.2), grounded in
//! `destructify.fields.common.BytesField`/`FixedLengthField`/
//! `TerminatedField`.

use super::base::{Codec, Field, FieldKind};
use crate::context::{NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::stream::BitStream;
use crate::value::Value;
use std::io::{Read, Seek, Write};

pub fn decode<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<Value> {
    match &field.kind {
        FieldKind::Fixed { length, padding, codec } => {
            let len = length
                .eval(ctx, node)?
                .as_usize()
                .ok_or_else(|| Error::impossible_length(path))?;
            let mut raw = bs.read_bytes_opt(len, path, !field.strict)?;
            if let Some(pad) = padding {
                while raw.last() == Some(pad) {
                    raw.pop();
                }
            }
            decode_codec(codec, ctx, node, raw, path)
        }
        FieldKind::Terminated {
            terminator,
            include,
            codec,
        } => {
            if terminator.is_empty() {
                return Err(Error::definition(path, "terminated field needs a non-empty terminator"));
            }
            let mut raw = Vec::new();
            loop {
                let byte = bs.read_bytes_opt(1, path, !field.strict)?;
                if byte.is_empty() {
                    break;
                }
                raw.push(byte[0]);
                if raw.len() >= terminator.len() && raw[raw.len() - terminator.len()..] == terminator[..] {
                    if !*include {
                        raw.truncate(raw.len() - terminator.len());
                    }
                    break;
                }
            }
            decode_codec(codec, ctx, node, raw, path)
        }
        _ => unreachable!("bytes::decode called with a non-byte field kind"),
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
    match &field.kind {
        FieldKind::Fixed { length, padding, codec } => {
            let mut raw = encode_codec(codec, ctx, node, value, path)?;
            let want = length
                .eval(ctx, node)?
                .as_usize()
                .ok_or_else(|| Error::impossible_length(path))?;
            if raw.len() > want {
                return Err(Error::write(path, "value is longer than the field's fixed length"));
            }
            match padding {
                Some(pad) => raw.resize(want, *pad),
                None if raw.len() != want && field.strict => {
                    return Err(Error::write(
                        path,
                        "value length does not match the field's fixed length and no padding byte is configured",
                    ))
                }
                None => {}
            }
            bs.write_bytes(&raw, path)
        }
        FieldKind::Terminated {
            terminator,
            include,
            codec,
        } => {
            let raw = encode_codec(codec, ctx, node, value, path)?;
            bs.write_bytes(&raw, path)?;
            if !*include {
                bs.write_bytes(terminator, path)?;
            }
            Ok(())
        }
        _ => unreachable!("bytes::encode called with a non-byte field kind"),
    }
}

/// An explicit `Codec` on the field always wins; otherwise a structure that
/// declared `encoding: "utf8"` (§3) supplies a default text codec for bytes
/// fields that don't name one of their own.
fn resolve_codec(codec: &Option<Codec>, ctx: &ParsingContext, node: NodeId) -> Option<Codec> {
    codec.clone().or_else(|| match ctx.encoding_of(node) {
        Some("utf8") => Some(Codec::utf8()),
        _ => None,
    })
}

fn decode_codec(codec: &Option<Codec>, ctx: &ParsingContext, node: NodeId, raw: Vec<u8>, path: &str) -> Result<Value> {
    match resolve_codec(codec, ctx, node) {
        Some(c) => (c.decode)(&raw).map_err(|e| e.with_prefix(path)),
        None => Ok(Value::Bytes(raw)),
    }
}

fn encode_codec(codec: &Option<Codec>, ctx: &ParsingContext, node: NodeId, value: &Value, path: &str) -> Result<Vec<u8>> {
    match resolve_codec(codec, ctx, node) {
        Some(c) => (c.encode)(value).map_err(|e| e.with_prefix(path)),
        None => value
            .as_bytes()
            .map(|b| b.to_vec())
            .or_else(|| value.as_str().map(|s| s.as_bytes().to_vec()))
            .ok_or_else(|| Error::write(path, "expected a bytes or string value")),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::ParsingContext;
    use std::io::Cursor;

    #[test]
    fn fixed_length_strips_trailing_padding() {
        let field = Field::new(
            "name",
            FieldKind::Fixed {
                length: 8.into(),
                padding: Some(0),
                codec: Some(Codec::utf8()),
            },
        );
        let mut bs = BitStream::new(Cursor::new(b"abc\0\0\0\0\0".to_vec()));
        let ctx = ParsingContext::new();
        let v = decode(&field, &mut bs, &ctx, ctx.root(), "").unwrap();
        assert_eq!(v, Value::Str("abc".to_owned()));
    }

    #[test]
    fn terminated_excludes_terminator_by_default() {
        let field = Field::new(
            "name",
            FieldKind::Terminated {
                terminator: vec![0],
                include: false,
                codec: Some(Codec::utf8()),
            },
        );
        let mut bs = BitStream::new(Cursor::new(b"hello\0world".to_vec()));
        let ctx = ParsingContext::new();
        let v = decode(&field, &mut bs, &ctx, ctx.root(), "").unwrap();
        assert_eq!(v, Value::Str("hello".to_owned()));
    }
}
