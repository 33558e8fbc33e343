//! The `Structure` metaobject and its read/write driver (§4.4), grounded in
//! `destructify.structures.base.Structure`/`StructureOptions`. Declaration
//! order is the only ordinal a field gets — no creation-order global counter
//! (spec.md §9 rejects that as the C-extension-era workaround it was).

use crate::context::{FieldRecord, NodeId, ParsingContext};
use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::field::base::{decode_field, encode_field};
use crate::field::{Field, FieldKind, SizeSpec};
use crate::stream::{BitStream, CaptureBuf, CaptureStream};
use crate::value::{Record, Value};
use byteordered::Endianness;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;
use tracing::{debug, trace};

pub struct Structure {
    pub name: String,
    pub fields: Vec<Field>,
    checks: Vec<Expr>,
    /// Default byte order an `Integer` field without its own `order` falls
    /// back to (§4.3.3). Inherited by nested `StructureField` embeddings via
    /// `ParsingContext::byte_order_of`'s parent-chain walk.
    byte_order: Option<Endianness>,
    /// Default text codec name a `Fixed`/`Terminated` field without its own
    /// `Codec` falls back to. Only `"utf8"` is recognized today.
    encoding: Option<&'static str>,
    /// Byte modulus every non-bit-field boundary is padded out to (§4.3.4).
    /// Never applied mid-bit-field-run — only at the same flush points that
    /// already discard/finalize pending bits.
    alignment: Option<u64>,
    /// When set, every field's raw `[offset, offset+length)` bytes are
    /// captured and stored on its `FieldRecord` (§4.1 "CaptureStream").
    capture_raw: bool,
    initialize: Option<Rc<dyn Fn(&ParsingContext, NodeId, Record) -> Result<Record>>>,
    finalize: Option<Rc<dyn Fn(&ParsingContext, NodeId, Record) -> Result<Record>>>,
}

impl Structure {
    /// Builds a structure from its field sequence, installing the
    /// length/count auto-overrides described in `BytesField.initialize`/
    /// `ArrayField.initialize` for any field whose size is given as another
    /// field's name rather than a literal or expression.
    pub fn new(name: impl Into<String>, mut fields: Vec<Field>) -> Self {
        install_overrides(&mut fields);
        Structure {
            name: name.into(),
            fields,
            checks: Vec::new(),
            byte_order: None,
            encoding: None,
            alignment: None,
            capture_raw: false,
            initialize: None,
            finalize: None,
        }
    }

    pub fn with_check(mut self, e: Expr) -> Self {
        self.checks.push(e);
        self
    }

    pub fn with_byte_order(mut self, order: Endianness) -> Self {
        self.byte_order = Some(order);
        self
    }

    pub fn with_encoding(mut self, encoding: &'static str) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = Some(alignment);
        self
    }

    pub fn with_capture_raw(mut self, capture_raw: bool) -> Self {
        self.capture_raw = capture_raw;
        self
    }

    /// Runs after the sequential decode pass, before checks (§4.6, read-path
    /// step 4). Receives the parse context (for `ctx.raw_of` lookups against
    /// already-decoded fields when `capture_raw` is on) and the decoded
    /// record, and may return a transformed record — e.g. deriving a field
    /// that only makes sense once its siblings are known.
    pub fn with_initialize(mut self, f: impl Fn(&ParsingContext, NodeId, Record) -> Result<Record> + 'static) -> Self {
        self.initialize = Some(Rc::new(f));
        self
    }

    /// Runs after override resolution, before the stream is written (§4.6,
    /// write-path step 2) — e.g. computing a checksum over fields already
    /// resolved in the value dict. Runs before the sequential write pass, so
    /// `ctx.raw_of` only sees bytes a prior *decode* on this same context
    /// captured, never this encode's own output.
    pub fn with_finalize(mut self, f: impl Fn(&ParsingContext, NodeId, Record) -> Result<Record> + 'static) -> Self {
        self.finalize = Some(Rc::new(f));
        self
    }

    /// The structure's byte length when every field's size is statically
    /// known (§4.3/§6), coalescing adjacent open bit-field runs into whole
    /// bytes at their flush boundary and folding in `alignment` padding the
    /// same way the decode/encode drivers do. Returns `ImpossibleLength` the
    /// moment any field's size depends on a runtime value.
    pub fn len(&self) -> Result<usize> {
        let mut bytes: u64 = 0;
        let mut pending_bits: u64 = 0;
        let mut prev_was_open_bitfield = false;
        for field in &self.fields {
            let do_flush = match &field.kind {
                FieldKind::Bit { realign, .. } => !prev_was_open_bitfield || *realign,
                _ => true,
            };
            if do_flush && pending_bits > 0 {
                bytes += (pending_bits + 7) / 8;
                pending_bits = 0;
                self.pad_to_alignment(&mut bytes);
            }
            let flen = field
                .static_bit_len()
                .ok_or_else(|| Error::impossible_length(self.name.clone()))?;
            if matches!(field.kind, FieldKind::Bit { .. }) {
                pending_bits += flen;
            } else {
                bytes += flen / 8;
            }
            prev_was_open_bitfield = is_open_bitfield(field);
        }
        if pending_bits > 0 {
            bytes += (pending_bits + 7) / 8;
        }
        Ok(bytes as usize)
    }

    fn pad_to_alignment(&self, bytes: &mut u64) {
        if let Some(align) = self.alignment {
            let rem = *bytes % align;
            if rem != 0 {
                *bytes += align - rem;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A one-line C struct rendering of every field (§6), mirroring
    /// `destructify.fields.base.Field.ctype` composition.
    pub fn as_c_struct(&self) -> String {
        let members: Vec<String> = self.fields.iter().map(|f| format!("    {}", f.ctype())).collect();
        format!("struct {} {{\n{}\n}};", self.name, members.join("\n"))
    }

    pub fn decode<S: Read + Seek>(&self, stream: S) -> Result<Record> {
        let buf = CaptureBuf::new();
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        if self.capture_raw {
            ctx.capture = Some(buf.clone());
        }
        ctx.set_byte_order(node, self.byte_order);
        ctx.set_encoding(node, self.encoding);
        let mut bs = BitStream::new(CaptureStream::new(stream, buf));
        debug!(structure = %self.name, "decoding structure");
        decode_fields(&self.fields, &mut bs, &mut ctx, node, "", self.alignment)?;
        if let Some(init) = &self.initialize {
            let rec = init(&ctx, node, ctx.to_record(node)).map_err(|e| e.with_prefix(&self.name))?;
            ctx.replace_record(node, &rec);
        }
        self.run_checks(&ctx, node, "")?;
        Ok(ctx.to_record(node))
    }

    pub fn encode<S: Write + Seek>(&self, stream: S, record: &Record) -> Result<()> {
        let buf = CaptureBuf::new();
        let mut ctx = ParsingContext::new();
        let node = ctx.root();
        if self.capture_raw {
            ctx.capture = Some(buf.clone());
        }
        ctx.set_byte_order(node, self.byte_order);
        ctx.set_encoding(node, self.encoding);
        encode_prepare(&self.fields, &mut ctx, node, record, "")?;
        if let Some(fin) = &self.finalize {
            let rec = fin(&ctx, node, ctx.to_record(node)).map_err(|e| e.with_prefix(&self.name))?;
            ctx.replace_record(node, &rec);
        }
        self.run_checks(&ctx, node, "")?;
        let mut bs = BitStream::new(CaptureStream::new(stream, buf));
        debug!(structure = %self.name, "encoding structure");
        encode_write(&self.fields, &mut bs, &mut ctx, node, "", self.alignment)?;
        bs.finalize("")?;
        Ok(())
    }

    fn run_checks(&self, ctx: &ParsingContext, node: NodeId, path: &str) -> Result<()> {
        let full_name = if path.is_empty() {
            self.name.clone()
        } else {
            format!("{path}.{}", self.name)
        };
        for check in &self.checks {
            let ok = check.eval(ctx, node)?.as_bool().unwrap_or(false);
            if !ok {
                return Err(Error::check(full_name.clone(), "structure-level check evaluated to false"));
            }
        }
        Ok(())
    }
}

/// Installs `override = len_(this.field(name))`/`len_(.. count ..)` on any
/// field referenced by a `SizeSpec::Field`, so encoding never requires the
/// caller to keep a redundant length/count in sync by hand.
fn install_overrides(fields: &mut [Field]) {
    let mut overrides: Vec<(usize, Expr)> = Vec::new();
    for field in fields.iter() {
        if let Some(spec) = size_ref_of(field) {
            if let SizeSpec::Field(name) = spec {
                if let Some(idx) = fields.iter().position(|f| f.name.as_str() == name) {
                    // `len_` already distinguishes a byte count (Bytes/Str)
                    // from an element count (Array) by the value's own type.
                    let expr = crate::expr::len(crate::expr::field(field.name.as_str().to_owned()));
                    overrides.push((idx, expr));
                }
            }
        }
    }
    for (idx, expr) in overrides {
        fields[idx].override_expr = Some(expr);
    }
}

fn size_ref_of(field: &Field) -> Option<&SizeSpec> {
    match &field.kind {
        FieldKind::Fixed { length, .. } => Some(length),
        FieldKind::Array { count, length, .. } => count.as_ref().or(length.as_ref()),
        _ => None,
    }
}

/// Runs the preparse pass (resolving literal-offset `lazy` fields out of
/// order) followed by the sequential decode pass, over `fields` rooted at
/// `node`. Shared by `Structure::decode` and `StructureField`'s nested
/// embedding (which always passes `alignment: None` — a nested embedding
/// has no alignment of its own, see `field/structure_field.rs`).
pub(crate) fn decode_fields<S: Read + Seek>(
    fields: &[Field],
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
    alignment: Option<u64>,
) -> Result<()> {
    let struct_start = bs.stream_position(path)?;
    for field in fields {
        if field.is_preparsable() {
            preparse_one(field, bs, ctx, node, path)?;
        }
    }
    let mut prev_was_open_bitfield = false;
    for field in fields {
        if field.is_preparsable() {
            if let Some(rec) = ctx.record(node, field.name.as_str()) {
                if let (Some(off), Some(len)) = (rec.offset, rec.length) {
                    bs.seek(SeekFrom::Start(off + len), path)?;
                }
            }
            prev_was_open_bitfield = false;
            continue;
        }
        seek_start_decode(field, bs, ctx, node, path, prev_was_open_bitfield, struct_start, alignment)?;
        let start = bs.stream_position(path)?;
        trace!(field = field.name.as_str(), offset = start, "decoding field");
        decode_field(field, bs, ctx, node, path)?;
        let end = bs.stream_position(path)?;
        if let Some(rec) = ctx.record_mut(node, field.name.as_str()) {
            rec.offset = Some(start);
            rec.length = end.checked_sub(start);
        }
        capture_raw_for(ctx, node, field, start, end);
        prev_was_open_bitfield = is_open_bitfield(field);
    }
    Ok(())
}

/// Encoding runs in two passes over `fields`. A field's `override` (and any
/// `Switch`/`Conditional` expression) may reference a sibling declared
/// *later* in the sequence — e.g. a leading length field overridden from a
/// trailing array's size — so every field's value is resolved into `ctx`
/// first, then the stream is written in declaration order from those
/// resolved values. Mirrors the two-phase shape of
/// `destructify.structures.base.Structure.to_stream` building its context
/// before emitting bytes. Split from a single `encode_fields` so
/// `Structure::encode` can run its `finalize` hook between the two halves.
pub(crate) fn encode_prepare(
    fields: &[Field],
    ctx: &mut ParsingContext,
    node: NodeId,
    record: &Record,
    path: &str,
) -> Result<()> {
    for field in fields {
        if field.override_expr.is_none() {
            let v = record.get(field.name.as_str()).cloned().unwrap_or(Value::None);
            ctx.set(node, field.name, FieldRecord::new(v));
        }
    }
    for field in fields {
        if let Some(over) = &field.override_expr {
            let v = over.eval(ctx, node).map_err(|e| e.with_prefix(path))?;
            ctx.set(node, field.name, FieldRecord::new(v));
        }
    }
    Ok(())
}

/// The write pass: seeks/aligns and writes every field's already-resolved
/// value in declaration order. `alignment` is `None` for a nested
/// `StructureField` embedding.
pub(crate) fn encode_write<S: Write + Seek>(
    fields: &[Field],
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
    alignment: Option<u64>,
) -> Result<()> {
    let struct_start = bs.stream_position(path)?;
    let mut prev_was_open_bitfield = false;
    for field in fields {
        seek_start_encode(field, bs, ctx, node, path, prev_was_open_bitfield, struct_start, alignment)?;
        let value = ctx
            .record(node, field.name.as_str())
            .map(|r| r.value.clone())
            .unwrap_or(Value::None);
        let start = bs.stream_position(path)?;
        trace!(field = field.name.as_str(), "encoding field");
        encode_field(field, bs, ctx, node, &value, path)?;
        let end = bs.stream_position(path)?;
        if let Some(rec) = ctx.record_mut(node, field.name.as_str()) {
            rec.offset = Some(start);
            rec.length = end.checked_sub(start);
        }
        capture_raw_for(ctx, node, field, start, end);
        prev_was_open_bitfield = is_open_bitfield(field);
    }
    Ok(())
}

/// Stores `field`'s captured `[start, end)` bytes on its record, a no-op
/// unless `Structure::with_capture_raw` turned capture on for this parse.
fn capture_raw_for(ctx: &mut ParsingContext, node: NodeId, field: &Field, start: u64, end: u64) {
    if let Some(buf) = ctx.capture.clone() {
        ctx.set_raw(node, field.name.as_str(), buf.bytes_in_range(start, end));
    }
}

fn is_open_bitfield(field: &Field) -> bool {
    matches!(field.kind, FieldKind::Bit { realign: false, .. })
}

fn preparse_one<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &mut ParsingContext,
    node: NodeId,
    path: &str,
) -> Result<()> {
    let off = match &field.offset {
        Some(Expr::Const(v)) => v.as_uint().ok_or_else(|| Error::definition(path, "preparsable offset must be non-negative"))?,
        _ => unreachable!("is_preparsable guarantees a literal non-negative offset"),
    };
    let saved = bs.stream_position(path)?;
    bs.seek(SeekFrom::Start(off), path)?;
    decode_field(field, bs, ctx, node, path)?;
    let end = bs.stream_position(path)?;
    if let Some(rec) = ctx.record_mut(node, field.name.as_str()) {
        rec.offset = Some(off);
        rec.length = end.checked_sub(off);
    }
    capture_raw_for(ctx, node, field, off, end);
    bs.seek(SeekFrom::Start(saved), path)?;
    Ok(())
}

/// Shared by decode/encode: a flush (discard pending bits / finalize and
/// pad) happens whenever the current field isn't an open-ended continuation
/// of the previous bit-field run — i.e. for every non-`Bit` field, and for a
/// `Bit` field only when the previous field didn't leave the run open or
/// this one explicitly realigns (§4.3.4's bit-field exception to alignment:
/// padding only ever lands on one of these flush boundaries, never mid-run).
fn flushes(field: &Field, prev_was_open_bitfield: bool) -> bool {
    match &field.kind {
        FieldKind::Bit { realign, .. } => !prev_was_open_bitfield || *realign,
        _ => true,
    }
}

fn seek_start_decode<S: Read + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &ParsingContext,
    node: NodeId,
    path: &str,
    prev_was_open_bitfield: bool,
    struct_start: u64,
    alignment: Option<u64>,
) -> Result<()> {
    if let Some(abs) = absolute_seek(field, ctx, node, path)? {
        bs.seek(abs, path)?;
        return Ok(());
    }
    if flushes(field, prev_was_open_bitfield) {
        bs.discard_bits();
        if let Some(align) = alignment {
            let pos = bs.stream_position(path)?;
            let rem = pos.saturating_sub(struct_start) % align;
            if rem != 0 {
                bs.seek(SeekFrom::Current((align - rem) as i64), path)?;
            }
        }
    }
    Ok(())
}

fn seek_start_encode<S: Write + Seek>(
    field: &Field,
    bs: &mut BitStream<S>,
    ctx: &ParsingContext,
    node: NodeId,
    path: &str,
    prev_was_open_bitfield: bool,
    struct_start: u64,
    alignment: Option<u64>,
) -> Result<()> {
    if let Some(abs) = absolute_seek(field, ctx, node, path)? {
        bs.finalize(path)?;
        bs.seek(abs, path)?;
        return Ok(());
    }
    if flushes(field, prev_was_open_bitfield) {
        bs.finalize(path)?;
        if let Some(align) = alignment {
            let pos = bs.stream_position(path)?;
            let rem = pos.saturating_sub(struct_start) % align;
            if rem != 0 {
                bs.write_bytes(&vec![0u8; (align - rem) as usize], path)?;
            }
        }
    }
    Ok(())
}

/// Resolves a field's `offset`/`skip` attribute into a concrete `SeekFrom`,
/// mirroring `destructify.fields.base_field.BaseField.seek_start`: a literal
/// or computed `offset` wins (negative means "from the end"), otherwise a
/// `skip` moves relative to the current position.
fn absolute_seek(field: &Field, ctx: &ParsingContext, node: NodeId, path: &str) -> Result<Option<SeekFrom>> {
    if let Some(off) = &field.offset {
        let n = off
            .eval(ctx, node)?
            .as_int()
            .ok_or_else(|| Error::definition(path, "offset must evaluate to an integer"))?;
        return Ok(Some(if n >= 0 {
            SeekFrom::Start(n as u64)
        } else {
            SeekFrom::End(n)
        }));
    }
    if let Some(skip) = &field.skip {
        let n = skip
            .eval(ctx, node)?
            .as_int()
            .ok_or_else(|| Error::definition(path, "skip must evaluate to an integer"))?;
        return Ok(Some(SeekFrom::Current(n)));
    }
    Ok(None)
}
