//! The per-parse state tree (§3 "ParsingContext", §9 "Parent-linked context").
//!
//! Rather than back-pointers between contexts (as `destructify.parsing.
//! context.ParsingContext.parent` uses in Python), nodes live in a flat
//! arena and refer to each other by index — the allocation-free, borrow-
//! checker-friendly shape favored for this kind of parse state.

use crate::error::{Error, Result};
use crate::stream::capture::CaptureBuf;
use crate::value::{Record, Value};
use byteordered::Endianness;
use fxhash::FxHashMap;
use internment::Intern;

pub type NodeId = usize;

/// Per-field parse state: value, provenance, and (for `StructureField`) a
/// link to the nested context that decoded it. Mirrors `destructify.parsing.
/// context.FieldContext`.
#[derive(Clone, Debug)]
pub struct FieldRecord {
    pub value: Value,
    pub offset: Option<u64>,
    pub length: Option<u64>,
    pub parsed: bool,
    pub lazy: bool,
    pub raw: Option<Vec<u8>>,
    pub subcontext: Option<NodeId>,
}

impl FieldRecord {
    pub fn new(value: Value) -> Self {
        FieldRecord {
            value,
            offset: None,
            length: None,
            parsed: true,
            lazy: false,
            raw: None,
            subcontext: None,
        }
    }
}

struct ContextNode {
    parent: Option<NodeId>,
    /// When true, a lookup miss falls through to the parent instead of
    /// erroring — used by array element sub-contexts so elements can
    /// reference fields of the structure that contains the array (§3).
    flat: bool,
    fields: FxHashMap<Intern<String>, FieldRecord>,
    order: Vec<Intern<String>>,
    /// Structure-level `byte_order`/`encoding` (§3), set once by
    /// `Structure::decode`/`encode` on the root node. A nested field queries
    /// these by walking up to the nearest ancestor that set one, since a
    /// `StructureField` embedding doesn't carry its own copy.
    byte_order: Option<Endianness>,
    encoding: Option<&'static str>,
}

pub struct ParsingContext {
    nodes: Vec<ContextNode>,
    pub capture: Option<CaptureBuf>,
}

impl ParsingContext {
    pub fn new() -> Self {
        ParsingContext {
            nodes: vec![ContextNode {
                parent: None,
                flat: false,
                fields: FxHashMap::default(),
                order: Vec::new(),
                byte_order: None,
                encoding: None,
            }],
            capture: None,
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn push_child(&mut self, parent: NodeId, flat: bool) -> NodeId {
        self.nodes.push(ContextNode {
            parent: Some(parent),
            flat,
            fields: FxHashMap::default(),
            order: Vec::new(),
            byte_order: None,
            encoding: None,
        });
        self.nodes.len() - 1
    }

    pub fn set_byte_order(&mut self, node: NodeId, order: Option<Endianness>) {
        self.nodes[node].byte_order = order;
    }

    pub fn set_encoding(&mut self, node: NodeId, encoding: Option<&'static str>) {
        self.nodes[node].encoding = encoding;
    }

    /// Walks up from `node` to the nearest ancestor (inclusive) that has a
    /// `byte_order` set, mirroring "an unset `byte_order` inherits the
    /// structure's" (§4.3.3) even though a nested `StructureField` doesn't
    /// carry a `byte_order` of its own.
    pub fn byte_order_of(&self, node: NodeId) -> Option<Endianness> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if let Some(order) = self.nodes[n].byte_order {
                return Some(order);
            }
            cur = self.nodes[n].parent;
        }
        None
    }

    pub fn encoding_of(&self, node: NodeId) -> Option<&'static str> {
        let mut cur = Some(node);
        while let Some(n) = cur {
            if let Some(enc) = self.nodes[n].encoding {
                return Some(enc);
            }
            cur = self.nodes[n].parent;
        }
        None
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn root_of(&self, node: NodeId) -> NodeId {
        let mut cur = node;
        while let Some(p) = self.nodes[cur].parent {
            cur = p;
        }
        cur
    }

    pub fn set(&mut self, node: NodeId, name: Intern<String>, record: FieldRecord) {
        let n = &mut self.nodes[node];
        if !n.fields.contains_key(&name) {
            n.order.push(name);
        }
        n.fields.insert(name, record);
    }

    pub fn record(&self, node: NodeId, name: &str) -> Option<&FieldRecord> {
        self.nodes[node].fields.get(&Intern::new(name.to_owned()))
    }

    pub fn record_mut(&mut self, node: NodeId, name: &str) -> Option<&mut FieldRecord> {
        self.nodes[node].fields.get_mut(&Intern::new(name.to_owned()))
    }

    /// Resolves `name` starting at `node`, falling through to the parent
    /// chain while nodes are marked `flat` (array element contexts).
    pub fn get(&self, node: NodeId, name: &str) -> Result<&Value> {
        let mut cur = Some(node);
        let mut first = true;
        while let Some(n) = cur {
            if let Some(rec) = self.nodes[n].fields.get(&Intern::new(name.to_owned())) {
                return Ok(&rec.value);
            }
            if first || self.nodes[n].flat {
                cur = self.nodes[n].parent;
            } else {
                cur = None;
            }
            first = false;
        }
        Err(Error::unknown_dependent_field("", name))
    }

    /// Builds the ordered [`Record`] for `node`, recursing into any nested
    /// substructure values that were parsed into a [`Value::Record`]
    /// directly (array/struct fields already store their final `Value`).
    pub fn to_record(&self, node: NodeId) -> Record {
        let n = &self.nodes[node];
        let mut rec = Record::new();
        for name in &n.order {
            if let Some(fr) = n.fields.get(name) {
                rec.set(*name, fr.value.clone());
            }
        }
        rec
    }

    pub fn field_names(&self, node: NodeId) -> &[Intern<String>] {
        &self.nodes[node].order
    }

    /// Re-installs `record`'s values into `node`, preserving each field's
    /// existing `offset`/`length`/`raw` provenance where a slot already
    /// exists. Used by the `initialize`/`finalize` hooks (§4.6) to fold a
    /// user-transformed value dictionary back into the parse state.
    pub fn replace_record(&mut self, node: NodeId, record: &Record) {
        for (name, value) in record.iter() {
            let mut fr = self.record(node, name.as_str()).cloned().unwrap_or_else(|| FieldRecord::new(value.clone()));
            fr.value = value.clone();
            self.set(node, *name, fr);
        }
    }

    /// Stores the raw bytes captured for a field's `[offset, offset+length)`
    /// range, when capture is active (§4.1 "CaptureStream"). A no-op if the
    /// field has no record yet.
    pub fn set_raw(&mut self, node: NodeId, name: &str, raw: Vec<u8>) {
        if let Some(fr) = self.record_mut(node, name) {
            fr.raw = Some(raw);
        }
    }

    /// The exact bytes a capturing parse observed for `name`'s field, when
    /// `Structure::with_capture_raw` is on. An `initialize`/`finalize` hook
    /// uses this to compute a checksum over fields already resolved (§8
    /// scenario 4, "constant + CRC") without re-serializing them by hand.
    pub fn raw_of(&self, node: NodeId, name: &str) -> Option<&[u8]> {
        self.record(node, name)?.raw.as_deref()
    }
}

impl Default for ParsingContext {
    fn default() -> Self {
        Self::new()
    }
}
