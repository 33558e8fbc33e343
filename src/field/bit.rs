//! Sub-byte integer fields packed MSB-first (§4.3.3), grounded in
//! `destructify.fields.common.BitField`. Alignment padding between a
//! byte-oriented field and a run of bit fields is the structure driver's
//! concern (`crate::structure`), not the field's — this module only ever
//! sees an already-positioned [`BitStream`].

use super::base::{Field, FieldKind};
use crate::error::{Error, Result};
use crate::stream::BitStream;
use crate::value::Value;
use std::io::{Read, Seek, Write};

pub fn decode<S: Read + Seek>(field: &Field, bs: &mut BitStream<S>, path: &str) -> Result<Value> {
    let FieldKind::Bit { bits, signed, .. } = &field.kind else {
        unreachable!("bit::decode called with a non-bit field kind")
    };
    if *bits == 0 || *bits > 64 {
        return Err(Error::definition(path, "bit field width must be between 1 and 64"));
    }
    let raw = bs.read_uint(*bits, path)?;
    if *signed {
        let sign_bit = 1u64 << (bits - 1);
        let v = if raw & sign_bit != 0 {
            (raw as i64) - (1i64 << *bits)
        } else {
            raw as i64
        };
        Ok(Value::Int(v))
    } else {
        Ok(Value::UInt(raw))
    }
}

pub fn encode<S: Write + Seek>(field: &Field, bs: &mut BitStream<S>, value: &Value, path: &str) -> Result<()> {
    let FieldKind::Bit { bits, signed, .. } = &field.kind else {
        unreachable!("bit::encode called with a non-bit field kind")
    };
    if *bits == 0 || *bits > 64 {
        return Err(Error::definition(path, "bit field width must be between 1 and 64"));
    }
    let raw = if *signed {
        let v = value.as_int().ok_or_else(|| Error::write(path, "expected an integer value"))?;
        (v as u64) & ((1u128 << *bits) - 1) as u64
    } else {
        value
            .as_uint()
            .ok_or_else(|| Error::write(path, "expected an unsigned integer value"))?
    };
    bs.write_uint(raw, *bits, path)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn signed_bit_field_sign_extends() {
        let field = Field::new(
            "n",
            FieldKind::Bit {
                bits: 4,
                signed: true,
                realign: false,
            },
        );
        let mut out = Vec::new();
        {
            let mut bs = BitStream::new(Cursor::new(&mut out));
            encode(&field, &mut bs, &Value::Int(-3), "").unwrap();
            bs.finalize("").unwrap();
        }
        let mut bs = BitStream::new(Cursor::new(&out));
        assert_eq!(decode(&field, &mut bs, "").unwrap(), Value::Int(-3));
    }
}
