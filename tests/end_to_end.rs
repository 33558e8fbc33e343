//! Scenario-level tests exercising `Structure` end to end, one per field
//! kind combination that's awkward to cover from inside a single module.

use byteordered::Endianness;
use declarative_format::expr::field;
use declarative_format::field::{Codec, Field, FieldKind};
use declarative_format::stream::{BitStream, CaptureBuf, CaptureStream};
use declarative_format::structure::Structure;
use declarative_format::value::{Record, Value};
use internment::Intern;
use pretty_assertions::assert_eq;
use std::io::Cursor;

#[test_log::test]
fn length_prefixed_blob_round_trips_without_caller_tracking_the_count() {
    let structure = Structure::new(
        "Blob",
        vec![
            Field::new(
                "count",
                FieldKind::Integer {
                    size: 1,
                    signed: false,
                    order: Some(Endianness::Big),
                },
            ),
            Field::new(
                "data",
                FieldKind::Fixed {
                    length: "count".into(),
                    padding: None,
                    codec: None,
                },
            ),
        ],
    );

    let raw = vec![3u8, b'h', b'i', b'!'];
    let record = structure.decode(Cursor::new(raw.clone())).unwrap();
    assert_eq!(record.get("count"), Some(&Value::UInt(3)));
    assert_eq!(record.get("data"), Some(&Value::Bytes(b"hi!".to_vec())));

    // The caller never has to supply `count` themselves: it's derived from
    // `data`'s length by the auto-installed override.
    let mut input = Record::new();
    input.set(Intern::new("data".to_owned()), Value::Bytes(b"hi!".to_vec()));
    let mut out = Vec::new();
    structure.encode(Cursor::new(&mut out), &input).unwrap();
    assert_eq!(out, raw);
}

#[test_log::test]
fn byte_order_is_a_runtime_field_attribute() {
    let structure = Structure::new(
        "Pair",
        vec![
            Field::new(
                "be",
                FieldKind::Integer {
                    size: 2,
                    signed: false,
                    order: Some(Endianness::Big),
                },
            ),
            Field::new(
                "le",
                FieldKind::Integer {
                    size: 2,
                    signed: false,
                    order: Some(Endianness::Little),
                },
            ),
        ],
    );
    let record = structure.decode(Cursor::new(vec![0x01, 0x02, 0x01, 0x02])).unwrap();
    assert_eq!(record.get("be"), Some(&Value::UInt(0x0102)));
    assert_eq!(record.get("le"), Some(&Value::UInt(0x0201)));
}

#[test_log::test]
fn bit_flags_then_a_byte_field_realign_automatically() {
    let structure = Structure::new(
        "Flags",
        vec![
            Field::new(
                "a",
                FieldKind::Bit {
                    bits: 1,
                    signed: false,
                    realign: false,
                },
            ),
            Field::new(
                "b",
                FieldKind::Bit {
                    bits: 1,
                    signed: false,
                    realign: false,
                },
            ),
            Field::new(
                "c",
                FieldKind::Bit {
                    bits: 1,
                    signed: false,
                    realign: false,
                },
            ),
            Field::new(
                "value",
                FieldKind::Integer {
                    size: 1,
                    signed: false,
                    order: Some(Endianness::Big),
                },
            ),
        ],
    );
    // 0b101_00000 -> a=1, b=0, c=1, remaining 5 bits discarded by alignment.
    let record = structure.decode(Cursor::new(vec![0b1010_0000u8, 0x42])).unwrap();
    assert_eq!(record.get("a"), Some(&Value::UInt(1)));
    assert_eq!(record.get("b"), Some(&Value::UInt(0)));
    assert_eq!(record.get("c"), Some(&Value::UInt(1)));
    assert_eq!(record.get("value"), Some(&Value::UInt(0x42)));
}

#[test_log::test]
fn switch_on_enum_picks_the_matching_variant() {
    let ping_variant = Intern::new("Ping".to_owned());
    let pong_variant = Intern::new("Pong".to_owned());
    let structure = Structure::new(
        "Message",
        vec![
            Field::new(
                "kind",
                FieldKind::Enum {
                    inner: Box::new(Field::new(
                        "kind",
                        FieldKind::Integer {
                            size: 1,
                            signed: false,
                            order: Some(Endianness::Big),
                        },
                    )),
                    variants: vec![(0, ping_variant), (1, pong_variant)],
                },
            ),
            Field::new(
                "body",
                FieldKind::Switch {
                    on: field("kind"),
                    cases: vec![(
                        Value::Enum { raw: 0, name: Some(ping_variant) },
                        Field::new(
                            "body",
                            FieldKind::Fixed {
                                length: 0usize.into(),
                                padding: None,
                                codec: None,
                            },
                        ),
                    )],
                    default: Some(Box::new(Field::new(
                        "body",
                        FieldKind::Integer {
                            size: 1,
                            signed: false,
                            order: Some(Endianness::Big),
                        },
                    ))),
                },
            ),
        ],
    );
    let record = structure.decode(Cursor::new(vec![1u8, 0x2a])).unwrap();
    assert_eq!(record.get("kind"), Some(&Value::Enum { raw: 1, name: Some(pong_variant) }));
    assert_eq!(record.get("body"), Some(&Value::UInt(0x2a)));
}

#[test_log::test]
fn array_until_stops_after_the_matching_element() {
    use std::rc::Rc;
    let structure = Structure::new(
        "Frame",
        vec![Field::new(
            "bytes",
            FieldKind::Array {
                inner: Box::new(Field::new(
                    "b",
                    FieldKind::Integer {
                        size: 1,
                        signed: false,
                        order: Some(Endianness::Big),
                    },
                )),
                count: None,
                length: Some((-1i64).into()),
                until: Some(Rc::new(|v: &Value| v.as_uint() == Some(0))),
            },
        )],
    );
    let record = structure.decode(Cursor::new(vec![1, 2, 0, 9])).unwrap();
    assert_eq!(
        record.get("bytes"),
        Some(&Value::Array(vec![Value::UInt(1), Value::UInt(2), Value::UInt(0)]))
    );
}

#[test_log::test]
fn capture_stream_recovers_raw_bytes_for_a_trailing_checksum() {
    let structure = Structure::new(
        "Packet",
        vec![
            Field::new(
                "magic",
                FieldKind::Constant {
                    value: Value::Bytes(b"HI".to_vec()),
                    inner: Box::new(Field::new(
                        "magic",
                        FieldKind::Fixed {
                            length: 2usize.into(),
                            padding: None,
                            codec: None,
                        },
                    )),
                },
            ),
            Field::new(
                "payload",
                FieldKind::Integer {
                    size: 2,
                    signed: false,
                    order: Some(Endianness::Big),
                },
            ),
        ],
    );
    let buf = CaptureBuf::new();
    let raw = vec![b'H', b'I', 0x00, 0x7b];
    let capture = CaptureStream::new(Cursor::new(raw.clone()), buf.clone());
    let record = structure.decode(capture).unwrap();
    assert_eq!(record.get("payload"), Some(&Value::UInt(0x7b)));
    // Everything the structure read is recoverable byte-for-byte, so a
    // trailing CRC field can hash exactly what was on the wire.
    assert_eq!(buf.bytes_in_range(0, 4), raw);
}

#[test_log::test]
fn utf8_codec_layers_over_a_terminated_byte_run() {
    let field = Field::new(
        "name",
        FieldKind::Terminated {
            terminator: vec![0],
            include: false,
            codec: Some(Codec::utf8()),
        },
    );
    let structure = Structure::new("Name", vec![field]);
    let record = structure.decode(Cursor::new(b"destructify\0".to_vec())).unwrap();
    assert_eq!(record.get("name"), Some(&Value::Str("destructify".to_owned())));
}

#[test_log::test]
fn check_expression_rejects_a_bad_value() {
    let structure = Structure::new(
        "Even",
        vec![Field::new(
            "n",
            FieldKind::Integer {
                size: 1,
                signed: false,
                order: Some(Endianness::Big),
            },
        )
        .with_check((field("n") % 2i64).eq(0i64))],
    );
    let err = structure.decode(Cursor::new(vec![3u8])).unwrap_err();
    assert_eq!(err.kind(), declarative_format::ErrorKind::Check);
}

#[test_log::test]
fn alignment_pads_between_fields_to_the_declared_modulus() {
    let structure = Structure::new(
        "Aligned",
        vec![
            Field::new("tag", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
            Field::new("value", FieldKind::Integer { size: 2, signed: false, order: Some(Endianness::Big) }),
        ],
    )
    .with_alignment(4);

    let raw = vec![0xAAu8, 0, 0, 0, 0x00, 0x10];
    let record = structure.decode(Cursor::new(raw.clone())).unwrap();
    assert_eq!(record.get("tag"), Some(&Value::UInt(0xAA)));
    assert_eq!(record.get("value"), Some(&Value::UInt(0x10)));

    let mut out = Vec::new();
    structure.encode(Cursor::new(&mut out), &record).unwrap();
    assert_eq!(out, raw);
}

#[test_log::test]
fn initialize_hook_derives_a_field_after_decode() {
    let structure = Structure::new(
        "Pair",
        vec![
            Field::new("a", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
            Field::new("b", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
        ],
    )
    .with_initialize(|_ctx, _node, mut rec| {
        let a = rec.get("a").and_then(|v| v.as_uint()).unwrap_or(0);
        let b = rec.get("b").and_then(|v| v.as_uint()).unwrap_or(0);
        rec.set(Intern::new("sum".to_owned()), Value::UInt(a + b));
        Ok(rec)
    });
    let record = structure.decode(Cursor::new(vec![2u8, 3u8])).unwrap();
    assert_eq!(record.get("sum"), Some(&Value::UInt(5)));
}

#[test_log::test]
fn finalize_hook_overrides_a_field_before_encoding() {
    let structure = Structure::new(
        "Checksummed",
        vec![
            Field::new("payload", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
            Field::new("crc", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
        ],
    )
    .with_finalize(|_ctx, _node, mut rec| {
        let payload = rec.get("payload").and_then(|v| v.as_uint()).unwrap_or(0);
        rec.set(Intern::new("crc".to_owned()), Value::UInt(payload ^ 0xFF));
        Ok(rec)
    });
    let mut input = Record::new();
    input.set(Intern::new("payload".to_owned()), Value::UInt(0x0F));
    input.set(Intern::new("crc".to_owned()), Value::UInt(0));
    let mut out = Vec::new();
    structure.encode(Cursor::new(&mut out), &input).unwrap();
    assert_eq!(out, vec![0x0F, 0xF0]);
}

#[test_log::test]
fn structure_len_sums_static_field_sizes() {
    let structure = Structure::new(
        "Header",
        vec![
            Field::new("magic", FieldKind::Fixed { length: 4usize.into(), padding: None, codec: None }),
            Field::new("version", FieldKind::Integer { size: 2, signed: false, order: Some(Endianness::Big) }),
        ],
    );
    assert_eq!(structure.len().unwrap(), 6);
}

#[test_log::test]
fn structure_len_is_impossible_for_a_length_prefixed_field() {
    let structure = Structure::new(
        "Blob",
        vec![
            Field::new("count", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
            Field::new("data", FieldKind::Fixed { length: "count".into(), padding: None, codec: None }),
        ],
    );
    let err = structure.len().unwrap_err();
    assert_eq!(err.kind(), declarative_format::ErrorKind::ImpossibleLength);
}

#[test_log::test]
fn non_strict_fixed_field_degrades_on_a_short_read_instead_of_erroring() {
    let structure = Structure::new(
        "Lenient",
        vec![Field::new(
            "tail",
            FieldKind::Fixed { length: 8usize.into(), padding: None, codec: None },
        )
        .with_strict(false)],
    );
    let record = structure.decode(Cursor::new(vec![1u8, 2, 3])).unwrap();
    assert_eq!(record.get("tail"), Some(&Value::Bytes(vec![1, 2, 3])));
}

#[test_log::test]
fn strict_fixed_field_errors_on_a_short_read() {
    let structure = Structure::new(
        "Strict",
        vec![Field::new(
            "tail",
            FieldKind::Fixed { length: 8usize.into(), padding: None, codec: None },
        )],
    );
    let err = structure.decode(Cursor::new(vec![1u8, 2, 3])).unwrap_err();
    assert_eq!(err.kind(), declarative_format::ErrorKind::StreamExhausted);
}

#[test_log::test]
fn integer_field_inherits_the_structures_byte_order() {
    let structure = Structure::new(
        "Native",
        vec![Field::new(
            "n",
            FieldKind::Integer { size: 2, signed: false, order: None },
        )],
    )
    .with_byte_order(Endianness::Little);
    let record = structure.decode(Cursor::new(vec![0x34, 0x12])).unwrap();
    assert_eq!(record.get("n"), Some(&Value::UInt(0x1234)));
}

#[test_log::test]
fn initialize_hook_reads_a_prior_fields_captured_raw_bytes() {
    let structure = Structure::new(
        "ConstCrc",
        vec![
            Field::new("magic", FieldKind::Fixed { length: 2usize.into(), padding: None, codec: None }),
            Field::new("crc", FieldKind::Integer { size: 1, signed: false, order: Some(Endianness::Big) }),
        ],
    )
    .with_capture_raw(true)
    .with_initialize(|ctx, node, mut rec| {
        let magic_bytes = ctx.raw_of(node, "magic").unwrap_or(&[]);
        let computed: u64 = magic_bytes.iter().fold(0u64, |acc, b| acc ^ *b as u64);
        let ok = rec.get("crc").and_then(|v| v.as_uint()) == Some(computed);
        rec.set(Intern::new("crc_ok".to_owned()), Value::Bool(ok));
        Ok(rec)
    });
    let record = structure.decode(Cursor::new(vec![0xAB, 0xCD, 0x66])).unwrap();
    assert_eq!(record.get("crc_ok"), Some(&Value::Bool(true)));
}
