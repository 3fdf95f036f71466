#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use bondrt::codec::{DynamicObject, LazyPayload, MapValue, ProtocolKind, RuntimeSchema, Value, from_bytes, to_bytes, transcode_bytes};

#[test]
fn every_protocol_round_trips_the_record() {
	let schema = record_schema();
	let obj = record(&schema);

	for protocol in ProtocolKind::ALL {
		let bytes = to_bytes(&obj, &schema, protocol).expect("serialize succeeds");
		let decoded = from_bytes(bytes.clone(), &schema, protocol).expect("deserialize succeeds");
		assert_same_record(&obj, &decoded);

		let again = to_bytes(&decoded, &schema, protocol).expect("reserialize succeeds");
		assert_eq!(bytes, again, "{protocol} bytes should be stable across a round trip");
	}
}

#[test]
fn transcoding_matches_direct_serialization() {
	let schema = record_schema();
	let obj = record(&schema);

	for from in ProtocolKind::ALL {
		let input = to_bytes(&obj, &schema, from).expect("serialize succeeds");
		for to in ProtocolKind::ALL {
			let direct = to_bytes(&obj, &schema, to).expect("serialize succeeds");
			let converted = transcode_bytes(input.clone(), &schema, from, to).expect("transcode succeeds");
			assert_eq!(converted, direct, "{from} -> {to}");
		}
	}
}

#[test]
fn compact_v2_prefixes_structs_with_their_length() {
	let schema = record_schema();
	let leaf = schema.for_struct(2).expect("leaf exists");
	let bytes = to_bytes(&DynamicObject::new().with("n", 5), &leaf, ProtocolKind::CompactV2).expect("serialize succeeds");

	assert_eq!(usize::from(bytes[0]), bytes.len() - 1);
	let decoded = from_bytes(bytes, &leaf, ProtocolKind::CompactV2).expect("deserialize succeeds");
	assert_eq!(decoded.get("n"), Some(&Value::I64(5)));
}

#[test]
fn wide_strings_survive_every_protocol() {
	let schema = record_schema();
	let obj = record(&schema).with("title", "größe 𝄞");

	for protocol in ProtocolKind::ALL {
		let bytes = to_bytes(&obj, &schema, protocol).expect("serialize succeeds");
		let decoded = from_bytes(bytes, &schema, protocol).expect("deserialize succeeds");
		assert_eq!(decoded.get("title").and_then(Value::as_str), Some("größe 𝄞"));
	}
}

fn record(schema: &RuntimeSchema) -> DynamicObject {
	let leaf = schema.for_struct(2).expect("leaf exists");
	let mut counts = MapValue::new();
	counts.insert(Value::from("a"), Value::I64(3)).expect("insert succeeds");
	counts.insert(Value::from("b"), Value::I64(-400)).expect("insert succeeds");

	DynamicObject::new()
		.with("id", 42_u32)
		.with("kind", -3_i32)
		.with("name", "record")
		.with("score", 2.5_f64)
		.with("ratio", 0.5_f32)
		.with("tags", vec![Value::from("x"), Value::from("y")])
		.with("counts", counts)
		.with("ids", vec![Value::U64(1), Value::U64(300)])
		.with("data", vec![1_u8, 2, 255])
		.with("child", DynamicObject::new().with("n", 1))
		.with("leaf", DynamicObject::new().with("n", 7))
		.with("flag", true)
		.with("title", "wide")
		.with("extra", LazyPayload::from_value(DynamicObject::new().with("n", 9), leaf))
}

fn assert_same_record(expected: &DynamicObject, decoded: &DynamicObject) {
	for (name, value) in expected.iter() {
		let got = decoded.get(name).unwrap_or_else(|| panic!("{name} should decode"));
		match (value, got) {
			(Value::Bonded(want), Value::Bonded(have)) => {
				assert_eq!(want.decode().expect("decode succeeds"), have.decode().expect("decode succeeds"));
			}
			_ => assert_eq!(value, got, "field {name}"),
		}
	}
	assert_eq!(expected.len(), decoded.len());
}

fn record_schema() -> RuntimeSchema {
	RuntimeSchema::from_path(fixture_path("record.json")).expect("fixture schema loads")
}

fn fixture_path(name: &str) -> PathBuf {
	Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}
