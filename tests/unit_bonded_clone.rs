#![allow(missing_docs)]

use bondrt::codec::{
	Cloner, DataType, Deserializer, DynamicObject, FieldDef, LazyPayload, ProtocolKind, ProtocolReader, RuntimeSchema, SchemaDef, SimpleWriter, StructDef,
	TypeDef, Value, from_bytes, to_bytes,
};

#[test]
fn decoding_a_bonded_field_leaves_the_reader_alone() {
	let schema = envelope_schema();
	let bytes = to_bytes(&envelope(&schema), &schema, ProtocolKind::Compact).expect("serialize succeeds");

	let plan = Deserializer::new(schema).expect("plan builds");
	let mut reader = ProtocolKind::Compact.reader(bytes.clone());
	let obj = plan.deserialize(&mut reader).expect("deserialize succeeds");
	let end = reader.position();
	assert_eq!(end, bytes.len());
	assert_eq!(obj.get("tail").and_then(Value::as_str), Some("after"));

	let payload = bonded(&obj, "payload");
	let first = payload.decode().expect("first decode succeeds");
	let second = payload.decode().expect("second decode succeeds");
	assert_eq!(first, second);
	assert_eq!(first.get("n"), Some(&Value::I64(9)));
	assert_eq!(reader.position(), end);
}

#[test]
fn absent_bonded_field_reads_as_the_empty_payload() {
	let schema = envelope_schema();
	for protocol in ProtocolKind::ALL {
		let bytes = to_bytes(&DynamicObject::new().with("tail", "only"), &schema, protocol).expect("serialize succeeds");
		let obj = from_bytes(bytes, &schema, protocol).expect("deserialize succeeds");
		let payload = bonded(&obj, "payload");
		assert!(payload.is_empty() || payload.decode().expect("decode succeeds").get("n") == Some(&Value::I64(-1)), "{protocol}");
		assert_eq!(obj.get("tail").and_then(Value::as_str), Some("only"));
	}
}

#[test]
fn captured_payload_serializes_into_another_protocol() {
	let schema = envelope_schema();
	let leaf = schema.for_struct(1).expect("leaf exists");
	let bytes = to_bytes(&envelope(&schema), &schema, ProtocolKind::CompactV2).expect("serialize succeeds");
	let obj = from_bytes(bytes, &schema, ProtocolKind::CompactV2).expect("deserialize succeeds");

	let mut writer = SimpleWriter::new();
	bonded(&obj, "payload").serialize(&mut writer).expect("payload serializes");
	let decoded = from_bytes(writer.into_bytes(), &leaf, ProtocolKind::Simple).expect("deserialize succeeds");
	assert_eq!(decoded.get("n"), Some(&Value::I64(9)));
}

#[test]
fn cloned_objects_share_payloads_and_reencode() {
	let schema = envelope_schema();
	let bytes = to_bytes(&envelope(&schema), &schema, ProtocolKind::Compact).expect("serialize succeeds");
	let obj = from_bytes(bytes, &schema, ProtocolKind::Compact).expect("deserialize succeeds");

	let copy = Cloner::new(schema.clone()).expect("cloner builds").clone_object(&obj).expect("clone succeeds");
	assert_eq!(copy, obj);
	assert_eq!(bonded(&copy, "payload").protocol(), Some(ProtocolKind::Compact));

	for protocol in ProtocolKind::ALL {
		let out = to_bytes(&copy, &schema, protocol).expect("serialize succeeds");
		let back = from_bytes(out, &schema, protocol).expect("deserialize succeeds");
		assert_eq!(bonded(&back, "payload").decode().expect("decode succeeds").get("n"), Some(&Value::I64(9)));
		assert_eq!(back.get("tail").and_then(Value::as_str), Some("after"));
	}
}

fn bonded<'a>(obj: &'a DynamicObject, name: &str) -> &'a LazyPayload {
	match obj.get(name) {
		Some(Value::Bonded(payload)) => payload,
		other => panic!("{name} should be bonded, got {other:?}"),
	}
}

fn envelope(schema: &RuntimeSchema) -> DynamicObject {
	let leaf = schema.for_struct(1).expect("leaf exists");
	DynamicObject::new()
		.with("payload", LazyPayload::from_value(DynamicObject::new().with("n", 9), leaf))
		.with("tail", "after")
}

fn envelope_schema() -> RuntimeSchema {
	let envelope = StructDef::new(
		"Envelope",
		vec![
			FieldDef::optional(0, "payload", TypeDef::bonded(1)),
			FieldDef::optional(1, "tail", TypeDef::scalar(DataType::String)),
		],
	);
	let leaf = StructDef::new(
		"Leaf",
		vec![FieldDef::optional(0, "n", TypeDef::scalar(DataType::Int32)).with_default(bondrt::codec::Variant {
			int_value: -1,
			..Default::default()
		})],
	);
	RuntimeSchema::new(SchemaDef::new(vec![envelope, leaf])).expect("schema is valid")
}
