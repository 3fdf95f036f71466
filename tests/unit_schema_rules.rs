#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use bondrt::codec::{
	CodecError, DataType, Deserializer, DynamicObject, FieldDef, ProtocolKind, RuntimeSchema, SchemaDef, StructDef, TypeDef, Value, from_bytes, to_bytes,
};

#[test]
fn default_scalars_leave_no_field_marker() {
	let leaf = record_schema().for_struct(2).expect("leaf exists");

	let omitted = to_bytes(&DynamicObject::new().with("n", -1), &leaf, ProtocolKind::Compact).expect("serialize succeeds");
	assert_eq!(omitted.as_ref(), &[0]);
	let absent = to_bytes(&DynamicObject::new(), &leaf, ProtocolKind::Compact).expect("serialize succeeds");
	assert_eq!(absent, omitted);

	let written = to_bytes(&DynamicObject::new().with("n", 0), &leaf, ProtocolKind::Compact).expect("serialize succeeds");
	assert_eq!(written.as_ref(), &[0x10, 0, 0]);

	let decoded = from_bytes(omitted, &leaf, ProtocolKind::Compact).expect("deserialize succeeds");
	assert_eq!(decoded.get("n"), Some(&Value::I64(-1)));
}

#[test]
fn untagged_output_writes_every_field() {
	let leaf = record_schema().for_struct(2).expect("leaf exists");
	let bytes = to_bytes(&DynamicObject::new(), &leaf, ProtocolKind::Simple).expect("serialize succeeds");
	assert_eq!(bytes.as_ref(), &(-1_i32).to_le_bytes());
}

#[test]
fn fields_without_a_default_stay_absent() {
	let s = StructDef::new(
		"Sparse",
		vec![
			FieldDef::optional(0, "maybe", TypeDef::scalar(DataType::UInt16)).with_nothing(),
			FieldDef::optional(1, "count", TypeDef::scalar(DataType::UInt16)),
		],
	);
	let schema = RuntimeSchema::new(SchemaDef::new(vec![s])).expect("schema is valid");
	let bytes = to_bytes(&DynamicObject::new(), &schema, ProtocolKind::Compact).expect("serialize succeeds");
	let decoded = from_bytes(bytes, &schema, ProtocolKind::Compact).expect("deserialize succeeds");

	assert!(!decoded.contains("maybe"));
	assert_eq!(decoded.get("count"), Some(&Value::U64(0)));
}

#[test]
fn nullable_and_list_share_a_wire_form() {
	let list = holder(TypeDef::list(TypeDef::scalar(DataType::Int32)));
	let nullable = holder(TypeDef::nullable(TypeDef::scalar(DataType::Int32)));

	for protocol in ProtocolKind::ALL {
		let one = to_bytes(&DynamicObject::new().with("items", vec![Value::I64(5)]), &list, protocol).expect("serialize succeeds");
		let decoded = from_bytes(one, &nullable, protocol).expect("single element fits a nullable");
		assert_eq!(decoded.get("items"), Some(&Value::I64(5)));

		let empty = to_bytes(&DynamicObject::new().with("items", Vec::<Value>::new()), &list, protocol).expect("serialize succeeds");
		let decoded = from_bytes(empty, &nullable, protocol).expect("empty list reads as null");
		assert!(!decoded.contains("items"));

		let two = to_bytes(&DynamicObject::new().with("items", vec![Value::I64(1), Value::I64(2)]), &list, protocol).expect("serialize succeeds");
		let err = from_bytes(two, &nullable, protocol).expect_err("two elements overflow a nullable");
		assert!(matches!(err, CodecError::NullableOverflow { count: 2 }), "{protocol}: {err}");

		let back = to_bytes(&DynamicObject::new().with("items", 9), &nullable, protocol).expect("serialize succeeds");
		let decoded = from_bytes(back, &list, protocol).expect("nullable reads as a list");
		assert_eq!(decoded.get("items"), Some(&Value::List(vec![Value::I64(9)])));
	}
}

#[test]
fn derived_payload_decodes_against_its_base() {
	let record = record_schema();
	let header = record.for_struct(1).expect("header exists");
	let obj = DynamicObject::new().with("id", 7_u32).with("kind", 2).with("name", "dropped");

	for protocol in ProtocolKind::ALL {
		let bytes = to_bytes(&obj, &record, protocol).expect("serialize succeeds");
		let plan = Deserializer::new(header.clone()).expect("plan builds");
		let decoded = plan
			.deserialize_with_source(&mut protocol.reader(bytes), &record)
			.expect("deserialize succeeds");

		assert_eq!(decoded.get("id"), Some(&Value::U64(7)));
		assert_eq!(decoded.get("kind"), Some(&Value::I64(2)));
		assert_eq!(decoded.len(), 2, "{protocol} should drop derived fields");
	}
}

#[test]
fn tagged_readers_skip_unknown_fields() {
	let leaf = StructDef::new("Leaf", vec![FieldDef::optional(0, "n", TypeDef::scalar(DataType::Int32))]);
	let wide = StructDef::new(
		"Item",
		vec![
			FieldDef::optional(0, "a", TypeDef::scalar(DataType::Int32)),
			FieldDef::optional(1, "b", TypeDef::list(TypeDef::scalar(DataType::String))),
			FieldDef::optional(2, "c", TypeDef::structure(1)),
			FieldDef::optional(300, "d", TypeDef::scalar(DataType::Int32)),
		],
	);
	let narrow = StructDef::new(
		"Item",
		vec![
			FieldDef::optional(0, "a", TypeDef::scalar(DataType::Int32)),
			FieldDef::optional(300, "d", TypeDef::scalar(DataType::Int32)),
		],
	);
	let wide = RuntimeSchema::new(SchemaDef::new(vec![wide, leaf])).expect("schema is valid");
	let narrow = RuntimeSchema::new(SchemaDef::new(vec![narrow])).expect("schema is valid");
	let obj = DynamicObject::new()
		.with("a", 1)
		.with("b", vec![Value::from("skip"), Value::from("me")])
		.with("c", DynamicObject::new().with("n", 3))
		.with("d", 4);

	for protocol in [ProtocolKind::Compact, ProtocolKind::CompactV2] {
		let bytes = to_bytes(&obj, &wide, protocol).expect("serialize succeeds");
		let decoded = from_bytes(bytes, &narrow, protocol).expect("deserialize succeeds");
		assert_eq!(decoded.get("a"), Some(&Value::I64(1)));
		assert_eq!(decoded.get("d"), Some(&Value::I64(4)));
		assert_eq!(decoded.len(), 2);
	}
}

#[test]
fn required_fields_are_enforced_on_write() {
	let record = record_schema();
	let err = to_bytes(&DynamicObject::new().with("name", "no id"), &record, ProtocolKind::Compact).expect_err("id is required");
	assert!(matches!(err, CodecError::RequiredFieldMissing { .. }));
}

#[test]
fn values_are_range_checked_on_write() {
	let record = record_schema();
	let obj = DynamicObject::new().with("id", 1_u32).with("kind", 300);
	let err = to_bytes(&obj, &record, ProtocolKind::Simple).expect_err("300 does not fit int8");
	assert!(matches!(err, CodecError::ValueOutOfRange { kind: DataType::Int8 }));
}

fn holder(ty: TypeDef) -> RuntimeSchema {
	let s = StructDef::new("Holder", vec![FieldDef::optional(0, "items", ty)]);
	RuntimeSchema::new(SchemaDef::new(vec![s])).expect("schema is valid")
}

fn record_schema() -> RuntimeSchema {
	RuntimeSchema::from_path(fixture_path("record.json")).expect("fixture schema loads")
}

fn fixture_path(name: &str) -> PathBuf {
	Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}
