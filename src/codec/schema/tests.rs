use super::*;

fn leaf() -> StructDef {
	StructDef::new("Leaf", vec![FieldDef::optional(0, "n", TypeDef::scalar(DataType::Int32))])
}

fn invalid(def: SchemaDef) -> String {
	match RuntimeSchema::new(def) {
		Err(CodecError::InvalidSchema { reason }) => reason,
		other => panic!("expected an invalid schema, got {other:?}"),
	}
}

#[test]
fn loads_the_json_form() {
	let json = r#"{
		"structs": [
			{
				"metadata": { "name": "Derived" },
				"base_def": { "id": 10, "struct_def": 1 },
				"fields": [
					{ "metadata": { "name": "tags", "modifier": 0 }, "id": 0,
					  "type": { "id": 11, "element": { "id": 9 } } },
					{ "metadata": { "name": "count", "modifier": 1, "default_value": { "uint_value": 3 } }, "id": 1,
					  "type": { "id": 5 } }
				]
			},
			{
				"metadata": { "name": "Base" },
				"fields": [ { "metadata": { "name": "id" }, "id": 0, "type": { "id": 16 } } ]
			}
		],
		"root": { "id": 10, "struct_def": 0 }
	}"#;
	let schema = RuntimeSchema::from_json(json).expect("schema loads");
	assert_eq!(schema.name(), "Derived");
	assert_eq!(schema.hierarchy_depth(), 1);
	assert_eq!(schema.base_schema().expect("base exists").name(), "Base");

	let def = schema.struct_def().expect("root is a struct");
	assert_eq!(def.fields[0].ty, TypeDef::list(TypeDef::scalar(DataType::String)));
	assert_eq!(def.fields[1].metadata.modifier, Modifier::Required);
	assert_eq!(def.fields[1].default_value().expect("default resolves"), Some(Value::U64(3)));
}

#[test]
fn json_rejects_unknown_type_ids() {
	let json = r#"{ "structs": [ { "fields": [ { "id": 0, "type": { "id": 99 } } ] } ] }"#;
	assert!(matches!(RuntimeSchema::from_json(json), Err(CodecError::Json(_))));
}

#[test]
fn validation_catches_broken_tables() {
	let mut def = SchemaDef::new(vec![leaf()]);
	def.root = TypeDef::scalar(DataType::Int32);
	assert!(invalid(def).contains("root type"));

	let holder = StructDef::new("Holder", vec![FieldDef::optional(0, "x", TypeDef::structure(4))]);
	assert!(invalid(SchemaDef::new(vec![holder])).contains("out of range"));

	let dup = StructDef::new(
		"Dup",
		vec![FieldDef::optional(1, "a", TypeDef::scalar(DataType::Bool)), FieldDef::optional(1, "b", TypeDef::scalar(DataType::Bool))],
	);
	assert!(invalid(SchemaDef::new(vec![dup])).contains("duplicate field id"));

	let a = StructDef::new("A", Vec::new()).with_base(1);
	let b = StructDef::new("B", Vec::new()).with_base(0);
	assert!(invalid(SchemaDef::new(vec![a, b])).contains("cyclic"));

	let keyed = StructDef::new("Keyed", vec![FieldDef::optional(0, "m", TypeDef::map(TypeDef::structure(0), TypeDef::scalar(DataType::Bool)))]);
	assert!(invalid(SchemaDef::new(vec![keyed])).contains("map key"));

	let mut bare = TypeDef::list(TypeDef::scalar(DataType::Int8));
	bare.element = None;
	let bare = StructDef::new("Bare", vec![FieldDef::optional(0, "xs", bare)]);
	assert!(invalid(SchemaDef::new(vec![bare])).contains("element type"));

	let mut wrapped = TypeDef::scalar(DataType::String);
	wrapped.bonded_type = true;
	let wrapped = StructDef::new("Wrapped", vec![FieldDef::optional(0, "s", wrapped)]);
	assert!(invalid(SchemaDef::new(vec![wrapped])).contains("bonded"));
}

#[test]
fn self_reference_through_fields_is_allowed() {
	let node = StructDef::new(
		"Node",
		vec![
			FieldDef::optional(0, "next", TypeDef::nullable(TypeDef::structure(0))),
			FieldDef::optional(1, "lazy", TypeDef::bonded(0)),
		],
	);
	let schema = RuntimeSchema::new(SchemaDef::new(vec![node])).expect("field cycles are legal");
	assert_eq!(schema.hierarchy_depth(), 0);
}

#[test]
fn defaults_resolve_per_kind() {
	let with = |ty: DataType, default: Variant| FieldDef::optional(0, "f", TypeDef::scalar(ty)).with_default(default).default_value();

	assert_eq!(with(DataType::Bool, Variant { uint_value: 1, ..Variant::default() }).expect("bool"), Some(Value::Bool(true)));
	assert_eq!(with(DataType::Int16, Variant { int_value: -5, ..Variant::default() }).expect("int16"), Some(Value::I64(-5)));
	assert_eq!(with(DataType::Float, Variant { double_value: 0.5, ..Variant::default() }).expect("float"), Some(Value::F32(0.5)));
	assert_eq!(
		with(DataType::WString, Variant { wstring_value: "w".into(), ..Variant::default() }).expect("wstring"),
		Some(Value::String("w".into()))
	);

	let nothing = FieldDef::optional(0, "f", TypeDef::scalar(DataType::UInt32)).with_nothing();
	assert_eq!(nothing.default_value().expect("nothing"), None);

	let list = FieldDef::optional(0, "xs", TypeDef::list(TypeDef::scalar(DataType::UInt32)));
	assert_eq!(list.default_value().expect("containers"), None);
}

#[test]
fn out_of_range_defaults_are_malformed() {
	let wide = FieldDef::optional(0, "small", TypeDef::scalar(DataType::UInt8)).with_default(Variant {
		uint_value: 300,
		..Variant::default()
	});
	assert!(matches!(wide.default_value(), Err(CodecError::MalformedDefault { kind: DataType::UInt8, .. })));

	let negative = FieldDef::optional(0, "tiny", TypeDef::scalar(DataType::Int8)).with_default(Variant {
		int_value: -200,
		..Variant::default()
	});
	assert!(matches!(negative.default_value(), Err(CodecError::MalformedDefault { .. })));

	let float = FieldDef::optional(0, "f", TypeDef::scalar(DataType::Float)).with_default(Variant {
		double_value: 1e300,
		..Variant::default()
	});
	assert!(matches!(float.default_value(), Err(CodecError::MalformedDefault { .. })));
}

#[test]
fn promotion_widens_within_signedness() {
	assert!(DataType::UInt8.promotes_to(DataType::UInt64));
	assert!(DataType::Int16.promotes_to(DataType::Int32));
	assert!(DataType::Float.promotes_to(DataType::Double));
	assert!(!DataType::UInt32.promotes_to(DataType::UInt16));
	assert!(!DataType::UInt8.promotes_to(DataType::Int16));
	assert!(!DataType::Double.promotes_to(DataType::Float));
}

#[test]
fn type_ids_round_trip() {
	for id in 0..=u8::MAX {
		if let Ok(ty) = DataType::from_id(id) {
			assert_eq!(ty.id(), id);
		}
	}
	assert!(matches!(DataType::from_id(1), Err(CodecError::UnknownDataType { id: 1 })));
}

#[test]
fn views_navigate_the_table() {
	let holder = StructDef::new(
		"Holder",
		vec![
			FieldDef::optional(0, "leaves", TypeDef::map(TypeDef::scalar(DataType::String), TypeDef::structure(1))),
			FieldDef::optional(1, "raw", TypeDef::blob()),
		],
	);
	let schema = RuntimeSchema::new(SchemaDef::new(vec![holder, leaf()])).expect("schema is valid");
	let def = schema.struct_def().expect("struct");
	let leaves = schema.field_schema(&def.fields[0]);
	assert!(leaves.is_map());
	assert_eq!(leaves.key_schema().expect("key").data_type(), DataType::String);
	assert_eq!(leaves.element_schema().expect("value").name(), "Leaf");
	assert!(schema.field_schema(&def.fields[1]).is_blob());
	assert_eq!(schema.for_struct_named("Leaf").expect("leaf by name").type_def(), &TypeDef::structure(1));
	assert!(schema.for_struct(9).is_err());
}
