use std::sync::Arc;

use crate::codec::factory::RuntimeFactory;
use crate::codec::parser::ObjectParser;
use crate::codec::{Deserializer, DynamicObject, Result, RuntimeSchema};

/// Copies dynamic objects into the shape of a target schema.
///
/// Runs a decode plan over an object source. Bonded values are carried over by reference,
/// so captured payloads are never re-decoded.
#[derive(Debug)]
pub struct Cloner {
	plan: Deserializer,
}

impl Cloner {
	/// Cloner producing objects for the struct in view of `schema`.
	pub fn new(schema: RuntimeSchema) -> Result<Self> {
		Ok(Self { plan: Deserializer::new(schema)? })
	}

	/// Cloner that builds objects and containers through `factory`.
	pub fn with_factory(schema: RuntimeSchema, factory: Arc<dyn RuntimeFactory>) -> Result<Self> {
		Ok(Self {
			plan: Deserializer::with_factory(schema, factory)?,
		})
	}

	/// Target schema.
	pub fn schema(&self) -> &RuntimeSchema {
		self.plan.schema()
	}

	/// Clone `obj`, which is described by the target schema.
	pub fn clone_object(&self, obj: &DynamicObject) -> Result<DynamicObject> {
		let schema = self.plan.schema();
		self.plan.decode_from(&mut ObjectParser::new(obj, schema.view()))
	}

	/// Clone `obj`, which is described by `source`.
	///
	/// `source` may be more derived than the target; its extra levels are dropped.
	pub fn clone_from(&self, obj: &DynamicObject, source: &RuntimeSchema) -> Result<DynamicObject> {
		let source = source.with_type(source.type_def().unbonded());
		self.plan.decode_from(&mut ObjectParser::new(obj, source.view()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::factory::Construct;
	use crate::codec::{DataType, FieldDef, LazyPayload, SchemaDef, StructDef, TypeDef, Value};

	fn schema() -> RuntimeSchema {
		let base = StructDef::new("Base", vec![FieldDef::optional(0, "id", TypeDef::scalar(DataType::UInt32))]);
		let derived = StructDef::new(
			"Derived",
			vec![
				FieldDef::optional(0, "name", TypeDef::scalar(DataType::String)),
				FieldDef::optional(1, "payload", TypeDef::bonded(1)),
			],
		)
		.with_base(1);
		RuntimeSchema::new(SchemaDef::new(vec![derived, base])).expect("schema is valid")
	}

	#[test]
	fn bonded_values_are_shared() {
		let schema = schema();
		let base = schema.for_struct(1).expect("base exists");
		let payload = LazyPayload::from_value(DynamicObject::new().with("id", 1_u32), base);
		let obj = DynamicObject::new().with("id", 9_u32).with("name", "n").with("payload", payload.clone());
		let cloned = Cloner::new(schema).expect("plan builds").clone_object(&obj).expect("clone succeeds");
		assert_eq!(cloned.get("id"), Some(&Value::U64(9)));
		assert_eq!(cloned.get("payload"), Some(&Value::Bonded(payload)));
	}

	#[test]
	fn derived_object_clones_into_base_view() {
		let schema = schema();
		let base = schema.for_struct(1).expect("base exists");
		let obj = DynamicObject::new().with("id", 4_u32).with("name", "dropped");
		let cloned = Cloner::new(base).expect("plan builds").clone_from(&obj, &schema).expect("clone succeeds");
		assert_eq!(cloned.len(), 1);
		assert_eq!(cloned.get("id"), Some(&Value::U64(4)));
	}

	struct Stamp;

	impl RuntimeFactory for Stamp {
		fn create(&self, schema: &RuntimeSchema, construct: Construct<'_>) -> Option<Value> {
			matches!(construct, Construct::Object).then(|| Value::Struct(DynamicObject::new().with("type", schema.name())))
		}
	}

	#[test]
	fn factory_builds_cloned_objects() {
		let cloner = Cloner::with_factory(schema(), Arc::new(Stamp)).expect("plan builds");
		let cloned = cloner.clone_object(&DynamicObject::new().with("name", "x")).expect("clone succeeds");
		assert_eq!(cloned.get("type").and_then(Value::as_str), Some("Derived"));
		assert_eq!(cloned.get("name").and_then(Value::as_str), Some("x"));
	}
}
