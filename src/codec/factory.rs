use crate::codec::{CodecError, DynamicObject, LazyPayload, MapValue, Result, RuntimeSchema, Value};

/// Most items reserved up front from a source-reported count; storage grows past it as items
/// arrive.
pub(crate) const MAX_PREALLOC: usize = 1024;

/// What a decode plan is about to build.
#[derive(Debug, Clone, Copy)]
pub enum Construct<'a> {
	/// Empty struct about to be filled field by field.
	Object,
	/// List, set or map; `count` is the source's best-effort item count.
	Container {
		/// Expected number of items, as reported before any item is read.
		count: usize,
	},
	/// Value stored in a `bonded<T>` slot.
	Bonded(&'a LazyPayload),
}

/// Hook for substituting custom construction during decode and clone.
///
/// Returning `None` falls back to the default construction. Blob targets never reach the
/// factory.
pub trait RuntimeFactory: Send + Sync {
	/// Build the value for `schema`, or `None` to use the default.
	fn create(&self, schema: &RuntimeSchema, construct: Construct<'_>) -> Option<Value>;
}

/// Default construction: never overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFactory;

impl RuntimeFactory for DefaultFactory {
	fn create(&self, _schema: &RuntimeSchema, _construct: Construct<'_>) -> Option<Value> {
		None
	}
}

fn unsupported(schema: &RuntimeSchema, reason: &'static str) -> CodecError {
	CodecError::UnsupportedConstruction {
		type_name: schema.name().into(),
		reason,
	}
}

/// Starting object for a struct.
pub(crate) fn object(factory: &dyn RuntimeFactory, schema: &RuntimeSchema) -> Result<DynamicObject> {
	match factory.create(schema, Construct::Object) {
		None => Ok(DynamicObject::new()),
		Some(Value::Struct(obj)) => Ok(obj),
		Some(_) => Err(unsupported(schema, "object factory must return a struct")),
	}
}

/// Starting storage for a list or set.
pub(crate) fn list(factory: &dyn RuntimeFactory, schema: &RuntimeSchema, count: usize) -> Result<Vec<Value>> {
	match factory.create(schema, Construct::Container { count }) {
		None => Ok(Vec::with_capacity(count.min(MAX_PREALLOC))),
		Some(Value::List(items)) => Ok(items),
		Some(_) => Err(unsupported(schema, "container factory must return a list")),
	}
}

/// Starting storage for a map.
pub(crate) fn map(factory: &dyn RuntimeFactory, schema: &RuntimeSchema, count: usize) -> Result<MapValue> {
	match factory.create(schema, Construct::Container { count }) {
		None => Ok(MapValue::with_capacity(count.min(MAX_PREALLOC))),
		Some(Value::Map(map)) => Ok(map),
		Some(_) => Err(unsupported(schema, "map factory must return a map")),
	}
}

/// Value stored for a bonded slot.
pub(crate) fn bonded(factory: &dyn RuntimeFactory, schema: &RuntimeSchema, payload: LazyPayload) -> Result<Value> {
	match factory.create(schema, Construct::Bonded(&payload)) {
		None => Ok(Value::Bonded(payload)),
		Some(value @ (Value::Bonded(_) | Value::Struct(_))) => Ok(value),
		Some(_) => Err(unsupported(schema, "bonded factory must return a payload or struct")),
	}
}
