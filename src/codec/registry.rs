//! Process-wide plan cache.
//!
//! Plans are keyed by schema identity plus the protocols involved. Construction happens
//! under a lock, so concurrent callers asking for the same plan get one shared instance.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

use crate::codec::{Deserializer, ProtocolKind, Result, RuntimeSchema, Serializer, Transcoder};

/// Schema identity: the shared definition by address plus the type in view.
#[derive(Debug, Clone)]
struct SchemaKey(RuntimeSchema);

impl PartialEq for SchemaKey {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(self.0.def(), other.0.def()) && self.0.type_def() == other.0.type_def()
	}
}

impl Eq for SchemaKey {}

impl Hash for SchemaKey {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::ptr::hash(Arc::as_ptr(self.0.def()), state);
		self.0.type_def().hash(state);
	}
}

#[derive(Debug, Default)]
struct Tables {
	deserializers: HashMap<SchemaKey, Arc<Deserializer>>,
	serializers: HashMap<(SchemaKey, ProtocolKind), Arc<Serializer>>,
	transcoders: HashMap<(SchemaKey, ProtocolKind, ProtocolKind), Arc<Transcoder>>,
}

/// Cache of compiled plans shared across callers.
///
/// Entries are never evicted on their own: each distinct schema definition keeps its plans,
/// and the definition itself, alive until [`PlanRegistry::clear`] or drop.
#[derive(Debug, Default)]
pub struct PlanRegistry {
	tables: Mutex<Tables>,
}

impl PlanRegistry {
	/// Empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Decode plan for `schema`.
	pub fn deserializer(&self, schema: &RuntimeSchema) -> Result<Arc<Deserializer>> {
		let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
		let key = SchemaKey(schema.clone());
		if let Some(plan) = tables.deserializers.get(&key) {
			return Ok(Arc::clone(plan));
		}
		tracing::debug!(schema = schema.name(), "registry miss: deserializer");
		let plan = Arc::new(Deserializer::new(schema.clone())?);
		tables.deserializers.insert(key, Arc::clone(&plan));
		Ok(plan)
	}

	/// Write plan for `schema` into `target`.
	pub fn serializer(&self, schema: &RuntimeSchema, target: ProtocolKind) -> Result<Arc<Serializer>> {
		let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
		let key = (SchemaKey(schema.clone()), target);
		if let Some(plan) = tables.serializers.get(&key) {
			return Ok(Arc::clone(plan));
		}
		tracing::debug!(schema = schema.name(), %target, "registry miss: serializer");
		let plan = Arc::new(Serializer::new(schema.clone(), target)?);
		tables.serializers.insert(key, Arc::clone(&plan));
		Ok(plan)
	}

	/// Transcode plan for `schema` from `source` into `target`.
	pub fn transcoder(&self, schema: &RuntimeSchema, source: ProtocolKind, target: ProtocolKind) -> Result<Arc<Transcoder>> {
		let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
		let key = (SchemaKey(schema.clone()), source, target);
		if let Some(plan) = tables.transcoders.get(&key) {
			return Ok(Arc::clone(plan));
		}
		tracing::debug!(schema = schema.name(), %source, %target, "registry miss: transcoder");
		let plan = Arc::new(Transcoder::new(schema.clone(), source, target)?);
		tables.transcoders.insert(key, Arc::clone(&plan));
		Ok(plan)
	}

	/// Number of cached plans of every kind.
	pub fn len(&self) -> usize {
		let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
		tables.deserializers.len() + tables.serializers.len() + tables.transcoders.len()
	}

	/// `true` when nothing has been cached yet.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Drop every cached plan. Plans already handed out stay valid.
	pub fn clear(&self) {
		let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
		let dropped = tables.deserializers.len() + tables.serializers.len() + tables.transcoders.len();
		*tables = Tables::default();
		tracing::debug!(dropped, "cleared plan registry");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::{DataType, FieldDef, SchemaDef, StructDef, TypeDef};

	fn schema() -> RuntimeSchema {
		let s = StructDef::new("S", vec![FieldDef::optional(0, "n", TypeDef::scalar(DataType::Int32))]);
		RuntimeSchema::new(SchemaDef::new(vec![s])).expect("schema is valid")
	}

	#[test]
	fn same_schema_shares_plans() {
		let registry = PlanRegistry::new();
		let schema = schema();
		let a = registry.deserializer(&schema).expect("plan builds");
		let b = registry.deserializer(&schema.clone()).expect("plan builds");
		assert!(Arc::ptr_eq(&a, &b));
		let c = registry.serializer(&schema, ProtocolKind::Compact).expect("plan builds");
		let d = registry.serializer(&schema, ProtocolKind::Simple).expect("plan builds");
		assert!(!Arc::ptr_eq(&c, &d));
		assert_eq!(registry.len(), 3);
	}

	#[test]
	fn equal_but_distinct_schemas_are_distinct_keys() {
		let registry = PlanRegistry::new();
		registry.deserializer(&schema()).expect("plan builds");
		registry.deserializer(&schema()).expect("plan builds");
		assert_eq!(registry.len(), 2);
	}

	#[test]
	fn clear_releases_schema_definitions() {
		let registry = PlanRegistry::new();
		let schema = schema();
		let def = Arc::downgrade(schema.def());
		registry.deserializer(&schema).expect("plan builds");
		registry.serializer(&schema, ProtocolKind::Simple).expect("plan builds");
		drop(schema);
		assert!(def.upgrade().is_some(), "registry pins the definition");

		registry.clear();
		assert!(registry.is_empty());
		assert!(def.upgrade().is_none());
	}

	#[test]
	fn concurrent_callers_get_one_transcoder() {
		let registry = Arc::new(PlanRegistry::new());
		let schema = schema();
		let plans: Vec<_> = std::thread::scope(|scope| {
			let handles: Vec<_> = (0..4)
				.map(|_| scope.spawn(|| registry.transcoder(&schema, ProtocolKind::Compact, ProtocolKind::CompactV2).expect("plan builds")))
				.collect();
			handles.into_iter().map(|h| h.join().expect("thread joins")).collect()
		});
		assert!(plans.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
		assert_eq!(registry.len(), 1);
	}
}
