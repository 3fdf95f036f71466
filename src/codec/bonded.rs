//! Deferred sub-payloads for `bonded<T>` fields.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use crate::codec::{Deserializer, DynamicObject, ProtocolKind, ProtocolReader, ProtocolWriter, Result, RuntimeSchema, Serializer, Transcoder, WireReader};

/// Payload whose decoding is deferred until asked for.
///
/// Holds either a realized object or a duplicated reader positioned at undecoded bytes.
/// Clones share state; decoding never consumes the captured reader.
#[derive(Clone)]
pub struct LazyPayload(Arc<Payload>);

enum Payload {
	Empty,
	Realized {
		value: DynamicObject,
		schema: RuntimeSchema,
		serializers: PlanCache<Serializer>,
	},
	Captured(Captured),
}

/// Write plans built on first use, one slot per target protocol.
struct PlanCache<T>([OnceLock<Arc<T>>; 3]);

impl<T> PlanCache<T> {
	fn new() -> Self {
		Self(std::array::from_fn(|_| OnceLock::new()))
	}

	fn slot(&self, kind: ProtocolKind) -> &OnceLock<Arc<T>> {
		match kind {
			ProtocolKind::Compact => &self.0[0],
			ProtocolKind::CompactV2 => &self.0[1],
			ProtocolKind::Simple => &self.0[2],
		}
	}

	fn get_or_build(&self, kind: ProtocolKind, build: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
		let slot = self.slot(kind);
		if let Some(plan) = slot.get() {
			return Ok(Arc::clone(plan));
		}
		let built = Arc::new(build()?);
		Ok(Arc::clone(slot.get_or_init(|| built)))
	}
}

/// Undecoded bytes behind a duplicated reader.
pub(crate) struct Captured {
	reader: WireReader,
	len: usize,
	schema: RuntimeSchema,
	plan: OnceLock<Arc<Deserializer>>,
	transcoders: PlanCache<Transcoder>,
}

/// Borrowed view of a payload's state.
pub(crate) enum PayloadView<'a> {
	Empty,
	Realized(&'a DynamicObject, &'a RuntimeSchema),
	Captured(&'a Captured),
}

impl Captured {
	pub(crate) fn kind(&self) -> ProtocolKind {
		self.reader.kind()
	}

	pub(crate) fn schema(&self) -> &RuntimeSchema {
		&self.schema
	}

	/// Encoded bytes, including any frame the protocol puts around the payload.
	pub(crate) fn raw(&self) -> Result<Bytes> {
		self.reader.peek_bytes(self.len)
	}

	/// Fresh reader positioned at the first struct byte.
	pub(crate) fn open(&self) -> Result<WireReader> {
		let mut reader = self.reader.clone();
		if !reader.kind().is_tagged() {
			reader.read_bonded_begin()?;
		}
		Ok(reader)
	}

	fn plan(&self) -> Result<Arc<Deserializer>> {
		if let Some(plan) = self.plan.get() {
			return Ok(Arc::clone(plan));
		}
		let built = Arc::new(Deserializer::new(self.schema.clone())?);
		Ok(Arc::clone(self.plan.get_or_init(|| built)))
	}

	/// Decode the captured bytes into a fresh object.
	pub(crate) fn decode(&self) -> Result<DynamicObject> {
		let plan = self.plan()?;
		let mut reader = self.open()?;
		plan.deserialize(&mut reader)
	}
}

static EMPTY: OnceLock<LazyPayload> = OnceLock::new();

impl LazyPayload {
	/// Shared empty payload, used wherever a bonded default is needed.
	pub fn empty() -> Self {
		EMPTY.get_or_init(|| Self(Arc::new(Payload::Empty))).clone()
	}

	/// Wrap an already built object described by `schema`.
	pub fn from_value(value: DynamicObject, schema: RuntimeSchema) -> Self {
		let schema = schema.with_type(schema.type_def().unbonded());
		Self(Arc::new(Payload::Realized {
			value,
			schema,
			serializers: PlanCache::new(),
		}))
	}

	/// Alias of [`LazyPayload::from_value`].
	pub fn from_object(value: DynamicObject, schema: RuntimeSchema) -> Self {
		Self::from_value(value, schema)
	}

	/// Capture `len` bytes starting at `reader`'s position.
	pub(crate) fn captured(reader: WireReader, len: usize, schema: RuntimeSchema) -> Self {
		Self(Arc::new(Payload::Captured(Captured {
			reader,
			len,
			schema,
			plan: OnceLock::new(),
			transcoders: PlanCache::new(),
		})))
	}

	pub(crate) fn view(&self) -> PayloadView<'_> {
		match self.0.as_ref() {
			Payload::Empty => PayloadView::Empty,
			Payload::Realized { value, schema, .. } => PayloadView::Realized(value, schema),
			Payload::Captured(captured) => PayloadView::Captured(captured),
		}
	}

	/// `true` for the empty payload.
	pub fn is_empty(&self) -> bool {
		matches!(self.0.as_ref(), Payload::Empty)
	}

	/// Schema the payload is described by; `None` for the empty payload.
	pub fn schema(&self) -> Option<&RuntimeSchema> {
		match self.0.as_ref() {
			Payload::Empty => None,
			Payload::Realized { schema, .. } => Some(schema),
			Payload::Captured(captured) => Some(&captured.schema),
		}
	}

	/// Protocol of captured bytes; `None` for realized and empty payloads.
	pub fn protocol(&self) -> Option<ProtocolKind> {
		match self.0.as_ref() {
			Payload::Captured(captured) => Some(captured.kind()),
			_ => None,
		}
	}

	/// Decode into a fresh object.
	///
	/// Repeatable: captured payloads decode from a new duplicate of the stored reader.
	pub fn decode(&self) -> Result<DynamicObject> {
		match self.0.as_ref() {
			Payload::Empty => Ok(DynamicObject::new()),
			Payload::Realized { value, .. } => Ok(value.clone()),
			Payload::Captured(captured) => captured.decode(),
		}
	}

	/// Write the payload as a top-level struct.
	///
	/// Captured bytes are transcoded straight to `writer` without building an object. Plans
	/// are compiled on first use per target protocol and kept with the payload.
	pub fn serialize<W: ProtocolWriter>(&self, writer: &mut W) -> Result<()> {
		match self.0.as_ref() {
			Payload::Empty => {
				if let Some(first) = writer.first_pass() {
					first.write_struct_begin()?;
					first.write_struct_end()?;
				}
				writer.write_struct_begin()?;
				writer.write_struct_end()
			}
			Payload::Realized { value, schema, serializers } => {
				let target = writer.kind();
				let plan = serializers.get_or_build(target, || Serializer::new(schema.clone(), target))?;
				plan.serialize(writer, value)
			}
			Payload::Captured(captured) => {
				let target = writer.kind();
				let plan = captured
					.transcoders
					.get_or_build(target, || Transcoder::new(captured.schema.clone(), captured.kind(), target))?;
				let mut reader = captured.open()?;
				plan.transcode(&mut reader, writer)
			}
		}
	}
}

impl Default for LazyPayload {
	fn default() -> Self {
		Self::empty()
	}
}

impl PartialEq for LazyPayload {
	fn eq(&self, other: &Self) -> bool {
		if Arc::ptr_eq(&self.0, &other.0) {
			return true;
		}
		match (self.0.as_ref(), other.0.as_ref()) {
			(Payload::Empty, Payload::Empty) => true,
			(Payload::Realized { value: a, schema: sa, .. }, Payload::Realized { value: b, schema: sb, .. }) => a == b && sa == sb,
			(Payload::Captured(a), Payload::Captured(b)) => {
				a.kind() == b.kind() && a.schema == b.schema && matches!((a.raw(), b.raw()), (Ok(x), Ok(y)) if x == y)
			}
			_ => false,
		}
	}
}

impl fmt::Debug for LazyPayload {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0.as_ref() {
			Payload::Empty => f.write_str("LazyPayload::Empty"),
			Payload::Realized { value, schema, .. } => f.debug_struct("LazyPayload::Realized").field("schema", &schema.name()).field("value", value).finish(),
			Payload::Captured(captured) => f
				.debug_struct("LazyPayload::Captured")
				.field("schema", &captured.schema.name())
				.field("protocol", &captured.kind())
				.field("offset", &captured.reader.position())
				.field("len", &captured.len)
				.finish(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::{CompactWriter, DataType, FieldDef, SchemaDef, StructDef, TypeDef, Value, from_bytes, to_bytes};

	fn schema() -> RuntimeSchema {
		let inner = StructDef::new("Inner", vec![FieldDef::optional(0, "n", TypeDef::scalar(DataType::Int32))]);
		let outer = StructDef::new("Outer", vec![FieldDef::optional(0, "payload", TypeDef::bonded(1))]);
		RuntimeSchema::new(SchemaDef::new(vec![outer, inner])).expect("schema is valid")
	}

	#[test]
	fn empty_is_a_singleton() {
		let a = LazyPayload::empty();
		let b = LazyPayload::default();
		assert!(Arc::ptr_eq(&a.0, &b.0));
		assert!(a.is_empty());
		assert!(a.schema().is_none());
		assert_eq!(a.decode().expect("empty decode succeeds"), DynamicObject::new());
	}

	#[test]
	fn captured_payload_decodes_repeatedly() {
		let schema = schema();
		let inner = schema.for_struct(1).expect("inner exists");
		for protocol in ProtocolKind::ALL {
			let obj = DynamicObject::new().with("payload", LazyPayload::from_value(DynamicObject::new().with("n", 7), inner.clone()));
			let bytes = to_bytes(&obj, &schema, protocol).expect("serialize succeeds");
			let decoded = from_bytes(bytes, &schema, protocol).expect("deserialize succeeds");
			let Some(Value::Bonded(payload)) = decoded.get("payload") else {
				panic!("payload field is bonded");
			};
			assert_eq!(payload.protocol(), Some(protocol));
			let first = payload.decode().expect("first decode succeeds");
			let second = payload.decode().expect("second decode succeeds");
			assert_eq!(first, second);
			assert_eq!(first.get("n"), Some(&Value::I64(7)));
		}
	}

	#[test]
	fn realized_payload_serializes_as_top_level_struct() {
		let schema = schema();
		let inner = schema.for_struct(1).expect("inner exists");
		let payload = LazyPayload::from_value(DynamicObject::new().with("n", 3), inner.clone());
		let mut writer = CompactWriter::new(ProtocolKind::Compact);
		payload.serialize(&mut writer).expect("serialize succeeds");
		let decoded = from_bytes(writer.into_bytes(), &inner, ProtocolKind::Compact).expect("deserialize succeeds");
		assert_eq!(decoded.get("n"), Some(&Value::I64(3)));
	}

	#[test]
	fn serialize_reuses_plans_per_target() {
		let schema = schema();
		let inner = schema.for_struct(1).expect("inner exists");
		let payload = LazyPayload::from_value(DynamicObject::new().with("n", 3), inner);
		for _ in 0..2 {
			let mut writer = CompactWriter::new(ProtocolKind::Compact);
			payload.serialize(&mut writer).expect("serialize succeeds");
		}
		let Payload::Realized { serializers, .. } = payload.0.as_ref() else {
			panic!("payload is realized");
		};
		let first = serializers.slot(ProtocolKind::Compact).get().map(Arc::clone).expect("plan is cached");
		let mut writer = CompactWriter::new(ProtocolKind::Compact);
		payload.serialize(&mut writer).expect("serialize succeeds");
		let second = serializers.slot(ProtocolKind::Compact).get().map(Arc::clone).expect("plan is cached");
		assert!(Arc::ptr_eq(&first, &second));
		assert!(serializers.slot(ProtocolKind::Simple).get().is_none());
	}

	#[test]
	fn captured_payload_keeps_its_transcoder() {
		let schema = schema();
		let inner = schema.for_struct(1).expect("inner exists");
		let obj = DynamicObject::new().with("payload", LazyPayload::from_value(DynamicObject::new().with("n", 4), inner.clone()));
		let bytes = to_bytes(&obj, &schema, ProtocolKind::Compact).expect("serialize succeeds");
		let decoded = from_bytes(bytes, &schema, ProtocolKind::Compact).expect("deserialize succeeds");
		let Some(Value::Bonded(payload)) = decoded.get("payload") else {
			panic!("payload field is bonded");
		};
		let mut outputs = Vec::new();
		for _ in 0..2 {
			let mut writer = crate::codec::SimpleWriter::new();
			payload.serialize(&mut writer).expect("serialize succeeds");
			outputs.push(writer.into_bytes());
		}
		assert_eq!(outputs[0], outputs[1]);
		let Payload::Captured(captured) = payload.0.as_ref() else {
			panic!("payload is captured");
		};
		assert!(captured.transcoders.slot(ProtocolKind::Simple).get().is_some());
		let back = from_bytes(outputs.remove(0), &inner, ProtocolKind::Simple).expect("deserialize succeeds");
		assert_eq!(back.get("n"), Some(&Value::I64(4)));
	}
}
