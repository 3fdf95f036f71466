//! Decode plans: wire bytes or objects into [`DynamicObject`] graphs.
//!
//! A plan holds one compiled step per distinct struct type. Field types that refer back to
//! a struct already being compiled resolve to its reserved slot, so recursive schemas
//! compile in one pass.

use std::collections::HashMap;
use std::sync::Arc;

use crate::codec::factory::{self, DefaultFactory, MAX_PREALLOC, RuntimeFactory};
use crate::codec::parser::{Items, Parser, Transform, WireParser, blob_byte, blob_element, drive};
use crate::codec::{CodecError, DataType, DynamicObject, Modifier, ProtocolReader, Result, RuntimeSchema, SchemaRef, TypeDef, Value};

/// Guards applied while decoding untrusted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
	/// Maximum struct nesting depth.
	pub max_depth: usize,
	/// Maximum item count of a list, set, map or byte container.
	pub max_container_len: usize,
}

impl Default for DecodeLimits {
	fn default() -> Self {
		Self {
			max_depth: 64,
			max_container_len: 1 << 24,
		}
	}
}

#[derive(Debug)]
enum ReadOp {
	Scalar(DataType),
	Struct(usize),
	Bonded(RuntimeSchema),
	Blob,
	List { element: Box<ReadOp>, schema: RuntimeSchema },
	Nullable(Box<ReadOp>),
	Map { key: DataType, value: Box<ReadOp>, schema: RuntimeSchema },
}

#[derive(Debug)]
struct FieldStep {
	name: Box<str>,
	required: bool,
	default: Option<Value>,
	op: ReadOp,
}

/// One level of a struct hierarchy.
#[derive(Debug)]
struct LevelStep {
	struct_name: Box<str>,
	fields: Vec<FieldStep>,
	by_id: HashMap<u16, usize>,
	base: Option<Box<LevelStep>>,
	depth: usize,
}

#[derive(Debug)]
struct StructStep {
	schema: RuntimeSchema,
	level: LevelStep,
}

struct Compiler<'s> {
	schema: &'s RuntimeSchema,
	steps: Vec<Option<StructStep>>,
	memo: HashMap<TypeDef, usize>,
}

impl<'s> Compiler<'s> {
	fn compile_struct(&mut self, view: SchemaRef<'s>) -> Result<usize> {
		let key = view.type_def().unbonded();
		if let Some(&index) = self.memo.get(&key) {
			return Ok(index);
		}
		let index = self.steps.len();
		self.steps.push(None);
		self.memo.insert(key.clone(), index);
		tracing::trace!(step = index, name = view.name(), "reserved decode step");
		let level = self.compile_level(view)?;
		self.steps[index] = Some(StructStep {
			schema: self.schema.with_type(key),
			level,
		});
		Ok(index)
	}

	fn compile_level(&mut self, view: SchemaRef<'s>) -> Result<LevelStep> {
		let def = view.struct_def().ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("{} is not a struct", view.name()),
		})?;
		let base = match view.base() {
			Some(base) => Some(Box::new(self.compile_level(base)?)),
			None => None,
		};
		let mut fields = Vec::with_capacity(def.fields.len());
		let mut by_id = HashMap::with_capacity(def.fields.len());
		for field in &def.fields {
			by_id.insert(field.id, fields.len());
			fields.push(FieldStep {
				name: field.name().into(),
				required: field.metadata.modifier == Modifier::Required,
				default: field.default_value()?,
				op: self.compile_op(view.field(field))?,
			});
		}
		Ok(LevelStep {
			struct_name: def.name().into(),
			fields,
			by_id,
			base,
			depth: view.hierarchy_depth(),
		})
	}

	fn compile_op(&mut self, view: SchemaRef<'s>) -> Result<ReadOp> {
		let ty = view.type_def();
		if ty.bonded_type {
			return Ok(ReadOp::Bonded(self.schema.with_type(ty.clone())));
		}
		let element = || {
			view.element().ok_or_else(|| CodecError::InvalidSchema {
				reason: format!("{} has no element type", ty.id),
			})
		};
		Ok(match ty.id {
			DataType::Struct => ReadOp::Struct(self.compile_struct(view)?),
			DataType::List | DataType::Set if ty.is_nullable() => ReadOp::Nullable(Box::new(self.compile_op(element()?)?)),
			DataType::List | DataType::Set if ty.is_blob() => ReadOp::Blob,
			DataType::List | DataType::Set => ReadOp::List {
				element: Box::new(self.compile_op(element()?)?),
				schema: self.schema.with_type(ty.clone()),
			},
			DataType::Map => {
				let key = view.key().ok_or_else(|| CodecError::InvalidSchema {
					reason: "map has no key type".to_owned(),
				})?;
				ReadOp::Map {
					key: key.type_def().id,
					value: Box::new(self.compile_op(element()?)?),
					schema: self.schema.with_type(ty.clone()),
				}
			}
			DataType::Unavailable => return Err(CodecError::UnknownDataType { id: ty.id.id() }),
			scalar => ReadOp::Scalar(scalar),
		})
	}

	fn finish(self) -> Result<Vec<StructStep>> {
		self.steps
			.into_iter()
			.enumerate()
			.map(|(index, step)| {
				step.ok_or_else(|| CodecError::InvalidSchema {
					reason: format!("decode step {index} was never filled"),
				})
			})
			.collect()
	}
}

/// Compiled decode plan for one struct type.
///
/// Immutable once built and safe to share across threads.
pub struct Deserializer {
	schema: RuntimeSchema,
	steps: Vec<StructStep>,
	root: usize,
	factory: Arc<dyn RuntimeFactory>,
	limits: DecodeLimits,
}

impl std::fmt::Debug for Deserializer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Deserializer")
			.field("schema", &self.schema.name())
			.field("steps", &self.steps.len())
			.field("limits", &self.limits)
			.finish()
	}
}

impl Deserializer {
	/// Compile a plan for the struct in view of `schema`.
	pub fn new(schema: RuntimeSchema) -> Result<Self> {
		Self::with_factory(schema, Arc::new(DefaultFactory))
	}

	/// Compile a plan that builds objects and containers through `factory`.
	pub fn with_factory(schema: RuntimeSchema, factory: Arc<dyn RuntimeFactory>) -> Result<Self> {
		let schema = schema.with_type(schema.type_def().unbonded());
		if !schema.is_struct() {
			return Err(CodecError::InvalidSchema {
				reason: format!("decode root must be a struct, found {}", schema.data_type()),
			});
		}
		let mut compiler = Compiler {
			schema: &schema,
			steps: Vec::new(),
			memo: HashMap::new(),
		};
		let root = compiler.compile_struct(schema.view())?;
		let steps = compiler.finish()?;
		tracing::debug!(schema = schema.name(), steps = steps.len(), "built decode plan");
		Ok(Self {
			schema,
			steps,
			root,
			factory,
			limits: DecodeLimits::default(),
		})
	}

	/// Replace the decode limits.
	pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
		self.limits = limits;
		self
	}

	/// Target schema.
	pub fn schema(&self) -> &RuntimeSchema {
		&self.schema
	}

	/// Number of compiled struct steps.
	pub fn step_count(&self) -> usize {
		self.steps.len()
	}

	/// Decode one struct from `reader`.
	///
	/// Untagged readers are assumed to hold bytes written with the target schema.
	pub fn deserialize<R: ProtocolReader>(&self, reader: &mut R) -> Result<DynamicObject> {
		let mut src = WireParser::new(reader, Some(self.schema.view()))?;
		self.decode_from(&mut src)
	}

	/// Decode one struct from `reader`, whose bytes were written with `source`.
	///
	/// `source` may be more derived than the target; extra levels are dropped.
	pub fn deserialize_with_source<R: ProtocolReader>(&self, reader: &mut R, source: &RuntimeSchema) -> Result<DynamicObject> {
		let mut src = WireParser::new(reader, Some(source.view()))?;
		self.decode_from(&mut src)
	}

	pub(crate) fn decode_from<P: Parser>(&self, src: &mut P) -> Result<DynamicObject> {
		self.decode_struct(self.root, src, 0)
	}

	fn decode_struct<P: Parser>(&self, index: usize, src: &mut P, depth: usize) -> Result<DynamicObject> {
		if depth > self.limits.max_depth {
			return Err(CodecError::LimitExceeded {
				what: "depth",
				value: depth,
				max: self.limits.max_depth,
			});
		}
		let step = self.steps.get(index).ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("decode step {index} out of range"),
		})?;
		let mut obj = factory::object(self.factory.as_ref(), &step.schema)?;
		drive(
			src,
			&mut DecodeTransform {
				plan: self,
				level: &step.level,
				obj: &mut obj,
				seen: vec![false; step.level.fields.len()],
				depth,
			},
		)?;
		Ok(obj)
	}

	fn check_len(&self, count: Option<usize>) -> Result<usize> {
		let count = count.unwrap_or(0);
		if count > self.limits.max_container_len {
			return Err(CodecError::LimitExceeded {
				what: "container length",
				value: count,
				max: self.limits.max_container_len,
			});
		}
		Ok(count)
	}

	fn read<P: Parser>(&self, op: &ReadOp, src: &mut P, depth: usize) -> Result<Value> {
		let factory = self.factory.as_ref();
		match op {
			ReadOp::Scalar(ty) => src.scalar(*ty),
			ReadOp::Struct(index) => Ok(Value::Struct(self.decode_struct(*index, src, depth + 1)?)),
			ReadOp::Bonded(schema) => {
				let payload = src.bonded(schema.view())?;
				factory::bonded(factory, schema, payload)
			}
			ReadOp::Blob => self.read_blob(src),
			ReadOp::List { element, schema } => {
				let mut items = src.container()?;
				let count = self.check_len(items.count())?;
				let mut out = factory::list(factory, schema, count)?;
				loop {
					let Some(mut item) = items.next_item()? else {
						break;
					};
					let value = self.read(element, &mut item, depth)?;
					drop(item);
					out.push(value);
					if items.count().is_none() {
						self.check_len(Some(out.len()))?;
					}
				}
				Ok(Value::List(out))
			}
			ReadOp::Nullable(element) => {
				let mut items = src.container()?;
				if let Some(count) = items.count().filter(|&c| c > 1) {
					return Err(CodecError::NullableOverflow { count });
				}
				let value = match items.next_item()? {
					Some(mut item) => self.read(element, &mut item, depth)?,
					None => return Ok(Value::Null),
				};
				if items.next_item()?.is_some() {
					return Err(CodecError::NullableOverflow { count: 2 });
				}
				Ok(value)
			}
			ReadOp::Map { key, value, schema } => {
				let mut items = src.map()?;
				let count = self.check_len(items.count())?;
				let mut out = factory::map(factory, schema, count)?;
				loop {
					let k = match items.next_item()? {
						Some(mut item) => item.scalar(*key)?,
						None => break,
					};
					let v = match items.next_item()? {
						Some(mut item) => self.read(value, &mut item, depth)?,
						None => {
							return Err(CodecError::ValueShape {
								expected: DataType::Map,
								got: "key without value",
							});
						}
					};
					out.insert(k, v)?;
				}
				Ok(Value::Map(out))
			}
		}
	}

	fn read_blob<P: Parser>(&self, src: &mut P) -> Result<Value> {
		let mut items = src.container()?;
		let count = self.check_len(items.count())?;
		let element = items.element_type();
		blob_element(element)?;
		if let Some(bytes) = items.blob()? {
			return Ok(Value::Bytes(bytes));
		}
		let mut buf = Vec::with_capacity(count.min(MAX_PREALLOC));
		loop {
			let Some(mut item) = items.next_item()? else {
				break;
			};
			let byte = blob_byte(&item.scalar(element)?, element)?;
			drop(item);
			buf.push(byte);
			if items.count().is_none() {
				self.check_len(Some(buf.len()))?;
			}
		}
		Ok(Value::Bytes(buf))
	}
}

struct DecodeTransform<'p> {
	plan: &'p Deserializer,
	level: &'p LevelStep,
	obj: &'p mut DynamicObject,
	seen: Vec<bool>,
	depth: usize,
}

impl Transform for DecodeTransform<'_> {
	fn has_base(&self) -> bool {
		self.level.base.is_some()
	}

	fn depth(&self) -> usize {
		self.level.depth
	}

	fn slot(&self, id: u16) -> Option<usize> {
		self.level.by_id.get(&id).copied()
	}

	fn begin(&mut self) -> Result<()> {
		Ok(())
	}

	fn field<P: Parser>(&mut self, slot: usize, src: &mut P) -> Result<()> {
		let field = &self.level.fields[slot];
		let value = self.plan.read(&field.op, src, self.depth)?;
		self.seen[slot] = true;
		if !value.is_null() {
			self.obj.set(&field.name, value);
		}
		Ok(())
	}

	fn omitted(&mut self, _slot: usize) -> Result<()> {
		Ok(())
	}

	fn base<P: Parser>(&mut self, src: &mut P) -> Result<()> {
		let Some(base) = self.level.base.as_deref() else {
			return src.skip();
		};
		drive(
			src,
			&mut DecodeTransform {
				plan: self.plan,
				level: base,
				obj: &mut *self.obj,
				seen: vec![false; base.fields.len()],
				depth: self.depth,
			},
		)
	}

	fn end(&mut self) -> Result<()> {
		for (field, seen) in self.level.fields.iter().zip(&self.seen) {
			if *seen {
				continue;
			}
			if field.required {
				return Err(CodecError::RequiredFieldMissing {
					struct_name: self.level.struct_name.clone(),
					field: field.name.clone(),
				});
			}
			if let Some(default) = &field.default {
				if !self.obj.contains(&field.name) {
					self.obj.set(&field.name, default.clone());
				}
			}
		}
		Ok(())
	}
}
