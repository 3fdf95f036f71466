//! Write plans: drive a source into a protocol writer.
//!
//! One plan serves both serialization (object source) and transcoding (wire source). Steps
//! are keyed by source kind and struct type; recursive types get one shared indirect step
//! and everything else is inlined at its call site.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::codec::bonded::PayloadView;
use crate::codec::factory::MAX_PREALLOC;
use crate::codec::parser::{Items, ObjectParser, Parser, SourceKind, Transform, WireParser, blob_byte, blob_element, drive, fallback};
use crate::codec::protocol::write_scalar;
use crate::codec::{CodecError, DataType, DecodeLimits, DynamicObject, ProtocolKind, ProtocolWriter, Result, RuntimeSchema, SchemaRef, TypeDef, Value};

/// Plan build switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
	/// Inline non-recursive nested structs at their call sites.
	pub inline_nested: bool,
}

impl Default for PlanOptions {
	fn default() -> Self {
		Self { inline_nested: true }
	}
}

type StepKey = (SourceKind, TypeDef);

#[derive(Debug)]
enum StepRef {
	Inline(Box<WriteLevel>),
	Indirect(usize),
}

#[derive(Debug)]
enum WriteOp {
	Scalar(DataType),
	Struct(StepRef),
	Bonded { step: StepRef, schema: RuntimeSchema },
	Blob(DataType),
	List { element: DataType, op: Box<WriteOp> },
	Map { key: DataType, value: DataType, op: Box<WriteOp> },
}

#[derive(Debug)]
struct WriteField {
	id: u16,
	ty: DataType,
	default: Option<Value>,
	schema: RuntimeSchema,
	op: WriteOp,
}

#[derive(Debug)]
struct WriteLevel {
	fields: Vec<WriteField>,
	by_id: HashMap<u16, usize>,
	base: Option<Box<WriteLevel>>,
	depth: usize,
}

struct Builder<'s> {
	schema: &'s RuntimeSchema,
	source: SourceKind,
	inline: bool,
	steps: Vec<Option<WriteLevel>>,
	memo: HashMap<StepKey, usize>,
	in_progress: Vec<StepKey>,
	recursive: HashMap<u16, bool>,
}

impl<'s> Builder<'s> {
	fn step(&mut self, view: SchemaRef<'s>) -> Result<StepRef> {
		let key = (self.source, view.type_def().unbonded());
		if let Some(&index) = self.memo.get(&key) {
			return Ok(StepRef::Indirect(index));
		}
		let inline = self.inline && !self.in_progress.is_empty() && !self.in_progress.contains(&key) && !self.is_recursive(view);
		self.in_progress.push(key.clone());
		let step = if inline {
			tracing::trace!(name = view.name(), "inlined write step");
			self.level(view).map(|level| StepRef::Inline(Box::new(level)))
		} else {
			let index = self.steps.len();
			self.steps.push(None);
			self.memo.insert(key, index);
			tracing::trace!(step = index, name = view.name(), "reserved write step");
			self.level(view).map(|level| {
				self.steps[index] = Some(level);
				StepRef::Indirect(index)
			})
		};
		self.in_progress.pop();
		step
	}

	fn is_recursive(&mut self, view: SchemaRef<'s>) -> bool {
		let index = view.type_def().struct_def;
		if let Some(&known) = self.recursive.get(&index) {
			return known;
		}
		let found = struct_reaches(view, index, &mut HashSet::new());
		self.recursive.insert(index, found);
		found
	}

	fn level(&mut self, view: SchemaRef<'s>) -> Result<WriteLevel> {
		let def = view.struct_def().ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("{} is not a struct", view.name()),
		})?;
		let base = match view.base() {
			Some(base) => Some(Box::new(self.level(base)?)),
			None => None,
		};
		let mut fields = Vec::with_capacity(def.fields.len());
		let mut by_id = HashMap::with_capacity(def.fields.len());
		for field in &def.fields {
			by_id.insert(field.id, fields.len());
			fields.push(WriteField {
				id: field.id,
				ty: field.ty.id,
				default: field.default_value()?,
				schema: self.schema.with_type(field.ty.clone()),
				op: self.op(view.field(field))?,
			});
		}
		Ok(WriteLevel {
			fields,
			by_id,
			base,
			depth: view.hierarchy_depth(),
		})
	}

	fn op(&mut self, view: SchemaRef<'s>) -> Result<WriteOp> {
		let ty = view.type_def();
		if ty.bonded_type {
			return Ok(WriteOp::Bonded {
				step: self.step(view)?,
				schema: self.schema.with_type(ty.unbonded()),
			});
		}
		let element = || {
			view.element().ok_or_else(|| CodecError::InvalidSchema {
				reason: format!("{} has no element type", ty.id),
			})
		};
		Ok(match ty.id {
			DataType::Struct => WriteOp::Struct(self.step(view)?),
			DataType::List | DataType::Set if ty.is_blob() && !ty.is_nullable() => WriteOp::Blob(element()?.type_def().id),
			DataType::List | DataType::Set => {
				let element = element()?;
				WriteOp::List {
					element: element.type_def().id,
					op: Box::new(self.op(element)?),
				}
			}
			DataType::Map => {
				let key = view.key().ok_or_else(|| CodecError::InvalidSchema {
					reason: "map has no key type".to_owned(),
				})?;
				let value = element()?;
				WriteOp::Map {
					key: key.type_def().id,
					value: value.type_def().id,
					op: Box::new(self.op(value)?),
				}
			}
			DataType::Unavailable => return Err(CodecError::UnknownDataType { id: ty.id.id() }),
			scalar => WriteOp::Scalar(scalar),
		})
	}
}

/// Whether any field type under the struct in `view` leads back to struct `target`.
fn struct_reaches(view: SchemaRef<'_>, target: u16, seen: &mut HashSet<u16>) -> bool {
	let Some(def) = view.struct_def() else {
		return false;
	};
	if view.base().is_some_and(|base| struct_reaches(base, target, seen)) {
		return true;
	}
	def.fields.iter().any(|field| type_reaches(view.field(field), target, seen))
}

fn type_reaches(view: SchemaRef<'_>, target: u16, seen: &mut HashSet<u16>) -> bool {
	let ty = view.type_def();
	match ty.id {
		DataType::Struct if ty.struct_def == target => true,
		DataType::Struct => seen.insert(ty.struct_def) && struct_reaches(view, target, seen),
		DataType::List | DataType::Set | DataType::Map => {
			view.key().is_some_and(|key| type_reaches(key, target, seen)) || view.element().is_some_and(|element| type_reaches(element, target, seen))
		}
		_ => false,
	}
}

/// Compiled write plan for one (source kind, struct type, target protocol).
#[derive(Debug)]
pub(crate) struct WritePlan {
	schema: RuntimeSchema,
	source: SourceKind,
	target: ProtocolKind,
	options: PlanOptions,
	steps: Vec<WriteLevel>,
	root: usize,
}

impl WritePlan {
	pub(crate) fn build(schema: &RuntimeSchema, source: SourceKind, target: ProtocolKind, options: PlanOptions) -> Result<Self> {
		let schema = schema.with_type(schema.type_def().unbonded());
		if !schema.is_struct() {
			return Err(CodecError::InvalidSchema {
				reason: format!("write root must be a struct, found {}", schema.data_type()),
			});
		}
		let mut builder = Builder {
			schema: &schema,
			source,
			inline: options.inline_nested && !source.is_untagged(),
			steps: Vec::new(),
			memo: HashMap::new(),
			in_progress: Vec::new(),
			recursive: HashMap::new(),
		};
		let StepRef::Indirect(root) = builder.step(schema.view())? else {
			return Err(CodecError::InvalidSchema {
				reason: "write root was inlined".to_owned(),
			});
		};
		let steps = builder
			.steps
			.into_iter()
			.enumerate()
			.map(|(index, step)| {
				step.ok_or_else(|| CodecError::InvalidSchema {
					reason: format!("write step {index} was never filled"),
				})
			})
			.collect::<Result<Vec<_>>>()?;
		tracing::debug!(schema = schema.name(), source = ?source, target = %target, steps = steps.len(), "built write plan");
		Ok(Self {
			schema,
			source,
			target,
			options,
			steps,
			root,
		})
	}

	/// Same plan rebuilt for another target protocol.
	pub(crate) fn retarget(&self, target: ProtocolKind) -> Result<Self> {
		Self::build(&self.schema, self.source, target, self.options)
	}

	pub(crate) fn schema(&self) -> &RuntimeSchema {
		&self.schema
	}

	pub(crate) fn target(&self) -> ProtocolKind {
		self.target
	}

	pub(crate) fn step_count(&self) -> usize {
		self.steps.len()
	}

	/// Write the root struct from `src` in a single pass.
	pub(crate) fn run<P: Parser, W: ProtocolWriter>(&self, src: &mut P, w: &mut W, limits: DecodeLimits) -> Result<()> {
		let level = self.indirect(self.root)?;
		self.write_struct(level, src, w, 0, limits)
	}

	fn indirect(&self, index: usize) -> Result<&WriteLevel> {
		self.steps.get(index).ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("write step {index} out of range"),
		})
	}

	fn resolve<'p>(&'p self, step: &'p StepRef) -> Result<&'p WriteLevel> {
		match step {
			StepRef::Inline(level) => Ok(level),
			StepRef::Indirect(index) => self.indirect(*index),
		}
	}

	fn write_struct<P: Parser, W: ProtocolWriter>(&self, level: &WriteLevel, src: &mut P, w: &mut W, depth: usize, limits: DecodeLimits) -> Result<()> {
		if depth > limits.max_depth {
			return Err(CodecError::LimitExceeded {
				what: "depth",
				value: depth,
				max: limits.max_depth,
			});
		}
		drive(
			src,
			&mut WriteTransform {
				plan: self,
				level,
				w,
				top: true,
				next: 0,
				base_done: false,
				depth,
				limits,
			},
		)
	}

	fn write<P: Parser, W: ProtocolWriter>(&self, op: &WriteOp, src: &mut P, w: &mut W, depth: usize, limits: DecodeLimits) -> Result<()> {
		match op {
			WriteOp::Scalar(ty) => {
				let value = src.scalar(*ty)?;
				write_scalar(w, *ty, &value)
			}
			WriteOp::Struct(step) => self.write_struct(self.resolve(step)?, src, w, depth + 1, limits),
			WriteOp::Bonded { step, schema } => self.write_bonded(self.resolve(step)?, schema, src, w, depth + 1, limits),
			WriteOp::Blob(element) => {
				let mut items = src.container()?;
				let source = items.element_type();
				blob_element(source)?;
				let bytes = match items.blob()? {
					Some(bytes) => bytes,
					None => {
						let mut bytes = Vec::with_capacity(items.count().unwrap_or(0).min(MAX_PREALLOC));
						loop {
							let Some(mut item) = items.next_item()? else {
								break;
							};
							bytes.push(blob_byte(&item.scalar(source)?, source)?);
						}
						bytes
					}
				};
				w.write_container_begin(*element, bytes.len())?;
				w.write_bytes(&bytes)?;
				w.write_container_end()
			}
			WriteOp::List { element, op } => {
				let mut items = src.container()?;
				let count = items.count().ok_or(CodecError::UnknownCount)?;
				w.write_container_begin(*element, count)?;
				loop {
					let Some(mut item) = items.next_item()? else {
						break;
					};
					self.write(op, &mut item, w, depth, limits)?;
				}
				w.write_container_end()
			}
			WriteOp::Map { key, value, op } => {
				let mut items = src.map()?;
				let count = items.count().ok_or(CodecError::UnknownCount)?;
				w.write_map_begin(*key, *value, count)?;
				loop {
					let k = match items.next_item()? {
						Some(mut item) => item.scalar(*key)?,
						None => break,
					};
					write_scalar(w, *key, &k)?;
					match items.next_item()? {
						Some(mut item) => self.write(op, &mut item, w, depth, limits)?,
						None => {
							return Err(CodecError::ValueShape {
								expected: DataType::Map,
								got: "key without value",
							});
						}
					}
				}
				w.write_container_end()
			}
		}
	}

	fn write_bonded<P: Parser, W: ProtocolWriter>(
		&self,
		level: &WriteLevel,
		declared: &RuntimeSchema,
		src: &mut P,
		w: &mut W,
		depth: usize,
		limits: DecodeLimits,
	) -> Result<()> {
		if let SourceKind::Wire(_) = src.source() {
			if !src.enter_bonded()? {
				return w.write_bonded_empty();
			}
			w.write_bonded_begin()?;
			self.write_struct(level, src, w, depth, limits)?;
			return w.write_bonded_end();
		}
		let payload = src.bonded(declared.view())?;
		match payload.view() {
			PayloadView::Empty => w.write_bonded_empty(),
			PayloadView::Captured(captured) if captured.kind() == w.kind() => w.write_raw(&captured.raw()?),
			PayloadView::Realized(obj, schema) => self.write_realized(level, declared, obj, schema, w, depth, limits),
			PayloadView::Captured(captured) if captured.kind().is_tagged() && !w.kind().is_tagged() => {
				let obj = captured.decode()?;
				self.write_realized(level, declared, &obj, captured.schema(), w, depth, limits)
			}
			PayloadView::Captured(captured) => {
				let mut reader = captured.open()?;
				let schema = captured.schema();
				w.write_bonded_begin()?;
				let mut src = WireParser::new(&mut reader, Some(schema.view()))?;
				if schema == declared {
					self.write_struct(level, &mut src, w, depth, limits)?;
				} else {
					self.foreign(schema, SourceKind::Wire(captured.kind()), w.kind())?.run(&mut src, w, limits)?;
				}
				w.write_bonded_end()
			}
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn write_realized<W: ProtocolWriter>(
		&self,
		level: &WriteLevel,
		declared: &RuntimeSchema,
		obj: &DynamicObject,
		schema: &RuntimeSchema,
		w: &mut W,
		depth: usize,
		limits: DecodeLimits,
	) -> Result<()> {
		w.write_bonded_begin()?;
		let mut src = ObjectParser::new(obj, schema.view());
		if schema == declared {
			self.write_struct(level, &mut src, w, depth, limits)?;
		} else {
			self.foreign(schema, SourceKind::Object, w.kind())?.run(&mut src, w, limits)?;
		}
		w.write_bonded_end()
	}

	/// Plan for a payload whose schema differs from the declared bonded type.
	fn foreign(&self, schema: &RuntimeSchema, source: SourceKind, target: ProtocolKind) -> Result<WritePlan> {
		tracing::debug!(declared = self.schema.name(), payload = schema.name(), "bonded payload uses its own schema");
		Self::build(schema, source, target, self.options)
	}
}

struct WriteTransform<'p, W> {
	plan: &'p WritePlan,
	level: &'p WriteLevel,
	w: &'p mut W,
	top: bool,
	next: usize,
	base_done: bool,
	depth: usize,
	limits: DecodeLimits,
}

impl<'p, W: ProtocolWriter> WriteTransform<'p, W> {
	fn tagged(&self) -> bool {
		self.w.kind().is_tagged()
	}

	fn nested<'n>(&'n mut self, level: &'p WriteLevel) -> WriteTransform<'n, W>
	where
		'p: 'n,
	{
		WriteTransform {
			plan: self.plan,
			level,
			w: &mut *self.w,
			top: false,
			next: 0,
			base_done: false,
			depth: self.depth,
			limits: self.limits,
		}
	}

	/// Write an empty base level when the source never visited one.
	fn ensure_base(&mut self) -> Result<()> {
		if self.base_done {
			return Ok(());
		}
		self.base_done = true;
		let level = self.level;
		let Some(base) = level.base.as_deref() else {
			return Ok(());
		};
		let mut t = self.nested(base);
		t.begin()?;
		t.end()
	}

	fn write_default(&mut self, slot: usize) -> Result<()> {
		let level = self.level;
		let field = &level.fields[slot];
		if self.tagged() {
			return self.w.write_field_omitted(field.ty, field.id);
		}
		let value = fallback(field.schema.type_def(), field.default.clone());
		self.w.write_field_begin(field.ty, field.id)?;
		self.plan.write(&field.op, &mut ObjectParser::value(&value, field.schema.view()), self.w, self.depth, self.limits)?;
		self.w.write_field_end()
	}

	/// Untagged output: write defaults for every slot before `slot`.
	fn fill_to(&mut self, slot: usize, id: u16) -> Result<()> {
		if self.tagged() {
			return Ok(());
		}
		if slot < self.next {
			return Err(CodecError::FieldOrder { id, protocol: self.w.kind() });
		}
		while self.next < slot {
			self.write_default(self.next)?;
			self.next += 1;
		}
		Ok(())
	}
}

impl<W: ProtocolWriter> Transform for WriteTransform<'_, W> {
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
		if self.top { self.w.write_struct_begin() } else { self.w.write_base_begin() }
	}

	fn field<P: Parser>(&mut self, slot: usize, src: &mut P) -> Result<()> {
		let level = self.level;
		let field = &level.fields[slot];
		self.ensure_base()?;
		self.fill_to(slot, field.id)?;
		self.w.write_field_begin(field.ty, field.id)?;
		self.plan.write(&field.op, src, self.w, self.depth, self.limits)?;
		self.w.write_field_end()?;
		self.next = slot + 1;
		Ok(())
	}

	fn omitted(&mut self, slot: usize) -> Result<()> {
		let id = self.level.fields[slot].id;
		self.ensure_base()?;
		self.fill_to(slot, id)?;
		self.write_default(slot)?;
		self.next = slot + 1;
		Ok(())
	}

	fn base<P: Parser>(&mut self, src: &mut P) -> Result<()> {
		self.base_done = true;
		let level = self.level;
		let Some(base) = level.base.as_deref() else {
			return src.skip();
		};
		drive(src, &mut self.nested(base))
	}

	fn end(&mut self) -> Result<()> {
		self.ensure_base()?;
		if !self.tagged() {
			let len = self.level.fields.len();
			let id = self.level.fields.last().map_or(0, |f| f.id);
			self.fill_to(len, id)?;
		}
		if self.top { self.w.write_struct_end() } else { self.w.write_base_end() }
	}
}

/// First-pass plan for `kind`, built once per owner.
pub(crate) fn first_pass_plan(cell: &OnceLock<Arc<WritePlan>>, main: &Arc<WritePlan>, kind: ProtocolKind) -> Result<Arc<WritePlan>> {
	if let Some(plan) = cell.get() {
		return Ok(Arc::clone(plan));
	}
	let plan = if kind == main.target() { Arc::clone(main) } else { Arc::new(main.retarget(kind)?) };
	tracing::debug!(schema = main.schema().name(), target = %kind, "prepared first-pass plan");
	Ok(Arc::clone(cell.get_or_init(|| plan)))
}

/// Compiled serializer from [`DynamicObject`] to one protocol.
///
/// Two-pass protocols get their first pass automatically.
#[derive(Debug)]
pub struct Serializer {
	plan: Arc<WritePlan>,
	first_pass: OnceLock<Arc<WritePlan>>,
}

impl Serializer {
	/// Compile a serializer for the struct in view of `schema`.
	pub fn new(schema: RuntimeSchema, target: ProtocolKind) -> Result<Self> {
		Self::with_options(schema, target, PlanOptions::default())
	}

	/// Compile with explicit plan options.
	pub fn with_options(schema: RuntimeSchema, target: ProtocolKind, options: PlanOptions) -> Result<Self> {
		let plan = WritePlan::build(&schema, SourceKind::Object, target, options)?;
		Ok(Self {
			plan: Arc::new(plan),
			first_pass: OnceLock::new(),
		})
	}

	/// Recompile with nested-struct inlining switched on or off.
	pub fn with_inline_nested(self, inline_nested: bool) -> Result<Self> {
		Self::with_options(self.plan.schema.clone(), self.plan.target, PlanOptions { inline_nested })
	}

	/// Target schema.
	pub fn schema(&self) -> &RuntimeSchema {
		self.plan.schema()
	}

	/// Target protocol.
	pub fn target(&self) -> ProtocolKind {
		self.plan.target()
	}

	/// Number of indirect steps in the plan table.
	pub fn step_count(&self) -> usize {
		self.plan.step_count()
	}

	/// Write `obj` to `writer`.
	pub fn serialize<W: ProtocolWriter>(&self, writer: &mut W, obj: &DynamicObject) -> Result<()> {
		if writer.kind() != self.plan.target() {
			return Err(CodecError::ProtocolMismatch {
				expected: self.plan.target(),
				got: writer.kind(),
			});
		}
		let view = self.plan.schema().view();
		let limits = DecodeLimits::default();
		if let Some(first) = writer.first_pass() {
			let plan = first_pass_plan(&self.first_pass, &self.plan, first.kind())?;
			plan.run(&mut ObjectParser::new(obj, view), first, limits)?;
		}
		self.plan.run(&mut ObjectParser::new(obj, view), writer, limits)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::{FieldDef, SchemaDef, SimpleWriter, StructDef};

	fn schema() -> RuntimeSchema {
		let outer = StructDef::new(
			"Outer",
			vec![
				FieldDef::optional(0, "a", TypeDef::structure(1)),
				FieldDef::optional(1, "b", TypeDef::structure(1)),
				FieldDef::optional(2, "tree", TypeDef::structure(2)),
			],
		);
		let leaf = StructDef::new("Leaf", vec![FieldDef::optional(0, "x", TypeDef::scalar(DataType::UInt8))]);
		let tree = StructDef::new("Tree", vec![FieldDef::optional(0, "kids", TypeDef::list(TypeDef::structure(2)))]);
		RuntimeSchema::new(SchemaDef::new(vec![outer, leaf, tree])).expect("schema is valid")
	}

	#[test]
	fn non_recursive_structs_inline() {
		let serializer = Serializer::new(schema(), ProtocolKind::Compact).expect("plan builds");
		assert_eq!(serializer.step_count(), 2);
	}

	#[test]
	fn inlining_can_be_switched_off() {
		let serializer = Serializer::new(schema(), ProtocolKind::Compact)
			.expect("plan builds")
			.with_inline_nested(false)
			.expect("plan rebuilds");
		assert_eq!(serializer.step_count(), 3);
	}

	#[test]
	fn untagged_sources_never_inline() {
		let plan = WritePlan::build(&schema(), SourceKind::Wire(ProtocolKind::Simple), ProtocolKind::Compact, PlanOptions::default())
			.expect("plan builds");
		assert_eq!(plan.step_count(), 3);
	}

	#[test]
	fn writer_protocol_must_match() {
		let serializer = Serializer::new(schema(), ProtocolKind::Compact).expect("plan builds");
		let mut writer = SimpleWriter::new();
		let err = serializer.serialize(&mut writer, &DynamicObject::new()).expect_err("protocol mismatch");
		assert!(matches!(err, CodecError::ProtocolMismatch { .. }));
	}
}
