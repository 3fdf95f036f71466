use crate::codec::parser::{Items, Parser, SourceKind, Transform};
use crate::codec::protocol::{FieldTag, read_scalar};
use crate::codec::{CodecError, DataType, LazyPayload, ProtocolReader, Result, SchemaRef, Value};

const MAX_SKIP_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
	/// Outermost level of a struct value.
	Top,
	/// Base level reached through a derived struct.
	Base,
}

/// Parser over a protocol reader.
///
/// Tagged readers describe themselves; untagged readers need the schema the bytes were
/// written with.
pub struct WireParser<'a, R: ProtocolReader> {
	reader: &'a mut R,
	schema: Option<SchemaRef<'a>>,
	ty: DataType,
	level: Level,
	stopped: bool,
	entered: bool,
}

impl<'a, R: ProtocolReader> WireParser<'a, R> {
	/// Parser at the start of a struct payload.
	///
	/// `source` is the schema the payload was written with; untagged readers require it.
	pub fn new(reader: &'a mut R, source: Option<SchemaRef<'a>>) -> Result<Self> {
		let kind = reader.kind();
		if !kind.is_tagged() && source.is_none() {
			return Err(CodecError::MissingSourceSchema { protocol: kind });
		}
		Ok(Self {
			reader,
			schema: if kind.is_tagged() { None } else { source },
			ty: DataType::Struct,
			level: Level::Top,
			stopped: false,
			entered: false,
		})
	}

	fn child(&mut self, ty: DataType, schema: Option<SchemaRef<'a>>, level: Level) -> WireParser<'_, R> {
		WireParser {
			reader: &mut *self.reader,
			schema,
			ty,
			level,
			stopped: false,
			entered: level == Level::Base,
		}
	}

	fn untagged(&self) -> Option<SchemaRef<'a>> {
		if self.reader.kind().is_tagged() { None } else { self.schema }
	}

	fn expect(&self, expected: DataType) -> Result<()> {
		let ok = match expected {
			DataType::List | DataType::Set => self.ty.is_container(),
			_ => self.ty == expected,
		};
		if ok { Ok(()) } else { Err(CodecError::TypeMismatch { expected, got: self.ty }) }
	}

	fn apply_tagged<T: Transform>(&mut self, t: &mut T) -> Result<()> {
		if self.level == Level::Top {
			self.reader.read_struct_begin()?;
		}
		t.begin()?;
		if t.has_base() {
			let mut base = self.child(DataType::Struct, None, Level::Base);
			t.base(&mut base)?;
			let stopped = base.stopped;
			self.stopped = stopped;
		}
		let mut extra_levels = false;
		while !self.stopped {
			match self.reader.read_field_begin()? {
				FieldTag::Field { ty, id } => {
					let slot = if extra_levels { None } else { t.slot(id) };
					let mut field = self.child(ty, None, Level::Top);
					match slot {
						Some(slot) => t.field(slot, &mut field)?,
						None => t.unknown(id, &mut field)?,
					}
					self.reader.read_field_end()?;
				}
				FieldTag::BaseStop if self.level == Level::Top => extra_levels = true,
				FieldTag::BaseStop => break,
				FieldTag::Stop => {
					if self.level == Level::Base {
						self.stopped = true;
					}
					break;
				}
			}
		}
		if self.level == Level::Top {
			self.reader.read_struct_end()?;
		}
		t.end()
	}

	fn apply_untagged<T: Transform>(&mut self, schema: SchemaRef<'a>, t: &mut T) -> Result<()> {
		let def = schema.struct_def().ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("{} is not a struct", schema.name()),
		})?;
		if self.level == Level::Top && schema.type_def().bonded_type && !self.entered {
			self.entered = true;
			if self.reader.read_bonded_begin()? == Some(0) {
				t.begin()?;
				return t.end();
			}
		}
		t.begin()?;
		if let Some(base) = schema.base() {
			let mut child = self.child(DataType::Struct, Some(base), Level::Base);
			if t.has_base() {
				t.base(&mut child)?;
			} else {
				child.skip()?;
			}
		}
		for field in &def.fields {
			let mut child = self.child(field.ty.id, Some(schema.field(field)), Level::Top);
			match t.slot(field.id) {
				Some(slot) => t.field(slot, &mut child)?,
				None => t.unknown(field.id, &mut child)?,
			}
		}
		t.end()
	}
}

/// Schema-driven skip for untagged readers.
fn skip_untagged<R: ProtocolReader>(reader: &mut R, schema: SchemaRef<'_>, entered: bool, depth: usize) -> Result<()> {
	if depth > MAX_SKIP_DEPTH {
		return Err(CodecError::LimitExceeded {
			what: "skip depth",
			value: depth,
			max: MAX_SKIP_DEPTH,
		});
	}
	let ty = schema.type_def();
	if ty.bonded_type && !entered {
		if let Some(len) = reader.read_bonded_begin()? {
			return reader.skip_bytes(len);
		}
	}
	match ty.id {
		DataType::Struct => {
			let def = schema.struct_def().ok_or_else(|| CodecError::InvalidSchema {
				reason: format!("{} is not a struct", schema.name()),
			})?;
			if let Some(base) = schema.base() {
				skip_untagged(reader, base, true, depth + 1)?;
			}
			for field in &def.fields {
				skip_untagged(reader, schema.field(field), false, depth + 1)?;
			}
			Ok(())
		}
		DataType::List | DataType::Set => {
			let element = schema.element().ok_or_else(|| missing_element(schema))?;
			let header = reader.read_container_begin(element.type_def().id)?;
			for _ in 0..header.count {
				skip_untagged(reader, element, false, depth + 1)?;
			}
			Ok(())
		}
		DataType::Map => {
			let key = schema.key().ok_or_else(|| missing_element(schema))?;
			let value = schema.element().ok_or_else(|| missing_element(schema))?;
			let header = reader.read_map_begin(key.type_def().id, value.type_def().id)?;
			for _ in 0..header.count {
				skip_untagged(reader, key, false, depth + 1)?;
				skip_untagged(reader, value, false, depth + 1)?;
			}
			Ok(())
		}
		other => reader.skip(other),
	}
}

fn missing_element(schema: SchemaRef<'_>) -> CodecError {
	CodecError::InvalidSchema {
		reason: format!("{} has no element type", schema.type_def().id),
	}
}

impl<'a, R: ProtocolReader> Parser for WireParser<'a, R> {
	type Items<'b>
		= WireItems<'b, R>
	where
		Self: 'b;

	fn source(&self) -> SourceKind {
		SourceKind::Wire(self.reader.kind())
	}

	fn data_type(&self) -> DataType {
		self.ty
	}

	fn is_bonded(&self) -> bool {
		self.untagged().is_some_and(|s| s.type_def().bonded_type)
	}

	fn hierarchy_depth(&self) -> Option<usize> {
		self.untagged().map(|s| s.hierarchy_depth())
	}

	fn apply<T: Transform>(&mut self, t: &mut T) -> Result<()> {
		self.expect(DataType::Struct)?;
		match self.untagged() {
			Some(schema) => self.apply_untagged(schema, t),
			None => self.apply_tagged(t),
		}
	}

	fn scalar(&mut self, expected: DataType) -> Result<Value> {
		if !self.ty.is_scalar() || !self.ty.promotes_to(expected) {
			return Err(CodecError::TypeMismatch { expected, got: self.ty });
		}
		Ok(match read_scalar(self.reader, self.ty)? {
			Value::F32(v) if expected == DataType::Double => Value::F64(f64::from(v)),
			value => value,
		})
	}

	fn container(&mut self) -> Result<WireItems<'_, R>> {
		self.expect(DataType::List)?;
		let element = self.schema.and_then(|s| s.element());
		let hint = element.map_or(DataType::Unavailable, |e| e.type_def().id);
		let header = self.reader.read_container_begin(hint)?;
		Ok(WireItems {
			reader: &mut *self.reader,
			element: header.element,
			key: None,
			element_schema: element,
			key_schema: None,
			count: header.count,
			remaining: header.count,
			next_is_key: false,
		})
	}

	fn map(&mut self) -> Result<WireItems<'_, R>> {
		self.expect(DataType::Map)?;
		let key = self.schema.and_then(|s| s.key());
		let value = self.schema.and_then(|s| s.element());
		let header = self.reader.read_map_begin(
			key.map_or(DataType::Unavailable, |k| k.type_def().id),
			value.map_or(DataType::Unavailable, |v| v.type_def().id),
		)?;
		Ok(WireItems {
			reader: &mut *self.reader,
			element: header.value,
			key: Some(header.key),
			element_schema: value,
			key_schema: key,
			count: header.count,
			remaining: header.count,
			next_is_key: true,
		})
	}

	fn bonded(&mut self, declared: SchemaRef<'_>) -> Result<LazyPayload> {
		self.expect(DataType::Struct)?;
		let kind = self.reader.kind();
		let schema = self.untagged().map_or_else(|| declared.to_runtime(), |s| s.to_runtime());
		let schema = schema.with_type(schema.type_def().unbonded());
		let start = self.reader.duplicate().ok_or(CodecError::NotDuplicable { protocol: kind })?;
		let begin = self.reader.position();
		if kind.is_tagged() {
			self.reader.skip(DataType::Struct)?;
		} else {
			match self.reader.read_bonded_begin()? {
				Some(0) => return Ok(LazyPayload::empty()),
				Some(len) => self.reader.skip_bytes(len)?,
				None => self.skip()?,
			}
		}
		let len = self.reader.position() - begin;
		tracing::trace!(protocol = %kind, offset = begin, len, "captured bonded payload");
		Ok(LazyPayload::captured(start, len, schema))
	}

	fn enter_bonded(&mut self) -> Result<bool> {
		self.expect(DataType::Struct)?;
		if self.reader.kind().is_tagged() || self.entered {
			return Ok(true);
		}
		self.entered = true;
		Ok(self.reader.read_bonded_begin()? != Some(0))
	}

	fn skip(&mut self) -> Result<()> {
		match self.untagged() {
			Some(schema) => skip_untagged(self.reader, schema, self.entered, 0),
			None => self.reader.skip(self.ty),
		}
	}
}

/// Items of a container or map read from the wire.
pub struct WireItems<'a, R: ProtocolReader> {
	reader: &'a mut R,
	element: DataType,
	key: Option<DataType>,
	element_schema: Option<SchemaRef<'a>>,
	key_schema: Option<SchemaRef<'a>>,
	count: usize,
	remaining: usize,
	next_is_key: bool,
}

impl<'a, R: ProtocolReader> Items for WireItems<'a, R> {
	type Item<'b>
		= WireParser<'b, R>
	where
		Self: 'b;

	fn element_type(&self) -> DataType {
		self.element
	}

	fn key_type(&self) -> Option<DataType> {
		self.key
	}

	fn count(&self) -> Option<usize> {
		Some(self.count)
	}

	fn blob(&mut self) -> Result<Option<Vec<u8>>> {
		if self.key.is_some() || !matches!(self.element, DataType::UInt8 | DataType::Int8) {
			return Ok(None);
		}
		let bytes = self.reader.read_bytes(self.remaining)?;
		self.remaining = 0;
		Ok(Some(bytes.to_vec()))
	}

	fn next_item(&mut self) -> Result<Option<WireParser<'_, R>>> {
		if self.remaining == 0 {
			return Ok(None);
		}
		let (ty, schema) = match self.key {
			Some(key) if self.next_is_key => {
				self.next_is_key = false;
				(key, self.key_schema)
			}
			_ => {
				self.next_is_key = self.key.is_some();
				self.remaining -= 1;
				(self.element, self.element_schema)
			}
		};
		Ok(Some(WireParser {
			reader: &mut *self.reader,
			schema,
			ty,
			level: Level::Top,
			stopped: false,
			entered: false,
		}))
	}
}
