use std::borrow::Cow;

use crate::codec::parser::{Items, Parser, SourceKind, Transform, coerce_scalar};
use crate::codec::{CodecError, DataType, DynamicObject, FieldDef, LazyPayload, MapValue, Modifier, Result, SchemaRef, TypeDef, Value};

#[derive(Debug, Clone, Copy)]
enum Node<'a> {
	Value(&'a Value),
	Object(&'a DynamicObject),
}

/// Parser over an in-memory value described by `schema`.
///
/// Absent fields are supplied from schema defaults, and optional fields that still hold
/// their default are reported as omitted.
pub struct ObjectParser<'a> {
	node: Node<'a>,
	schema: SchemaRef<'a>,
}

impl<'a> ObjectParser<'a> {
	/// Parser over a struct value.
	pub fn new(object: &'a DynamicObject, schema: SchemaRef<'a>) -> Self {
		Self {
			node: Node::Object(object),
			schema,
		}
	}

	/// Parser over an arbitrary value.
	pub fn value(value: &'a Value, schema: SchemaRef<'a>) -> Self {
		Self {
			node: Node::Value(value),
			schema,
		}
	}

	fn apply_object<T: Transform>(&self, obj: &DynamicObject, t: &mut T) -> Result<()> {
		let schema = self.schema;
		let def = schema.struct_def().ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("{} is not a struct", schema.name()),
		})?;
		t.begin()?;
		if let Some(base) = schema.base() {
			if t.has_base() {
				t.base(&mut ObjectParser::new(obj, base))?;
			}
		}
		for field in &def.fields {
			let Some(slot) = t.slot(field.id) else {
				continue;
			};
			let present = obj.get(field.name()).filter(|v| !v.is_null());
			let default = field.default_value()?;
			if !cannot_omit(field, present, default.as_ref()) {
				t.omitted(slot)?;
				continue;
			}
			let value: Cow<'_, Value> = match present {
				Some(v) => Cow::Borrowed(v),
				None if field.metadata.modifier == Modifier::Required => {
					return Err(CodecError::RequiredFieldMissing {
						struct_name: def.name().into(),
						field: field.name().into(),
					});
				}
				None => Cow::Owned(fallback(&field.ty, default)),
			};
			t.field(slot, &mut ObjectParser::value(&value, schema.field(field)))?;
		}
		t.end()
	}

	fn items(&self, kind: ItemsKind<'a>, key: Option<SchemaRef<'a>>) -> Result<ObjectItems<'a>> {
		let element = self.schema.element().ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("{} has no element type", self.schema.type_def().id),
		})?;
		Ok(ObjectItems {
			kind,
			element,
			key,
			index: 0,
			scratch: Value::Null,
		})
	}
}

/// Whether a present-or-defaulted field must be written.
fn cannot_omit(field: &FieldDef, present: Option<&Value>, default: Option<&Value>) -> bool {
	let ty = &field.ty;
	if ty.id == DataType::Struct || ty.bonded_type || !field.is_optional() {
		return true;
	}
	if ty.is_blob() || matches!(ty.id, DataType::List | DataType::Set | DataType::Map) {
		return present.is_some();
	}
	match (present, default) {
		(None, _) => false,
		(Some(_), None) => true,
		(Some(v), Some(d)) => !scalar_equals(v, d),
	}
}

fn scalar_equals(value: &Value, default: &Value) -> bool {
	match default {
		Value::U64(d) => value.as_u64() == Some(*d),
		Value::I64(d) => value.as_i64() == Some(*d),
		Value::F32(d) => value.as_f64() == Some(f64::from(*d)),
		Value::F64(d) => value.as_f64() == Some(*d),
		other => value == other,
	}
}

/// Value written for a field that must appear but is absent.
pub(crate) fn fallback(ty: &TypeDef, default: Option<Value>) -> Value {
	if let Some(default) = default {
		return default;
	}
	if ty.bonded_type {
		return Value::Bonded(LazyPayload::empty());
	}
	match ty.id {
		DataType::Bool => Value::Bool(false),
		DataType::Float => Value::F32(0.0),
		DataType::Double => Value::F64(0.0),
		DataType::String | DataType::WString => Value::String("".into()),
		DataType::Struct => Value::Struct(DynamicObject::new()),
		DataType::List if ty.is_nullable() => Value::Null,
		DataType::List | DataType::Set if ty.is_blob() => Value::Bytes(Vec::new()),
		DataType::List | DataType::Set => Value::List(Vec::new()),
		DataType::Map => Value::Map(MapValue::new()),
		id if id.is_signed() => Value::I64(0),
		id if id.is_unsigned() => Value::U64(0),
		_ => Value::Null,
	}
}

impl<'a> Parser for ObjectParser<'a> {
	type Items<'b>
		= ObjectItems<'b>
	where
		Self: 'b;

	fn source(&self) -> SourceKind {
		SourceKind::Object
	}

	fn data_type(&self) -> DataType {
		self.schema.type_def().id
	}

	fn is_bonded(&self) -> bool {
		self.schema.type_def().bonded_type || matches!(self.node, Node::Value(Value::Bonded(_)))
	}

	fn hierarchy_depth(&self) -> Option<usize> {
		Some(self.schema.hierarchy_depth())
	}

	fn apply<T: Transform>(&mut self, t: &mut T) -> Result<()> {
		match self.node {
			Node::Object(obj) | Node::Value(Value::Struct(obj)) => self.apply_object(obj, t),
			Node::Value(Value::Bonded(payload)) => {
				let decoded = payload.decode()?;
				self.apply_object(&decoded, t)
			}
			Node::Value(Value::Null) => self.apply_object(&DynamicObject::new(), t),
			Node::Value(other) => Err(other.shape_error(DataType::Struct)),
		}
	}

	fn scalar(&mut self, expected: DataType) -> Result<Value> {
		let declared = self.schema.type_def().id;
		if !declared.promotes_to(expected) {
			return Err(CodecError::TypeMismatch { expected, got: declared });
		}
		match self.node {
			Node::Value(value) => coerce_scalar(value, expected),
			Node::Object(_) => Err(CodecError::ValueShape { expected, got: "struct" }),
		}
	}

	fn container(&mut self) -> Result<ObjectItems<'_>> {
		let ty = self.schema.type_def();
		if !ty.id.is_container() {
			return Err(CodecError::TypeMismatch {
				expected: DataType::List,
				got: ty.id,
			});
		}
		let value = match self.node {
			Node::Value(value) => value,
			Node::Object(_) => return Err(CodecError::ValueShape { expected: ty.id, got: "struct" }),
		};
		let kind = if ty.is_nullable() {
			ItemsKind::Single((!value.is_null()).then_some(value))
		} else {
			match value {
				Value::List(items) => ItemsKind::List(items),
				Value::Bytes(bytes) => ItemsKind::Bytes(bytes),
				Value::Null => ItemsKind::List(&[]),
				other => return Err(other.shape_error(ty.id)),
			}
		};
		self.items(kind, None)
	}

	fn map(&mut self) -> Result<ObjectItems<'_>> {
		let ty = self.schema.type_def();
		if ty.id != DataType::Map {
			return Err(CodecError::TypeMismatch {
				expected: DataType::Map,
				got: ty.id,
			});
		}
		let kind = match self.node {
			Node::Value(Value::Map(map)) => ItemsKind::Map(map),
			Node::Value(Value::Null) => ItemsKind::List(&[]),
			Node::Value(other) => return Err(other.shape_error(DataType::Map)),
			Node::Object(_) => return Err(CodecError::ValueShape { expected: DataType::Map, got: "struct" }),
		};
		let key = self.schema.key();
		self.items(kind, key)
	}

	fn bonded(&mut self, _declared: SchemaRef<'_>) -> Result<LazyPayload> {
		let schema = self.schema.to_runtime();
		let schema = schema.with_type(schema.type_def().unbonded());
		match self.node {
			Node::Value(Value::Bonded(payload)) => Ok(payload.clone()),
			Node::Value(Value::Struct(obj)) | Node::Object(obj) => Ok(LazyPayload::from_object(obj.clone(), schema)),
			Node::Value(Value::Null) => Ok(LazyPayload::empty()),
			Node::Value(other) => Err(other.shape_error(DataType::Struct)),
		}
	}

	fn enter_bonded(&mut self) -> Result<bool> {
		Ok(!matches!(self.node, Node::Value(Value::Null)))
	}

	fn skip(&mut self) -> Result<()> {
		Ok(())
	}
}

#[derive(Debug, Clone, Copy)]
enum ItemsKind<'a> {
	List(&'a [Value]),
	Bytes(&'a [u8]),
	Map(&'a MapValue),
	Single(Option<&'a Value>),
}

/// Items of an in-memory container or map.
pub struct ObjectItems<'a> {
	kind: ItemsKind<'a>,
	element: SchemaRef<'a>,
	key: Option<SchemaRef<'a>>,
	index: usize,
	scratch: Value,
}

impl<'a> Items for ObjectItems<'a> {
	type Item<'b>
		= ObjectParser<'b>
	where
		Self: 'b;

	fn element_type(&self) -> DataType {
		self.element.type_def().id
	}

	fn key_type(&self) -> Option<DataType> {
		self.key.map(|k| k.type_def().id)
	}

	fn count(&self) -> Option<usize> {
		Some(match self.kind {
			ItemsKind::List(items) => items.len(),
			ItemsKind::Bytes(bytes) => bytes.len(),
			ItemsKind::Map(map) => map.len(),
			ItemsKind::Single(item) => usize::from(item.is_some()),
		})
	}

	fn blob(&mut self) -> Result<Option<Vec<u8>>> {
		match self.kind {
			ItemsKind::Bytes(bytes) if self.index == 0 => {
				self.index = bytes.len();
				Ok(Some(bytes.to_vec()))
			}
			_ => Ok(None),
		}
	}

	fn next_item(&mut self) -> Result<Option<ObjectParser<'_>>> {
		let index = self.index;
		self.index += 1;
		let element = self.element;
		let item = match self.kind {
			ItemsKind::List(items) => items.get(index).map(|v| ObjectParser::value(v, element)),
			ItemsKind::Single(item) => item.filter(|_| index == 0).map(|v| ObjectParser::value(v, element)),
			ItemsKind::Map(map) => match (map.entry(index / 2), self.key) {
				(Some((k, _)), Some(key)) if index % 2 == 0 => Some(ObjectParser::value(k, key)),
				(Some((_, v)), _) => Some(ObjectParser::value(v, element)),
				(None, _) => None,
			},
			ItemsKind::Bytes(bytes) => match bytes.get(index) {
				Some(&byte) => {
					self.scratch = match element.type_def().id {
						DataType::Int8 => Value::I64(i64::from(byte as i8)),
						_ => Value::U64(u64::from(byte)),
					};
					Some(ObjectParser::value(&self.scratch, element))
				}
				None => None,
			},
		};
		Ok(item)
	}
}
