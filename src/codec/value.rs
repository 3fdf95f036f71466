use std::collections::{BTreeMap, HashMap};

use crate::codec::{CodecError, DataType, LazyPayload, Result};

/// Dynamically typed value produced by decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// Absent value.
	Null,
	/// `bool`
	Bool(bool),
	/// Any signed integer kind.
	I64(i64),
	/// Any unsigned integer kind.
	U64(u64),
	/// `float`
	F32(f32),
	/// `double`
	F64(f64),
	/// `string` and `wstring`.
	String(Box<str>),
	/// `blob` and byte lists.
	Bytes(Vec<u8>),
	/// `list<T>` and `set<T>`.
	List(Vec<Value>),
	/// `map<K, V>`
	Map(MapValue),
	/// Nested struct.
	Struct(DynamicObject),
	/// `bonded<T>`
	Bonded(LazyPayload),
}

impl Value {
	/// Variant name used in diagnostics.
	pub fn kind_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::I64(_) => "i64",
			Self::U64(_) => "u64",
			Self::F32(_) => "f32",
			Self::F64(_) => "f64",
			Self::String(_) => "string",
			Self::Bytes(_) => "bytes",
			Self::List(_) => "list",
			Self::Map(_) => "map",
			Self::Struct(_) => "struct",
			Self::Bonded(_) => "bonded",
		}
	}

	/// `true` for [`Value::Null`].
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Borrow as a struct.
	pub fn as_struct(&self) -> Option<&DynamicObject> {
		match self {
			Self::Struct(obj) => Some(obj),
			_ => None,
		}
	}

	/// Borrow as a string.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Read as `u64` when the value is a non-negative integer.
	pub fn as_u64(&self) -> Option<u64> {
		match *self {
			Self::U64(v) => Some(v),
			Self::I64(v) => u64::try_from(v).ok(),
			_ => None,
		}
	}

	/// Read as `i64` when the value is an integer in range.
	pub fn as_i64(&self) -> Option<i64> {
		match *self {
			Self::I64(v) => Some(v),
			Self::U64(v) => i64::try_from(v).ok(),
			_ => None,
		}
	}

	/// Read as `f64` from either float width.
	pub fn as_f64(&self) -> Option<f64> {
		match *self {
			Self::F64(v) => Some(v),
			Self::F32(v) => Some(f64::from(v)),
			_ => None,
		}
	}

	/// Number of elements for containers, `None` for anything else.
	pub fn len(&self) -> Option<usize> {
		match self {
			Self::Bytes(b) => Some(b.len()),
			Self::List(items) => Some(items.len()),
			Self::Map(map) => Some(map.len()),
			_ => None,
		}
	}

	/// Shape error for this value against `expected`.
	pub(crate) fn shape_error(&self, expected: DataType) -> CodecError {
		CodecError::ValueShape {
			expected,
			got: self.kind_name(),
		}
	}
}

impl From<bool> for Value {
	fn from(v: bool) -> Self {
		Self::Bool(v)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::I64(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::I64(i64::from(v))
	}
}

impl From<u64> for Value {
	fn from(v: u64) -> Self {
		Self::U64(v)
	}
}

impl From<u32> for Value {
	fn from(v: u32) -> Self {
		Self::U64(u64::from(v))
	}
}

impl From<f32> for Value {
	fn from(v: f32) -> Self {
		Self::F32(v)
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::F64(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::String(v.into())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::String(v.into_boxed_str())
	}
}

impl From<Vec<u8>> for Value {
	fn from(v: Vec<u8>) -> Self {
		Self::Bytes(v)
	}
}

impl From<Vec<Value>> for Value {
	fn from(v: Vec<Value>) -> Self {
		Self::List(v)
	}
}

impl From<DynamicObject> for Value {
	fn from(v: DynamicObject) -> Self {
		Self::Struct(v)
	}
}

impl From<MapValue> for Value {
	fn from(v: MapValue) -> Self {
		Self::Map(v)
	}
}

impl From<LazyPayload> for Value {
	fn from(v: LazyPayload) -> Self {
		Self::Bonded(v)
	}
}

/// Struct value: field name to value. Base and derived fields share one namespace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicObject {
	fields: BTreeMap<Box<str>, Value>,
}

impl DynamicObject {
	/// Empty object.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builder-style insert.
	pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
		self.set(name, value);
		self
	}

	/// Insert or replace a field.
	pub fn set(&mut self, name: &str, value: impl Into<Value>) {
		self.fields.insert(name.into(), value.into());
	}

	/// Look up a field.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.fields.get(name)
	}

	/// Remove a field.
	pub fn remove(&mut self, name: &str) -> Option<Value> {
		self.fields.remove(name)
	}

	/// `true` when the field is present.
	pub fn contains(&self, name: &str) -> bool {
		self.fields.contains_key(name)
	}

	/// Number of present fields.
	pub fn len(&self) -> usize {
		self.fields.len()
	}

	/// `true` when no field is present.
	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	/// Iterate fields in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
		self.fields.iter().map(|(k, v)| (k.as_ref(), v))
	}
}

/// Hashable projection of a scalar map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
	/// `bool` key.
	Bool(bool),
	/// Signed integer key.
	Int(i64),
	/// Unsigned integer key.
	UInt(u64),
	/// Float key compared by bit pattern.
	Float(u64),
	/// String key.
	Str(Box<str>),
}

impl MapKey {
	/// Project a value; containers and structs are not valid keys.
	pub fn from_value(value: &Value) -> Result<Self> {
		Ok(match value {
			Value::Bool(v) => Self::Bool(*v),
			Value::I64(v) => Self::Int(*v),
			Value::U64(v) => Self::UInt(*v),
			Value::F32(v) => Self::Float(f64::from(*v).to_bits()),
			Value::F64(v) => Self::Float(v.to_bits()),
			Value::String(v) => Self::Str(v.clone()),
			other => return Err(other.shape_error(DataType::Map)),
		})
	}
}

/// Map value. Iteration follows first-insertion order; a repeated key overwrites in place.
#[derive(Debug, Clone, Default)]
pub struct MapValue {
	entries: Vec<(Value, Value)>,
	index: HashMap<MapKey, usize>,
}

impl PartialEq for MapValue {
	fn eq(&self, other: &Self) -> bool {
		self.len() == other.len()
			&& self.index.iter().all(|(key, &slot)| {
				other
					.index
					.get(key)
					.is_some_and(|&theirs| self.entries[slot].1 == other.entries[theirs].1)
			})
	}
}

impl MapValue {
	/// Empty map.
	pub fn new() -> Self {
		Self::default()
	}

	/// Empty map with room for `capacity` entries.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			entries: Vec::with_capacity(capacity),
			index: HashMap::with_capacity(capacity),
		}
	}

	/// Insert an entry, overwriting the value of an equal key.
	pub fn insert(&mut self, key: Value, value: Value) -> Result<()> {
		let projected = MapKey::from_value(&key)?;
		match self.index.get(&projected) {
			Some(&slot) => self.entries[slot].1 = value,
			None => {
				self.index.insert(projected, self.entries.len());
				self.entries.push((key, value));
			}
		}
		Ok(())
	}

	/// Look up by key.
	pub fn get(&self, key: &Value) -> Option<&Value> {
		let projected = MapKey::from_value(key).ok()?;
		self.index.get(&projected).map(|&slot| &self.entries[slot].1)
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// `true` when there are no entries.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterate entries.
	pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
		self.entries.iter().map(|(k, v)| (k, v))
	}

	pub(crate) fn entry(&self, index: usize) -> Option<&(Value, Value)> {
		self.entries.get(index)
	}
}

#[cfg(test)]
mod tests {
	use super::{DynamicObject, MapValue, Value};

	#[test]
	fn duplicate_map_keys_overwrite() {
		let mut map = MapValue::new();
		map.insert(Value::from("a"), Value::from(1_i64)).expect("insert succeeds");
		map.insert(Value::from("b"), Value::from(2_i64)).expect("insert succeeds");
		map.insert(Value::from("a"), Value::from(3_i64)).expect("insert succeeds");

		assert_eq!(map.len(), 2);
		assert_eq!(map.get(&Value::from("a")), Some(&Value::I64(3)));
	}

	#[test]
	fn map_equality_ignores_order() {
		let mut left = MapValue::new();
		left.insert(Value::U64(1), Value::from("x")).expect("insert succeeds");
		left.insert(Value::U64(2), Value::from("y")).expect("insert succeeds");
		let mut right = MapValue::new();
		right.insert(Value::U64(2), Value::from("y")).expect("insert succeeds");
		right.insert(Value::U64(1), Value::from("x")).expect("insert succeeds");

		assert_eq!(left, right);
	}

	#[test]
	fn struct_keys_are_rejected() {
		let mut map = MapValue::new();
		let err = map.insert(Value::Struct(DynamicObject::new()), Value::Null).expect_err("struct key fails");
		assert!(err.to_string().contains("struct"));
	}

	#[test]
	fn integer_views_check_range() {
		assert_eq!(Value::I64(-1).as_u64(), None);
		assert_eq!(Value::U64(u64::MAX).as_i64(), None);
		assert_eq!(Value::U64(7).as_i64(), Some(7));
	}
}
