use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{CodecError, Result, Value};

mod runtime;

pub use runtime::{RuntimeSchema, SchemaRef};

/// Wire-level value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum DataType {
	/// `bool`
	Bool = 2,
	/// `uint8`
	UInt8 = 3,
	/// `uint16`
	UInt16 = 4,
	/// `uint32`
	UInt32 = 5,
	/// `uint64`
	UInt64 = 6,
	/// `float`
	Float = 7,
	/// `double`
	Double = 8,
	/// UTF-8 `string`
	String = 9,
	/// Nested struct.
	Struct = 10,
	/// `list<T>` and its subtypes.
	List = 11,
	/// `set<T>`
	Set = 12,
	/// `map<K, V>`
	Map = 13,
	/// `int8`
	Int8 = 14,
	/// `int16`
	Int16 = 15,
	/// `int32`
	Int32 = 16,
	/// `int64`
	Int64 = 17,
	/// UTF-16 `wstring`
	WString = 18,
	/// Placeholder for an unresolved type.
	Unavailable = 127,
}

impl DataType {
	/// Return the wire id.
	pub fn id(self) -> u8 {
		self as u8
	}

	/// Resolve a wire id.
	pub fn from_id(id: u8) -> Result<Self> {
		Ok(match id {
			2 => Self::Bool,
			3 => Self::UInt8,
			4 => Self::UInt16,
			5 => Self::UInt32,
			6 => Self::UInt64,
			7 => Self::Float,
			8 => Self::Double,
			9 => Self::String,
			10 => Self::Struct,
			11 => Self::List,
			12 => Self::Set,
			13 => Self::Map,
			14 => Self::Int8,
			15 => Self::Int16,
			16 => Self::Int32,
			17 => Self::Int64,
			18 => Self::WString,
			127 => Self::Unavailable,
			_ => return Err(CodecError::UnknownDataType { id }),
		})
	}

	/// Lowercase IDL spelling.
	pub fn name(self) -> &'static str {
		match self {
			Self::Bool => "bool",
			Self::UInt8 => "uint8",
			Self::UInt16 => "uint16",
			Self::UInt32 => "uint32",
			Self::UInt64 => "uint64",
			Self::Float => "float",
			Self::Double => "double",
			Self::String => "string",
			Self::Struct => "struct",
			Self::List => "list",
			Self::Set => "set",
			Self::Map => "map",
			Self::Int8 => "int8",
			Self::Int16 => "int16",
			Self::Int32 => "int32",
			Self::Int64 => "int64",
			Self::WString => "wstring",
			Self::Unavailable => "unavailable",
		}
	}

	/// `true` for list and set.
	pub fn is_container(self) -> bool {
		matches!(self, Self::List | Self::Set)
	}

	/// `true` for kinds read through `scalar`.
	pub fn is_scalar(self) -> bool {
		!matches!(self, Self::Struct | Self::List | Self::Set | Self::Map | Self::Unavailable)
	}

	/// `true` for unsigned integer kinds.
	pub fn is_unsigned(self) -> bool {
		matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
	}

	/// `true` for signed integer kinds.
	pub fn is_signed(self) -> bool {
		matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
	}

	/// `true` when a value written as `self` can be read as `target`.
	///
	/// Integers widen within their signedness and `float` widens to `double`.
	pub fn promotes_to(self, target: DataType) -> bool {
		if self == target {
			return true;
		}
		let rank = |ty: DataType| match ty {
			Self::UInt8 | Self::Int8 => 0,
			Self::UInt16 | Self::Int16 => 1,
			Self::UInt32 | Self::Int32 => 2,
			Self::UInt64 | Self::Int64 => 3,
			_ => 4,
		};
		(self.is_unsigned() && target.is_unsigned() || self.is_signed() && target.is_signed()) && rank(self) < rank(target)
			|| self == Self::Float && target == Self::Double
	}
}

impl fmt::Display for DataType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl TryFrom<u8> for DataType {
	type Error = CodecError;

	fn try_from(id: u8) -> Result<Self> {
		Self::from_id(id)
	}
}

impl From<DataType> for u8 {
	fn from(ty: DataType) -> Self {
		ty.id()
	}
}

/// Refinement of `list<T>` encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ListSubType {
	/// Ordinary list.
	#[default]
	Plain,
	/// `nullable<T>` encoded as a zero-or-one element list.
	Nullable,
	/// `blob` encoded as a byte list.
	Blob,
}

impl TryFrom<u8> for ListSubType {
	type Error = CodecError;

	fn try_from(id: u8) -> Result<Self> {
		match id {
			0 => Ok(Self::Plain),
			1 => Ok(Self::Nullable),
			2 => Ok(Self::Blob),
			_ => Err(CodecError::InvalidSchema {
				reason: format!("unknown list subtype {id}"),
			}),
		}
	}
}

impl From<ListSubType> for u8 {
	fn from(sub: ListSubType) -> Self {
		match sub {
			ListSubType::Plain => 0,
			ListSubType::Nullable => 1,
			ListSubType::Blob => 2,
		}
	}
}

/// Field presence requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Modifier {
	/// May be absent; absent reads as the default.
	#[default]
	Optional,
	/// Must be present on read and is always written.
	Required,
	/// Always written but tolerated absent on read.
	RequiredOptional,
}

impl TryFrom<u8> for Modifier {
	type Error = CodecError;

	fn try_from(id: u8) -> Result<Self> {
		match id {
			0 => Ok(Self::Optional),
			1 => Ok(Self::Required),
			2 => Ok(Self::RequiredOptional),
			_ => Err(CodecError::InvalidSchema {
				reason: format!("unknown field modifier {id}"),
			}),
		}
	}
}

impl From<Modifier> for u8 {
	fn from(modifier: Modifier) -> Self {
		match modifier {
			Modifier::Optional => 0,
			Modifier::Required => 1,
			Modifier::RequiredOptional => 2,
		}
	}
}

/// Declared default value. Only the member matching the field kind is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variant {
	/// Default for unsigned kinds and `bool` (non-zero is `true`).
	pub uint_value: u64,
	/// Default for signed kinds.
	pub int_value: i64,
	/// Default for `float` and `double`.
	pub double_value: f64,
	/// Default for `string`.
	pub string_value: String,
	/// Default for `wstring`.
	pub wstring_value: String,
	/// No default; absent means null.
	pub nothing: bool,
}

/// Naming and default information shared by structs and fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
	/// Short name.
	pub name: String,
	/// Namespace-qualified name.
	pub qualified_name: String,
	/// Free-form IDL attributes.
	pub attributes: BTreeMap<String, String>,
	/// Presence requirement.
	pub modifier: Modifier,
	/// Declared default.
	pub default_value: Variant,
}

/// Type descriptor. Structural equality doubles as type identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeDef {
	/// Value kind.
	pub id: DataType,
	/// Index into [`SchemaDef::structs`] when `id` is `Struct`.
	pub struct_def: u16,
	/// Element type for list, set and map values.
	pub element: Option<Box<TypeDef>>,
	/// Key type for maps.
	pub key: Option<Box<TypeDef>>,
	/// Struct is carried as a lazily decoded payload.
	pub bonded_type: bool,
	/// List refinement.
	pub list_sub_type: ListSubType,
}

impl Default for TypeDef {
	fn default() -> Self {
		Self {
			id: DataType::Struct,
			struct_def: 0,
			element: None,
			key: None,
			bonded_type: false,
			list_sub_type: ListSubType::Plain,
		}
	}
}

impl TypeDef {
	/// Scalar or string type.
	pub fn scalar(id: DataType) -> Self {
		Self { id, ..Self::default() }
	}

	/// Struct type referring to `structs[index]`.
	pub fn structure(index: u16) -> Self {
		Self {
			id: DataType::Struct,
			struct_def: index,
			..Self::default()
		}
	}

	/// `bonded<T>` referring to `structs[index]`.
	pub fn bonded(index: u16) -> Self {
		Self {
			bonded_type: true,
			..Self::structure(index)
		}
	}

	/// `list<T>`
	pub fn list(element: TypeDef) -> Self {
		Self {
			id: DataType::List,
			element: Some(Box::new(element)),
			..Self::default()
		}
	}

	/// `set<T>`
	pub fn set(element: TypeDef) -> Self {
		Self {
			id: DataType::Set,
			..Self::list(element)
		}
	}

	/// `nullable<T>`
	pub fn nullable(element: TypeDef) -> Self {
		Self {
			list_sub_type: ListSubType::Nullable,
			..Self::list(element)
		}
	}

	/// `blob`
	pub fn blob() -> Self {
		Self {
			list_sub_type: ListSubType::Blob,
			..Self::list(Self::scalar(DataType::Int8))
		}
	}

	/// `map<K, V>`
	pub fn map(key: TypeDef, value: TypeDef) -> Self {
		Self {
			id: DataType::Map,
			element: Some(Box::new(value)),
			key: Some(Box::new(key)),
			..Self::default()
		}
	}

	/// Same type with the bonded wrapper removed.
	pub fn unbonded(&self) -> Self {
		Self {
			bonded_type: false,
			..self.clone()
		}
	}

	/// `true` when values of this type decode to raw bytes.
	pub fn is_blob(&self) -> bool {
		if !self.id.is_container() {
			return false;
		}
		self.list_sub_type == ListSubType::Blob || self.element.as_ref().is_some_and(|e| e.id == DataType::UInt8)
	}

	/// `true` for `nullable<T>`.
	pub fn is_nullable(&self) -> bool {
		self.id == DataType::List && self.list_sub_type == ListSubType::Nullable
	}
}

/// Field descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDef {
	/// Name, modifier and default.
	pub metadata: Metadata,
	/// Ordinal, unique within the declaring struct.
	pub id: u16,
	/// Field type.
	#[serde(rename = "type")]
	pub ty: TypeDef,
}

impl FieldDef {
	/// Optional field without a declared default.
	pub fn optional(id: u16, name: &str, ty: TypeDef) -> Self {
		Self {
			metadata: Metadata {
				name: name.to_owned(),
				qualified_name: name.to_owned(),
				..Metadata::default()
			},
			id,
			ty,
		}
	}

	/// Required field.
	pub fn required(id: u16, name: &str, ty: TypeDef) -> Self {
		let mut field = Self::optional(id, name, ty);
		field.metadata.modifier = Modifier::Required;
		field
	}

	/// Replace the declared default.
	pub fn with_default(mut self, default: Variant) -> Self {
		self.metadata.default_value = default;
		self
	}

	/// Mark the default as absent.
	pub fn with_nothing(mut self) -> Self {
		self.metadata.default_value.nothing = true;
		self
	}

	/// Field name.
	pub fn name(&self) -> &str {
		&self.metadata.name
	}

	/// `true` when the field may be left out on the wire.
	pub fn is_optional(&self) -> bool {
		self.metadata.modifier == Modifier::Optional
	}

	/// Resolve the declared default for this field.
	///
	/// Returns `None` when the default is "nothing" or when the type defaults to absent
	/// (containers, nullables, structs and bonded payloads).
	pub fn default_value(&self) -> Result<Option<Value>> {
		let default = &self.metadata.default_value;
		if default.nothing {
			return Ok(None);
		}
		let malformed = || CodecError::MalformedDefault {
			field: self.metadata.name.as_str().into(),
			kind: self.ty.id,
		};
		let unsigned_max = |bits: u32| if bits == 64 { u64::MAX } else { (1_u64 << bits) - 1 };
		let signed_fits = |bits: u32| {
			let min = -(1_i128 << (bits - 1));
			let max = (1_i128 << (bits - 1)) - 1;
			(min..=max).contains(&i128::from(default.int_value))
		};
		Ok(Some(match self.ty.id {
			DataType::Bool => Value::Bool(default.uint_value != 0),
			DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
				let bits = match self.ty.id {
					DataType::UInt8 => 8,
					DataType::UInt16 => 16,
					DataType::UInt32 => 32,
					_ => 64,
				};
				if default.uint_value > unsigned_max(bits) {
					return Err(malformed());
				}
				Value::U64(default.uint_value)
			}
			DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
				let bits = match self.ty.id {
					DataType::Int8 => 8,
					DataType::Int16 => 16,
					DataType::Int32 => 32,
					_ => 64,
				};
				if !signed_fits(bits) {
					return Err(malformed());
				}
				Value::I64(default.int_value)
			}
			DataType::Float => {
				let narrowed = default.double_value as f32;
				if default.double_value.is_finite() && !narrowed.is_finite() {
					return Err(malformed());
				}
				Value::F32(narrowed)
			}
			DataType::Double => Value::F64(default.double_value),
			DataType::String => Value::String(default.string_value.as_str().into()),
			DataType::WString => Value::String(default.wstring_value.as_str().into()),
			DataType::Struct | DataType::List | DataType::Set | DataType::Map => return Ok(None),
			DataType::Unavailable => return Err(malformed()),
		}))
	}
}

/// Struct descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructDef {
	/// Struct name and attributes.
	pub metadata: Metadata,
	/// Base struct, when the struct derives from another.
	pub base_def: Option<TypeDef>,
	/// Own fields in declaration order.
	pub fields: Vec<FieldDef>,
}

impl StructDef {
	/// Struct with the given name and fields.
	pub fn new(name: &str, fields: Vec<FieldDef>) -> Self {
		Self {
			metadata: Metadata {
				name: name.to_owned(),
				qualified_name: name.to_owned(),
				..Metadata::default()
			},
			base_def: None,
			fields,
		}
	}

	/// Derive from `structs[index]`.
	pub fn with_base(mut self, index: u16) -> Self {
		self.base_def = Some(TypeDef::structure(index));
		self
	}

	/// Struct name.
	pub fn name(&self) -> &str {
		&self.metadata.name
	}
}

/// Complete schema: struct table plus the root type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDef {
	/// All structs reachable from the root.
	pub structs: Vec<StructDef>,
	/// Root type; must be a struct.
	pub root: TypeDef,
}

impl SchemaDef {
	/// Schema over `structs` rooted at `structs[0]`.
	pub fn new(structs: Vec<StructDef>) -> Self {
		Self {
			structs,
			root: TypeDef::structure(0),
		}
	}

	/// Check the structural invariants every plan relies on.
	pub fn validate(&self) -> Result<()> {
		let invalid = |reason: String| Err(CodecError::InvalidSchema { reason });
		if self.root.id != DataType::Struct {
			return invalid(format!("root type is {}, expected struct", self.root.id));
		}
		self.validate_type(&self.root, "root")?;
		for (index, def) in self.structs.iter().enumerate() {
			if let Some(base) = &def.base_def {
				if base.id != DataType::Struct || base.bonded_type {
					return invalid(format!("base of {} is not a plain struct", def.name()));
				}
				self.validate_type(base, def.name())?;
			}
			let mut seen = std::collections::HashSet::new();
			for field in &def.fields {
				if !seen.insert(field.id) {
					return invalid(format!("duplicate field id {} in {}", field.id, def.name()));
				}
				self.validate_type(&field.ty, field.name())?;
			}

			let mut cursor = def.base_def.as_ref().map(|b| usize::from(b.struct_def));
			let mut hops = 0;
			while let Some(next) = cursor {
				if next == index || hops > self.structs.len() {
					return invalid(format!("base chain of {} is cyclic", def.name()));
				}
				hops += 1;
				cursor = self.structs.get(next).and_then(|s| s.base_def.as_ref()).map(|b| usize::from(b.struct_def));
			}
		}
		Ok(())
	}

	fn validate_type(&self, ty: &TypeDef, owner: &str) -> Result<()> {
		let invalid = |reason: String| Err(CodecError::InvalidSchema { reason });
		match ty.id {
			DataType::Struct => {
				if usize::from(ty.struct_def) >= self.structs.len() {
					return invalid(format!("{owner}: struct index {} out of range", ty.struct_def));
				}
			}
			DataType::List | DataType::Set => match &ty.element {
				Some(element) => self.validate_type(element, owner)?,
				None => return invalid(format!("{owner}: container without element type")),
			},
			DataType::Map => match (&ty.key, &ty.element) {
				(Some(key), Some(value)) => {
					if !key.id.is_scalar() {
						return invalid(format!("{owner}: map key must be a scalar"));
					}
					self.validate_type(key, owner)?;
					self.validate_type(value, owner)?;
				}
				_ => return invalid(format!("{owner}: map without key or value type")),
			},
			DataType::Unavailable => return invalid(format!("{owner}: unavailable type")),
			_ => {}
		}
		if ty.bonded_type && ty.id != DataType::Struct {
			return invalid(format!("{owner}: bonded wrapper on non-struct type"));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests;
