//! Wire protocol readers and writers.
//!
//! Tagged protocols describe every field inline and can be skipped without a schema.
//! Untagged protocols lay fields out in schema order and rely on the schema to read.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::codec::{CodecError, DataType, Result, Value};

mod compact;
mod simple;

pub use compact::{CompactReader, CompactWriter};
pub use simple::{SimpleReader, SimpleWriter};

/// Closed set of supported protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
	/// Tagged compact binary.
	Compact,
	/// Tagged compact binary with length-prefixed structs; written in two passes.
	CompactV2,
	/// Untagged fixed-width binary.
	Simple,
}

impl ProtocolKind {
	/// Every protocol, in display order.
	pub const ALL: [ProtocolKind; 3] = [Self::Compact, Self::CompactV2, Self::Simple];

	/// `true` when fields carry inline id and type markers.
	pub fn is_tagged(self) -> bool {
		!matches!(self, Self::Simple)
	}

	/// `true` when writing needs a counting first pass.
	pub fn is_two_pass(self) -> bool {
		matches!(self, Self::CompactV2)
	}

	/// Canonical lowercase name.
	pub fn name(self) -> &'static str {
		match self {
			Self::Compact => "compact",
			Self::CompactV2 => "compact-v2",
			Self::Simple => "simple",
		}
	}

	/// Reader over `bytes` for this protocol.
	pub fn reader(self, bytes: impl Into<Bytes>) -> WireReader {
		match self {
			Self::Compact | Self::CompactV2 => WireReader::Compact(CompactReader::new(self, bytes)),
			Self::Simple => WireReader::Simple(SimpleReader::new(bytes)),
		}
	}
}

impl fmt::Display for ProtocolKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for ProtocolKind {
	type Err = CodecError;

	fn from_str(s: &str) -> Result<Self> {
		match s.to_ascii_lowercase().as_str() {
			"compact" | "compact-v1" | "cb" => Ok(Self::Compact),
			"compact-v2" | "compact2" | "cb2" => Ok(Self::CompactV2),
			"simple" | "sp" => Ok(Self::Simple),
			_ => Err(CodecError::UnknownProtocol { name: s.to_owned() }),
		}
	}
}

/// Result of reading a field header from a tagged reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTag {
	/// Field with its wire kind and id.
	Field {
		/// Wire kind.
		ty: DataType,
		/// Field id.
		id: u16,
	},
	/// End of one base level; more derived levels follow.
	BaseStop,
	/// End of the struct.
	Stop,
}

/// Container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
	/// Element kind.
	pub element: DataType,
	/// Element count.
	pub count: usize,
}

/// Map header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
	/// Key kind.
	pub key: DataType,
	/// Value kind.
	pub value: DataType,
	/// Entry count.
	pub count: usize,
}

/// Pull reader over one protocol.
///
/// Untagged readers echo the kinds they are given since the wire carries none.
pub trait ProtocolReader {
	/// Protocol this reader decodes.
	fn kind(&self) -> ProtocolKind;
	/// Current byte offset.
	fn position(&self) -> usize;
	/// Independent reader at the current offset, or `None` when duplication is impossible.
	fn duplicate(&self) -> Option<WireReader>;

	/// Enter the outermost level of a struct.
	fn read_struct_begin(&mut self) -> Result<()>;
	/// Leave the outermost level of a struct.
	fn read_struct_end(&mut self) -> Result<()> {
		Ok(())
	}
	/// Read the next field header. Tagged readers only.
	fn read_field_begin(&mut self) -> Result<FieldTag>;
	/// Finish a field.
	fn read_field_end(&mut self) -> Result<()> {
		Ok(())
	}
	/// Read the frame in front of a bonded payload. `Some(0)` marks an empty payload.
	fn read_bonded_begin(&mut self) -> Result<Option<usize>> {
		Ok(None)
	}
	/// Read a list or set header.
	fn read_container_begin(&mut self, element: DataType) -> Result<ContainerHeader>;
	/// Read a map header.
	fn read_map_begin(&mut self, key: DataType, value: DataType) -> Result<MapHeader>;

	/// Read a `bool`.
	fn read_bool(&mut self) -> Result<bool>;
	/// Read an unsigned integer stored with the given kind.
	fn read_unsigned(&mut self, ty: DataType) -> Result<u64>;
	/// Read a signed integer stored with the given kind.
	fn read_signed(&mut self, ty: DataType) -> Result<i64>;
	/// Read a `float`.
	fn read_f32(&mut self) -> Result<f32>;
	/// Read a `double`.
	fn read_f64(&mut self) -> Result<f64>;
	/// Read a UTF-8 `string`.
	fn read_string(&mut self) -> Result<String>;
	/// Read a UTF-16 `wstring`.
	fn read_wstring(&mut self) -> Result<String>;
	/// Read `count` raw bytes of a byte container.
	fn read_bytes(&mut self, count: usize) -> Result<Bytes>;

	/// Skip a value of the given kind without a schema. Tagged readers only.
	fn skip(&mut self, ty: DataType) -> Result<()>;
	/// Skip `n` raw bytes.
	fn skip_bytes(&mut self, n: usize) -> Result<()>;
	/// Shared view of `len` bytes at the current offset.
	fn peek_bytes(&self, len: usize) -> Result<Bytes>;
}

/// Push writer over one protocol.
pub trait ProtocolWriter {
	/// Writer that receives the counting pass.
	type FirstPass: ProtocolWriter;

	/// Protocol this writer encodes.
	fn kind(&self) -> ProtocolKind;
	/// Prepare and return the first-pass writer, when this protocol needs one.
	fn first_pass(&mut self) -> Option<&mut Self::FirstPass> {
		None
	}

	/// Open the outermost level of a struct.
	fn write_struct_begin(&mut self) -> Result<()>;
	/// Close the outermost level of a struct.
	fn write_struct_end(&mut self) -> Result<()>;
	/// Open a base level.
	fn write_base_begin(&mut self) -> Result<()> {
		Ok(())
	}
	/// Close a base level.
	fn write_base_end(&mut self) -> Result<()>;
	/// Emit a field header.
	fn write_field_begin(&mut self, ty: DataType, id: u16) -> Result<()>;
	/// Finish a field.
	fn write_field_end(&mut self) -> Result<()> {
		Ok(())
	}
	/// Record that a field was left out.
	fn write_field_omitted(&mut self, _ty: DataType, _id: u16) -> Result<()> {
		Ok(())
	}
	/// Open a bonded payload frame.
	fn write_bonded_begin(&mut self) -> Result<()> {
		Ok(())
	}
	/// Close a bonded payload frame.
	fn write_bonded_end(&mut self) -> Result<()> {
		Ok(())
	}
	/// Emit an empty bonded payload.
	fn write_bonded_empty(&mut self) -> Result<()>;
	/// Emit a list or set header.
	fn write_container_begin(&mut self, element: DataType, count: usize) -> Result<()>;
	/// Finish a list or set.
	fn write_container_end(&mut self) -> Result<()> {
		Ok(())
	}
	/// Emit a map header.
	fn write_map_begin(&mut self, key: DataType, value: DataType, count: usize) -> Result<()>;

	/// Write a `bool`.
	fn write_bool(&mut self, v: bool) -> Result<()>;
	/// Write an unsigned integer with the given kind.
	fn write_unsigned(&mut self, ty: DataType, v: u64) -> Result<()>;
	/// Write a signed integer with the given kind.
	fn write_signed(&mut self, ty: DataType, v: i64) -> Result<()>;
	/// Write a `float`.
	fn write_f32(&mut self, v: f32) -> Result<()>;
	/// Write a `double`.
	fn write_f64(&mut self, v: f64) -> Result<()>;
	/// Write a UTF-8 `string`.
	fn write_string(&mut self, v: &str) -> Result<()>;
	/// Write a UTF-16 `wstring`.
	fn write_wstring(&mut self, v: &str) -> Result<()>;
	/// Write raw bytes of a byte container after its header.
	fn write_bytes(&mut self, v: &[u8]) -> Result<()>;
	/// Copy an already encoded value verbatim.
	fn write_raw(&mut self, v: &[u8]) -> Result<()>;
}

/// Built-in readers behind one type, used where a reader must be stored.
#[derive(Debug, Clone)]
pub enum WireReader {
	/// Compact v1 or v2.
	Compact(CompactReader),
	/// Simple binary.
	Simple(SimpleReader),
}

macro_rules! dispatch {
	($self:ident, $r:ident => $body:expr) => {
		match $self {
			WireReader::Compact($r) => $body,
			WireReader::Simple($r) => $body,
		}
	};
}

impl ProtocolReader for WireReader {
	fn kind(&self) -> ProtocolKind {
		dispatch!(self, r => r.kind())
	}

	fn position(&self) -> usize {
		dispatch!(self, r => r.position())
	}

	fn duplicate(&self) -> Option<WireReader> {
		Some(self.clone())
	}

	fn read_struct_begin(&mut self) -> Result<()> {
		dispatch!(self, r => r.read_struct_begin())
	}

	fn read_struct_end(&mut self) -> Result<()> {
		dispatch!(self, r => r.read_struct_end())
	}

	fn read_field_begin(&mut self) -> Result<FieldTag> {
		dispatch!(self, r => r.read_field_begin())
	}

	fn read_field_end(&mut self) -> Result<()> {
		dispatch!(self, r => r.read_field_end())
	}

	fn read_bonded_begin(&mut self) -> Result<Option<usize>> {
		dispatch!(self, r => r.read_bonded_begin())
	}

	fn read_container_begin(&mut self, element: DataType) -> Result<ContainerHeader> {
		dispatch!(self, r => r.read_container_begin(element))
	}

	fn read_map_begin(&mut self, key: DataType, value: DataType) -> Result<MapHeader> {
		dispatch!(self, r => r.read_map_begin(key, value))
	}

	fn read_bool(&mut self) -> Result<bool> {
		dispatch!(self, r => r.read_bool())
	}

	fn read_unsigned(&mut self, ty: DataType) -> Result<u64> {
		dispatch!(self, r => r.read_unsigned(ty))
	}

	fn read_signed(&mut self, ty: DataType) -> Result<i64> {
		dispatch!(self, r => r.read_signed(ty))
	}

	fn read_f32(&mut self) -> Result<f32> {
		dispatch!(self, r => r.read_f32())
	}

	fn read_f64(&mut self) -> Result<f64> {
		dispatch!(self, r => r.read_f64())
	}

	fn read_string(&mut self) -> Result<String> {
		dispatch!(self, r => r.read_string())
	}

	fn read_wstring(&mut self) -> Result<String> {
		dispatch!(self, r => r.read_wstring())
	}

	fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
		dispatch!(self, r => r.read_bytes(count))
	}

	fn skip(&mut self, ty: DataType) -> Result<()> {
		dispatch!(self, r => r.skip(ty))
	}

	fn skip_bytes(&mut self, n: usize) -> Result<()> {
		dispatch!(self, r => r.skip_bytes(n))
	}

	fn peek_bytes(&self, len: usize) -> Result<Bytes> {
		dispatch!(self, r => r.peek_bytes(len))
	}
}

/// Read one scalar of kind `ty` into its canonical [`Value`] shape.
pub fn read_scalar<R: ProtocolReader + ?Sized>(reader: &mut R, ty: DataType) -> Result<Value> {
	Ok(match ty {
		DataType::Bool => Value::Bool(reader.read_bool()?),
		DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => Value::U64(reader.read_unsigned(ty)?),
		DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => Value::I64(reader.read_signed(ty)?),
		DataType::Float => Value::F32(reader.read_f32()?),
		DataType::Double => Value::F64(reader.read_f64()?),
		DataType::String => Value::String(reader.read_string()?.into_boxed_str()),
		DataType::WString => Value::String(reader.read_wstring()?.into_boxed_str()),
		other => {
			return Err(CodecError::TypeMismatch {
				expected: DataType::String,
				got: other,
			});
		}
	})
}

/// Write `value` as kind `ty`, checking that it fits.
pub fn write_scalar<W: ProtocolWriter + ?Sized>(writer: &mut W, ty: DataType, value: &Value) -> Result<()> {
	let out_of_range = || CodecError::ValueOutOfRange { kind: ty };
	match ty {
		DataType::Bool => match value {
			Value::Bool(v) => writer.write_bool(*v),
			other => Err(other.shape_error(ty)),
		},
		DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => {
			let v = match value {
				Value::U64(_) | Value::I64(_) => value.as_u64().ok_or_else(out_of_range)?,
				other => return Err(other.shape_error(ty)),
			};
			if v > unsigned_max(ty) {
				return Err(out_of_range());
			}
			writer.write_unsigned(ty, v)
		}
		DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
			let v = match value {
				Value::U64(_) | Value::I64(_) => value.as_i64().ok_or_else(out_of_range)?,
				other => return Err(other.shape_error(ty)),
			};
			let (min, max) = signed_range(ty);
			if v < min || v > max {
				return Err(out_of_range());
			}
			writer.write_signed(ty, v)
		}
		DataType::Float => match value {
			Value::F32(v) => writer.write_f32(*v),
			Value::F64(v) => writer.write_f32(*v as f32),
			other => Err(other.shape_error(ty)),
		},
		DataType::Double => match value.as_f64() {
			Some(v) => writer.write_f64(v),
			None => Err(value.shape_error(ty)),
		},
		DataType::String => match value {
			Value::String(s) => writer.write_string(s),
			other => Err(other.shape_error(ty)),
		},
		DataType::WString => match value {
			Value::String(s) => writer.write_wstring(s),
			other => Err(other.shape_error(ty)),
		},
		other => Err(value.shape_error(other)),
	}
}

/// Largest value an unsigned kind holds.
pub fn unsigned_max(ty: DataType) -> u64 {
	match ty {
		DataType::UInt8 => u64::from(u8::MAX),
		DataType::UInt16 => u64::from(u16::MAX),
		DataType::UInt32 => u64::from(u32::MAX),
		_ => u64::MAX,
	}
}

/// Inclusive range of a signed kind.
pub fn signed_range(ty: DataType) -> (i64, i64) {
	match ty {
		DataType::Int8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
		DataType::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
		DataType::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
		_ => (i64::MIN, i64::MAX),
	}
}

/// Decode UTF-16LE code units.
pub(crate) fn decode_utf16le(raw: &[u8], at: usize) -> Result<String> {
	let units: Vec<u16> = raw.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
	String::from_utf16(&units).map_err(|_| CodecError::InvalidString { at })
}

/// Encode as UTF-16LE code units, returning the unit count and bytes.
pub(crate) fn encode_utf16le(s: &str) -> (usize, Vec<u8>) {
	let mut out = Vec::with_capacity(s.len() * 2);
	let mut units = 0;
	for unit in s.encode_utf16() {
		out.extend_from_slice(&unit.to_le_bytes());
		units += 1;
	}
	(units, out)
}

#[cfg(test)]
mod tests;
