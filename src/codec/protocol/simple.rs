use bytes::{Bytes, BytesMut};

use crate::codec::bytes::{Cursor, Output};
use crate::codec::protocol::{ContainerHeader, FieldTag, MapHeader, ProtocolKind, ProtocolReader, ProtocolWriter, WireReader, decode_utf16le, encode_utf16le};
use crate::codec::{CodecError, DataType, Result};

/// Reader for simple binary: fixed-width little-endian values, `u32` counts, no markers.
#[derive(Debug, Clone)]
pub struct SimpleReader {
	cursor: Cursor,
}

impl SimpleReader {
	/// Reader at the start of `bytes`.
	pub fn new(bytes: impl Into<Bytes>) -> Self {
		Self { cursor: Cursor::new(bytes) }
	}

	fn read_len(&mut self) -> Result<usize> {
		Ok(self.cursor.read_u32_le()? as usize)
	}

	fn untagged() -> CodecError {
		CodecError::MissingSourceSchema {
			protocol: ProtocolKind::Simple,
		}
	}
}

fn width(ty: DataType) -> Option<usize> {
	match ty {
		DataType::Bool | DataType::UInt8 | DataType::Int8 => Some(1),
		DataType::UInt16 | DataType::Int16 => Some(2),
		DataType::UInt32 | DataType::Int32 | DataType::Float => Some(4),
		DataType::UInt64 | DataType::Int64 | DataType::Double => Some(8),
		_ => None,
	}
}

impl ProtocolReader for SimpleReader {
	fn kind(&self) -> ProtocolKind {
		ProtocolKind::Simple
	}

	fn position(&self) -> usize {
		self.cursor.pos()
	}

	fn duplicate(&self) -> Option<WireReader> {
		Some(WireReader::Simple(self.clone()))
	}

	fn read_struct_begin(&mut self) -> Result<()> {
		Ok(())
	}

	fn read_field_begin(&mut self) -> Result<FieldTag> {
		Err(Self::untagged())
	}

	fn read_bonded_begin(&mut self) -> Result<Option<usize>> {
		self.read_len().map(Some)
	}

	fn read_container_begin(&mut self, element: DataType) -> Result<ContainerHeader> {
		let count = self.read_len()?;
		Ok(ContainerHeader { element, count })
	}

	fn read_map_begin(&mut self, key: DataType, value: DataType) -> Result<MapHeader> {
		let count = self.read_len()?;
		Ok(MapHeader { key, value, count })
	}

	fn read_bool(&mut self) -> Result<bool> {
		Ok(self.cursor.read_u8()? != 0)
	}

	fn read_unsigned(&mut self, ty: DataType) -> Result<u64> {
		Ok(match ty {
			DataType::UInt8 => u64::from(self.cursor.read_u8()?),
			DataType::UInt16 => u64::from(self.cursor.read_u16_le()?),
			DataType::UInt32 => u64::from(self.cursor.read_u32_le()?),
			_ => self.cursor.read_u64_le()?,
		})
	}

	fn read_signed(&mut self, ty: DataType) -> Result<i64> {
		Ok(match ty {
			DataType::Int8 => i64::from(self.cursor.read_u8()? as i8),
			DataType::Int16 => i64::from(self.cursor.read_u16_le()? as i16),
			DataType::Int32 => i64::from(self.cursor.read_u32_le()? as i32),
			_ => self.cursor.read_u64_le()? as i64,
		})
	}

	fn read_f32(&mut self) -> Result<f32> {
		self.cursor.read_f32_le()
	}

	fn read_f64(&mut self) -> Result<f64> {
		self.cursor.read_f64_le()
	}

	fn read_string(&mut self) -> Result<String> {
		let len = self.read_len()?;
		let at = self.cursor.pos();
		let raw = self.cursor.read_exact(len)?;
		String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidString { at })
	}

	fn read_wstring(&mut self) -> Result<String> {
		let units = self.read_len()?;
		let at = self.cursor.pos();
		let raw = self.cursor.read_exact(units.saturating_mul(2))?;
		decode_utf16le(raw, at)
	}

	fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
		self.cursor.read_shared(count)
	}

	fn skip(&mut self, ty: DataType) -> Result<()> {
		if let Some(n) = width(ty) {
			return self.cursor.skip(n);
		}
		match ty {
			DataType::String => {
				let len = self.read_len()?;
				self.cursor.skip(len)
			}
			DataType::WString => {
				let units = self.read_len()?;
				self.cursor.skip(units.saturating_mul(2))
			}
			_ => Err(Self::untagged()),
		}
	}

	fn skip_bytes(&mut self, n: usize) -> Result<()> {
		self.cursor.skip(n)
	}

	fn peek_bytes(&self, len: usize) -> Result<Bytes> {
		self.cursor.peek_bytes(len)
	}
}

/// Writer for simple binary.
///
/// Every field is written in schema order and nothing may be left out. Bonded payloads are
/// framed with a `u32` byte length, zero meaning an empty payload.
#[derive(Debug, Default)]
pub struct SimpleWriter {
	out: BytesMut,
	frames: Vec<usize>,
}

impl SimpleWriter {
	/// Writer into a fresh buffer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Bytes written so far.
	pub fn as_bytes(&self) -> &[u8] {
		&self.out
	}

	/// Finish and return the encoded bytes.
	pub fn into_bytes(self) -> Bytes {
		self.out.freeze()
	}

	fn put_len(&mut self, len: usize) -> Result<()> {
		let len = u32::try_from(len).map_err(|_| CodecError::ValueOutOfRange { kind: DataType::UInt32 })?;
		self.out.put_slice(&len.to_le_bytes());
		Ok(())
	}
}

impl ProtocolWriter for SimpleWriter {
	type FirstPass = SimpleWriter;

	fn kind(&self) -> ProtocolKind {
		ProtocolKind::Simple
	}

	fn write_struct_begin(&mut self) -> Result<()> {
		Ok(())
	}

	fn write_struct_end(&mut self) -> Result<()> {
		Ok(())
	}

	fn write_base_end(&mut self) -> Result<()> {
		Ok(())
	}

	fn write_field_begin(&mut self, _ty: DataType, _id: u16) -> Result<()> {
		Ok(())
	}

	fn write_bonded_begin(&mut self) -> Result<()> {
		self.frames.push(Output::len(&self.out));
		self.out.put_slice(&[0; 4]);
		Ok(())
	}

	fn write_bonded_end(&mut self) -> Result<()> {
		let Some(start) = self.frames.pop() else {
			return Ok(());
		};
		let len = Output::len(&self.out) - start - 4;
		let len = u32::try_from(len).map_err(|_| CodecError::ValueOutOfRange { kind: DataType::UInt32 })?;
		self.out[start..start + 4].copy_from_slice(&len.to_le_bytes());
		Ok(())
	}

	fn write_bonded_empty(&mut self) -> Result<()> {
		self.put_len(0)
	}

	fn write_container_begin(&mut self, _element: DataType, count: usize) -> Result<()> {
		self.put_len(count)
	}

	fn write_map_begin(&mut self, _key: DataType, _value: DataType, count: usize) -> Result<()> {
		self.put_len(count)
	}

	fn write_bool(&mut self, v: bool) -> Result<()> {
		self.out.put_u8(u8::from(v));
		Ok(())
	}

	fn write_unsigned(&mut self, ty: DataType, v: u64) -> Result<()> {
		match ty {
			DataType::UInt8 => self.out.put_u8(v as u8),
			DataType::UInt16 => self.out.put_slice(&(v as u16).to_le_bytes()),
			DataType::UInt32 => self.out.put_slice(&(v as u32).to_le_bytes()),
			_ => self.out.put_slice(&v.to_le_bytes()),
		}
		Ok(())
	}

	fn write_signed(&mut self, ty: DataType, v: i64) -> Result<()> {
		match ty {
			DataType::Int8 => self.out.put_u8(v as i8 as u8),
			DataType::Int16 => self.out.put_slice(&(v as i16).to_le_bytes()),
			DataType::Int32 => self.out.put_slice(&(v as i32).to_le_bytes()),
			_ => self.out.put_slice(&v.to_le_bytes()),
		}
		Ok(())
	}

	fn write_f32(&mut self, v: f32) -> Result<()> {
		self.out.put_slice(&v.to_le_bytes());
		Ok(())
	}

	fn write_f64(&mut self, v: f64) -> Result<()> {
		self.out.put_slice(&v.to_le_bytes());
		Ok(())
	}

	fn write_string(&mut self, v: &str) -> Result<()> {
		self.put_len(v.len())?;
		self.out.put_slice(v.as_bytes());
		Ok(())
	}

	fn write_wstring(&mut self, v: &str) -> Result<()> {
		let (units, raw) = encode_utf16le(v);
		self.put_len(units)?;
		self.out.put_slice(&raw);
		Ok(())
	}

	fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
		self.out.put_slice(v);
		Ok(())
	}

	fn write_raw(&mut self, v: &[u8]) -> Result<()> {
		self.out.put_slice(v);
		Ok(())
	}
}
