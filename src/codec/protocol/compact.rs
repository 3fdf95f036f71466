use bytes::{Bytes, BytesMut};

use crate::codec::bytes::{ByteCount, Cursor, Output};
use crate::codec::protocol::{ContainerHeader, FieldTag, MapHeader, ProtocolKind, ProtocolReader, ProtocolWriter, WireReader, decode_utf16le, encode_utf16le, unsigned_max};
use crate::codec::{CodecError, DataType, Result};

const STOP: u8 = 0;
const STOP_BASE: u8 = 1;
const MAX_SKIP_DEPTH: usize = 256;

/// Reader for compact binary, v1 and v2.
#[derive(Debug, Clone)]
pub struct CompactReader {
	kind: ProtocolKind,
	cursor: Cursor,
}

impl CompactReader {
	/// Reader at the start of `bytes`.
	pub fn new(kind: ProtocolKind, bytes: impl Into<Bytes>) -> Self {
		debug_assert!(matches!(kind, ProtocolKind::Compact | ProtocolKind::CompactV2));
		Self {
			kind,
			cursor: Cursor::new(bytes),
		}
	}

	fn is_v2(&self) -> bool {
		self.kind == ProtocolKind::CompactV2
	}

	fn read_type(&mut self) -> Result<DataType> {
		DataType::from_id(self.cursor.read_u8()? & 0x1f)
	}

	fn skip_at(&mut self, ty: DataType, depth: usize) -> Result<()> {
		if depth > MAX_SKIP_DEPTH {
			return Err(CodecError::LimitExceeded {
				what: "skip depth",
				value: depth,
				max: MAX_SKIP_DEPTH,
			});
		}
		match ty {
			DataType::Bool | DataType::UInt8 | DataType::Int8 => self.cursor.skip(1),
			DataType::UInt16 | DataType::UInt32 | DataType::UInt64 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
				self.cursor.read_varint().map(drop)
			}
			DataType::Float => self.cursor.skip(4),
			DataType::Double => self.cursor.skip(8),
			DataType::String => {
				let len = self.cursor.read_varint_len()?;
				self.cursor.skip(len)
			}
			DataType::WString => {
				let units = self.cursor.read_varint_len()?;
				self.cursor.skip(units.saturating_mul(2))
			}
			DataType::Struct if self.is_v2() => {
				let len = self.cursor.read_varint_len()?;
				self.cursor.skip(len)
			}
			DataType::Struct => loop {
				match self.read_field_begin()? {
					FieldTag::Field { ty, .. } => self.skip_at(ty, depth + 1)?,
					FieldTag::BaseStop => {}
					FieldTag::Stop => return Ok(()),
				}
			},
			DataType::List | DataType::Set => {
				let header = self.read_container_begin(DataType::Unavailable)?;
				match header.element {
					DataType::Bool | DataType::UInt8 | DataType::Int8 => self.cursor.skip(header.count),
					DataType::Float => self.cursor.skip(header.count.saturating_mul(4)),
					DataType::Double => self.cursor.skip(header.count.saturating_mul(8)),
					element => (0..header.count).try_for_each(|_| self.skip_at(element, depth + 1)),
				}
			}
			DataType::Map => {
				let header = self.read_map_begin(DataType::Unavailable, DataType::Unavailable)?;
				for _ in 0..header.count {
					self.skip_at(header.key, depth + 1)?;
					self.skip_at(header.value, depth + 1)?;
				}
				Ok(())
			}
			DataType::Unavailable => Err(CodecError::UnknownDataType { id: ty.id() }),
		}
	}
}

impl ProtocolReader for CompactReader {
	fn kind(&self) -> ProtocolKind {
		self.kind
	}

	fn position(&self) -> usize {
		self.cursor.pos()
	}

	fn duplicate(&self) -> Option<WireReader> {
		Some(WireReader::Compact(self.clone()))
	}

	fn read_struct_begin(&mut self) -> Result<()> {
		if self.is_v2() {
			self.cursor.read_varint_len()?;
		}
		Ok(())
	}

	fn read_field_begin(&mut self) -> Result<FieldTag> {
		let raw = self.cursor.read_u8()?;
		let ty = raw & 0x1f;
		match ty {
			STOP => return Ok(FieldTag::Stop),
			STOP_BASE => return Ok(FieldTag::BaseStop),
			_ => {}
		}
		let ty = DataType::from_id(ty)?;
		let id = match raw >> 5 {
			6 => u16::from(self.cursor.read_u8()?),
			7 => self.cursor.read_u16_le()?,
			short => u16::from(short),
		};
		Ok(FieldTag::Field { ty, id })
	}

	fn read_container_begin(&mut self, _element: DataType) -> Result<ContainerHeader> {
		let raw = self.cursor.read_u8()?;
		let element = DataType::from_id(raw & 0x1f)?;
		let packed = usize::from(raw >> 5);
		let count = if self.is_v2() && packed != 0 { packed - 1 } else { self.cursor.read_varint_len()? };
		Ok(ContainerHeader { element, count })
	}

	fn read_map_begin(&mut self, _key: DataType, _value: DataType) -> Result<MapHeader> {
		let key = self.read_type()?;
		let value = self.read_type()?;
		let count = self.cursor.read_varint_len()?;
		Ok(MapHeader { key, value, count })
	}

	fn read_bool(&mut self) -> Result<bool> {
		Ok(self.cursor.read_u8()? != 0)
	}

	fn read_unsigned(&mut self, ty: DataType) -> Result<u64> {
		let v = match ty {
			DataType::UInt8 => u64::from(self.cursor.read_u8()?),
			_ => self.cursor.read_varint()?,
		};
		if v > unsigned_max(ty) {
			return Err(CodecError::ValueOutOfRange { kind: ty });
		}
		Ok(v)
	}

	fn read_signed(&mut self, ty: DataType) -> Result<i64> {
		let v = match ty {
			DataType::Int8 => i64::from(self.cursor.read_u8()? as i8),
			_ => self.cursor.read_zigzag()?,
		};
		let (min, max) = super::signed_range(ty);
		if v < min || v > max {
			return Err(CodecError::ValueOutOfRange { kind: ty });
		}
		Ok(v)
	}

	fn read_f32(&mut self) -> Result<f32> {
		self.cursor.read_f32_le()
	}

	fn read_f64(&mut self) -> Result<f64> {
		self.cursor.read_f64_le()
	}

	fn read_string(&mut self) -> Result<String> {
		let len = self.cursor.read_varint_len()?;
		let at = self.cursor.pos();
		let raw = self.cursor.read_exact(len)?;
		String::from_utf8(raw.to_vec()).map_err(|_| CodecError::InvalidString { at })
	}

	fn read_wstring(&mut self) -> Result<String> {
		let units = self.cursor.read_varint_len()?;
		let at = self.cursor.pos();
		let raw = self.cursor.read_exact(units.saturating_mul(2))?;
		decode_utf16le(raw, at)
	}

	fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
		self.cursor.read_shared(count)
	}

	fn skip(&mut self, ty: DataType) -> Result<()> {
		self.skip_at(ty, 0)
	}

	fn skip_bytes(&mut self, n: usize) -> Result<()> {
		self.cursor.skip(n)
	}

	fn peek_bytes(&self, len: usize) -> Result<Bytes> {
		self.cursor.peek_bytes(len)
	}
}

/// Struct length bookkeeping for v2 output.
#[derive(Debug)]
enum Lengths {
	/// v1: structs are not length-prefixed.
	Off,
	/// Counting pass: record each struct's body length in begin order.
	Record { open: Vec<(usize, usize)>, sizes: Vec<usize> },
	/// Main pass: replay lengths recorded by the owned counter.
	Replay { counter: Box<CompactWriter<ByteCount>>, next: usize },
}

/// Writer for compact binary, v1 and v2.
///
/// A v2 writer must be driven through [`ProtocolWriter::first_pass`] before the main pass so
/// that every struct can be prefixed with its length.
#[derive(Debug)]
pub struct CompactWriter<O = BytesMut> {
	kind: ProtocolKind,
	out: O,
	lengths: Lengths,
}

impl CompactWriter<BytesMut> {
	/// Writer into a fresh buffer.
	pub fn new(kind: ProtocolKind) -> Self {
		let lengths = match kind {
			ProtocolKind::CompactV2 => Lengths::Replay {
				counter: Box::new(CompactWriter::counter()),
				next: 0,
			},
			_ => Lengths::Off,
		};
		Self {
			kind,
			out: BytesMut::new(),
			lengths,
		}
	}

	/// Bytes written so far.
	pub fn as_bytes(&self) -> &[u8] {
		&self.out
	}

	/// Finish and return the encoded bytes.
	pub fn into_bytes(self) -> Bytes {
		self.out.freeze()
	}
}

impl CompactWriter<ByteCount> {
	fn counter() -> Self {
		Self {
			kind: ProtocolKind::CompactV2,
			out: ByteCount::default(),
			lengths: Lengths::Record {
				open: Vec::new(),
				sizes: Vec::new(),
			},
		}
	}

	fn reset(&mut self) {
		self.out.reset();
		self.lengths = Lengths::Record {
			open: Vec::new(),
			sizes: Vec::new(),
		};
	}

	fn recorded(&self) -> &[usize] {
		match &self.lengths {
			Lengths::Record { sizes, .. } => sizes,
			_ => &[],
		}
	}
}

impl<O: Output> CompactWriter<O> {
	fn put_type(&mut self, ty: DataType) {
		self.out.put_u8(ty.id());
	}
}

impl<O: Output> ProtocolWriter for CompactWriter<O> {
	type FirstPass = CompactWriter<ByteCount>;

	fn kind(&self) -> ProtocolKind {
		self.kind
	}

	fn first_pass(&mut self) -> Option<&mut CompactWriter<ByteCount>> {
		match &mut self.lengths {
			Lengths::Replay { counter, next } => {
				counter.reset();
				*next = 0;
				Some(counter.as_mut())
			}
			_ => None,
		}
	}

	fn write_struct_begin(&mut self) -> Result<()> {
		match &mut self.lengths {
			Lengths::Off => {}
			Lengths::Record { open, sizes } => {
				open.push((sizes.len(), self.out.len()));
				sizes.push(0);
			}
			Lengths::Replay { counter, next } => {
				let len = *counter.recorded().get(*next).ok_or(CodecError::MissingFirstPass {
					protocol: self.kind,
					index: *next,
				})?;
				*next += 1;
				self.out.put_varint(len as u64);
			}
		}
		Ok(())
	}

	fn write_struct_end(&mut self) -> Result<()> {
		self.out.put_u8(STOP);
		if let Lengths::Record { open, sizes } = &mut self.lengths {
			if let Some((index, start)) = open.pop() {
				let size = self.out.len() - start;
				sizes[index] = size;
				self.out.put_varint(size as u64);
			}
		}
		Ok(())
	}

	fn write_base_end(&mut self) -> Result<()> {
		self.out.put_u8(STOP_BASE);
		Ok(())
	}

	fn write_field_begin(&mut self, ty: DataType, id: u16) -> Result<()> {
		let ty = ty.id();
		if id <= 5 {
			self.out.put_u8(((id as u8) << 5) | ty);
		} else if let Ok(short) = u8::try_from(id) {
			self.out.put_u8(0xc0 | ty);
			self.out.put_u8(short);
		} else {
			self.out.put_u8(0xe0 | ty);
			self.out.put_slice(&id.to_le_bytes());
		}
		Ok(())
	}

	fn write_bonded_empty(&mut self) -> Result<()> {
		self.write_struct_begin()?;
		self.write_struct_end()
	}

	fn write_container_begin(&mut self, element: DataType, count: usize) -> Result<()> {
		if self.kind == ProtocolKind::CompactV2 && count < 7 {
			self.out.put_u8((((count + 1) as u8) << 5) | element.id());
		} else {
			self.put_type(element);
			self.out.put_varint(count as u64);
		}
		Ok(())
	}

	fn write_map_begin(&mut self, key: DataType, value: DataType, count: usize) -> Result<()> {
		self.put_type(key);
		self.put_type(value);
		self.out.put_varint(count as u64);
		Ok(())
	}

	fn write_bool(&mut self, v: bool) -> Result<()> {
		self.out.put_u8(u8::from(v));
		Ok(())
	}

	fn write_unsigned(&mut self, ty: DataType, v: u64) -> Result<()> {
		match ty {
			DataType::UInt8 => self.out.put_u8(v as u8),
			_ => self.out.put_varint(v),
		}
		Ok(())
	}

	fn write_signed(&mut self, ty: DataType, v: i64) -> Result<()> {
		match ty {
			DataType::Int8 => self.out.put_u8(v as i8 as u8),
			_ => self.out.put_zigzag(v),
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
		self.out.put_varint(v.len() as u64);
		self.out.put_slice(v.as_bytes());
		Ok(())
	}

	fn write_wstring(&mut self, v: &str) -> Result<()> {
		let (units, raw) = encode_utf16le(v);
		self.out.put_varint(units as u64);
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
