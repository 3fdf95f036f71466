use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{CodecError, Result};

/// Bounded cursor over a shared, immutable byte buffer.
///
/// Cloning copies the offset and bumps the buffer refcount; clones advance independently.
#[derive(Debug, Clone)]
pub struct Cursor {
	bytes: Bytes,
	pos: usize,
}

impl Cursor {
	/// Create a cursor at position 0.
	pub fn new(bytes: impl Into<Bytes>) -> Self {
		Self { bytes: bytes.into(), pos: 0 }
	}

	/// Return current byte offset.
	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Return remaining unread bytes.
	pub fn remaining(&self) -> usize {
		self.bytes.len().saturating_sub(self.pos)
	}

	/// Shared view of `len` bytes starting at the current offset, without advancing.
	pub fn peek_bytes(&self, len: usize) -> Result<Bytes> {
		self.check(len)?;
		Ok(self.bytes.slice(self.pos..self.pos + len))
	}

	fn check(&self, n: usize) -> Result<()> {
		if n > self.remaining() {
			return Err(CodecError::UnexpectedEof {
				at: self.pos,
				need: n,
				rem: self.remaining(),
			});
		}
		Ok(())
	}

	/// Read exactly `n` bytes and advance cursor.
	pub fn read_exact(&mut self, n: usize) -> Result<&[u8]> {
		self.check(n)?;
		let start = self.pos;
		self.pos += n;
		Ok(&self.bytes[start..self.pos])
	}

	/// Read `n` bytes as a shared slice and advance cursor.
	pub fn read_shared(&mut self, n: usize) -> Result<Bytes> {
		let out = self.peek_bytes(n)?;
		self.pos += n;
		Ok(out)
	}

	/// Advance without reading.
	pub fn skip(&mut self, n: usize) -> Result<()> {
		self.check(n)?;
		self.pos += n;
		Ok(())
	}

	fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
		let raw = self.read_exact(N)?;
		let mut out = [0_u8; N];
		out.copy_from_slice(raw);
		Ok(out)
	}

	/// Read one byte.
	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.read_array::<1>()?[0])
	}

	/// Read a little-endian `u16`.
	pub fn read_u16_le(&mut self) -> Result<u16> {
		self.read_array().map(u16::from_le_bytes)
	}

	/// Read a little-endian `u32`.
	pub fn read_u32_le(&mut self) -> Result<u32> {
		self.read_array().map(u32::from_le_bytes)
	}

	/// Read a little-endian `u64`.
	pub fn read_u64_le(&mut self) -> Result<u64> {
		self.read_array().map(u64::from_le_bytes)
	}

	/// Read a little-endian `f32`.
	pub fn read_f32_le(&mut self) -> Result<f32> {
		self.read_array().map(f32::from_le_bytes)
	}

	/// Read a little-endian `f64`.
	pub fn read_f64_le(&mut self) -> Result<f64> {
		self.read_array().map(f64::from_le_bytes)
	}

	/// Read an unsigned LEB128 varint of at most 64 bits.
	pub fn read_varint(&mut self) -> Result<u64> {
		let start = self.pos;
		let mut value = 0_u64;
		for shift in (0..64).step_by(7) {
			let byte = self.read_u8()?;
			value |= u64::from(byte & 0x7f) << shift;
			if byte & 0x80 == 0 {
				return Ok(value);
			}
		}
		Err(CodecError::VarintOverflow { at: start })
	}

	/// Read a zigzag-encoded signed varint.
	pub fn read_zigzag(&mut self) -> Result<i64> {
		let raw = self.read_varint()?;
		Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
	}

	/// Read a varint that must fit in `usize`.
	pub fn read_varint_len(&mut self) -> Result<usize> {
		let at = self.pos;
		let raw = self.read_varint()?;
		usize::try_from(raw).map_err(|_| CodecError::VarintOverflow { at })
	}
}

/// Byte sink used by writers. The first pass of a two-pass write only counts.
pub trait Output {
	/// Append one byte.
	fn put_u8(&mut self, byte: u8);
	/// Append a slice.
	fn put_slice(&mut self, bytes: &[u8]);
	/// Bytes written so far.
	fn len(&self) -> usize;
	/// `true` when nothing was written.
	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Append an unsigned LEB128 varint.
	fn put_varint(&mut self, mut value: u64) {
		while value >= 0x80 {
			self.put_u8((value as u8) | 0x80);
			value >>= 7;
		}
		self.put_u8(value as u8);
	}

	/// Append a zigzag-encoded signed varint.
	fn put_zigzag(&mut self, value: i64) {
		self.put_varint(((value << 1) ^ (value >> 63)) as u64);
	}
}

impl Output for BytesMut {
	fn put_u8(&mut self, byte: u8) {
		BufMut::put_u8(self, byte);
	}

	fn put_slice(&mut self, bytes: &[u8]) {
		self.extend_from_slice(bytes);
	}

	fn len(&self) -> usize {
		BytesMut::len(self)
	}
}

/// Output that discards bytes and keeps a count.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteCount(usize);

impl ByteCount {
	/// Account for `n` bytes without producing them.
	pub fn add(&mut self, n: usize) {
		self.0 += n;
	}

	/// Reset to zero.
	pub fn reset(&mut self) {
		self.0 = 0;
	}
}

impl Output for ByteCount {
	fn put_u8(&mut self, _byte: u8) {
		self.0 += 1;
	}

	fn put_slice(&mut self, bytes: &[u8]) {
		self.0 += bytes.len();
	}

	fn len(&self) -> usize {
		self.0
	}

	fn put_varint(&mut self, value: u64) {
		self.0 += varint_len(value);
	}
}

/// Encoded width of an unsigned varint.
pub fn varint_len(value: u64) -> usize {
	let bits = 64 - value.leading_zeros().min(63) as usize;
	bits.div_ceil(7)
}
