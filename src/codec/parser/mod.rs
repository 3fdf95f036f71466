//! Sources and the struct traversal they drive.
//!
//! A [`Parser`] yields values from wire bytes or from an in-memory object. A [`Transform`] says
//! what to do with each field. [`drive`] connects the two, aligning hierarchy depths first.

use crate::codec::{DataType, LazyPayload, ProtocolKind, Result, SchemaRef, Value};

mod object;
mod wire;

pub(crate) use object::fallback;
/// In-memory source.
pub use object::{ObjectItems, ObjectParser};
/// Wire source.
pub use wire::{WireItems, WireParser};

/// Where a parser reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
	/// Encoded bytes in the given protocol.
	Wire(ProtocolKind),
	/// In-memory dynamic object.
	Object,
}

impl SourceKind {
	/// `true` for untagged wire sources, where layout follows the schema.
	pub fn is_untagged(self) -> bool {
		matches!(self, Self::Wire(kind) if !kind.is_tagged())
	}
}

/// Source of one value.
///
/// Operations must be called in the order the schema implies: containers are drained
/// before siblings are read.
pub trait Parser {
	/// Iteration contract for containers and maps.
	type Items<'a>: Items
	where
		Self: 'a;

	/// Source identity.
	fn source(&self) -> SourceKind;
	/// Kind of the value at the current position, as declared by the source.
	fn data_type(&self) -> DataType;
	/// `true` when the source holds this value as a bonded payload.
	fn is_bonded(&self) -> bool;
	/// Base links below the struct at this position; `None` when the source cannot tell.
	fn hierarchy_depth(&self) -> Option<usize>;

	/// Run `t` over the struct at this position.
	fn apply<T: Transform>(&mut self, t: &mut T) -> Result<()>;
	/// Read the scalar at this position as `expected`.
	fn scalar(&mut self, expected: DataType) -> Result<Value>;
	/// Open the list or set at this position.
	fn container(&mut self) -> Result<Self::Items<'_>>;
	/// Open the map at this position. Items alternate key then value.
	fn map(&mut self) -> Result<Self::Items<'_>>;
	/// Capture the struct at this position as a lazy payload and move past it.
	///
	/// `declared` is the schema the payload is declared with, used when the source has none.
	fn bonded(&mut self, declared: SchemaRef<'_>) -> Result<LazyPayload>;
	/// Step into a bonded payload in place. Returns `false` when the payload is empty.
	fn enter_bonded(&mut self) -> Result<bool>;
	/// Discard the value at this position.
	fn skip(&mut self) -> Result<()>;
}

/// Items of an open container or map.
pub trait Items {
	/// Source for one item.
	type Item<'a>: Parser
	where
		Self: 'a;

	/// Element kind (the value kind for maps).
	fn element_type(&self) -> DataType;
	/// Key kind for maps.
	fn key_type(&self) -> Option<DataType>;
	/// Item count when known up front; entries for maps.
	fn count(&self) -> Option<usize>;
	/// All remaining items as one byte range, when the source stores them contiguously.
	fn blob(&mut self) -> Result<Option<Vec<u8>>>;
	/// Next item source, or `None` when drained.
	fn next_item(&mut self) -> Result<Option<Self::Item<'_>>>;
}

/// Per-field behavior for one struct level.
pub trait Transform {
	/// `true` when the target level has a base.
	fn has_base(&self) -> bool;
	/// Base links below the target level.
	fn depth(&self) -> usize;
	/// Position of field `id` in the target level.
	fn slot(&self, id: u16) -> Option<usize>;
	/// Level starts.
	fn begin(&mut self) -> Result<()>;
	/// Field in `slot` is present.
	fn field<P: Parser>(&mut self, slot: usize, src: &mut P) -> Result<()>;
	/// Field in `slot` was left out by the source.
	fn omitted(&mut self, slot: usize) -> Result<()>;
	/// Source field the target does not know.
	fn unknown<P: Parser>(&mut self, _id: u16, src: &mut P) -> Result<()> {
		src.skip()
	}
	/// Base level of the source.
	fn base<P: Parser>(&mut self, src: &mut P) -> Result<()>;
	/// Level ends.
	fn end(&mut self) -> Result<()>;
}

/// Run `t` over `src`, descending into the source's base levels while the source hierarchy
/// is deeper than the target's.
pub fn drive<P: Parser, T: Transform>(src: &mut P, t: &mut T) -> Result<()> {
	match src.hierarchy_depth() {
		Some(depth) if depth > t.depth() => src.apply(&mut Aligned { inner: t }),
		_ => src.apply(t),
	}
}

/// Skips one source level and hands its base to the wrapped transform.
struct Aligned<'t, T> {
	inner: &'t mut T,
}

impl<T: Transform> Transform for Aligned<'_, T> {
	fn has_base(&self) -> bool {
		true
	}

	fn depth(&self) -> usize {
		self.inner.depth()
	}

	fn slot(&self, _id: u16) -> Option<usize> {
		None
	}

	fn begin(&mut self) -> Result<()> {
		Ok(())
	}

	fn field<P: Parser>(&mut self, _slot: usize, src: &mut P) -> Result<()> {
		src.skip()
	}

	fn omitted(&mut self, _slot: usize) -> Result<()> {
		Ok(())
	}

	fn base<P: Parser>(&mut self, src: &mut P) -> Result<()> {
		drive(src, &mut *self.inner)
	}

	fn end(&mut self) -> Result<()> {
		Ok(())
	}
}

/// Canonical value shape for `expected`, widening where the kinds allow.
pub(crate) fn coerce_scalar(value: &Value, expected: DataType) -> Result<Value> {
	let shape = || value.shape_error(expected);
	Ok(match expected {
		DataType::Bool => match value {
			Value::Bool(v) => Value::Bool(*v),
			_ => return Err(shape()),
		},
		ty if ty.is_unsigned() => match value {
			Value::U64(_) | Value::I64(_) => Value::U64(value.as_u64().ok_or(crate::codec::CodecError::ValueOutOfRange { kind: ty })?),
			_ => return Err(shape()),
		},
		ty if ty.is_signed() => match value {
			Value::U64(_) | Value::I64(_) => Value::I64(value.as_i64().ok_or(crate::codec::CodecError::ValueOutOfRange { kind: ty })?),
			_ => return Err(shape()),
		},
		DataType::Float => match value {
			Value::F32(v) => Value::F32(*v),
			Value::F64(v) => Value::F32(*v as f32),
			_ => return Err(shape()),
		},
		DataType::Double => Value::F64(value.as_f64().ok_or_else(shape)?),
		DataType::String | DataType::WString => match value {
			Value::String(s) => Value::String(s.clone()),
			_ => return Err(shape()),
		},
		_ => return Err(shape()),
	})
}

/// Byte containers only accept byte-sized elements.
pub(crate) fn blob_element(element: DataType) -> Result<()> {
	match element {
		DataType::UInt8 | DataType::Int8 => Ok(()),
		got => Err(crate::codec::CodecError::TypeMismatch { expected: DataType::Int8, got }),
	}
}

/// One byte of a byte container read item by item.
pub(crate) fn blob_byte(value: &Value, element: DataType) -> Result<u8> {
	let out_of_range = || crate::codec::CodecError::ValueOutOfRange { kind: element };
	match value {
		Value::U64(b) => u8::try_from(*b).map_err(|_| out_of_range()),
		Value::I64(b) => i8::try_from(*b).map(|b| b as u8).map_err(|_| out_of_range()),
		other => Err(other.shape_error(element)),
	}
}
