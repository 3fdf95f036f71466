mod bonded;
mod bytes;
mod clone;
mod deserialize;
mod error;
mod factory;
mod parser;
mod protocol;
mod registry;
mod schema;
mod serialize;
mod transcode;
mod value;

/// Deferred sub-payloads.
pub use bonded::LazyPayload;
/// Object-to-object copies through a decode plan.
pub use clone::Cloner;
/// Decode plans and their limits.
pub use deserialize::{DecodeLimits, Deserializer};
/// Error and result aliases.
pub use error::{CodecError, Result};
/// Construction override hook.
pub use factory::{Construct, DefaultFactory, RuntimeFactory};
/// Sources and the traversal they drive.
pub use parser::{Items, ObjectItems, ObjectParser, Parser, SourceKind, Transform, WireItems, WireParser, drive};
/// Protocol readers, writers and wire-level helpers.
pub use protocol::{
	CompactReader, CompactWriter, ContainerHeader, FieldTag, MapHeader, ProtocolKind, ProtocolReader, ProtocolWriter, SimpleReader, SimpleWriter, WireReader,
	read_scalar, write_scalar,
};
/// Process-wide plan cache.
pub use registry::PlanRegistry;
/// Schema model.
pub use schema::{DataType, FieldDef, ListSubType, Metadata, Modifier, RuntimeSchema, SchemaDef, SchemaRef, StructDef, TypeDef, Variant};
/// Write plans.
pub use serialize::{PlanOptions, Serializer};
/// Protocol-to-protocol conversion.
pub use transcode::Transcoder;
/// Dynamic object model.
pub use value::{DynamicObject, MapKey, MapValue, Value};

/// Decode one struct of `schema` from `bytes`.
pub fn from_bytes(bytes: impl Into<::bytes::Bytes>, schema: &RuntimeSchema, protocol: ProtocolKind) -> Result<DynamicObject> {
	let mut reader = protocol.reader(bytes);
	Deserializer::new(schema.clone())?.deserialize(&mut reader)
}

/// Encode `obj` as one struct of `schema`.
pub fn to_bytes(obj: &DynamicObject, schema: &RuntimeSchema, protocol: ProtocolKind) -> Result<::bytes::Bytes> {
	let serializer = Serializer::new(schema.clone(), protocol)?;
	match protocol {
		ProtocolKind::Compact | ProtocolKind::CompactV2 => {
			let mut writer = CompactWriter::new(protocol);
			serializer.serialize(&mut writer, obj)?;
			Ok(writer.into_bytes())
		}
		ProtocolKind::Simple => {
			let mut writer = SimpleWriter::new();
			serializer.serialize(&mut writer, obj)?;
			Ok(writer.into_bytes())
		}
	}
}

/// Convert one struct of `schema` from protocol `from` to protocol `to`.
pub fn transcode_bytes(bytes: impl Into<::bytes::Bytes>, schema: &RuntimeSchema, from: ProtocolKind, to: ProtocolKind) -> Result<::bytes::Bytes> {
	let transcoder = Transcoder::new(schema.clone(), from, to)?;
	let mut reader = from.reader(bytes);
	match to {
		ProtocolKind::Compact | ProtocolKind::CompactV2 => {
			let mut writer = CompactWriter::new(to);
			transcoder.transcode(&mut reader, &mut writer)?;
			Ok(writer.into_bytes())
		}
		ProtocolKind::Simple => {
			let mut writer = SimpleWriter::new();
			transcoder.transcode(&mut reader, &mut writer)?;
			Ok(writer.into_bytes())
		}
	}
}
