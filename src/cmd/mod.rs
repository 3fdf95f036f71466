use std::path::Path;

use bondrt::codec::{CodecError, ProtocolKind, Result, RuntimeSchema};
use clap::ValueEnum;

/// Payload decode command.
pub mod decode;
/// Schema summary command.
pub mod schema;
/// Protocol conversion command.
pub mod transcode;

/// Protocol names accepted on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Protocol {
	/// Tagged compact binary.
	Compact,
	/// Tagged compact binary with length-prefixed structs.
	#[value(name = "compact-v2")]
	CompactV2,
	/// Untagged fixed-width binary.
	Simple,
}

impl From<Protocol> for ProtocolKind {
	fn from(protocol: Protocol) -> Self {
		match protocol {
			Protocol::Compact => ProtocolKind::Compact,
			Protocol::CompactV2 => ProtocolKind::CompactV2,
			Protocol::Simple => ProtocolKind::Simple,
		}
	}
}

/// Load a schema and view either its root or the named struct.
pub(crate) fn load_schema(path: &Path, struct_name: Option<&str>) -> Result<RuntimeSchema> {
	let schema = RuntimeSchema::from_path(path)?;
	match struct_name {
		None => Ok(schema),
		Some(name) => schema.for_struct_named(name).ok_or_else(|| CodecError::InvalidSchema {
			reason: format!("no struct named {name}"),
		}),
	}
}
