use std::path::PathBuf;

use bondrt::codec::{ProtocolKind, Result, transcode_bytes};

use crate::cmd::load_schema;

/// Inputs for one transcode run.
#[derive(Debug)]
pub struct TranscodeArgs {
	/// JSON schema path.
	pub schema: PathBuf,
	/// Encoded payload path.
	pub payload: PathBuf,
	/// Protocol of the input payload.
	pub from: ProtocolKind,
	/// Protocol to write.
	pub to: ProtocolKind,
	/// Output path.
	pub out: PathBuf,
	/// Struct the payload holds, instead of the schema root.
	pub struct_name: Option<String>,
}

/// Convert a payload file from one protocol to another.
pub fn run(args: TranscodeArgs) -> Result<()> {
	let schema = load_schema(&args.schema, args.struct_name.as_deref())?;
	let input = std::fs::read(&args.payload)?;
	let in_len = input.len();
	let output = transcode_bytes(input, &schema, args.from, args.to)?;
	std::fs::write(&args.out, &output)?;

	println!("schema: {}", schema.name());
	println!("from: {} ({in_len} bytes)", args.from);
	println!("to: {} ({} bytes)", args.to, output.len());
	println!("out: {}", args.out.display());
	Ok(())
}
