use std::path::PathBuf;

use bondrt::codec::{Deserializer, DynamicObject, ProtocolKind, Result, Value};
use serde_json::json;

use crate::cmd::load_schema;

/// Inputs for one decode run.
#[derive(Debug)]
pub struct DecodeArgs {
	/// JSON schema path.
	pub schema: PathBuf,
	/// Encoded payload path.
	pub payload: PathBuf,
	/// Payload protocol.
	pub protocol: ProtocolKind,
	/// Struct to decode as, instead of the schema root.
	pub struct_name: Option<String>,
	/// Print JSON instead of indented text.
	pub json: bool,
}

/// Decode a payload file and print the object.
pub fn run(args: DecodeArgs) -> Result<()> {
	let schema = load_schema(&args.schema, args.struct_name.as_deref())?;
	let bytes = std::fs::read(&args.payload)?;
	let len = bytes.len();
	let mut reader = args.protocol.reader(bytes);
	let obj = Deserializer::new(schema.clone())?.deserialize(&mut reader)?;

	if args.json {
		let out = json!({
			"schema": schema.name(),
			"protocol": args.protocol.name(),
			"bytes": len,
			"value": object_json(&obj)?,
		});
		println!("{out:#}");
		return Ok(());
	}

	println!("path: {}", args.payload.display());
	println!("schema: {}", schema.name());
	println!("protocol: {}", args.protocol);
	println!("bytes: {len}");
	println!("decoded:");
	print_object(&obj, 0)?;
	Ok(())
}

fn object_json(obj: &DynamicObject) -> Result<serde_json::Value> {
	let mut out = serde_json::Map::new();
	for (name, value) in obj.iter() {
		out.insert(name.to_owned(), value_json(value)?);
	}
	Ok(serde_json::Value::Object(out))
}

/// JSON projection of a decoded value. Bonded payloads are decoded in place.
fn value_json(value: &Value) -> Result<serde_json::Value> {
	Ok(match value {
		Value::Null => serde_json::Value::Null,
		Value::Bool(v) => json!(v),
		Value::I64(v) => json!(v),
		Value::U64(v) => json!(v),
		Value::F32(v) => json!(v),
		Value::F64(v) => json!(v),
		Value::String(v) => json!(&**v),
		Value::Bytes(v) => json!(v),
		Value::List(items) => serde_json::Value::Array(items.iter().map(value_json).collect::<Result<_>>()?),
		Value::Map(map) => serde_json::Value::Array(
			map.iter()
				.map(|(k, v)| Ok(json!([value_json(k)?, value_json(v)?])))
				.collect::<Result<_>>()?,
		),
		Value::Struct(obj) => object_json(obj)?,
		Value::Bonded(payload) => object_json(&payload.decode()?)?,
	})
}

fn print_object(obj: &DynamicObject, indent: usize) -> Result<()> {
	let pad = " ".repeat(indent);
	println!("{pad}{{");
	for (name, value) in obj.iter() {
		print!("{pad}  {name} = ");
		print_value(value, indent + 2)?;
	}
	println!("{pad}}}");
	Ok(())
}

fn print_value(value: &Value, indent: usize) -> Result<()> {
	match value {
		Value::Null => println!("null"),
		Value::Bool(v) => println!("{v}"),
		Value::I64(v) => println!("{v}"),
		Value::U64(v) => println!("{v}"),
		Value::F32(v) => println!("{v}"),
		Value::F64(v) => println!("{v}"),
		Value::String(v) => println!("{v:?}"),
		Value::Bytes(v) => println!("bytes[{}]", v.len()),
		Value::List(items) => {
			println!("[{} items]", items.len());
			let pad = " ".repeat(indent + 2);
			for item in items {
				print!("{pad}- ");
				print_value(item, indent + 4)?;
			}
		}
		Value::Map(map) => {
			println!("{{{} entries}}", map.len());
			let pad = " ".repeat(indent + 2);
			for (k, v) in map.iter() {
				print!("{pad}{} => ", scalar_text(k));
				print_value(v, indent + 4)?;
			}
		}
		Value::Struct(obj) => {
			println!();
			print_object(obj, indent + 2)?;
		}
		Value::Bonded(payload) => {
			let protocol = payload.protocol().map_or("object", ProtocolKind::name);
			println!("bonded<{protocol}>");
			print_object(&payload.decode()?, indent + 2)?;
		}
	}
	Ok(())
}

fn scalar_text(value: &Value) -> String {
	match value {
		Value::String(v) => format!("{v:?}"),
		Value::Bool(v) => v.to_string(),
		Value::I64(v) => v.to_string(),
		Value::U64(v) => v.to_string(),
		Value::F32(v) => v.to_string(),
		Value::F64(v) => v.to_string(),
		other => other.kind_name().to_owned(),
	}
}
