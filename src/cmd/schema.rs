use std::path::PathBuf;

use bondrt::codec::{DataType, ListSubType, Modifier, Result, SchemaDef, StructDef, TypeDef};

use crate::cmd::load_schema;

/// Print the struct table, and the fields of one struct when asked.
pub fn run(path: PathBuf, struct_name: Option<String>) -> Result<()> {
	let schema = load_schema(&path, struct_name.as_deref())?;
	let def = schema.def();

	println!("path: {}", path.display());
	println!("root: {}", type_name(def, &def.root));
	println!("structs: {}", def.structs.len());

	let Some(name) = struct_name else {
		for (index, item) in def.structs.iter().enumerate() {
			println!("  #{index} {} fields={}{}", item.name(), item.fields.len(), base_suffix(def, item));
		}
		return Ok(());
	};

	let Some(item) = schema.struct_def() else {
		return Ok(());
	};
	println!("struct: {name}");
	if let Some(base) = schema.base_schema() {
		println!("base: {}", base.name());
	}
	println!("hierarchy_depth: {}", schema.hierarchy_depth());
	println!("field_count: {}", item.fields.len());
	for field in &item.fields {
		println!("  {}: {} {} {}", field.id, modifier(field.metadata.modifier), type_name(def, &field.ty), field.name());
	}

	Ok(())
}

fn base_suffix(def: &SchemaDef, item: &StructDef) -> String {
	match &item.base_def {
		Some(base) => format!(" base={}", type_name(def, base)),
		None => String::new(),
	}
}

fn modifier(modifier: Modifier) -> &'static str {
	match modifier {
		Modifier::Optional => "optional",
		Modifier::Required => "required",
		Modifier::RequiredOptional => "required_optional",
	}
}

/// IDL-style spelling of a type.
fn type_name(def: &SchemaDef, ty: &TypeDef) -> String {
	let element = || ty.element.as_deref().map_or_else(|| "?".to_owned(), |e| type_name(def, e));
	match ty.id {
		DataType::Struct => {
			let name = def.structs.get(usize::from(ty.struct_def)).map_or("?", |s| s.name());
			if ty.bonded_type { format!("bonded<{name}>") } else { name.to_owned() }
		}
		DataType::List => match ty.list_sub_type {
			ListSubType::Nullable => format!("nullable<{}>", element()),
			ListSubType::Blob => "blob".to_owned(),
			ListSubType::Plain => format!("list<{}>", element()),
		},
		DataType::Set => format!("set<{}>", element()),
		DataType::Map => {
			let key = ty.key.as_deref().map_or_else(|| "?".to_owned(), |k| type_name(def, k));
			format!("map<{key}, {}>", element())
		}
		other => other.name().to_owned(),
	}
}
