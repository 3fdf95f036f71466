use std::sync::Arc;

use crate::codec::{CodecError, DataType, FieldDef, Result, SchemaDef, StructDef, TypeDef};

/// Shared schema plus the type currently in view.
///
/// Cloning is cheap: the struct table sits behind an `Arc`.
#[derive(Debug, Clone)]
pub struct RuntimeSchema {
	def: Arc<SchemaDef>,
	ty: TypeDef,
}

impl PartialEq for RuntimeSchema {
	fn eq(&self, other: &Self) -> bool {
		(Arc::ptr_eq(&self.def, &other.def) || self.def == other.def) && self.ty == other.ty
	}
}

impl RuntimeSchema {
	/// Validate `def` and view its root type.
	pub fn new(def: SchemaDef) -> Result<Self> {
		def.validate()?;
		let ty = def.root.clone();
		Ok(Self { def: Arc::new(def), ty })
	}

	/// Parse the JSON form of a [`SchemaDef`] and view its root.
	pub fn from_json(json: &str) -> Result<Self> {
		let def: SchemaDef = serde_json::from_str(json)?;
		Self::new(def)
	}

	/// Read a JSON schema file.
	pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
		let text = std::fs::read_to_string(path)?;
		Self::from_json(&text)
	}

	pub(crate) fn from_parts(def: Arc<SchemaDef>, ty: TypeDef) -> Self {
		Self { def, ty }
	}

	/// Same schema, different type in view.
	pub fn with_type(&self, ty: TypeDef) -> Self {
		Self {
			def: Arc::clone(&self.def),
			ty,
		}
	}

	/// Same schema, viewing `structs[index]`.
	pub fn for_struct(&self, index: u16) -> Result<Self> {
		if usize::from(index) >= self.def.structs.len() {
			return Err(CodecError::InvalidSchema {
				reason: format!("struct index {index} out of range"),
			});
		}
		Ok(self.with_type(TypeDef::structure(index)))
	}

	/// Same schema, viewing the struct named `name`.
	pub fn for_struct_named(&self, name: &str) -> Option<Self> {
		let index = self.def.structs.iter().position(|s| s.name() == name || s.metadata.qualified_name == name)?;
		Some(self.with_type(TypeDef::structure(u16::try_from(index).ok()?)))
	}

	/// Borrowed view used on hot paths.
	pub fn view(&self) -> SchemaRef<'_> {
		SchemaRef { def: &self.def, ty: &self.ty }
	}

	/// Full schema definition.
	pub fn def(&self) -> &Arc<SchemaDef> {
		&self.def
	}

	/// Type in view.
	pub fn type_def(&self) -> &TypeDef {
		&self.ty
	}

	/// Kind of the type in view.
	pub fn data_type(&self) -> DataType {
		self.ty.id
	}

	/// Struct definition when the type in view is a struct.
	pub fn struct_def(&self) -> Option<&StructDef> {
		self.view().struct_def()
	}

	/// Base struct view.
	pub fn base_schema(&self) -> Option<Self> {
		self.view().base().map(|b| b.to_runtime())
	}

	/// View of one field's type.
	pub fn field_schema(&self, field: &FieldDef) -> Self {
		self.with_type(field.ty.clone())
	}

	/// Element view for containers and maps.
	pub fn element_schema(&self) -> Option<Self> {
		self.view().element().map(|e| e.to_runtime())
	}

	/// Key view for maps.
	pub fn key_schema(&self) -> Option<Self> {
		self.view().key().map(|k| k.to_runtime())
	}

	/// `true` when the type in view is a struct (bonded or not).
	pub fn is_struct(&self) -> bool {
		self.ty.id == DataType::Struct
	}

	/// `true` when the type in view is `bonded<T>`.
	pub fn is_bonded(&self) -> bool {
		self.ty.bonded_type
	}

	/// `true` for list and set.
	pub fn is_container(&self) -> bool {
		self.ty.id.is_container()
	}

	/// `true` for maps.
	pub fn is_map(&self) -> bool {
		self.ty.id == DataType::Map
	}

	/// `true` for byte containers.
	pub fn is_blob(&self) -> bool {
		self.ty.is_blob()
	}

	/// Number of base links below the struct in view.
	pub fn hierarchy_depth(&self) -> usize {
		self.view().hierarchy_depth()
	}

	/// Struct name, or the kind name for non-struct views.
	pub fn name(&self) -> &str {
		self.view().name()
	}
}

/// Borrowed counterpart of [`RuntimeSchema`].
#[derive(Debug, Clone, Copy)]
pub struct SchemaRef<'a> {
	pub(crate) def: &'a Arc<SchemaDef>,
	pub(crate) ty: &'a TypeDef,
}

impl<'a> SchemaRef<'a> {
	/// Type in view.
	pub fn type_def(&self) -> &'a TypeDef {
		self.ty
	}

	/// Struct definition when the type in view is a struct.
	pub fn struct_def(&self) -> Option<&'a StructDef> {
		if self.ty.id != DataType::Struct {
			return None;
		}
		self.def.structs.get(usize::from(self.ty.struct_def))
	}

	/// Base struct view.
	pub fn base(&self) -> Option<SchemaRef<'a>> {
		let base = self.struct_def()?.base_def.as_ref()?;
		Some(SchemaRef { def: self.def, ty: base })
	}

	/// View of one field's type.
	pub fn field(&self, field: &'a FieldDef) -> SchemaRef<'a> {
		SchemaRef { def: self.def, ty: &field.ty }
	}

	/// Element view.
	pub fn element(&self) -> Option<SchemaRef<'a>> {
		Some(SchemaRef {
			def: self.def,
			ty: self.ty.element.as_deref()?,
		})
	}

	/// Key view.
	pub fn key(&self) -> Option<SchemaRef<'a>> {
		Some(SchemaRef {
			def: self.def,
			ty: self.ty.key.as_deref()?,
		})
	}

	/// Number of base links below the struct in view.
	pub fn hierarchy_depth(&self) -> usize {
		let mut depth = 0;
		let mut cursor = self.base();
		while let Some(base) = cursor {
			depth += 1;
			cursor = base.base();
		}
		depth
	}

	/// Struct name, or the kind name for non-struct views.
	pub fn name(&self) -> &'a str {
		match self.struct_def() {
			Some(def) => def.name(),
			None => self.ty.id.name(),
		}
	}

	/// Owned view.
	pub fn to_runtime(&self) -> RuntimeSchema {
		RuntimeSchema::from_parts(Arc::clone(self.def), self.ty.clone())
	}

	/// `true` when both views share one schema table.
	pub fn same_def(&self, other: &Arc<SchemaDef>) -> bool {
		Arc::ptr_eq(self.def, other)
	}
}
