use std::sync::{Arc, OnceLock};

use crate::codec::parser::{ObjectParser, SourceKind, WireParser};
use crate::codec::serialize::{WritePlan, first_pass_plan};
use crate::codec::{CodecError, DecodeLimits, Deserializer, PlanOptions, ProtocolKind, ProtocolReader, ProtocolWriter, Result, RuntimeSchema};

/// Compiled converter from one protocol to another.
///
/// Reads with a wire source and writes straight to the target writer; no object graph is
/// built. Two-pass targets get a first pass over a duplicate of the reader.
///
/// Tagged sources may list fields in any order, while untagged targets need schema order.
/// That pairing decodes each payload to an object first and writes it from there.
#[derive(Debug)]
pub struct Transcoder {
	plan: Arc<WritePlan>,
	first_pass: OnceLock<Arc<WritePlan>>,
	staged: Option<Deserializer>,
	source: ProtocolKind,
	source_schema: RuntimeSchema,
	limits: DecodeLimits,
}

impl Transcoder {
	/// Compile a transcoder for the struct in view of `schema`.
	pub fn new(schema: RuntimeSchema, source: ProtocolKind, target: ProtocolKind) -> Result<Self> {
		Self::with_options(schema, source, target, PlanOptions::default())
	}

	/// Compile with explicit plan options.
	pub fn with_options(schema: RuntimeSchema, source: ProtocolKind, target: ProtocolKind, options: PlanOptions) -> Result<Self> {
		let staged = if source.is_tagged() && !target.is_tagged() {
			Some(Deserializer::new(schema.clone())?)
		} else {
			None
		};
		let plan_source = if staged.is_some() { SourceKind::Object } else { SourceKind::Wire(source) };
		let plan = WritePlan::build(&schema, plan_source, target, options)?;
		Ok(Self {
			source_schema: plan.schema().clone(),
			plan: Arc::new(plan),
			first_pass: OnceLock::new(),
			staged,
			source,
			limits: DecodeLimits::default(),
		})
	}

	/// Schema the source bytes were written with, when it differs from the target schema.
	///
	/// Only untagged sources consult it.
	pub fn with_source_schema(mut self, schema: RuntimeSchema) -> Self {
		self.source_schema = schema.with_type(schema.type_def().unbonded());
		self
	}

	/// Replace the limits applied to the source.
	pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
		self.limits = limits;
		self.staged = self.staged.map(|decoder| decoder.with_limits(limits));
		self
	}

	/// Source protocol.
	pub fn source(&self) -> ProtocolKind {
		self.source
	}

	/// Target protocol.
	pub fn target(&self) -> ProtocolKind {
		self.plan.target()
	}

	/// Number of indirect steps in the plan table.
	pub fn step_count(&self) -> usize {
		self.plan.step_count()
	}

	/// Copy one struct from `reader` to `writer`.
	///
	/// A failed first pass aborts the call before the main pass starts.
	pub fn transcode<R: ProtocolReader, W: ProtocolWriter>(&self, reader: &mut R, writer: &mut W) -> Result<()> {
		if reader.kind() != self.source {
			return Err(CodecError::ProtocolMismatch {
				expected: self.source,
				got: reader.kind(),
			});
		}
		if writer.kind() != self.plan.target() {
			return Err(CodecError::ProtocolMismatch {
				expected: self.plan.target(),
				got: writer.kind(),
			});
		}
		if let Some(decoder) = &self.staged {
			let obj = decoder.deserialize(reader)?;
			tracing::trace!(source = %self.source, target = %self.plan.target(), "writing decoded payload");
			return self.plan.run(&mut ObjectParser::new(&obj, self.plan.schema().view()), writer, self.limits);
		}
		let source = self.source_schema.view();
		if let Some(first) = writer.first_pass() {
			let mut duplicate = reader.duplicate().ok_or(CodecError::TwoPass { protocol: reader.kind() })?;
			let plan = first_pass_plan(&self.first_pass, &self.plan, first.kind())?;
			tracing::debug!(source = %self.source, target = %first.kind(), "running first pass");
			plan.run(&mut WireParser::new(&mut duplicate, Some(source))?, first, self.limits)?;
		}
		self.plan.run(&mut WireParser::new(reader, Some(source))?, writer, self.limits)
	}
}
