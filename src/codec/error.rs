use thiserror::Error;

use crate::codec::{DataType, ProtocolKind};

/// Crate-local result type.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors produced while compiling plans, reading payloads, and writing payloads.
#[derive(Debug, Error)]
pub enum CodecError {
	/// Filesystem or stream IO failure.
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	/// Schema JSON could not be parsed.
	#[error("schema json: {0}")]
	Json(#[from] serde_json::Error),
	/// Source reported a kind different from what the schema expects.
	#[error("type mismatch: expected {expected}, found {got}")]
	TypeMismatch {
		/// Kind required by the target schema.
		expected: DataType,
		/// Kind reported by the source.
		got: DataType,
	},
	/// In-memory value does not have the shape its schema type requires.
	#[error("value shape mismatch: expected {expected}, found {got}")]
	ValueShape {
		/// Kind required by the schema.
		expected: DataType,
		/// Name of the value variant that was found.
		got: &'static str,
	},
	/// Required field absent from the source.
	#[error("required field {struct_name}.{field} is missing")]
	RequiredFieldMissing {
		/// Struct that declares the field.
		struct_name: Box<str>,
		/// Field name.
		field: Box<str>,
	},
	/// Factory returned a value that cannot stand in for the requested construction.
	#[error("unsupported construction for {type_name}: {reason}")]
	UnsupportedConstruction {
		/// Schema type being constructed.
		type_name: Box<str>,
		/// Why the construction was rejected.
		reason: &'static str,
	},
	/// Schema default does not fit the declared field kind.
	#[error("malformed default for field {field} of kind {kind}")]
	MalformedDefault {
		/// Field name.
		field: Box<str>,
		/// Declared field kind.
		kind: DataType,
	},
	/// Writer requested a first pass but the reader cannot be duplicated.
	#[error("two-pass write requires a duplicable reader ({protocol})")]
	TwoPass {
		/// Protocol of the reader that refused duplication.
		protocol: ProtocolKind,
	},
	/// Writer expected first-pass data that was never produced.
	#[error("{protocol} writer has no first-pass data for struct #{index}")]
	MissingFirstPass {
		/// Target protocol.
		protocol: ProtocolKind,
		/// Zero-based struct ordinal in write order.
		index: usize,
	},
	/// Bonded payload capture requires a reader that can be duplicated.
	#[error("reader for {protocol} cannot be duplicated")]
	NotDuplicable {
		/// Protocol of the reader.
		protocol: ProtocolKind,
	},
	/// Not enough bytes remained for a requested read.
	#[error("unexpected eof at offset {at}, need {need} bytes, remaining {rem}")]
	UnexpectedEof {
		/// Byte offset where the read was attempted.
		at: usize,
		/// Requested bytes.
		need: usize,
		/// Bytes still available.
		rem: usize,
	},
	/// Varint ran past its maximum encoded width.
	#[error("varint overflow at offset {at}")]
	VarintOverflow {
		/// Offset of the first varint byte.
		at: usize,
	},
	/// Wire type id outside the known set.
	#[error("unknown data type id {id}")]
	UnknownDataType {
		/// Raw wire id.
		id: u8,
	},
	/// String payload was not valid UTF-8 or UTF-16.
	#[error("invalid string payload at offset {at}")]
	InvalidString {
		/// Offset of the string body.
		at: usize,
	},
	/// Scalar does not fit the kind it is read or written as.
	#[error("value out of range for {kind}")]
	ValueOutOfRange {
		/// Target kind.
		kind: DataType,
	},
	/// Nullable field carried more than one element.
	#[error("nullable field holds {count} elements, at most one allowed")]
	NullableOverflow {
		/// Element count reported by the source.
		count: usize,
	},
	/// Schema description failed validation.
	#[error("invalid schema: {reason}")]
	InvalidSchema {
		/// Human readable cause.
		reason: String,
	},
	/// Reader or payload protocol does not match the plan.
	#[error("protocol mismatch: expected {expected}, found {got}")]
	ProtocolMismatch {
		/// Protocol the plan was built for.
		expected: ProtocolKind,
		/// Protocol actually supplied.
		got: ProtocolKind,
	},
	/// Untagged reader needs a schema that was not supplied.
	#[error("untagged {protocol} source requires a source schema")]
	MissingSourceSchema {
		/// Untagged protocol.
		protocol: ProtocolKind,
	},
	/// Field arrived out of schema order for an untagged writer.
	#[error("field {id} arrives out of order for untagged {protocol} output")]
	FieldOrder {
		/// Field id.
		id: u16,
		/// Untagged target protocol.
		protocol: ProtocolKind,
	},
	/// Source could not report an element count the writer needs up front.
	#[error("container element count is unknown")]
	UnknownCount,
	/// Decode limit exceeded.
	#[error("{what} limit exceeded: {value} > {max}")]
	LimitExceeded {
		/// Which limit tripped.
		what: &'static str,
		/// Observed value.
		value: usize,
		/// Configured maximum.
		max: usize,
	},
	/// Unknown protocol name.
	#[error("unknown protocol '{name}'")]
	UnknownProtocol {
		/// Name that failed to parse.
		name: String,
	},
}
