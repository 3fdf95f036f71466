use bytes::Bytes;

use super::*;

fn compact(kind: ProtocolKind, bytes: &[u8]) -> CompactReader {
	CompactReader::new(kind, Bytes::copy_from_slice(bytes))
}

#[test]
fn protocol_names_parse() {
	assert_eq!("compact".parse::<ProtocolKind>().expect("name parses"), ProtocolKind::Compact);
	assert_eq!("CB2".parse::<ProtocolKind>().expect("alias parses"), ProtocolKind::CompactV2);
	assert_eq!("simple".parse::<ProtocolKind>().expect("name parses"), ProtocolKind::Simple);
	for kind in ProtocolKind::ALL {
		assert_eq!(kind.name().parse::<ProtocolKind>().expect("display name parses"), kind);
	}
	let err = "xml".parse::<ProtocolKind>().expect_err("unknown name");
	assert!(matches!(err, CodecError::UnknownProtocol { .. }));
}

#[test]
fn compact_field_headers_pick_the_short_form() {
	let mut writer = CompactWriter::new(ProtocolKind::Compact);
	writer.write_field_begin(DataType::Int32, 3).expect("short id");
	writer.write_field_begin(DataType::Int32, 6).expect("byte id");
	writer.write_field_begin(DataType::Int32, 300).expect("u16 id");
	writer.write_base_end().expect("base end");
	writer.write_struct_end().expect("struct end");
	assert_eq!(writer.as_bytes(), &[0x70, 0xd0, 6, 0xf0, 0x2c, 0x01, 1, 0]);

	let mut reader = compact(ProtocolKind::Compact, writer.as_bytes());
	for id in [3, 6, 300] {
		assert_eq!(reader.read_field_begin().expect("header reads"), FieldTag::Field { ty: DataType::Int32, id });
	}
	assert_eq!(reader.read_field_begin().expect("base stop reads"), FieldTag::BaseStop);
	assert_eq!(reader.read_field_begin().expect("stop reads"), FieldTag::Stop);
}

#[test]
fn compact_v2_packs_small_list_counts() {
	let mut v1 = CompactWriter::new(ProtocolKind::Compact);
	v1.write_container_begin(DataType::Int32, 3).expect("header writes");
	assert_eq!(v1.as_bytes(), &[16, 3]);

	let mut v2 = CompactWriter::new(ProtocolKind::CompactV2);
	v2.write_container_begin(DataType::Int32, 3).expect("header writes");
	v2.write_container_begin(DataType::Int32, 0).expect("header writes");
	v2.write_container_begin(DataType::Int32, 9).expect("header writes");
	assert_eq!(v2.as_bytes(), &[0x90, 0x30, 16, 9]);

	let mut reader = compact(ProtocolKind::CompactV2, v2.as_bytes());
	for count in [3, 0, 9] {
		let header = reader.read_container_begin(DataType::Unavailable).expect("header reads");
		assert_eq!(header, ContainerHeader { element: DataType::Int32, count });
	}
}

#[test]
fn compact_v2_replays_first_pass_lengths() {
	fn body<W: ProtocolWriter>(w: &mut W) -> Result<()> {
		w.write_struct_begin()?;
		w.write_field_begin(DataType::Int32, 0)?;
		w.write_signed(DataType::Int32, 1)?;
		w.write_struct_end()
	}

	let mut writer = CompactWriter::new(ProtocolKind::CompactV2);
	let first = writer.first_pass().expect("v2 has a first pass");
	body(first).expect("counting pass succeeds");
	body(&mut writer).expect("main pass succeeds");
	assert_eq!(writer.as_bytes(), &[3, 0x10, 2, 0]);

	let mut reader = compact(ProtocolKind::CompactV2, writer.as_bytes());
	reader.skip(DataType::Struct).expect("length-prefixed skip");
	assert_eq!(reader.position(), 4);
}

#[test]
fn compact_v2_without_first_pass_fails() {
	let mut writer = CompactWriter::new(ProtocolKind::CompactV2);
	let err = writer.write_struct_begin().expect_err("no lengths recorded");
	assert!(matches!(err, CodecError::MissingFirstPass { index: 0, .. }));
}

#[test]
fn compact_skip_walks_nested_values() {
	let mut writer = CompactWriter::new(ProtocolKind::Compact);
	writer.write_field_begin(DataType::String, 0).expect("header");
	writer.write_string("hello").expect("string");
	writer.write_field_begin(DataType::List, 1).expect("header");
	writer.write_container_begin(DataType::Struct, 1).expect("list");
	writer.write_field_begin(DataType::Double, 0).expect("header");
	writer.write_f64(1.5).expect("double");
	writer.write_struct_end().expect("inner end");
	writer.write_field_begin(DataType::Map, 2).expect("header");
	writer.write_map_begin(DataType::UInt32, DataType::WString, 1).expect("map");
	writer.write_unsigned(DataType::UInt32, 7).expect("key");
	writer.write_wstring("w").expect("value");
	writer.write_struct_end().expect("outer end");
	writer.write_bool(true).expect("trailer");
	let bytes = writer.into_bytes();

	let mut reader = compact(ProtocolKind::Compact, &bytes);
	reader.skip(DataType::Struct).expect("skip succeeds");
	assert_eq!(reader.position(), bytes.len() - 1);
	assert!(reader.read_bool().expect("trailer reads"));
}

#[test]
fn compact_range_checks_narrow_kinds() {
	let mut writer = CompactWriter::new(ProtocolKind::Compact);
	writer.write_unsigned(DataType::UInt32, 70_000).expect("varint writes");
	let mut reader = compact(ProtocolKind::Compact, writer.as_bytes());
	let err = reader.read_unsigned(DataType::UInt16).expect_err("does not fit u16");
	assert!(matches!(err, CodecError::ValueOutOfRange { kind: DataType::UInt16 }));
}

#[test]
fn wide_strings_use_utf16_code_units() {
	for kind in ProtocolKind::ALL {
		let bytes = match kind {
			ProtocolKind::Simple => {
				let mut writer = SimpleWriter::new();
				writer.write_wstring("a\u{1f600}").expect("wstring writes");
				writer.into_bytes()
			}
			_ => {
				let mut writer = CompactWriter::new(kind);
				writer.write_wstring("a\u{1f600}").expect("wstring writes");
				writer.into_bytes()
			}
		};
		let mut reader = kind.reader(bytes);
		assert_eq!(reader.read_wstring().expect("wstring reads"), "a\u{1f600}");
	}
}

#[test]
fn simple_values_are_fixed_width() {
	let mut writer = SimpleWriter::new();
	writer.write_unsigned(DataType::UInt16, 0x1234).expect("u16");
	writer.write_signed(DataType::Int32, -2).expect("i32");
	writer.write_string("hi").expect("string");
	assert_eq!(writer.as_bytes(), &[0x34, 0x12, 0xfe, 0xff, 0xff, 0xff, 2, 0, 0, 0, b'h', b'i']);

	let mut reader = SimpleReader::new(writer.into_bytes());
	assert_eq!(reader.read_unsigned(DataType::UInt16).expect("u16"), 0x1234);
	assert_eq!(reader.read_signed(DataType::Int32).expect("i32"), -2);
	assert_eq!(reader.read_string().expect("string"), "hi");
}

#[test]
fn simple_bonded_frames_carry_their_length() {
	let mut writer = SimpleWriter::new();
	writer.write_bonded_begin().expect("frame opens");
	writer.write_unsigned(DataType::UInt32, 7).expect("body");
	writer.write_bonded_end().expect("frame closes");
	writer.write_bonded_empty().expect("empty frame");
	assert_eq!(writer.as_bytes(), &[4, 0, 0, 0, 7, 0, 0, 0, 0, 0, 0, 0]);

	let mut reader = SimpleReader::new(writer.into_bytes());
	assert_eq!(reader.read_bonded_begin().expect("frame reads"), Some(4));
	reader.skip_bytes(4).expect("body skips");
	assert_eq!(reader.read_bonded_begin().expect("frame reads"), Some(0));
}

#[test]
fn simple_reader_has_no_field_headers() {
	let mut reader = SimpleReader::new(Bytes::new());
	let err = reader.read_field_begin().expect_err("untagged");
	assert!(matches!(err, CodecError::MissingSourceSchema { protocol: ProtocolKind::Simple }));
}

#[test]
fn write_scalar_checks_ranges_and_shapes() {
	let mut writer = SimpleWriter::new();
	write_scalar(&mut writer, DataType::UInt8, &Value::U64(255)).expect("fits");
	let err = write_scalar(&mut writer, DataType::UInt8, &Value::U64(256)).expect_err("too large");
	assert!(matches!(err, CodecError::ValueOutOfRange { kind: DataType::UInt8 }));
	let err = write_scalar(&mut writer, DataType::Int8, &Value::I64(-129)).expect_err("too small");
	assert!(matches!(err, CodecError::ValueOutOfRange { kind: DataType::Int8 }));
	let err = write_scalar(&mut writer, DataType::String, &Value::Bool(true)).expect_err("wrong shape");
	assert!(matches!(err, CodecError::ValueShape { .. }));
}

#[test]
fn duplicated_reader_is_independent() {
	let mut reader = ProtocolKind::Simple.reader(Bytes::from_static(&[1, 2]));
	let mut copy = reader.duplicate().expect("wire readers duplicate");
	assert!(reader.read_bool().expect("first byte"));
	assert_eq!(reader.position(), 1);
	assert_eq!(copy.position(), 0);
	assert!(copy.read_bool().expect("copy reads from its own offset"));
}
