//! Text and binary codecs driven through the exported functions.

mod common;

use common::{bytes, new_buffer, string, take_buffer, take_bytes, take_error, take_string};
use fatstd::base64::{
    fat_Base64Decode, fat_Base64Encode, fat_Base64EncodingFree, fat_Base64StdEncoding,
};
use fatstd::bytes::fat_BytesFree;
use fatstd::compress::{
    fat_FlateCompress, fat_FlateDecompress, fat_GzipCompress, fat_GzipDecompress, fat_LzwCompress,
    fat_LzwDecompress, fat_ZlibCompress, fat_ZlibDecompress,
};
use fatstd::csv::{
    fat_CsvReaderFree, fat_CsvReaderNewBytes, fat_CsvReaderRead, fat_CsvWriterFlush,
    fat_CsvWriterFree, fat_CsvWriterNewToBytesBuffer, fat_CsvWriterWriteRecord,
};
use fatstd::json::{fat_JsonMarshal, fat_JsonUnmarshal, fat_JsonValueFree, fat_JsonValueType};
use fatstd::string::{fat_StringArrayFree, fat_StringArrayGet, fat_StringArrayLen, fat_StringFree};
use fatstd::xml::{
    fat_XmlDecoderFree, fat_XmlDecoderNewBytes, fat_XmlDecoderToken, fat_XmlTokenFree,
    fat_XmlTokenNameLocal, fat_XmlTokenType,
};
use fatstd::{
    FatBytes, FatError, FatJsonValue, FatStringArray, FatXmlToken, JsonKind, Status, XmlTokenKind,
};

type Codec = unsafe extern "C" fn(FatBytes, *mut FatBytes, *mut FatError) -> Status;

fn run(codec: Codec, input: &[u8]) -> Result<Vec<u8>, (Status, FatError)> {
    let b = bytes(input);
    let mut out = FatBytes::invalid();
    let mut err = FatError::invalid();
    let status = unsafe { codec(b, &mut out, &mut err) };
    fat_BytesFree(b);
    match status {
        Status::Ok => {
            assert!(!err.is_valid());
            Ok(take_bytes(out))
        }
        status => {
            assert!(!out.is_valid());
            Err((status, err))
        }
    }
}

#[test]
fn test_deflate_family_round_trip() {
    let pairs: [(Codec, Codec); 3] = [
        (fat_GzipCompress, fat_GzipDecompress),
        (fat_ZlibCompress, fat_ZlibDecompress),
        (fat_FlateCompress, fat_FlateDecompress),
    ];
    for (compress, decompress) in pairs {
        for input in [&b""[..], b"payload with \0 embedded nul"] {
            let packed = run(compress, input).unwrap();
            assert_eq!(run(decompress, &packed).unwrap(), input);
        }
    }
}

#[test]
fn test_truncated_and_corrupt_input() {
    let packed = run(fat_ZlibCompress, b"some text that compresses into a few blocks").unwrap();
    let (status, err) = run(fat_ZlibDecompress, &packed[..packed.len() / 2]).unwrap_err();
    assert_eq!(status, Status::Eof);
    take_error(err, Status::Eof);

    let (status, err) = run(fat_FlateDecompress, &[0xff; 16]).unwrap_err();
    assert_eq!(status, Status::Syntax);
    take_error(err, Status::Syntax);
}

#[test]
fn test_lzw_round_trip_and_bad_width() {
    let input = b"TOBEORNOTTOBEORTOBEORNOT";
    let b = bytes(input);
    let mut packed = FatBytes::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_LzwCompress(b, 1, 8, &mut packed, &mut err) }, Status::Ok);
    let mut plain = FatBytes::invalid();
    assert_eq!(unsafe { fat_LzwDecompress(packed, 1, 8, &mut plain, &mut err) }, Status::Ok);
    assert_eq!(take_bytes(plain), input);
    fat_BytesFree(packed);

    let mut out = FatBytes::invalid();
    assert_eq!(unsafe { fat_LzwCompress(b, 0, 12, &mut out, &mut err) }, Status::Range);
    assert!(!out.is_valid());
    take_error(err, Status::Range);
    fat_BytesFree(b);
}

#[test]
fn test_base64_round_trip_and_error() {
    let enc = fat_Base64StdEncoding();
    for input in [&b""[..], b"\x00\x01\x02hello"] {
        let src = bytes(input);
        let encoded = fat_Base64Encode(enc, src);
        fat_BytesFree(src);
        let mut decoded = FatBytes::invalid();
        let mut err = FatError::invalid();
        assert_eq!(unsafe { fat_Base64Decode(enc, encoded, &mut decoded, &mut err) }, Status::Ok);
        assert_eq!(take_bytes(decoded), input);
        fat_BytesFree(encoded);
    }

    let bad = bytes(b"not*base64");
    let mut decoded = FatBytes::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_Base64Decode(enc, bad, &mut decoded, &mut err) }, Status::Syntax);
    assert!(!decoded.is_valid());
    take_error(err, Status::Syntax);
    fat_BytesFree(bad);
    fat_Base64EncodingFree(enc);
}

#[test]
fn test_json_round_trip() {
    let input = bytes(br#"{"name":"fat","tags":["a","b"],"n":12.50}"#);
    let mut value = FatJsonValue::invalid();
    let mut err = FatError::invalid();
    assert_eq!(unsafe { fat_JsonUnmarshal(input, &mut value, &mut err) }, Status::Ok);
    assert_eq!(fat_JsonValueType(value), JsonKind::Object);

    let mut out = FatBytes::invalid();
    assert_eq!(unsafe { fat_JsonMarshal(value, &mut out, &mut err) }, Status::Ok);
    let text = String::from_utf8(take_bytes(out)).unwrap();
    assert!(text.contains(r#""tags":["a","b"]"#), "{}", text);
    assert!(text.contains("12.50"), "numbers keep their source text: {}", text);
    fat_JsonValueFree(value);
    fat_BytesFree(input);
}

#[test]
fn test_xml_tokens() {
    let doc = bytes(b"<root><item/></root>");
    let dec = fat_XmlDecoderNewBytes(doc);
    fat_BytesFree(doc);

    let mut seen = Vec::new();
    loop {
        let mut tok = FatXmlToken::invalid();
        let mut eof = false;
        let mut err = FatError::invalid();
        let status = unsafe { fat_XmlDecoderToken(dec, &mut tok, &mut eof, &mut err) };
        assert_eq!(status, Status::Ok);
        if eof {
            assert!(!tok.is_valid());
            break;
        }
        let kind = fat_XmlTokenType(tok);
        seen.push((kind, take_string(fat_XmlTokenNameLocal(tok))));
        fat_XmlTokenFree(tok);
    }
    assert_eq!(
        seen,
        [
            (XmlTokenKind::StartElement, "root".to_string()),
            (XmlTokenKind::StartElement, "item".to_string()),
            (XmlTokenKind::EndElement, "item".to_string()),
            (XmlTokenKind::EndElement, "root".to_string()),
        ]
    );
    fat_XmlDecoderFree(dec);
}

fn read_record(r: fatstd::FatCsvReader) -> Result<Option<Vec<String>>, Status> {
    let mut rec = FatStringArray::invalid();
    let mut eof = false;
    let mut err = FatError::invalid();
    let status = unsafe { fat_CsvReaderRead(r, &mut rec, &mut eof, &mut err) };
    if status != Status::Ok {
        take_error(err, status);
        return Err(status);
    }
    if eof {
        return Ok(None);
    }
    let fields = (0..fat_StringArrayLen(rec))
        .map(|i| take_string(fat_StringArrayGet(rec, i)))
        .collect();
    fat_StringArrayFree(rec);
    Ok(Some(fields))
}

#[test]
fn test_csv_write_then_read() {
    let buf = new_buffer();
    let w = fat_CsvWriterNewToBytesBuffer(buf);
    for record in [["name", "note"], ["ada", "says \"hi\", twice"]] {
        let fields: Vec<_> = record.iter().map(|f| string(f)).collect();
        let mut err = FatError::invalid();
        let status = unsafe {
            fat_CsvWriterWriteRecord(w, fields.as_ptr(), fields.len(), &mut err)
        };
        assert_eq!(status, Status::Ok);
        for f in fields {
            fat_StringFree(f);
        }
    }
    fat_CsvWriterFlush(w);
    fat_CsvWriterFree(w);
    let text = take_buffer(buf);
    assert_eq!(text, b"name,note\nada,\"says \"\"hi\"\", twice\"\n");

    let data = bytes(&text);
    let r = fat_CsvReaderNewBytes(data);
    fat_BytesFree(data);
    assert_eq!(read_record(r), Ok(Some(vec!["name".into(), "note".into()])));
    assert_eq!(read_record(r), Ok(Some(vec!["ada".into(), "says \"hi\", twice".into()])));
    assert_eq!(read_record(r), Ok(None));
    fat_CsvReaderFree(r);
}

#[test]
fn test_csv_field_count_mismatch() {
    let data = bytes(b"a,b\nc\n");
    let r = fat_CsvReaderNewBytes(data);
    fat_BytesFree(data);
    assert!(read_record(r).unwrap().is_some());
    assert_eq!(read_record(r), Err(Status::Syntax));
    fat_CsvReaderFree(r);
}
