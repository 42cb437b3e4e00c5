//! JSON values, formatting helpers and stream codecs.
//!
//! Parsing goes through `serde_json`; the value tree is our own so numbers
//! can either keep their source text or be held as `f64`, and so output
//! follows the classic rules (sorted object keys, `<>&` escaped by default,
//! floats without a trailing `.0`).

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::IgnoredAny;

use crate::buffer::BufferSink;
use crate::bytes::Bytes;
use crate::conv;
use crate::error::{Error, Result};
use crate::ffi::{
    self, raw, FatBytes, FatBytesBuffer, FatBytesReader, FatError, FatJsonDecoder, FatJsonEncoder,
    FatJsonValue, FatString, FatStringArray,
};
use crate::string::{new_string, TextArray};
use crate::types::{JsonKind, Status};

/// A number as it appeared in the input, or a decoded float.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonNumber {
    Text(String),
    Float(f64),
}

impl JsonNumber {
    /// Textual form: source text, or the shortest `g` form of a float.
    pub fn to_text(&self) -> String {
        match self {
            JsonNumber::Text(s) => s.clone(),
            JsonNumber::Float(f) => conv::format_float(*f, b'g', -1, 64),
        }
    }
}

/// Immutable JSON value. Children are shared so element handles are cheap.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(JsonNumber),
    String(String),
    Array(Vec<Arc<JsonValue>>),
    Object(BTreeMap<String, Arc<JsonValue>>),
}

impl JsonValue {
    pub fn kind(&self) -> JsonKind {
        match self {
            JsonValue::Null => JsonKind::Null,
            JsonValue::Bool(_) => JsonKind::Bool,
            JsonValue::Number(_) => JsonKind::Number,
            JsonValue::String(_) => JsonKind::String,
            JsonValue::Array(_) => JsonKind::Array,
            JsonValue::Object(_) => JsonKind::Object,
        }
    }

    fn from_serde(v: serde_json::Value, use_number: bool) -> Result<Self> {
        Ok(match v {
            serde_json::Value::Null => JsonValue::Null,
            serde_json::Value::Bool(b) => JsonValue::Bool(b),
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                if use_number {
                    JsonValue::Number(JsonNumber::Text(text))
                } else {
                    match text.parse::<f64>() {
                        Ok(f) if f.is_finite() => JsonValue::Number(JsonNumber::Float(f)),
                        _ => {
                            return Err(Error::other(format!(
                                "json: cannot unmarshal number {} into Go value of type float64",
                                text
                            )))
                        }
                    }
                }
            }
            serde_json::Value::String(s) => JsonValue::String(s),
            serde_json::Value::Array(items) => JsonValue::Array(
                items
                    .into_iter()
                    .map(|item| JsonValue::from_serde(item, use_number).map(Arc::new))
                    .collect::<Result<_>>()?,
            ),
            serde_json::Value::Object(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, item)| Ok((k, Arc::new(JsonValue::from_serde(item, use_number)?))))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

fn syntax_error(err: serde_json::Error) -> Error {
    if err.is_eof() {
        Error::syntax("unexpected end of JSON input")
    } else {
        Error::syntax(err.to_string())
    }
}

/// Whether `src` is one well-formed JSON value.
pub fn valid(src: &[u8]) -> bool {
    serde_json::from_slice::<IgnoredAny>(src).is_ok()
}

fn check(src: &[u8]) -> Result<()> {
    serde_json::from_slice::<IgnoredAny>(src)
        .map(|_| ())
        .map_err(syntax_error)
}

/// Walks bytes of a valid document, separating string contents from
/// structural bytes.
struct Scanner {
    in_string: bool,
    escaped: bool,
}

impl Scanner {
    fn new() -> Self {
        Self {
            in_string: false,
            escaped: false,
        }
    }

    /// Returns true when `c` belongs to a string literal (quotes excluded
    /// only for the opening one).
    fn in_literal(&mut self, c: u8) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == b'\\' {
                self.escaped = true;
            } else if c == b'"' {
                self.in_string = false;
            }
            return true;
        }
        false
    }
}

fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r')
}

/// Remove insignificant whitespace.
pub fn compact(src: &[u8]) -> Result<Vec<u8>> {
    check(src)?;
    let mut out = Vec::with_capacity(src.len());
    let mut scan = Scanner::new();
    for &c in src {
        if scan.in_literal(c) {
            out.push(c);
            continue;
        }
        if is_space(c) {
            continue;
        }
        if c == b'"' {
            scan.in_string = true;
        }
        out.push(c);
    }
    Ok(out)
}

fn newline(out: &mut Vec<u8>, prefix: &[u8], indent: &[u8], depth: usize) {
    out.push(b'\n');
    out.extend_from_slice(prefix);
    for _ in 0..depth {
        out.extend_from_slice(indent);
    }
}

/// Reformat with one element per line. Every line after the first starts
/// with `prefix`, then one `indent` per nesting level. Empty arrays and
/// objects stay `[]` and `{}`.
pub fn indent(src: &[u8], prefix: &[u8], indent: &[u8]) -> Result<Vec<u8>> {
    check(src)?;
    let mut out = Vec::with_capacity(src.len() * 2);
    let mut scan = Scanner::new();
    let mut need_indent = false;
    let mut depth = 0usize;
    for &c in src {
        if scan.in_literal(c) {
            out.push(c);
            continue;
        }
        if is_space(c) {
            continue;
        }
        if need_indent && c != b']' && c != b'}' {
            need_indent = false;
            depth += 1;
            newline(&mut out, prefix, indent, depth);
        }
        match c {
            b'"' => {
                scan.in_string = true;
                out.push(c);
            }
            b'{' | b'[' => {
                need_indent = true;
                out.push(c);
            }
            b',' => {
                out.push(c);
                newline(&mut out, prefix, indent, depth);
            }
            b':' => out.extend_from_slice(b": "),
            b'}' | b']' => {
                if need_indent {
                    need_indent = false;
                } else {
                    depth = depth.saturating_sub(1);
                    newline(&mut out, prefix, indent, depth);
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

const LINE_SEP: &[u8] = "\u{2028}".as_bytes();
const PARA_SEP: &[u8] = "\u{2029}".as_bytes();

/// Replace `<`, `>`, `&`, U+2028 and U+2029 with `\u` escapes.
pub fn html_escape(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        match src[i] {
            b'<' => out.extend_from_slice(b"\\u003c"),
            b'>' => out.extend_from_slice(b"\\u003e"),
            b'&' => out.extend_from_slice(b"\\u0026"),
            0xE2 if src[i..].starts_with(LINE_SEP) => {
                out.extend_from_slice(b"\\u2028");
                i += 2;
            }
            0xE2 if src[i..].starts_with(PARA_SEP) => {
                out.extend_from_slice(b"\\u2029");
                i += 2;
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// Parse one value; numbers keep their source text.
pub fn unmarshal(src: &[u8]) -> Result<JsonValue> {
    let v: serde_json::Value = serde_json::from_slice(src).map_err(syntax_error)?;
    JsonValue::from_serde(v, true)
}

fn write_string(out: &mut Vec<u8>, s: &str, escape_html: bool) {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\x08' => out.extend_from_slice(b"\\b"),
            '\x0c' => out.extend_from_slice(b"\\f"),
            '<' | '>' | '&' if escape_html => {
                let b = c as u8;
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(b >> 4) as usize]);
                out.push(HEX[(b & 0xF) as usize]);
            }
            c if (c as u32) < 0x20 => {
                let b = c as u8;
                out.extend_from_slice(b"\\u00");
                out.push(HEX[(b >> 4) as usize]);
                out.push(HEX[(b & 0xF) as usize]);
            }
            '\u{2028}' => out.extend_from_slice(b"\\u2028"),
            '\u{2029}' => out.extend_from_slice(b"\\u2029"),
            c => {
                let mut tmp = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
    out.push(b'"');
}

fn write_float(out: &mut Vec<u8>, f: f64) {
    let abs = f.abs();
    let fmt = if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        b'e'
    } else {
        b'f'
    };
    let mut text = conv::format_float(f, fmt, -1, 64).into_bytes();
    let n = text.len();
    if fmt == b'e' && n >= 4 && text[n - 4] == b'e' && text[n - 3] == b'-' && text[n - 2] == b'0' {
        text[n - 2] = text[n - 1];
        text.truncate(n - 1);
    }
    out.extend_from_slice(&text);
}

fn write_value(out: &mut Vec<u8>, v: &JsonValue, escape_html: bool) {
    match v {
        JsonValue::Null => out.extend_from_slice(b"null"),
        JsonValue::Bool(true) => out.extend_from_slice(b"true"),
        JsonValue::Bool(false) => out.extend_from_slice(b"false"),
        JsonValue::Number(JsonNumber::Text(s)) => out.extend_from_slice(s.as_bytes()),
        JsonValue::Number(JsonNumber::Float(f)) => write_float(out, *f),
        JsonValue::String(s) => write_string(out, s, escape_html),
        JsonValue::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, item, escape_html);
            }
            out.push(b']');
        }
        JsonValue::Object(map) => {
            out.push(b'{');
            for (i, (k, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(out, k, escape_html);
                out.push(b':');
                write_value(out, item, escape_html);
            }
            out.push(b'}');
        }
    }
}

/// Serialize compactly with HTML-sensitive characters escaped.
pub fn marshal(v: &JsonValue) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(&mut out, v, true);
    out
}

/// Serialize and indent.
pub fn marshal_indent(v: &JsonValue, prefix: &[u8], ind: &[u8]) -> Result<Vec<u8>> {
    indent(&marshal(v), prefix, ind)
}

/// Decoder over a stream of concatenated JSON values.
#[derive(Debug)]
pub struct StreamDecoder {
    data: Vec<u8>,
    pos: usize,
    use_number: bool,
    disallow_unknown_fields: bool,
    failed: Option<(Status, String)>,
}

impl StreamDecoder {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            use_number: false,
            disallow_unknown_fields: false,
            failed: None,
        }
    }

    /// Keep numbers as source text instead of `f64`.
    pub fn use_number(&mut self) {
        self.use_number = true;
    }

    /// Values decode into untyped trees, which have no unknown fields; the
    /// setting is recorded only.
    pub fn disallow_unknown_fields(&mut self) {
        self.disallow_unknown_fields = true;
    }

    /// Offset just past the last decoded value.
    pub fn input_offset(&self) -> i64 {
        self.pos as i64
    }

    fn peek(&self) -> Option<u8> {
        self.data[self.pos..].iter().copied().find(|&c| !is_space(c))
    }

    /// Whether another element follows in the current array, object or
    /// top-level stream.
    pub fn more(&self) -> bool {
        matches!(self.peek(), Some(c) if c != b']' && c != b'}')
    }

    /// Bytes not yet consumed by a decode.
    pub fn buffered(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Decode the next value. `Ok(None)` at end of input. Errors are sticky.
    pub fn decode(&mut self) -> Result<Option<JsonValue>> {
        if let Some((status, msg)) = &self.failed {
            return Err(match status {
                Status::Syntax => Error::syntax(msg.clone()),
                _ => Error::other(msg.clone()),
            });
        }
        if self.peek().is_none() {
            return Ok(None);
        }
        let rest = &self.data[self.pos..];
        let mut stream =
            serde_json::Deserializer::from_slice(rest).into_iter::<serde_json::Value>();
        let result = match stream.next() {
            None => return Ok(None),
            Some(Ok(v)) => {
                let consumed = stream.byte_offset();
                JsonValue::from_serde(v, self.use_number).map(|v| (v, consumed))
            }
            Some(Err(e)) => Err(syntax_error(e)),
        };
        match result {
            Ok((v, consumed)) => {
                self.pos += consumed;
                Ok(Some(v))
            }
            Err(e) => {
                self.failed = Some((e.status(), e.to_string()));
                Err(e)
            }
        }
    }
}

/// Encoder writing newline-terminated values into a buffer.
pub struct StreamEncoder {
    sink: BufferSink,
    escape_html: bool,
    prefix: Vec<u8>,
    indent: Vec<u8>,
}

impl StreamEncoder {
    pub fn new(sink: BufferSink) -> Self {
        Self {
            sink,
            escape_html: true,
            prefix: Vec::new(),
            indent: Vec::new(),
        }
    }

    pub fn set_escape_html(&mut self, on: bool) {
        self.escape_html = on;
    }

    pub fn set_indent(&mut self, prefix: &[u8], indent: &[u8]) {
        self.prefix = prefix.to_vec();
        self.indent = indent.to_vec();
    }

    pub fn encode(&mut self, v: &JsonValue) -> Result<()> {
        let mut out = Vec::new();
        write_value(&mut out, v, self.escape_html);
        if !self.prefix.is_empty() || !self.indent.is_empty() {
            out = indent(&out, &self.prefix, &self.indent)?;
        }
        out.push(b'\n');
        self.sink.append(&out);
        Ok(())
    }
}

fn new_value(v: JsonValue) -> FatJsonValue {
    FatJsonValue::register(v)
}

fn kind_violation(op: &str, want: &str, got: &JsonValue) -> ! {
    ffi::contract::violation(op, format_args!("value is {:?}, not {}", got.kind(), want))
}

/// Reports whether `data` is one well-formed JSON value.
#[no_mangle]
pub extern "C" fn fat_JsonValid(data: FatBytes) -> bool {
    valid(data.resolve("fat_JsonValid").as_slice())
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonCompact(
    src: FatBytes,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonCompact";
    let out_err = ffi::out_err(OP, out_err);
    let out_bytes = raw::out(OP, out_bytes, "out_bytes");
    *out_bytes = FatBytes::invalid();
    let result = compact(src.resolve(OP).as_slice());
    ffi::complete(OP, out_err, result, |b| *out_bytes = FatBytes::register(Bytes::new(b)))
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonIndent(
    src: FatBytes,
    prefix: FatString,
    indent_str: FatString,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonIndent";
    let out_err = ffi::out_err(OP, out_err);
    let out_bytes = raw::out(OP, out_bytes, "out_bytes");
    *out_bytes = FatBytes::invalid();
    let (prefix, ind) = (prefix.resolve(OP), indent_str.resolve(OP));
    let result = indent(src.resolve(OP).as_slice(), prefix.as_bytes(), ind.as_bytes());
    ffi::complete(OP, out_err, result, |b| *out_bytes = FatBytes::register(Bytes::new(b)))
}

/// Escapes `<`, `>`, `&`, U+2028 and U+2029 inside string literals.
#[no_mangle]
pub extern "C" fn fat_JsonHTMLEscape(src: FatBytes) -> FatBytes {
    let out = html_escape(src.resolve("fat_JsonHTMLEscape").as_slice());
    FatBytes::register(Bytes::new(out))
}

/// Parses one JSON document. Malformed or truncated input is `SYNTAX`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonUnmarshal(
    data: FatBytes,
    out_value: *mut FatJsonValue,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonUnmarshal";
    let out_err = ffi::out_err(OP, out_err);
    let out_value = raw::out(OP, out_value, "out_value");
    *out_value = FatJsonValue::invalid();
    let result = unmarshal(data.resolve(OP).as_slice());
    ffi::complete(OP, out_err, result, |v| *out_value = new_value(v))
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonMarshal(
    value: FatJsonValue,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonMarshal";
    let out_err = ffi::out_err(OP, out_err);
    let out_bytes = raw::out(OP, out_bytes, "out_bytes");
    *out_bytes = FatBytes::invalid();
    let result = Ok(marshal(&value.resolve(OP)));
    ffi::complete(OP, out_err, result, |b| *out_bytes = FatBytes::register(Bytes::new(b)))
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonMarshalIndent(
    value: FatJsonValue,
    prefix: FatString,
    indent_str: FatString,
    out_bytes: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonMarshalIndent";
    let out_err = ffi::out_err(OP, out_err);
    let out_bytes = raw::out(OP, out_bytes, "out_bytes");
    *out_bytes = FatBytes::invalid();
    let (prefix, ind) = (prefix.resolve(OP), indent_str.resolve(OP));
    let result = marshal_indent(&value.resolve(OP), prefix.as_bytes(), ind.as_bytes());
    ffi::complete(OP, out_err, result, |b| *out_bytes = FatBytes::register(Bytes::new(b)))
}

/// Releases the value. Handles taken from it stay live.
#[no_mangle]
pub extern "C" fn fat_JsonValueFree(value: FatJsonValue) {
    value.release("fat_JsonValueFree");
}

/// Kind of the value.
#[no_mangle]
pub extern "C" fn fat_JsonValueType(value: FatJsonValue) -> JsonKind {
    value.resolve("fat_JsonValueType").kind()
}

/// Non-bool values are fatal.
#[no_mangle]
pub extern "C" fn fat_JsonValueAsBool(value: FatJsonValue) -> bool {
    const OP: &str = "fat_JsonValueAsBool";
    match *value.resolve(OP) {
        JsonValue::Bool(b) => b,
        ref other => kind_violation(OP, "bool", other),
    }
}

/// String contents of a STRING value.
#[no_mangle]
pub extern "C" fn fat_JsonValueAsString(value: FatJsonValue) -> FatString {
    const OP: &str = "fat_JsonValueAsString";
    match &*value.resolve(OP) {
        JsonValue::String(s) => new_string(s.as_str()),
        other => kind_violation(OP, "string", other),
    }
}

/// Source text of a NUMBER value.
#[no_mangle]
pub extern "C" fn fat_JsonValueAsNumberString(value: FatJsonValue) -> FatString {
    const OP: &str = "fat_JsonValueAsNumberString";
    match &*value.resolve(OP) {
        JsonValue::Number(n) => new_string(n.to_text()),
        other => kind_violation(OP, "number", other),
    }
}

/// Number of elements of an ARRAY value.
#[no_mangle]
pub extern "C" fn fat_JsonArrayLen(value: FatJsonValue) -> usize {
    const OP: &str = "fat_JsonArrayLen";
    match &*value.resolve(OP) {
        JsonValue::Array(items) => items.len(),
        other => kind_violation(OP, "array", other),
    }
}

/// Returns element `idx` as a new handle. Out of range is fatal.
#[no_mangle]
pub extern "C" fn fat_JsonArrayGet(value: FatJsonValue, idx: usize) -> FatJsonValue {
    const OP: &str = "fat_JsonArrayGet";
    match &*value.resolve(OP) {
        JsonValue::Array(items) => match items.get(idx) {
            Some(item) => FatJsonValue::register_shared(Arc::clone(item)),
            None => ffi::contract::violation(
                OP,
                format_args!("index {} out of range ({})", idx, items.len()),
            ),
        },
        other => kind_violation(OP, "array", other),
    }
}

/// Object keys in sorted order.
#[no_mangle]
pub extern "C" fn fat_JsonObjectKeys(value: FatJsonValue) -> FatStringArray {
    const OP: &str = "fat_JsonObjectKeys";
    match &*value.resolve(OP) {
        JsonValue::Object(map) => {
            FatStringArray::register(TextArray::from_strs(&map.keys().collect::<Vec<_>>()))
        }
        other => kind_violation(OP, "object", other),
    }
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonObjectGet(
    value: FatJsonValue,
    key: FatString,
    out_found: *mut bool,
    out_value: *mut FatJsonValue,
) {
    const OP: &str = "fat_JsonObjectGet";
    let out_found = raw::out(OP, out_found, "out_found");
    let out_value = raw::out(OP, out_value, "out_value");
    *out_found = false;
    *out_value = FatJsonValue::invalid();
    let key = key.resolve(OP);
    match &*value.resolve(OP) {
        JsonValue::Object(map) => {
            if let Some(item) = map.get(key.to_str_lossy().as_ref()) {
                *out_found = true;
                *out_value = FatJsonValue::register_shared(Arc::clone(item));
            }
        }
        other => kind_violation(OP, "object", other),
    }
}

/// Creates a decoder over the reader's unread bytes, which it consumes.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderNewBytesReader(r: FatBytesReader) -> FatJsonDecoder {
    let data = r.resolve("fat_JsonDecoderNewBytesReader").lock().take_rest();
    FatJsonDecoder::register(Mutex::new(StreamDecoder::new(data)))
}

/// Releases the decoder.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderFree(d: FatJsonDecoder) {
    d.release("fat_JsonDecoderFree");
}

/// Keeps numbers as their source text. Numbers are always kept that way, so
/// this only records the setting.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderUseNumber(d: FatJsonDecoder) {
    d.resolve("fat_JsonDecoderUseNumber").lock().use_number();
}

/// Recorded for compatibility; values are untyped so nothing is rejected.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderDisallowUnknownFields(d: FatJsonDecoder) {
    d.resolve("fat_JsonDecoderDisallowUnknownFields")
        .lock()
        .disallow_unknown_fields();
}

/// Offset of the decoder in the input stream.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderInputOffset(d: FatJsonDecoder) -> i64 {
    d.resolve("fat_JsonDecoderInputOffset").lock().input_offset()
}

/// Reports whether another element follows in the current array or object, or at top level.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderMore(d: FatJsonDecoder) -> bool {
    d.resolve("fat_JsonDecoderMore").lock().more()
}

/// Copy of the input not yet consumed.
#[no_mangle]
pub extern "C" fn fat_JsonDecoderBufferedBytes(d: FatJsonDecoder) -> FatBytes {
    let data = d.resolve("fat_JsonDecoderBufferedBytes").lock().buffered().to_vec();
    FatBytes::register(Bytes::new(data))
}

/// Decodes the next value. At end of input sets `*out_eof` and leaves
/// `*out_value` 0.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonDecoderDecodeValue(
    d: FatJsonDecoder,
    out_value: *mut FatJsonValue,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonDecoderDecodeValue";
    let out_err = ffi::out_err(OP, out_err);
    let out_value = raw::out(OP, out_value, "out_value");
    let out_eof = raw::out(OP, out_eof, "out_eof");
    *out_value = FatJsonValue::invalid();
    *out_eof = false;
    let result = d.resolve(OP).lock().decode();
    ffi::complete(OP, out_err, result, |v| match v {
        Some(v) => *out_value = new_value(v),
        None => *out_eof = true,
    })
}

/// Creates an encoder that appends to `dst`.
#[no_mangle]
pub extern "C" fn fat_JsonEncoderNewToBytesBuffer(dst: FatBytesBuffer) -> FatJsonEncoder {
    let sink = BufferSink::resolve(dst, "fat_JsonEncoderNewToBytesBuffer");
    FatJsonEncoder::register(Mutex::new(StreamEncoder::new(sink)))
}

/// Releases the encoder.
#[no_mangle]
pub extern "C" fn fat_JsonEncoderFree(e: FatJsonEncoder) {
    e.release("fat_JsonEncoderFree");
}

/// Turns escaping of `<`, `>` and `&` on or off.
#[no_mangle]
pub extern "C" fn fat_JsonEncoderSetEscapeHTML(e: FatJsonEncoder, on: bool) {
    e.resolve("fat_JsonEncoderSetEscapeHTML").lock().set_escape_html(on);
}

/// Indents subsequent values; empty prefix and indent turn indentation off.
#[no_mangle]
pub extern "C" fn fat_JsonEncoderSetIndent(
    e: FatJsonEncoder,
    prefix: FatString,
    indent_str: FatString,
) {
    const OP: &str = "fat_JsonEncoderSetIndent";
    let (prefix, ind) = (prefix.resolve(OP), indent_str.resolve(OP));
    e.resolve(OP).lock().set_indent(prefix.as_bytes(), ind.as_bytes());
}

/// Writes `value` followed by a newline.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_JsonEncoderEncodeValue(
    e: FatJsonEncoder,
    value: FatJsonValue,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_JsonEncoderEncodeValue";
    let out_err = ffi::out_err(OP, out_err);
    let value = value.resolve(OP);
    let result = e.resolve(OP).lock().encode(&value);
    ffi::complete(OP, out_err, result, |()| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    fn text(b: Vec<u8>) -> String {
        String::from_utf8(b).expect("output should be UTF-8")
    }

    #[test]
    fn test_valid() {
        assert!(valid(br#"{"a":[1,2,{"b":null}]}"#));
        assert!(valid(b" 42 "));
        assert!(!valid(b"{"));
        assert!(!valid(b""));
        assert!(!valid(b"[1,]"));
    }

    #[test]
    fn test_compact_and_indent() {
        let src = br#" { "a" : [ 1 , 2 ], "s": "x y" , "e": {} } "#;
        assert_eq!(text(compact(src).unwrap()), r#"{"a":[1,2],"s":"x y","e":{}}"#);
        let out = text(indent(br#"{"a":[1,2],"e":[]}"#, b"", b"  ").unwrap());
        assert_eq!(out, "{\n  \"a\": [\n    1,\n    2\n  ],\n  \"e\": []\n}");
        let out = text(indent(b"[1]", b">", b"\t").unwrap());
        assert_eq!(out, "[\n>\t1\n>]");
        let err = compact(b"{\"a\":").unwrap_err();
        assert_eq!(err.status(), Status::Syntax);
        assert_eq!(err.to_string(), "unexpected end of JSON input");
    }

    #[test]
    fn test_html_escape() {
        let out = html_escape("<a href=\"x&y\">\u{2028}".as_bytes());
        assert_eq!(text(out), "\\u003ca href=\"x\\u0026y\"\\u003e\\u2028");
    }

    #[test]
    fn test_unmarshal_keeps_number_text() {
        let v = unmarshal(br#"{"n": 1.50, "big": 12345678901234567890, "t": true}"#).unwrap();
        let JsonValue::Object(map) = &v else {
            panic!("expected object");
        };
        assert_eq!(*map["n"], JsonValue::Number(JsonNumber::Text("1.50".into())));
        assert_eq!(
            *map["big"],
            JsonValue::Number(JsonNumber::Text("12345678901234567890".into()))
        );
        assert_eq!(text(marshal(&v)), r#"{"big":12345678901234567890,"n":1.50,"t":true}"#);
    }

    #[test]
    fn test_marshal_escapes() {
        let v = JsonValue::String("<tag> & \"q\"\n\u{1}".into());
        assert_eq!(
            text(marshal(&v)),
            r#""\u003ctag\u003e \u0026 \"q\"\n\u0001""#
        );
        let out = marshal_indent(&unmarshal(br#"{"a":[true]}"#).unwrap(), b"", b" ").unwrap();
        assert_eq!(text(out), "{\n \"a\": [\n  true\n ]\n}");
    }

    #[test]
    fn test_float_marshal() {
        let mut out = Vec::new();
        write_float(&mut out, 1000000.0);
        assert_eq!(out, b"1000000");
        out.clear();
        write_float(&mut out, 1e-7);
        assert_eq!(out, b"1e-7");
        out.clear();
        write_float(&mut out, 1e21);
        assert_eq!(out, b"1e+21");
        out.clear();
        write_float(&mut out, 0.5);
        assert_eq!(out, b"0.5");
    }

    #[test]
    fn test_stream_decoder() {
        let mut d = StreamDecoder::new(b" {\"a\":1} [2] 3 ".to_vec());
        assert!(d.more());
        let v = d.decode().unwrap().expect("first value");
        assert_eq!(v.kind(), JsonKind::Object);
        assert_eq!(d.input_offset(), 8);
        let v = d.decode().unwrap().expect("second value");
        let JsonValue::Array(items) = v else {
            panic!("expected array");
        };
        assert_eq!(*items[0], JsonValue::Number(JsonNumber::Float(2.0)));
        assert_eq!(d.buffered(), b" 3 ");
        assert!(d.decode().unwrap().is_some());
        assert!(!d.more());
        assert!(d.decode().unwrap().is_none());
    }

    #[test]
    fn test_stream_decoder_use_number_and_sticky_error() {
        let mut d = StreamDecoder::new(b"1.0 }".to_vec());
        d.use_number();
        let v = d.decode().unwrap().expect("number");
        assert_eq!(v, JsonValue::Number(JsonNumber::Text("1.0".into())));
        assert_eq!(d.decode().unwrap_err().status(), Status::Syntax);
        assert_eq!(d.decode().unwrap_err().status(), Status::Syntax);
    }

    #[test]
    fn test_stream_encoder() {
        let buf = Arc::new(Mutex::new(Buffer::default()));
        let mut e = StreamEncoder::new(BufferSink::new(Arc::clone(&buf)));
        let v = unmarshal(br#"{"k":"<v>"}"#).unwrap();
        e.encode(&v).unwrap();
        e.set_escape_html(false);
        e.set_indent(b"", b"  ");
        e.encode(&v).unwrap();
        assert_eq!(
            buf.lock().unread(),
            b"{\"k\":\"\\u003cv\\u003e\"}\n{\n  \"k\": \"<v>\"\n}\n"
        );
    }

    #[test]
    fn test_value_handles_are_independent() {
        let data = FatBytes::register(Bytes::new(b"[10, \"x\"]".to_vec()));
        let mut v = FatJsonValue::invalid();
        let mut err = FatError::invalid();
        let status = unsafe { fat_JsonUnmarshal(data, &mut v, &mut err) };
        assert_eq!(status, Status::Ok);
        assert_eq!(fat_JsonArrayLen(v), 2);
        let a = fat_JsonArrayGet(v, 1);
        let b = fat_JsonArrayGet(v, 1);
        assert_ne!(a.raw(), b.raw());
        fat_JsonValueFree(v);
        let s = fat_JsonValueAsString(a);
        assert_eq!(s.resolve("test").as_bytes(), b"x");
        fat_JsonValueFree(a);
        fat_JsonValueFree(b);
        crate::string::fat_StringFree(s);
        crate::bytes::fat_BytesFree(data);
    }

    #[test]
    fn test_unmarshal_error_reports_status() {
        let data = FatBytes::register(Bytes::new(b"{\"a\" 1}".to_vec()));
        let mut v = FatJsonValue::invalid();
        let mut err = FatError::invalid();
        let status = unsafe { fat_JsonUnmarshal(data, &mut v, &mut err) };
        assert_eq!(status, Status::Syntax);
        assert!(!v.is_valid());
        assert!(err.is_valid());
        crate::error::fat_ErrorFree(err);
        crate::bytes::fat_BytesFree(data);
    }
}
