//! XML tokenizer, escaping and token encoder.
//!
//! Decoding is done by a `quick-xml` namespace-aware reader configured to
//! expand `<a/>` into a start/end pair and to check end-tag names. Tokens
//! are converted into owned [`Token`] values so each can live behind its
//! own handle.

use std::io::Cursor;
use std::os::raw::{c_char, c_int};

use parking_lot::Mutex;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::buffer::BufferSink;
use crate::bytes::{self, Bytes};
use crate::error::{Error, Result};
use crate::ffi::{
    self, contract, raw, FatBytes, FatBytesBuffer, FatError, FatString, FatXmlDecoder,
    FatXmlEncoder, FatXmlToken,
};
use crate::string::new_string;
use crate::types::{Status, XmlTokenKind};

const XMLNS: &str = "xmlns";
const XML_NS_URI: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace-qualified name. `space` is a namespace URI after translation,
/// or the raw prefix for raw tokens and unknown prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name {
    pub space: String,
    pub local: String,
}

impl Name {
    pub fn new(space: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            local: local.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub name: Name,
    pub value: String,
}

/// One XML token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    StartElement { name: Name, attrs: Vec<Attr> },
    EndElement { name: Name },
    CharData(Vec<u8>),
    Comment(Vec<u8>),
    Directive(Vec<u8>),
    ProcInst { target: String, inst: Vec<u8> },
}

impl Token {
    pub fn kind(&self) -> XmlTokenKind {
        match self {
            Token::StartElement { .. } => XmlTokenKind::StartElement,
            Token::EndElement { .. } => XmlTokenKind::EndElement,
            Token::CharData(_) => XmlTokenKind::CharData,
            Token::Comment(_) => XmlTokenKind::Comment,
            Token::Directive(_) => XmlTokenKind::Directive,
            Token::ProcInst { .. } => XmlTokenKind::ProcInst,
        }
    }
}

fn utf8(raw: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(raw).map_err(|e| e.to_string())
}

fn unescape_text(raw: &[u8]) -> std::result::Result<String, String> {
    let text = unescape(utf8(raw)?).map_err(|e| e.to_string())?;
    Ok(text.replace("\r\n", "\n"))
}

fn split_qname(raw: &[u8]) -> (&[u8], &[u8]) {
    match bytes::index_byte(raw, b':') {
        Some(i) => (&raw[..i], &raw[i + 1..]),
        None => (&[], raw),
    }
}

fn lossy(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

/// Streaming tokenizer over an in-memory document.
pub struct Decoder {
    reader: NsReader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
    depth: usize,
    failed: Option<String>,
}

impl Decoder {
    pub fn new(data: Vec<u8>) -> Self {
        let mut reader = NsReader::from_reader(Cursor::new(data));
        let config = reader.config_mut();
        config.expand_empty_elements = true;
        config.check_end_names = true;
        Self {
            reader,
            buf: Vec::new(),
            depth: 0,
            failed: None,
        }
    }

    /// Byte offset of the end of the last token.
    pub fn input_offset(&self) -> i64 {
        self.reader.buffer_position() as i64
    }

    /// 1-based line and column of the current offset.
    pub fn input_pos(&self) -> (usize, usize) {
        let data = self.reader.get_ref().get_ref();
        let pos = (self.reader.buffer_position() as usize).min(data.len());
        let consumed = &data[..pos];
        let line = 1 + consumed.iter().filter(|&&c| c == b'\n').count();
        let line_start = consumed.iter().rposition(|&c| c == b'\n').map_or(0, |i| i + 1);
        (line, pos - line_start + 1)
    }

    fn fail(&mut self, reason: impl std::fmt::Display) -> Error {
        let msg = format!("XML syntax error on line {}: {}", self.input_pos().0, reason);
        self.failed = Some(msg.clone());
        Error::syntax(msg)
    }

    fn resolve_element(&self, start_name: QName<'_>, translate: bool) -> Name {
        let (prefix, local) = split_qname(start_name.as_ref());
        if !translate {
            return Name::new(lossy(prefix), lossy(local));
        }
        let (ns, local) = self.reader.resolve_element(start_name);
        let space = match ns {
            ResolveResult::Bound(ns) => lossy(ns.as_ref()),
            ResolveResult::Unbound => String::new(),
            ResolveResult::Unknown(prefix) => lossy(&prefix),
        };
        Name::new(space, lossy(local.as_ref()))
    }

    fn attrs(
        &self,
        start: &BytesStart<'_>,
        translate: bool,
    ) -> std::result::Result<Vec<Attr>, String> {
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = attr.key.as_ref();
            let (prefix, local) = split_qname(key);
            let name = if !translate || prefix == XMLNS.as_bytes() || prefix.is_empty() {
                Name::new(lossy(prefix), lossy(local))
            } else if prefix == b"xml" {
                Name::new(XML_NS_URI, lossy(local))
            } else {
                match self.reader.resolve_attribute(attr.key).0 {
                    ResolveResult::Bound(ns) => Name::new(lossy(ns.as_ref()), lossy(local)),
                    _ => Name::new(lossy(prefix), lossy(local)),
                }
            };
            let value = unescape_text(&attr.value)?;
            attrs.push(Attr { name, value });
        }
        Ok(attrs)
    }

    fn read(&mut self, translate: bool) -> Result<Option<Token>> {
        if let Some(msg) = &self.failed {
            return Err(Error::syntax(msg.clone()));
        }
        self.buf.clear();
        let event = match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => event.into_owned(),
            Err(e) => return Err(self.fail(e)),
        };
        let token = match event {
            Event::Start(start) | Event::Empty(start) => {
                let name = self.resolve_element(start.name(), translate);
                match self.attrs(&start, translate) {
                    Ok(attrs) => {
                        self.depth += 1;
                        Token::StartElement { name, attrs }
                    }
                    Err(e) => return Err(self.fail(e)),
                }
            }
            Event::End(end) => {
                self.depth = self.depth.saturating_sub(1);
                Token::EndElement {
                    name: self.resolve_element(end.name(), translate),
                }
            }
            Event::Text(text) => match unescape_text(&text) {
                Ok(s) => Token::CharData(s.into_bytes()),
                Err(e) => return Err(self.fail(e)),
            },
            Event::CData(data) => Token::CharData(data.to_vec()),
            Event::Comment(text) => Token::Comment(text.to_vec()),
            Event::DocType(text) => {
                let mut directive = b"DOCTYPE ".to_vec();
                directive.extend_from_slice(text.trim_ascii_start());
                Token::Directive(directive)
            }
            Event::Decl(decl) => proc_inst(&decl),
            Event::PI(pi) => proc_inst(&pi),
            Event::Eof => {
                if self.depth > 0 {
                    return Err(self.fail("unexpected EOF"));
                }
                return Ok(None);
            }
        };
        Ok(Some(token))
    }

    /// Next token with namespaces translated. `Ok(None)` at end of input.
    pub fn token(&mut self) -> Result<Option<Token>> {
        self.read(true)
    }

    /// Next token with names left as written.
    pub fn raw_token(&mut self) -> Result<Option<Token>> {
        self.read(false)
    }

    /// Consume tokens up to the end element matching the most recently
    /// read start element. Returns false if input ended first.
    pub fn skip(&mut self) -> Result<bool> {
        let mut depth = 0usize;
        loop {
            match self.token()? {
                None => return Ok(false),
                Some(Token::StartElement { .. }) => depth += 1,
                Some(Token::EndElement { .. }) => {
                    if depth == 0 {
                        return Ok(true);
                    }
                    depth -= 1;
                }
                Some(_) => {}
            }
        }
    }
}

fn proc_inst(content: &[u8]) -> Token {
    let content = content.trim_ascii();
    let split = content
        .iter()
        .position(|c| c.is_ascii_whitespace())
        .unwrap_or(content.len());
    Token::ProcInst {
        target: lossy(&content[..split]),
        inst: content[split..].trim_ascii_start().to_vec(),
    }
}

/// A parsed element with its attributes, children and concatenated text.
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub(crate) name: String,
    pub(crate) attrs: Vec<(String, String)>,
    pub(crate) children: Vec<Element>,
    pub(crate) text: String,
}

impl Element {
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub(crate) fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn children_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

/// Parse a whole document into its root element. Names are local names.
pub(crate) fn parse_tree(data: Vec<u8>) -> Result<Element> {
    let mut dec = Decoder::new(data);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;
    while let Some(tok) = dec.token()? {
        match tok {
            Token::StartElement { name, attrs } => stack.push(Element {
                name: name.local,
                attrs: attrs.into_iter().map(|a| (a.name.local, a.value)).collect(),
                ..Element::default()
            }),
            Token::EndElement { .. } => {
                if let Some(done) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => root = Some(done),
                    }
                }
            }
            Token::CharData(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&text));
                }
            }
            _ => {}
        }
    }
    root.ok_or_else(|| Error::syntax("XML syntax error: no root element"))
}

fn in_char_range(c: char) -> bool {
    matches!(c as u32,
        0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x10000..=0x10FFFF)
}

fn escape_into(out: &mut Vec<u8>, src: &[u8], escape_newline: bool) {
    for (at, c, w) in bytes::runes(src) {
        match c {
            Some('"') => out.extend_from_slice(b"&#34;"),
            Some('\'') => out.extend_from_slice(b"&#39;"),
            Some('&') => out.extend_from_slice(b"&amp;"),
            Some('<') => out.extend_from_slice(b"&lt;"),
            Some('>') => out.extend_from_slice(b"&gt;"),
            Some('\t') => out.extend_from_slice(b"&#x9;"),
            Some('\n') if escape_newline => out.extend_from_slice(b"&#xA;"),
            Some('\r') => out.extend_from_slice(b"&#xD;"),
            Some(c) if in_char_range(c) => out.extend_from_slice(&src[at..at + w]),
            _ => out.extend_from_slice("\u{FFFD}".as_bytes()),
        }
    }
}

/// Escape text for use as character data or an attribute value.
pub fn escape_text(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    escape_into(&mut out, src, true);
    out
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let start_ok = |c: char| c.is_alphabetic() || c == '_' || c == ':';
    start_ok(first) && chars.all(|c| start_ok(c) || c.is_alphanumeric() || c == '-' || c == '.')
}

fn is_valid_directive(dir: &[u8]) -> bool {
    let mut depth = 0usize;
    let mut in_quote = 0u8;
    let mut in_comment = false;
    for (i, &c) in dir.iter().enumerate() {
        if in_comment {
            if c == b'>' && i >= 2 && &dir[i - 2..=i] == b"-->" {
                in_comment = false;
            }
        } else if in_quote != 0 {
            if c == in_quote {
                in_quote = 0;
            }
        } else if c == b'\'' || c == b'"' {
            in_quote = c;
        } else if c == b'<' {
            if dir[i..].starts_with(b"<!--") && i + 4 < dir.len() {
                in_comment = true;
            } else {
                depth += 1;
            }
        } else if c == b'>' {
            if depth == 0 {
                return false;
            }
            depth -= 1;
        }
    }
    depth == 0 && in_quote == 0 && !in_comment
}

/// Writes tokens as XML text, buffering until flushed.
pub struct Encoder {
    sink: BufferSink,
    pending: Vec<u8>,
    tags: Vec<Name>,
    prefix: Vec<u8>,
    indent: Vec<u8>,
    depth: usize,
    indented_in: bool,
    put_newline: bool,
    wrote_any: bool,
}

impl Encoder {
    pub fn new(sink: BufferSink) -> Self {
        Self {
            sink,
            pending: Vec::new(),
            tags: Vec::new(),
            prefix: Vec::new(),
            indent: Vec::new(),
            depth: 0,
            indented_in: false,
            put_newline: false,
            wrote_any: false,
        }
    }

    /// Start each element on a new line with `prefix` and one `indent`
    /// per nesting level.
    pub fn set_indent(&mut self, prefix: &[u8], indent: &[u8]) {
        self.prefix = prefix.to_vec();
        self.indent = indent.to_vec();
    }

    fn write_indent(&mut self, delta: i32) {
        if self.prefix.is_empty() && self.indent.is_empty() {
            return;
        }
        if delta < 0 {
            self.depth = self.depth.saturating_sub(1);
            if self.indented_in {
                self.indented_in = false;
                return;
            }
            self.indented_in = false;
        }
        if self.put_newline {
            self.pending.push(b'\n');
        } else {
            self.put_newline = true;
        }
        self.pending.extend_from_slice(&self.prefix);
        for _ in 0..self.depth {
            self.pending.extend_from_slice(&self.indent);
        }
        if delta > 0 {
            self.depth += 1;
            self.indented_in = true;
        }
    }

    fn write_name(&mut self, name: &Name) {
        self.pending.extend_from_slice(name.local.as_bytes());
    }

    fn write_attr(&mut self, name: &str, value: &str) {
        self.pending.push(b' ');
        self.pending.extend_from_slice(name.as_bytes());
        self.pending.extend_from_slice(b"=\"");
        escape_into(&mut self.pending, value.as_bytes(), true);
        self.pending.push(b'"');
    }

    fn attr_prefix(space: &str, declared: &mut Vec<(String, String)>) -> Option<String> {
        if space == XML_NS_URI {
            return Some("xml".to_string());
        }
        if let Some((_, p)) = declared.iter().find(|(s, _)| s == space) {
            return Some(p.clone());
        }
        let tail = space.trim_end_matches('/').rsplit('/').next().unwrap_or("");
        let mut prefix: String = tail
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || *c == '.')
            .collect();
        if prefix.is_empty()
            || !is_name(&prefix)
            || prefix.to_ascii_lowercase().starts_with("xml")
        {
            prefix = "_".to_string();
        }
        let base = prefix.clone();
        let mut n = 1;
        while declared.iter().any(|(_, p)| *p == prefix) {
            n += 1;
            prefix = format!("{}{}", base, n);
        }
        declared.push((space.to_string(), prefix.clone()));
        None
    }

    fn write_start(&mut self, name: &Name, attrs: &[Attr]) -> Result<()> {
        if name.local.is_empty() {
            return Err(Error::syntax("xml: start tag with no name"));
        }
        self.tags.push(name.clone());
        self.write_indent(1);
        self.pending.push(b'<');
        self.write_name(name);
        if !name.space.is_empty() {
            self.write_attr(XMLNS, &name.space);
        }
        let mut declared: Vec<(String, String)> = Vec::new();
        for attr in attrs {
            if attr.name.local.is_empty() {
                continue;
            }
            let qualified = match attr.name.space.as_str() {
                "" => attr.name.local.clone(),
                XMLNS => format!("{}:{}", XMLNS, attr.name.local),
                space => {
                    let prefix = match Self::attr_prefix(space, &mut declared) {
                        Some(p) => p,
                        None => {
                            let p = declared.last().map(|(_, p)| p.clone()).unwrap_or_default();
                            self.write_attr(&format!("{}:{}", XMLNS, p), space);
                            p
                        }
                    };
                    format!("{}:{}", prefix, attr.name.local)
                }
            };
            self.write_attr(&qualified, &attr.value);
        }
        self.pending.push(b'>');
        Ok(())
    }

    fn write_end(&mut self, name: &Name) -> Result<()> {
        if name.local.is_empty() {
            return Err(Error::syntax("xml: end tag with no name"));
        }
        let Some(top) = self.tags.last() else {
            return Err(Error::syntax(format!("xml: end tag </{}> without start tag", name.local)));
        };
        if top.local != name.local {
            return Err(Error::syntax(format!(
                "xml: end tag </{}> does not match start tag <{}>",
                name.local, top.local
            )));
        }
        if top.space != name.space {
            return Err(Error::syntax(format!(
                "xml: end tag </{}> in namespace {} does not match start tag <{}> in namespace {}",
                name.local, name.space, top.local, top.space
            )));
        }
        self.tags.pop();
        self.write_indent(-1);
        self.pending.extend_from_slice(b"</");
        self.write_name(name);
        self.pending.push(b'>');
        Ok(())
    }

    /// Encode one token. End tags must match the innermost open start tag.
    pub fn encode_token(&mut self, tok: &Token) -> Result<()> {
        match tok {
            Token::StartElement { name, attrs } => self.write_start(name, attrs)?,
            Token::EndElement { name } => self.write_end(name)?,
            Token::CharData(text) => escape_into(&mut self.pending, text, false),
            Token::Comment(text) => {
                if bytes::contains(text, b"-->") {
                    return Err(Error::syntax("xml: EncodeToken of Comment containing --> marker"));
                }
                self.write_indent(0);
                self.pending.extend_from_slice(b"<!--");
                self.pending.extend_from_slice(text);
                self.pending.extend_from_slice(b"-->");
            }
            Token::ProcInst { target, inst } => {
                if target == "xml" && self.wrote_any {
                    return Err(Error::syntax(
                        "xml: EncodeToken of ProcInst xml target only valid for xml declaration, first token encoded",
                    ));
                }
                if !is_name(target) {
                    return Err(Error::syntax("xml: EncodeToken of ProcInst with invalid Target"));
                }
                if bytes::contains(inst, b"?>") {
                    return Err(Error::syntax("xml: EncodeToken of ProcInst containing ?> marker"));
                }
                self.write_indent(0);
                self.pending.extend_from_slice(b"<?");
                self.pending.extend_from_slice(target.as_bytes());
                if !inst.is_empty() {
                    self.pending.push(b' ');
                    self.pending.extend_from_slice(inst);
                }
                self.pending.extend_from_slice(b"?>");
            }
            Token::Directive(dir) => {
                if !is_valid_directive(dir) {
                    return Err(Error::syntax(
                        "xml: EncodeToken of Directive containing wrong < or > markers",
                    ));
                }
                self.write_indent(0);
                self.pending.extend_from_slice(b"<!");
                self.pending.extend_from_slice(dir);
                self.pending.push(b'>');
            }
        }
        self.wrote_any = true;
        Ok(())
    }

    /// Move buffered output into the destination buffer.
    pub fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.sink.append(&pending);
    }

    /// Flush, then fail if any element is still open.
    pub fn close(&mut self) -> Result<()> {
        self.flush();
        match self.tags.last() {
            Some(open) => Err(Error::syntax(format!("xml: unclosed tag <{}>", open.local))),
            None => Ok(()),
        }
    }
}

type TokenRead = fn(&mut Decoder) -> Result<Option<Token>>;

unsafe fn read_token_export(
    op: &str,
    d: FatXmlDecoder,
    read: TokenRead,
    out_tok: *mut FatXmlToken,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    let out_err = ffi::out_err(op, out_err);
    let out_tok = raw::out(op, out_tok, "out_tok");
    let out_eof = raw::out(op, out_eof, "out_eof");
    *out_tok = FatXmlToken::invalid();
    *out_eof = false;
    let result = read(&mut d.resolve(op).lock());
    ffi::complete(op, out_err, result, |tok| match tok {
        Some(tok) => *out_tok = FatXmlToken::register(tok),
        None => *out_eof = true,
    })
}

fn element_name(op: &str, tok: &Token) -> Name {
    match tok {
        Token::StartElement { name, .. } | Token::EndElement { name } => name.clone(),
        other => {
            contract::violation(op, format_args!("token is {:?}, not an element", other.kind()))
        }
    }
}

/// Creates a decoder over a copy of `b`.
#[no_mangle]
pub extern "C" fn fat_XmlDecoderNewBytes(b: FatBytes) -> FatXmlDecoder {
    let data = b.resolve("fat_XmlDecoderNewBytes").as_slice().to_vec();
    FatXmlDecoder::register(Mutex::new(Decoder::new(data)))
}

/// Opens `path` and decodes its contents. Open failures are `OTHER`.
///
/// # Safety
///
/// `path` must be NUL-terminated; out-pointers must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlDecoderOpenPathUTF8(
    path: *const c_char,
    out_dec: *mut FatXmlDecoder,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_XmlDecoderOpenPathUTF8";
    let out_err = ffi::out_err(OP, out_err);
    let out_dec = raw::out(OP, out_dec, "out_dec");
    *out_dec = FatXmlDecoder::invalid();
    let path = raw::cstr_text(OP, path, "path");
    let result = std::fs::read(&*path).map_err(Error::from);
    ffi::complete(OP, out_err, result, |data| {
        *out_dec = FatXmlDecoder::register(Mutex::new(Decoder::new(data)))
    })
}

/// Releases the decoder.
#[no_mangle]
pub extern "C" fn fat_XmlDecoderFree(d: FatXmlDecoder) {
    d.release("fat_XmlDecoderFree");
}

/// Byte offset just past the last token.
#[no_mangle]
pub extern "C" fn fat_XmlDecoderInputOffset(d: FatXmlDecoder) -> i64 {
    d.resolve("fat_XmlDecoderInputOffset").lock().input_offset()
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlDecoderInputPos(
    d: FatXmlDecoder,
    out_line: *mut c_int,
    out_col: *mut c_int,
) {
    const OP: &str = "fat_XmlDecoderInputPos";
    let out_line = raw::out(OP, out_line, "out_line");
    let out_col = raw::out(OP, out_col, "out_col");
    let (line, col) = d.resolve(OP).lock().input_pos();
    *out_line = line as c_int;
    *out_col = col as c_int;
}

/// Reads the next token. At end of input sets `*out_eof`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlDecoderToken(
    d: FatXmlDecoder,
    out_tok: *mut FatXmlToken,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    read_token_export("fat_XmlDecoderToken", d, Decoder::token, out_tok, out_eof, out_err)
}

/// Like [`fat_XmlDecoderToken`] but names keep their written prefixes.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlDecoderRawToken(
    d: FatXmlDecoder,
    out_tok: *mut FatXmlToken,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    read_token_export("fat_XmlDecoderRawToken", d, Decoder::raw_token, out_tok, out_eof, out_err)
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlDecoderSkip(
    d: FatXmlDecoder,
    out_eof: *mut bool,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_XmlDecoderSkip";
    let out_err = ffi::out_err(OP, out_err);
    let out_eof = raw::out(OP, out_eof, "out_eof");
    *out_eof = false;
    let result = d.resolve(OP).lock().skip();
    ffi::complete(OP, out_err, result, |found| *out_eof = !found)
}

/// Releases the token.
#[no_mangle]
pub extern "C" fn fat_XmlTokenFree(t: FatXmlToken) {
    t.release("fat_XmlTokenFree");
}

/// Kind of the token.
#[no_mangle]
pub extern "C" fn fat_XmlTokenType(t: FatXmlToken) -> XmlTokenKind {
    t.resolve("fat_XmlTokenType").kind()
}

/// Local name of a start or end element; other tokens are fatal.
#[no_mangle]
pub extern "C" fn fat_XmlTokenNameLocal(t: FatXmlToken) -> FatString {
    const OP: &str = "fat_XmlTokenNameLocal";
    new_string(element_name(OP, &t.resolve(OP)).local)
}

/// Resolved namespace URL of an element token.
#[no_mangle]
pub extern "C" fn fat_XmlTokenNameSpace(t: FatXmlToken) -> FatString {
    const OP: &str = "fat_XmlTokenNameSpace";
    new_string(element_name(OP, &t.resolve(OP)).space)
}

/// Number of attributes on a start element.
#[no_mangle]
pub extern "C" fn fat_XmlStartElementAttrCount(t: FatXmlToken) -> usize {
    const OP: &str = "fat_XmlStartElementAttrCount";
    match &*t.resolve(OP) {
        Token::StartElement { attrs, .. } => attrs.len(),
        other => contract::violation(
            OP,
            format_args!("token is {:?}, not a start element", other.kind()),
        ),
    }
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlStartElementAttrGet(
    t: FatXmlToken,
    idx: usize,
    out_name_local: *mut FatString,
    out_name_space: *mut FatString,
    out_value: *mut FatString,
) {
    const OP: &str = "fat_XmlStartElementAttrGet";
    let out_local = raw::out(OP, out_name_local, "out_name_local");
    let out_space = raw::out(OP, out_name_space, "out_name_space");
    let out_value = raw::out(OP, out_value, "out_value");
    let tok = t.resolve(OP);
    let Token::StartElement { attrs, .. } = &*tok else {
        contract::violation(OP, format_args!("token is {:?}, not a start element", tok.kind()));
    };
    let Some(attr) = attrs.get(idx) else {
        contract::violation(OP, format_args!("index {} out of range ({})", idx, attrs.len()));
    };
    *out_local = new_string(attr.name.local.as_str());
    *out_space = new_string(attr.name.space.as_str());
    *out_value = new_string(attr.value.as_str());
}

/// Contents of a char-data, comment or directive token.
#[no_mangle]
pub extern "C" fn fat_XmlTokenBytes(t: FatXmlToken) -> FatBytes {
    const OP: &str = "fat_XmlTokenBytes";
    match &*t.resolve(OP) {
        Token::CharData(b) | Token::Comment(b) | Token::Directive(b) => {
            FatBytes::register(Bytes::new(b.clone()))
        }
        other => contract::violation(
            OP,
            format_args!("token {:?} has no byte contents", other.kind()),
        ),
    }
}

/// Target name of a processing instruction.
#[no_mangle]
pub extern "C" fn fat_XmlProcInstTarget(t: FatXmlToken) -> FatString {
    const OP: &str = "fat_XmlProcInstTarget";
    match &*t.resolve(OP) {
        Token::ProcInst { target, .. } => new_string(target.as_str()),
        other => contract::violation(
            OP,
            format_args!("token is {:?}, not a processing instruction", other.kind()),
        ),
    }
}

/// Body of the processing instruction after its target.
#[no_mangle]
pub extern "C" fn fat_XmlProcInstInstBytes(t: FatXmlToken) -> FatBytes {
    const OP: &str = "fat_XmlProcInstInstBytes";
    match &*t.resolve(OP) {
        Token::ProcInst { inst, .. } => FatBytes::register(Bytes::new(inst.clone())),
        other => contract::violation(
            OP,
            format_args!("token is {:?}, not a processing instruction", other.kind()),
        ),
    }
}

/// Appends `src` to `dst` with XML special characters escaped.
#[no_mangle]
pub extern "C" fn fat_XmlEscapeToBytesBuffer(dst: FatBytesBuffer, src: FatBytes) {
    const OP: &str = "fat_XmlEscapeToBytesBuffer";
    let out = escape_text(src.resolve(OP).as_slice());
    BufferSink::resolve(dst, OP).append(&out);
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlEscapeTextToBytesBuffer(
    dst: FatBytesBuffer,
    src: FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_XmlEscapeTextToBytesBuffer";
    let out_err = ffi::out_err(OP, out_err);
    let out = escape_text(src.resolve(OP).as_slice());
    BufferSink::resolve(dst, OP).append(&out);
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

/// Creates an encoder that appends to `dst`.
#[no_mangle]
pub extern "C" fn fat_XmlEncoderNewToBytesBuffer(dst: FatBytesBuffer) -> FatXmlEncoder {
    let sink = BufferSink::resolve(dst, "fat_XmlEncoderNewToBytesBuffer");
    FatXmlEncoder::register(Mutex::new(Encoder::new(sink)))
}

/// Indents subsequent tokens with `prefix` and `indent`.
#[no_mangle]
pub extern "C" fn fat_XmlEncoderIndent(e: FatXmlEncoder, prefix: FatString, indent: FatString) {
    const OP: &str = "fat_XmlEncoderIndent";
    let (prefix, indent) = (prefix.resolve(OP), indent.resolve(OP));
    e.resolve(OP).lock().set_indent(prefix.as_bytes(), indent.as_bytes());
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlEncoderEncodeToken(
    e: FatXmlEncoder,
    t: FatXmlToken,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_XmlEncoderEncodeToken";
    let out_err = ffi::out_err(OP, out_err);
    let tok = t.resolve(OP);
    let result = e.resolve(OP).lock().encode_token(&tok);
    ffi::complete(OP, out_err, result, |()| ())
}

/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlEncoderFlush(e: FatXmlEncoder, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_XmlEncoderFlush";
    let out_err = ffi::out_err(OP, out_err);
    e.resolve(OP).lock().flush();
    ffi::complete(OP, out_err, Ok(()), |()| ())
}

/// Flushes and releases the encoder. An unclosed element is reported as
/// `SYNTAX`; the handle is released either way.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_XmlEncoderClose(e: FatXmlEncoder, out_err: *mut FatError) -> Status {
    const OP: &str = "fat_XmlEncoderClose";
    let out_err = ffi::out_err(OP, out_err);
    let result = e.release(OP).lock().close();
    ffi::complete(OP, out_err, result, |()| ())
}
