//! Base64 encodings and a streaming encoder.
//!
//! An [`Encoding`] is an alphabet plus padding and strictness settings. The
//! codec work is done by a `base64` crate engine built from those settings;
//! a padding character other than `=` is swapped in and out around it.

use std::os::raw::{c_char, c_int, c_void};

use ::base64::alphabet::{self, Alphabet};
use ::base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use ::base64::{DecodeError, Engine as _};
use parking_lot::Mutex;

use crate::buffer::BufferSink;
use crate::bytes::Bytes;
use crate::error::{Error, Result};
use crate::ffi::{
    self, contract, raw, FatBase64Encoder, FatBase64Encoding, FatBytes, FatBytesBuffer, FatError,
    FatString,
};
use crate::string::Text;
use crate::types::Status;

const STD_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
const URL_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// A base64 alphabet with its padding and strictness settings.
#[derive(Debug, Clone)]
pub struct Encoding {
    alphabet: String,
    pad: Option<u8>,
    strict: bool,
    engine: GeneralPurpose,
}

impl Encoding {
    /// Build an encoding from a 64-character alphabet, padded with `=`.
    pub fn new(alphabet: &str) -> Result<Self> {
        Self::build(alphabet, Some(b'='), false)
    }

    /// Standard alphabet, padded.
    pub fn standard() -> Self {
        Self::fixed(alphabet::STANDARD, STD_ALPHABET, Some(b'='))
    }

    /// URL-safe alphabet, padded.
    pub fn url_safe() -> Self {
        Self::fixed(alphabet::URL_SAFE, URL_ALPHABET, Some(b'='))
    }

    /// Standard alphabet without padding.
    pub fn raw_standard() -> Self {
        Self::fixed(alphabet::STANDARD, STD_ALPHABET, None)
    }

    /// URL-safe alphabet without padding.
    pub fn raw_url_safe() -> Self {
        Self::fixed(alphabet::URL_SAFE, URL_ALPHABET, None)
    }

    fn fixed(alpha: Alphabet, text: &str, pad: Option<u8>) -> Self {
        Self {
            alphabet: text.to_string(),
            pad,
            strict: false,
            engine: GeneralPurpose::new(&alpha, Self::config(pad, false)),
        }
    }

    fn config(pad: Option<u8>, strict: bool) -> GeneralPurposeConfig {
        let mode = if pad.is_some() {
            DecodePaddingMode::RequireCanonical
        } else {
            DecodePaddingMode::RequireNone
        };
        GeneralPurposeConfig::new()
            .with_encode_padding(pad.is_some())
            .with_decode_padding_mode(mode)
            .with_decode_allow_trailing_bits(!strict)
    }

    fn build(alphabet: &str, pad: Option<u8>, strict: bool) -> Result<Self> {
        if alphabet.len() != 64 {
            return Err(Error::range("encoding alphabet is not 64-bytes long"));
        }
        if alphabet.bytes().any(|b| b == b'\n' || b == b'\r') {
            return Err(Error::range("encoding alphabet contains newline character"));
        }
        if let Some(p) = pad {
            if alphabet.as_bytes().contains(&p) && p != b'=' {
                return Err(Error::range("padding contained in alphabet"));
            }
        }
        let alpha = Alphabet::new(alphabet)
            .map_err(|e| Error::range(format!("invalid encoding alphabet: {}", e)))?;
        Ok(Self {
            alphabet: alphabet.to_string(),
            pad,
            strict,
            engine: GeneralPurpose::new(&alpha, Self::config(pad, strict)),
        })
    }

    /// Same encoding with strict trailing-bit checking.
    pub fn strict(&self) -> Self {
        Self {
            alphabet: self.alphabet.clone(),
            pad: self.pad,
            strict: true,
            engine: self.rebuild(self.pad, true),
        }
    }

    /// Same encoding with another padding byte, or none.
    pub fn with_padding(&self, pad: Option<u8>) -> Result<Self> {
        if let Some(p) = pad {
            if p == b'\r' || p == b'\n' {
                return Err(Error::range("invalid padding"));
            }
            if self.alphabet.as_bytes().contains(&p) {
                return Err(Error::range("padding contained in alphabet"));
            }
        }
        Ok(Self {
            alphabet: self.alphabet.clone(),
            pad,
            strict: self.strict,
            engine: self.rebuild(pad, self.strict),
        })
    }

    fn rebuild(&self, pad: Option<u8>, strict: bool) -> GeneralPurpose {
        // The alphabet was validated when this encoding was built.
        match Alphabet::new(&self.alphabet) {
            Ok(alpha) => GeneralPurpose::new(&alpha, Self::config(pad, strict)),
            Err(_) => GeneralPurpose::new(&alphabet::STANDARD, Self::config(pad, strict)),
        }
    }

    /// Length of the encoding of `n` bytes.
    pub fn encoded_len(&self, n: usize) -> usize {
        match self.pad {
            Some(_) => n.div_ceil(3) * 4,
            None => n / 3 * 4 + (n % 3 * 8).div_ceil(6),
        }
    }

    /// Upper bound on the decoding of `n` encoded bytes.
    pub fn decoded_len(&self, n: usize) -> usize {
        match self.pad {
            Some(_) => n / 4 * 3,
            None => n * 6 / 8,
        }
    }

    /// Encode `src`.
    pub fn encode(&self, src: &[u8]) -> Vec<u8> {
        let mut out = self.engine.encode(src).into_bytes();
        if let Some(p) = self.pad.filter(|&p| p != b'=') {
            for b in out.iter_mut().rev().take_while(|b| **b == b'=') {
                *b = p;
            }
        }
        out
    }

    /// Decode `src`, ignoring `\r` and `\n`.
    pub fn decode(&self, src: &[u8]) -> Result<Vec<u8>> {
        let mut input: Vec<u8> =
            src.iter().copied().filter(|&b| b != b'\r' && b != b'\n').collect();
        if let Some(p) = self.pad.filter(|&p| p != b'=') {
            if input.contains(&b'=') {
                let at = input.iter().position(|&b| b == b'=').unwrap_or(0);
                return Err(corrupt(at));
            }
            for b in input.iter_mut().rev().take_while(|b| **b == p) {
                *b = b'=';
            }
        }
        self.engine.decode(&input).map_err(|e| match e {
            DecodeError::InvalidByte(at, _) | DecodeError::InvalidLastSymbol(at, _) => corrupt(at),
            DecodeError::InvalidLength(len) => corrupt(len),
            DecodeError::InvalidPadding => corrupt(input.len()),
        })
    }
}

fn corrupt(at: usize) -> Error {
    Error::syntax(format!("illegal base64 data at input byte {}", at))
}

/// Streaming encoder writing complete quanta into a buffer.
#[derive(Debug)]
pub struct StreamEncoder {
    encoding: Encoding,
    sink: BufferSink,
    pending: Vec<u8>,
}

impl StreamEncoder {
    /// Create an encoder over `sink`.
    pub fn new(encoding: Encoding, sink: BufferSink) -> Self {
        Self {
            encoding,
            sink,
            pending: Vec::with_capacity(3),
        }
    }

    /// Accept more input; only whole 3-byte groups are encoded now.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.pending.extend_from_slice(data);
        let whole = self.pending.len() - self.pending.len() % 3;
        if whole > 0 {
            let chunk: Vec<u8> = self.pending.drain(..whole).collect();
            self.sink.append(&self.encoding.encode(&chunk));
        }
        data.len()
    }

    /// Flush the final partial group with padding.
    pub fn close(&mut self) {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.sink.append(&self.encoding.encode(&tail));
        }
    }
}

fn new_encoding(enc: Encoding) -> FatBase64Encoding {
    FatBase64Encoding::register(enc)
}

fn non_negative(op: &str, n: c_int) -> usize {
    contract::index(op, n as isize, "n")
}

/// Standard padded encoding (RFC 4648).
#[no_mangle]
pub extern "C" fn fat_Base64StdEncoding() -> FatBase64Encoding {
    new_encoding(Encoding::standard())
}

/// URL and filename safe padded encoding.
#[no_mangle]
pub extern "C" fn fat_Base64URLEncoding() -> FatBase64Encoding {
    new_encoding(Encoding::url_safe())
}

/// Standard encoding without padding.
#[no_mangle]
pub extern "C" fn fat_Base64RawStdEncoding() -> FatBase64Encoding {
    new_encoding(Encoding::raw_standard())
}

/// URL-safe encoding without padding.
#[no_mangle]
pub extern "C" fn fat_Base64RawURLEncoding() -> FatBase64Encoding {
    new_encoding(Encoding::raw_url_safe())
}

/// Creates an encoding from a 64-byte alphabet. A bad alphabet is reported
/// as `FAT_ERR_RANGE`.
///
/// # Safety
///
/// `alphabet` must be NUL-terminated; out-pointers must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64EncodingNewUTF8(
    alphabet: *const c_char,
    out_enc: *mut FatBase64Encoding,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64EncodingNewUTF8";
    let out_err = ffi::out_err(OP, out_err);
    let out_enc = raw::out(OP, out_enc, "out_enc");
    *out_enc = FatBase64Encoding::invalid();
    let alphabet = raw::cstr_text(OP, alphabet, "alphabet");
    ffi::complete(OP, out_err, Encoding::new(&alphabet), |enc| *out_enc = new_encoding(enc))
}

/// New encoding that rejects non-zero trailing bits.
#[no_mangle]
pub extern "C" fn fat_Base64EncodingStrict(enc: FatBase64Encoding) -> FatBase64Encoding {
    new_encoding(enc.resolve("fat_Base64EncodingStrict").strict())
}

/// Returns a copy of `enc` using `padding_rune` (-1 for no padding).
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64EncodingWithPadding(
    enc: FatBase64Encoding,
    padding_rune: i32,
    out_enc: *mut FatBase64Encoding,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64EncodingWithPadding";
    let out_err = ffi::out_err(OP, out_err);
    let out_enc = raw::out(OP, out_enc, "out_enc");
    *out_enc = FatBase64Encoding::invalid();
    let enc = enc.resolve(OP);
    let result = match padding_rune {
        -1 => enc.with_padding(None),
        0..=0xff => enc.with_padding(Some(padding_rune as u8)),
        _ => Err(Error::range("invalid padding")),
    };
    ffi::complete(OP, out_err, result, |enc| *out_enc = new_encoding(enc))
}

/// Length of the encoding of `n` source bytes.
#[no_mangle]
pub extern "C" fn fat_Base64EncodedLen(enc: FatBase64Encoding, n: c_int) -> c_int {
    const OP: &str = "fat_Base64EncodedLen";
    let enc = enc.resolve(OP);
    enc.encoded_len(non_negative(OP, n)) as c_int
}

/// Maximum decoded length of `n` encoded bytes.
#[no_mangle]
pub extern "C" fn fat_Base64DecodedLen(enc: FatBase64Encoding, n: c_int) -> c_int {
    const OP: &str = "fat_Base64DecodedLen";
    let enc = enc.resolve(OP);
    enc.decoded_len(non_negative(OP, n)) as c_int
}

/// Encodes `src` into a new string.
#[no_mangle]
pub extern "C" fn fat_Base64EncodeToString(enc: FatBase64Encoding, src: FatBytes) -> FatString {
    const OP: &str = "fat_Base64EncodeToString";
    let out = enc.resolve(OP).encode(src.resolve(OP).as_slice());
    FatString::register(Text::new(out))
}

/// Encodes `src` into a new byte value.
#[no_mangle]
pub extern "C" fn fat_Base64Encode(enc: FatBase64Encoding, src: FatBytes) -> FatBytes {
    const OP: &str = "fat_Base64Encode";
    let out = enc.resolve(OP).encode(src.resolve(OP).as_slice());
    FatBytes::register(Bytes::new(out))
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64DecodeString(
    enc: FatBase64Encoding,
    s: FatString,
    out: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64DecodeString";
    let out_err = ffi::out_err(OP, out_err);
    let out = raw::out(OP, out, "out");
    *out = FatBytes::invalid();
    let result = enc.resolve(OP).decode(s.resolve(OP).as_bytes());
    ffi::complete(OP, out_err, result, |data| *out = FatBytes::register(Bytes::new(data)))
}

/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64Decode(
    enc: FatBase64Encoding,
    src: FatBytes,
    out: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64Decode";
    let out_err = ffi::out_err(OP, out_err);
    let out = raw::out(OP, out, "out");
    *out = FatBytes::invalid();
    let result = enc.resolve(OP).decode(src.resolve(OP).as_slice());
    ffi::complete(OP, out_err, result, |data| *out = FatBytes::register(Bytes::new(data)))
}

/// Returns `dst` followed by the encoding of `src`.
#[no_mangle]
pub extern "C" fn fat_Base64AppendEncode(
    enc: FatBase64Encoding,
    dst: FatBytes,
    src: FatBytes,
) -> FatBytes {
    const OP: &str = "fat_Base64AppendEncode";
    let mut out = dst.resolve(OP).as_slice().to_vec();
    out.extend_from_slice(&enc.resolve(OP).encode(src.resolve(OP).as_slice()));
    FatBytes::register(Bytes::new(out))
}

/// Returns `dst` followed by the decoding of `src`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64AppendDecode(
    enc: FatBase64Encoding,
    dst: FatBytes,
    src: FatBytes,
    out: *mut FatBytes,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64AppendDecode";
    let out_err = ffi::out_err(OP, out_err);
    let out = raw::out(OP, out, "out");
    *out = FatBytes::invalid();
    let prefix = dst.resolve(OP);
    let result = enc.resolve(OP).decode(src.resolve(OP).as_slice()).map(|data| {
        let mut all = prefix.as_slice().to_vec();
        all.extend_from_slice(&data);
        all
    });
    ffi::complete(OP, out_err, result, |data| *out = FatBytes::register(Bytes::new(data)))
}

/// Releases the encoding handle.
#[no_mangle]
pub extern "C" fn fat_Base64EncodingFree(enc: FatBase64Encoding) {
    enc.release("fat_Base64EncodingFree");
}

/// Creates a streaming encoder that appends to `dst`.
///
/// # Safety
///
/// Out-pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64EncoderNewToBytesBuffer(
    enc: FatBase64Encoding,
    dst: FatBytesBuffer,
    out_encoder: *mut FatBase64Encoder,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64EncoderNewToBytesBuffer";
    let out_err = ffi::out_err(OP, out_err);
    let out_encoder = raw::out(OP, out_encoder, "out_encoder");
    let encoding = (*enc.resolve(OP)).clone();
    let sink = BufferSink::resolve(dst, OP);
    *out_encoder = FatBase64Encoder::register(Mutex::new(StreamEncoder::new(encoding, sink)));
    ffi::complete(OP, out_err, Ok(()), |_| {})
}

/// # Safety
///
/// `bytes` must be valid for reads of `len` bytes; out-pointers must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64EncoderWrite(
    e: FatBase64Encoder,
    bytes: *const c_void,
    len: usize,
    out_n: *mut usize,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64EncoderWrite";
    let out_err = ffi::out_err(OP, out_err);
    let out_n = raw::out(OP, out_n, "out_n");
    let data = raw::span(OP, bytes, len);
    let n = e.resolve(OP).lock().write(data);
    ffi::complete(OP, out_err, Ok(n), |n| *out_n = n)
}

/// Flushes any partial group with padding and releases the encoder.
///
/// # Safety
///
/// `out_err` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_Base64EncoderClose(
    e: FatBase64Encoder,
    out_err: *mut FatError,
) -> Status {
    const OP: &str = "fat_Base64EncoderClose";
    let out_err = ffi::out_err(OP, out_err);
    e.release(OP).lock().close();
    ffi::complete(OP, out_err, Ok(()), |_| {})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_round_trip() {
        let enc = Encoding::standard();
        assert_eq!(enc.encode(b"foobar"), b"Zm9vYmFy");
        assert_eq!(enc.encode(b"fo"), b"Zm8=");
        assert_eq!(enc.decode(b"Zm8=").expect("decode should succeed"), b"fo");
        assert_eq!(enc.encode(b""), b"");
        assert_eq!(enc.decode(b"").expect("empty decode should succeed"), b"");
    }

    #[test]
    fn test_raw_url() {
        let enc = Encoding::raw_url_safe();
        assert_eq!(enc.encode(&[0xfb, 0xff]), b"-_8");
        assert_eq!(enc.decode(b"-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(enc.decode(b"-_8=").is_err(), "raw encodings reject padding");
    }

    #[test]
    fn test_corrupt_input_is_syntax() {
        let err = Encoding::standard().decode(b"Zm9v!!!!").unwrap_err();
        assert_eq!(err.status(), Status::Syntax);
        assert!(err.to_string().starts_with("illegal base64 data at input byte"));
    }

    #[test]
    fn test_newlines_ignored() {
        let enc = Encoding::standard();
        assert_eq!(enc.decode(b"Zm9v\r\nYmFy").unwrap(), b"foobar");
    }

    #[test]
    fn test_custom_padding() {
        let enc = Encoding::standard().with_padding(Some(b'*')).unwrap();
        assert_eq!(enc.encode(b"f"), b"Zg**");
        assert_eq!(enc.decode(b"Zg**").unwrap(), b"f");
        assert!(Encoding::standard().with_padding(Some(b'A')).is_err());
    }

    #[test]
    fn test_bad_alphabet_is_range() {
        let err = Encoding::new("short").unwrap_err();
        assert_eq!(err.status(), Status::Range);
    }

    #[test]
    fn test_strict_rejects_trailing_bits() {
        let lenient = Encoding::standard();
        assert!(lenient.decode(b"Zm9=").is_ok());
        assert!(lenient.strict().decode(b"Zm9=").is_err());
    }

    #[test]
    fn test_lengths() {
        let padded = Encoding::standard();
        let raw = Encoding::raw_standard();
        assert_eq!(padded.encoded_len(5), 8);
        assert_eq!(raw.encoded_len(5), 7);
        assert_eq!(padded.decoded_len(8), 6);
        assert_eq!(raw.decoded_len(7), 5);
    }

    #[test]
    fn test_stream_encoder_matches_one_shot() {
        let buf = std::sync::Arc::new(Mutex::new(crate::buffer::Buffer::default()));
        let mut e = StreamEncoder::new(Encoding::standard(), BufferSink::new(buf.clone()));
        e.write(b"foo");
        e.write(b"ba");
        assert_eq!(buf.lock().unread(), b"Zm9v");
        e.write(b"r!");
        e.close();
        assert_eq!(buf.lock().unread(), Encoding::standard().encode(b"foobar!").as_slice());
    }
}
