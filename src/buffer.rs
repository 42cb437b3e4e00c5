//! Growable byte buffers.
//!
//! A buffer is a FIFO of bytes: writes append, reads consume from the
//! front. Encoders and writers in other modules hold a [`BufferSink`] so
//! their output lands in a buffer the caller owns by handle.

use std::io;
use std::os::raw::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bytes::Bytes;
use crate::ffi::{contract, raw, FatBytes, FatBytesBuffer, FatString, FatStringReader};
use crate::string::Text;

/// Mutable byte buffer behind a buffer handle.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
    off: usize,
}

impl Buffer {
    /// Create a buffer holding a copy of `data`.
    pub fn with_bytes(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            off: 0,
        }
    }

    /// The unread portion.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.off..]
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.off
    }

    /// Whether no unread bytes remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the underlying storage.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Ensure room for another `n` bytes without reallocation.
    pub fn grow(&mut self, n: usize) {
        self.compact();
        self.data.reserve(n);
    }

    /// Discard everything.
    pub fn reset(&mut self) {
        self.data.clear();
        self.off = 0;
    }

    /// Keep only the first `n` unread bytes. `n` must not exceed [`len`](Self::len).
    pub fn truncate(&mut self, n: usize) {
        if n == 0 {
            self.reset();
            return;
        }
        self.data.truncate(self.off + n);
    }

    /// Append bytes.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.is_empty() {
            self.reset();
        }
        self.data.extend_from_slice(data);
        data.len()
    }

    /// Append a rune as UTF-8; an invalid scalar is written as U+FFFD.
    pub fn write_rune(&mut self, r: u32) -> usize {
        let c = char::from_u32(r).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut tmp = [0u8; 4];
        self.write(c.encode_utf8(&mut tmp).as_bytes())
    }

    /// Consume up to `dst.len()` bytes.
    ///
    /// Returns the count and whether the buffer ran dry before the request
    /// was filled.
    pub fn read(&mut self, dst: &mut [u8]) -> (usize, bool) {
        let n = raw::copy_out(self.unread(), dst);
        self.off += n;
        let eof = n < dst.len();
        if self.is_empty() {
            self.reset();
        }
        (n, eof)
    }

    /// Consume and return up to `n` bytes.
    pub fn next(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.len());
        let out = self.data[self.off..self.off + n].to_vec();
        self.off += n;
        out
    }

    /// Consume one byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.is_empty() {
            self.reset();
            return None;
        }
        let b = self.data[self.off];
        self.off += 1;
        Some(b)
    }

    /// Take all unread bytes, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<u8> {
        let out = self.unread().to_vec();
        self.reset();
        out
    }

    fn compact(&mut self) {
        if self.off > 0 {
            self.data.drain(..self.off);
            self.off = 0;
        }
    }
}

impl io::Write for Buffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(Buffer::write(self, data))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shared writer into a caller-owned buffer.
///
/// Holding a sink keeps the buffer alive even if its handle is freed first.
#[derive(Debug, Clone)]
pub struct BufferSink(Arc<Mutex<Buffer>>);

impl BufferSink {
    /// Resolve a buffer handle into a sink.
    pub(crate) fn resolve(h: FatBytesBuffer, op: &str) -> Self {
        Self(h.resolve(op))
    }

    /// Wrap an existing shared buffer.
    pub fn new(buf: Arc<Mutex<Buffer>>) -> Self {
        Self(buf)
    }

    /// Append bytes.
    pub fn append(&self, data: &[u8]) {
        self.0.lock().write(data);
    }
}

impl io::Write for BufferSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.append(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn new_buffer(buf: Buffer) -> FatBytesBuffer {
    FatBytesBuffer::register(Mutex::new(buf))
}

/// Creates an empty buffer.
#[no_mangle]
pub extern "C" fn fat_BytesBufferNew() -> FatBytesBuffer {
    new_buffer(Buffer::default())
}

/// Creates a buffer holding a copy of `b`.
#[no_mangle]
pub extern "C" fn fat_BytesBufferNewBytes(b: FatBytes) -> FatBytesBuffer {
    let b = b.resolve("fat_BytesBufferNewBytes");
    new_buffer(Buffer::with_bytes(b.as_slice()))
}

/// # Safety
///
/// `bytes` must be valid for reads of `len` bytes (NULL only if `len == 0`).
#[no_mangle]
pub unsafe extern "C" fn fat_BytesBufferNewN(bytes: *const c_void, len: usize) -> FatBytesBuffer {
    new_buffer(Buffer::with_bytes(raw::span("fat_BytesBufferNewN", bytes, len)))
}

/// Creates a buffer holding a copy of `s`.
#[no_mangle]
pub extern "C" fn fat_BytesBufferNewString(s: FatString) -> FatBytesBuffer {
    let s = s.resolve("fat_BytesBufferNewString");
    new_buffer(Buffer::with_bytes(s.as_bytes()))
}

/// Releases the buffer.
#[no_mangle]
pub extern "C" fn fat_BytesBufferFree(b: FatBytesBuffer) {
    b.release("fat_BytesBufferFree");
}

/// Number of unread bytes.
#[no_mangle]
pub extern "C" fn fat_BytesBufferLen(b: FatBytesBuffer) -> usize {
    b.resolve("fat_BytesBufferLen").lock().len()
}

/// Capacity of the underlying storage.
#[no_mangle]
pub extern "C" fn fat_BytesBufferCap(b: FatBytesBuffer) -> usize {
    b.resolve("fat_BytesBufferCap").lock().capacity()
}

/// Reserves room for at least `n` more bytes.
#[no_mangle]
pub extern "C" fn fat_BytesBufferGrow(b: FatBytesBuffer, n: usize) {
    b.resolve("fat_BytesBufferGrow").lock().grow(n);
}

/// Empties the buffer, keeping its storage.
#[no_mangle]
pub extern "C" fn fat_BytesBufferReset(b: FatBytesBuffer) {
    b.resolve("fat_BytesBufferReset").lock().reset();
}

/// Keeps the first `n` unread bytes. `n` beyond the unread length is fatal.
#[no_mangle]
pub extern "C" fn fat_BytesBufferTruncate(b: FatBytesBuffer, n: usize) {
    const OP: &str = "fat_BytesBufferTruncate";
    let b = b.resolve(OP);
    let mut buf = b.lock();
    if n > buf.len() {
        contract::violation(OP, format_args!("truncation out of range ({} > {})", n, buf.len()));
    }
    buf.truncate(n);
}

/// # Safety
///
/// `bytes` must be valid for reads of `len` bytes (NULL only if `len == 0`).
#[no_mangle]
pub unsafe extern "C" fn fat_BytesBufferWrite(
    b: FatBytesBuffer,
    bytes: *const c_void,
    len: usize,
) -> usize {
    const OP: &str = "fat_BytesBufferWrite";
    let data = raw::span(OP, bytes, len);
    b.resolve(OP).lock().write(data)
}

/// Appends one byte.
#[no_mangle]
pub extern "C" fn fat_BytesBufferWriteByte(b: FatBytesBuffer, c: u8) {
    b.resolve("fat_BytesBufferWriteByte").lock().write(&[c]);
}

/// Appends the UTF-8 encoding of `r`, or U+FFFD when `r` is not a scalar value.
#[no_mangle]
pub extern "C" fn fat_BytesBufferWriteRune(b: FatBytesBuffer, r: u32) -> usize {
    b.resolve("fat_BytesBufferWriteRune").lock().write_rune(r)
}

/// Appends the contents of `s`.
#[no_mangle]
pub extern "C" fn fat_BytesBufferWriteString(b: FatBytesBuffer, s: FatString) -> usize {
    const OP: &str = "fat_BytesBufferWriteString";
    let s = s.resolve(OP);
    b.resolve(OP).lock().write(s.as_bytes())
}

/// Returns a copy of the unread bytes.
#[no_mangle]
pub extern "C" fn fat_BytesBufferBytes(b: FatBytesBuffer) -> FatBytes {
    let data = b.resolve("fat_BytesBufferBytes").lock().unread().to_vec();
    FatBytes::register(Bytes::new(data))
}

/// Copies the unread part into a new string.
#[no_mangle]
pub extern "C" fn fat_BytesBufferString(b: FatBytesBuffer) -> FatString {
    let data = b.resolve("fat_BytesBufferString").lock().unread().to_vec();
    FatString::register(Text::new(data))
}

/// Reads up to `len` bytes. `*eof_out` is set when the buffer ran dry
/// before `len` bytes were read.
///
/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; `eof_out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesBufferRead(
    b: FatBytesBuffer,
    dst: *mut c_void,
    len: usize,
    eof_out: *mut bool,
) -> usize {
    const OP: &str = "fat_BytesBufferRead";
    let eof_out = raw::out(OP, eof_out, "eof_out");
    let dst = raw::span_mut(OP, dst, len);
    let (n, eof) = b.resolve(OP).lock().read(dst);
    *eof_out = eof;
    n
}

/// Consumes up to `n` bytes and returns them as a new bytes handle.
#[no_mangle]
pub extern "C" fn fat_BytesBufferNext(b: FatBytesBuffer, n: usize) -> FatBytes {
    let data = b.resolve("fat_BytesBufferNext").lock().next(n);
    FatBytes::register(Bytes::new(data))
}

/// Reads one byte. Returns false with `*eof_out` set when empty.
///
/// # Safety
///
/// `byte_out` and `eof_out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesBufferReadByte(
    b: FatBytesBuffer,
    byte_out: *mut u8,
    eof_out: *mut bool,
) -> bool {
    const OP: &str = "fat_BytesBufferReadByte";
    let byte_out = raw::out(OP, byte_out, "byte_out");
    let eof_out = raw::out(OP, eof_out, "eof_out");
    match b.resolve(OP).lock().read_byte() {
        Some(c) => {
            *byte_out = c;
            *eof_out = false;
            true
        }
        None => {
            *byte_out = 0;
            *eof_out = true;
            false
        }
    }
}

/// Moves all unread bytes of `src` to the end of `dst`.
#[no_mangle]
pub extern "C" fn fat_BytesBufferWriteToBytesBuffer(
    src: FatBytesBuffer,
    dst: FatBytesBuffer,
) -> i64 {
    const OP: &str = "fat_BytesBufferWriteToBytesBuffer";
    let src = src.resolve(OP);
    let dst = dst.resolve(OP);
    if Arc::ptr_eq(&src, &dst) {
        return src.lock().len() as i64;
    }
    let data = src.lock().drain();
    let n = dst.lock().write(&data) as i64;
    n
}

/// Appends everything left in the string reader to `dst`.
#[no_mangle]
pub extern "C" fn fat_BytesBufferReadFromStringReader(
    dst: FatBytesBuffer,
    r: FatStringReader,
) -> i64 {
    const OP: &str = "fat_BytesBufferReadFromStringReader";
    let r = r.resolve(OP);
    let data = r.lock().take_rest();
    dst.resolve(OP).lock().write(&data) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut buf = Buffer::default();
        buf.write(b"hello ");
        buf.write(b"world");
        let mut dst = [0u8; 5];
        assert_eq!(buf.read(&mut dst), (5, false));
        assert_eq!(&dst, b"hello");
        assert_eq!(buf.unread(), b" world");
    }

    #[test]
    fn test_short_read_reports_eof() {
        let mut buf = Buffer::with_bytes(b"abc");
        let mut dst = [0u8; 10];
        assert_eq!(buf.read(&mut dst), (3, true));
        assert_eq!(&dst[..3], b"abc");
        assert_eq!(buf.read(&mut dst), (0, true));
    }

    #[test]
    fn test_exact_read_is_not_eof() {
        let mut buf = Buffer::with_bytes(b"abc");
        let mut dst = [0u8; 3];
        assert_eq!(buf.read(&mut dst), (3, false));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncate_and_next() {
        let mut buf = Buffer::with_bytes(b"abcdef");
        assert_eq!(buf.next(2), b"ab");
        buf.truncate(2);
        assert_eq!(buf.unread(), b"cd");
        assert_eq!(buf.next(10), b"cd");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_write_rune_replaces_invalid() {
        let mut buf = Buffer::default();
        assert_eq!(buf.write_rune('é' as u32), 2);
        assert_eq!(buf.write_rune(0xD800), 3);
        assert_eq!(buf.unread(), "é\u{FFFD}".as_bytes());
    }

    #[test]
    fn test_grow_reserves() {
        let mut buf = Buffer::with_bytes(b"xy");
        buf.grow(100);
        assert!(buf.capacity() >= 102);
    }

    #[test]
    fn test_write_to_self_is_unchanged() {
        let h = fat_BytesBufferNew();
        let data = b"same";
        unsafe { fat_BytesBufferWrite(h, data.as_ptr() as *const c_void, data.len()) };
        assert_eq!(fat_BytesBufferWriteToBytesBuffer(h, h), 4);
        assert_eq!(fat_BytesBufferLen(h), 4);
        fat_BytesBufferFree(h);
    }

    #[test]
    fn test_write_to_moves_unread_bytes() {
        let src = fat_BytesBufferNew();
        let dst = fat_BytesBufferNew();
        let (a, b) = (b"head ", b"tail");
        unsafe {
            fat_BytesBufferWrite(dst, a.as_ptr() as *const c_void, a.len());
            fat_BytesBufferWrite(src, b.as_ptr() as *const c_void, b.len());
        }
        assert_eq!(fat_BytesBufferWriteToBytesBuffer(src, dst), 4);
        assert_eq!(fat_BytesBufferLen(src), 0);
        assert_eq!(fat_BytesBufferLen(dst), 9);
        assert_eq!(dst.resolve("test").lock().unread(), b"head tail");
        fat_BytesBufferFree(src);
        fat_BytesBufferFree(dst);
    }
}
