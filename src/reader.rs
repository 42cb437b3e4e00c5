//! Seekable readers over an owned copy of bytes or a string.

use std::ops::{Deref, DerefMut};
use std::os::raw::{c_int, c_void};

use parking_lot::Mutex;

use crate::ffi::{
    contract, raw, FatBytes, FatBytesBuffer, FatBytesReader, FatString, FatStringBuilder,
    FatStringReader,
};
use crate::types::SeekWhence;

/// Read cursor over an owned byte slice.
///
/// The position may be moved past the end by `seek`; reads there return
/// nothing and report end of data.
#[derive(Debug, Default)]
pub struct SliceReader {
    data: Vec<u8>,
    pos: u64,
}

impl SliceReader {
    /// Create a reader over `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> &[u8] {
        usize::try_from(self.pos)
            .ok()
            .and_then(|p| self.data.get(p..))
            .unwrap_or(&[])
    }

    /// Unread byte count.
    pub fn len(&self) -> usize {
        self.remaining().len()
    }

    /// Whether nothing is left to read.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total size of the underlying data.
    pub fn size(&self) -> i64 {
        self.data.len() as i64
    }

    /// Byte offset of the cursor.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Replace the data and rewind.
    pub fn reset(&mut self, data: Vec<u8>) {
        self.data = data;
        self.pos = 0;
    }

    /// Read into `dst`; the flag is set when data ran out first.
    pub fn read(&mut self, dst: &mut [u8]) -> (usize, bool) {
        let n = raw::copy_out(self.remaining(), dst);
        self.pos += n as u64;
        (n, n < dst.len())
    }

    /// Read at an absolute offset without moving the cursor.
    pub fn read_at(&self, dst: &mut [u8], off: u64) -> (usize, bool) {
        let src = usize::try_from(off)
            .ok()
            .and_then(|o| self.data.get(o..))
            .unwrap_or(&[]);
        let n = raw::copy_out(src, dst);
        (n, n < dst.len())
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> Option<u8> {
        let b = *self.remaining().first()?;
        self.pos += 1;
        Some(b)
    }

    /// Step back one byte. Returns false at the start.
    pub fn unread_byte(&mut self) -> bool {
        if self.pos == 0 {
            return false;
        }
        self.pos -= 1;
        true
    }

    /// Move the cursor. Returns the new offset, or `None` when it would be
    /// negative.
    pub fn seek(&mut self, offset: i64, whence: SeekWhence) -> Option<i64> {
        let base = match whence {
            SeekWhence::Set => 0,
            SeekWhence::Current => self.pos as i64,
            SeekWhence::End => self.data.len() as i64,
        };
        let abs = base.checked_add(offset).filter(|&a| a >= 0)?;
        self.pos = abs as u64;
        Some(abs)
    }

    /// Consume and return everything left.
    pub fn take_rest(&mut self) -> Vec<u8> {
        let rest = self.remaining().to_vec();
        self.pos += rest.len() as u64;
        rest
    }
}

/// Reader over a string. Same cursor semantics as [`SliceReader`].
#[derive(Debug, Default)]
pub struct StringReader(SliceReader);

impl StringReader {
    /// Create a reader over the string bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(SliceReader::new(data))
    }
}

impl Deref for StringReader {
    type Target = SliceReader;

    fn deref(&self) -> &SliceReader {
        &self.0
    }
}

impl DerefMut for StringReader {
    fn deref_mut(&mut self) -> &mut SliceReader {
        &mut self.0
    }
}

// Shared body of the bytes and string reader exports.

unsafe fn read_export(
    op: &str,
    r: &mut SliceReader,
    dst: *mut c_void,
    len: usize,
    eof_out: *mut bool,
) -> usize {
    let eof_out = raw::out(op, eof_out, "eof_out");
    let dst = raw::span_mut(op, dst, len);
    let (n, eof) = r.read(dst);
    *eof_out = eof;
    n
}

unsafe fn read_at_export(
    op: &str,
    r: &SliceReader,
    dst: *mut c_void,
    len: usize,
    off: i64,
    eof_out: *mut bool,
) -> usize {
    let eof_out = raw::out(op, eof_out, "eof_out");
    let off = match u64::try_from(off) {
        Ok(o) => o,
        Err(_) => contract::violation(op, "negative offset"),
    };
    let dst = raw::span_mut(op, dst, len);
    let (n, eof) = r.read_at(dst, off);
    *eof_out = eof;
    n
}

unsafe fn read_byte_export(
    op: &str,
    r: &mut SliceReader,
    byte_out: *mut u8,
    eof_out: *mut bool,
) -> bool {
    let byte_out = raw::out(op, byte_out, "byte_out");
    let eof_out = raw::out(op, eof_out, "eof_out");
    match r.read_byte() {
        Some(b) => {
            *byte_out = b;
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

fn unread_byte_export(op: &str, r: &mut SliceReader) {
    if !r.unread_byte() {
        contract::violation(op, "at beginning of slice");
    }
}

fn seek_export(op: &str, r: &mut SliceReader, offset: i64, whence: c_int) -> i64 {
    let whence = match SeekWhence::try_from(whence) {
        Ok(w) => w,
        Err(w) => contract::violation(op, format_args!("invalid whence {}", w)),
    };
    match r.seek(offset, whence) {
        Some(pos) => pos,
        None => contract::violation(op, "negative position"),
    }
}

/// Creates a reader over a copy of `b`.
#[no_mangle]
pub extern "C" fn fat_BytesReaderNew(b: FatBytes) -> FatBytesReader {
    let b = b.resolve("fat_BytesReaderNew");
    FatBytesReader::register(Mutex::new(SliceReader::new(b.as_slice().to_vec())))
}

/// Releases the reader.
#[no_mangle]
pub extern "C" fn fat_BytesReaderFree(r: FatBytesReader) {
    r.release("fat_BytesReaderFree");
}

/// Number of unread bytes.
#[no_mangle]
pub extern "C" fn fat_BytesReaderLen(r: FatBytesReader) -> usize {
    r.resolve("fat_BytesReaderLen").lock().len()
}

/// Length of the underlying data.
#[no_mangle]
pub extern "C" fn fat_BytesReaderSize(r: FatBytesReader) -> i64 {
    r.resolve("fat_BytesReaderSize").lock().size()
}

/// Restarts the reader over a copy of `b`.
#[no_mangle]
pub extern "C" fn fat_BytesReaderReset(r: FatBytesReader, b: FatBytes) {
    const OP: &str = "fat_BytesReaderReset";
    let data = b.resolve(OP).as_slice().to_vec();
    r.resolve(OP).lock().reset(data);
}

/// Reads up to `len` bytes; `*eof_out` is set when data ran out first.
///
/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; `eof_out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesReaderRead(
    r: FatBytesReader,
    dst: *mut c_void,
    len: usize,
    eof_out: *mut bool,
) -> usize {
    const OP: &str = "fat_BytesReaderRead";
    let r = r.resolve(OP);
    let mut r = r.lock();
    read_export(OP, &mut r, dst, len, eof_out)
}

/// Reads at `off` without moving the cursor. A negative offset is fatal.
///
/// # Safety
///
/// `dst` must be valid for writes of `len` bytes; `eof_out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesReaderReadAt(
    r: FatBytesReader,
    dst: *mut c_void,
    len: usize,
    off: i64,
    eof_out: *mut bool,
) -> usize {
    const OP: &str = "fat_BytesReaderReadAt";
    let r = r.resolve(OP);
    let r = r.lock();
    read_at_export(OP, &r, dst, len, off, eof_out)
}

/// # Safety
///
/// `byte_out` and `eof_out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_BytesReaderReadByte(
    r: FatBytesReader,
    byte_out: *mut u8,
    eof_out: *mut bool,
) -> bool {
    const OP: &str = "fat_BytesReaderReadByte";
    let r = r.resolve(OP);
    let mut r = r.lock();
    read_byte_export(OP, &mut r, byte_out, eof_out)
}

/// Steps back one byte. Fatal at the start of the data.
#[no_mangle]
pub extern "C" fn fat_BytesReaderUnreadByte(r: FatBytesReader) {
    const OP: &str = "fat_BytesReaderUnreadByte";
    let r = r.resolve(OP);
    let mut r = r.lock();
    unread_byte_export(OP, &mut r);
}

/// Moves the cursor (`whence`: 0 set, 1 current, 2 end). An invalid whence
/// or a negative result is fatal.
#[no_mangle]
pub extern "C" fn fat_BytesReaderSeek(r: FatBytesReader, offset: i64, whence: c_int) -> i64 {
    const OP: &str = "fat_BytesReaderSeek";
    let r = r.resolve(OP);
    let mut r = r.lock();
    seek_export(OP, &mut r, offset, whence)
}

/// Appends the rest of the reader to the buffer.
#[no_mangle]
pub extern "C" fn fat_BytesReaderWriteToBytesBuffer(r: FatBytesReader, b: FatBytesBuffer) -> i64 {
    const OP: &str = "fat_BytesReaderWriteToBytesBuffer";
    let rest = r.resolve(OP).lock().take_rest();
    b.resolve(OP).lock().write(&rest) as i64
}

/// Creates a reader over a copy of `s`.
#[no_mangle]
pub extern "C" fn fat_StringReaderNew(s: FatString) -> FatStringReader {
    let s = s.resolve("fat_StringReaderNew");
    FatStringReader::register(Mutex::new(StringReader::new(s.as_bytes().to_vec())))
}

/// Releases the reader.
#[no_mangle]
pub extern "C" fn fat_StringReaderFree(r: FatStringReader) {
    r.release("fat_StringReaderFree");
}

/// Number of unread bytes.
#[no_mangle]
pub extern "C" fn fat_StringReaderLen(r: FatStringReader) -> usize {
    r.resolve("fat_StringReaderLen").lock().len()
}

/// Length of the underlying string.
#[no_mangle]
pub extern "C" fn fat_StringReaderSize(r: FatStringReader) -> i64 {
    r.resolve("fat_StringReaderSize").lock().size()
}

/// Restarts the reader over a copy of `s`.
#[no_mangle]
pub extern "C" fn fat_StringReaderReset(r: FatStringReader, s: FatString) {
    const OP: &str = "fat_StringReaderReset";
    let data = s.resolve(OP).as_bytes().to_vec();
    r.resolve(OP).lock().reset(data);
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes; `eof_out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_StringReaderRead(
    r: FatStringReader,
    buf: *mut c_void,
    len: usize,
    eof_out: *mut bool,
) -> usize {
    const OP: &str = "fat_StringReaderRead";
    let r = r.resolve(OP);
    let mut r = r.lock();
    read_export(OP, &mut r, buf, len, eof_out)
}

/// # Safety
///
/// `buf` must be valid for writes of `len` bytes; `eof_out` must be valid.
#[no_mangle]
pub unsafe extern "C" fn fat_StringReaderReadAt(
    r: FatStringReader,
    buf: *mut c_void,
    len: usize,
    off: i64,
    eof_out: *mut bool,
) -> usize {
    const OP: &str = "fat_StringReaderReadAt";
    let r = r.resolve(OP);
    let r = r.lock();
    read_at_export(OP, &r, buf, len, off, eof_out)
}

/// # Safety
///
/// `byte_out` and `eof_out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn fat_StringReaderReadByte(
    r: FatStringReader,
    byte_out: *mut u8,
    eof_out: *mut bool,
) -> bool {
    const OP: &str = "fat_StringReaderReadByte";
    let r = r.resolve(OP);
    let mut r = r.lock();
    read_byte_export(OP, &mut r, byte_out, eof_out)
}

/// Steps back one byte. Fatal at position 0.
#[no_mangle]
pub extern "C" fn fat_StringReaderUnreadByte(r: FatStringReader) {
    const OP: &str = "fat_StringReaderUnreadByte";
    let r = r.resolve(OP);
    let mut r = r.lock();
    unread_byte_export(OP, &mut r);
}

/// Moves the cursor. An invalid `whence` or a negative position is fatal.
#[no_mangle]
pub extern "C" fn fat_StringReaderSeek(r: FatStringReader, offset: i64, whence: c_int) -> i64 {
    const OP: &str = "fat_StringReaderSeek";
    let r = r.resolve(OP);
    let mut r = r.lock();
    seek_export(OP, &mut r, offset, whence)
}

/// Appends the rest of the reader to the builder.
#[no_mangle]
pub extern "C" fn fat_StringReaderWriteToBuilder(r: FatStringReader, b: FatStringBuilder) -> i64 {
    const OP: &str = "fat_StringReaderWriteToBuilder";
    let rest = r.resolve(OP).lock().take_rest();
    b.resolve(OP).lock().write(&rest) as i64
}
