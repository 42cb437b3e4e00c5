//! String builder.

use std::os::raw::c_void;

use parking_lot::Mutex;

use crate::ffi::{raw, FatString, FatStringBuilder};
use crate::string::Text;

/// Append-only string accumulator.
#[derive(Debug, Default)]
pub struct StringBuilder {
    buf: Vec<u8>,
}

impl StringBuilder {
    /// Append bytes, returning how many were written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        self.buf.extend_from_slice(data);
        data.len()
    }

    /// Accumulated length.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Capacity of the accumulator.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Reserve room for `n` more bytes.
    pub fn grow(&mut self, n: usize) {
        self.buf.reserve(n);
    }

    /// Drop the contents and the allocation.
    pub fn reset(&mut self) {
        self.buf = Vec::new();
    }

    /// Accumulated contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Creates an empty builder.
#[no_mangle]
pub extern "C" fn fat_StringBuilderNew() -> FatStringBuilder {
    FatStringBuilder::register(Mutex::new(StringBuilder::default()))
}

/// Releases the builder.
#[no_mangle]
pub extern "C" fn fat_StringBuilderFree(b: FatStringBuilder) {
    b.release("fat_StringBuilderFree");
}

/// Capacity of the underlying storage.
#[no_mangle]
pub extern "C" fn fat_StringBuilderCap(b: FatStringBuilder) -> usize {
    b.resolve("fat_StringBuilderCap").lock().capacity()
}

/// Number of bytes written so far.
#[no_mangle]
pub extern "C" fn fat_StringBuilderLen(b: FatStringBuilder) -> usize {
    b.resolve("fat_StringBuilderLen").lock().len()
}

/// Reserves room for at least `n` more bytes.
#[no_mangle]
pub extern "C" fn fat_StringBuilderGrow(b: FatStringBuilder, n: usize) {
    b.resolve("fat_StringBuilderGrow").lock().grow(n);
}

/// Discards everything written.
#[no_mangle]
pub extern "C" fn fat_StringBuilderReset(b: FatStringBuilder) {
    b.resolve("fat_StringBuilderReset").lock().reset();
}

/// Returns the accumulated string as a new handle.
#[no_mangle]
pub extern "C" fn fat_StringBuilderString(b: FatStringBuilder) -> FatString {
    let data = b.resolve("fat_StringBuilderString").lock().as_bytes().to_vec();
    FatString::register(Text::new(data))
}

/// # Safety
///
/// `bytes` must be valid for reads of `len` bytes (NULL only if `len == 0`).
#[no_mangle]
pub unsafe extern "C" fn fat_StringBuilderWrite(
    b: FatStringBuilder,
    bytes: *const c_void,
    len: usize,
) -> usize {
    const OP: &str = "fat_StringBuilderWrite";
    let data = raw::span(OP, bytes, len);
    b.resolve(OP).lock().write(data)
}

/// Appends one byte.
#[no_mangle]
pub extern "C" fn fat_StringBuilderWriteByte(b: FatStringBuilder, c: u8) {
    b.resolve("fat_StringBuilderWriteByte").lock().write(&[c]);
}

/// Appends the contents of `s`.
#[no_mangle]
pub extern "C" fn fat_StringBuilderWriteString(b: FatStringBuilder, s: FatString) -> usize {
    const OP: &str = "fat_StringBuilderWriteString";
    let s = s.resolve(OP);
    b.resolve(OP).lock().write(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates() {
        let h = fat_StringBuilderNew();
        let data = b"abc";
        unsafe { fat_StringBuilderWrite(h, data.as_ptr() as *const c_void, 3) };
        fat_StringBuilderWriteByte(h, b'!');
        assert_eq!(fat_StringBuilderLen(h), 4);
        let s = fat_StringBuilderString(h);
        assert_eq!(s.resolve("test").as_bytes(), b"abc!");
        crate::string::fat_StringFree(s);
        fat_StringBuilderReset(h);
        assert_eq!(fat_StringBuilderLen(h), 0);
        fat_StringBuilderFree(h);
    }
}
