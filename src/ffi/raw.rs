//! Raw pointer marshalling for the exported C functions.
//!
//! Every pointer the caller hands in goes through one of these helpers so
//! NULL checks and span rules are applied the same way everywhere.

use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::{c_char, c_void};

use super::contract;

/// Borrow a caller byte span. `ptr` may be NULL only when `len == 0`.
///
/// # Safety
///
/// A non-NULL `ptr` must be valid for reads of `len` bytes for the duration
/// of the call.
pub unsafe fn span<'a>(op: &str, ptr: *const c_void, len: usize) -> &'a [u8] {
    if len == 0 {
        return &[];
    }
    contract::non_null(op, ptr, "byte span");
    std::slice::from_raw_parts(ptr as *const u8, len)
}

/// Borrow a caller output buffer. `ptr` may be NULL only when `len == 0`.
///
/// # Safety
///
/// A non-NULL `ptr` must be valid for writes of `len` bytes for the duration
/// of the call.
pub unsafe fn span_mut<'a>(op: &str, ptr: *mut c_void, len: usize) -> &'a mut [u8] {
    if len == 0 {
        return &mut [];
    }
    contract::non_null(op, ptr as *const c_void, "destination buffer");
    std::slice::from_raw_parts_mut(ptr as *mut u8, len)
}

/// Borrow a NUL-terminated caller string as bytes (without the NUL).
///
/// # Safety
///
/// A non-NULL `ptr` must point to a NUL-terminated string.
pub unsafe fn cstr<'a>(op: &str, ptr: *const c_char, name: &str) -> &'a [u8] {
    contract::non_null(op, ptr, name);
    CStr::from_ptr(ptr).to_bytes()
}

/// Borrow a NUL-terminated caller string as text, replacing invalid UTF-8.
///
/// # Safety
///
/// A non-NULL `ptr` must point to a NUL-terminated string.
pub unsafe fn cstr_text<'a>(op: &str, ptr: *const c_char, name: &str) -> Cow<'a, str> {
    String::from_utf8_lossy(cstr(op, ptr, name))
}

/// Borrow an out-parameter slot, aborting if it is NULL.
///
/// # Safety
///
/// A non-NULL `ptr` must be valid for writes of one `T`.
pub unsafe fn out<'a, T>(op: &str, ptr: *mut T, name: &str) -> &'a mut T {
    contract::non_null(op, ptr as *const T, name);
    &mut *ptr
}

/// Borrow an array of `len` items. `ptr` may be NULL only when `len == 0`.
///
/// # Safety
///
/// A non-NULL `ptr` must be valid for reads of `len` items.
pub unsafe fn array<'a, T>(op: &str, ptr: *const T, len: usize) -> &'a [T] {
    if len == 0 {
        return &[];
    }
    contract::non_null(op, ptr, "array");
    std::slice::from_raw_parts(ptr, len)
}

/// Copy as much of `src` as fits into `dst`, returning the count.
pub fn copy_out(src: &[u8], dst: &mut [u8]) -> usize {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    n
}

/// Copy `src` into `dst` as a NUL-terminated string, truncating to fit.
///
/// Returns the number of bytes copied, not counting the terminator. A
/// zero-length `dst` receives nothing.
pub fn copy_out_cstr(src: &[u8], dst: &mut [u8]) -> usize {
    if dst.is_empty() {
        return 0;
    }
    let n = src.len().min(dst.len() - 1);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n] = 0;
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_out_truncates() {
        let mut dst = [0u8; 3];
        assert_eq!(copy_out(b"hello", &mut dst), 3);
        assert_eq!(&dst, b"hel");
        let mut big = [0u8; 8];
        assert_eq!(copy_out(b"hi", &mut big), 2);
    }

    #[test]
    fn test_copy_out_cstr_terminates() {
        let mut dst = [0xffu8; 4];
        assert_eq!(copy_out_cstr(b"hello", &mut dst), 3);
        assert_eq!(&dst, b"hel\0");
        let mut empty: [u8; 0] = [];
        assert_eq!(copy_out_cstr(b"x", &mut empty), 0);
    }

    #[test]
    fn test_empty_span_accepts_null() {
        let s = unsafe { span("test", std::ptr::null(), 0) };
        assert!(s.is_empty());
    }
}
