//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::ffi::CString;

use fatstd::buffer::{fat_BytesBufferBytes, fat_BytesBufferFree, fat_BytesBufferNew};
use fatstd::bytes::{fat_BytesCopyOut, fat_BytesFree, fat_BytesLen, fat_BytesNewN};
use fatstd::error::{fat_ErrorFree, fat_ErrorMessage, fat_ErrorStatus};
use fatstd::string::{fat_StringCopyOut, fat_StringFree, fat_StringLen, fat_StringNewUTF8};
use fatstd::{FatBytes, FatBytesBuffer, FatError, FatString, Status};

pub fn bytes(data: &[u8]) -> FatBytes {
    unsafe { fat_BytesNewN(data.as_ptr().cast(), data.len()) }
}

/// Copy the contents out and free the handle.
pub fn take_bytes(b: FatBytes) -> Vec<u8> {
    let mut out = vec![0u8; fat_BytesLen(b)];
    let n = unsafe { fat_BytesCopyOut(b, out.as_mut_ptr().cast(), out.len()) };
    assert_eq!(n, out.len());
    fat_BytesFree(b);
    out
}

pub fn string(s: &str) -> FatString {
    let c = CString::new(s).unwrap();
    unsafe { fat_StringNewUTF8(c.as_ptr()) }
}

/// Copy the contents out and free the handle.
pub fn take_string(s: FatString) -> String {
    let mut out = vec![0u8; fat_StringLen(s)];
    let n = unsafe { fat_StringCopyOut(s, out.as_mut_ptr().cast(), out.len()) };
    assert_eq!(n, out.len());
    fat_StringFree(s);
    String::from_utf8(out).unwrap()
}

pub fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

/// Assert a failed call left an error handle with `status`, free it, and
/// return its message.
pub fn take_error(err: FatError, status: Status) -> String {
    assert!(err.is_valid(), "expected an error handle");
    assert_eq!(fat_ErrorStatus(err), status);
    let msg = take_string(fat_ErrorMessage(err));
    fat_ErrorFree(err);
    msg
}

pub fn new_buffer() -> FatBytesBuffer {
    fat_BytesBufferNew()
}

/// Snapshot a buffer's contents and free it.
pub fn take_buffer(b: FatBytesBuffer) -> Vec<u8> {
    let out = take_bytes(fat_BytesBufferBytes(b));
    fat_BytesBufferFree(b);
    out
}
