//! Error types for fatstd, and the error objects handed to C.

use std::io;
use std::os::raw::c_void;

use thiserror::Error;

use crate::ffi::{FatError, FatString};
use crate::string::Text;
use crate::types::Status;

/// Result type alias for fatstd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for recoverable failures.
///
/// Contract violations are not represented here; they never return.
#[derive(Error, Debug)]
pub enum Error {
    /// Input is malformed.
    #[error("{0}")]
    Syntax(String),

    /// A value or parameter is out of range.
    #[error("{0}")]
    Range(String),

    /// Input ended before a complete item was read.
    #[error("{0}")]
    UnexpectedEof(String),

    /// I/O error from a reader, writer or file.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// Network error (resolve, connect, protocol).
    #[error("{0}")]
    Network(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Status reported to C for this error.
    pub fn status(&self) -> Status {
        match self {
            Error::Syntax(_) => Status::Syntax,
            Error::Range(_) => Status::Range,
            Error::UnexpectedEof(_) => Status::Eof,
            Error::Io(e) => match e.kind() {
                io::ErrorKind::UnexpectedEof => Status::Eof,
                io::ErrorKind::InvalidData => Status::Syntax,
                _ => Status::Other,
            },
            Error::Network(_) | Error::Other(_) => Status::Other,
        }
    }

    /// Check if this is a syntax error.
    pub fn is_syntax(&self) -> bool {
        self.status() == Status::Syntax
    }

    /// Check if this reports truncated input.
    pub fn is_unexpected_eof(&self) -> bool {
        self.status() == Status::Eof
    }

    pub(crate) fn syntax(msg: impl Into<String>) -> Self {
        Error::Syntax(msg.into())
    }

    pub(crate) fn range(msg: impl Into<String>) -> Self {
        Error::Range(msg.into())
    }

    pub(crate) fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

/// Error object owned by an error handle.
#[derive(Debug, Clone)]
pub struct ErrorObject {
    status: Status,
    message: String,
}

impl ErrorObject {
    pub(crate) fn new(status: Status, message: String) -> Self {
        Self { status, message }
    }

    /// Status the failing call returned.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Returns the message of an error as a new string handle.
#[no_mangle]
pub extern "C" fn fat_ErrorMessage(e: FatError) -> FatString {
    let err = e.resolve("fat_ErrorMessage");
    FatString::register(Text::from(err.message()))
}

/// Returns the status the failing call reported.
#[no_mangle]
pub extern "C" fn fat_ErrorStatus(e: FatError) -> Status {
    e.resolve("fat_ErrorStatus").status()
}

/// Copies the message into a caller buffer as a NUL-terminated string.
///
/// # Safety
///
/// `dst` must be valid for writes of `dst_len` bytes.
#[no_mangle]
pub unsafe extern "C" fn fat_ErrorCopyMessageCStr(
    e: FatError,
    dst: *mut c_void,
    dst_len: usize,
) -> usize {
    const OP: &str = "fat_ErrorCopyMessageCStr";
    let err = e.resolve(OP);
    let dst = crate::ffi::raw::span_mut(OP, dst, dst_len);
    crate::ffi::raw::copy_out_cstr(err.message().as_bytes(), dst)
}

/// Releases an error handle.
#[no_mangle]
pub extern "C" fn fat_ErrorFree(e: FatError) {
    e.release("fat_ErrorFree");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::syntax("bad").status(), Status::Syntax);
        assert_eq!(Error::range("big").status(), Status::Range);
        assert_eq!(Error::UnexpectedEof("short".into()).status(), Status::Eof);
        assert_eq!(Error::Network("refused".into()).status(), Status::Other);
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(Error::from(eof).status(), Status::Eof);
        let bad = io::Error::new(io::ErrorKind::InvalidData, "corrupt");
        assert!(Error::from(bad).is_syntax());
        let other = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(Error::from(other).status(), Status::Other);
    }

    #[test]
    fn test_message_is_passed_through() {
        let err = Error::syntax("illegal base64 data at input byte 4");
        assert_eq!(err.to_string(), "illegal base64 data at input byte 4");
    }

    #[test]
    fn test_error_handle_round_trip() {
        let (status, h) = crate::ffi::error_handle("test", Error::range("value out of range"));
        assert_eq!(status, Status::Range);
        assert!(h.is_valid());
        assert_eq!(fat_ErrorStatus(h), Status::Range);
        let msg = fat_ErrorMessage(h);
        assert_eq!(msg.resolve("test").as_bytes(), b"value out of range");
        crate::string::fat_StringFree(msg);
        fat_ErrorFree(h);
    }
}
