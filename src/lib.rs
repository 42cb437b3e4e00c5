//! C-callable standard library through opaque handles.
//!
//! Every value that crosses the boundary (strings, byte slices, buffers,
//! readers, codecs, archives, sockets, maps) lives in a process-wide handle
//! table and is addressed by a non-zero integer token. Tokens are handed out
//! monotonically and never reused, so a stale token is always detected.
//!
//! Two channels report failure:
//!
//! - Caller contract violations (freed or foreign handle, NULL out-pointer,
//!   index out of range) log the operation and abort the process.
//! - Recoverable failures return a [`Status`] and a fresh error handle
//!   through `out_err`. Reaching the end of input is not an error; readers
//!   raise a `bool` EOF flag instead.
//!
//! # Example
//!
//! The exports are plain Rust functions as well, so the rlib can drive them
//! directly:
//!
//! ```
//! use fatstd::bytes::{fat_BytesFree, fat_BytesLen, fat_BytesNewN};
//!
//! fatstd::fat_Init();
//! let b = unsafe { fat_BytesNewN(b"hello".as_ptr().cast(), 5) };
//! assert_eq!(fat_BytesLen(b), 5);
//! fat_BytesFree(b);
//! ```

#![allow(non_snake_case)]

pub mod base64;
pub mod buffer;
pub mod builder;
pub mod bytes;
pub mod compress;
pub mod conv;
pub mod csv;
pub mod error;
pub mod ffi;
pub mod http;
pub mod json;
pub mod net;
pub mod reader;
pub mod string;
pub mod tar;
pub mod tiled;
pub mod types;
pub mod xml;
pub mod zip;

// Re-export main types at the crate root
pub use error::{Error, Result};
pub use ffi::handles::*;
pub use types::{options, JsonKind, LzwOrder, Options, Status, XmlTokenKind};

use std::os::raw::c_char;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

/// API version constants.
pub mod version {
    /// API major version.
    pub const MAJOR: i32 = 0;
    /// API minor version.
    pub const MINOR: i32 = 1;
    /// API patch version.
    pub const PATCH: i32 = 0;
}

/// Get the API version string (e.g., "0.1.0").
pub fn api_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

static LOGGING: OnceCell<()> = OnceCell::new();

/// Install the stderr log subscriber filtered by `FATSTD_LOG`.
///
/// Safe to call any number of times. A subscriber the host installed first
/// is left in place.
pub fn init() {
    LOGGING.get_or_init(|| {
        let directive = &options().log_filter;
        let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok();
        tracing::debug!(installed, filter = %directive, "fatstd initialised");
    });
}

/// Installs logging. Optional and idempotent.
#[no_mangle]
pub extern "C" fn fat_Init() {
    init();
}

/// Number of live handles across every kind.
#[no_mangle]
pub extern "C" fn fat_HandleLiveCount() -> usize {
    ffi::registry::global().live_count()
}

/// Static NUL-terminated version string; never freed.
#[no_mangle]
pub extern "C" fn fat_VersionString() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}
