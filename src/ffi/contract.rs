//! Fatal channel for caller contract violations.
//!
//! Passing a freed handle, a NULL out-pointer or an out-of-range index is a
//! programming error in the C caller. There is no status for it: the
//! violation is logged and the process aborts.

use std::fmt::Display;

use super::registry::HandleError;

/// Log the violation and abort the process.
#[cold]
pub fn violation(op: &str, reason: impl Display) -> ! {
    tracing::error!(op, %reason, "contract violation");
    eprintln!("fatal: {}: {}", op, reason);
    std::process::abort()
}

/// Unwrap a handle-table result or abort.
#[inline]
pub fn handle<T>(op: &str, result: Result<T, HandleError>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => violation(op, err),
    }
}

/// Abort unless `cond` holds.
#[inline]
pub fn require(op: &str, cond: bool, reason: &str) {
    if !cond {
        violation(op, reason);
    }
}

/// Abort when `ptr` is NULL.
#[inline]
pub fn non_null<T>(op: &str, ptr: *const T, name: &str) {
    if ptr.is_null() {
        violation(op, format_args!("{} is NULL", name));
    }
}

/// Convert a caller-supplied length or index to `usize`, aborting when negative.
#[inline]
pub fn index(op: &str, value: isize, name: &str) -> usize {
    match usize::try_from(value) {
        Ok(v) => v,
        Err(_) => violation(op, format_args!("{} is negative ({})", name, value)),
    }
}
