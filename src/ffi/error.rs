//! Recoverable-error reporting for FFI.
//!
//! A fallible export returns a [`Status`] and hands the caller a fresh error
//! handle through `out_err`. The helpers here keep the two out-parameters
//! consistent: on success the error slot is zeroed, on failure a new error
//! object is registered and the status comes from the error's variant.

use super::handles::FatError;
use super::raw;
use crate::error::{Error, ErrorObject, Result};
use crate::types::Status;

/// Register an error object and return its status and handle.
pub fn error_handle(op: &str, err: Error) -> (Status, FatError) {
    let status = err.status();
    tracing::debug!(op, ?status, error = %err, "recoverable error");
    let handle = FatError::register(ErrorObject::new(status, err.to_string()));
    (status, handle)
}

/// Finish a fallible call: on success run `on_ok`, otherwise fill `out_err`.
///
/// The caller is expected to have zeroed its primary out-parameters before
/// doing any work, so a failure leaves them at 0.
pub fn complete<T>(
    op: &str,
    out_err: &mut FatError,
    result: Result<T>,
    on_ok: impl FnOnce(T),
) -> Status {
    match result {
        Ok(value) => {
            on_ok(value);
            *out_err = FatError::invalid();
            Status::Ok
        }
        Err(err) => {
            let (status, handle) = error_handle(op, err);
            *out_err = handle;
            status
        }
    }
}

/// Borrow and zero the `out_err` slot of a fallible export.
///
/// # Safety
///
/// `out_err` must be NULL (fatal) or valid for writes.
pub unsafe fn out_err<'a>(op: &str, out_err: *mut FatError) -> &'a mut FatError {
    let slot = raw::out(op, out_err, "out_err");
    *slot = FatError::invalid();
    slot
}
