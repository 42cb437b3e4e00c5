//! Boundary machinery shared by every exported function.
//!
//! The handle table, the fatal contract channel, the recoverable status
//! channel and raw pointer marshalling live here. The exported `fat_*`
//! functions themselves sit next to the objects they operate on.

pub mod contract;
pub mod error;
pub mod handles;
pub mod raw;
pub mod registry;

pub use error::{complete, error_handle, out_err};
pub use handles::*;
pub use registry::{HandleError, Registry};
