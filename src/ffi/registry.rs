//! Process-wide handle table.
//!
//! Every object that crosses the C boundary lives here. A handle is the key
//! of a table entry; the entry keeps the object alive until the handle is
//! released. Keys come from a monotonically increasing counter and are never
//! issued twice, so a stale handle can always be told apart from a live one.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;

/// Why a handle could not be resolved or released.
///
/// These are contract violations on the caller's side. They never reach C
/// as a status; the export layer turns them into a fatal abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The caller passed the absent handle (0).
    #[error("handle is zero")]
    Zero,

    /// The handle was issued once and has since been released.
    #[error("handle {0} already freed")]
    Freed(usize),

    /// The handle was never issued by this table.
    #[error("handle {0} is not a known handle")]
    Unknown(usize),

    /// The handle is live but refers to an object of another kind.
    #[error("handle {handle} is a {actual}, expected {expected}")]
    WrongKind {
        /// Offending handle.
        handle: usize,
        /// Kind the operation requires.
        expected: &'static str,
        /// Kind stored under the handle.
        actual: &'static str,
    },

    /// The counter ran out of tokens.
    #[error("handle space exhausted")]
    Exhausted,
}

struct Entry {
    kind: &'static str,
    type_id: TypeId,
    value: Arc<dyn Any + Send + Sync>,
}

struct Table {
    next: usize,
    live: HashMap<usize, Entry>,
}

/// A handle table.
///
/// The library uses one global instance (see [`global`]); tests construct
/// private ones to observe violations without aborting the process.
pub struct Registry {
    table: Mutex<Table>,
}

impl Registry {
    /// Create an empty table. The first handle issued is 1.
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                next: 1,
                live: HashMap::new(),
            }),
        }
    }

    /// Register a new object and return its fresh handle.
    pub fn allocate<T: Any + Send + Sync>(
        &self,
        kind: &'static str,
        value: T,
    ) -> Result<usize, HandleError> {
        self.allocate_shared(kind, Arc::new(value))
    }

    /// Register an object that is already shared with other owners.
    pub fn allocate_shared<T: Any + Send + Sync>(
        &self,
        kind: &'static str,
        value: Arc<T>,
    ) -> Result<usize, HandleError> {
        let mut table = self.table.lock();
        let handle = table.next;
        table.next = handle.checked_add(1).ok_or(HandleError::Exhausted)?;
        table.live.insert(
            handle,
            Entry {
                kind,
                type_id: TypeId::of::<T>(),
                value,
            },
        );
        tracing::trace!(handle, kind, "allocate");
        Ok(handle)
    }

    /// Look up a live handle of type `T`.
    ///
    /// The returned `Arc` outlives the table lock, so long blocking work on
    /// the object never holds up other handles.
    pub fn resolve<T: Any + Send + Sync>(
        &self,
        kind: &'static str,
        handle: usize,
    ) -> Result<Arc<T>, HandleError> {
        let table = self.table.lock();
        let entry = Self::entry(&table, handle)?;
        if entry.type_id != TypeId::of::<T>() {
            return Err(HandleError::WrongKind {
                handle,
                expected: kind,
                actual: entry.kind,
            });
        }
        let value = entry.value.clone();
        drop(table);
        value.downcast::<T>().map_err(|_| HandleError::WrongKind {
            handle,
            expected: kind,
            actual: "unknown",
        })
    }

    /// Remove a live handle of type `T`, handing back the table's reference.
    ///
    /// The kind is checked before anything is removed, so releasing with
    /// the wrong free function leaves the entry untouched.
    pub fn release<T: Any + Send + Sync>(
        &self,
        kind: &'static str,
        handle: usize,
    ) -> Result<Arc<T>, HandleError> {
        let mut table = self.table.lock();
        let entry = Self::entry(&table, handle)?;
        if entry.type_id != TypeId::of::<T>() {
            return Err(HandleError::WrongKind {
                handle,
                expected: kind,
                actual: entry.kind,
            });
        }
        let entry = table
            .live
            .remove(&handle)
            .ok_or(HandleError::Unknown(handle))?;
        drop(table);
        tracing::trace!(handle, kind, "release");
        entry.value.downcast::<T>().map_err(|_| HandleError::WrongKind {
            handle,
            expected: kind,
            actual: "unknown",
        })
    }

    /// Number of handles currently live.
    pub fn live_count(&self) -> usize {
        self.table.lock().live.len()
    }

    fn entry(table: &Table, handle: usize) -> Result<&Entry, HandleError> {
        if handle == 0 {
            return Err(HandleError::Zero);
        }
        match table.live.get(&handle) {
            Some(entry) => Ok(entry),
            None if handle < table.next => Err(HandleError::Freed(handle)),
            None => Err(HandleError::Unknown(handle)),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

/// The table shared by every exported function.
pub fn global() -> &'static Registry {
    &GLOBAL
}
