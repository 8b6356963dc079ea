//! Storage capability brokered to guest code.
//!
//! The bridge only ever needs three operations on the host store, expressed
//! by the [`Store`] trait. Implementations decide how values are persisted;
//! [`MemoryStore`] keeps them in a map.
//!
//! Stores may be shared by concurrent invocations, so implementations must
//! be `Send + Sync`.

mod memory;

use std::io::{Read, Write};
use std::sync::Arc;

use thiserror::Error;

pub use memory::MemoryStore;

/// Errors returned by a [`Store`].
///
/// These never abort an invocation. The bridge hands the message back to the
/// guest as the `error` field of the command result.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not accessible to this caller
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// IO error while streaming a value
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A lock guarding the store was poisoned by a panicking writer
    #[error("store lock poisoned")]
    Poisoned,
    /// Error reported by the backing storage
    #[error("storage error: {0}")]
    Backend(String),
}

/// Key/value storage capability.
pub trait Store: Send + Sync {
    /// Store the full contents of `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &mut dyn Read) -> Result<(), StoreError>;

    /// Returns true if a value is stored under `key`.
    fn has(&self, key: &str) -> Result<bool, StoreError>;

    /// Write the value stored under `key` into `sink`.
    ///
    /// Returns `Ok(false)` without touching the sink if the key is absent.
    fn get(&self, key: &str, sink: &mut dyn Write) -> Result<bool, StoreError>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn put(&self, key: &str, value: &mut dyn Read) -> Result<(), StoreError> {
        (**self).put(key, value)
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        (**self).has(key)
    }

    fn get(&self, key: &str, sink: &mut dyn Write) -> Result<bool, StoreError> {
        (**self).get(key, sink)
    }
}
