//! Policy-enforcing store wrapper.

use std::io::{Read, Write};
use std::sync::Arc;

use super::handler::{Operation, PolicyDecision, PolicyHandler};
use crate::store::{Store, StoreError};

/// A store wrapper that enforces policy on all operations.
///
/// This wraps any [`Store`] implementation and checks every command against a
/// [`PolicyHandler`] before letting it through. Denials come back as
/// [`StoreError::PermissionDenied`], which the guest sees as the `error`
/// field of the command result.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use cask::MemoryStore;
/// use cask::policy::{PolicyBuilder, PolicyStore};
///
/// let storage = Arc::new(MemoryStore::new());
/// let policy = PolicyBuilder::new()
///     .allow_read("*")
///     .allow_write("scratch/*")
///     .build();
///
/// let policy_store = PolicyStore::new(storage, Arc::new(policy));
/// # let _ = policy_store;
/// ```
pub struct PolicyStore<S: Store + ?Sized, P: PolicyHandler + ?Sized> {
    inner: Arc<S>,
    policy: Arc<P>,
}

impl<S: Store + ?Sized, P: PolicyHandler + ?Sized> PolicyStore<S, P> {
    /// Create a new policy store wrapper.
    pub fn new(store: Arc<S>, policy: Arc<P>) -> Self {
        Self {
            inner: store,
            policy,
        }
    }

    /// Get a reference to the inner store.
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// Get a reference to the policy handler.
    pub fn policy(&self) -> &Arc<P> {
        &self.policy
    }

    fn check(&self, key: &str, operation: Operation) -> Result<(), StoreError> {
        match self.policy.check_access(key, operation) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                tracing::debug!(
                    key = %key,
                    operation = ?operation,
                    reason = %reason,
                    "policy denied access"
                );
                Err(StoreError::PermissionDenied(reason))
            }
        }
    }
}

impl<S: Store + ?Sized, P: PolicyHandler + ?Sized> Clone for PolicyStore<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: Arc::clone(&self.policy),
        }
    }
}

impl<S: Store + ?Sized, P: PolicyHandler + ?Sized> std::fmt::Debug for PolicyStore<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStore").finish_non_exhaustive()
    }
}

impl<S: Store + ?Sized, P: PolicyHandler + ?Sized> Store for PolicyStore<S, P> {
    fn put(&self, key: &str, value: &mut dyn Read) -> Result<(), StoreError> {
        self.check(key, Operation::Put)?;
        self.inner.put(key, value)
    }

    fn has(&self, key: &str) -> Result<bool, StoreError> {
        self.check(key, Operation::Has)?;
        self.inner.has(key)
    }

    fn get(&self, key: &str, sink: &mut dyn Write) -> Result<bool, StoreError> {
        self.check(key, Operation::Get)?;
        self.inner.get(key, sink)
    }
}
