//! Async execution engine for code bundles

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::bridge;
use crate::limits::ResourceLimits;
use crate::marshal::Value;
use crate::store::Store;

/// Errors that end an invocation.
///
/// Storage command failures are not listed here: they are reported to the
/// guest as values and only end the invocation if the guest decides so.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The host-owned prelude failed to load. Always a host defect.
    #[error("internal error: bootstrap prelude failed to load: {0}")]
    Bootstrap(String),
    /// The bundle stream could not be read as UTF-8 text
    #[error("failed to read code bundle: {0}")]
    ReadBundle(#[source] std::io::Error),
    /// The bundle failed to parse or threw during top-level evaluation
    #[error("error loading code bundle: {0}")]
    Bundle(String),
    /// The call arguments contain a shape that cannot be encoded
    #[error("failed to encode call arguments: {0}")]
    Marshal(#[source] serde_json::Error),
    /// The named entry point is not a global function after loading
    #[error("internal error: entry point `{0}` is not defined by the code bundle")]
    MissingEntryPoint(String),
    /// The entry point threw
    #[error("{0}")]
    Guest(String),
    /// The host/guest contract was broken
    #[error("internal error: {0}")]
    Internal(String),
    /// The invocation ran past its deadline
    #[error("execution deadline exceeded")]
    Timeout,
    /// Concurrency semaphore error
    #[error("semaphore error")]
    Semaphore,
}

impl ExecError {
    /// Returns true for errors that indicate a broken host or bundle
    /// contract rather than an ordinary failure.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ExecError::Bootstrap(_) | ExecError::MissingEntryPoint(_) | ExecError::Internal(_)
        )
    }
}

/// Statistics about one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    /// Storage commands that reached the store
    pub commands: usize,
    /// Wall clock time in milliseconds
    pub wall_time_ms: u64,
}

/// Bundle execution engine
///
/// Runs invocations on tokio's blocking thread pool, at most
/// `max_concurrent` at a time. Each invocation gets its own interpreter, so
/// nothing carries over between calls; all shared state lives in the
/// [`Store`], which must tolerate concurrent use.
pub struct Cask {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl fmt::Debug for Cask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cask")
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl Cask {
    /// Create an engine allowing `max_concurrent` simultaneous invocations.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Run `entry` from `bundle` with `args` against `store`.
    ///
    /// Without a timeout in `limits`, a bundle that never returns holds its
    /// permit and blocking thread forever.
    pub async fn execute(
        &self,
        store: Arc<dyn Store>,
        bundle: impl Into<Vec<u8>>,
        entry: &str,
        args: Value,
        limits: ResourceLimits,
    ) -> Result<ExecutionStats, ExecError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ExecError::Semaphore)?;

        let bundle = bundle.into();
        let entry = entry.to_string();
        let stats = tokio::task::spawn_blocking(move || {
            bridge::run_with_limits(store, bundle.as_slice(), &entry, &args, &limits)
        })
        .await
        .map_err(|e| ExecError::Internal(format!("execution task failed: {}", e)))??;

        tracing::info!(
            commands = stats.commands,
            wall_time_ms = stats.wall_time_ms,
            "invocation finished"
        );
        Ok(stats)
    }

    /// Get the maximum concurrent executions
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
