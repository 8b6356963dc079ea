//! The execution bridge: runs one entry point of a code bundle.
//!
//! Each call builds a fresh interpreter, evaluates the prelude and the
//! bundle, installs the `send` dispatch function and calls
//! `recv(entry, jsonArgs)`. Guest storage commands are resolved
//! synchronously against the [`Store`] while the guest waits.
//!
//! Nothing outlives the call: the interpreter, the loaded bundle and every
//! command result are dropped before `run` returns.

use std::cell::Cell;
use std::io::Read;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use crate::command::dispatcher;
use crate::limits::ResourceLimits;
use crate::marshal::{self, Value};
use crate::prelude::{DISPATCH_FUNCTION, ENTRY_FUNCTION, PRELUDE};
use crate::runtime::{ExecError, ExecutionStats};
use crate::script::{QuickJs, ScriptError, ScriptRuntime, ScriptValue};
use crate::store::Store;

/// Run `entry` from `bundle` with `args`, giving it access to `store`.
///
/// Guest execution is unbounded: a bundle that loops forever blocks the
/// calling thread. Use [`run_with_limits`] to set a deadline.
///
/// The entry point's return value is ignored; its effect is the storage
/// commands it issues.
pub fn run(
    store: Arc<dyn Store>,
    bundle: impl Read,
    entry: &str,
    args: &Value,
) -> Result<ExecutionStats, ExecError> {
    run_with_limits(store, bundle, entry, args, &ResourceLimits::default())
}

/// [`run`] with resource limits applied to the interpreter.
pub fn run_with_limits(
    store: Arc<dyn Store>,
    bundle: impl Read,
    entry: &str,
    args: &Value,
    limits: &ResourceLimits,
) -> Result<ExecutionStats, ExecError> {
    let runtime = QuickJs::new(limits)
        .map_err(|e| ExecError::Internal(format!("failed to start interpreter: {}", e)))?;
    run_in(runtime, store, bundle, entry, args)
}

/// [`run`] on a caller-supplied interpreter.
///
/// `runtime` must be fresh; it is consumed so it cannot serve a second
/// invocation.
pub fn run_in<R: ScriptRuntime>(
    mut runtime: R,
    store: Arc<dyn Store>,
    mut bundle: impl Read,
    entry: &str,
    args: &Value,
) -> Result<ExecutionStats, ExecError> {
    let started = Instant::now();
    let span = tracing::debug_span!("invoke", entry = %entry);
    let _guard = span.enter();

    // Arguments are checked before any guest code runs.
    let encoded = marshal::encode(args).map_err(ExecError::Marshal)?;

    let mut source = String::new();
    bundle
        .read_to_string(&mut source)
        .map_err(ExecError::ReadBundle)?;

    runtime.load("prelude", PRELUDE).map_err(|e| {
        tracing::error!(error = %e, "bootstrap prelude failed to load");
        match e {
            ScriptError::Interrupted => ExecError::Timeout,
            other => ExecError::Bootstrap(other.to_string()),
        }
    })?;

    let issued = Rc::new(Cell::new(0));
    runtime
        .register(DISPATCH_FUNCTION, dispatcher(store, Rc::clone(&issued)))
        .map_err(|e| ExecError::Internal(e.to_string()))?;

    runtime.load("bundle", &source).map_err(|e| match e {
        ScriptError::Interrupted => ExecError::Timeout,
        ScriptError::Fatal(message) => ExecError::Internal(message),
        other => ExecError::Bundle(other.to_string()),
    })?;
    tracing::debug!(bytes = source.len(), "code bundle loaded");

    let recv = runtime
        .global_function(ENTRY_FUNCTION)
        .map_err(|e| lookup_error(ENTRY_FUNCTION, e))?
        .ok_or_else(|| {
            ExecError::Internal(format!("`{}` is not defined after loading", ENTRY_FUNCTION))
        })?;
    if runtime
        .global_function(entry)
        .map_err(|e| lookup_error(entry, e))?
        .is_none()
    {
        return Err(ExecError::MissingEntryPoint(entry.to_string()));
    }

    let returned = runtime
        .call(
            &recv,
            &[
                ScriptValue::String(entry.to_string()),
                ScriptValue::String(encoded),
            ],
        )
        .map_err(|e| match e {
            ScriptError::Interrupted => ExecError::Timeout,
            ScriptError::Fatal(message) => ExecError::Internal(message),
            other => ExecError::Guest(other.to_string()),
        })?;
    tracing::debug!(returned = %returned, "entry point returned; result ignored");

    Ok(ExecutionStats {
        commands: issued.get(),
        wall_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

fn lookup_error(name: &str, err: ScriptError) -> ExecError {
    match err {
        ScriptError::Interrupted => ExecError::Timeout,
        other => ExecError::Internal(format!("looking up `{}`: {}", name, other)),
    }
}
