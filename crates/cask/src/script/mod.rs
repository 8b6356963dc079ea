//! Embeddable script runtime abstraction.
//!
//! The bridge never talks to an interpreter directly. It drives a
//! [`ScriptRuntime`], which offers the four operations the bridge needs:
//! load source, register a host function, look up a global function and call
//! it. [`QuickJs`] implements the trait on the embedded QuickJS engine.
//!
//! Values cross this interface as [`ScriptValue`]s (JSON values), so an
//! implementation only has to map its native values to and from JSON.

mod quickjs;

use std::fmt;

use thiserror::Error;

pub use quickjs::QuickJs;

/// A value passed between host functions and guest code.
pub type ScriptValue = serde_json::Value;

/// A host function callable from guest code.
pub type HostFn = Box<dyn Fn(&[ScriptValue]) -> Result<ScriptValue, HostError>>;

/// How a host function refuses a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Raise an ordinary exception in the guest, which it may catch.
    Throw(String),
    /// The call broke the host/guest contract. The runtime raises an
    /// exception and remembers the failure, so the current `load` or `call`
    /// fails with [`ScriptError::Fatal`] even if the guest catches it.
    Fatal(String),
}

/// Errors reported by a [`ScriptRuntime`].
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The interpreter could not be created or configured
    #[error("interpreter setup failed: {0}")]
    Init(String),
    /// Guest code threw, or failed to parse
    #[error("{0}")]
    Exception(String),
    /// A host function reported a contract violation
    #[error("{0}")]
    Fatal(String),
    /// Execution was stopped by the runtime's interrupt hook
    #[error("execution interrupted")]
    Interrupted,
}

/// Handle to a function found in the runtime's global scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    name: String,
}

impl FunctionRef {
    /// Create a handle for the global function `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the global the handle refers to.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// An isolated script interpreter.
///
/// One instance serves exactly one invocation; implementations are not
/// expected to be `Send` or reusable.
pub trait ScriptRuntime {
    /// Evaluate `source` in the global scope. `name` identifies the source in
    /// diagnostics.
    fn load(&mut self, name: &str, source: &str) -> Result<(), ScriptError>;

    /// Install `function` as the global `name`.
    fn register(&mut self, name: &str, function: HostFn) -> Result<(), ScriptError>;

    /// Look up the global `name`, returning `None` unless it is a function.
    fn global_function(&mut self, name: &str) -> Result<Option<FunctionRef>, ScriptError>;

    /// Call a global function with positional arguments.
    fn call(&mut self, function: &FunctionRef, args: &[ScriptValue])
    -> Result<ScriptValue, ScriptError>;
}
