//! Cask: run stored JavaScript bundles against a host key/value store
//!
//! A host keeps an arbitrary program (a code bundle) and later invokes a named
//! entry point inside it. Cask boots a fresh QuickJS interpreter for every
//! invocation, loads a fixed prelude and the bundle, and gives the guest a
//! single host function, `send`, through which it may issue `Put`, `Has` and
//! `Get` commands against a [`Store`]. Nothing else on the host is reachable.
//!
//! Keys and values must be JavaScript strings. Other values are not coerced:
//! `db.put("n", 5)` throws a `TypeError` in the guest instead of storing
//! `"5"`, so bundles written for string-coercing hosts must call `String()`
//! themselves.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use cask::{MemoryStore, Value};
//!
//! let store = Arc::new(MemoryStore::new());
//! let bundle = r#"
//!     function remember(args) {
//!         var result = db.put(args.key, args.value);
//!         if (result.error) throw new Error(result.error);
//!     }
//! "#;
//! let args = Value::from_iter([("key", "greeting"), ("value", "hello")]);
//!
//! cask::run(store.clone(), bundle.as_bytes(), "remember", &args).unwrap();
//! assert_eq!(store.snapshot().unwrap()["greeting"], b"hello");
//! ```

mod bridge;
mod command;
mod limits;
mod marshal;
mod prelude;
mod runtime;
mod script;
mod store;


pub mod policy;

pub use bridge::{run, run_in, run_with_limits};
pub use command::{Command, CommandKind, CommandResult, execute};
pub use limits::ResourceLimits;
pub use marshal::{Value, encode};
pub use prelude::{DISPATCH_FUNCTION, ENTRY_FUNCTION, PRELUDE, PROTOCOL_VERSION};
pub use runtime::{Cask, ExecError, ExecutionStats};
pub use script::{FunctionRef, HostError, HostFn, QuickJs, ScriptError, ScriptRuntime, ScriptValue};
pub use store::{MemoryStore, Store, StoreError};
