//! Key-level access policy for the storage capability.
//!
//! A bundle only reaches the host through three storage commands. This module
//! narrows that further: a [`PolicyStore`] wraps any [`Store`](crate::Store)
//! and checks every `Put`, `Has` and `Get` against configurable rules before
//! it reaches the backing store.
//!
//! Denials are ordinary storage errors. The guest receives them in the
//! `error` field of the command result and decides what to do; they never
//! abort the invocation.
//!
//! ## Example
//!
//! ```rust
//! use cask::policy::{PolicyBuilder, PolicyHandler, Operation};
//!
//! // Read anything, write only under `cache/`
//! let policy = PolicyBuilder::new()
//!     .allow_read("*")
//!     .allow_write("cache/*")
//!     .build();
//!
//! assert!(policy.check_access("cache/user", Operation::Put).is_allowed());
//! ```

mod handler;
mod storage;

pub use handler::{
    AllowAllPolicy, DenyAllPolicy, Operation, Policy, PolicyBuilder, PolicyDecision,
    PolicyHandler, read_only_policy,
};
pub use storage::PolicyStore;
