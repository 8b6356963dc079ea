//! Storage commands issued by guest code.
//!
//! Guest code calls the host dispatch function as `send(kind, key, value?)`.
//! Each call is parsed into a [`Command`], run synchronously against the
//! [`Store`], and answered with a [`CommandResult`] that the guest reads as a
//! plain object:
//!
//! | Kind | Success                      | Failure        |
//! |------|------------------------------|----------------|
//! | Put  | `{}`                         | `{error: msg}` |
//! | Has  | `{ok: bool}`                 | `{error: msg}` |
//! | Get  | `{ok: true, data: string}` or `{ok: false}` | `{error: msg}` |
//!
//! Storage errors are values, never exceptions. Malformed calls (a key that
//! is not a string, a `Put` without a string value) throw a `TypeError` in
//! the guest. An unknown command kind breaks the protocol itself and fails
//! the whole invocation.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Map;

use crate::script::{HostError, HostFn, ScriptValue};
use crate::store::Store;

/// The fixed storage command vocabulary. The discriminants are the wire
/// numbers used by the prelude.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandKind {
    /// Store a value
    Put = 0,
    /// Check whether a key exists
    Has = 1,
    /// Read a value
    Get = 2,
}

impl TryFrom<i64> for CommandKind {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CommandKind::Put),
            1 => Ok(CommandKind::Has),
            2 => Ok(CommandKind::Get),
            other => Err(other),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Put => "put",
            CommandKind::Has => "has",
            CommandKind::Get => "get",
        };
        f.write_str(name)
    }
}

/// A parsed command invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Store `value` under `key`
    Put {
        /// Target key
        key: String,
        /// Value payload
        value: String,
    },
    /// Check whether `key` exists
    Has {
        /// Key to probe
        key: String,
    },
    /// Read the value under `key`
    Get {
        /// Key to read
        key: String,
    },
}

impl Command {
    /// The command's kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Put { .. } => CommandKind::Put,
            Command::Has { .. } => CommandKind::Has,
            Command::Get { .. } => CommandKind::Get,
        }
    }

    /// The key the command operates on.
    pub fn key(&self) -> &str {
        match self {
            Command::Put { key, .. } | Command::Has { key } | Command::Get { key } => key,
        }
    }

    /// Parse the arguments of a `send(kind, key, value?)` call.
    pub fn from_args(args: &[ScriptValue]) -> Result<Self, HostError> {
        let kind = args.first().and_then(integer).ok_or_else(|| {
            HostError::Fatal(format!(
                "{} called without a numeric command kind",
                crate::prelude::DISPATCH_FUNCTION
            ))
        })?;
        let kind = CommandKind::try_from(kind)
            .map_err(|kind| HostError::Fatal(format!("unknown command kind {}", kind)))?;

        let key = match args.get(1) {
            Some(ScriptValue::String(key)) => key.clone(),
            _ => {
                return Err(HostError::Throw(format!(
                    "{} command requires a string key",
                    kind
                )));
            }
        };

        Ok(match kind {
            CommandKind::Put => match args.get(2) {
                Some(ScriptValue::String(value)) => Command::Put {
                    key,
                    value: value.clone(),
                },
                _ => {
                    return Err(HostError::Throw(
                        "put command requires a string value".to_string(),
                    ));
                }
            },
            CommandKind::Has => Command::Has { key },
            CommandKind::Get => Command::Get { key },
        })
    }
}

fn integer(value: &ScriptValue) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// The outcome of one command, as seen by the guest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// The store call succeeded.
    Success {
        /// Existence flag; absent for `Put`
        ok: Option<bool>,
        /// Value contents; present only for a `Get` that found the key
        data: Option<String>,
    },
    /// The store call failed.
    Failure {
        /// Error message handed to the guest
        message: String,
    },
}

impl CommandResult {
    /// Returns true if the store call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, CommandResult::Success { .. })
    }

    /// The object handed back to guest code.
    pub fn to_script_value(&self) -> ScriptValue {
        let mut object = Map::new();
        match self {
            CommandResult::Success { ok, data } => {
                if let Some(ok) = ok {
                    object.insert("ok".to_string(), ScriptValue::Bool(*ok));
                }
                if let Some(data) = data {
                    object.insert("data".to_string(), ScriptValue::String(data.clone()));
                }
            }
            CommandResult::Failure { message } => {
                object.insert("error".to_string(), ScriptValue::String(message.clone()));
            }
        }
        ScriptValue::Object(object)
    }
}

/// Run one command against the store.
pub fn execute(store: &dyn Store, command: &Command) -> CommandResult {
    let result = match command {
        Command::Put { key, value } => match store.put(key, &mut value.as_bytes()) {
            Ok(()) => CommandResult::Success {
                ok: None,
                data: None,
            },
            Err(err) => failure(err),
        },
        Command::Has { key } => match store.has(key) {
            Ok(ok) => CommandResult::Success {
                ok: Some(ok),
                data: None,
            },
            Err(err) => failure(err),
        },
        Command::Get { key } => {
            let mut sink = Vec::new();
            match store.get(key, &mut sink) {
                Ok(false) => CommandResult::Success {
                    ok: Some(false),
                    data: None,
                },
                Ok(true) => match String::from_utf8(sink) {
                    Ok(data) => CommandResult::Success {
                        ok: Some(true),
                        data: Some(data),
                    },
                    Err(_) => CommandResult::Failure {
                        message: format!("value for key {} is not valid UTF-8", key),
                    },
                },
                Err(err) => failure(err),
            }
        }
    };

    if let CommandResult::Failure { message } = &result {
        tracing::warn!(
            kind = %command.kind(),
            key = %command.key(),
            error = %message,
            "storage command failed"
        );
    }
    result
}

fn failure(err: impl fmt::Display) -> CommandResult {
    CommandResult::Failure {
        message: err.to_string(),
    }
}

/// Build the host dispatch function installed as `send`.
///
/// `issued` counts the commands that reached the store. Once a call breaks
/// the protocol, every later call is refused without touching the store.
pub(crate) fn dispatcher(store: Arc<dyn Store>, issued: Rc<Cell<usize>>) -> HostFn {
    let broken = Cell::new(false);
    Box::new(move |args| {
        if broken.get() {
            return Err(HostError::Fatal(
                "storage command refused after a protocol violation".to_string(),
            ));
        }
        let command = Command::from_args(args).inspect_err(|err| {
            if matches!(err, HostError::Fatal(_)) {
                broken.set(true);
            }
        })?;
        tracing::debug!(kind = %command.kind(), key = %command.key(), "dispatching storage command");
        issued.set(issued.get() + 1);
        Ok(execute(store.as_ref(), &command).to_script_value())
    })
}
