//! [`ScriptRuntime`] on the embedded QuickJS engine.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rquickjs::prelude::Rest;
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Exception, Function, Runtime, Value};

use super::{FunctionRef, HostError, HostFn, ScriptError, ScriptRuntime, ScriptValue};
use crate::limits::ResourceLimits;

type SharedHostFn = Rc<dyn Fn(&[ScriptValue]) -> Result<ScriptValue, HostError>>;
type FatalSlot = Rc<RefCell<Option<String>>>;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A QuickJS interpreter with its own runtime and global scope.
///
/// Nothing is shared between instances: each one owns a separate QuickJS
/// runtime, so globals defined by one bundle are never visible to another.
pub struct QuickJs {
    context: Context,
    // Dropped after the context.
    _runtime: Runtime,
    fatal: FatalSlot,
    halted: Arc<AtomicBool>,
    interrupted: Arc<AtomicBool>,
}

impl fmt::Debug for QuickJs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuickJs")
            .field("interrupted", &self.interrupted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl QuickJs {
    /// Create a fresh interpreter configured with `limits`.
    ///
    /// The timeout, if any, starts counting now and covers every later
    /// `load` and `call` on this instance.
    pub fn new(limits: &ResourceLimits) -> Result<Self, ScriptError> {
        let runtime = Runtime::new().map_err(|e| ScriptError::Init(e.to_string()))?;

        if let Some(bytes) = limits.max_memory_bytes {
            runtime.set_memory_limit(usize::try_from(bytes).unwrap_or(usize::MAX));
        }
        if let Some(bytes) = limits.max_stack_bytes {
            runtime.set_max_stack_size(usize::try_from(bytes).unwrap_or(usize::MAX));
        }

        // The handler stops the guest once a host function reports a fatal
        // error, and when the deadline passes.
        let halted = Arc::new(AtomicBool::new(false));
        let interrupted = Arc::new(AtomicBool::new(false));
        let deadline = limits.timeout.map(|timeout| Instant::now() + timeout);
        let (halt, flag) = (Arc::clone(&halted), Arc::clone(&interrupted));
        runtime.set_interrupt_handler(Some(Box::new(move || {
            if halt.load(Ordering::Relaxed) {
                return true;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                flag.store(true, Ordering::Relaxed);
                return true;
            }
            false
        })));

        let context = Context::full(&runtime).map_err(|e| ScriptError::Init(e.to_string()))?;

        Ok(Self {
            context,
            _runtime: runtime,
            fatal: Rc::new(RefCell::new(None)),
            halted,
            interrupted,
        })
    }

    /// Turn the outcome of a guest operation into a [`ScriptError`], giving
    /// interrupts and recorded host failures priority over the exception the
    /// guest saw. A recorded host failure is permanent: every later
    /// operation on this instance fails with it too.
    fn settle<T>(&self, outcome: Result<T, CaughtError<'_>>) -> Result<T, ScriptError> {
        let fatal = self.fatal.borrow().clone();
        if self.interrupted.load(Ordering::Relaxed) {
            return Err(ScriptError::Interrupted);
        }
        match (outcome, fatal) {
            (_, Some(message)) => Err(ScriptError::Fatal(message)),
            (Ok(value), None) => Ok(value),
            (Err(err), None) => Err(ScriptError::Exception(describe(err))),
        }
    }
}

impl ScriptRuntime for QuickJs {
    fn load(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        tracing::debug!(script = %name, bytes = source.len(), "evaluating script");
        self.context.with(|ctx| {
            let outcome = ctx.eval::<(), _>(source).catch(&ctx);
            self.settle(outcome)
        })
    }

    fn register(&mut self, name: &str, function: HostFn) -> Result<(), ScriptError> {
        let host: SharedHostFn = Rc::from(function);
        let fatal = Rc::clone(&self.fatal);
        let halted = Arc::clone(&self.halted);
        self.context
            .with(|ctx| {
                let function = host_function(&ctx, host, fatal, halted)?;
                ctx.globals().set(name, function)
            })
            .map_err(|e| ScriptError::Init(format!("failed to register `{}`: {}", name, e)))
    }

    fn global_function(&mut self, name: &str) -> Result<Option<FunctionRef>, ScriptError> {
        self.context.with(|ctx| {
            let outcome = ctx.globals().get::<_, Value<'_>>(name).catch(&ctx);
            let value = self.settle(outcome)?;
            Ok(value.is_function().then(|| FunctionRef::new(name)))
        })
    }

    fn call(
        &mut self,
        function: &FunctionRef,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, ScriptError> {
        self.context.with(|ctx| {
            let outcome = invoke(&ctx, function.name(), args).catch(&ctx);
            self.settle(outcome)
        })
    }
}

fn host_function<'js>(
    ctx: &Ctx<'js>,
    host: SharedHostFn,
    fatal: FatalSlot,
    halted: Arc<AtomicBool>,
) -> rquickjs::Result<Function<'js>> {
    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            // After a fatal error no host function runs again.
            if let Some(message) = fatal.borrow().clone() {
                return Err(Exception::throw_internal(&ctx, &message));
            }

            let args = args
                .0
                .iter()
                .map(|arg| to_script_value(&ctx, arg))
                .collect::<rquickjs::Result<Vec<_>>>()?;

            match (*host)(&args) {
                Ok(value) => from_script_value(&ctx, &value),
                Err(HostError::Throw(message)) => Err(Exception::throw_type(&ctx, &message)),
                Err(HostError::Fatal(message)) => {
                    let error = Exception::throw_internal(&ctx, &message);
                    *fatal.borrow_mut() = Some(message);
                    halted.store(true, Ordering::Relaxed);
                    Err(error)
                }
            }
        },
    )
}

fn invoke<'js>(ctx: &Ctx<'js>, name: &str, args: &[ScriptValue]) -> rquickjs::Result<ScriptValue> {
    let function: Function<'js> = ctx.globals().get(name)?;
    let args = args
        .iter()
        .map(|arg| from_script_value(ctx, arg))
        .collect::<rquickjs::Result<Vec<_>>>()?;

    let returned: Value<'js> = function.call((Rest(args),))?;

    // A return value with no JSON form (cyclic objects, BigInt) becomes null
    // rather than failing a call that already completed.
    match to_script_value(ctx, &returned) {
        Ok(value) => Ok(value),
        Err(_) => {
            let _ = ctx.catch();
            Ok(ScriptValue::Null)
        }
    }
}

fn to_script_value<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<ScriptValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(ScriptValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(ScriptValue::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(ScriptValue::from(i));
    }
    if let Some(f) = value.as_float() {
        // QuickJS keeps many integers as doubles; report them as integers.
        if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
            return Ok(ScriptValue::from(f as i64));
        }
        return Ok(serde_json::Number::from_f64(f).map_or(ScriptValue::Null, ScriptValue::Number));
    }
    if let Some(s) = value.as_string() {
        return Ok(ScriptValue::String(s.to_string()?));
    }

    let Some(json) = ctx.json_stringify(value.clone())? else {
        // Functions and symbols have no JSON form.
        return Ok(ScriptValue::Null);
    };
    serde_json::from_str(&json.to_string()?).map_err(|e| Exception::throw_type(ctx, &e.to_string()))
}

fn from_script_value<'js>(ctx: &Ctx<'js>, value: &ScriptValue) -> rquickjs::Result<Value<'js>> {
    ctx.json_parse(value.to_string())
}

fn describe(err: CaughtError<'_>) -> String {
    match err {
        CaughtError::Exception(exception) => {
            let message = exception.message().unwrap_or_default();
            let name = exception.as_object().get::<_, String>("name").ok();
            match name {
                Some(name) if !name.is_empty() => format!("{}: {}", name, message),
                _ => message,
            }
        }
        CaughtError::Value(value) => match value.as_string().and_then(|s| s.to_string().ok()) {
            Some(s) => s,
            None => format!("uncaught {:?} value", value.type_of()),
        },
        CaughtError::Error(error) => error.to_string(),
    }
}
