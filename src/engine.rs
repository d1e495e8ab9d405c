//! Script engine seam.
//!
//! The scheduler never interprets code itself. It hands callbacks to an
//! [`Engine`] and offers the engine a [`Host`] for timers, watches and
//! console output while a callback runs.

use crate::config::SysTime;
use crate::device::Device;
use crate::timers::TimerId;
use crate::watch::{WatchId, WatchOptions};
use alloc::string::String;
use alloc::vec::Vec;
use serde_json::Value;

/// Opaque handle to a function owned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionRef(pub u32);

/// Something the scheduler can invoke.
#[derive(Clone, Debug, PartialEq)]
pub enum Callback {
    Single(FunctionRef),
    /// Run in order; stops at the first failure.
    Chain(Vec<Callback>),
    /// Source evaluated in global scope.
    SourceText(String),
}

/// Failure while running script code.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalError {
    Exception(String),
    Interrupted,
    OutOfMemory,
}

impl EvalError {
    pub fn message(&self) -> &str {
        match self {
            Self::Exception(msg) => msg,
            Self::Interrupted => "Interrupted",
            Self::OutOfMemory => "Out of memory",
        }
    }
}

impl core::fmt::Display for EvalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exception(msg) => write!(f, "Uncaught {}", msg),
            other => f.write_str(other.message()),
        }
    }
}

/// Script interpreter driven by the scheduler.
pub trait Engine {
    /// Evaluate source text in global scope.
    fn evaluate(&mut self, host: &mut dyn Host, source: &str) -> Result<Value, EvalError>;

    /// Call a function with `this` and arguments.
    fn call(&mut self, host: &mut dyn Host, function: FunctionRef, this: &Value, args: &[Value]) -> Result<Value, EvalError>;

    /// Deliver `event` to listeners registered on `target`. Returns whether
    /// anything was listening.
    fn emit(&mut self, host: &mut dyn Host, target: &str, event: &str, args: &[Value]) -> bool;

    /// Bytes received on a non-console byte-stream device.
    fn on_stream_data(&mut self, host: &mut dyn Host, device: Device, data: &[u8]);

    /// Events tagged `CUSTOM`.
    fn on_custom_event(&mut self, _host: &mut dyn Host, _payload: &[u8]) {}

    /// Per-pass hook. Returns `true` if it did work.
    fn idle(&mut self, _host: &mut dyn Host) -> bool {
        false
    }

    fn needs_gc(&self) -> bool;

    /// Returns whether anything was freed.
    fn garbage_collect(&mut self) -> bool;
}

/// Scheduler services available to running script code.
pub trait Host {
    /// Current system time.
    fn now(&self) -> SysTime;

    /// One-shot timer `delay` after the start of the current pass.
    fn set_timeout(&mut self, callback: Callback, delay: SysTime, args: Vec<Value>) -> TimerId;

    /// Repeating timer; `interval` is clamped to the configured minimum.
    fn set_interval(&mut self, callback: Callback, interval: SysTime, args: Vec<Value>) -> TimerId;

    /// Change a repeating timer's period, restarting it from now.
    fn change_interval(&mut self, id: TimerId, interval: SysTime) -> bool;

    /// Remove a script timer. Internal timers are not affected.
    fn clear_timer(&mut self, id: TimerId) -> bool;

    fn set_watch(&mut self, options: WatchOptions) -> Option<WatchId>;

    fn clear_watch(&mut self, id: WatchId) -> bool;

    /// Run `callback` later in this pass, after timers.
    fn queue_callback(&mut self, callback: Callback, this: Value, args: Vec<Value>);

    /// Write text to the console.
    fn print(&mut self, text: &str);

    /// Queue raw bytes for `device`.
    fn transmit(&mut self, device: Device, data: &[u8]);

    fn is_interrupted(&self) -> bool;
}

/// Run `callback` to completion. Uncaught errors are printed and do not
/// stop a chain. Returns `false` only if the user interrupted execution.
pub fn execute_callback<E: Engine + ?Sized>(
    engine: &mut E,
    host: &mut dyn Host,
    callback: &Callback,
    this: &Value,
    args: &[Value],
) -> bool {
    let ok = match callback {
        Callback::Single(function) => {
            let result = engine.call(host, *function, this, args);
            report(host, result)
        }
        Callback::Chain(items) => items
            .iter()
            .all(|cb| execute_callback(engine, host, cb, this, args)),
        Callback::SourceText(source) => {
            let result = engine.evaluate(host, source);
            report(host, result)
        }
    };
    ok && !host.is_interrupted()
}

fn report(host: &mut dyn Host, result: Result<Value, EvalError>) -> bool {
    match result {
        Ok(_) => true,
        Err(EvalError::Interrupted) => false,
        Err(e) => {
            log::warn!("callback failed: {}", e);
            let mut line = alloc::format!("{}", e);
            line.push('\n');
            host.print(&line);
            true
        }
    }
}
