//! Module: scheduler
//!
//! Purpose: The cooperative main loop. Owns the engine, the file store,
//! the console decoder and every timer and watch, and drives them from
//! the events the interrupt side queued on the [`IoBridge`].
//!
//! Architecture:
//! - [`Runtime::loop_once`] is called forever from the top-level loop.
//!   It never recurses into itself; callbacks run to completion.
//! - One pass ([`Runtime::idle`]) drains a bounded batch of events, fires
//!   due timers, runs queued callbacks, then decides between garbage
//!   collection and sleep.
//! - Script code reaches timers and watches through [`Services`], which
//!   implements [`Host`](crate::engine::Host).

mod console_io;
mod idle;
mod services;

pub use idle::PassReport;
pub use services::{QueuedCallback, Services};

use crate::bridge::IoBridge;
use crate::config::RuntimeConfig;
use crate::console::{ConsoleProtocol, FileTransfer, LineEditor, NoEditor};
use crate::engine::{execute_callback, Callback, Engine};
use crate::fault::ErrorFlags;
use crate::hal::Platform;
use crate::log_globals::LOG_STREAM;
use crate::logging::format_log_entry;
use crate::storage::FileStore;
use crate::timers::TimerId;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use serde_json::Value;

pub struct Runtime<'a, P: Platform + ?Sized, E: Engine, S: FileStore> {
    config: RuntimeConfig,
    engine: E,
    store: S,
    editor: Box<dyn LineEditor + 'a>,
    console: ConsoleProtocol,
    transfer: Option<FileTransfer>,
    packet_timer: Option<TimerId>,
    file_timer: Option<TimerId>,
    services: Services<'a, P>,
    /// Consecutive passes that found nothing to do.
    loops_idling: u8,
    /// A callback was aborted since the last error report.
    events_interrupted: bool,
    /// A console line was interrupted since the last error report.
    exec_interrupted: bool,
}

impl<'a, P: Platform + ?Sized, E: Engine, S: FileStore> Runtime<'a, P, E, S> {
    /// Boot the runtime on `bridge`.
    pub fn new(bridge: &'a IoBridge, platform: &'a P, engine: E, store: S, config: RuntimeConfig) -> Self {
        bridge.init();
        bridge.set_console_device(platform, config.console_device);
        let mut runtime = Self {
            console: ConsoleProtocol::new(config.echo),
            services: Services::new(bridge, platform, config.min_interval),
            config,
            engine,
            store,
            editor: Box::new(NoEditor),
            transfer: None,
            packet_timer: None,
            file_timer: None,
            loops_idling: 0,
            events_interrupted: false,
            exec_interrupted: false,
        };
        runtime.init();
        runtime
    }

    pub fn set_editor(&mut self, editor: Box<dyn LineEditor + 'a>) {
        self.editor = editor;
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn console(&self) -> &ConsoleProtocol {
        &self.console
    }

    pub fn services(&self) -> &Services<'a, P> {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services<'a, P> {
        &mut self.services
    }

    pub fn bridge(&self) -> &'a IoBridge {
        self.services.bridge
    }

    /// Open inbound file transfer, if any.
    pub fn transfer(&self) -> Option<&FileTransfer> {
        self.transfer.as_ref()
    }

    fn init(&mut self) {
        let bridge = self.services.bridge;
        let platform = self.services.platform;
        bridge.errors.clear();
        self.console.set_echo(self.config.echo);
        self.services.last_idle_time = platform.system_time();
        self.services.min_interval = self.config.min_interval;
        self.loops_idling = 0;
        for pin in self.services.watches.pins() {
            if platform.pin_watch(pin, true).is_none() {
                log::warn!("pin {} cannot be re-armed", pin);
            }
        }
        self.engine.emit(&mut self.services, "E", "init", &[]);
        log::info!("runtime up, console on {}", bridge.console_device());
    }

    /// Tear down everything that belongs to running code. Watches survive
    /// with their pins disarmed.
    pub fn kill(&mut self) {
        let bridge = self.services.bridge;
        let platform = self.services.platform;
        self.file_end();
        self.packet_exit();
        self.engine.emit(&mut self.services, "E", "kill", &[]);
        self.services.timers.clear();
        self.services.queued.clear();
        self.packet_timer = None;
        self.file_timer = None;
        for watch in self.services.watches.iter_mut() {
            watch.timeout = None;
        }
        for pin in self.services.watches.pins() {
            platform.pin_watch(pin, false);
        }
        bridge.clear_interrupt();
    }

    /// Kill, forget device configuration and start again.
    pub fn soft_reset(&mut self) {
        self.kill();
        self.services.bridge.reset();
        self.init();
    }

    /// One turn of the main loop. Returns whether the pass did any work.
    pub fn loop_once(&mut self) -> bool {
        let bridge = self.services.bridge;
        self.services.platform.idle();
        let report = self.idle();
        self.check_errors();

        if bridge.is_interrupted() && !self.console.in_packet_transfer() {
            bridge.clear_interrupt();
            self.console.clear_line();
        }
        self.drain_logs();
        report.busy
    }

    /// Report interruptions and newly raised error flags once.
    pub fn check_errors(&mut self) {
        if core::mem::take(&mut self.exec_interrupted) {
            self.print("Execution Interrupted\n");
        }
        if core::mem::take(&mut self.events_interrupted) {
            self.print("Execution Interrupted during event processing.\n");
        }
        let new = self.services.bridge.errors.take_new();
        if new.is_empty() {
            return;
        }
        let names: Vec<&str> = new.names().collect();
        log::warn!("new error flags: {:?}", names);
        let mut line = String::from("New interpreter error: ");
        line.push_str(&names.join(","));
        line.push('\n');
        self.print(&line);
        let list = Value::Array(names.into_iter().map(Value::from).collect());
        self.engine.emit(&mut self.services, "E", "errorFlag", &[list]);
    }

    /// Write queued log lines to the log device.
    pub fn drain_logs(&mut self) {
        let Some(device) = self.config.log_device else {
            return;
        };
        let bridge = self.services.bridge;
        let platform = self.services.platform;
        let mut buf = [0u8; 160];
        while let Some(entry) = LOG_STREAM.drain() {
            let n = format_log_entry(&entry, &mut buf);
            bridge.transmit_bytes(platform, device, &buf[..n]);
        }
        let dropped = LOG_STREAM.dropped();
        if dropped > 0 {
            LOG_STREAM.reset_dropped();
            let line = alloc::format!("[LOG] {} messages dropped\n", dropped);
            bridge.transmit_str(platform, device, &line);
        }
    }

    /// Text to the console device.
    pub fn print(&mut self, text: &str) {
        let bridge = self.services.bridge;
        bridge.transmit_str(self.services.platform, bridge.console_device(), text);
    }

    /// Run a callback, remembering aborts for the next error report.
    fn run_callback(&mut self, callback: &Callback, this: &Value, args: &[Value]) -> bool {
        let ok = execute_callback(&mut self.engine, &mut self.services, callback, this, args);
        if !ok {
            self.events_interrupted = true;
        }
        ok
    }

    /// A recurring callback failed and is being dropped.
    fn callback_removed(&mut self, what: &str) {
        log::error!("Ctrl-C while processing {} - removing it", what);
        self.services.bridge.errors.raise(ErrorFlags::CALLBACK);
    }
}
