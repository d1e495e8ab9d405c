//! # RustReplScheduler
//!
//! Interrupt-to-mainloop bridge and cooperative scheduler for an
//! interactive language runtime on a microcontroller.
//!
//! ## Architecture
//!
//! ```text
//!  interrupt context                      main loop
//!  ─────────────────                      ─────────
//!  UART/USB rx ─┐                     ┌─▶ ConsoleProtocol ─▶ Engine (eval, packets)
//!  GPIO edge ───┼─▶ IoBridge.events ──┤─▶ stream consumers
//!               │                     └─▶ watches ─▶ debounce timers
//!  UART tx ◀────┴── IoBridge.tx ◀──────── print / transmit
//! ```
//!
//! - [`IoBridge`] is the only state shared with interrupt handlers. It
//!   lives in a `static`; producers and consumers touch disjoint indices
//!   and briefly mask interrupts for the rest.
//! - [`Runtime`] owns everything else and runs one pass per
//!   [`Runtime::loop_once`].
//! - The script engine and file store are collaborators behind the
//!   [`Engine`] and [`FileStore`] traits.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bridge;
pub mod config;
pub mod console;
pub mod device;
pub mod engine;
pub mod event_queue;
pub mod fault;
pub mod flow;
pub mod hal;
pub mod irq;
pub mod log_globals;
pub mod logging;
pub mod ring;
pub mod scheduler;
pub mod storage;
pub mod timers;
pub mod tx_queue;
pub mod watch;

pub use bridge::IoBridge;
pub use config::{RuntimeConfig, SysTime};
pub use device::{Device, EventFlags, EventTag};
pub use engine::{Callback, Engine, EvalError, FunctionRef, Host};
pub use event_queue::{EventQueue, IoEvent};
pub use fault::{ErrorFlags, ErrorState};
pub use flow::{FlowControl, SerialState};
pub use hal::{Pin, Platform};
pub use scheduler::{PassReport, Runtime};
pub use storage::{FileHandle, FileStore, FileTarget, RamStore, StoreError};
pub use timers::TimerId;
pub use tx_queue::TransmitQueue;
pub use watch::{Edge, WatchId, WatchOptions};
