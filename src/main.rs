//! RustReplScheduler firmware entry point.
//!
//! 1. Link ESP-IDF patches and install the ring logger
//! 2. Bring up UARTs and the GPIO ISR service
//! 3. Run the scheduler loop forever on the main task
//!
//! The bundled engine only understands literal values; a real interpreter
//! plugs in through the same `Engine` trait.

use esp_idf_svc::sys as esp_idf_sys;

use rust_repl_scheduler::{
    console::{parse_liberal, EchoEditor},
    hal::espidf::EspPlatform,
    logging, storage::RamStore, Device, Engine, EvalError, FunctionRef, Host, IoBridge, Runtime,
    RuntimeConfig,
};
use serde_json::Value;

/// Everything shared with interrupt handlers.
static BRIDGE: IoBridge = IoBridge::new();

fn log_clock() -> i64 {
    // SAFETY: reads the monotonic µs counter.
    unsafe { esp_idf_sys::esp_timer_get_time() }
}

/// Evaluates literal values and echoes stream data to the console.
#[derive(Default)]
struct LiteralEngine;

impl Engine for LiteralEngine {
    fn evaluate(&mut self, _host: &mut dyn Host, source: &str) -> Result<Value, EvalError> {
        parse_liberal(source).ok_or_else(|| EvalError::Exception(format!("SyntaxError: {}", source)))
    }

    fn call(&mut self, _host: &mut dyn Host, function: FunctionRef, _this: &Value, _args: &[Value]) -> Result<Value, EvalError> {
        Err(EvalError::Exception(format!("no function {}", function.0)))
    }

    fn emit(&mut self, _host: &mut dyn Host, target: &str, event: &str, _args: &[Value]) -> bool {
        log::debug!("{}.on('{}') has no listeners", target, event);
        false
    }

    fn on_stream_data(&mut self, host: &mut dyn Host, device: Device, data: &[u8]) {
        log::info!("{}: {} bytes", device, data.len());
        host.transmit(Device::USB, data);
    }

    fn needs_gc(&self) -> bool {
        false
    }

    fn garbage_collect(&mut self) -> bool {
        false
    }
}

fn main() {
    esp_idf_sys::link_patches();

    // Fails only if a logger is already installed
    let _ = logging::init(log_clock, log::LevelFilter::Info);

    let platform = match EspPlatform::new(&BRIDGE) {
        Ok(platform) => platform,
        Err(e) => {
            log::error!("platform init failed: {}", e);
            return;
        }
    };

    let config = RuntimeConfig {
        log_device: Some(Device::SERIAL1),
        ..RuntimeConfig::default()
    };
    let mut runtime = Runtime::new(&BRIDGE, &platform, LiteralEngine, RamStore::default(), config);
    runtime.set_editor(Box::new(EchoEditor));

    loop {
        runtime.loop_once();
    }
}
