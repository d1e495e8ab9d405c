//! Shared fakes for integration tests.

#![allow(dead_code)]

use rust_repl_scheduler::{
    Device, Engine, EvalError, FileHandle, FileStore, FileTarget, FunctionRef, Host, IoBridge, Pin, Platform,
    Runtime, RuntimeConfig, StoreError, SysTime,
};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

/// Scriptable platform with a manual clock.
pub struct FakePlatform<'b> {
    pub clock: Cell<SysTime>,
    pub kicks: RefCell<Vec<Device>>,
    pub pin_writes: RefCell<Vec<(Pin, bool)>>,
    pub outputs: RefCell<Vec<Pin>>,
    pub levels: RefCell<HashMap<Pin, bool>>,
    pub watched: RefCell<Vec<Pin>>,
    pub sleeps: RefCell<Vec<SysTime>>,
    pub in_irq: Cell<bool>,
    pub disconnected: RefCell<Vec<Device>>,
    /// Bytes pulled off the tx queue by `busy_idle`.
    pub sent: RefCell<Vec<(Device, u8)>>,
    drain: Option<&'b IoBridge>,
    busy_spins: Cell<usize>,
}

impl<'b> FakePlatform<'b> {
    pub fn new() -> Self {
        Self {
            clock: Cell::new(0),
            kicks: RefCell::new(Vec::new()),
            pin_writes: RefCell::new(Vec::new()),
            outputs: RefCell::new(Vec::new()),
            levels: RefCell::new(HashMap::new()),
            watched: RefCell::new(Vec::new()),
            sleeps: RefCell::new(Vec::new()),
            in_irq: Cell::new(false),
            disconnected: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            drain: None,
            busy_spins: Cell::new(0),
        }
    }

    /// Platform whose `busy_idle` empties `bridge`'s transmit queue.
    pub fn draining(bridge: &'b IoBridge) -> Self {
        Self {
            drain: Some(bridge),
            ..Self::new()
        }
    }

    pub fn set_time(&self, t: SysTime) {
        self.clock.set(t);
    }

    pub fn advance(&self, dt: SysTime) {
        self.clock.set(self.clock.get() + dt);
    }

    pub fn set_level(&self, pin: Pin, high: bool) {
        self.levels.borrow_mut().insert(pin, high);
    }

    pub fn busy_spins(&self) -> usize {
        self.busy_spins.get()
    }
}

impl Platform for FakePlatform<'_> {
    fn system_time(&self) -> SysTime {
        self.clock.get()
    }

    fn sleep(&self, max: SysTime) {
        self.sleeps.borrow_mut().push(max);
    }

    fn busy_idle(&self) {
        self.busy_spins.set(self.busy_spins.get() + 1);
        if let Some(bridge) = self.drain {
            while let Some(device) = bridge.device_to_transmit() {
                match bridge.next_char_to_transmit(device) {
                    Some(b) => self.sent.borrow_mut().push((device, b)),
                    None => break,
                }
            }
        }
    }

    fn usart_kick(&self, device: Device) {
        self.kicks.borrow_mut().push(device);
    }

    fn pin_set_value(&self, pin: Pin, high: bool) {
        self.pin_writes.borrow_mut().push((pin, high));
        self.levels.borrow_mut().insert(pin, high);
    }

    fn pin_set_output(&self, pin: Pin) {
        self.outputs.borrow_mut().push(pin);
    }

    fn pin_value(&self, pin: Pin) -> bool {
        self.levels.borrow().get(&pin).copied().unwrap_or(false)
    }

    fn pin_watch(&self, pin: Pin, enable: bool) -> Option<Device> {
        let mut watched = self.watched.borrow_mut();
        if enable {
            if !watched.contains(&pin) {
                watched.push(pin);
            }
        } else {
            watched.retain(|&p| p != pin);
        }
        Device::exti(pin & 15)
    }

    fn is_in_interrupt(&self) -> bool {
        self.in_irq.get()
    }

    fn is_connected(&self, device: Device) -> bool {
        !self.disconnected.borrow().contains(&device)
    }
}

/// Everything queued for `device`, in order.
pub fn drain_output(bridge: &IoBridge, device: Device) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(b) = bridge.next_char_to_transmit(device) {
        out.push(b);
    }
    out
}

/// Hook run when the engine calls a function.
pub type CallHook = Box<dyn FnMut(&mut dyn Host, FunctionRef, &[Value]) -> Result<Value, EvalError>>;

/// Engine that records everything and returns scripted results.
#[derive(Default)]
pub struct FakeEngine {
    pub results: HashMap<String, Result<Value, EvalError>>,
    pub evals: Vec<String>,
    pub calls: Vec<(FunctionRef, Vec<Value>)>,
    pub call_times: Vec<SysTime>,
    pub interrupt_calls: Vec<FunctionRef>,
    pub emitted: Vec<(String, String, Vec<Value>)>,
    pub listening: bool,
    pub stream: Vec<(Device, Vec<u8>)>,
    pub custom: Vec<Vec<u8>>,
    pub gc_needed: bool,
    pub gc_runs: usize,
    pub idle_busy: bool,
    pub on_call: Option<CallHook>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, source: &str, result: Result<Value, EvalError>) -> Self {
        self.results.insert(source.to_string(), result);
        self
    }

    pub fn with_hook(
        mut self,
        hook: impl FnMut(&mut dyn Host, FunctionRef, &[Value]) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    pub fn calls_of(&self, f: FunctionRef) -> usize {
        self.calls.iter().filter(|(g, _)| *g == f).count()
    }
}

impl Engine for FakeEngine {
    fn evaluate(&mut self, _host: &mut dyn Host, source: &str) -> Result<Value, EvalError> {
        self.evals.push(source.to_string());
        self.results
            .get(source)
            .cloned()
            .unwrap_or_else(|| Ok(Value::String(source.to_string())))
    }

    fn call(&mut self, host: &mut dyn Host, function: FunctionRef, _this: &Value, args: &[Value]) -> Result<Value, EvalError> {
        self.calls.push((function, args.to_vec()));
        self.call_times.push(host.now());
        if self.interrupt_calls.contains(&function) {
            return Err(EvalError::Interrupted);
        }
        match self.on_call.as_mut() {
            Some(hook) => hook(host, function, args),
            None => Ok(Value::Null),
        }
    }

    fn emit(&mut self, _host: &mut dyn Host, target: &str, event: &str, args: &[Value]) -> bool {
        self.emitted.push((target.to_string(), event.to_string(), args.to_vec()));
        self.listening
    }

    fn on_stream_data(&mut self, _host: &mut dyn Host, device: Device, data: &[u8]) {
        self.stream.push((device, data.to_vec()));
    }

    fn on_custom_event(&mut self, _host: &mut dyn Host, payload: &[u8]) {
        self.custom.push(payload.to_vec());
    }

    fn idle(&mut self, _host: &mut dyn Host) -> bool {
        self.idle_busy
    }

    fn needs_gc(&self) -> bool {
        self.gc_needed
    }

    fn garbage_collect(&mut self) -> bool {
        self.gc_runs += 1;
        true
    }
}

/// In-memory file store.
#[derive(Default)]
pub struct MemStore {
    pub files: BTreeMap<String, Vec<u8>>,
    pub open: BTreeMap<u32, (String, FileTarget)>,
    pub closed: Vec<String>,
    next: u32,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: &str, data: &[u8]) -> Self {
        self.files.insert(name.to_string(), data.to_vec());
        self
    }
}

impl FileStore for MemStore {
    fn open_write(&mut self, name: &str, size: usize, target: FileTarget) -> Result<FileHandle, StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }
        self.files.insert(name.to_string(), vec![0; size]);
        self.next += 1;
        self.open.insert(self.next, (name.to_string(), target));
        Ok(FileHandle(self.next))
    }

    fn write(&mut self, handle: FileHandle, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        let (name, _) = self.open.get(&handle.0).ok_or(StoreError::Io)?;
        let file = self.files.get_mut(name).ok_or(StoreError::NotFound)?;
        let end = offset.checked_add(data.len()).ok_or(StoreError::NoSpace)?;
        let dest = file.get_mut(offset..end).ok_or(StoreError::NoSpace)?;
        dest.copy_from_slice(data);
        Ok(())
    }

    fn close(&mut self, handle: FileHandle) {
        if let Some((name, _)) = self.open.remove(&handle.0) {
            self.closed.push(name);
        }
    }

    fn read_chunk(&mut self, name: &str, _target: FileTarget, offset: usize, buf: &mut [u8]) -> Result<usize, StoreError> {
        let file = self.files.get(name).ok_or(StoreError::NotFound)?;
        let rest = file.get(offset..).unwrap_or(&[]);
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }
}

/// Console output so far: bytes already pulled by `busy_idle`, then
/// whatever is still queued.
pub fn console_bytes(platform: &FakePlatform<'_>, bridge: &IoBridge) -> Vec<u8> {
    let console = bridge.console_device();
    let mut out: Vec<u8> = platform
        .sent
        .borrow_mut()
        .drain(..)
        .filter(|(d, _)| *d == console)
        .map(|(_, b)| b)
        .collect();
    out.extend(drain_output(bridge, console));
    out
}

/// Feed bytes to the console as if they arrived on USB.
pub fn type_console(platform: &FakePlatform<'_>, bridge: &IoBridge, bytes: &[u8]) {
    for chunk in bytes.chunks(32) {
        assert!(bridge.push_chars(platform, Device::USB, chunk), "event queue overflow in test setup");
    }
}

pub type TestRuntime<'a> = Runtime<'a, FakePlatform<'a>, FakeEngine, MemStore>;

/// Runtime on USB with echo on and a fixed banner.
pub fn boot<'a>(bridge: &'a IoBridge, platform: &'a FakePlatform<'a>, engine: FakeEngine, store: MemStore) -> TestRuntime<'a> {
    let config = RuntimeConfig {
        banner: "Test v1",
        ..RuntimeConfig::default()
    };
    Runtime::new(bridge, platform, engine, store, config)
}
