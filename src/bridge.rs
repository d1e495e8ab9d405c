//! Interrupt-to-mainloop bridge.
//!
//! Bundles everything shared between interrupt handlers and the main loop:
//! the transmit queue, the event queue, flow-control state, sticky error
//! flags and the console/Ctrl-C latches. Lives in a `static`; every method
//! takes `&self`.
//!
//! ```text
//!  UART/USB IRQ ──push_chars──▶ EventQueue ──pop──▶ scheduler
//!  GPIO IRQ ─push_pin_event──▶     │
//!                                  └─ occupancy ─▶ FlowControl ─▶ XON/XOFF, CTS
//!  scheduler ──transmit──▶ TransmitQueue ──next_char_to_transmit──▶ UART IRQ
//! ```

use crate::config::{SysTime, IO_QUEUE_SIZE, MAX_EVENT_LEN, TX_QUEUE_SIZE, XOFF_MARK};
use crate::device::{Device, EventFlags, EventTag};
use crate::event_queue::EventQueue;
use crate::fault::{ErrorFlags, ErrorState};
use crate::flow::FlowControl;
use crate::hal::Platform;
use crate::tx_queue::TransmitQueue;
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Ctrl-C.
pub const CTRL_C: u8 = 3;

/// Interrupt-context byte filter. Returns `true` when the byte was
/// consumed and must not be queued.
pub type CharHook = fn(Device, u8) -> bool;

const HOOK_SLOTS: usize = Device::SERIAL6.raw() as usize + 1;

pub struct IoBridge {
    pub tx: TransmitQueue<TX_QUEUE_SIZE>,
    pub events: EventQueue<IO_QUEUE_SIZE>,
    pub flow: FlowControl,
    pub errors: ErrorState,
    console: AtomicU8,
    ctrl_c: AtomicBool,
    packet_transfer: AtomicBool,
    hooks: critical_section::Mutex<Cell<[Option<CharHook>; HOOK_SLOTS]>>,
}

impl IoBridge {
    pub const fn new() -> Self {
        Self {
            tx: TransmitQueue::new(),
            events: EventQueue::new(),
            flow: FlowControl::new(),
            errors: ErrorState::new(),
            console: AtomicU8::new(Device::LIMBO.raw()),
            ctrl_c: AtomicBool::new(false),
            packet_transfer: AtomicBool::new(false),
            hooks: critical_section::Mutex::new(Cell::new([None; HOOK_SLOTS])),
        }
    }

    // ── console & interrupt latches ──────────────────────────────────────

    #[inline]
    pub fn console_device(&self) -> Device {
        Device::from_raw(self.console.load(Ordering::Acquire))
    }

    /// Switch the console, carrying pending console output along.
    pub fn set_console_device<P: Platform + ?Sized>(&self, platform: &P, device: Device) {
        let old = self.console_device();
        if old == device {
            return;
        }
        self.console.store(device.raw(), Ordering::Release);
        self.move_device(platform, old, device);
        log::debug!("console moved from {} to {}", old, device);
    }

    /// Set while a binary packet is being received; Ctrl-C is not latched.
    pub fn set_packet_transfer(&self, active: bool) {
        self.packet_transfer.store(active, Ordering::Release);
    }

    #[inline]
    pub fn in_packet_transfer(&self) -> bool {
        self.packet_transfer.load(Ordering::Acquire)
    }

    /// Latch an interrupt request for running code.
    pub fn request_interrupt(&self) {
        if !self.in_packet_transfer() {
            self.ctrl_c.store(true, Ordering::Release);
        }
    }

    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.ctrl_c.load(Ordering::Acquire)
    }

    pub fn clear_interrupt(&self) {
        self.ctrl_c.store(false, Ordering::Release);
    }

    /// Install or remove the raw byte hook for a byte-stream device.
    pub fn set_char_hook(&self, device: Device, hook: Option<CharHook>) {
        let slot = device.raw() as usize;
        if slot >= HOOK_SLOTS {
            return;
        }
        critical_section::with(|cs| {
            let cell = self.hooks.borrow(cs);
            let mut hooks = cell.get();
            hooks[slot] = hook;
            cell.set(hooks);
        });
    }

    fn char_hook(&self, device: Device) -> Option<CharHook> {
        let slot = device.raw() as usize;
        if slot >= HOOK_SLOTS {
            return None;
        }
        critical_section::with(|cs| self.hooks.borrow(cs).get()[slot])
    }

    // ── input (interrupt producers) ──────────────────────────────────────

    /// Queue one frame. Raises `RX_FIFO_FULL` and drops it when full.
    pub fn push_event(&self, tag: EventTag, payload: &[u8]) -> bool {
        let ok = self.events.push_event(tag, payload);
        if !ok {
            self.errors.raise(ErrorFlags::RX_FIFO_FULL);
        }
        ok
    }

    /// Queue received bytes for a byte-stream device.
    ///
    /// Ctrl-C on the console latches an interrupt; bytes claimed by the
    /// device's hook are not queued. Crossing the high-water mark asks the
    /// device's peer to stop sending.
    pub fn push_chars<P: Platform + ?Sized>(&self, platform: &P, device: Device, data: &[u8]) -> bool {
        let is_console = device == self.console_device();
        let hook = self.char_hook(device);

        let mut ok = true;
        for chunk in data.chunks(MAX_EVENT_LEN) {
            let mut kept = [0u8; MAX_EVENT_LEN];
            let mut n = 0;
            for &b in chunk {
                if is_console && b == CTRL_C {
                    self.request_interrupt();
                }
                if hook.is_some_and(|h| h(device, b)) {
                    continue;
                }
                kept[n] = b;
                n += 1;
            }
            if n > 0 && !self.events.push_chars(device, &kept[..n]) {
                self.errors.raise(ErrorFlags::RX_FIFO_FULL);
                ok = false;
            }
        }

        if device.has_flow_state() && self.events.events_used() > XOFF_MARK {
            self.flow.set_flow_control(platform, device, false);
        }
        ok
    }

    pub fn push_char<P: Platform + ?Sized>(&self, platform: &P, device: Device, byte: u8) -> bool {
        self.push_chars(platform, device, &[byte])
    }

    /// Queue a pin edge stamped with the low 32 bits of `time`.
    pub fn push_pin_event(&self, channel: Device, time: SysTime, high: bool, data_high: bool) -> bool {
        if !channel.is_exti() {
            return false;
        }
        let mut flags = EventFlags::empty();
        flags.set(EventFlags::PIN_HIGH, high);
        flags.set(EventFlags::DATA_PIN_HIGH, data_high);
        self.push_event(EventTag::new(channel, flags), &(time as u32).to_le_bytes())
    }

    /// Queue a UART framing/parity report for `serial`.
    pub fn push_serial_status(&self, serial: Device, framing: bool, parity: bool) -> bool {
        if serial < Device::SERIAL1 || serial > Device::SERIAL6 || !self.flow.error_handling(serial) {
            return false;
        }
        let status = Device::from_raw(Device::SERIAL1_STATUS.raw() + (serial.raw() - Device::SERIAL1.raw()));
        let mut flags = EventFlags::empty();
        flags.set(EventFlags::FRAMING_ERROR, framing);
        flags.set(EventFlags::PARITY_ERROR, parity);
        self.push_event(EventTag::new(status, flags), &[])
    }

    // ── output ───────────────────────────────────────────────────────────

    /// Queue a byte for `device`.
    ///
    /// When the queue is full: in interrupt context the byte is dropped and
    /// `BUFFER_FULL` raised; otherwise this spins on `busy_idle` until the
    /// drivers make room.
    pub fn transmit<P: Platform + ?Sized>(&self, platform: &P, device: Device, byte: u8) {
        if device == Device::NONE {
            return;
        }
        if let Some(partner) = device.loopback_partner() {
            self.push_char(platform, partner, byte);
            return;
        }
        if !platform.is_connected(device) {
            self.tx.clear_device(device);
            return;
        }

        let mut device = device;
        if !self.tx.try_push(device, byte) {
            if platform.is_in_interrupt() {
                self.errors.raise(ErrorFlags::BUFFER_FULL);
                return;
            }
            let was_limbo = device == Device::LIMBO && self.console_device() == Device::LIMBO;
            loop {
                platform.busy_idle();
                if !platform.is_connected(device) {
                    self.tx.clear_device(device);
                    return;
                }
                // Console left limbo while we waited: follow it.
                if was_limbo && self.console_device() != Device::LIMBO {
                    device = self.console_device();
                }
                if self.tx.try_push(device, byte) {
                    break;
                }
            }
        }
        platform.usart_kick(device);
    }

    pub fn transmit_bytes<P: Platform + ?Sized>(&self, platform: &P, device: Device, data: &[u8]) {
        for &b in data {
            self.transmit(platform, device, b);
        }
    }

    pub fn transmit_str<P: Platform + ?Sized>(&self, platform: &P, device: Device, text: &str) {
        self.transmit_bytes(platform, device, text.as_bytes());
    }

    /// Driver poll: pending XOFF/XON first, then the oldest data byte.
    pub fn next_char_to_transmit(&self, device: Device) -> Option<u8> {
        self.flow
            .take_control_char(device)
            .or_else(|| self.tx.pop_for(device))
    }

    /// Device owning the oldest queued byte.
    pub fn device_to_transmit(&self) -> Option<Device> {
        self.tx.device_at_tail()
    }

    #[inline]
    pub fn has_transmit_data(&self) -> bool {
        self.tx.has_pending()
    }

    /// Spin until every queued byte has been sent.
    pub fn flush_all<P: Platform + ?Sized>(&self, platform: &P) {
        while self.tx.has_pending() {
            platform.busy_idle();
        }
    }

    /// Spin until `device` has nothing queued. Hangs if its driver stalls.
    pub fn flush_device<P: Platform + ?Sized>(&self, platform: &P, device: Device) {
        while self.tx.has_pending_for(device) {
            platform.busy_idle();
        }
    }

    /// Discard pending output for `device`.
    pub fn clear_device(&self, device: Device) {
        let dropped = self.tx.clear_device(device);
        if dropped > 0 {
            log::debug!("dropped {} bytes queued for {}", dropped, device);
        }
    }

    /// Hand pending output from one device to another. Output moved to a
    /// loopback comes back in as input on its partner.
    pub fn move_device<P: Platform + ?Sized>(&self, platform: &P, from: Device, to: Device) {
        match to.loopback_partner() {
            Some(partner) => {
                while let Some(b) = self.tx.pop_for(from) {
                    self.push_char(platform, partner, b);
                }
            }
            None => {
                self.tx.retag(from, to);
                if self.tx.has_pending_for(to) {
                    platform.usart_kick(to);
                }
            }
        }
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Boot-time state.
    pub fn init(&self) {
        self.flow.init();
        self.events.clear();
        self.ctrl_c.store(false, Ordering::Release);
        self.packet_transfer.store(false, Ordering::Release);
    }

    /// Forget per-device configuration except for the console's device.
    pub fn reset(&self) {
        self.flow.reset(self.console_device());
        critical_section::with(|cs| self.hooks.borrow(cs).set([None; HOOK_SLOTS]));
    }
}

impl Default for IoBridge {
    fn default() -> Self {
        Self::new()
    }
}
