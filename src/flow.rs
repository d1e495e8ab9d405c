//! Per-device flow control.
//!
//! Software XON/XOFF and an optional hardware CTS pin, driven by event
//! queue occupancy. The control characters themselves are injected by the
//! transmit poll ([`FlowControl::take_control_char`]) ahead of any data.

use crate::device::Device;
use crate::hal::{Pin, Platform};
use crate::irq::IrqMask;
use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// XON control character (DC1).
pub const XON: u8 = 17;
/// XOFF control character (DC3).
pub const XOFF: u8 = 19;

const NO_PIN: u8 = 0xFF;

bitflags! {
    /// Flow-control state of one serial-class device.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SerialState: u8 {
        /// XOFF must be sent before the next data byte.
        const XOFF_PENDING = 1 << 0;
        /// XON must be sent before the next data byte.
        const XON_PENDING = 1 << 1;
        /// Peer has been told to stop.
        const XOFF_SENT = 1 << 2;
        /// Software XON/XOFF is active for this device.
        const FLOW_CONTROL = 1 << 3;
        /// Framing/parity errors are reported as status events.
        const ERROR_HANDLING = 1 << 4;
    }
}

/// Flow-control state for every device in `USB..=SERIAL6`.
pub struct FlowControl {
    states: [AtomicU8; Device::FLOW_DEVICE_COUNT],
    cts_pins: [AtomicU8; Device::FLOW_DEVICE_COUNT],
    /// Some device was asked to stop since the last `all_ready`.
    was_set: AtomicBool,
}

impl FlowControl {
    pub const fn new() -> Self {
        const STATE: AtomicU8 = AtomicU8::new(0);
        const PIN: AtomicU8 = AtomicU8::new(NO_PIN);
        Self {
            states: [STATE; Device::FLOW_DEVICE_COUNT],
            cts_pins: [PIN; Device::FLOW_DEVICE_COUNT],
            was_set: AtomicBool::new(false),
        }
    }

    /// Current state; empty for devices without flow state.
    pub fn state(&self, device: Device) -> SerialState {
        device
            .flow_index()
            .map(|i| SerialState::from_bits_truncate(self.states[i].load(Ordering::Acquire)))
            .unwrap_or(SerialState::empty())
    }

    /// Configured CTS pin.
    pub fn cts_pin(&self, device: Device) -> Option<Pin> {
        let idx = device.flow_index()?;
        match self.cts_pins[idx].load(Ordering::Acquire) {
            NO_PIN => None,
            pin => Some(pin),
        }
    }

    /// Whether any device was asked to stop and not yet released.
    #[inline]
    pub fn was_set(&self) -> bool {
        self.was_set.load(Ordering::Acquire)
    }

    /// Tell the peer on `device` to stop (`false`) or resume (`true`).
    pub fn set_flow_control<P: Platform + ?Sized>(&self, platform: &P, device: Device, want_transmit: bool) {
        let Some(idx) = device.flow_index() else {
            return;
        };
        if !want_transmit {
            self.was_set.store(true, Ordering::Release);
        }
        let state = SerialState::from_bits_truncate(self.states[idx].load(Ordering::Acquire));
        if state.contains(SerialState::FLOW_CONTROL) {
            let request = if want_transmit {
                let sent_unanswered = state.intersection(SerialState::XOFF_SENT | SerialState::XON_PENDING)
                    == SerialState::XOFF_SENT;
                sent_unanswered.then_some(SerialState::XON_PENDING)
            } else {
                let idle = !state.intersects(SerialState::XOFF_SENT | SerialState::XOFF_PENDING);
                idle.then_some(SerialState::XOFF_PENDING)
            };
            if let Some(bit) = request {
                {
                    let _mask = IrqMask::acquire();
                    self.states[idx].fetch_or(bit.bits(), Ordering::AcqRel);
                }
                platform.usart_kick(device);
            }
        }
        if let Some(pin) = self.cts_pin(device) {
            // CTS is active low
            platform.pin_set_value(pin, !want_transmit);
        }
    }

    /// Release every device if any was stopped.
    pub fn all_ready<P: Platform + ?Sized>(&self, platform: &P) {
        if !self.was_set() {
            return;
        }
        for idx in 0..Device::FLOW_DEVICE_COUNT {
            self.set_flow_control(platform, Device::from_flow_index(idx), true);
        }
        self.was_set.store(false, Ordering::Release);
    }

    /// Configure software flow control and the CTS pin. A configured pin
    /// becomes an output driven low (ready).
    pub fn set_enabled<P: Platform + ?Sized>(&self, platform: &P, device: Device, software: bool, cts: Option<Pin>) {
        let Some(idx) = device.flow_index() else {
            return;
        };
        if software {
            self.states[idx].fetch_or(SerialState::FLOW_CONTROL.bits(), Ordering::AcqRel);
        } else {
            self.states[idx].fetch_and(!SerialState::FLOW_CONTROL.bits(), Ordering::AcqRel);
        }
        self.cts_pins[idx].store(NO_PIN, Ordering::Release);
        if let Some(pin) = cts.filter(|&p| p != NO_PIN) {
            platform.pin_set_output(pin);
            platform.pin_set_value(pin, false);
            self.cts_pins[idx].store(pin, Ordering::Release);
        }
    }

    pub fn set_error_handling(&self, device: Device, enabled: bool) {
        let Some(idx) = device.flow_index() else {
            return;
        };
        if enabled {
            self.states[idx].fetch_or(SerialState::ERROR_HANDLING.bits(), Ordering::AcqRel);
        } else {
            self.states[idx].fetch_and(!SerialState::ERROR_HANDLING.bits(), Ordering::AcqRel);
        }
    }

    pub fn error_handling(&self, device: Device) -> bool {
        self.state(device).contains(SerialState::ERROR_HANDLING)
    }

    /// Pending XOFF/XON for `device`, consumed exactly once.
    pub fn take_control_char(&self, device: Device) -> Option<u8> {
        let idx = device.flow_index()?;
        let _mask = IrqMask::acquire();
        let state = SerialState::from_bits_truncate(self.states[idx].load(Ordering::Acquire));
        if state.contains(SerialState::XOFF_PENDING) {
            let next = state.difference(SerialState::XOFF_PENDING) | SerialState::XOFF_SENT;
            self.states[idx].store(next.bits(), Ordering::Release);
            return Some(XOFF);
        }
        if state.contains(SerialState::XON_PENDING) {
            let next = state.difference(SerialState::XON_PENDING | SerialState::XOFF_SENT);
            self.states[idx].store(next.bits(), Ordering::Release);
            return Some(XON);
        }
        None
    }

    /// Boot defaults: software flow control on Bluetooth and SWD console.
    pub fn init(&self) {
        for (idx, state) in self.states.iter().enumerate() {
            let device = Device::from_flow_index(idx);
            let initial = if device == Device::BLUETOOTH || device == Device::SWDCON {
                SerialState::FLOW_CONTROL
            } else {
                SerialState::empty()
            };
            state.store(initial.bits(), Ordering::Release);
        }
        for pin in &self.cts_pins {
            pin.store(NO_PIN, Ordering::Release);
        }
        self.was_set.store(false, Ordering::Release);
    }

    /// Forget per-device configuration, keeping the always-on channels
    /// and whichever device hosts the console.
    pub fn reset(&self, console: Device) {
        for idx in 0..Device::FLOW_DEVICE_COUNT {
            let device = Device::from_flow_index(idx);
            let keep = matches!(device, Device::USB | Device::BLUETOOTH | Device::SWDCON) || device == console;
            if !keep {
                self.states[idx].store(0, Ordering::Release);
                self.cts_pins[idx].store(NO_PIN, Ordering::Release);
            }
        }
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new()
    }
}
