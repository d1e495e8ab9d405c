//! Hardware Abstraction Layer.
//!
//! The bridge and scheduler only see the [`Platform`] trait. Board support
//! implements it; ESP-IDF support lives in [`espidf`].

use crate::config::SysTime;
use crate::device::Device;

#[cfg(target_os = "espidf")]
pub mod espidf;

/// GPIO number.
pub type Pin = u8;

/// Hardware services used from both interrupt and main context.
///
/// All methods take `&self`; implementations use interior mutability.
pub trait Platform {
    /// Monotonic system time in microseconds.
    fn system_time(&self) -> SysTime;

    /// Sleep for at most `max` (or until the next interrupt).
    /// `SysTime::MAX` means no timer is pending.
    fn sleep(&self, max: SysTime);

    /// Called on every spin of a blocking transmit or flush.
    fn busy_idle(&self) {}

    /// Hardware housekeeping once per scheduler loop.
    fn idle(&self) {}

    /// Start (or continue) transmission on `device`.
    fn usart_kick(&self, device: Device);

    fn pin_set_value(&self, pin: Pin, high: bool);

    fn pin_set_output(&self, pin: Pin);

    fn pin_value(&self, pin: Pin) -> bool;

    /// Arm or disarm the edge interrupt for `pin`. Returns the interrupt
    /// channel device when armed.
    fn pin_watch(&self, pin: Pin, enable: bool) -> Option<Device>;

    fn is_in_interrupt(&self) -> bool {
        false
    }

    /// Whether a pluggable device (USB) is attached.
    fn is_connected(&self, _device: Device) -> bool {
        true
    }
}
