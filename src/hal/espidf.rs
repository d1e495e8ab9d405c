//! ESP-IDF platform.
//!
//! UART0 carries the console (reported as `USB`), UART1/UART2 map to
//! `SERIAL1`/`SERIAL2`. GPIO edges arrive through the shared ISR service
//! and land in the event queue on channel `pin & 15`.

use super::{Pin, Platform};
use crate::bridge::IoBridge;
use crate::config::SysTime;
use crate::device::Device;
use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use esp_idf_svc::sys::{self, esp, EspError};

const UART_RX_BUFFER: i32 = 1024;
const UART_PORTS: [(Device, sys::uart_port_t); 3] = [
    (Device::USB, 0),
    (Device::SERIAL1, 1),
    (Device::SERIAL2, 2),
];

/// Bridge the GPIO ISR pushes into. Set once by [`EspPlatform::new`].
static ISR_BRIDGE: AtomicPtr<IoBridge> = AtomicPtr::new(ptr::null_mut());

pub struct EspPlatform {
    bridge: &'static IoBridge,
}

impl EspPlatform {
    /// Install UART drivers and the GPIO ISR service.
    pub fn new(bridge: &'static IoBridge) -> Result<Self, EspError> {
        for &(_, port) in &UART_PORTS {
            // SAFETY: plain driver install; no queue handle requested.
            esp!(unsafe { sys::uart_driver_install(port, UART_RX_BUFFER, 0, 0, ptr::null_mut(), 0) })?;
        }
        // SAFETY: installs the per-pin ISR dispatcher once.
        esp!(unsafe { sys::gpio_install_isr_service(0) })?;
        ISR_BRIDGE.store(bridge as *const IoBridge as *mut IoBridge, Ordering::Release);
        Ok(Self { bridge })
    }

    fn port_for(device: Device) -> Option<sys::uart_port_t> {
        UART_PORTS.iter().find(|(d, _)| *d == device).map(|&(_, p)| p)
    }
}

unsafe extern "C" fn pin_isr(arg: *mut c_void) {
    let pin = arg as usize as i32;
    let bridge = ISR_BRIDGE.load(Ordering::Acquire);
    if bridge.is_null() {
        return;
    }
    // SAFETY: set from a &'static IoBridge in EspPlatform::new.
    let bridge = unsafe { &*bridge };
    // SAFETY: ISR-safe getters.
    let (time, high) = unsafe { (sys::esp_timer_get_time(), sys::gpio_get_level(pin) != 0) };
    if let Some(channel) = Device::exti((pin & 15) as u8) {
        bridge.push_pin_event(channel, time, high, false);
    }
}

impl Platform for EspPlatform {
    fn system_time(&self) -> SysTime {
        // SAFETY: reads the monotonic µs counter.
        unsafe { sys::esp_timer_get_time() }
    }

    fn sleep(&self, max: SysTime) {
        let tick_us = (1_000_000 / sys::configTICK_RATE_HZ) as SysTime;
        let ticks = (max / tick_us).clamp(1, u32::MAX as SysTime) as u32;
        // SAFETY: yields the calling task.
        unsafe { sys::vTaskDelay(ticks) };
    }

    fn busy_idle(&self) {
        for &(device, _) in &UART_PORTS {
            self.usart_kick(device);
        }
    }

    fn idle(&self) {
        let mut buf = [0u8; 64];
        for &(device, port) in &UART_PORTS {
            // SAFETY: buf outlives the call; zero timeout.
            let n = unsafe { sys::uart_read_bytes(port, buf.as_mut_ptr() as *mut c_void, buf.len() as u32, 0) };
            if n > 0 {
                self.bridge.push_chars(self, device, &buf[..n as usize]);
            }
        }
    }

    fn usart_kick(&self, device: Device) {
        let Some(port) = Self::port_for(device) else {
            return;
        };
        let mut buf = [0u8; 64];
        loop {
            let mut n = 0;
            while n < buf.len() {
                match self.bridge.next_char_to_transmit(device) {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            if n == 0 {
                break;
            }
            // SAFETY: buf holds n initialised bytes.
            let written = unsafe { sys::uart_write_bytes(port, buf.as_ptr() as *const c_void, n) };
            if written < 0 {
                log::warn!("uart{} write failed", port);
                break;
            }
        }
    }

    fn pin_set_value(&self, pin: Pin, high: bool) {
        // SAFETY: pin number range is checked by the driver.
        if let Err(e) = esp!(unsafe { sys::gpio_set_level(pin as i32, high as u32) }) {
            log::warn!("gpio{} set: {}", pin, e);
        }
    }

    fn pin_set_output(&self, pin: Pin) {
        // SAFETY: see pin_set_value.
        if let Err(e) = esp!(unsafe { sys::gpio_set_direction(pin as i32, sys::gpio_mode_t_GPIO_MODE_OUTPUT) }) {
            log::warn!("gpio{} direction: {}", pin, e);
        }
    }

    fn pin_value(&self, pin: Pin) -> bool {
        // SAFETY: read-only register access.
        unsafe { sys::gpio_get_level(pin as i32) != 0 }
    }

    fn pin_watch(&self, pin: Pin, enable: bool) -> Option<Device> {
        let channel = Device::exti(pin & 15)?;
        let gpio = pin as i32;
        let result = if enable {
            // SAFETY: the handler arg is the pin number, not a pointer.
            esp!(unsafe { sys::gpio_set_intr_type(gpio, sys::gpio_int_type_t_GPIO_INTR_ANYEDGE) })
                .and_then(|_| esp!(unsafe { sys::gpio_isr_handler_add(gpio, Some(pin_isr), pin as usize as *mut c_void) }))
                .and_then(|_| esp!(unsafe { sys::gpio_intr_enable(gpio) }))
        } else {
            // SAFETY: removing an absent handler is reported, not UB.
            esp!(unsafe { sys::gpio_isr_handler_remove(gpio) })
        };
        match result {
            Ok(()) => Some(channel),
            Err(e) => {
                log::warn!("gpio{} watch: {}", pin, e);
                None
            }
        }
    }

    fn is_in_interrupt(&self) -> bool {
        // SAFETY: reads the ISR nesting flag.
        unsafe { sys::xPortInIsrContext() != 0 }
    }
}
