//! Module: config
//!
//! Purpose: Tunables for the I/O bridge and the scheduler.
//!
//! Architecture:
//! - Queue sizes are compile-time constants (power of 2) so the rings can
//!   live in statics.
//! - Everything the main loop consults at run time lives in [`RuntimeConfig`].
//! - All times are in microseconds of system time ([`SysTime`]).

use crate::device::Device;

/// System time in microseconds.
pub type SysTime = i64;

/// Version banner (set by build.rs, includes git hash).
pub const VERSION: &str = env!("VERSION_STRING");

/// Transmit queue slots.
pub const TX_QUEUE_SIZE: usize = 128;

/// Event arena bytes.
pub const IO_QUEUE_SIZE: usize = 256;

/// Largest payload carried by one event frame.
pub const MAX_EVENT_LEN: usize = 64;

/// Occupancy above which flow-controlled devices are asked to stop.
pub const XOFF_MARK: usize = (IO_QUEUE_SIZE - 1) * 6 / 8;

/// Occupancy below which stopped devices are released.
pub const XON_MARK: usize = (IO_QUEUE_SIZE - 1) * 3 / 8;

/// Milliseconds to system time.
#[inline]
pub const fn ms(millis: i64) -> SysTime {
    millis * 1_000
}

/// Seconds to system time.
#[inline]
pub const fn secs(seconds: i64) -> SysTime {
    seconds * 1_000_000
}

/// Run-time tunables.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Armed when a packet header starts (DLE SOH).
    pub packet_start_timeout: SysTime,
    /// Re-armed on every packet byte after the header started.
    pub packet_byte_timeout: SysTime,
    /// Closes an open file transfer that stopped receiving data.
    pub file_timeout: SysTime,
    /// Largest data packet sent when streaming a file back.
    pub file_chunk: usize,
    /// Idle collection only runs when the next timer is further away.
    pub gc_min_slack: SysTime,
    /// Floor for repeating timer intervals.
    pub min_interval: SysTime,
    /// Line printed on ENQ.
    pub banner: &'static str,
    /// Console echo at start-up.
    pub echo: bool,
    /// Where drained log lines go; `None` keeps them in the ring.
    pub log_device: Option<Device>,
    /// Device the console starts on.
    pub console_device: Device,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            packet_start_timeout: secs(5),
            packet_byte_timeout: secs(1),
            file_timeout: secs(10),
            file_chunk: 1024,
            gc_min_slack: ms(10),
            min_interval: ms(1),
            banner: VERSION,
            echo: true,
            log_device: None,
            console_device: Device::USB,
        }
    }
}
