//! Interrupt-safe logging backend.
//!
//! ```text
//! any context            LogStream             main loop
//! ───────────            ─────────             ─────────
//!
//! log::warn!() ───────▶ [L0][L1][L2] ──────▶ drain_to(console)
//! never blocks            lock-free            formatted lines
//! ```
//!
//! - The `log` facade is the only logging API used in this crate.
//! - [`RingLogger`] formats into a fixed buffer and pushes into a [`LogStream`].
//! - Messages are dropped (and counted) when the ring is full.

use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicU32, Ordering};

/// Maximum message length.
pub const MAX_MSG_LEN: usize = 120;

/// Log buffer size (number of entries).
pub const LOG_BUFFER_SIZE: usize = 256;

/// Log level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// Convert to string for output.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

/// A single log entry.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct LogEntry {
    /// Timestamp in microseconds.
    pub timestamp_us: i64,
    /// Log level.
    pub level: LogLevel,
    /// Message length.
    pub len: u8,
    /// Message bytes (not null-terminated).
    pub msg: [u8; MAX_MSG_LEN],
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            timestamp_us: 0,
            level: LogLevel::Info,
            len: 0,
            msg: [0; MAX_MSG_LEN],
        }
    }
}

/// Lock-free log stream (multiple producers, single consumer).
///
/// - Interrupt handlers and the main loop can push (slots reserved via atomic CAS)
/// - A slot becomes visible to the reader only after its sequence is published
/// - Push never blocks (drops message if full)
/// - The main loop drains at leisure
pub struct LogStream<const N: usize = LOG_BUFFER_SIZE> {
    entries: UnsafeCell<[LogEntry; N]>,
    /// Position + 1 of the entry last written into each slot.
    published: [AtomicU32; N],
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: Multiple producers (each owns the slot it reserved), single consumer
// (main loop) that reads a slot only after its sequence is published.
unsafe impl<const N: usize> Sync for LogStream<N> {}
unsafe impl<const N: usize> Send for LogStream<N> {}

impl<const N: usize> LogStream<N> {
    const MASK: usize = N - 1;

    /// Create a new empty log stream.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Log buffer size must be power of 2");

        Self {
            entries: UnsafeCell::new([LogEntry {
                timestamp_us: 0,
                level: LogLevel::Info,
                len: 0,
                msg: [0; MAX_MSG_LEN],
            }; N]),
            published: [const { AtomicU32::new(0) }; N],
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Push a log entry (never blocks).
    ///
    /// Returns `true` if message was queued, `false` if dropped (ring full).
    #[inline]
    pub fn push(&self, timestamp_us: i64, level: LogLevel, msg: &[u8]) -> bool {
        match self.reserve() {
            Some(pos) => {
                self.fill(pos, timestamp_us, level, msg);
                true
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Claim the next write position, or `None` if the ring is full.
    fn reserve(&self) -> Option<u32> {
        let read = self.read_idx.load(Ordering::Acquire);
        self.write_idx
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |write| {
                (write.wrapping_sub(read) < N as u32).then(|| write.wrapping_add(1))
            })
            .ok()
    }

    /// Write the entry at a reserved position and publish it.
    fn fill(&self, pos: u32, timestamp_us: i64, level: LogLevel, msg: &[u8]) {
        let idx = (pos as usize) & Self::MASK;

        // SAFETY: Each producer reserves a unique position and the reader
        // skips the slot until `published` says it is complete.
        unsafe {
            let entry = &mut (*self.entries.get())[idx];
            entry.timestamp_us = timestamp_us;
            entry.level = level;
            entry.len = msg.len().min(MAX_MSG_LEN) as u8;
            entry.msg[..entry.len as usize].copy_from_slice(&msg[..entry.len as usize]);
        }

        self.published[idx].store(pos.wrapping_add(1), Ordering::Release);
    }

    /// Drain next log entry (main loop only).
    ///
    /// Returns `None` if no entries are available or the oldest one is
    /// still being written.
    #[inline]
    pub fn drain(&self) -> Option<LogEntry> {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        let idx = (read as usize) & Self::MASK;
        if self.published[idx].load(Ordering::Acquire) != read.wrapping_add(1) {
            return None;
        }

        // SAFETY: Single consumer, unique index
        let entry = unsafe { (*self.entries.get())[idx] };

        self.read_idx.store(read.wrapping_add(1), Ordering::Release);
        Some(entry)
    }

    /// Get count of dropped messages.
    #[inline]
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reset dropped counter (e.g., after reporting).
    #[inline]
    pub fn reset_dropped(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Check if there are entries to drain.
    #[inline]
    pub fn has_entries(&self) -> bool {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        read != write
    }

    /// Get number of entries waiting to be drained.
    #[inline]
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }
}

impl<const N: usize> Default for LogStream<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a message into a buffer.
///
/// Returns the number of bytes written.
#[inline]
pub fn format_to_buffer(buf: &mut [u8], args: core::fmt::Arguments<'_>) -> usize {
    use core::fmt::Write;

    struct BufWriter<'a> {
        buf: &'a mut [u8],
        pos: usize,
    }

    impl<'a> Write for BufWriter<'a> {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            let remaining = self.buf.len() - self.pos;
            let to_write = bytes.len().min(remaining);
            self.buf[self.pos..self.pos + to_write].copy_from_slice(&bytes[..to_write]);
            self.pos += to_write;
            Ok(())
        }
    }

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = core::fmt::write(&mut writer, args);
    writer.pos
}

/// Format a drained entry as a console line.
///
/// Format: `[timestamp_us] LEVEL: message\n`
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    format_to_buffer(
        buf,
        format_args!(
            "[{:10}] {}: {}\n",
            entry.timestamp_us,
            entry.level.as_str(),
            core::str::from_utf8(&entry.msg[..entry.len as usize]).unwrap_or("<invalid utf8>")
        ),
    )
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        }
    }
}

/// Clock used to stamp entries, in microseconds.
pub type LogClock = fn() -> i64;

/// `log::Log` implementation that writes into a [`LogStream`].
pub struct RingLogger<const N: usize = LOG_BUFFER_SIZE> {
    stream: &'static LogStream<N>,
    clock: critical_section::Mutex<Cell<Option<LogClock>>>,
}

impl<const N: usize> RingLogger<N> {
    pub const fn new(stream: &'static LogStream<N>) -> Self {
        Self {
            stream,
            clock: critical_section::Mutex::new(Cell::new(None)),
        }
    }

    /// Install the timestamp source.
    pub fn set_clock(&self, clock: LogClock) {
        critical_section::with(|cs| self.clock.borrow(cs).set(Some(clock)));
    }

    pub fn stream(&self) -> &'static LogStream<N> {
        self.stream
    }

    fn now(&self) -> i64 {
        critical_section::with(|cs| self.clock.borrow(cs).get())
            .map(|clock| clock())
            .unwrap_or(0)
    }
}

impl<const N: usize> log::Log for RingLogger<N> {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut buf = [0u8; MAX_MSG_LEN];
        let len = format_to_buffer(&mut buf, *record.args());
        self.stream.push(self.now(), record.level().into(), &buf[..len]);
    }

    fn flush(&self) {}
}

/// Install the global ring logger.
///
/// Fails if another logger was installed first.
pub fn init(clock: LogClock, level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    crate::log_globals::LOGGER.set_clock(clock);
    log::set_logger(&crate::log_globals::LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
