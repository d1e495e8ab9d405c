//! Sticky error flags.
//!
//! Interrupt handlers never propagate errors. They OR a bit into a
//! process-wide word, and the main loop reports new bits once.

use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};

bitflags! {
    /// Error conditions accumulated for later reporting.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ErrorFlags: u32 {
        /// Receive/event queue was full, an event was dropped.
        const RX_FIFO_FULL = 1 << 0;
        /// Transmit queue was full in interrupt context, a byte was dropped.
        const BUFFER_FULL = 1 << 1;
        /// A recurring callback was aborted and deregistered.
        const CALLBACK = 1 << 2;
        /// Allocator is running low.
        const LOW_MEMORY = 1 << 3;
        /// An allocation failed.
        const MEMORY = 1 << 4;
        /// Hardware UART receive overrun.
        const UART_OVERFLOW = 1 << 5;
    }
}

impl ErrorFlags {
    /// Short identifier for each flag, as reported on the console.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        self.iter_names().map(|(name, _)| name)
    }
}

/// Process-wide error state.
///
/// ```ignore
/// static ERRORS: ErrorState = ErrorState::new();
///
/// // In an interrupt handler:
/// ERRORS.raise(ErrorFlags::RX_FIFO_FULL);
///
/// // In the main loop:
/// let new = ERRORS.take_new();
/// if !new.is_empty() { report(new); }
/// ```
pub struct ErrorState {
    /// Every flag raised since the last clear.
    flags: AtomicU32,

    /// Flags already handed out by `take_new`.
    reported: AtomicU32,

    /// Total raise operations since boot (never cleared).
    count: AtomicU32,
}

impl ErrorState {
    pub const fn new() -> Self {
        Self {
            flags: AtomicU32::new(0),
            reported: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Raise flags. Safe from any context.
    #[inline]
    pub fn raise(&self, flags: ErrorFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn flags(&self) -> ErrorFlags {
        ErrorFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    pub fn contains(&self, flags: ErrorFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Flags raised since the previous call. Each flag is returned once
    /// until [`clear`](Self::clear).
    pub fn take_new(&self) -> ErrorFlags {
        let current = self.flags.load(Ordering::Acquire);
        let before = self.reported.fetch_or(current, Ordering::AcqRel);
        ErrorFlags::from_bits_truncate(current & !before)
    }

    /// Get total raise count since boot.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Forget all flags (soft init). The counter is preserved.
    #[inline]
    pub fn clear(&self) {
        self.flags.store(0, Ordering::Release);
        self.reported.store(0, Ordering::Release);
    }

    #[inline]
    pub fn snapshot(&self) -> ErrorSnapshot {
        ErrorSnapshot {
            flags: self.flags(),
            count: self.count(),
        }
    }
}

impl Default for ErrorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of error state at a point in time.
#[derive(Clone, Copy, Debug)]
pub struct ErrorSnapshot {
    pub flags: ErrorFlags,
    pub count: u32,
}
