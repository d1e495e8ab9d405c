//! Fixed-capacity circular arena shared by the transmit and event queues.
//!
//! The arena only knows about slots and wraparound. Head/tail ownership,
//! framing and masking policy belong to the queue built on top of it.

use core::cell::UnsafeCell;

/// Circular storage of `N` slots. `N` must be a power of 2.
pub struct RingArena<T: Copy, const N: usize> {
    slots: UnsafeCell<[T; N]>,
}

// SAFETY: all access goes through the owning queue, which serializes
// writers with IrqMask and publishes indices with atomics.
unsafe impl<T: Copy + Send, const N: usize> Sync for RingArena<T, N> {}
unsafe impl<T: Copy + Send, const N: usize> Send for RingArena<T, N> {}

impl<T: Copy, const N: usize> RingArena<T, N> {
    /// Index mask for wraparound.
    pub const MASK: usize = N - 1;

    /// Create an arena with every slot set to `fill`.
    pub const fn new(fill: T) -> Self {
        const { assert!(N.is_power_of_two(), "Ring size must be power of 2") };

        Self {
            slots: UnsafeCell::new([fill; N]),
        }
    }

    /// Number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Slot after `idx`.
    #[inline]
    pub const fn next(idx: usize) -> usize {
        (idx + 1) & Self::MASK
    }

    /// Slot before `idx`.
    #[inline]
    pub const fn prev(idx: usize) -> usize {
        (idx + Self::MASK) & Self::MASK
    }

    /// `idx` advanced by `n` slots.
    #[inline]
    pub const fn advance(idx: usize, n: usize) -> usize {
        (idx + n) & Self::MASK
    }

    /// Slots in use between `tail` (inclusive) and `head` (exclusive).
    #[inline]
    pub const fn used(head: usize, tail: usize) -> usize {
        head.wrapping_sub(tail) & Self::MASK
    }

    /// Read a slot.
    ///
    /// # Safety
    ///
    /// The caller must own the slot: either it lies between tail and head
    /// and the caller is the consumer, or an `IrqMask` is held.
    #[inline]
    pub unsafe fn read(&self, idx: usize) -> T {
        (*self.slots.get())[idx & Self::MASK]
    }

    /// Write a slot.
    ///
    /// # Safety
    ///
    /// Same ownership rules as [`read`](Self::read); no other context may
    /// be reading the slot concurrently.
    #[inline]
    pub unsafe fn write(&self, idx: usize, value: T) {
        (*self.slots.get())[idx & Self::MASK] = value;
    }
}
