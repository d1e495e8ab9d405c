//! Transmit queue.
//!
//! One physical ring holds output for every device. Each item is tagged
//! with its destination; a device driver extracts only its own bytes, in
//! order, while other devices' bytes keep their relative order too.
//!
//! ```text
//!  tail                              head
//!   │                                  │
//!   ▼                                  ▼
//!  [USB a][S1 x][USB b][S1 y][USB c] [    ]
//!
//!  pop_for(S1) → 'x', shifting [USB a] one slot toward the head:
//!
//!         tail
//!          ▼
//!  [    ][USB a][USB b][S1 y][USB c] [    ]
//! ```

use crate::device::Device;
use crate::irq::IrqMask;
use crate::ring::RingArena;
use core::sync::atomic::{AtomicUsize, Ordering};

/// One byte waiting for its device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxItem {
    pub device: Device,
    pub data: u8,
}

impl TxItem {
    const EMPTY: TxItem = TxItem {
        device: Device::NONE,
        data: 0,
    };
}

/// Device-tagged byte FIFO. Holds at most `N - 1` bytes.
pub struct TransmitQueue<const N: usize> {
    items: RingArena<TxItem, N>,
    /// Next free slot (written by producers under IrqMask).
    head: AtomicUsize,
    /// Oldest item (advanced by the extracting driver).
    tail: AtomicUsize,
}

impl<const N: usize> TransmitQueue<N> {
    pub const fn new() -> Self {
        Self {
            items: RingArena::new(TxItem::EMPTY),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Append a byte. Returns `false` when the ring is full.
    pub fn try_push(&self, device: Device, data: u8) -> bool {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Relaxed);
        let next = RingArena::<TxItem, N>::next(head);
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        // SAFETY: slot at head is outside the live window, IrqMask held.
        unsafe { self.items.write(head, TxItem { device, data }) };
        self.head.store(next, Ordering::Release);
        true
    }

    /// Take the oldest byte queued for `device`.
    pub fn pop_for(&self, device: Device) -> Option<u8> {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        let mut idx = tail;
        while idx != head {
            // SAFETY: idx lies in the live window, IrqMask held.
            let item = unsafe { self.items.read(idx) };
            if item.device == device {
                // Close the gap: everything older moves one slot toward head.
                let mut this = idx;
                while this != tail {
                    let last = RingArena::<TxItem, N>::prev(this);
                    // SAFETY: both slots lie in the live window.
                    unsafe { self.items.write(this, self.items.read(last)) };
                    this = last;
                }
                self.tail.store(RingArena::<TxItem, N>::next(tail), Ordering::Release);
                return Some(item.data);
            }
            idx = RingArena::<TxItem, N>::next(idx);
        }
        None
    }

    /// Anything queued at all.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.head.load(Ordering::Acquire) != self.tail.load(Ordering::Acquire)
    }

    /// Anything queued for `device`.
    pub fn has_pending_for(&self, device: Device) -> bool {
        let _mask = IrqMask::acquire();
        self.live_items().any(|item| item.device == device)
    }

    /// Whether the next push would fail.
    #[inline]
    pub fn is_full(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        RingArena::<TxItem, N>::next(head) == self.tail.load(Ordering::Acquire)
    }

    /// Bytes queued across all devices.
    #[inline]
    pub fn len(&self) -> usize {
        RingArena::<TxItem, N>::used(
            self.head.load(Ordering::Acquire),
            self.tail.load(Ordering::Acquire),
        )
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Device owning the oldest byte.
    pub fn device_at_tail(&self) -> Option<Device> {
        let _mask = IrqMask::acquire();
        self.live_items().next().map(|item| item.device)
    }

    /// Re-tag every byte queued for `from` as belonging to `to`.
    pub fn retag(&self, from: Device, to: Device) {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Acquire);
        let mut idx = self.tail.load(Ordering::Relaxed);
        while idx != head {
            // SAFETY: live window, IrqMask held.
            unsafe {
                let mut item = self.items.read(idx);
                if item.device == from {
                    item.device = to;
                    self.items.write(idx, item);
                }
            }
            idx = RingArena::<TxItem, N>::next(idx);
        }
    }

    /// Drop every byte queued for `device`. Returns how many were dropped.
    pub fn clear_device(&self, device: Device) -> usize {
        let mut dropped = 0;
        while self.pop_for(device).is_some() {
            dropped += 1;
        }
        dropped
    }

    /// Caller must hold an IrqMask.
    fn live_items(&self) -> impl Iterator<Item = TxItem> + '_ {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let count = RingArena::<TxItem, N>::used(head, tail);
        // SAFETY: every index visited lies in the live window.
        (0..count).map(move |i| unsafe { self.items.read(RingArena::<TxItem, N>::advance(tail, i)) })
    }
}

impl<const N: usize> Default for TransmitQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
