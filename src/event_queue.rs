//! Receive/event queue.
//!
//! Variable-length frames in a byte arena:
//!
//! ```text
//!   tail          last_head          head
//!    │                │               │
//!    ▼                ▼               ▼
//!   [len][tag][data…][len][tag][data…]
//! ```
//!
//! Interrupt handlers append at `head`. The main loop pops at `tail`.
//! `last_head` marks the newest frame so a burst of bytes from one channel
//! can be appended to it instead of paying two header bytes per byte.

use crate::config::MAX_EVENT_LEN;
use crate::device::{Device, EventTag};
use crate::irq::IrqMask;
use crate::ring::RingArena;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Bytes kept free so the head never catches the tail.
pub const SAFETY_MARGIN: usize = 4;

/// Frame header size (length + tag).
const HEADER_LEN: usize = 2;

/// A popped event.
#[derive(Clone, Copy)]
pub struct IoEvent {
    pub tag: EventTag,
    len: u8,
    data: [u8; MAX_EVENT_LEN],
}

impl IoEvent {
    pub fn new(tag: EventTag, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_EVENT_LEN);
        let mut data = [0u8; MAX_EVENT_LEN];
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            tag,
            len: len as u8,
            data,
        }
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.tag.device()
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Wire timestamp of a pin event (low 32 bits of system time).
    pub fn timestamp32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.payload().get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

impl core::fmt::Debug for IoEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IoEvent")
            .field("device", &self.device())
            .field("flags", &self.tag.flags())
            .field("payload", &self.payload())
            .finish()
    }
}

/// Framed FIFO over an `N`-byte arena.
pub struct EventQueue<const N: usize> {
    bytes: RingArena<u8, N>,
    head: AtomicUsize,
    last_head: AtomicUsize,
    tail: AtomicUsize,
}

type Arena<const N: usize> = RingArena<u8, N>;

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            bytes: RingArena::new(0),
            head: AtomicUsize::new(0),
            last_head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Append one frame. Fails closed (nothing written) when fewer than
    /// `len + 2` bytes are free. Payloads longer than [`MAX_EVENT_LEN`]
    /// are truncated.
    pub fn push_event(&self, tag: EventTag, payload: &[u8]) -> bool {
        let payload = &payload[..payload.len().min(MAX_EVENT_LEN)];
        let _mask = IrqMask::acquire();
        self.push_frame_masked(tag, payload)
    }

    /// Append bytes for a byte-stream channel, extending the newest frame
    /// when it belongs to the same channel, is not already at the consumer's
    /// tail, and has room. Returns `false` if any chunk was dropped.
    pub fn push_chars(&self, device: Device, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        let tag = EventTag::from(device);
        let _mask = IrqMask::acquire();

        let head = self.head.load(Ordering::Relaxed);
        let last = self.last_head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        // SAFETY: header bytes of the newest frame, IrqMask held.
        let (last_len, last_tag) =
            unsafe { (self.bytes.read(last) as usize, self.bytes.read(Arena::<N>::next(last))) };
        let mergeable = last != head
            && last != tail
            && last_tag == tag.raw()
            && last_len + data.len() < MAX_EVENT_LEN
            && self.free_for_chars() > data.len();

        if mergeable {
            let mut idx = head;
            for &b in data {
                // SAFETY: free space checked above.
                unsafe { self.bytes.write(idx, b) };
                idx = Arena::<N>::next(idx);
            }
            // SAFETY: header of the newest frame.
            unsafe { self.bytes.write(last, (last_len + data.len()) as u8) };
            self.head.store(idx, Ordering::Release);
            return true;
        }

        let mut ok = true;
        for chunk in data.chunks(MAX_EVENT_LEN) {
            ok &= self.push_frame_masked(tag, chunk);
        }
        ok
    }

    /// Remove the oldest frame.
    pub fn pop_event(&self) -> Option<IoEvent> {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);
        if head == tail {
            return None;
        }
        // The frame being consumed can no longer be extended.
        if self.last_head.load(Ordering::Relaxed) == tail {
            self.last_head.store(head, Ordering::Relaxed);
        }
        let (event, next) = self.read_frame(tail);
        self.tail.store(next, Ordering::Release);
        Some(event)
    }

    /// Remove the oldest frame for `device`, wherever it sits, keeping
    /// every other frame in order.
    ///
    /// Everything between the tail and the matched frame is shifted
    /// forward by the size of the removed frame, copying backwards from
    /// the byte just before the match down to the tail.
    pub fn pop_event_of_type(&self, device: Device) -> Option<IoEvent> {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        let mut idx = tail;
        while idx != head {
            // SAFETY: frame header within the live window.
            let (len, tag) = unsafe {
                (self.bytes.read(idx) as usize, EventTag::from_raw(self.bytes.read(Arena::<N>::next(idx))))
            };
            if tag.device() == device {
                let (event, next) = self.read_frame(idx);
                if idx == tail {
                    if self.last_head.load(Ordering::Relaxed) == tail {
                        self.last_head.store(head, Ordering::Relaxed);
                    }
                    self.tail.store(next, Ordering::Release);
                } else {
                    // Last byte of the removed frame receives the byte before it.
                    let mut dst = Arena::<N>::advance(idx, len + 1);
                    let mut src = Arena::<N>::prev(idx);
                    loop {
                        // SAFETY: src and dst both lie in [tail, next).
                        unsafe { self.bytes.write(dst, self.bytes.read(src)) };
                        if src == tail {
                            break;
                        }
                        src = Arena::<N>::prev(src);
                        dst = Arena::<N>::prev(dst);
                    }
                    self.tail.store(dst, Ordering::Release);
                    // Frames moved; stop coalescing until a new frame lands.
                    self.last_head.store(head, Ordering::Relaxed);
                }
                return Some(event);
            }
            idx = Arena::<N>::advance(idx, len + HEADER_LEN);
        }
        None
    }

    /// Whether the oldest frame belongs to `device`.
    pub fn is_top_event(&self, device: Device) -> bool {
        let _mask = IrqMask::acquire();
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            return false;
        }
        // SAFETY: header of the oldest frame.
        EventTag::from_raw(unsafe { self.bytes.read(Arena::<N>::next(tail)) }).device() == device
    }

    #[inline]
    pub fn has_events(&self) -> bool {
        self.head.load(Ordering::Acquire) != self.tail.load(Ordering::Acquire)
    }

    /// Arena bytes in use (headers included).
    #[inline]
    pub fn events_used(&self) -> usize {
        Arena::<N>::used(self.head.load(Ordering::Acquire), self.tail.load(Ordering::Acquire))
    }

    /// Bytes available to new payload, after the safety margin.
    #[inline]
    pub fn free_for_chars(&self) -> usize {
        N.saturating_sub(self.events_used() + SAFETY_MARGIN)
    }

    /// Whether `n` more payload bytes would fit.
    #[inline]
    pub fn has_space_for_chars(&self, n: usize) -> bool {
        self.free_for_chars() > n
    }

    /// Number of frames queued.
    pub fn event_count(&self) -> usize {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Acquire);
        let mut idx = self.tail.load(Ordering::Relaxed);
        let mut count = 0;
        while idx != head {
            // SAFETY: frame header within the live window.
            let len = unsafe { self.bytes.read(idx) } as usize;
            idx = Arena::<N>::advance(idx, len + HEADER_LEN);
            count += 1;
        }
        count
    }

    /// Drop everything.
    pub fn clear(&self) {
        let _mask = IrqMask::acquire();
        let head = self.head.load(Ordering::Relaxed);
        self.tail.store(head, Ordering::Release);
        self.last_head.store(head, Ordering::Relaxed);
    }

    /// Caller must hold an IrqMask.
    fn push_frame_masked(&self, tag: EventTag, payload: &[u8]) -> bool {
        if self.free_for_chars() < payload.len() + HEADER_LEN {
            return false;
        }
        let head = self.head.load(Ordering::Relaxed);
        let mut idx = head;
        // SAFETY: free space checked, IrqMask held.
        unsafe {
            self.bytes.write(idx, payload.len() as u8);
            idx = Arena::<N>::next(idx);
            self.bytes.write(idx, tag.raw());
            idx = Arena::<N>::next(idx);
            for &b in payload {
                self.bytes.write(idx, b);
                idx = Arena::<N>::next(idx);
            }
        }
        self.last_head.store(head, Ordering::Relaxed);
        self.head.store(idx, Ordering::Release);
        true
    }

    /// Read the frame starting at `idx`. Returns it and the index after it.
    fn read_frame(&self, idx: usize) -> (IoEvent, usize) {
        // SAFETY: idx is a frame boundary within the live window.
        unsafe {
            let len = self.bytes.read(idx) as usize;
            let tag = EventTag::from_raw(self.bytes.read(Arena::<N>::next(idx)));
            let mut data = [0u8; MAX_EVENT_LEN];
            let mut pos = Arena::<N>::advance(idx, HEADER_LEN);
            for slot in data.iter_mut().take(len) {
                *slot = self.bytes.read(pos);
                pos = Arena::<N>::next(pos);
            }
            (
                IoEvent {
                    tag,
                    len: len.min(MAX_EVENT_LEN) as u8,
                    data,
                },
                Arena::<N>::advance(idx, len + HEADER_LEN),
            )
        }
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
