//! Pin watches.

use crate::config::SysTime;
use crate::device::Device;
use crate::engine::Callback;
use crate::hal::Pin;
use crate::timers::TimerId;
use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u32);

/// Which level transitions run the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Edge {
    #[default]
    Both,
    Rising,
    Falling,
}

impl Edge {
    /// Whether a transition to `high` should fire.
    pub fn matches(self, high: bool) -> bool {
        match self {
            Self::Both => true,
            Self::Rising => high,
            Self::Falling => !high,
        }
    }
}

/// Arguments for creating a watch.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchOptions {
    pub pin: Pin,
    pub callback: Callback,
    pub edge: Edge,
    /// Settle time; `0` fires on every edge.
    pub debounce: SysTime,
    /// Keep the watch after it fires.
    pub recurring: bool,
    /// Pin sampled alongside each edge.
    pub data_pin: Option<Pin>,
}

impl WatchOptions {
    pub fn new(pin: Pin, callback: Callback) -> Self {
        Self {
            pin,
            callback,
            edge: Edge::Both,
            debounce: 0,
            recurring: false,
            data_pin: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Watch {
    pub id: WatchId,
    pub pin: Pin,
    /// Interrupt channel the pin's edges arrive on.
    pub channel: Device,
    pub edge: Edge,
    pub debounce: SysTime,
    pub recurring: bool,
    pub callback: Callback,
    /// Last committed pin level.
    pub state: bool,
    /// Time of the last reported edge, in system time.
    pub last_time: Option<SysTime>,
    /// Pending debounce timer.
    pub timeout: Option<TimerId>,
    pub data_pin: Option<Pin>,
}

#[derive(Debug)]
pub struct WatchSet {
    watches: Vec<Watch>,
    next_id: u32,
}

impl WatchSet {
    pub const fn new() -> Self {
        Self {
            watches: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a watch whose committed level starts at `initial`.
    pub fn add(&mut self, options: WatchOptions, channel: Device, initial: bool) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.watches.push(Watch {
            id,
            pin: options.pin,
            channel,
            edge: options.edge,
            debounce: options.debounce.max(0),
            recurring: options.recurring,
            callback: options.callback,
            state: initial,
            last_time: None,
            timeout: None,
            data_pin: options.data_pin,
        });
        id
    }

    pub fn remove(&mut self, id: WatchId) -> Option<Watch> {
        let idx = self.watches.iter().position(|w| w.id == id)?;
        Some(self.watches.remove(idx))
    }

    pub fn get(&self, id: WatchId) -> Option<&Watch> {
        self.watches.iter().find(|w| w.id == id)
    }

    pub fn get_mut(&mut self, id: WatchId) -> Option<&mut Watch> {
        self.watches.iter_mut().find(|w| w.id == id)
    }

    pub fn is_watching_pin(&self, pin: Pin) -> bool {
        self.watches.iter().any(|w| w.pin == pin)
    }

    /// Watches fed by `channel`, in registration order.
    pub fn ids_for_channel(&self, channel: Device) -> Vec<WatchId> {
        self.watches
            .iter()
            .filter(|w| w.channel == channel)
            .map(|w| w.id)
            .collect()
    }

    /// Pins with at least one watch.
    pub fn pins(&self) -> Vec<Pin> {
        let mut pins: Vec<Pin> = self.watches.iter().map(|w| w.pin).collect();
        pins.sort_unstable();
        pins.dedup();
        pins
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Watch> {
        self.watches.iter_mut()
    }

    pub fn clear(&mut self) {
        self.watches.clear();
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

impl Default for WatchSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Full event time from the 32-bit wire stamp. Events are never newer than
/// `now`, so a wire value above now's low word belongs to the previous epoch.
pub fn reconstruct_event_time(now: SysTime, wire: u32) -> SysTime {
    let mut base = now;
    if (now as u32) < wire {
        base -= 1 << 32;
    }
    (base & !0xFFFF_FFFF) | wire as SysTime
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_matches() {
        assert!(Edge::Both.matches(false));
        assert!(Edge::Rising.matches(true));
        assert!(!Edge::Rising.matches(false));
        assert!(Edge::Falling.matches(false));
    }

    #[test]
    fn test_reconstruct_same_epoch() {
        let now = (5i64 << 32) | 1000;
        assert_eq!(reconstruct_event_time(now, 900), (5i64 << 32) | 900);
    }

    #[test]
    fn test_reconstruct_previous_epoch() {
        let now = (5i64 << 32) | 10;
        assert_eq!(reconstruct_event_time(now, 0xFFFF_FFF0), (4i64 << 32) | 0xFFFF_FFF0);
    }

    #[test]
    fn test_pin_tracking() {
        let mut set = WatchSet::new();
        let cb = Callback::SourceText("x".into());
        let a = set.add(WatchOptions::new(3, cb.clone()), Device::EXTI0, false);
        set.add(WatchOptions::new(3, cb), Device::EXTI0, false);
        assert_eq!(set.pins(), [3]);
        set.remove(a);
        assert!(set.is_watching_pin(3));
        assert_eq!(set.ids_for_channel(Device::EXTI0).len(), 1);
    }
}
