//! Timer collection.
//!
//! Each timer stores the time remaining until it fires, relative to the
//! start of the current scheduler pass. The scheduler subtracts elapsed
//! time once per pass and fires everything at or below zero.

use crate::config::SysTime;
use crate::engine::Callback;
use crate::watch::WatchId;
use alloc::vec::Vec;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u32);

/// What happens when a timer fires.
#[derive(Clone, Debug, PartialEq)]
pub enum TimerAction {
    /// `setTimeout`/`setInterval` from script code.
    Script { callback: Callback, args: Vec<Value> },
    /// Debounce settle timer for a watch.
    Debounce { watch: WatchId },
    /// Incomplete packet: reply NAK and leave packet mode.
    PacketTimeout,
    /// Inbound file went quiet: close it.
    FileTimeout,
}

impl TimerAction {
    /// Internal timers are owned by the runtime and invisible to scripts.
    pub fn is_internal(&self) -> bool {
        !matches!(self, Self::Script { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Timer {
    pub id: TimerId,
    /// Remaining time; `<= 0` means due.
    pub time: SysTime,
    /// Repeat period for intervals.
    pub interval: Option<SysTime>,
    pub action: TimerAction,
    /// Pin level a debounce timer will commit when it fires.
    pub state: bool,
}

/// Ordered set of timers with a mutation flag for the firing loop.
#[derive(Debug)]
pub struct TimerSet {
    timers: Vec<Timer>,
    next_id: u32,
    changed: bool,
}

impl TimerSet {
    pub const fn new() -> Self {
        Self {
            timers: Vec::new(),
            next_id: 1,
            changed: false,
        }
    }

    pub fn add(&mut self, time: SysTime, interval: Option<SysTime>, action: TimerAction) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.timers.push(Timer {
            id,
            time,
            interval,
            action,
            state: false,
        });
        self.changed = true;
        id
    }

    /// Remove a timer. Flags the set as changed.
    pub fn remove(&mut self, id: TimerId) -> Option<Timer> {
        let timer = self.remove_quiet(id)?;
        self.changed = true;
        Some(timer)
    }

    /// Remove without flagging, for the firing loop's own removals.
    pub fn remove_quiet(&mut self, id: TimerId) -> Option<Timer> {
        let idx = self.timers.iter().position(|t| t.id == id)?;
        Some(self.timers.remove(idx))
    }

    pub fn get(&self, id: TimerId) -> Option<&Timer> {
        self.timers.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TimerId) -> Option<&mut Timer> {
        self.timers.iter_mut().find(|t| t.id == id)
    }

    /// Ids in firing order.
    pub fn ids(&self) -> Vec<TimerId> {
        self.timers.iter().map(|t| t.id).collect()
    }

    /// Subtract elapsed time from every timer.
    pub fn advance(&mut self, elapsed: SysTime) {
        for t in &mut self.timers {
            t.time -= elapsed;
        }
    }

    #[inline]
    pub fn changed(&self) -> bool {
        self.changed
    }

    #[inline]
    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// Keep only the timers `keep` accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(&Timer) -> bool) {
        let before = self.timers.len();
        self.timers.retain(|t| keep(t));
        if self.timers.len() != before {
            self.changed = true;
        }
    }

    pub fn clear(&mut self) {
        self.timers.clear();
        self.changed = true;
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Timer> {
        self.timers.iter()
    }
}

impl Default for TimerSet {
    fn default() -> Self {
        Self::new()
    }
}
