//! Timers, watches and queued callbacks, exposed to the engine as [`Host`].

use crate::bridge::IoBridge;
use crate::config::SysTime;
use crate::device::Device;
use crate::engine::{Callback, Host};
use crate::hal::Platform;
use crate::timers::{TimerAction, TimerId, TimerSet};
use crate::watch::{WatchId, WatchOptions, WatchSet};
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use serde_json::Value;

/// Callback queued with [`Host::queue_callback`].
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedCallback {
    pub callback: Callback,
    pub this: Value,
    pub args: Vec<Value>,
}

pub struct Services<'a, P: Platform + ?Sized> {
    pub bridge: &'a IoBridge,
    pub platform: &'a P,
    pub timers: TimerSet,
    pub watches: WatchSet,
    pub queued: VecDeque<QueuedCallback>,
    /// System time at the start of the current timer pass. Timer times
    /// are relative to it.
    pub last_idle_time: SysTime,
    pub min_interval: SysTime,
}

impl<'a, P: Platform + ?Sized> Services<'a, P> {
    pub fn new(bridge: &'a IoBridge, platform: &'a P, min_interval: SysTime) -> Self {
        Self {
            bridge,
            platform,
            timers: TimerSet::new(),
            watches: WatchSet::new(),
            queued: VecDeque::new(),
            last_idle_time: platform.system_time(),
            min_interval,
        }
    }

    /// Timer time for something due `delay` from now.
    pub fn deadline(&self, delay: SysTime) -> SysTime {
        self.platform.system_time() - self.last_idle_time + delay
    }

    pub fn console(&self) -> Device {
        self.bridge.console_device()
    }

    /// Drop a watch and its pending debounce timer. The pin interrupt is
    /// disarmed once no watch needs it.
    pub fn remove_watch(&mut self, id: WatchId) -> bool {
        let Some(watch) = self.watches.remove(id) else {
            return false;
        };
        if let Some(timer) = watch.timeout {
            self.timers.remove(timer);
        }
        if !self.watches.is_watching_pin(watch.pin) {
            self.platform.pin_watch(watch.pin, false);
        }
        true
    }

    fn is_script_timer(&self, id: TimerId) -> bool {
        self.timers.get(id).is_some_and(|t| !t.action.is_internal())
    }
}

impl<P: Platform + ?Sized> Host for Services<'_, P> {
    fn now(&self) -> SysTime {
        self.platform.system_time()
    }

    fn set_timeout(&mut self, callback: Callback, delay: SysTime, args: Vec<Value>) -> TimerId {
        let time = self.deadline(delay.max(0));
        self.timers.add(time, None, TimerAction::Script { callback, args })
    }

    fn set_interval(&mut self, callback: Callback, interval: SysTime, args: Vec<Value>) -> TimerId {
        let interval = interval.max(self.min_interval);
        let time = self.deadline(interval);
        self.timers.add(time, Some(interval), TimerAction::Script { callback, args })
    }

    fn change_interval(&mut self, id: TimerId, interval: SysTime) -> bool {
        if !self.is_script_timer(id) {
            return false;
        }
        let interval = interval.max(self.min_interval);
        let time = self.deadline(interval);
        match self.timers.get_mut(id) {
            Some(timer) if timer.interval.is_some() => {
                timer.interval = Some(interval);
                timer.time = time;
                true
            }
            _ => false,
        }
    }

    fn clear_timer(&mut self, id: TimerId) -> bool {
        self.is_script_timer(id) && self.timers.remove(id).is_some()
    }

    fn set_watch(&mut self, options: WatchOptions) -> Option<WatchId> {
        let pin = options.pin;
        let Some(channel) = self.platform.pin_watch(pin, true) else {
            log::warn!("pin {} cannot be watched", pin);
            return None;
        };
        let initial = self.platform.pin_value(pin);
        Some(self.watches.add(options, channel, initial))
    }

    fn clear_watch(&mut self, id: WatchId) -> bool {
        self.remove_watch(id)
    }

    fn queue_callback(&mut self, callback: Callback, this: Value, args: Vec<Value>) {
        self.queued.push_back(QueuedCallback { callback, this, args });
    }

    fn print(&mut self, text: &str) {
        self.bridge.transmit_str(self.platform, self.console(), text);
    }

    fn transmit(&mut self, device: Device, data: &[u8]) {
        self.bridge.transmit_bytes(self.platform, device, data);
    }

    fn is_interrupted(&self) -> bool {
        self.bridge.is_interrupted()
    }
}
