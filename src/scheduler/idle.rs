//! One scheduler pass.

use super::Runtime;
use crate::config::{SysTime, XON_MARK};
use crate::device::EventFlags;
use crate::engine::{Callback, Engine};
use crate::event_queue::IoEvent;
use crate::hal::Platform;
use crate::storage::FileStore;
use crate::timers::{TimerAction, TimerId};
use crate::watch::{reconstruct_event_time, Watch, WatchId};
use alloc::vec::Vec;
use serde_json::{json, Map, Value};

/// What a pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Events, timers, queued callbacks or engine work happened.
    pub busy: bool,
    /// The pass ended early after a collection.
    pub gc_ran: bool,
    /// The platform was asked to sleep.
    pub slept: bool,
    /// Time until the earliest timer, relative to the pass start.
    pub next_wake: Option<SysTime>,
}

/// Seconds as passed to script callbacks.
fn to_secs(time: SysTime) -> f64 {
    time as f64 / 1_000_000.0
}

/// Argument object for a watch callback.
fn watch_data(watch: &Watch, high: bool, time: SysTime, data_high: Option<bool>) -> Value {
    let mut data = Map::new();
    data.insert("state".into(), Value::Bool(high));
    data.insert("lastTime".into(), watch.last_time.map(|t| json!(to_secs(t))).unwrap_or(Value::Null));
    data.insert("time".into(), json!(to_secs(time)));
    data.insert("pin".into(), json!(watch.pin));
    if let Some(d) = data_high {
        data.insert("data".into(), Value::Bool(d));
    }
    Value::Object(data)
}

impl<'a, P: Platform + ?Sized, E: Engine, S: FileStore> Runtime<'a, P, E, S> {
    /// Run one scheduler pass.
    pub fn idle(&mut self) -> PassReport {
        let bridge = self.services.bridge;
        let platform = self.services.platform;
        let mut report = PassReport::default();

        self.loops_idling = self.loops_idling.saturating_add(1);

        // Only what was queued at the start; handlers may queue more.
        let mut budget = bridge.events.event_count();
        while budget > 0 {
            let Some(event) = bridge.events.pop_event() else {
                break;
            };
            budget -= 1;
            report.busy = true;
            self.loops_idling = 0;
            self.dispatch_event(event, &mut budget);
        }

        if bridge.events.events_used() < XON_MARK {
            bridge.flow.all_ready(platform);
        }

        let (fired, min_next) = self.run_timers();
        report.busy |= fired;
        report.next_wake = (min_next != SysTime::MAX).then_some(min_next);

        if !self.services.queued.is_empty() {
            report.busy = true;
            self.run_queued();
        }

        if self.engine.idle(&mut self.services) {
            report.busy = true;
        }

        if report.busy {
            self.loops_idling = 0;
        }

        if self.loops_idling == 1 && min_next > self.config.gc_min_slack && self.engine.needs_gc() {
            let freed = self.engine.garbage_collect();
            log::debug!("idle gc, freed: {}", freed);
            report.gc_ran = true;
            return report;
        }

        if self.loops_idling >= 1 && !bridge.events.has_events() {
            platform.sleep(min_next);
            report.slept = true;
        }
        report
    }

    fn dispatch_event(&mut self, event: IoEvent, budget: &mut usize) {
        let bridge = self.services.bridge;
        let device = event.device();

        if device == bridge.console_device() {
            for &b in event.payload() {
                self.handle_console_byte(b);
            }
        } else if device.is_serial() {
            // Fold consecutive events from the same device into one chunk
            let mut data: Vec<u8> = event.payload().to_vec();
            while *budget > 0 && bridge.events.is_top_event(device) {
                let Some(next) = bridge.events.pop_event() else {
                    break;
                };
                *budget -= 1;
                data.extend_from_slice(next.payload());
            }
            if !data.is_empty() {
                self.engine.on_stream_data(&mut self.services, device, &data);
            }
        } else if let Some(serial) = device.status_to_serial() {
            let flags = event.tag.flags();
            if flags.contains(EventFlags::FRAMING_ERROR) {
                self.engine.emit(&mut self.services, serial.name(), "framing", &[]);
            }
            if flags.contains(EventFlags::PARITY_ERROR) {
                self.engine.emit(&mut self.services, serial.name(), "parity", &[]);
            }
        } else if device == crate::device::Device::CUSTOM {
            self.engine.on_custom_event(&mut self.services, event.payload());
        } else if device.is_exti() {
            self.handle_pin_event(&event);
        } else {
            log::debug!("dropped event for {}", device);
        }
    }

    /// Run every watch on the event's channel.
    fn handle_pin_event(&mut self, event: &IoEvent) {
        let Some(wire) = event.timestamp32() else {
            return;
        };
        let flags = event.tag.flags();
        let high = flags.contains(EventFlags::PIN_HIGH);
        let data_high = flags.contains(EventFlags::DATA_PIN_HIGH);
        let now = self.services.platform.system_time();
        let event_time = reconstruct_event_time(now, wire);

        for id in self.services.watches.ids_for_channel(event.device()) {
            if let Some(when) = self.debounce_edge(id, high, event_time) {
                self.fire_watch(id, high, when, data_high);
            }
        }
    }

    /// Update debounce state for one edge. Returns the time to report if
    /// the watch should run now.
    fn debounce_edge(&mut self, id: WatchId, high: bool, event_time: SysTime) -> Option<SysTime> {
        let last_idle = self.services.last_idle_time;
        let services = &mut self.services;
        let watch = services.watches.get_mut(id)?;

        if watch.debounce <= 0 {
            watch.state = high;
            return Some(event_time);
        }

        let old_state = watch.state;
        let debounce = watch.debounce;
        match watch.timeout {
            Some(timer_id) => {
                let Some(timer) = services.timers.get_mut(timer_id) else {
                    watch.timeout = None;
                    return None;
                };
                let deadline = last_idle + timer.time;
                timer.time = event_time - last_idle + debounce;
                timer.state = high;
                if event_time > deadline && high != old_state {
                    // The settle timer should already have fired
                    watch.state = high;
                    watch.timeout = None;
                    services.timers.remove(timer_id);
                    return Some(deadline - debounce);
                }
                None
            }
            None if high != old_state => {
                let timer_id = services.timers.add(event_time - last_idle + debounce, None, TimerAction::Debounce { watch: id });
                if let Some(timer) = services.timers.get_mut(timer_id) {
                    timer.state = high;
                }
                watch.timeout = Some(timer_id);
                None
            }
            None => None,
        }
    }

    /// Run a watch's callback for a committed edge.
    fn fire_watch(&mut self, id: WatchId, high: bool, when: SysTime, data_high: bool) {
        let Some(watch) = self.services.watches.get_mut(id) else {
            return;
        };
        if !watch.edge.matches(high) {
            watch.last_time = Some(when);
            return;
        }
        let data = watch_data(watch, high, when, watch.data_pin.map(|_| data_high));
        let callback = watch.callback.clone();
        let recurring = watch.recurring;
        watch.last_time = Some(when);

        let ok = self.run_callback(&callback, &Value::Null, &[data]);
        let keep = if !ok && recurring {
            self.callback_removed("watch");
            false
        } else {
            recurring
        };
        if !keep {
            self.services.remove_watch(id);
        }
    }

    /// Advance and fire timers. Returns whether any fired and the time
    /// until the next one.
    fn run_timers(&mut self) -> (bool, SysTime) {
        let now = self.services.platform.system_time();
        let elapsed = now - self.services.last_idle_time;
        self.services.last_idle_time = now;
        self.services.timers.advance(elapsed);

        let mut fired = false;
        let mut min_next = SysTime::MAX;
        loop {
            self.services.timers.clear_changed();
            let mut restart = false;
            for id in self.services.timers.ids() {
                let Some(timer) = self.services.timers.get(id) else {
                    continue;
                };
                let mut time = timer.time;
                if time <= 0 {
                    fired = true;
                    let action = timer.action.clone();
                    let state = timer.state;
                    let remove = self.fire_timer(id, action, time, state);
                    // interval re-read: the callback may have changed it
                    let interval = self.services.timers.get(id).and_then(|t| t.interval);
                    match interval {
                        Some(interval) if !remove => {
                            time += interval;
                            if let Some(t) = self.services.timers.get_mut(id) {
                                t.time = time;
                            }
                        }
                        _ => {
                            self.services.timers.remove_quiet(id);
                            time = -1;
                        }
                    }
                }
                if time >= 0 && time < min_next {
                    min_next = time;
                }
                if self.services.timers.changed() {
                    restart = true;
                    break;
                }
            }
            if !restart {
                break;
            }
        }
        (fired, min_next)
    }

    /// Perform a due timer's action. Returns `true` if a repeating timer
    /// must be dropped.
    fn fire_timer(&mut self, id: TimerId, action: TimerAction, time: SysTime, state: bool) -> bool {
        match action {
            TimerAction::Script { callback, args } => {
                let ok = self.run_callback(&callback, &Value::Null, &args);
                let repeating = self.services.timers.get(id).is_some_and(|t| t.interval.is_some());
                if !ok && repeating {
                    self.callback_removed("interval");
                    return true;
                }
                false
            }
            TimerAction::Debounce { watch } => {
                self.settle_watch(watch, time, state);
                false
            }
            TimerAction::PacketTimeout => {
                self.packet_timer = None;
                self.packet_timeout();
                false
            }
            TimerAction::FileTimeout => {
                self.file_timer = None;
                log::debug!("file transfer timed out");
                self.file_end();
                false
            }
        }
    }

    /// A debounce timer expired: commit the level and run the watch if it
    /// really changed.
    fn settle_watch(&mut self, id: WatchId, time: SysTime, state: bool) {
        let last_idle = self.services.last_idle_time;
        let Some(watch) = self.services.watches.get_mut(id) else {
            return;
        };
        let old_state = watch.state;
        watch.state = state;
        watch.timeout = None;
        if old_state == state {
            return;
        }
        let when = last_idle + time - watch.debounce;
        if !watch.edge.matches(state) {
            watch.last_time = Some(when);
            return;
        }
        let data = watch_data(watch, state, when, None);
        let callback: Callback = watch.callback.clone();
        let recurring = watch.recurring;
        watch.last_time = Some(when);

        self.run_callback(&callback, &Value::Null, &[data]);
        if !recurring {
            self.services.remove_watch(id);
        }
    }

    /// Run queued callbacks until the queue empties or execution is
    /// interrupted, in which case the rest are dropped.
    fn run_queued(&mut self) {
        let bridge = self.services.bridge;
        while let Some(item) = self.services.queued.pop_front() {
            if bridge.is_interrupted() {
                self.services.queued.clear();
                self.events_interrupted = true;
                break;
            }
            self.run_callback(&item.callback, &item.this, &item.args);
        }
    }
}
