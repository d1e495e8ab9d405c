//! Receive-side bridge tests: framing from interrupt producers, overflow,
//! the Ctrl-C latch and byte hooks.

mod common;

use common::FakePlatform;
use rust_repl_scheduler::bridge::CharHook;
use rust_repl_scheduler::{Device, ErrorFlags, EventFlags, EventTag, IoBridge};

fn payloads(bridge: &IoBridge) -> Vec<(Device, Vec<u8>)> {
    let mut out = Vec::new();
    while let Some(event) = bridge.events.pop_event() {
        out.push((event.device(), event.payload().to_vec()));
    }
    out
}

#[test]
fn test_events_come_out_in_arrival_order() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::new();

    bridge.push_chars(&platform, Device::SERIAL1, b"A");
    bridge.push_pin_event(Device::EXTI2, 1234, true, false);
    bridge.push_chars(&platform, Device::SERIAL2, b"C");

    let events = payloads(&bridge);
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], (Device::SERIAL1, b"A".to_vec()));
    assert_eq!(events[1].0, Device::EXTI2);
    assert_eq!(events[2], (Device::SERIAL2, b"C".to_vec()));
}

#[test]
fn test_pop_of_type_leaves_others_in_order() {
    let bridge = IoBridge::new();

    bridge.push_event(EventTag::from(Device::SERIAL1), b"A");
    bridge.push_event(EventTag::from(Device::SERIAL2), b"B");
    bridge.push_event(EventTag::from(Device::SERIAL3), b"C");

    let b = bridge.events.pop_event_of_type(Device::SERIAL2).expect("B queued");
    assert_eq!(b.payload(), b"B");
    assert_eq!(
        payloads(&bridge),
        [(Device::SERIAL1, b"A".to_vec()), (Device::SERIAL3, b"C".to_vec())]
    );
}

#[test]
fn test_pin_event_carries_level_and_timestamp() {
    let bridge = IoBridge::new();

    // Only the low 32 bits travel.
    let time = (5i64 << 32) + 777;
    assert!(bridge.push_pin_event(Device::EXTI5, time, true, true));

    let event = bridge.events.pop_event().expect("pin event");
    assert_eq!(event.device(), Device::EXTI5);
    assert!(event.tag.flags().contains(EventFlags::PIN_HIGH | EventFlags::DATA_PIN_HIGH));
    assert_eq!(event.timestamp32(), Some(777));
}

#[test]
fn test_pin_event_rejects_non_exti_channel() {
    let bridge = IoBridge::new();
    assert!(!bridge.push_pin_event(Device::SERIAL1, 0, true, false));
    assert!(!bridge.events.has_events());
}

#[test]
fn test_full_queue_drops_and_raises_flag() {
    let bridge = IoBridge::new();

    let mut pushed = 0;
    while bridge.push_event(EventTag::from(Device::CUSTOM), &[0; 60]) {
        pushed += 1;
    }
    assert!(pushed > 0);
    assert!(bridge.errors.contains(ErrorFlags::RX_FIFO_FULL));
    assert_eq!(bridge.events.event_count(), pushed);
}

#[test]
fn test_serial_status_needs_error_handling() {
    let bridge = IoBridge::new();

    assert!(!bridge.push_serial_status(Device::SERIAL2, true, false));

    bridge.flow.set_error_handling(Device::SERIAL2, true);
    assert!(bridge.push_serial_status(Device::SERIAL2, true, false));

    let event = bridge.events.pop_event().expect("status event");
    assert!(event.device().is_serial_status());
    assert_eq!(event.device().status_to_serial(), Some(Device::SERIAL2));
    assert!(event.tag.flags().contains(EventFlags::FRAMING_ERROR));
    assert!(!event.tag.flags().contains(EventFlags::PARITY_ERROR));
}

#[test]
fn test_ctrl_c_on_console_latches_interrupt() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::new();
    bridge.set_console_device(&platform, Device::USB);

    bridge.push_chars(&platform, Device::SERIAL1, &[3]);
    assert!(!bridge.is_interrupted());

    bridge.push_chars(&platform, Device::USB, b"ab\x03");
    assert!(bridge.is_interrupted());
    // The byte itself is still delivered.
    assert_eq!(payloads(&bridge).last().map(|(_, p)| p.clone()), Some(b"ab\x03".to_vec()));

    bridge.clear_interrupt();
    assert!(!bridge.is_interrupted());
}

#[test]
fn test_ctrl_c_ignored_during_packet_transfer() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::new();
    bridge.set_console_device(&platform, Device::USB);
    bridge.set_packet_transfer(true);

    bridge.push_chars(&platform, Device::USB, &[3]);

    assert!(!bridge.is_interrupted());
}

fn swallow_x(_device: Device, byte: u8) -> bool {
    byte == b'x'
}

#[test]
fn test_char_hook_filters_bytes() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::new();

    bridge.set_char_hook(Device::SERIAL1, Some(swallow_x as CharHook));
    bridge.push_chars(&platform, Device::SERIAL1, b"axbx");
    assert_eq!(payloads(&bridge), [(Device::SERIAL1, b"ab".to_vec())]);

    bridge.set_char_hook(Device::SERIAL1, None);
    bridge.push_chars(&platform, Device::SERIAL1, b"x");
    assert_eq!(payloads(&bridge), [(Device::SERIAL1, b"x".to_vec())]);
}

#[test]
fn test_reset_drops_hooks() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::new();

    bridge.set_char_hook(Device::SERIAL1, Some(swallow_x as CharHook));
    bridge.reset();
    bridge.push_chars(&platform, Device::SERIAL1, b"x");

    assert_eq!(payloads(&bridge), [(Device::SERIAL1, b"x".to_vec())]);
}
