//! Console packets end to end: bytes typed on the console device in,
//! ACK/NAK and framed replies out.

mod common;

use common::{boot, console_bytes, type_console, FakeEngine, FakePlatform, MemStore};
use rust_repl_scheduler::config::{ms, secs};
use rust_repl_scheduler::console::packet::{frame, ACK, DLE, NAK, SOH};
use rust_repl_scheduler::console::{InputState, PacketType};
use rust_repl_scheduler::{EvalError, IoBridge};
use serde_json::{json, Value};

#[test]
fn test_eval_packet_acks_and_responds() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let engine = FakeEngine::new().with_result("print('Hello')", Ok(Value::Null));
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    let mut input = vec![DLE, SOH, 0x20, 0x0E];
    input.extend_from_slice(b"print('Hello')");
    type_console(&platform, &bridge, &input);
    rt.idle();

    let mut expected = vec![ACK];
    expected.extend(frame(PacketType::Response, b"null"));
    assert_eq!(console_bytes(&platform, &bridge), expected);
    assert_eq!(rt.engine().evals, ["print('Hello')"]);
    assert_eq!(rt.console().state(), InputState::Idle);
    assert!(!bridge.in_packet_transfer());
}

#[test]
fn test_eval_packet_failure_naks() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let engine = FakeEngine::new().with_result("x", Err(EvalError::Exception("ReferenceError".into())));
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::Eval, b"x"));
    rt.idle();

    let mut expected = vec![NAK];
    expected.extend_from_slice(b"Uncaught ReferenceError\n");
    assert_eq!(console_bytes(&platform, &bridge), expected);
}

#[test]
fn test_interrupted_eval_packet_naks_then_reports() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let engine = FakeEngine::new().with_result("while(1);", Err(EvalError::Interrupted));
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::Eval, b"while(1);"));
    rt.loop_once();

    let mut expected = vec![NAK];
    expected.extend_from_slice(b"Execution Interrupted\n");
    assert_eq!(console_bytes(&platform, &bridge), expected);
}

#[test]
fn test_packet_keeps_partial_line() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, b"let a");
    type_console(&platform, &bridge, &frame(PacketType::Eval, b"1"));
    rt.idle();

    assert_eq!(rt.console().line().as_str(), "let a");
    assert_eq!(rt.engine().evals, ["1"]);
}

#[test]
fn test_truncated_packet_times_out_with_single_nak() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    let mut input = vec![DLE, SOH, 0x20, 0x10];
    input.extend_from_slice(b"0123456789");
    type_console(&platform, &bridge, &input);
    rt.idle();
    assert!(rt.console().in_packet_transfer());
    assert!(bridge.in_packet_transfer());

    platform.advance(ms(500));
    rt.idle();
    assert!(console_bytes(&platform, &bridge).is_empty());

    platform.advance(ms(600));
    rt.idle();
    assert_eq!(console_bytes(&platform, &bridge), [NAK]);
    assert_eq!(rt.console().state(), InputState::Idle);
    assert!(!bridge.in_packet_transfer());
    assert!(rt.engine().evals.is_empty());

    platform.advance(secs(10));
    rt.idle();
    assert!(console_bytes(&platform, &bridge).is_empty());
}

#[test]
fn test_header_only_times_out_after_start_window() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &[DLE, SOH]);
    rt.idle();

    platform.advance(secs(4));
    rt.idle();
    assert!(console_bytes(&platform, &bridge).is_empty());

    platform.advance(secs(2));
    rt.idle();
    assert_eq!(console_bytes(&platform, &bridge), [NAK]);
}

#[test]
fn test_event_packet_emits_object() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut engine = FakeEngine::new();
    engine.listening = true;
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::Event, b"{t:'btn', n:2}"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [ACK]);
    let (target, name, args) = rt.engine().emitted.last().cloned().expect("emitted");
    assert_eq!((target.as_str(), name.as_str()), ("E", "packet"));
    assert_eq!(args, [json!({"t": "btn", "n": 2})]);
}

#[test]
fn test_event_packet_rejects_non_object() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut engine = FakeEngine::new();
    engine.listening = true;
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::Event, b"[1,2]"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [NAK]);
}

#[test]
fn test_event_packet_without_listener_naks() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::Event, b"{a:1}"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [NAK]);
}

#[test]
fn test_unknown_and_response_types_nak() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &[DLE, SOH, 0xC0, 0x00]);
    type_console(&platform, &bridge, &frame(PacketType::Response, b"1"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [NAK, NAK]);
}

#[test]
fn test_ctrl_c_inside_packet_is_payload() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &[DLE, SOH]);
    rt.idle();
    type_console(&platform, &bridge, &[0x20, 0x03, b'a', 3, b'b']);
    assert!(!bridge.is_interrupted());
    rt.loop_once();

    assert_eq!(rt.engine().evals, ["a\u{3}b"]);
}

// ── file transfers ───────────────────────────────────────────────────────

#[test]
fn test_file_send_then_data_writes_file() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::FileSend, b"{fn:'a.txt',s:5}"));
    rt.idle();
    assert_eq!(console_bytes(&platform, &bridge), [ACK]);
    assert_eq!(rt.transfer().map(|t| t.size), Some(5));

    type_console(&platform, &bridge, &frame(PacketType::Data, b"hel"));
    rt.idle();
    assert_eq!(console_bytes(&platform, &bridge), [ACK]);
    assert_eq!(rt.transfer().map(|t| t.offset), Some(3));

    type_console(&platform, &bridge, &frame(PacketType::Data, b"lo"));
    rt.idle();
    assert_eq!(console_bytes(&platform, &bridge), [ACK]);
    assert!(rt.transfer().is_none());
    assert_eq!(rt.store().files["a.txt"], b"hello");
    assert_eq!(rt.store().closed, ["a.txt"]);
}

#[test]
fn test_file_send_rejects_bad_descriptor() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::FileSend, b"{fn:'a.txt'}"));
    type_console(&platform, &bridge, &frame(PacketType::FileSend, b"not json"));
    type_console(&platform, &bridge, &frame(PacketType::FileSend, b"{fn:'',s:3}"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [NAK, NAK, NAK]);
    assert!(rt.transfer().is_none());
}

#[test]
fn test_data_without_transfer_naks() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::Data, b"stray"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [NAK]);
    assert!(rt.services().timers.is_empty());
}

#[test]
fn test_stalled_file_transfer_closes_silently() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::FileSend, b"{fn:'b.bin',s:100}"));
    rt.idle();
    type_console(&platform, &bridge, &frame(PacketType::Data, b"part"));
    rt.idle();
    assert_eq!(console_bytes(&platform, &bridge), [ACK, ACK]);

    platform.advance(secs(9));
    rt.idle();
    assert!(rt.transfer().is_some());

    platform.advance(secs(2));
    rt.idle();
    assert!(rt.transfer().is_none());
    assert_eq!(rt.store().closed, ["b.bin"]);
    assert!(console_bytes(&platform, &bridge).is_empty());
}

#[test]
fn test_file_recv_streams_chunks() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
    let store = MemStore::new().with_file("log.txt", &data);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), store);

    type_console(&platform, &bridge, &frame(PacketType::FileRecv, b"{fn:'log.txt'}"));
    rt.idle();

    let mut expected = vec![ACK];
    expected.extend(frame(PacketType::Data, &data[..1024]));
    expected.extend(frame(PacketType::Data, &data[1024..2048]));
    expected.extend(frame(PacketType::Data, &data[2048..]));
    expected.extend(frame(PacketType::Data, &[]));
    assert_eq!(console_bytes(&platform, &bridge), expected);
}

#[test]
fn test_file_recv_missing_file_naks() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &frame(PacketType::FileRecv, b"{fn:'nope'}"));
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), [NAK]);
}
