//! Console input decoding: escapes, line execution and the runtime's
//! handling of typed lines.

mod common;

use common::{boot, console_bytes, type_console, FakeEngine, FakePlatform, MemStore};
use rust_repl_scheduler::console::packet::{DLE, ENQ, ESC, SOH};
use rust_repl_scheduler::console::{ConsoleEvent, ConsoleProtocol, EchoEditor, EditIntent, InputState, PacketType};
use rust_repl_scheduler::{EvalError, IoBridge};
use serde_json::json;

fn feed_all(p: &mut ConsoleProtocol, bytes: &[u8]) -> Vec<ConsoleEvent> {
    bytes.iter().filter_map(|&b| p.feed(b)).collect()
}

fn edits(events: &[ConsoleEvent]) -> Vec<EditIntent> {
    events
        .iter()
        .filter_map(|e| match e {
            ConsoleEvent::Edit(intent) => Some(*intent),
            _ => None,
        })
        .collect()
}

#[test]
fn test_cursor_escapes() {
    let mut p = ConsoleProtocol::new(true);
    let ev = feed_all(&mut p, b"\x1b[D\x1b[C\x1b[A\x1b[B\x1b[H\x1b[F");
    assert_eq!(
        edits(&ev),
        [
            EditIntent::CursorLeft,
            EditIntent::CursorRight,
            EditIntent::CursorUp,
            EditIntent::CursorDown,
            EditIntent::Home,
            EditIntent::End,
        ]
    );
    assert_eq!(p.state(), InputState::Idle);
}

#[test]
fn test_numeric_escapes() {
    let mut p = ConsoleProtocol::new(true);
    let ev = feed_all(&mut p, b"\x1b[1~\x1b[3~\x1b[4~\x1b[5~\x1b[6~\x1b[2H");
    assert_eq!(
        edits(&ev),
        [
            EditIntent::Home,
            EditIntent::DeleteForward,
            EditIntent::End,
            EditIntent::PageUp,
            EditIntent::PageDown,
            EditIntent::ClearLine,
        ]
    );
}

#[test]
fn test_line_number_escape() {
    let mut p = ConsoleProtocol::new(true);
    let ev = feed_all(&mut p, b"\x1b[12d");
    assert_eq!(edits(&ev), [EditIntent::SetLineNumber(12)]);
    assert_eq!(p.line_number(), Some(12));
}

#[test]
fn test_keypad_escapes() {
    let mut p = ConsoleProtocol::new(true);
    feed_all(&mut p, b"6\x1bOj7");
    assert_eq!(p.line().as_str(), "6*7");

    let ev = feed_all(&mut p, b"\x1bOM");
    assert_eq!(ev, [ConsoleEvent::Execute { line: "6*7".into(), echo: true }]);
}

#[test]
fn test_esc_newline_never_executes() {
    let mut p = ConsoleProtocol::new(true);
    let ev = feed_all(&mut p, b"a\x1b\n");
    assert_eq!(ev.last(), Some(&ConsoleEvent::Edit(EditIntent::NewLine)));
    assert_eq!(p.line().as_str(), "a\n");
}

#[test]
fn test_nul_abandons_escape() {
    let mut p = ConsoleProtocol::new(true);
    feed_all(&mut p, &[ESC, b'[', 0]);
    assert_eq!(p.state(), InputState::Idle);
    assert_eq!(feed_all(&mut p, b"D"), [ConsoleEvent::Edit(EditIntent::Insert(b'D'))]);
}

#[test]
fn test_delete_and_tab() {
    let mut p = ConsoleProtocol::new(true);
    feed_all(&mut p, b"ab\x7f\x08\t");
    assert_eq!(p.line().as_str(), "    ");
}

#[test]
fn test_enq_only_on_empty_line() {
    let mut p = ConsoleProtocol::new(true);
    assert_eq!(p.feed(ENQ), Some(ConsoleEvent::Banner));
    feed_all(&mut p, b"x");
    assert_eq!(p.feed(ENQ), None);
}

#[test]
fn test_dle_hides_one_line() {
    let mut p = ConsoleProtocol::new(true);
    p.feed(DLE);
    assert!(!p.shows_input());
    let ev = feed_all(&mut p, b"1\r");
    assert_eq!(ev.last(), Some(&ConsoleEvent::Execute { line: "1".into(), echo: false }));
    assert!(p.shows_input());
}

#[test]
fn test_mid_line_enter_inserts_newline() {
    let mut p = ConsoleProtocol::new(true);
    let ev = feed_all(&mut p, b"ab\x1b[D\r");
    assert_eq!(ev.last(), Some(&ConsoleEvent::Edit(EditIntent::NewLine)));
    assert_eq!(p.line().as_str(), "a\nb");
}

#[test]
fn test_packet_exit_restores_line() {
    let mut p = ConsoleProtocol::new(true);
    feed_all(&mut p, b"draft");
    assert_eq!(feed_all(&mut p, &[DLE, SOH]), [ConsoleEvent::PacketStarted]);
    assert!(p.line().is_empty());

    assert!(p.packet_exit());
    assert_eq!(p.line().as_str(), "draft");
    assert!(!p.packet_exit());
}

#[test]
fn test_zero_length_packet_completes_on_header() {
    let mut p = ConsoleProtocol::new(true);
    let ev = feed_all(&mut p, &[DLE, SOH, 0x80, 0x00]);
    assert!(matches!(
        ev.last(),
        Some(ConsoleEvent::Packet(packet)) if packet.kind == PacketType::Data && packet.payload.is_empty()
    ));
}

// ── through the runtime ──────────────────────────────────────────────────

#[test]
fn test_typed_line_echoes_result() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let engine = FakeEngine::new().with_result("1+1", Ok(json!(2)));
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());
    rt.set_editor(Box::new(EchoEditor));

    type_console(&platform, &bridge, b"1+1\r\n");
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), b"1+1\n=2\n");
    assert_eq!(rt.engine().evals, ["1+1"]);
}

#[test]
fn test_hidden_line_runs_without_output() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());
    rt.set_editor(Box::new(EchoEditor));

    type_console(&platform, &bridge, b"\x10reset()\n");
    rt.idle();

    assert!(console_bytes(&platform, &bridge).is_empty());
    assert_eq!(rt.engine().evals, ["reset()"]);
}

#[test]
fn test_uncaught_error_is_printed() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let engine = FakeEngine::new().with_result("boom()", Err(EvalError::Exception("Error: boom".into())));
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    type_console(&platform, &bridge, b"boom()\r");
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), b"Uncaught Error: boom\n");
}

#[test]
fn test_interrupted_line_reported_once() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let engine = FakeEngine::new().with_result("while(1);", Err(EvalError::Interrupted));
    let mut rt = boot(&bridge, &platform, engine, MemStore::new());

    type_console(&platform, &bridge, b"while(1);\r");
    rt.loop_once();
    rt.loop_once();

    assert_eq!(console_bytes(&platform, &bridge), b"Execution Interrupted\n");
}

#[test]
fn test_enq_prints_banner() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, &[ENQ]);
    rt.idle();

    assert_eq!(console_bytes(&platform, &bridge), b"Test v1\n");
}

#[test]
fn test_ctrl_c_clears_pending_line() {
    let bridge = IoBridge::new();
    let platform = FakePlatform::draining(&bridge);
    let mut rt = boot(&bridge, &platform, FakeEngine::new(), MemStore::new());

    type_console(&platform, &bridge, b"half typed");
    rt.loop_once();
    assert_eq!(rt.console().line().as_str(), "half typed");

    type_console(&platform, &bridge, &[3]);
    assert!(bridge.is_interrupted());
    rt.loop_once();

    assert!(rt.console().line().is_empty());
    assert!(!bridge.is_interrupted());
    assert!(rt.engine().evals.is_empty());
}
