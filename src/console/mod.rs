//! Console channel: input decoding, binary packets and line editing.

pub mod error;
pub mod intent;
pub mod json;
pub mod line_buffer;
pub mod packet;
pub mod protocol;
pub mod transfer;

pub use error::PacketError;
pub use intent::EditIntent;
pub use json::parse_liberal;
pub use line_buffer::LineBuffer;
pub use packet::{Packet, PacketType};
pub use protocol::{ConsoleEvent, ConsoleProtocol, InputState};
pub use transfer::{FileRecvRequest, FileSendRequest, FileTransfer};

/// Renders the input line. Receives every decoded intent after it has been
/// applied to `line`.
pub trait LineEditor {
    fn on_intent(&mut self, intent: EditIntent, line: &LineBuffer, out: &mut dyn FnMut(&[u8]));

    /// The line was accepted for execution.
    fn on_execute(&mut self, _out: &mut dyn FnMut(&[u8])) {}
}

/// Editor that draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEditor;

impl LineEditor for NoEditor {
    fn on_intent(&mut self, _intent: EditIntent, _line: &LineBuffer, _out: &mut dyn FnMut(&[u8])) {}
}

/// Plain VT100 echo of the input line.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoEditor;

impl EchoEditor {
    fn redraw_tail(line: &LineBuffer, extra_blank: bool, out: &mut dyn FnMut(&[u8])) {
        let tail = &line.as_bytes()[line.cursor()..];
        out(tail);
        let mut back = tail.len();
        if extra_blank {
            out(b" ");
            back += 1;
        }
        if back > 0 {
            out(alloc::format!("\x1b[{}D", back).as_bytes());
        }
    }
}

impl LineEditor for EchoEditor {
    fn on_intent(&mut self, intent: EditIntent, line: &LineBuffer, out: &mut dyn FnMut(&[u8])) {
        match intent {
            EditIntent::Insert(b) => {
                out(&[b]);
                Self::redraw_tail(line, false, out);
            }
            EditIntent::Indent => {
                out(b"    ");
                Self::redraw_tail(line, false, out);
            }
            EditIntent::NewLine => out(b"\n:"),
            EditIntent::Delete => {
                out(b"\x08");
                Self::redraw_tail(line, true, out);
            }
            EditIntent::DeleteForward => Self::redraw_tail(line, true, out),
            EditIntent::CursorLeft => out(b"\x1b[D"),
            EditIntent::CursorRight => out(b"\x1b[C"),
            EditIntent::ClearLine => out(b"\x1b[2K\r"),
            _ => {}
        }
    }

    fn on_execute(&mut self, out: &mut dyn FnMut(&[u8])) {
        out(b"\n");
    }
}
