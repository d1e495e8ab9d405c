//! Console input decoder.
//!
//! Consumes console bytes one at a time. Outside a packet it classifies
//! control bytes and escape sequences into [`EditIntent`]s, keeping its own
//! copy of the input line so a completed line can be executed. `DLE SOH`
//! switches into packet mode: the pending line is set aside, the header
//! and payload are collected, and the finished [`Packet`] is handed back.
//!
//! ```text
//!              ESC            '['            digit
//!   Idle ──────────▶ HadEsc ──────▶ HadEscBracket ──────▶ HadEscBracketDigits
//!    │ │                │ 'O'                                   │ other
//!    │ │                ▼                                       ▼
//!    │ │             HadEscO ─────────── any ─────────────▶   Idle
//!    │ └─ DLE ─▶ HadDle ── SOH ─▶ PacketLen0 ─▶ PacketLen1 ─▶ PacketData
//!    └─ '\r' ─▶ HadCr (a following '\n' is swallowed)
//! ```

use super::intent::EditIntent;
use super::line_buffer::LineBuffer;
use super::packet::{decode_header, Packet, DLE, ENQ, ESC, SOH};
use alloc::string::String;

/// Decoder state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputState {
    Idle,
    HadCr,
    PacketLen0,
    PacketLen1,
    PacketData,
    HadDle,
    HadEsc,
    HadEscO,
    HadEscBracket,
    HadEscBracketDigits,
}

impl InputState {
    pub fn is_packet_transfer(self) -> bool {
        matches!(self, Self::PacketLen0 | Self::PacketLen1 | Self::PacketData)
    }
}

/// What one input byte produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ConsoleEvent {
    /// Line contents or cursor changed.
    Edit(EditIntent),
    /// A complete line is ready to evaluate.
    Execute { line: String, echo: bool },
    /// ENQ on an empty line.
    Banner,
    /// DLE SOH seen; the packet start timeout should be armed.
    PacketStarted,
    /// A header or payload byte arrived; the inter-byte timeout should be re-armed.
    PacketProgress,
    /// Packet complete. The decoder is back in `Idle` with the line restored.
    Packet(Packet),
}

pub struct ConsoleProtocol {
    state: InputState,
    packet_header: u16,
    esc_number: u16,
    line: LineBuffer,
    saved_line: LineBuffer,
    line_number: Option<u16>,
    echo: bool,
    echo_off_for_line: bool,
}

impl ConsoleProtocol {
    pub const fn new(echo: bool) -> Self {
        Self {
            state: InputState::Idle,
            packet_header: 0,
            esc_number: 0,
            line: LineBuffer::new(),
            saved_line: LineBuffer::new(),
            line_number: None,
            echo,
            echo_off_for_line: false,
        }
    }

    #[inline]
    pub fn state(&self) -> InputState {
        self.state
    }

    #[inline]
    pub fn in_packet_transfer(&self) -> bool {
        self.state.is_packet_transfer()
    }

    pub fn line(&self) -> &LineBuffer {
        &self.line
    }

    /// Line number set by `ESC [ n d`, if any.
    pub fn line_number(&self) -> Option<u16> {
        self.line_number
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    /// Whether typed text is currently shown.
    pub fn shows_input(&self) -> bool {
        self.echo && !self.echo_off_for_line
    }

    /// Drop the current input line.
    pub fn clear_line(&mut self) {
        self.line.clear();
        self.line_number = None;
    }

    /// Leave packet mode, restoring the set-aside line. Returns whether a
    /// packet was in progress.
    pub fn packet_exit(&mut self) -> bool {
        let was_packet = self.in_packet_transfer();
        if was_packet {
            self.line = core::mem::take(&mut self.saved_line);
        }
        self.state = InputState::Idle;
        self.packet_header = 0;
        was_packet
    }

    /// Feed one console byte.
    pub fn feed(&mut self, ch: u8) -> Option<ConsoleEvent> {
        match self.state {
            InputState::PacketLen0 => {
                // DLE on the empty line turned echo off; the packet line is always empty
                self.echo_off_for_line = false;
                self.packet_header = (ch as u16) << 8;
                self.state = InputState::PacketLen1;
                return Some(ConsoleEvent::PacketProgress);
            }
            InputState::PacketLen1 => {
                self.packet_header |= ch as u16;
                let (_, len) = decode_header(self.packet_header);
                if len == 0 {
                    return Some(self.finish_packet());
                }
                self.state = InputState::PacketData;
                return Some(ConsoleEvent::PacketProgress);
            }
            InputState::PacketData => {
                self.line.push(ch);
                let (_, len) = decode_header(self.packet_header);
                if self.line.len() >= len {
                    return Some(self.finish_packet());
                }
                return Some(ConsoleEvent::PacketProgress);
            }
            _ => {}
        }

        match ch {
            0 => {
                self.state = InputState::Idle;
                None
            }
            SOH => {
                if self.state == InputState::HadDle {
                    self.saved_line = core::mem::take(&mut self.line);
                    self.state = InputState::PacketLen0;
                    Some(ConsoleEvent::PacketStarted)
                } else {
                    None
                }
            }
            // Ctrl-C is latched by the interrupt side
            3 => None,
            ENQ => self.line.is_empty().then_some(ConsoleEvent::Banner),
            DLE => {
                if self.line.is_empty() {
                    self.echo_off_for_line = true;
                }
                self.state = InputState::HadDle;
                None
            }
            ESC => {
                self.state = InputState::HadEsc;
                None
            }
            _ => match self.state {
                InputState::HadEsc => {
                    self.state = InputState::Idle;
                    match ch {
                        b'O' => {
                            self.state = InputState::HadEscO;
                            None
                        }
                        b'[' => {
                            self.state = InputState::HadEscBracket;
                            None
                        }
                        b'\n' => self.new_line(false),
                        _ => None,
                    }
                }
                InputState::HadEscO => {
                    self.state = InputState::Idle;
                    match ch {
                        b'F' => self.edit(EditIntent::End),
                        b'H' => self.edit(EditIntent::Home),
                        b'o' => self.edit(EditIntent::Insert(b'/')),
                        b'j' => self.edit(EditIntent::Insert(b'*')),
                        b'm' => self.edit(EditIntent::Insert(b'-')),
                        b'k' => self.edit(EditIntent::Insert(b'+')),
                        b'M' => self.feed(b'\r'),
                        _ => None,
                    }
                }
                InputState::HadEscBracket => {
                    self.state = InputState::Idle;
                    match ch {
                        b'0'..=b'9' => {
                            self.esc_number = (ch - b'0') as u16;
                            self.state = InputState::HadEscBracketDigits;
                            None
                        }
                        b'D' => self.edit(EditIntent::CursorLeft),
                        b'C' => self.edit(EditIntent::CursorRight),
                        b'A' => self.edit(EditIntent::CursorUp),
                        b'B' => self.edit(EditIntent::CursorDown),
                        b'F' => self.edit(EditIntent::End),
                        b'H' => self.edit(EditIntent::Home),
                        _ => None,
                    }
                }
                InputState::HadEscBracketDigits => {
                    if ch.is_ascii_digit() {
                        self.esc_number = self.esc_number.saturating_mul(10).saturating_add((ch - b'0') as u16);
                        return None;
                    }
                    self.state = InputState::Idle;
                    match (ch, self.esc_number) {
                        (b'H', 2) => self.edit(EditIntent::ClearLine),
                        (b'~', 1) => self.edit(EditIntent::Home),
                        (b'~', 3) => self.edit(EditIntent::DeleteForward),
                        (b'~', 4) => self.edit(EditIntent::End),
                        (b'~', 5) => self.edit(EditIntent::PageUp),
                        (b'~', 6) => self.edit(EditIntent::PageDown),
                        (b'd', n) => self.edit(EditIntent::SetLineNumber(n)),
                        _ => None,
                    }
                }
                _ => {
                    let had_cr = self.state == InputState::HadCr;
                    self.state = InputState::Idle;
                    match ch {
                        8 | 0x7F => self.edit(EditIntent::Delete),
                        b'\n' if had_cr => None,
                        b'\r' | b'\n' => {
                            if ch == b'\r' {
                                self.state = InputState::HadCr;
                            }
                            self.new_line(true)
                        }
                        b'\t' => self.edit(EditIntent::Indent),
                        0x20..=0xFF => self.edit(EditIntent::Insert(ch)),
                        _ => None,
                    }
                }
            },
        }
    }

    fn finish_packet(&mut self) -> ConsoleEvent {
        let (kind, _) = decode_header(self.packet_header);
        let payload = self.line.take();
        self.packet_exit();
        ConsoleEvent::Packet(Packet { kind, payload })
    }

    /// Apply an intent to the local line and report it.
    fn edit(&mut self, intent: EditIntent) -> Option<ConsoleEvent> {
        match intent {
            EditIntent::Insert(b) => self.line.insert(b),
            EditIntent::Indent => self.line.insert_str("    "),
            EditIntent::NewLine => self.line.insert(b'\n'),
            EditIntent::Delete => {
                self.line.backspace();
            }
            EditIntent::DeleteForward => {
                self.line.delete_forward();
            }
            EditIntent::CursorLeft => {
                self.line.cursor_left();
            }
            EditIntent::CursorRight => {
                self.line.cursor_right();
            }
            EditIntent::Home => self.line.home(),
            EditIntent::End => self.line.end(),
            EditIntent::ClearLine => self.clear_line(),
            EditIntent::SetLineNumber(n) => self.line_number = Some(n),
            // history and paging belong to the editor
            EditIntent::CursorUp | EditIntent::CursorDown | EditIntent::PageUp | EditIntent::PageDown => {}
        }
        Some(ConsoleEvent::Edit(intent))
    }

    fn new_line(&mut self, execute: bool) -> Option<ConsoleEvent> {
        if execute && self.line.at_end() && bracket_depth(self.line.as_bytes()) <= 0 {
            let echo = self.shows_input();
            let line = String::from(self.line.to_string_lossy().trim_end());
            self.clear_line();
            self.echo_off_for_line = false;
            return Some(ConsoleEvent::Execute { line, echo });
        }
        self.edit(EditIntent::NewLine)
    }
}

impl Default for ConsoleProtocol {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Open brackets minus closed ones, ignoring quoted text and comments.
pub fn bracket_depth(text: &[u8]) -> i32 {
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    let mut iter = text.iter().copied().peekable();
    while let Some(b) = iter.next() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' | b'`' => quote = Some(b),
            b'/' if iter.peek() == Some(&b'/') => {
                // line comment runs to the newline
                for c in iter.by_ref() {
                    if c == b'\n' {
                        break;
                    }
                }
            }
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            _ => {}
        }
    }
    depth
}
