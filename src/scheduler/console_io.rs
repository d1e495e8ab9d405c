//! Console bytes, line execution and packet handling.

use super::Runtime;
use crate::config::SysTime;
use crate::console::packet::{frame, ACK, MAX_PAYLOAD, NAK};
use crate::console::{parse_liberal, ConsoleEvent, FileRecvRequest, FileSendRequest, FileTransfer, Packet, PacketError, PacketType};
use crate::engine::{Engine, EvalError};
use crate::hal::Platform;
use crate::storage::FileStore;
use crate::timers::TimerAction;
use alloc::string::String;
use alloc::vec;
use serde_json::Value;

impl<'a, P: Platform + ?Sized, E: Engine, S: FileStore> Runtime<'a, P, E, S> {
    /// Feed one byte from the console device.
    pub fn handle_console_byte(&mut self, byte: u8) {
        let Some(event) = self.console.feed(byte) else {
            return;
        };
        let bridge = self.services.bridge;
        let platform = self.services.platform;
        let console = bridge.console_device();

        match event {
            ConsoleEvent::Edit(intent) => {
                if self.console.shows_input() {
                    let mut out = |bytes: &[u8]| bridge.transmit_bytes(platform, console, bytes);
                    self.editor.on_intent(intent, self.console.line(), &mut out);
                }
            }
            ConsoleEvent::Execute { line, echo } => {
                if echo {
                    let mut out = |bytes: &[u8]| bridge.transmit_bytes(platform, console, bytes);
                    self.editor.on_execute(&mut out);
                }
                self.execute_line(&line, echo);
            }
            ConsoleEvent::Banner => {
                let mut line = String::from(self.config.banner);
                line.push('\n');
                self.print(&line);
            }
            ConsoleEvent::PacketStarted => {
                bridge.set_packet_transfer(true);
                self.arm_packet_timer(self.config.packet_start_timeout);
            }
            ConsoleEvent::PacketProgress => {
                self.arm_packet_timer(self.config.packet_byte_timeout);
            }
            ConsoleEvent::Packet(packet) => {
                self.cancel_packet_timer();
                self.process_packet(packet);
                bridge.set_packet_transfer(false);
            }
        }
    }

    /// Evaluate a completed console line.
    fn execute_line(&mut self, line: &str, echo: bool) {
        if line.is_empty() {
            return;
        }
        match self.engine.evaluate(&mut self.services, line) {
            Ok(value) => {
                if echo {
                    let mut out = String::from("=");
                    out.push_str(&render_value(&value));
                    out.push('\n');
                    self.print(&out);
                }
            }
            Err(EvalError::Interrupted) => self.exec_interrupted = true,
            Err(e) => {
                let text = alloc::format!("{}\n", e);
                self.print(&text);
            }
        }
    }

    // ── packets ──────────────────────────────────────────────────────────

    fn process_packet(&mut self, packet: Packet) {
        let kind = packet.kind;
        let result = match kind {
            PacketType::Eval => self.packet_eval(&packet),
            PacketType::Event => self.packet_event(&packet),
            PacketType::FileSend => self.packet_file_send(&packet),
            PacketType::Data => self.packet_data(&packet),
            PacketType::FileRecv => self.packet_file_recv(&packet),
            PacketType::Response | PacketType::Reserved(_) => Err(PacketError::UnknownType),
        };
        if let Err(e) = result {
            log::debug!("{:?} packet rejected: {}", kind, e);
            self.send_byte(NAK);
        }
    }

    fn packet_eval(&mut self, packet: &Packet) -> Result<(), PacketError> {
        match self.engine.evaluate(&mut self.services, packet.payload_str()) {
            Ok(value) => {
                self.send_byte(ACK);
                let text = render_value(&value);
                self.send_packet(PacketType::Response, text.as_bytes());
                Ok(())
            }
            Err(e) => {
                self.send_byte(NAK);
                if e == EvalError::Interrupted {
                    self.exec_interrupted = true;
                } else {
                    let text = alloc::format!("{}\n", e);
                    self.print(&text);
                }
                Ok(())
            }
        }
    }

    fn packet_event(&mut self, packet: &Packet) -> Result<(), PacketError> {
        let value = parse_liberal(packet.payload_str())
            .filter(Value::is_object)
            .ok_or(PacketError::MalformedPayload)?;
        if !self.engine.emit(&mut self.services, "E", "packet", &[value]) {
            return Err(PacketError::EvalFailed);
        }
        self.send_byte(ACK);
        Ok(())
    }

    fn packet_file_send(&mut self, packet: &Packet) -> Result<(), PacketError> {
        self.file_end();
        let request = parse_liberal(packet.payload_str())
            .and_then(FileSendRequest::from_value)
            .ok_or(PacketError::MalformedPayload)?;
        let handle = self.store.open_write(&request.name, request.size, request.target())?;
        log::debug!("receiving {} ({} bytes)", request.name, request.size);
        self.transfer = Some(FileTransfer {
            handle,
            name: request.name,
            size: request.size,
            offset: 0,
        });
        self.arm_file_timer();
        self.send_byte(ACK);
        Ok(())
    }

    fn packet_data(&mut self, packet: &Packet) -> Result<(), PacketError> {
        let Some(transfer) = self.transfer.as_mut() else {
            return Err(PacketError::NoTransfer);
        };
        let written = self.store.write(transfer.handle, transfer.offset, &packet.payload);
        transfer.offset += packet.payload.len();
        let complete = transfer.is_complete();
        if complete {
            self.file_end();
        } else {
            self.arm_file_timer();
        }
        written?;
        self.send_byte(ACK);
        Ok(())
    }

    fn packet_file_recv(&mut self, packet: &Packet) -> Result<(), PacketError> {
        let request = parse_liberal(packet.payload_str())
            .and_then(FileRecvRequest::from_value)
            .ok_or(PacketError::MalformedPayload)?;
        let target = request.target();
        let mut buf = vec![0u8; self.config.file_chunk.clamp(1, MAX_PAYLOAD)];
        // NAK if the file can't be read at all
        let mut n = self.store.read_chunk(&request.name, target, 0, &mut buf)?;
        self.send_byte(ACK);
        let mut offset = 0;
        while n > 0 {
            self.send_packet(PacketType::Data, &buf[..n]);
            offset += n;
            n = match self.store.read_chunk(&request.name, target, offset, &mut buf) {
                Ok(n) => n,
                Err(e) => {
                    log::warn!("read {} at {}: {}", request.name, offset, e);
                    0
                }
            };
        }
        self.send_packet(PacketType::Data, &[]);
        Ok(())
    }

    // ── timeouts & teardown ──────────────────────────────────────────────

    fn arm_packet_timer(&mut self, timeout: SysTime) {
        self.cancel_packet_timer();
        let time = self.services.deadline(timeout);
        self.packet_timer = Some(self.services.timers.add(time, None, TimerAction::PacketTimeout));
    }

    fn cancel_packet_timer(&mut self) {
        if let Some(id) = self.packet_timer.take() {
            self.services.timers.remove(id);
        }
    }

    fn arm_file_timer(&mut self) {
        if let Some(id) = self.file_timer.take() {
            self.services.timers.remove(id);
        }
        let time = self.services.deadline(self.config.file_timeout);
        self.file_timer = Some(self.services.timers.add(time, None, TimerAction::FileTimeout));
    }

    /// Incomplete packet timed out.
    pub(super) fn packet_timeout(&mut self) {
        log::debug!("packet timeout");
        self.send_byte(NAK);
        self.packet_exit();
    }

    /// Leave packet mode and restore the input line.
    pub fn packet_exit(&mut self) {
        self.cancel_packet_timer();
        self.console.packet_exit();
        self.services.bridge.set_packet_transfer(false);
    }

    /// Close any inbound file transfer.
    pub fn file_end(&mut self) {
        if let Some(transfer) = self.transfer.take() {
            self.store.close(transfer.handle);
            log::debug!("closed {} at {}/{}", transfer.name, transfer.offset, transfer.size);
        }
        if let Some(id) = self.file_timer.take() {
            self.services.timers.remove(id);
        }
    }

    fn send_byte(&mut self, byte: u8) {
        let bridge = self.services.bridge;
        bridge.transmit(self.services.platform, bridge.console_device(), byte);
    }

    fn send_packet(&mut self, kind: PacketType, data: &[u8]) {
        let bridge = self.services.bridge;
        bridge.transmit_bytes(self.services.platform, bridge.console_device(), &frame(kind, data));
    }
}

/// Result text for the console and `Response` packets.
fn render_value(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| String::from("undefined"))
}
