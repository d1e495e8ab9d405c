//! Line buffer for console input

use alloc::string::String;
use alloc::vec::Vec;

/// Line input buffer with an edit cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineBuffer {
    buf: Vec<u8>,
    cursor: usize,
}

impl LineBuffer {
    /// Create empty buffer
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            cursor: 0,
        }
    }

    /// Append a character at the end, moving the cursor there
    pub fn push(&mut self, c: u8) {
        self.buf.push(c);
        self.cursor = self.buf.len();
    }

    /// Insert a character at the cursor
    pub fn insert(&mut self, c: u8) {
        self.buf.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.insert(b);
        }
    }

    /// Remove the character before the cursor
    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.buf.remove(self.cursor);
        true
    }

    /// Remove the character under the cursor
    pub fn delete_forward(&mut self) -> bool {
        if self.cursor >= self.buf.len() {
            return false;
        }
        self.buf.remove(self.cursor);
        true
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_left(&mut self) -> bool {
        let moved = self.cursor > 0 && self.buf[self.cursor - 1] != b'\n';
        if moved {
            self.cursor -= 1;
        }
        moved
    }

    pub fn cursor_right(&mut self) -> bool {
        let moved = self.cursor < self.buf.len() && self.buf[self.cursor] != b'\n';
        if moved {
            self.cursor += 1;
        }
        moved
    }

    /// Start of the current line
    pub fn home(&mut self) {
        while self.cursor_left() {}
    }

    /// End of the current line
    pub fn end(&mut self) {
        while self.cursor_right() {}
    }

    pub fn at_end(&self) -> bool {
        self.cursor == self.buf.len()
    }

    /// Clear buffer
    pub fn clear(&mut self) {
        self.buf.clear();
        self.cursor = 0;
    }

    /// Set buffer contents from string
    pub fn set(&mut self, s: &str) {
        self.buf.clear();
        self.buf.extend_from_slice(s.as_bytes());
        self.cursor = self.buf.len();
    }

    /// Get buffer as string slice
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf).unwrap_or("")
    }

    /// Get buffer length
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the contents, leaving the buffer empty
    pub fn take(&mut self) -> Vec<u8> {
        self.cursor = 0;
        core::mem::take(&mut self.buf)
    }

    /// Contents as text with invalid UTF-8 replaced
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buf).into_owned()
    }
}
