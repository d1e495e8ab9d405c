//! Line-editing intents produced by the console decoder.

/// One decoded editing action, forwarded to the line editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditIntent {
    /// Printable byte inserted at the cursor.
    Insert(u8),
    /// Tab; expands to four spaces.
    Indent,
    /// Newline inserted without executing (ESC LF).
    NewLine,
    /// Backspace.
    Delete,
    DeleteForward,
    CursorLeft,
    CursorRight,
    CursorUp,
    CursorDown,
    Home,
    End,
    PageUp,
    PageDown,
    /// Erase the whole input line (ESC [ 2 H).
    ClearLine,
    /// Line number for the code that follows (ESC [ n d).
    SetLineNumber(u16),
}

impl EditIntent {
    /// Whether this intent changes the line contents.
    pub fn edits_text(self) -> bool {
        matches!(
            self,
            Self::Insert(_) | Self::Indent | Self::NewLine | Self::Delete | Self::DeleteForward | Self::ClearLine
        )
    }
}
