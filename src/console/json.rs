//! Liberal JSON for packet payloads.
//!
//! Accepts what a script literal would: unquoted object keys and
//! single-quoted strings, e.g. `{fn:'a.txt',s:3}`. The text is normalised
//! to strict JSON and handed to `serde_json`.

use alloc::string::String;
use serde_json::Value;

/// Parse loosely written JSON. Returns `None` on any syntax error.
pub fn parse_liberal(text: &str) -> Option<Value> {
    serde_json::from_str(&normalize(text)?).ok()
}

/// Rewrite to strict JSON. `None` if a string is left unterminated.
fn normalize(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len() + 8);
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' => {
                out.push('"');
                let mut closed = false;
                while let Some(s) = chars.next() {
                    match s {
                        '\\' => {
                            let escaped = chars.next()?;
                            if escaped == '\'' {
                                out.push('\'');
                            } else {
                                out.push('\\');
                                out.push(escaped);
                            }
                        }
                        '"' if c == '\'' => out.push_str("\\\""),
                        s if s == c => {
                            closed = true;
                            break;
                        }
                        s => out.push(s),
                    }
                }
                if !closed {
                    return None;
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let mut ident = String::new();
                ident.push(c);
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' || n == '$' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let mut ws = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_whitespace() {
                        ws.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek() == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else if ident == "undefined" {
                    out.push_str("null");
                } else {
                    out.push_str(&ident);
                }
                out.push_str(&ws);
            }
            c => out.push(c),
        }
    }
    Some(out)
}
