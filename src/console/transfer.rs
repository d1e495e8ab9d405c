//! File transfer descriptors carried by `FileSend`/`FileRecv` packets.

use crate::storage::{FileHandle, FileTarget};
use alloc::string::String;
use serde::Deserialize;
use serde_json::Value;

/// `FileSend` payload: `{fn:"name", s:size, fs:bool}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FileSendRequest {
    #[serde(rename = "fn", alias = "name")]
    pub name: String,
    #[serde(rename = "s", alias = "size", default)]
    pub size: usize,
    #[serde(default)]
    pub fs: bool,
}

/// `FileRecv` payload: `{fn:"name", fs:bool}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct FileRecvRequest {
    #[serde(rename = "fn", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub fs: bool,
}

impl FileSendRequest {
    /// Decode from a parsed payload. Zero-sized sends are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value::<Self>(value).ok().filter(|r| r.size != 0)
    }

    pub fn target(&self) -> FileTarget {
        target(self.fs)
    }
}

impl FileRecvRequest {
    pub fn from_value(value: Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn target(&self) -> FileTarget {
        target(self.fs)
    }
}

fn target(fs: bool) -> FileTarget {
    if fs {
        FileTarget::Filesystem
    } else {
        FileTarget::Storage
    }
}

/// An open inbound transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTransfer {
    pub handle: FileHandle,
    pub name: String,
    pub size: usize,
    pub offset: usize,
}

impl FileTransfer {
    pub fn is_complete(&self) -> bool {
        self.offset >= self.size
    }
}
