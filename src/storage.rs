//! File store seam used by the packet file transfers.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

/// Where a transferred file lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FileTarget {
    /// Flat flash storage (default).
    #[default]
    Storage,
    /// Mounted filesystem.
    Filesystem,
}

/// Open write handle returned by [`FileStore::open_write`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHandle(pub u32);

/// File store error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// F01: No such file
    NotFound,
    /// F02: Out of space
    NoSpace,
    /// F03: Device I/O failure
    Io,
    /// F04: Name rejected by the store
    InvalidName,
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "F01",
            Self::NoSpace => "F02",
            Self::Io => "F03",
            Self::InvalidName => "F04",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "file not found",
            Self::NoSpace => "no space",
            Self::Io => "I/O error",
            Self::InvalidName => "invalid file name",
        }
    }
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// Persistent storage collaborator.
pub trait FileStore {
    /// Create (or truncate) `name`, reserving `size` bytes.
    fn open_write(&mut self, name: &str, size: usize, target: FileTarget) -> Result<FileHandle, StoreError>;

    /// Write `data` at `offset`.
    fn write(&mut self, handle: FileHandle, offset: usize, data: &[u8]) -> Result<(), StoreError>;

    fn close(&mut self, handle: FileHandle);

    /// Copy up to `buf.len()` bytes from `offset`. `Ok(0)` means end of file.
    fn read_chunk(&mut self, name: &str, target: FileTarget, offset: usize, buf: &mut [u8]) -> Result<usize, StoreError>;
}

/// RAM-backed store. Contents are lost on reset.
#[derive(Default)]
pub struct RamStore {
    files: BTreeMap<String, Vec<u8>>,
    open: BTreeMap<u32, String>,
    next: u32,
}

impl RamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }
}

impl FileStore for RamStore {
    fn open_write(&mut self, name: &str, size: usize, _target: FileTarget) -> Result<FileHandle, StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidName);
        }
        self.files.insert(name.to_string(), vec![0; size]);
        self.next += 1;
        self.open.insert(self.next, name.to_string());
        Ok(FileHandle(self.next))
    }

    fn write(&mut self, handle: FileHandle, offset: usize, data: &[u8]) -> Result<(), StoreError> {
        let name = self.open.get(&handle.0).ok_or(StoreError::Io)?;
        let file = self.files.get_mut(name).ok_or(StoreError::NotFound)?;
        let end = offset.checked_add(data.len()).ok_or(StoreError::NoSpace)?;
        let dest = file.get_mut(offset..end).ok_or(StoreError::NoSpace)?;
        dest.copy_from_slice(data);
        Ok(())
    }

    fn close(&mut self, handle: FileHandle) {
        self.open.remove(&handle.0);
    }

    fn read_chunk(&mut self, name: &str, _target: FileTarget, offset: usize, buf: &mut [u8]) -> Result<usize, StoreError> {
        let file = self.files.get(name).ok_or(StoreError::NotFound)?;
        let rest = file.get(offset..).unwrap_or(&[]);
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }
}
