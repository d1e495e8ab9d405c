//! Console packet error types

/// Packet handling error with code and message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// P01: Type bits name no known packet
    UnknownType,
    /// P02: Payload is not the expected structure
    MalformedPayload,
    /// P03: Data packet without an open file transfer
    NoTransfer,
    /// P04: File store rejected the operation
    StoreFailed,
    /// P05: Evaluation raised an error
    EvalFailed,
    /// P06: Packet body did not arrive in time
    Timeout,
}

impl PacketError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownType => "P01",
            Self::MalformedPayload => "P02",
            Self::NoTransfer => "P03",
            Self::StoreFailed => "P04",
            Self::EvalFailed => "P05",
            Self::Timeout => "P06",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownType => "unknown packet type",
            Self::MalformedPayload => "malformed payload",
            Self::NoTransfer => "no file transfer open",
            Self::StoreFailed => "store failed",
            Self::EvalFailed => "evaluation failed",
            Self::Timeout => "packet timeout",
        }
    }
}

impl core::fmt::Display for PacketError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl From<crate::storage::StoreError> for PacketError {
    fn from(_: crate::storage::StoreError) -> Self {
        Self::StoreFailed
    }
}
