use std::{io, sync::Arc};

use crate::types::{PacketType, MAX_REMAINING_LENGTH};

/// Errors raised while turning wire bytes into packets.
///
/// Every variant is fatal to the packet being parsed. The codec never retries.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DecodeError {
    #[error("[{0}] insufficient buffer size, expected at least 2, got {1}")]
    InsufficientBuffer(PacketType, usize),
    #[error("Invalid packet type, expected {expected}, got {actual}")]
    InvalidType { expected: PacketType, actual: u8 },
    #[error("[{kind}] invalid flags, expected {expected}, got {actual}")]
    InvalidFlags { kind: PacketType, expected: u8, actual: u8 },
    #[error("[{kind}] remaining length ({remaining_length}) is greater than remaining buffer ({available})")]
    RemainingLengthExceeded { kind: PacketType, remaining_length: usize, available: usize, consumed: usize },
    #[error("[{kind}] expected zero remaining length, got {remaining_length}")]
    UnexpectedRemainingLength { kind: PacketType, remaining_length: usize, consumed: usize },
    #[error("Invalid length")]
    InvalidLength,
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("Invalid protocol")]
    InvalidProtocol,
    #[error("Unsupported protocol level")]
    UnsupportedProtocolLevel,
    #[error("Connect frame's reserved flag is set")]
    ConnectReservedFlagSet,
    #[error("ConnectAck frame's reserved flag is set")]
    ConnAckReservedFlagSet,
    #[error("Invalid client id")]
    InvalidClientId,
    #[error("Invalid QoS value {0}")]
    InvalidQoS(u8),
    #[error("Invalid connect return code {0}")]
    InvalidReturnCode(u8),
    #[error("Topic name is empty")]
    EmptyTopic,
    #[error("Topic filter is empty")]
    EmptyTopicFilter,
    #[error("Unsupported packet type {0}")]
    UnsupportedPacketType(u8),
    #[error("Max size exceeded")]
    MaxSizeExceeded,
    #[error("utf8 error")]
    Utf8Error,
    #[error("io error, {:?}", _0)]
    Io(Arc<io::Error>),
}

impl DecodeError {
    /// Bytes consumed from the source before the error was detected, when known.
    ///
    /// Streaming callers use this to tell a short buffer apart from a corrupted one.
    pub fn consumed(&self) -> Option<usize> {
        match self {
            DecodeError::RemainingLengthExceeded { consumed, .. }
            | DecodeError::UnexpectedRemainingLength { consumed, .. } => Some(*consumed),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> DecodeError {
        DecodeError::Io(Arc::new(e))
    }
}

/// Errors raised while writing packets into a destination buffer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EncodeError {
    #[error("[{kind}] insufficient buffer size, expected {expected}, got {actual}")]
    BufferTooSmall { kind: PacketType, expected: usize, actual: usize },
    #[error("remaining length ({0}) out of bound (max {}, min 0)", MAX_REMAINING_LENGTH)]
    RemainingLengthOutOfBound(usize),
    #[error("Packet is bigger than Maximum Packet Size")]
    OverMaxPacketSize,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("Packet id is required")]
    PacketIdRequired,
    #[error("io error, {:?}", _0)]
    Io(Arc<io::Error>),
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> EncodeError {
        EncodeError::Io(Arc::new(e))
    }
}
