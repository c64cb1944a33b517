#![deny(unsafe_code)]

//! MQTT v3.1.1 packet codec
//!
//! ## Core Features:
//! - **Byte-exact wire format**: every control packet from CONNECT to DISCONNECT
//! - **Buffer based API**: [`Packet::len`] sizes a destination, [`Packet::encode`] fills it and
//!   [`Packet::decode`] reads one packet from the front of a slice
//! - **Bounds checked**: every length read from the network is validated before it is trusted
//! - **Tokio Integration**: [`Codec`] plugs into `tokio_util::codec` framed readers and writers
//!
//! ## Architecture Components:
//! - [`header`]: fixed header with the variable length remaining length field
//! - [`Packet`]: one tagged union over all control packet kinds
//! - Error handling with dedicated [`EncodeError`]/[`DecodeError`] types
//!
//! ```
//! use mqttc_codec::Packet;
//!
//! let mut buf = vec![0u8; Packet::PingRequest.len()];
//! assert_eq!(Packet::PingRequest.encode(&mut buf).unwrap(), 2);
//! assert_eq!(Packet::decode(&buf).unwrap(), (Packet::PingRequest, 2));
//! ```

#[macro_use]
mod utils;

/// Error types for encoding/decoding operations
pub mod error;

/// Shared types and constants for MQTT protocol
pub mod types;

pub mod header;

mod codec;
mod decode;
mod encode;
mod packet;

pub use self::codec::Codec;
pub use self::error::{DecodeError, EncodeError};
pub use self::packet::{
    Connect, ConnectAck, ConnectAckReason, LastWill, Packet, Publish, SubscribeReturnCode,
};
pub use self::types::{ConnectAckFlags, ConnectFlags, FixedHeader, PacketType, QoS, MAX_REMAINING_LENGTH};
