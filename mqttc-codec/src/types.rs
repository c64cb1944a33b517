use std::fmt;
use std::num::NonZeroU16;

use bytes::Bytes;
use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub(crate) const MQTT: &[u8] = b"MQTT";
pub const MQTT_LEVEL_311: u8 = 4;
pub(crate) const WILL_QOS_SHIFT: u8 = 3;

/// Largest value the four byte remaining length field can carry
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

prim_enum! {
    /// Control packet type, the high nibble of the fixed header byte
    #[derive(Hash, PartialOrd, Ord)]
    pub enum PacketType {
        Connect = 1,
        ConnAck = 2,
        Publish = 3,
        PubAck = 4,
        PubRec = 5,
        PubRel = 6,
        PubComp = 7,
        Subscribe = 8,
        SubAck = 9,
        Unsubscribe = 10,
        UnsubAck = 11,
        PingReq = 12,
        PingResp = 13,
        Disconnect = 14
    }
}

impl PacketType {
    /// Flags that must be present in the low nibble of the fixed header.
    ///
    /// PUBLISH is the only type whose flags carry data.
    #[inline]
    pub fn default_flags(self) -> u8 {
        match self {
            PacketType::PubRel | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Connect => "CONNECT",
            PacketType::ConnAck => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::PubAck => "PUBACK",
            PacketType::PubRec => "PUBREC",
            PacketType::PubRel => "PUBREL",
            PacketType::PubComp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::SubAck => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::UnsubAck => "UNSUBACK",
            PacketType::PingReq => "PINGREQ",
            PacketType::PingResp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
        }
    }

    /// Packets made of a fixed header only
    #[inline]
    pub fn is_naked(self) -> bool {
        matches!(self, PacketType::PingReq | PacketType::PingResp | PacketType::Disconnect)
    }

    #[inline]
    pub(crate) fn from_first_byte(first_byte: u8) -> Result<Self, DecodeError> {
        let t = first_byte >> 4;
        PacketType::try_from(t).map_err(|_| DecodeError::UnsupportedPacketType(t))
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

prim_enum! {
    /// Quality of Service
    #[derive(Serialize, Deserialize, PartialOrd, Ord, Hash)]
    pub enum QoS {
        /// At most once delivery
        ///
        /// The message is delivered according to the capabilities of the underlying network.
        /// No response is sent by the receiver and no retry is performed by the sender.
        AtMostOnce = 0,
        /// At least once delivery
        ///
        /// A QoS 1 PUBLISH Packet has a Packet Identifier in its variable header
        /// and is acknowledged by a PUBACK Packet.
        AtLeastOnce = 1,
        /// Exactly once delivery
        ///
        /// Acknowledged through the PUBREC, PUBREL and PUBCOMP exchange.
        ExactlyOnce = 2
    }
}

impl QoS {
    #[inline]
    pub fn value(&self) -> u8 {
        *self as u8
    }

    #[inline]
    pub(crate) fn decode(v: u8) -> Result<QoS, DecodeError> {
        QoS::try_from(v).map_err(|_| DecodeError::InvalidQoS(v))
    }
}

impl From<QoS> for u8 {
    fn from(v: QoS) -> Self {
        v.value()
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ConnectFlags: u8 {
        const USERNAME    = 0b1000_0000;
        const PASSWORD    = 0b0100_0000;
        const WILL_RETAIN = 0b0010_0000;
        const WILL_QOS    = 0b0001_1000;
        const WILL        = 0b0000_0100;
        const CLEAN_START = 0b0000_0010;
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ConnectAckFlags: u8 {
        const SESSION_PRESENT = 0b0000_0001;
    }
}

pub(crate) mod publish_flags {
    pub(crate) const DUP: u8 = 0b1000;
    pub(crate) const QOS: u8 = 0b0110;
    pub(crate) const RETAIN: u8 = 0b0001;
}

/// Parsed fixed header
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FixedHeader {
    pub kind: PacketType,
    /// low nibble of the first byte
    pub flags: u8,
    /// bytes taken by the type byte plus the remaining length field
    pub header_len: usize,
    /// the number of bytes remaining within the current packet,
    /// including data in the variable header and the payload.
    pub remaining_length: usize,
}

impl FixedHeader {
    #[inline]
    pub fn total_len(&self) -> usize {
        self.header_len + self.remaining_length
    }
}

#[derive(PartialEq, Eq, Clone)]
pub struct Publish {
    /// this might be re-delivery of an earlier attempt to send the Packet.
    pub dup: bool,
    pub retain: bool,
    /// the level of assurance for delivery of an Application Message.
    pub qos: QoS,
    /// the information channel to which payload data is published.
    pub topic: ByteString,
    /// only present in PUBLISH Packets where the QoS level is 1 or 2.
    pub packet_id: Option<NonZeroU16>,
    /// the Application Message that is being published.
    pub payload: Bytes,
}

impl fmt::Debug for Publish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publish")
            .field("packet_id", &self.packet_id)
            .field("topic", &self.topic)
            .field("dup", &self.dup)
            .field("retain", &self.retain)
            .field("qos", &self.qos)
            .field("payload", &"<REDACTED>")
            .finish()
    }
}
