use std::num::NonZeroU16;

use bytes::Bytes;
use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::header;
use crate::types::{PacketType, QoS};
use crate::{decode, encode};

prim_enum! {
    /// Connect Return Code
    #[derive(Deserialize, Serialize)]
    pub enum ConnectAckReason {
        /// Connection accepted
        ConnectionAccepted = 0,
        /// Connection Refused, unacceptable protocol version
        UnacceptableProtocolVersion = 1,
        /// Connection Refused, identifier rejected
        IdentifierRejected = 2,
        /// Connection Refused, Server unavailable
        ServiceUnavailable = 3,
        /// Connection Refused, bad user name or password
        BadUserNameOrPassword = 4,
        /// Connection Refused, not authorized
        NotAuthorized = 5
    }
}

impl From<ConnectAckReason> for u8 {
    fn from(v: ConnectAckReason) -> Self {
        v as u8
    }
}

impl ConnectAckReason {
    pub fn reason(self) -> &'static str {
        match self {
            ConnectAckReason::ConnectionAccepted => "Connection Accepted",
            ConnectAckReason::UnacceptableProtocolVersion => {
                "Connection Refused, unacceptable protocol version"
            }
            ConnectAckReason::IdentifierRejected => "Connection Refused, identifier rejected",
            ConnectAckReason::ServiceUnavailable => "Connection Refused, Server unavailable",
            ConnectAckReason::BadUserNameOrPassword => "Connection Refused, bad user name or password",
            ConnectAckReason::NotAuthorized => "Connection Refused, not authorized",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// Connection Will
pub struct LastWill {
    /// the QoS level to be used when publishing the Will Message.
    pub qos: QoS,
    /// the Will Message is to be Retained when it is published.
    pub retain: bool,
    /// the Will Topic
    pub topic: ByteString,
    /// defines the Application Message that is to be published to the Will Topic
    pub message: Bytes,
}

#[derive(Default, Debug, PartialEq, Eq, Clone)]
/// Connect packet content
pub struct Connect {
    /// the handling of the Session state.
    pub clean_session: bool,
    /// a time interval measured in seconds.
    pub keep_alive: u16,
    /// Will Message be stored on the Server and associated with the Network Connection.
    pub last_will: Option<LastWill>,
    /// identifies the Client to the Server.
    pub client_id: ByteString,
    /// username can be used by the Server for authentication and authorization.
    pub username: Option<ByteString>,
    /// password can be used by the Server for authentication and authorization.
    pub password: Option<Bytes>,
}

impl Connect {
    /// Set client_id value
    pub fn client_id<T>(mut self, client_id: T) -> Self
    where
        ByteString: From<T>,
    {
        self.client_id = client_id.into();
        self
    }
}

pub type Publish = crate::types::Publish;

#[derive(Debug, PartialEq, Eq, Copy, Clone, Deserialize, Serialize)]
/// ConnectAck message
pub struct ConnectAck {
    pub return_code: ConnectAckReason,
    /// enables a Client to establish whether the Client and Server have a consistent view
    /// about whether there is already stored Session state.
    pub session_present: bool,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, Deserialize, Serialize)]
/// Subscribe Return Code
pub enum SubscribeReturnCode {
    Success(QoS),
    Failure,
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// MQTT Control Packets
pub enum Packet {
    /// Client request to connect to Server
    Connect(Box<Connect>),

    /// Connect acknowledgment
    ConnectAck(ConnectAck),

    /// Publish message
    Publish(Publish),

    /// Publish acknowledgment
    PublishAck {
        /// Packet Identifier
        packet_id: NonZeroU16,
    },
    /// Publish received (assured delivery part 1)
    PublishReceived {
        /// Packet Identifier
        packet_id: NonZeroU16,
    },
    /// Publish release (assured delivery part 2)
    PublishRelease {
        /// Packet Identifier
        packet_id: NonZeroU16,
    },
    /// Publish complete (assured delivery part 3)
    PublishComplete {
        /// Packet Identifier
        packet_id: NonZeroU16,
    },

    /// Client subscribe request
    Subscribe {
        /// Packet Identifier
        packet_id: NonZeroU16,
        /// the list of Topic Filters and QoS to which the Client wants to subscribe.
        topic_filters: Vec<(ByteString, QoS)>,
    },
    /// Subscribe acknowledgment
    SubscribeAck {
        packet_id: NonZeroU16,
        /// corresponds to a Topic Filter in the SUBSCRIBE Packet being acknowledged.
        status: Vec<SubscribeReturnCode>,
    },

    /// Unsubscribe request
    Unsubscribe {
        /// Packet Identifier
        packet_id: NonZeroU16,
        /// the list of Topic Filters that the Client wishes to unsubscribe from.
        topic_filters: Vec<ByteString>,
    },
    /// Unsubscribe acknowledgment
    UnsubscribeAck {
        /// Packet Identifier
        packet_id: NonZeroU16,
    },

    /// PING request
    PingRequest,
    /// PING response
    PingResponse,
    /// Client is disconnecting
    Disconnect,
}

impl From<Connect> for Packet {
    fn from(val: Connect) -> Packet {
        Packet::Connect(Box::new(val))
    }
}

impl From<Publish> for Packet {
    fn from(val: Publish) -> Packet {
        Packet::Publish(val)
    }
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnectAck { .. } => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PublishAck { .. } => PacketType::PubAck,
            Packet::PublishReceived { .. } => PacketType::PubRec,
            Packet::PublishRelease { .. } => PacketType::PubRel,
            Packet::PublishComplete { .. } => PacketType::PubComp,
            Packet::Subscribe { .. } => PacketType::Subscribe,
            Packet::SubscribeAck { .. } => PacketType::SubAck,
            Packet::Unsubscribe { .. } => PacketType::Unsubscribe,
            Packet::UnsubscribeAck { .. } => PacketType::UnsubAck,
            Packet::PingRequest => PacketType::PingReq,
            Packet::PingResponse => PacketType::PingResp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Packet identifier, for the packets that carry one
    pub fn packet_id(&self) -> Option<NonZeroU16> {
        match self {
            Packet::Publish(p) => p.packet_id,
            Packet::PublishAck { packet_id }
            | Packet::PublishReceived { packet_id }
            | Packet::PublishRelease { packet_id }
            | Packet::PublishComplete { packet_id }
            | Packet::Subscribe { packet_id, .. }
            | Packet::SubscribeAck { packet_id, .. }
            | Packet::Unsubscribe { packet_id, .. }
            | Packet::UnsubscribeAck { packet_id } => Some(*packet_id),
            _ => None,
        }
    }

    /// Total encoded size in bytes, fixed header included.
    ///
    /// Computed from the current field values on every call.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let remaining_length = encode::get_encoded_size(self);
        header::header_len(remaining_length) + remaining_length
    }

    /// Encodes the packet into the front of `dst` and returns the number of bytes written.
    pub fn encode(&self, dst: &mut [u8]) -> Result<usize, EncodeError> {
        let kind = self.packet_type();
        if kind.is_naked() {
            return encode::encode_naked(dst, kind);
        }
        let remaining_length = encode::get_encoded_size(self);
        let total = header::header_len(remaining_length) + remaining_length;
        ensure!(dst.len() >= total, EncodeError::BufferTooSmall { kind, expected: total, actual: dst.len() });
        encode::encode(self, &mut dst[..total], remaining_length)?;
        Ok(total)
    }

    /// Decodes the packet at the start of `src`, returning it with the number of bytes consumed.
    ///
    /// The payload is copied out of `src`.
    pub fn decode(src: &[u8]) -> Result<(Packet, usize), DecodeError> {
        ensure!(!src.is_empty(), DecodeError::MalformedPacket);
        let kind = PacketType::from_first_byte(src[0])?;
        if kind.is_naked() {
            let consumed = decode::decode_naked(src, kind)?;
            return Ok((Packet::naked(kind), consumed));
        }
        let (header_len, flags, remaining_length) = header::decode(src, kind)?;
        let total = header_len + remaining_length;
        let body = Bytes::copy_from_slice(&src[header_len..total]);
        Ok((decode::decode_packet(body, kind, flags)?, total))
    }

    /// Decodes one complete frame without copying the payload.
    ///
    /// `frame` must hold exactly one packet.
    pub fn decode_frame(frame: Bytes) -> Result<Packet, DecodeError> {
        ensure!(!frame.is_empty(), DecodeError::MalformedPacket);
        let kind = PacketType::from_first_byte(frame[0])?;
        if kind.is_naked() {
            let consumed = decode::decode_naked(&frame, kind)?;
            ensure!(consumed == frame.len(), DecodeError::InvalidLength);
            return Ok(Packet::naked(kind));
        }
        let (header_len, flags, remaining_length) = header::decode(&frame, kind)?;
        ensure!(header_len + remaining_length == frame.len(), DecodeError::InvalidLength);
        decode::decode_packet(frame.slice(header_len..), kind, flags)
    }

    fn naked(kind: PacketType) -> Packet {
        match kind {
            PacketType::PingReq => Packet::PingRequest,
            PacketType::PingResp => Packet::PingResponse,
            _ => Packet::Disconnect,
        }
    }
}
