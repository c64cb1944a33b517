use std::num::NonZeroU16;

use bytes::{Buf, Bytes};
use bytestring::ByteString;

use crate::error::DecodeError;
use crate::header;
use crate::packet::{Connect, ConnectAck, ConnectAckReason, LastWill, Packet, Publish, SubscribeReturnCode};
use crate::types::{
    publish_flags, ConnectAckFlags, ConnectFlags, PacketType, QoS, MQTT, MQTT_LEVEL_311, WILL_QOS_SHIFT,
};
use crate::utils::Decode;

/// Parses the variable header and payload of a packet whose fixed header was already validated.
pub(crate) fn decode_packet(mut src: Bytes, kind: PacketType, flags: u8) -> Result<Packet, DecodeError> {
    match kind {
        PacketType::Connect => decode_connect_packet(&mut src),
        PacketType::ConnAck => decode_connect_ack_packet(&mut src),
        PacketType::Publish => decode_publish_packet(&mut src, flags),
        PacketType::PubAck => decode_ack(src, |packet_id| Packet::PublishAck { packet_id }),
        PacketType::PubRec => decode_ack(src, |packet_id| Packet::PublishReceived { packet_id }),
        PacketType::PubRel => decode_ack(src, |packet_id| Packet::PublishRelease { packet_id }),
        PacketType::PubComp => decode_ack(src, |packet_id| Packet::PublishComplete { packet_id }),
        PacketType::Subscribe => decode_subscribe_packet(&mut src),
        PacketType::SubAck => decode_subscribe_ack_packet(&mut src),
        PacketType::Unsubscribe => decode_unsubscribe_packet(&mut src),
        PacketType::UnsubAck => decode_ack(src, |packet_id| Packet::UnsubscribeAck { packet_id }),
        PacketType::PingReq => decode_empty(src, Packet::PingRequest),
        PacketType::PingResp => decode_empty(src, Packet::PingResponse),
        PacketType::Disconnect => decode_empty(src, Packet::Disconnect),
    }
}

/// Reads a packet made of a fixed header only and returns the bytes consumed.
pub(crate) fn decode_naked(src: &[u8], kind: PacketType) -> Result<usize, DecodeError> {
    let (consumed, _, remaining_length) = header::decode(src, kind)?;
    ensure!(
        remaining_length == 0,
        DecodeError::UnexpectedRemainingLength { kind, remaining_length, consumed }
    );
    Ok(consumed)
}

#[inline]
fn decode_empty(src: Bytes, packet: Packet) -> Result<Packet, DecodeError> {
    ensure!(!src.has_remaining(), DecodeError::InvalidLength);
    Ok(packet)
}

#[inline]
fn decode_ack(mut src: Bytes, f: impl Fn(NonZeroU16) -> Packet) -> Result<Packet, DecodeError> {
    let packet_id = NonZeroU16::decode(&mut src)?;
    ensure!(!src.has_remaining(), DecodeError::InvalidLength);
    Ok(f(packet_id))
}

fn decode_connect_packet(src: &mut Bytes) -> Result<Packet, DecodeError> {
    ensure!(src.remaining() >= 10, DecodeError::InvalidLength);
    let len = src.get_u16();

    if len == 4 && &src.as_ref()[0..4] == MQTT {
        src.advance(4);
    } else {
        return Err(DecodeError::InvalidProtocol);
    }

    let level = src.get_u8();
    ensure!(level == MQTT_LEVEL_311, DecodeError::UnsupportedProtocolLevel);

    let flags = ConnectFlags::from_bits(src.get_u8()).ok_or(DecodeError::ConnectReservedFlagSet)?;

    let keep_alive = u16::decode(src)?;
    let client_id = ByteString::decode(src)?;

    ensure!(!client_id.is_empty() || flags.contains(ConnectFlags::CLEAN_START), DecodeError::InvalidClientId);

    let last_will = if flags.contains(ConnectFlags::WILL) {
        let topic = ByteString::decode(src)?;
        let message = Bytes::decode(src)?;
        Some(LastWill {
            qos: QoS::decode((flags & ConnectFlags::WILL_QOS).bits() >> WILL_QOS_SHIFT)?,
            retain: flags.contains(ConnectFlags::WILL_RETAIN),
            topic,
            message,
        })
    } else {
        // will qos and retain must be zero without a will
        ensure!(
            !flags.intersects(ConnectFlags::WILL_QOS | ConnectFlags::WILL_RETAIN),
            DecodeError::MalformedPacket
        );
        None
    };
    let username = if flags.contains(ConnectFlags::USERNAME) { Some(ByteString::decode(src)?) } else { None };
    let password = if flags.contains(ConnectFlags::PASSWORD) {
        ensure!(username.is_some(), DecodeError::MalformedPacket);
        Some(Bytes::decode(src)?)
    } else {
        None
    };
    ensure!(!src.has_remaining(), DecodeError::InvalidLength);

    Ok(Connect {
        clean_session: flags.contains(ConnectFlags::CLEAN_START),
        keep_alive,
        client_id,
        last_will,
        username,
        password,
    }
    .into())
}

fn decode_connect_ack_packet(src: &mut Bytes) -> Result<Packet, DecodeError> {
    ensure!(src.remaining() == 2, DecodeError::InvalidLength);
    let flags = ConnectAckFlags::from_bits(src.get_u8()).ok_or(DecodeError::ConnAckReservedFlagSet)?;

    let code = src.get_u8();
    let return_code = ConnectAckReason::try_from(code).map_err(|_| DecodeError::InvalidReturnCode(code))?;
    Ok(Packet::ConnectAck(ConnectAck {
        return_code,
        session_present: flags.contains(ConnectAckFlags::SESSION_PRESENT),
    }))
}

fn decode_publish_packet(src: &mut Bytes, packet_flags: u8) -> Result<Packet, DecodeError> {
    let topic = ByteString::decode(src)?;
    ensure!(!topic.is_empty(), DecodeError::EmptyTopic);
    let qos = QoS::decode((packet_flags & publish_flags::QOS) >> 1)?;
    let packet_id = if qos == QoS::AtMostOnce {
        None
    } else {
        Some(NonZeroU16::decode(src)?) // packet id = 0 encountered
    };

    Ok(Packet::Publish(Publish {
        dup: (packet_flags & publish_flags::DUP) == publish_flags::DUP,
        qos,
        retain: (packet_flags & publish_flags::RETAIN) == publish_flags::RETAIN,
        topic,
        packet_id,
        payload: src.split_off(0),
    }))
}

fn decode_subscribe_packet(src: &mut Bytes) -> Result<Packet, DecodeError> {
    let packet_id = NonZeroU16::decode(src)?;
    let mut topic_filters = Vec::new();
    while src.has_remaining() {
        let topic = ByteString::decode(src)?;
        ensure!(!topic.is_empty(), DecodeError::EmptyTopicFilter);
        ensure!(src.remaining() >= 1, DecodeError::InvalidLength);
        let options = src.get_u8();
        ensure!(options & 0b1111_1100 == 0, DecodeError::MalformedPacket);
        topic_filters.push((topic, QoS::decode(options)?));
    }
    ensure!(!topic_filters.is_empty(), DecodeError::MalformedPacket);

    Ok(Packet::Subscribe { packet_id, topic_filters })
}

fn decode_subscribe_ack_packet(src: &mut Bytes) -> Result<Packet, DecodeError> {
    let packet_id = NonZeroU16::decode(src)?;
    let mut status = Vec::with_capacity(src.len());
    for code in src.as_ref().iter() {
        status.push(if *code == 0x80 {
            SubscribeReturnCode::Failure
        } else {
            SubscribeReturnCode::Success(QoS::decode(*code)?)
        });
    }
    ensure!(!status.is_empty(), DecodeError::MalformedPacket);
    Ok(Packet::SubscribeAck { packet_id, status })
}

fn decode_unsubscribe_packet(src: &mut Bytes) -> Result<Packet, DecodeError> {
    let packet_id = NonZeroU16::decode(src)?;
    let mut topic_filters = Vec::new();
    while src.remaining() > 0 {
        let topic = ByteString::decode(src)?;
        ensure!(!topic.is_empty(), DecodeError::EmptyTopicFilter);
        topic_filters.push(topic);
    }
    ensure!(!topic_filters.is_empty(), DecodeError::MalformedPacket);
    Ok(Packet::Unsubscribe { packet_id, topic_filters })
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! assert_decode_packet (
        ($bytes:expr, $res:expr) => {{
            let bytes: &[u8] = $bytes.as_ref();
            let (packet, consumed) = Packet::decode(bytes).unwrap();
            assert_eq!(packet, $res);
            assert_eq!(consumed, bytes.len());
        }};
    );

    macro_rules! assert_decode_error (
        ($bytes:expr, $err:pat) => {{
            let bytes: &[u8] = $bytes.as_ref();
            let res = Packet::decode(bytes);
            assert!(matches!(res, Err($err)), "{:?}", res);
        }};
    );

    fn packet_id(v: u16) -> NonZeroU16 {
        NonZeroU16::new(v).unwrap()
    }

    #[test]
    fn test_decode_connect_packets() {
        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(
                b"\x00\x04MQTT\x04\xC0\x00\x3C\x00\x0512345\x00\x04user\x00\x04pass"
            ))
            .unwrap(),
            Packet::Connect(Box::new(Connect {
                clean_session: false,
                keep_alive: 60,
                client_id: ByteString::from_static("12345"),
                last_will: None,
                username: Some(ByteString::from_static("user")),
                password: Some(Bytes::from(&b"pass"[..])),
            }))
        );

        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(
                b"\x00\x04MQTT\x04\x14\x00\x3C\x00\x0512345\x00\x05topic\x00\x07message"
            ))
            .unwrap(),
            Packet::Connect(Box::new(Connect {
                clean_session: false,
                keep_alive: 60,
                client_id: ByteString::from_static("12345"),
                last_will: Some(LastWill {
                    qos: QoS::ExactlyOnce,
                    retain: false,
                    topic: ByteString::from_static("topic"),
                    message: Bytes::from(&b"message"[..]),
                }),
                username: None,
                password: None,
            }))
        );

        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(b"\x00\x02MQ00000000000000000000"))
                .map_err(|e| matches!(e, DecodeError::InvalidProtocol)),
            Err(true),
        );
        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(b"\x00\x04MQAA00000000000000000000"))
                .map_err(|e| matches!(e, DecodeError::InvalidProtocol)),
            Err(true),
        );
        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(b"\x00\x04MQTT\x0300000000000000000000"))
                .map_err(|e| matches!(e, DecodeError::UnsupportedProtocolLevel)),
            Err(true),
        );
        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(b"\x00\x04MQTT\x04\xff00000000000000000000"))
                .map_err(|e| matches!(e, DecodeError::ConnectReservedFlagSet)),
            Err(true)
        );
        // password without username
        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(b"\x00\x04MQTT\x04\x42\x00\x3C\x00\x0512345\x00\x04pass"))
                .map_err(|e| matches!(e, DecodeError::MalformedPacket)),
            Err(true)
        );
        // empty client id without clean session
        assert_eq!(
            decode_connect_packet(&mut Bytes::from_static(b"\x00\x04MQTT\x04\x00\x00\x3C\x00\x00"))
                .map_err(|e| matches!(e, DecodeError::InvalidClientId)),
            Err(true)
        );
        // trailing bytes
        assert_decode_error!(b"\x10\x12\x00\x04MQTT\x04\x02\x00\x3C\x00\x0512345\x00", DecodeError::InvalidLength);
    }

    #[test]
    fn test_decode_connect_ack_packets() {
        assert_eq!(
            decode_connect_ack_packet(&mut Bytes::from_static(b"\x01\x04")).unwrap(),
            Packet::ConnectAck(ConnectAck {
                session_present: true,
                return_code: ConnectAckReason::BadUserNameOrPassword
            })
        );

        assert_eq!(
            decode_connect_ack_packet(&mut Bytes::from_static(b"\x03\x04"))
                .map_err(|e| matches!(e, DecodeError::ConnAckReservedFlagSet)),
            Err(true)
        );

        assert_decode_packet!(
            b"\x20\x02\x01\x04",
            Packet::ConnectAck(ConnectAck {
                session_present: true,
                return_code: ConnectAckReason::BadUserNameOrPassword,
            })
        );
        assert_decode_packet!(
            b"\x20\x02\x00\x00",
            Packet::ConnectAck(ConnectAck {
                session_present: false,
                return_code: ConnectAckReason::ConnectionAccepted,
            })
        );
        assert_decode_error!(b"\x20\x02\x00\x06", DecodeError::InvalidReturnCode(6));
        assert_decode_error!(b"\x20\x03\x00\x00\x00", DecodeError::InvalidLength);
        assert_decode_error!(b"\x21\x02\x00\x00", DecodeError::InvalidFlags { .. });
    }

    #[test]
    fn test_decode_publish_packets() {
        assert_decode_packet!(
            b"\x3d\x0D\x00\x05topic\x43\x21data",
            Packet::Publish(Publish {
                dup: true,
                retain: true,
                qos: QoS::ExactlyOnce,
                topic: ByteString::from_static("topic"),
                packet_id: Some(packet_id(0x4321)),
                payload: Bytes::from_static(b"data"),
            })
        );
        assert_decode_packet!(
            b"\x30\x0b\x00\x05topicdata",
            Packet::Publish(Publish {
                dup: false,
                retain: false,
                qos: QoS::AtMostOnce,
                topic: ByteString::from_static("topic"),
                packet_id: None,
                payload: Bytes::from_static(b"data"),
            })
        );

        assert_decode_error!(b"\x36\x09\x00\x05topic\x00\x01", DecodeError::InvalidQoS(3));
        assert_decode_error!(b"\x32\x07\x00\x05topic\x00\x00", DecodeError::InvalidLength);
        assert_decode_error!(b"\x32\x06\x00\x00\x00\x01xx", DecodeError::EmptyTopic);
        assert_decode_error!(b"\x32\x09\x00\x05topic\x00\x00", DecodeError::MalformedPacket);

        assert_decode_packet!(b"\x40\x02\x43\x21", Packet::PublishAck { packet_id: packet_id(0x4321) });
        assert_decode_packet!(b"\x50\x02\x43\x21", Packet::PublishReceived { packet_id: packet_id(0x4321) });
        assert_decode_packet!(b"\x62\x02\x43\x21", Packet::PublishRelease { packet_id: packet_id(0x4321) });
        assert_decode_packet!(b"\x70\x02\x43\x21", Packet::PublishComplete { packet_id: packet_id(0x4321) });

        assert_decode_error!(b"\x60\x02\x43\x21", DecodeError::InvalidFlags { kind: PacketType::PubRel, .. });
        assert_decode_error!(b"\x40\x03\x43\x21\x00", DecodeError::InvalidLength);
        assert_decode_error!(b"\x40\x01\x43", DecodeError::InvalidLength);
    }

    #[test]
    fn test_decode_subscribe_packets() {
        let p = Packet::Subscribe {
            packet_id: packet_id(0x1234),
            topic_filters: vec![
                (ByteString::from_static("test"), QoS::AtLeastOnce),
                (ByteString::from_static("filter"), QoS::ExactlyOnce),
            ],
        };

        assert_eq!(
            decode_subscribe_packet(&mut Bytes::from_static(b"\x12\x34\x00\x04test\x01\x00\x06filter\x02"))
                .unwrap(),
            p
        );
        assert_decode_packet!(b"\x82\x12\x12\x34\x00\x04test\x01\x00\x06filter\x02", p);
        assert_decode_error!(b"\x82\x05\x12\x34\x00\x00\x01", DecodeError::EmptyTopicFilter);
        assert_decode_error!(b"\x82\x06\x12\x34\x00\x01a\x03", DecodeError::InvalidQoS(3));
        assert_decode_error!(b"\x82\x06\x12\x34\x00\x01a\x41", DecodeError::MalformedPacket);
        assert_decode_error!(b"\x82\x02\x12\x34", DecodeError::MalformedPacket);

        let p = Packet::SubscribeAck {
            packet_id: packet_id(0x1234),
            status: vec![
                SubscribeReturnCode::Success(QoS::AtLeastOnce),
                SubscribeReturnCode::Failure,
                SubscribeReturnCode::Success(QoS::ExactlyOnce),
            ],
        };

        assert_eq!(decode_subscribe_ack_packet(&mut Bytes::from_static(b"\x12\x34\x01\x80\x02")).unwrap(), p);
        assert_decode_packet!(b"\x90\x05\x12\x34\x01\x80\x02", p);
        assert_decode_error!(b"\x90\x03\x12\x34\x03", DecodeError::InvalidQoS(3));
        assert_decode_error!(b"\x90\x02\x12\x34", DecodeError::MalformedPacket);

        let p = Packet::Unsubscribe {
            packet_id: packet_id(0x1234),
            topic_filters: vec![ByteString::from_static("test"), ByteString::from_static("filter")],
        };

        assert_eq!(
            decode_unsubscribe_packet(&mut Bytes::from_static(b"\x12\x34\x00\x04test\x00\x06filter"))
                .unwrap(),
            p
        );
        assert_decode_packet!(b"\xa2\x10\x12\x34\x00\x04test\x00\x06filter", p);
        assert_decode_error!(b"\xa2\x04\x12\x34\x00\x00", DecodeError::EmptyTopicFilter);

        assert_decode_packet!(b"\xb0\x02\x43\x21", Packet::UnsubscribeAck { packet_id: packet_id(0x4321) });
    }

    #[test]
    fn test_decode_ping_packets() {
        assert_decode_packet!(b"\xc0\x00", Packet::PingRequest);
        assert_decode_packet!(b"\xd0\x00", Packet::PingResponse);
    }

    #[test]
    fn test_decode_naked() {
        assert_eq!(decode_naked(b"\xe0\x00", PacketType::Disconnect).unwrap(), 2);
        assert_decode_packet!(b"\xe0\x00", Packet::Disconnect);

        let err = decode_naked(b"\xe0\x01\x00", PacketType::Disconnect).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedRemainingLength { remaining_length: 1, .. }));
        assert_eq!(err.consumed(), Some(2));

        assert_decode_error!(b"\xe0\x01", DecodeError::RemainingLengthExceeded { .. });
        assert_decode_error!(b"\xe1\x00", DecodeError::InvalidFlags { kind: PacketType::Disconnect, .. });
        assert!(matches!(
            decode_naked(b"\xc0\x00", PacketType::Disconnect),
            Err(DecodeError::InvalidType { expected: PacketType::Disconnect, actual: 12 })
        ));
    }
}
