use bytes::BufMut;
use bytestring::ByteString;

use crate::error::EncodeError;
use crate::header;
use crate::packet::*;
use crate::types::{publish_flags, ConnectFlags, PacketType, QoS, MQTT, MQTT_LEVEL_311, WILL_QOS_SHIFT};
use crate::utils::Encode;

pub(crate) fn get_encoded_publish_size(p: &Publish) -> usize {
    // Topic + Packet Id + Payload
    if p.qos == QoS::AtLeastOnce || p.qos == QoS::ExactlyOnce {
        4 + p.topic.len() + p.payload.len()
    } else {
        2 + p.topic.len() + p.payload.len()
    }
}

pub(crate) fn get_encoded_subscribe_size(topic_filters: &[(ByteString, QoS)]) -> usize {
    2 + topic_filters.iter().fold(0, |acc, (filter, _)| acc + 2 + filter.len() + 1)
}

pub(crate) fn get_encoded_unsubscribe_size(topic_filters: &[ByteString]) -> usize {
    2 + topic_filters.iter().fold(0, |acc, filter| acc + 2 + filter.len())
}

/// Remaining length of `packet`, i.e. everything after the fixed header
pub(crate) fn get_encoded_size(packet: &Packet) -> usize {
    match *packet {
        Packet::Connect ( ref connect ) => {
            let Connect {ref last_will, ref client_id, ref username, ref password, ..} = **connect;

            //Protocol Level + Connect Flags + Keep Alive
            let mut n = 1 + 1 + 2;

            //Protocol Name
            n += 2 + MQTT.len();

            // Client Id
            n += 2 + client_id.len();

            // Will Topic + Will Message
            if let Some(LastWill { ref topic, ref message, .. }) = *last_will {
                n += 2 + topic.len() + 2 + message.len();
            }

            if let Some(ref s) = *username {
                n += 2 + s.len();
            }

            if let Some(ref s) = *password {
                n += 2 + s.len();
            }

            n
        }

        Packet::Publish( ref publish ) => get_encoded_publish_size(publish),
        Packet::ConnectAck { .. } | // Flags + Return Code
        Packet::PublishAck { .. } | // Packet Id
        Packet::PublishReceived { .. } | // Packet Id
        Packet::PublishRelease { .. } | // Packet Id
        Packet::PublishComplete { .. } | // Packet Id
        Packet::UnsubscribeAck { .. } => 2, // Packet Id
        Packet::Subscribe { ref topic_filters, .. } => get_encoded_subscribe_size(topic_filters),
        Packet::SubscribeAck { ref status, .. } => 2 + status.len(),

        Packet::Unsubscribe { ref topic_filters, .. } => get_encoded_unsubscribe_size(topic_filters),

        Packet::PingRequest | Packet::PingResponse | Packet::Disconnect => 0,
    }
}

/// Writes `packet` into `dst`, which must be exactly as long as the encoded packet.
pub(crate) fn encode(packet: &Packet, dst: &mut [u8], content_size: usize) -> Result<(), EncodeError> {
    let flags = match packet {
        Packet::Publish(publish) => {
            (u8::from(publish.qos) << 1)
                | if publish.dup { publish_flags::DUP } else { 0 }
                | if publish.retain { publish_flags::RETAIN } else { 0 }
        }
        _ => 0,
    };
    let header_len = header::encode(dst, flags, content_size, packet.packet_type())?;
    let mut dst = &mut dst[header_len..];

    match packet {
        Packet::Connect(connect) => encode_connect(connect, &mut dst)?,
        Packet::ConnectAck(ack) => {
            let flags_byte = u8::from(ack.session_present);
            let code: u8 = From::from(ack.return_code);
            dst.put_slice(&[flags_byte, code]);
        }
        Packet::Publish(publish) => {
            ensure!(!publish.topic.is_empty(), EncodeError::MalformedPacket);
            publish.topic.encode(&mut dst)?;
            if publish.qos == QoS::AtMostOnce {
                if publish.packet_id.is_some() {
                    return Err(EncodeError::MalformedPacket); // packet id must not be set
                }
            } else {
                publish.packet_id.ok_or(EncodeError::PacketIdRequired)?.encode(&mut dst)?;
            }
            dst.put_slice(publish.payload.as_ref());
        }

        Packet::PublishAck { packet_id }
        | Packet::PublishReceived { packet_id }
        | Packet::PublishRelease { packet_id }
        | Packet::PublishComplete { packet_id }
        | Packet::UnsubscribeAck { packet_id } => packet_id.encode(&mut dst)?,
        Packet::Subscribe { packet_id, ref topic_filters } => {
            ensure!(!topic_filters.is_empty(), EncodeError::MalformedPacket);
            packet_id.encode(&mut dst)?;
            for &(ref filter, qos) in topic_filters {
                ensure!(!filter.is_empty(), EncodeError::MalformedPacket);
                filter.encode(&mut dst)?;
                dst.put_u8(qos.into());
            }
        }
        Packet::SubscribeAck { packet_id, ref status } => {
            packet_id.encode(&mut dst)?;
            for s in status {
                dst.put_u8(match *s {
                    SubscribeReturnCode::Success(qos) => qos.into(),
                    SubscribeReturnCode::Failure => 0x80u8,
                });
            }
        }
        Packet::Unsubscribe { packet_id, ref topic_filters } => {
            ensure!(!topic_filters.is_empty(), EncodeError::MalformedPacket);
            packet_id.encode(&mut dst)?;
            for filter in topic_filters {
                ensure!(!filter.is_empty(), EncodeError::MalformedPacket);
                filter.encode(&mut dst)?;
            }
        }
        Packet::PingRequest | Packet::PingResponse | Packet::Disconnect => {}
    }

    Ok(())
}

/// Writes a packet that consists of a fixed header only.
pub(crate) fn encode_naked(dst: &mut [u8], kind: PacketType) -> Result<usize, EncodeError> {
    header::encode(dst, 0, 0, kind)
}

fn encode_connect<B: BufMut>(connect: &Connect, dst: &mut B) -> Result<(), EncodeError> {
    let Connect { clean_session, keep_alive, ref last_will, ref client_id, ref username, ref password } =
        *connect;

    ensure!(password.is_none() || username.is_some(), EncodeError::MalformedPacket);

    MQTT.encode(dst)?;

    let mut flags = ConnectFlags::empty();

    if username.is_some() {
        flags |= ConnectFlags::USERNAME;
    }
    if password.is_some() {
        flags |= ConnectFlags::PASSWORD;
    }

    if let Some(LastWill { qos, retain, .. }) = *last_will {
        flags |= ConnectFlags::WILL;

        if retain {
            flags |= ConnectFlags::WILL_RETAIN;
        }

        let b: u8 = qos as u8;

        flags |= ConnectFlags::from_bits_truncate(b << WILL_QOS_SHIFT);
    }

    if clean_session {
        flags |= ConnectFlags::CLEAN_START;
    }

    dst.put_slice(&[MQTT_LEVEL_311, flags.bits()]);
    dst.put_u16(keep_alive);
    client_id.encode(dst)?;

    if let Some(LastWill { ref topic, ref message, .. }) = *last_will {
        topic.encode(dst)?;
        message.encode(dst)?;
    }

    if let Some(ref s) = *username {
        s.encode(dst)?;
    }

    if let Some(ref s) = *password {
        s.encode(dst)?;
    }
    Ok(())
}
