use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{DecodeError, EncodeError};
use crate::header;
use crate::packet::Packet;

#[derive(Debug, Clone, Default)]
/// Mqtt v3.1.1 frame codec
///
/// Incomplete frames are left in the buffer until the rest of the bytes arrive.
pub struct Codec {
    max_size: u32,
}

impl Codec {
    /// Create `Codec` instance
    pub fn new(max_packet_size: u32) -> Self {
        Codec { max_size: max_packet_size }
    }

    /// Set max inbound frame size.
    ///
    /// If max size is set to `0`, size is unlimited.
    /// By default max size is set to `0`
    pub fn set_max_size(&mut self, size: u32) {
        self.max_size = size;
    }
}

impl Decoder for Codec {
    type Item = Packet;
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, DecodeError> {
        let fixed = match header::detect(src)? {
            Some(fixed) => fixed,
            None => return Ok(None),
        };

        // check max message size
        if self.max_size != 0 && (self.max_size as usize) < fixed.remaining_length {
            return Err(DecodeError::MaxSizeExceeded);
        }

        let total = fixed.total_len();
        if src.len() < total {
            // extend receiving buffer to fit the whole frame
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total).freeze();
        Packet::decode_frame(frame).map(Some)
    }
}

impl Encoder<Packet> for Codec {
    type Error = EncodeError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let len = item.len();
        let start = dst.len();
        dst.resize(start + len, 0);
        if let Err(e) = item.encode(&mut dst[start..]) {
            dst.truncate(start);
            return Err(e);
        }
        Ok(())
    }
}
