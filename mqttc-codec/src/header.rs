//! Fixed header shared by every control packet: one type/flags byte followed by the
//! remaining length as a base-128 variable length integer of one to four bytes.

use bytes::BufMut;

use crate::error::{DecodeError, EncodeError};
use crate::types::{FixedHeader, PacketType, MAX_REMAINING_LENGTH};
use crate::utils::{decode_variable_length, variable_length_size, write_variable_length};

/// Bytes needed for a fixed header announcing `remaining_length`.
#[inline]
pub fn header_len(remaining_length: usize) -> usize {
    1 + variable_length_size(remaining_length)
}

/// Writes a fixed header at the start of `dst` and returns its length.
///
/// The type's mandatory flags are always merged into `flags`.
pub fn encode(
    dst: &mut [u8],
    flags: u8,
    remaining_length: usize,
    kind: PacketType,
) -> Result<usize, EncodeError> {
    ensure!(
        remaining_length <= MAX_REMAINING_LENGTH,
        EncodeError::RemainingLengthOutOfBound(remaining_length)
    );
    let len = header_len(remaining_length);
    ensure!(dst.len() >= len, EncodeError::BufferTooSmall { kind, expected: len, actual: dst.len() });

    let mut buf = &mut dst[..len];
    buf.put_u8(((kind as u8) << 4) | ((kind.default_flags() | flags) & 0b0000_1111));
    write_variable_length(remaining_length, &mut buf)?;
    Ok(len)
}

/// Validates the fixed header at the start of `src` against `kind`.
///
/// Returns the header length, the flags nibble and the remaining length. Flags are
/// checked against the mandatory value for every type except PUBLISH.
pub fn decode(src: &[u8], kind: PacketType) -> Result<(usize, u8, usize), DecodeError> {
    ensure!(src.len() >= 2, DecodeError::InsufficientBuffer(kind, src.len()));

    let actual = src[0] >> 4;
    ensure!(actual == kind as u8, DecodeError::InvalidType { expected: kind, actual });

    let flags = src[0] & 0b0000_1111;
    if kind != PacketType::Publish {
        let expected = kind.default_flags();
        ensure!(flags == expected, DecodeError::InvalidFlags { kind, expected, actual: flags });
    }

    let (remaining_length, n) = decode_variable_length(&src[1..])?.ok_or(DecodeError::MalformedPacket)?;
    let consumed = 1 + n;
    let available = src.len() - consumed;
    ensure!(
        remaining_length <= available,
        DecodeError::RemainingLengthExceeded { kind, remaining_length, available, consumed }
    );

    Ok((consumed, flags, remaining_length))
}

/// Peeks at the fixed header of whatever packet starts `src`.
///
/// `Ok(None)` means more bytes are needed to read the header. The body itself is not
/// required to be present.
pub fn detect(src: &[u8]) -> Result<Option<FixedHeader>, DecodeError> {
    if src.len() < 2 {
        return Ok(None);
    }
    let kind = PacketType::from_first_byte(src[0])?;
    match decode_variable_length(&src[1..])? {
        Some((remaining_length, n)) => Ok(Some(FixedHeader {
            kind,
            flags: src[0] & 0b0000_1111,
            header_len: 1 + n,
            remaining_length,
        })),
        None => Ok(None),
    }
}
