//! The NSLP object header shared by every NATFW and QoS object: a 2-bit
//! extensibility action, a 12-bit type code, and a 12-bit length counted in
//! 32-bit words (tail padding excluded). The remaining 6 header bits are
//! reserved, written zero, and ignored on decode; the exact bit positions
//! are this crate's own packing, chosen to leave the type and length
//! fields byte-aligned for masking and documented here rather than in a
//! comment at every call site.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |A|A|  reserved   |   Object Type (12)    |    Length (12)    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use nsis_buf::NetBuf;

use crate::error::NslpError;

/// The 2-bit extensibility action a sender sets and a receiver interprets
/// when it doesn't recognise an object's type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectAction {
    /// Reject the whole PDU if this object's type is unrecognised.
    Mandatory,
    /// Silently drop this object if its type is unrecognised.
    Ignore,
    /// Keep this object opaque and forward it downstream unchanged.
    Forward,
    /// Like `Forward`, and also include it on refreshes.
    Refresh,
}

impl ObjectAction {
    fn from_raw(raw: u8) -> Self {
        match raw & 0b11 {
            0 => Self::Mandatory,
            1 => Self::Ignore,
            2 => Self::Forward,
            _ => Self::Refresh,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Mandatory => 0,
            Self::Ignore => 1,
            Self::Forward => 2,
            Self::Refresh => 3,
        }
    }
}

/// A decoded object header: action, type code, and body length in words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// What to do with this object if its type is unrecognised.
    pub action: ObjectAction,
    /// 12-bit object type code.
    pub object_type: u16,
    /// Body length in 32-bit words, tail padding excluded.
    pub length_words: u16,
}

impl ObjectHeader {
    /// Pack into the 32-bit wire word.
    #[must_use]
    pub fn pack(self) -> u32 {
        (u32::from(self.action.to_raw()) << 30) | (u32::from(self.object_type & 0x0FFF) << 12) | u32::from(self.length_words & 0x0FFF)
    }

    /// Unpack from the 32-bit wire word, ignoring the reserved bits.
    #[must_use]
    pub fn unpack(word: u32) -> Self {
        Self {
            action: ObjectAction::from_raw((word >> 30) as u8),
            object_type: ((word >> 12) & 0x0FFF) as u16,
            length_words: (word & 0x0FFF) as u16,
        }
    }

    /// Total bytes this object occupies on the wire including header and
    /// tail padding (always a multiple of 4).
    #[must_use]
    pub fn total_wire_len(self) -> usize {
        4 + usize::from(self.length_words) * 4
    }
}

/// Write an object header followed by a pre-encoded body, padding the body
/// to a 4-byte boundary. Returns the header's byte offset.
///
/// # Errors
/// Returns [`NslpError`] if the buffer runs out of space.
pub fn encode_object(buf: &mut NetBuf, action: ObjectAction, object_type: u16, body: &[u8]) -> Result<usize, NslpError> {
    let offset = buf.position();
    let length_words = (body.len() as u16).div_ceil(4);
    buf.write_u32(ObjectHeader { action, object_type, length_words }.pack())?;
    buf.write_bytes(body)?;
    buf.pad_to_4()?;
    Ok(offset)
}

/// Peek the next object's header without consuming it.
///
/// # Errors
/// Returns [`NslpError::Buffer`] if fewer than 4 bytes remain.
pub fn peek_header(buf: &NetBuf) -> Result<ObjectHeader, NslpError> {
    Ok(ObjectHeader::unpack(buf.peek_u32()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_pack_unpack() {
        let header = ObjectHeader { action: ObjectAction::Refresh, object_type: 0x0E5, length_words: 3 };
        assert_eq!(ObjectHeader::unpack(header.pack()), header);
    }

    #[test]
    fn reserved_bits_are_ignored_on_decode() {
        let header = ObjectHeader { action: ObjectAction::Forward, object_type: 7, length_words: 1 };
        let noisy = header.pack() | (0x3F << 24); // stomp the reserved bits
        assert_eq!(ObjectHeader::unpack(noisy), header);
    }

    #[test]
    fn encode_object_pads_body_and_records_word_count() {
        let mut buf = NetBuf::new(16);
        let offset = encode_object(&mut buf, ObjectAction::Mandatory, 1, &[1, 2, 3]).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(buf.position(), 8); // 4-byte header + 3 bytes padded to 4
        let header = ObjectHeader::unpack(buf.peek_u32_at(0).unwrap());
        assert_eq!(header.length_words, 1);
    }
}
