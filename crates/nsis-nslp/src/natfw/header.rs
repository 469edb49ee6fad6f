//! The NATFW-NSLP message header. The retained reference headers
//! (`natfw_msg.h`, `natfw_create.h`, ...) declare `MSG_TYPE` constants but no
//! `.cpp` implementation file describing the wire layout was kept in the
//! retrieval pack, so the concrete bit packing below is this crate's own,
//! chosen to mirror the object header's word-oriented style (4.4).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |    Msg Type   |  Hop Count    |     Flags     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Length (words)        |            Reserved           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//! `Length` counts the 32-bit words of the object stream that follows the
//! 8-byte header, mirroring how object bodies themselves are word-counted.

use nsis_buf::NetBuf;

use crate::error::NslpError;

/// NATFW message type codes, grounded on the `MSG_TYPE` constants in
/// `natfw_create.h`/`natfw_ext.h`/`natfw_response.h`/`natfw_notify.h`.
pub mod msg_type {
    /// Request to establish a pinhole/mapping (`natfw_create`).
    pub const CREATE: u8 = 1;
    /// Request to extend an established flow (`natfw_ext`).
    pub const EXT: u8 = 2;
    /// Response to a CREATE or EXT (`natfw_response`).
    pub const RESPONSE: u8 = 3;
    /// Asynchronous notification, e.g. of session teardown (`natfw_notify`).
    pub const NOTIFY: u8 = 4;
}

/// The protocol version this crate speaks.
pub const VERSION: u8 = 1;

/// A one-byte bitmask of header flags. Only the reflexive bit is currently
/// assigned; the rest are reserved and must round-trip as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFlags(pub u8);

impl HeaderFlags {
    /// Set when this message is a reflexive (proxy-mode) request.
    pub const REFLEXIVE: u8 = 0b0000_0001;

    /// True if the reflexive bit is set.
    #[must_use]
    pub fn is_reflexive(self) -> bool {
        self.0 & Self::REFLEXIVE != 0
    }
}

/// A NATFW message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NatfwHeader {
    /// Protocol version.
    pub version: u8,
    /// One of the [`msg_type`] constants.
    pub msg_type: u8,
    /// Decremented by each forwarding NF; zero means "do not forward".
    pub hop_count: u8,
    /// Header flag bits.
    pub flags: HeaderFlags,
    /// Length of the following object stream, in 32-bit words.
    pub length_words: u16,
}

impl NatfwHeader {
    /// Wire size of the header itself.
    pub const WIRE_LEN: usize = 8;

    /// Write this header at the buffer's current position.
    ///
    /// # Errors
    /// Returns [`NslpError`] if the buffer runs out of space.
    pub fn encode(self, buf: &mut NetBuf) -> Result<(), NslpError> {
        buf.write_u8(self.version)?;
        buf.write_u8(self.msg_type)?;
        buf.write_u8(self.hop_count)?;
        buf.write_u8(self.flags.0)?;
        buf.write_u16(self.length_words)?;
        buf.write_u16(0)?; // reserved
        Ok(())
    }

    /// Read a header from the buffer's current position.
    ///
    /// # Errors
    /// Returns [`NslpError::Buffer`] if fewer than [`Self::WIRE_LEN`] bytes remain.
    pub fn decode(buf: &mut NetBuf) -> Result<Self, NslpError> {
        let version = buf.read_u8()?;
        let msg_type = buf.read_u8()?;
        let hop_count = buf.read_u8()?;
        let flags = HeaderFlags(buf.read_u8()?);
        let length_words = buf.read_u16()?;
        let _reserved = buf.read_u16()?;
        Ok(Self { version, msg_type, hop_count, flags, length_words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = NatfwHeader {
            version: VERSION,
            msg_type: msg_type::CREATE,
            hop_count: 20,
            flags: HeaderFlags(HeaderFlags::REFLEXIVE),
            length_words: 12,
        };
        let mut buf = NetBuf::new(16);
        header.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        assert_eq!(NatfwHeader::decode(&mut buf).unwrap(), header);
    }

    #[test]
    fn reflexive_flag_reads_back() {
        let flags = HeaderFlags(HeaderFlags::REFLEXIVE);
        assert!(flags.is_reflexive());
        assert!(!HeaderFlags(0).is_reflexive());
    }
}
