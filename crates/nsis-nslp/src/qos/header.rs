//! The QoS-NSLP message header. Like NATFW's, the retained
//! `examples/original_source/nsis-ka/qos-nslp/include/*.h` files kept no
//! concrete wire layout (SVN-stub headers only), so this mirrors the
//! NATFW header's shape for consistency across the two applications.

use nsis_buf::NetBuf;

use crate::error::NslpError;

/// QoS-NSLP message type codes.
pub mod msg_type {
    /// Request a reservation (QNI -> QNR).
    pub const RESERVE: u8 = 1;
    /// Query available QoS along the path without reserving.
    pub const QUERY: u8 = 2;
    /// Response to a RESERVE or QUERY.
    pub const RESPONSE: u8 = 3;
    /// Asynchronous notification.
    pub const NOTIFY: u8 = 4;
}

/// The protocol version this crate speaks.
pub const VERSION: u8 = 1;

/// A QoS-NSLP message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QosHeader {
    /// Protocol version.
    pub version: u8,
    /// One of the [`msg_type`] constants.
    pub msg_type: u8,
    /// Length of the following object stream, in 32-bit words.
    pub length_words: u16,
}

impl QosHeader {
    /// Wire size of the header itself.
    pub const WIRE_LEN: usize = 4;

    /// Write this header at the buffer's current position.
    ///
    /// # Errors
    /// Returns [`NslpError`] if the buffer runs out of space.
    pub fn encode(self, buf: &mut NetBuf) -> Result<(), NslpError> {
        buf.write_u8(self.version)?;
        buf.write_u8(self.msg_type)?;
        buf.write_u16(self.length_words)?;
        Ok(())
    }

    /// Read a header from the buffer's current position.
    ///
    /// # Errors
    /// Returns [`NslpError::Buffer`] if fewer than [`Self::WIRE_LEN`] bytes remain.
    pub fn decode(buf: &mut NetBuf) -> Result<Self, NslpError> {
        let version = buf.read_u8()?;
        let msg_type = buf.read_u8()?;
        let length_words = buf.read_u16()?;
        Ok(Self { version, msg_type, length_words })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = QosHeader { version: VERSION, msg_type: msg_type::RESERVE, length_words: 9 };
        let mut buf = NetBuf::new(8);
        header.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        assert_eq!(QosHeader::decode(&mut buf).unwrap(), header);
    }
}
