//! The QSPEC PDU: the outermost level of the template, carrying a message
//! sequence / object combination pair ("QSPEC Proc.") and the list of
//! objects it addresses.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Vers.|I|QSPECType|r|r|  QSPEC Proc.  |        Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//! `QSPEC Proc.` further splits into a 4-bit message sequence and a 4-bit
//! object combination. `Length` counts 32-bit words in the object list,
//! excluding this header word.

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::QspecError;
use crate::object::{decode_object, QspecObject};
use crate::parameter::QspecParameter;

/// The version of the QSPEC template this crate implements.
pub const QSPEC_VERSION: u8 = 1;

/// Message sequence values (the "Mes.Sq" nibble), naming which direction
/// and role this QSPEC travels in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgSequence {
    /// QNI -> QNR, signalling desired/reserved QoS.
    Reserve,
    /// QNR -> QNI, reporting available QoS along the path.
    Query,
    /// A notification carrying no reservation semantics of its own.
    Notify,
    /// A message sequence value this crate has no name for.
    Other(u8),
}

impl MsgSequence {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Reserve,
            1 => Self::Query,
            2 => Self::Notify,
            other => Self::Other(other),
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Reserve => 0,
            Self::Query => 1,
            Self::Notify => 2,
            Self::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PduHeader {
    version: u8,
    local_qspec: bool,
    qspec_type: u8,
    msg_sequence: MsgSequence,
    obj_combination: u8,
    length_words: u16,
}

impl PduHeader {
    fn parse(word: u32) -> Self {
        Self {
            version: (word >> 28) as u8,
            local_qspec: (word >> 27) & 1 != 0,
            qspec_type: ((word >> 22) & 0x1F) as u8,
            msg_sequence: MsgSequence::from_raw(((word >> 16) & 0xF) as u8),
            obj_combination: ((word >> 12) & 0xF) as u8,
            length_words: (word & 0x0FFF) as u16,
        }
    }

    fn pack(self) -> u32 {
        (u32::from(self.version & 0xF) << 28)
            | (u32::from(self.local_qspec) << 27)
            | (u32::from(self.qspec_type & 0x1F) << 22)
            | (u32::from(self.msg_sequence.to_raw() & 0xF) << 16)
            | (u32::from(self.obj_combination & 0xF) << 12)
            | u32::from(self.length_words & 0x0FFF)
    }
}

/// A full QSPEC PDU: header plus its (non-empty) list of objects.
#[derive(Debug, Clone, PartialEq)]
pub struct QspecPdu {
    /// Template version; always [`QSPEC_VERSION`] for PDUs this crate
    /// produces, but preserved verbatim when decoding.
    pub version: u8,
    /// True when this QSPEC is scoped to the local network only and must
    /// not be forwarded beyond it.
    pub local_qspec: bool,
    /// Identifies which application-specific QSPEC this PDU instantiates.
    pub qspec_type: u8,
    /// Which of the defined message sequences this PDU follows.
    pub msg_sequence: MsgSequence,
    /// Which combination of objects `msg_sequence` calls for. The codec
    /// accepts any syntactically valid combination; it does not itself
    /// enforce the profile table between sequence and combination.
    pub obj_combination: u8,
    /// The objects carried, in wire order. Never empty for a value that
    /// passed [`Self::check`].
    pub objects: Vec<QspecObject>,
}

impl QspecPdu {
    /// Construct a new, empty PDU. Objects must be pushed onto
    /// [`Self::objects`] before the PDU will pass [`Self::check`].
    #[must_use]
    pub fn new(msg_sequence: MsgSequence, obj_combination: u8, qspec_type: u8, local_qspec: bool) -> Self {
        Self { version: QSPEC_VERSION, local_qspec, qspec_type, msg_sequence, obj_combination, objects: Vec::new() }
    }

    fn check(&self) -> Result<(), &'static str> {
        if self.objects.is_empty() {
            return Err("a QSPEC PDU must carry at least one object");
        }
        let mut seen = std::collections::HashSet::new();
        for object in &self.objects {
            if !seen.insert(object.object_id) {
                return Err("duplicate object id within one QSPEC");
            }
        }
        Ok(())
    }

    fn encoded_body_len(&self) -> usize {
        self.objects.iter().map(QspecObject::wire_len).sum()
    }

    /// Encode this PDU (header plus objects) into `buf`.
    ///
    /// # Errors
    /// Returns [`QspecError`] if the PDU fails [`Self::check`], any object
    /// fails its own validation, or the buffer runs out of space.
    pub fn encode(&self, buf: &mut NetBuf) -> Result<(), QspecError> {
        self.check().map_err(|detail| QspecError::PduSyntax {
            item_id: u16::from(self.qspec_type),
            offset: buf.position(),
            detail,
        })?;

        let body_len = self.encoded_body_len();
        let length_words = (body_len as u16).div_ceil(4);
        let header = PduHeader {
            version: self.version,
            local_qspec: self.local_qspec,
            qspec_type: self.qspec_type,
            msg_sequence: self.msg_sequence,
            obj_combination: self.obj_combination,
            length_words,
        };
        buf.write_u32(header.pack())?;
        for object in &self.objects {
            object.encode(buf)?;
        }
        Ok(())
    }
}

/// Decode one PDU starting at the buffer's current position, dispatching
/// its objects' parameters through `registry`.
///
/// Per the reference template the PDU carries no independent length field
/// for itself — only for the object list that follows the header — so the
/// caller is responsible for having positioned `buf` such that
/// [`nsis_buf::NetBuf::remaining`] reflects exactly this QSPEC's extent
/// before calling this function (the enclosing NSLP object's own length
/// field is normally what provides that bound).
///
/// # Errors
/// Returns [`QspecError`] on a short buffer, a declared length that does
/// not match the bytes the objects actually consumed, an empty object
/// list, or a duplicate object id.
pub fn decode_pdu(
    buf: &mut NetBuf,
    registry: &Registry<u16, QspecParameter, QspecError>,
) -> Result<QspecPdu, QspecError> {
    let header_offset = buf.position();
    let header = PduHeader::parse(buf.peek_u32()?);
    buf.read_u32()?;

    let declared_bytes = usize::from(header.length_words) * 4;
    let body_start = buf.position();
    let body_end = body_start + declared_bytes;

    let mut objects = Vec::new();
    while buf.position() < body_end {
        objects.push(decode_object(buf, registry)?);
    }

    let actual = buf.position() - body_start;
    if actual != declared_bytes {
        return Err(QspecError::WrongLength {
            item_id: u16::from(header.qspec_type),
            offset: header_offset,
            declared: header.length_words,
            actual,
        });
    }

    let pdu = QspecPdu {
        version: header.version,
        local_qspec: header.local_qspec,
        qspec_type: header.qspec_type,
        msg_sequence: header.msg_sequence,
        obj_combination: header.obj_combination,
        objects,
    };
    if let Err(detail) = pdu.check() {
        tracing::warn!(qspec_type = header.qspec_type, offset = header_offset, detail, "QSPEC PDU failed structural check");
        return Err(QspecError::PduSyntax { item_id: u16::from(header.qspec_type), offset: header_offset, detail });
    }
    tracing::debug!(
        qspec_type = pdu.qspec_type,
        objects = pdu.objects.len(),
        msg_sequence = ?pdu.msg_sequence,
        "decoded QSPEC PDU"
    );
    Ok(pdu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::object_id;
    use crate::parameter::{default_registry, ParamFlags};

    fn sample_pdu() -> QspecPdu {
        let mut pdu = QspecPdu::new(MsgSequence::Reserve, 0, 0, false);
        let mut object = QspecObject::new(object_id::QOS_DESIRED);
        object.parameters.push(QspecParameter::Tmod {
            flags: ParamFlags { mandatory: true, error: false, not_supported: false },
            rate: 500_000.0,
            bucket_depth: 8192.0,
            peak_data_rate: 1_000_000.0,
            min_policed_unit: 128,
        });
        pdu.objects.push(object);
        pdu
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let pdu = sample_pdu();
        let mut buf = NetBuf::new(128);
        pdu.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        let decoded = decode_pdu(&mut buf, &registry).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn empty_pdu_is_rejected() {
        let pdu = QspecPdu::new(MsgSequence::Query, 0, 0, false);
        let mut buf = NetBuf::new(16);
        assert!(pdu.encode(&mut buf).is_err());
    }

    #[test]
    fn duplicate_object_ids_are_rejected() {
        let mut pdu = QspecPdu::new(MsgSequence::Reserve, 0, 0, false);
        let mut a = QspecObject::new(object_id::QOS_RESERVED);
        a.parameters.push(QspecParameter::SlackTerm { flags: ParamFlags::default(), microseconds: 1 });
        let mut b = QspecObject::new(object_id::QOS_RESERVED);
        b.parameters.push(QspecParameter::SlackTerm { flags: ParamFlags::default(), microseconds: 2 });
        pdu.objects.push(a);
        pdu.objects.push(b);
        let mut buf = NetBuf::new(64);
        assert!(pdu.encode(&mut buf).is_err());
    }

    #[test]
    fn multi_object_pdu_round_trips() {
        let mut pdu = QspecPdu::new(MsgSequence::Query, 1, 0, true);
        let mut desired = QspecObject::new(object_id::QOS_DESIRED);
        desired.parameters.push(QspecParameter::PathLatency { flags: ParamFlags::default(), microseconds: 2000 });
        let mut available = QspecObject::new(object_id::QOS_AVAILABLE);
        available.parameters.push(QspecParameter::PathPlr { flags: ParamFlags::default(), ratio: 0.001 });
        pdu.objects.push(desired);
        pdu.objects.push(available);

        let mut buf = NetBuf::new(128);
        pdu.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        let decoded = decode_pdu(&mut buf, &registry).unwrap();
        assert_eq!(decoded, pdu);
    }
}
