//! QSPEC objects: the middle level of the PDU / object / parameter
//! three-level nesting. Each object carries a 32-bit header (an error flag,
//! a 12-bit object id, and a 12-bit length in words excluding the header)
//! followed by one or more parameters.

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::QspecError;
use crate::parameter::{decode_parameter, QspecParameter};

/// QSPEC object type assignments.
pub mod object_id {
    /// The sender's (QNI's) desired QoS. Read-only once past the QNI.
    pub const QOS_DESIRED: u16 = 0;
    /// The QoS currently available along the path.
    pub const QOS_AVAILABLE: u16 = 1;
    /// The QoS actually reserved.
    pub const QOS_RESERVED: u16 = 2;
    /// The minimum acceptable QoS. Read-only once past the QNI.
    pub const MINIMUM_QOS: u16 = 3;
}

/// True for object types the reference template marks read-only past their
/// point of origin (`qos_desired` and `minimum_qos`).
#[must_use]
pub fn is_read_only(object_id: u16) -> bool {
    matches!(object_id, object_id::QOS_DESIRED | object_id::MINIMUM_QOS)
}

#[derive(Debug, Clone, Copy)]
struct ObjectHeader {
    error: bool,
    object_id: u16,
    length_words: u16,
}

impl ObjectHeader {
    fn parse(word: u32) -> Self {
        Self { error: (word >> 31) & 1 != 0, object_id: ((word >> 16) & 0x0FFF) as u16, length_words: (word & 0x0FFF) as u16 }
    }

    fn pack(self) -> u32 {
        (u32::from(self.error) << 31) | (u32::from(self.object_id & 0x0FFF) << 16) | u32::from(self.length_words & 0x0FFF)
    }
}

/// One QSPEC object: an id naming which of the four QSPEC-T roles it plays,
/// an error flag, and its non-empty list of parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QspecObject {
    /// The object type (see [`object_id`]).
    pub object_id: u16,
    /// Set by a QNE that detected an error while processing this object.
    pub error: bool,
    /// The object's parameters, in wire order. Never empty for a value that
    /// passed [`Self::check`].
    pub parameters: Vec<QspecParameter>,
}

impl QspecObject {
    /// Construct a new, empty object of the given type. Parameters must be
    /// pushed onto [`Self::parameters`] before the object will pass
    /// [`Self::check`].
    #[must_use]
    pub fn new(object_id: u16) -> Self {
        Self { object_id, error: false, parameters: Vec::new() }
    }

    /// Whether this object's type is read-only past the QNI (see
    /// [`is_read_only`]).
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        is_read_only(self.object_id)
    }

    fn check(&self) -> Result<(), &'static str> {
        if self.object_id & !0x0FFF != 0 {
            return Err("object id must fit in 12 bits");
        }
        if self.parameters.is_empty() {
            return Err("a QSPEC object must carry at least one parameter");
        }
        let mut seen = std::collections::HashSet::new();
        for param in &self.parameters {
            if !seen.insert(param.parameter_id()) {
                return Err("duplicate parameter id within one object");
            }
        }
        Ok(())
    }

    fn encoded_body_len(&self) -> usize {
        // Each encoded parameter already accounts for its own tail padding,
        // so their lengths sum directly without a further rounding step.
        self.parameters.iter().map(QspecParameter::wire_len).sum()
    }

    /// Total wire size (header plus parameters) this object would occupy
    /// if encoded now. Used by the enclosing PDU to size its own
    /// length-in-words header.
    pub(crate) fn wire_len(&self) -> usize {
        4 + self.encoded_body_len()
    }

    /// Encode this object (header, parameters, no extra object-level
    /// padding since every parameter already pads itself) into `buf`.
    ///
    /// # Errors
    /// Returns [`QspecError`] if the object fails [`Self::check`], a
    /// parameter fails its own validation, or the buffer runs out of space.
    pub fn encode(&self, buf: &mut NetBuf) -> Result<(), QspecError> {
        self.check().map_err(|detail| QspecError::PduSyntax { item_id: self.object_id, offset: buf.position(), detail })?;

        let body_len = self.encoded_body_len();
        let length_words = (body_len as u16).div_ceil(4);
        let header = ObjectHeader { error: self.error, object_id: self.object_id, length_words };
        buf.write_u32(header.pack())?;
        for param in &self.parameters {
            param.encode(buf)?;
        }
        Ok(())
    }
}

/// Decode one object starting at the buffer's current position, dispatching
/// its parameters through `registry`.
///
/// # Errors
/// Returns [`QspecError`] on a short buffer, a misdeclared length, an empty
/// parameter list, or a duplicate parameter id.
pub fn decode_object(
    buf: &mut NetBuf,
    registry: &Registry<u16, QspecParameter, QspecError>,
) -> Result<QspecObject, QspecError> {
    let header_offset = buf.position();
    let header = ObjectHeader::parse(buf.peek_u32()?);
    buf.read_u32()?;

    let declared_bytes = usize::from(header.length_words) * 4;
    let body_start = buf.position();
    let body_end = body_start + declared_bytes;

    let mut parameters = Vec::new();
    while buf.position() < body_end {
        parameters.push(decode_parameter(buf, registry)?);
    }

    let actual = buf.position() - body_start;
    if actual != declared_bytes {
        return Err(QspecError::WrongLength {
            item_id: header.object_id,
            offset: header_offset,
            declared: header.length_words,
            actual,
        });
    }

    let object = QspecObject { object_id: header.object_id, error: header.error, parameters };
    object.check().map_err(|detail| QspecError::PduSyntax { item_id: header.object_id, offset: header_offset, detail })?;
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{default_registry, ParamFlags};

    fn sample_object() -> QspecObject {
        let mut object = QspecObject::new(object_id::QOS_DESIRED);
        object.parameters.push(QspecParameter::PathLatency { flags: ParamFlags::default(), microseconds: 1500 });
        object.parameters.push(QspecParameter::SlackTerm { flags: ParamFlags::default(), microseconds: 0 });
        object
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let object = sample_object();
        let mut buf = NetBuf::new(64);
        object.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        let decoded = decode_object(&mut buf, &registry).unwrap();
        assert_eq!(decoded, object);
    }

    #[test]
    fn empty_object_is_rejected() {
        let object = QspecObject::new(object_id::QOS_RESERVED);
        let mut buf = NetBuf::new(16);
        assert!(object.encode(&mut buf).is_err());
    }

    #[test]
    fn duplicate_parameter_ids_are_rejected() {
        let mut object = QspecObject::new(object_id::QOS_RESERVED);
        object.parameters.push(QspecParameter::SlackTerm { flags: ParamFlags::default(), microseconds: 1 });
        object.parameters.push(QspecParameter::SlackTerm { flags: ParamFlags::default(), microseconds: 2 });
        let mut buf = NetBuf::new(32);
        assert!(object.encode(&mut buf).is_err());
    }

    #[test]
    fn qos_desired_and_minimum_qos_are_read_only() {
        assert!(is_read_only(object_id::QOS_DESIRED));
        assert!(is_read_only(object_id::MINIMUM_QOS));
        assert!(!is_read_only(object_id::QOS_AVAILABLE));
        assert!(!is_read_only(object_id::QOS_RESERVED));
    }
}
