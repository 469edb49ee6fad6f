//! The full QoS-NSLP message: header plus an object stream, with
//! required-object matrices per message type.

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::NslpError;
use crate::object::{encode_object, peek_header, ObjectAction, ObjectHeader};
use crate::qos::header::{msg_type, QosHeader};
use crate::qos::objects::{object_type, QosObject};

/// One object as it appears in a message: its extensibility action and
/// decoded (or raw) body.
#[derive(Debug, Clone, PartialEq)]
pub struct QosObjectEntry {
    /// The action bit the sender attached.
    pub action: ObjectAction,
    /// The decoded object.
    pub object: QosObject,
}

/// A full QoS-NSLP message.
#[derive(Debug, Clone, PartialEq)]
pub struct QosMessage {
    /// The message header.
    pub header: QosHeader,
    /// Objects in wire order.
    pub objects: Vec<QosObjectEntry>,
}

fn required_types(msg_type: u8) -> &'static [u16] {
    match msg_type {
        self::msg_type::RESERVE => &[object_type::RII, object_type::RSN, object_type::SESSION_LIFETIME, object_type::QSPEC_OBJECT],
        self::msg_type::QUERY => &[object_type::RII, object_type::QSPEC_OBJECT],
        self::msg_type::RESPONSE => &[object_type::RII, object_type::INFORMATION_CODE],
        self::msg_type::NOTIFY => &[object_type::INFORMATION_CODE],
        _ => &[],
    }
}

impl QosMessage {
    /// The reservation sequence number carried on RESERVE messages, if present.
    #[must_use]
    pub fn rsn(&self) -> Option<u32> {
        self.objects.iter().find_map(|entry| match entry.object {
            QosObject::Rsn(rsn) => Some(rsn),
            _ => None,
        })
    }

    fn validate(&self) -> Result<(), NslpError> {
        let required = required_types(self.header.msg_type);
        let mut seen = std::collections::HashSet::new();
        for entry in &self.objects {
            if !seen.insert(entry.object.object_type()) {
                return Err(NslpError::PduSyntax { offset: 0, detail: "duplicate object type in message" });
            }
        }
        for required_type in required {
            if !seen.contains(required_type) {
                return Err(NslpError::PduSyntax { offset: 0, detail: "message is missing a required object" });
            }
        }
        Ok(())
    }

    /// Encode the full message: header, then each object in order.
    ///
    /// # Errors
    /// Returns [`NslpError`] if the message fails its required-object check
    /// or the buffer runs out of space.
    pub fn encode(&self, buf: &mut NetBuf) -> Result<(), NslpError> {
        self.validate()?;

        let header_offset = buf.position();
        self.header.encode(buf)?;
        let body_start = buf.position();
        for entry in &self.objects {
            let mut body = NetBuf::new(entry.object.body_budget() + 4);
            entry.object.encode_body(&mut body)?;
            let body_bytes = &body.as_slice()[..body.position()];
            encode_object(buf, entry.action, entry.object.object_type(), body_bytes)?;
        }
        let length_words = u16::try_from((buf.position() - body_start) / 4).unwrap_or(u16::MAX);
        buf.copy_from(header_offset + 2, &length_words.to_be_bytes())?;
        Ok(())
    }

    /// Decode a full message from the buffer's current position.
    ///
    /// # Errors
    /// Returns [`NslpError`] on a malformed header, an object whose declared
    /// length disagrees with its body, an unrecognised `Mandatory` object, or
    /// a violated required-object rule.
    pub fn decode(buf: &mut NetBuf, objects: &Registry<u16, QosObject, NslpError>) -> Result<Self, NslpError> {
        let msg_offset = buf.position();
        let header = QosHeader::decode(buf)?;
        let body_end = buf.position() + usize::from(header.length_words) * 4;

        let mut entries = Vec::new();
        while buf.position() < body_end {
            let object_offset = buf.position();
            let object_header = peek_header(buf)?;
            buf.read_u32()?;
            let body_len = usize::from(object_header.length_words) * 4;
            let decoded = objects.decode(object_header.object_type, buf, body_len);
            let object = match decoded {
                Some(result) => result?,
                None if object_header.action == ObjectAction::Mandatory => {
                    return Err(NslpError::UnrecognisedMandatoryObject(object_header.object_type));
                }
                None => {
                    buf.read_bytes(body_len)?;
                    QosObject::Raw { object_type: object_header.object_type, body: Vec::new() }
                }
            };
            check_consumed(&object_header, object_offset, buf.position())?;
            buf.pad_to_4()?;
            entries.push(QosObjectEntry { action: object_header.action, object });
        }

        let message = Self { header, objects: entries };
        message.validate().map_err(|_| NslpError::PduSyntax { offset: msg_offset, detail: "message is missing a required object" })?;
        Ok(message)
    }
}

fn check_consumed(header: &ObjectHeader, object_offset: usize, cursor: usize) -> Result<(), NslpError> {
    let consumed = cursor - (object_offset + 4);
    let declared = usize::from(header.length_words) * 4;
    if consumed != declared {
        return Err(NslpError::WrongLength { object_type: header.object_type, offset: object_offset, declared: header.length_words, actual: consumed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natfw::information_code::InformationCode;
    use crate::qos::objects::default_registry;
    use nsis_qspec::object::object_id;
    use nsis_qspec::parameter::ParamFlags;
    use nsis_qspec::{MsgSequence, QspecObject, QspecParameter, QspecPdu};

    fn registry() -> Registry<u16, QosObject, NslpError> {
        default_registry(nsis_qspec::default_registry(), nsis_auth::attribute::default_registry())
    }

    fn sample_qspec() -> QspecPdu {
        let mut pdu = QspecPdu::new(MsgSequence::Reserve, 0, 0, false);
        let mut object = QspecObject::new(object_id::QOS_DESIRED);
        object.parameters.push(QspecParameter::PathLatency { flags: ParamFlags::default(), microseconds: 1500 });
        pdu.objects.push(object);
        pdu
    }

    #[test]
    fn reserve_message_round_trips() {
        let message = QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESERVE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rii(7) },
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rsn(1) },
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::SessionLifetime(60) },
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::QspecObject(sample_qspec()) },
            ],
        };
        let mut buf = NetBuf::new(256);
        message.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let decoded = QosMessage::decode(&mut buf, &registry()).unwrap();
        assert_eq!(decoded.rsn(), Some(1));
        assert_eq!(decoded, message);
    }

    #[test]
    fn reserve_missing_qspec_is_rejected() {
        let message = QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESERVE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rii(7) },
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rsn(1) },
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::SessionLifetime(60) },
            ],
        };
        let mut buf = NetBuf::new(128);
        assert!(message.encode(&mut buf).is_err());
    }

    #[test]
    fn response_message_round_trips() {
        let message = QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESPONSE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rii(7) },
                QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::InformationCode(InformationCode::success()) },
            ],
        };
        let mut buf = NetBuf::new(128);
        message.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let decoded = QosMessage::decode(&mut buf, &registry()).unwrap();
        assert_eq!(decoded, message);
    }
}
