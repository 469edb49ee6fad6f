//! The full NATFW message: header plus an object stream, with the
//! per-message-type required/optional object matrices from `natfw_create.h`,
//! `natfw_ext.h`, `natfw_response.h`, and `natfw_notify.h`.

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::NslpError;
use crate::natfw::header::{msg_type, NatfwHeader};
use crate::natfw::objects::{object_type, NatfwObject};
use crate::object::{encode_object, peek_header, ObjectAction, ObjectHeader};

/// One object as it appears in a message: its extensibility action and
/// decoded (or raw) body.
#[derive(Debug, Clone, PartialEq)]
pub struct NatfwObjectEntry {
    /// The action bit the sender attached.
    pub action: ObjectAction,
    /// The decoded object.
    pub object: NatfwObject,
}

/// A full NATFW-NSLP message.
#[derive(Debug, Clone, PartialEq)]
pub struct NatfwMessage {
    /// The message header.
    pub header: NatfwHeader,
    /// Objects in wire order.
    pub objects: Vec<NatfwObjectEntry>,
}

fn required_types(msg_type: u8) -> &'static [u16] {
    match msg_type {
        self::msg_type::CREATE => &[object_type::SESSION_LIFETIME, object_type::EXTENDED_FLOW_INFO, object_type::MESSAGE_SEQUENCE_NUMBER],
        self::msg_type::EXT => &[
            object_type::SESSION_LIFETIME,
            object_type::EXTENDED_FLOW_INFO,
            object_type::MESSAGE_SEQUENCE_NUMBER,
            object_type::DATA_TERMINAL_INFO,
        ],
        self::msg_type::RESPONSE | self::msg_type::NOTIFY => &[object_type::INFORMATION_CODE],
        _ => &[],
    }
}

impl NatfwMessage {
    /// The message sequence number carried by CREATE/EXT messages, if present.
    #[must_use]
    pub fn msn(&self) -> Option<u32> {
        self.objects.iter().find_map(|entry| match entry.object {
            NatfwObject::MessageSequenceNumber(msn) => Some(msn),
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
            let mut body = NetBuf::new(body_budget(&entry.object));
            entry.object.encode_body(&mut body)?;
            let body_bytes = &body.as_slice()[..body.position()];
            encode_object(buf, entry.action, entry.object.object_type(), body_bytes)?;
        }
        let length_words = u16::try_from((buf.position() - body_start) / 4).unwrap_or(u16::MAX);
        buf.copy_from(header_offset + 4, &length_words.to_be_bytes())?;
        Ok(())
    }

    /// Decode a full message from the buffer's current position.
    ///
    /// # Errors
    /// Returns [`NslpError`] on a malformed header, an object whose declared
    /// length disagrees with its body, an unrecognised `Mandatory` object, or
    /// a violated required-object rule.
    pub fn decode(buf: &mut NetBuf, objects: &Registry<u16, NatfwObject, NslpError>) -> Result<Self, NslpError> {
        let msg_offset = buf.position();
        let header = NatfwHeader::decode(buf)?;
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
                    NatfwObject::Raw { object_type: object_header.object_type, body: Vec::new() }
                }
            };
            check_consumed(&object_header, object_offset, buf.position())?;
            buf.pad_to_4()?;
            entries.push(NatfwObjectEntry { action: object_header.action, object });
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

fn body_budget(object: &NatfwObject) -> usize {
    match object {
        NatfwObject::SessionAuth(_) => 512,
        other => other.body_len(0) + 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natfw::header::HeaderFlags;
    use crate::natfw::objects::default_registry;
    use std::net::{IpAddr, Ipv4Addr};

    fn registry() -> Registry<u16, NatfwObject, NslpError> {
        default_registry(nsis_auth::attribute::default_registry())
    }

    fn base_header(msg_type: u8) -> NatfwHeader {
        NatfwHeader { version: 1, msg_type, hop_count: 20, flags: HeaderFlags(0), length_words: 0 }
    }

    #[test]
    fn create_message_round_trips() {
        let message = NatfwMessage {
            header: base_header(msg_type::CREATE),
            objects: vec![
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::SessionLifetime(30) },
                NatfwObjectEntry {
                    action: ObjectAction::Mandatory,
                    object: NatfwObject::ExtendedFlowInfo { rule_action: crate::natfw::objects::RuleAction::Allow, sub_ports: 0 },
                },
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::MessageSequenceNumber(1) },
            ],
        };
        let mut buf = NetBuf::new(128);
        message.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let decoded = NatfwMessage::decode(&mut buf, &registry()).unwrap();
        assert_eq!(decoded.msn(), Some(1));
        assert_eq!(decoded.objects.len(), 3);
    }

    #[test]
    fn create_missing_required_object_is_rejected() {
        let message = NatfwMessage {
            header: base_header(msg_type::CREATE),
            objects: vec![NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::SessionLifetime(30) }],
        };
        let mut buf = NetBuf::new(64);
        assert!(message.encode(&mut buf).is_err());
    }

    #[test]
    fn response_message_round_trips() {
        let message = NatfwMessage {
            header: base_header(msg_type::RESPONSE),
            objects: vec![
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::InformationCode(crate::natfw::information_code::InformationCode::success()) },
                NatfwObjectEntry {
                    action: ObjectAction::Ignore,
                    object: NatfwObject::ExternalAddress { address: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5)), port: 51820 },
                },
            ],
        };
        let mut buf = NetBuf::new(128);
        message.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let decoded = NatfwMessage::decode(&mut buf, &registry()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn duplicate_object_types_are_rejected() {
        let message = NatfwMessage {
            header: base_header(msg_type::NOTIFY),
            objects: vec![
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::InformationCode(crate::natfw::information_code::InformationCode::success()) },
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::InformationCode(crate::natfw::information_code::InformationCode::success()) },
            ],
        };
        let mut buf = NetBuf::new(64);
        assert!(message.encode(&mut buf).is_err());
    }
}
