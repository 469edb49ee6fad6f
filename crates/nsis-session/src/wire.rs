//! Glue between the NSLP codec and the session-authorization HMAC pipeline.
//!
//! MRI and SessionID are GIST/NTLP transport fields — out of this crate's
//! scope entirely — so this module only asks the caller for their byte
//! ranges inside the signing buffer; it never parses them. Everything else
//! (finding the session-auth object, collecting the objects an
//! `NslpObjectList` names, excluding the MAC bytes from its own object) is
//! wire knowledge `nsis-auth` deliberately does not have, which is why this
//! lives here instead of there.
//!
//! Layout expected of `buf`: the caller lays out `[mri][session id][encoded
//! NSLP message]` contiguously (in whatever order, as long as the three
//! ranges are disjoint and given accurately) and passes the three ranges
//! plus the message's header length so this module can scan its body for
//! objects.

use nsis_auth::attribute::AuthAttribute;
use nsis_auth::error::AuthError;
use nsis_auth::hmac::{check_hmac, serialize_hmac, TransformId};
use nsis_auth::key_registry::KeyRegistry;
use nsis_auth::SessionAuthObject;
use nsis_buf::tlp::fill_tlp_list;
use nsis_buf::{BufferError, NetBuf};
use nsis_ie::Registry;
use nsis_nslp::natfw::objects::object_type::SESSION_AUTH;
use nsis_nslp::object::ObjectHeader;

/// Failures from locating, signing, or verifying a session-auth object
/// inside an already-encoded message buffer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The buffer ran out of bytes or a stale TLP list was consulted.
    #[error(transparent)]
    Buffer(#[from] BufferError),
    /// Parsing or signing the session-auth object itself failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

struct Located {
    object_start: usize,
    object_end: usize,
    mac_slot: (usize, usize),
    key_id: u32,
    transform: TransformId,
    covered_types: Vec<u16>,
}

fn object_header_span(word: u32) -> usize {
    ObjectHeader::unpack(word).total_wire_len()
}

fn object_header_type(word: u32) -> u16 {
    ObjectHeader::unpack(word).object_type
}

fn locate_session_auth_objects(
    buf: &mut NetBuf,
    msg_body_start: usize,
    msg_body_end: usize,
    registry: &Registry<(u8, u8), AuthAttribute, AuthError>,
) -> Result<Vec<Located>, WireError> {
    let list = fill_tlp_list(buf, msg_body_start, msg_body_end, object_header_span, |_| 0, object_header_type)?;
    let offsets = list.get(buf, 0, SESSION_AUTH)?.to_vec();

    let mut located = Vec::new();
    for object_start in offsets {
        let header = ObjectHeader::unpack(buf.peek_u32_at(object_start)?);
        let body_start = object_start + 4;
        let body_len = usize::from(header.length_words) * 4;
        buf.set_position(body_start)?;
        let (_object, encoded) = SessionAuthObject::decode_located(buf, registry, body_len)?;

        let Some(transform) = encoded.transform else { continue };
        let Some(mac_slot) = encoded.mac_slot else { continue };
        let Some(key_id) = encoded.key_id else { continue };
        located.push(Located {
            object_start,
            object_end: body_start + body_len,
            mac_slot,
            key_id,
            transform,
            covered_types: encoded.covered_types.unwrap_or_default(),
        });
    }
    Ok(located)
}

fn covered_ranges(
    buf: &NetBuf,
    mri_range: (usize, usize),
    session_id_range: (usize, usize),
    located: &Located,
    msg_body_start: usize,
    msg_body_end: usize,
) -> Result<Vec<(usize, usize)>, WireError> {
    let list = fill_tlp_list(buf, msg_body_start, msg_body_end, object_header_span, |_| 0, object_header_type)?;

    let mut spans = vec![mri_range, session_id_range, (located.object_start, located.mac_slot.0), (located.mac_slot.1, located.object_end)];
    for &type_code in &located.covered_types {
        if type_code == SESSION_AUTH {
            continue;
        }
        for &offset in list.get(buf, 0, type_code)? {
            let header = ObjectHeader::unpack(buf.peek_u32_at(offset)?);
            spans.push((offset, offset + header.total_wire_len()));
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans.dedup_by_key(|span| span.0);
    Ok(spans)
}

/// Fill the MAC slot of every `HMAC_SIGNED` session-auth object found inside
/// `msg_body_range` of `buf`, signing over the NSLP-id, the MRI and
/// SessionID ranges, the session-auth object itself (MAC bytes excluded),
/// and every object an `NslpObjectList` attribute names.
///
/// A message with no session-auth object, or one whose `AuthData` is a
/// plain opaque token rather than an `HMAC_SIGNED` one, is left untouched.
///
/// # Errors
/// Returns [`WireError`] if the session-auth object is malformed or its
/// key-id has no entry in `keys`.
pub fn sign_message(
    buf: &mut NetBuf,
    nslp_id: u16,
    mri_range: (usize, usize),
    session_id_range: (usize, usize),
    msg_body_range: (usize, usize),
    keys: &KeyRegistry,
    auth_registry: &Registry<(u8, u8), AuthAttribute, AuthError>,
) -> Result<(), WireError> {
    let located = locate_session_auth_objects(buf, msg_body_range.0, msg_body_range.1, auth_registry)?;
    for entry in located {
        let ranges = covered_ranges(buf, mri_range, session_id_range, &entry, msg_body_range.0, msg_body_range.1)?;
        let (key_bytes, _) = keys.get(entry.key_id).ok_or(AuthError::UnknownKey(entry.key_id))?;
        serialize_hmac(buf, nslp_id, &ranges, entry.mac_slot, &key_bytes, entry.transform)?;
    }
    Ok(())
}

/// Recompute and compare the MAC of every `HMAC_SIGNED` session-auth object
/// found inside `msg_body_range` of `buf`. Returns `true` only if every one
/// of them verifies (vacuously `true` if none are `HMAC_SIGNED`) — per the
/// verification flow, any single mismatch rejects the whole message.
///
/// # Errors
/// Returns [`WireError`] if the session-auth object is malformed or its
/// key-id has no entry in `keys`.
pub fn verify_message(
    buf: &mut NetBuf,
    nslp_id: u16,
    mri_range: (usize, usize),
    session_id_range: (usize, usize),
    msg_body_range: (usize, usize),
    keys: &KeyRegistry,
    auth_registry: &Registry<(u8, u8), AuthAttribute, AuthError>,
) -> Result<bool, WireError> {
    let located = locate_session_auth_objects(buf, msg_body_range.0, msg_body_range.1, auth_registry)?;
    for entry in located {
        let ranges = covered_ranges(buf, mri_range, session_id_range, &entry, msg_body_range.0, msg_body_range.1)?;
        let (key_bytes, _) = keys.get(entry.key_id).ok_or(AuthError::UnknownKey(entry.key_id))?;
        if !check_hmac(buf, nslp_id, &ranges, entry.mac_slot, &key_bytes, entry.transform)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_auth::attribute::default_registry;
    use nsis_nslp::natfw::header::{HeaderFlags, VERSION};
    use nsis_nslp::natfw::objects::{NatfwObject, RuleAction};
    use nsis_nslp::natfw::{msg_type, NatfwHeader, NatfwMessage, NatfwObjectEntry};
    use nsis_nslp::ObjectAction;

    fn signed_auth_object(mac_len: usize) -> NatfwObject {
        NatfwObject::SessionAuth(SessionAuthObject {
            attributes: vec![
                AuthAttribute::HmacSigned(TransformId::HmacSha1_96),
                AuthAttribute::NslpObjectList(vec![nsis_nslp::natfw::objects::object_type::MESSAGE_SEQUENCE_NUMBER]),
                AuthAttribute::AuthData { key_id: 7, data: vec![0u8; mac_len] },
            ],
        })
    }

    fn message_with_auth() -> NatfwMessage {
        NatfwMessage {
            header: NatfwHeader { version: VERSION, msg_type: msg_type::CREATE, hop_count: 20, flags: HeaderFlags(0), length_words: 0 },
            objects: vec![
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::SessionLifetime(30) },
                NatfwObjectEntry {
                    action: ObjectAction::Mandatory,
                    object: NatfwObject::ExtendedFlowInfo { rule_action: RuleAction::Allow, sub_ports: 0 },
                },
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::MessageSequenceNumber(9) },
                NatfwObjectEntry { action: ObjectAction::Ignore, object: signed_auth_object(12) },
            ],
        }
    }

    #[test]
    fn signs_and_verifies_a_natfw_message() {
        let mut buf = NetBuf::new(256);
        buf.write_bytes(b"mri-bytes...").unwrap();
        buf.write_bytes(b"session-id..").unwrap();
        let msg_start = buf.position();
        message_with_auth().encode(&mut buf).unwrap();
        let msg_end = buf.position();

        let keys = KeyRegistry::new();
        keys.store(7, b"a shared secret key material".to_vec(), TransformId::HmacSha1_96);
        let registry = default_registry();

        let body_start = msg_start + nsis_nslp::natfw::header::NatfwHeader::WIRE_LEN;
        sign_message(&mut buf, 0x00E4, (0, 12), (12, 24), (body_start, msg_end), &keys, &registry).unwrap();
        assert!(verify_message(&mut buf, 0x00E4, (0, 12), (12, 24), (body_start, msg_end), &keys, &registry).unwrap());
    }

    #[test]
    fn tampering_a_covered_object_fails_verification() {
        let mut buf = NetBuf::new(256);
        buf.write_bytes(b"mri-bytes...").unwrap();
        buf.write_bytes(b"session-id..").unwrap();
        let msg_start = buf.position();
        message_with_auth().encode(&mut buf).unwrap();
        let msg_end = buf.position();

        let keys = KeyRegistry::new();
        keys.store(7, b"a shared secret key material".to_vec(), TransformId::HmacSha1_96);
        let registry = default_registry();

        let body_start = msg_start + nsis_nslp::natfw::header::NatfwHeader::WIRE_LEN;
        sign_message(&mut buf, 0x00E4, (0, 12), (12, 24), (body_start, msg_end), &keys, &registry).unwrap();

        let flipped = buf.copy_to(14, 1).unwrap()[0] ^ 0xFF;
        buf.copy_from(14, &[flipped]).unwrap();

        assert!(!verify_message(&mut buf, 0x00E4, (0, 12), (12, 24), (body_start, msg_end), &keys, &registry).unwrap());
    }
}
