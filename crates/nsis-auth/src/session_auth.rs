//! [`SessionAuthObject`]: the session-authorization NSLP object's body as a
//! stream of [`AuthAttribute`]s, plus the presence rules and MAC-slot
//! bookkeeping the HMAC layer needs.

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::attribute::{decode_attribute, AuthAttribute};
use crate::error::AuthError;
use crate::hmac::TransformId;

/// A session-authorization object: an ordered set of attributes, sorted by
/// `(xtype, subtype)` before every serialisation so the signed byte stream
/// does not depend on arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAuthObject {
    /// Attributes in the order they were parsed (or pushed, for one this
    /// crate is building). [`Self::encode`] sorts a copy before writing.
    pub attributes: Vec<AuthAttribute>,
}

/// What [`SessionAuthObject::encode`] learned about the object it just
/// wrote — where it sits in the buffer, where the MAC bytes are (if an
/// `AuthData` attribute is present), and what the HMAC layer needs to know
/// to fill or verify that slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAuth {
    /// Absolute offset of the object body's first byte.
    pub body_start: usize,
    /// Absolute offset one past the object body's last byte (padding excluded).
    pub body_end: usize,
    /// Absolute byte range of the raw MAC/token bytes inside the `AuthData`
    /// attribute, if one is present.
    pub mac_slot: Option<(usize, usize)>,
    /// The `AuthData` attribute's key-id, if present.
    pub key_id: Option<u32>,
    /// The transform named by an `HmacSigned` attribute, if present.
    pub transform: Option<TransformId>,
    /// The NSLP object type codes named by an `NslpObjectList` attribute,
    /// if present.
    pub covered_types: Option<Vec<u16>>,
}

impl SessionAuthObject {
    /// An empty session-auth object. Attributes are added via
    /// [`Self::attributes`] directly (it is a plain field) before encoding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn find_hmac_signed(&self) -> Option<TransformId> {
        self.attributes.iter().find_map(|a| match a {
            AuthAttribute::HmacSigned(t) => Some(*t),
            _ => None,
        })
    }

    fn find_object_list(&self) -> Option<&[u16]> {
        self.attributes.iter().find_map(|a| match a {
            AuthAttribute::NslpObjectList(types) => Some(types.as_slice()),
            _ => None,
        })
    }

    fn find_auth_data(&self) -> Option<(u32, usize)> {
        self.attributes.iter().find_map(|a| match a {
            AuthAttribute::AuthData { key_id, data } => Some((*key_id, data.len())),
            _ => None,
        })
    }

    /// Enforce the cross-attribute presence rules:
    /// `HmacSigned` requires both `NslpObjectList` and `AuthData`;
    /// `NslpObjectList` alone still requires `AuthData`.
    ///
    /// # Errors
    /// Returns [`AuthError::MissingAttribute`] when a rule is violated.
    pub fn check(&self) -> Result<(), AuthError> {
        let has_hmac_signed = self.find_hmac_signed().is_some();
        let has_object_list = self.find_object_list().is_some();
        let has_auth_data = self.find_auth_data().is_some();

        if has_hmac_signed && !(has_object_list && has_auth_data) {
            return Err(AuthError::MissingAttribute(
                "HMAC_SIGNED requires both an NslpObjectList and an AuthData attribute",
            ));
        }
        if has_object_list && !has_auth_data {
            return Err(AuthError::MissingAttribute("NslpObjectList requires an AuthData attribute"));
        }
        Ok(())
    }

    /// Encode this object's attributes, sorted by `(xtype, subtype)`, into
    /// `buf`, returning the positions the HMAC layer needs.
    ///
    /// # Errors
    /// Returns [`AuthError`] if [`Self::check`] fails or the buffer runs
    /// out of space.
    pub fn encode(&self, buf: &mut NetBuf) -> Result<EncodedAuth, AuthError> {
        self.check()?;
        let mut sorted: Vec<&AuthAttribute> = self.attributes.iter().collect();
        sorted.sort_by_key(|a| a.key());

        let body_start = buf.position();
        let mut mac_slot = None;
        let mut key_id = None;
        for attribute in &sorted {
            let attr_start = buf.position();
            attribute.encode(buf)?;
            if let AuthAttribute::AuthData { key_id: kid, data } = attribute {
                // Header (4 bytes) + key-id (4 bytes) precede the MAC bytes.
                let mac_start = attr_start + 8;
                mac_slot = Some((mac_start, mac_start + data.len()));
                key_id = Some(*kid);
            }
        }
        let body_end = buf.position();

        Ok(EncodedAuth {
            body_start,
            body_end,
            mac_slot,
            key_id,
            transform: self.find_hmac_signed(),
            covered_types: self.find_object_list().map(<[u16]>::to_vec),
        })
    }

    /// Decode attributes from `buf` until `body_len` bytes have been
    /// consumed, then enforce [`Self::check`].
    ///
    /// # Errors
    /// Returns [`AuthError`] on a malformed attribute or a presence-rule
    /// violation.
    pub fn decode(
        buf: &mut NetBuf,
        registry: &Registry<(u8, u8), AuthAttribute, AuthError>,
        body_len: usize,
    ) -> Result<Self, AuthError> {
        let (object, _) = Self::decode_located(buf, registry, body_len)?;
        Ok(object)
    }

    /// As [`Self::decode`], but also reports the absolute byte positions the
    /// HMAC layer needs — the same information [`Self::encode`] returns, but
    /// recovered from an already-assembled buffer rather than learned while
    /// writing one. A caller that laid out a whole message and then wants to
    /// verify or (re-)sign the session-auth object it finds inside it (e.g.
    /// via [`nsis_buf::tlp::TlpList`]) cannot reuse the `EncodedAuth` from
    /// the object's original `encode` call, because that one is relative to
    /// whatever buffer the object happened to be encoded into first — this
    /// re-derives it against `buf` directly.
    ///
    /// # Errors
    /// Returns [`AuthError`] on a malformed attribute or a presence-rule
    /// violation.
    pub fn decode_located(
        buf: &mut NetBuf,
        registry: &Registry<(u8, u8), AuthAttribute, AuthError>,
        body_len: usize,
    ) -> Result<(Self, EncodedAuth), AuthError> {
        let body_start = buf.position();
        let body_end = body_start + body_len;
        let mut attributes = Vec::new();
        let mut mac_slot = None;
        let mut key_id = None;
        while buf.position() < body_end {
            let attr_start = buf.position();
            let attribute = decode_attribute(buf, registry)?;
            if let AuthAttribute::AuthData { key_id: kid, data } = &attribute {
                let mac_start = attr_start + 8;
                mac_slot = Some((mac_start, mac_start + data.len()));
                key_id = Some(*kid);
            }
            attributes.push(attribute);
        }
        let object = Self { attributes };
        object.check()?;
        let encoded = EncodedAuth {
            body_start,
            body_end,
            mac_slot,
            key_id,
            transform: object.find_hmac_signed(),
            covered_types: object.find_object_list().map(<[u16]>::to_vec),
        };
        Ok((object, encoded))
    }

    /// Zero out the `AuthData` attribute's MAC bytes (by byte range) before
    /// computing an HMAC: the MAC field is padded with zero bytes before HMAC
    /// computation. The caller passes the
    /// `mac_slot` from the [`EncodedAuth`] this object's own `encode` just
    /// produced.
    ///
    /// # Errors
    /// Returns [`AuthError::Buffer`] if `mac_slot` falls outside `buf`.
    pub fn zero_mac_slot(buf: &mut NetBuf, mac_slot: (usize, usize)) -> Result<(), AuthError> {
        let zeros = vec![0u8; mac_slot.1 - mac_slot.0];
        buf.copy_from(mac_slot.0, &zeros)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::default_registry;

    fn signed_object(mac_len: usize) -> SessionAuthObject {
        SessionAuthObject {
            attributes: vec![
                AuthAttribute::HmacSigned(TransformId::HmacSha1_96),
                AuthAttribute::NslpObjectList(vec![0x0001, 0x0002]),
                AuthAttribute::AuthData { key_id: 42, data: vec![0u8; mac_len] },
            ],
        }
    }

    #[test]
    fn hmac_signed_without_companions_is_rejected() {
        let object = SessionAuthObject { attributes: vec![AuthAttribute::HmacSigned(TransformId::HmacSha1_96)] };
        assert_eq!(
            object.check().unwrap_err(),
            AuthError::MissingAttribute("HMAC_SIGNED requires both an NslpObjectList and an AuthData attribute")
        );
    }

    #[test]
    fn object_list_without_auth_data_is_rejected() {
        let object = SessionAuthObject { attributes: vec![AuthAttribute::NslpObjectList(vec![1])] };
        assert_eq!(
            object.check().unwrap_err(),
            AuthError::MissingAttribute("NslpObjectList requires an AuthData attribute")
        );
    }

    #[test]
    fn fully_populated_object_passes_and_locates_mac_slot() {
        let object = signed_object(12);
        let mut buf = NetBuf::new(64);
        let encoded = object.encode(&mut buf).unwrap();
        assert_eq!(encoded.key_id, Some(42));
        assert_eq!(encoded.transform, Some(TransformId::HmacSha1_96));
        assert_eq!(encoded.covered_types, Some(vec![0x0001, 0x0002]));
        let (start, end) = encoded.mac_slot.unwrap();
        assert_eq!(end - start, 12);
    }

    #[test]
    fn round_trips_through_decode() {
        let object = signed_object(12);
        let mut buf = NetBuf::new(64);
        let encoded = object.encode(&mut buf).unwrap();
        buf.set_position(encoded.body_start).unwrap();
        let registry = default_registry();
        let decoded = SessionAuthObject::decode(&mut buf, &registry, encoded.body_end - encoded.body_start).unwrap();
        assert_eq!(decoded.attributes.len(), object.attributes.len());
    }

    #[test]
    fn sorting_makes_encoding_order_independent() {
        let a = signed_object(12);
        let mut b = a.clone();
        b.attributes.reverse();

        let mut buf_a = NetBuf::new(64);
        let mut buf_b = NetBuf::new(64);
        a.encode(&mut buf_a).unwrap();
        b.encode(&mut buf_b).unwrap();
        assert_eq!(buf_a.as_slice(), buf_b.as_slice());
    }
}
