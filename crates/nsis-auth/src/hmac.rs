//! Keyed-HMAC computation and verification for session-authorization
//! objects.
//!
//! The byte ranges an HMAC covers (the NSLP-id field, the MRI object, the
//! SessionID object, the session-auth object itself, and anything named by
//! an `NslpObjectList` attribute) depend on wire knowledge this crate does
//! not have — that discovery is the caller's job, typically done with
//! [`nsis_buf::tlp::TlpList`] by the layer that already knows the concrete
//! NSLP object types. This module takes the resolved ranges as input and
//! only does the hashing.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use nsis_buf::NetBuf;

use crate::error::AuthError;

type HmacSha1 = Hmac<Sha1>;

/// The IANA integrity-transform-id registry this crate's `TransformId`
/// mirrors. Only [`TransformId::HmacSha1_96`] is wired to a concrete
/// algorithm; the rest are preserved so a future algorithm can be added
/// without renumbering, matching the reference implementation's scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformId {
    /// No integrity protection.
    None,
    /// HMAC-SHA-1 truncated to 96 bits — the default and the only
    /// algorithm this crate actually computes.
    HmacSha1_96,
    /// A transform id this crate does not assign a name to (includes the
    /// registry's reserved and not-yet-assigned values).
    Reserved(u16),
}

impl TransformId {
    /// Decode a transform id from its 16-bit wire value.
    #[must_use]
    pub fn from_wire(raw: u16) -> Self {
        match raw {
            0 => Self::None,
            2 => Self::HmacSha1_96,
            other => Self::Reserved(other),
        }
    }

    /// Encode this transform id as its 16-bit wire value.
    #[must_use]
    pub fn to_wire(self) -> u16 {
        match self {
            Self::None => 0,
            Self::HmacSha1_96 => 2,
            Self::Reserved(v) => v,
        }
    }

    /// The MAC size in bytes this transform produces, or `None` if this
    /// crate has no algorithm wired up for it.
    #[must_use]
    pub fn mac_size(self) -> Option<usize> {
        match self {
            Self::HmacSha1_96 => Some(12),
            Self::None | Self::Reserved(_) => None,
        }
    }
}

fn hash_input(buf: &NetBuf, nslp_id: u16, covered_ranges: &[(usize, usize)]) -> Result<Vec<u8>, AuthError> {
    let mut input = Vec::with_capacity(2 + covered_ranges.iter().map(|(s, e)| e - s).sum::<usize>());
    input.extend_from_slice(&nslp_id.to_be_bytes());
    for &(start, end) in covered_ranges {
        input.extend_from_slice(buf.copy_to(start, end - start)?);
    }
    Ok(input)
}

/// Compute the MAC over `nslp_id` followed by the bytes of each range in
/// `covered_ranges`, in the order given. Callers must have already excluded
/// the session-auth object's own MAC slot from whichever range contains it.
///
/// # Errors
/// Returns [`AuthError::UnsupportedTransform`] if `transform` has no
/// algorithm wired up, or [`AuthError::Buffer`] if a covered range falls
/// outside `buf`.
pub fn compute_mac(
    buf: &NetBuf,
    nslp_id: u16,
    covered_ranges: &[(usize, usize)],
    key: &[u8],
    transform: TransformId,
) -> Result<Vec<u8>, AuthError> {
    match transform {
        TransformId::HmacSha1_96 => {
            let input = hash_input(buf, nslp_id, covered_ranges)?;
            let key = Zeroizing::new(key.to_vec());
            let mut mac = <HmacSha1 as Mac>::new_from_slice(&key).map_err(|_| AuthError::InvalidKey)?;
            mac.update(&input);
            Ok(mac.finalize().into_bytes()[..12].to_vec())
        }
        other => Err(AuthError::UnsupportedTransform(other)),
    }
}

/// Compute the MAC (per [`compute_mac`]) and write it into `buf` at
/// `mac_slot`, which must be exactly [`TransformId::mac_size`] bytes.
///
/// # Errors
/// As [`compute_mac`], plus [`AuthError::Buffer`] if `mac_slot` does not
/// match the slot the transform actually produces, or falls outside `buf`.
pub fn serialize_hmac(
    buf: &mut NetBuf,
    nslp_id: u16,
    covered_ranges: &[(usize, usize)],
    mac_slot: (usize, usize),
    key: &[u8],
    transform: TransformId,
) -> Result<(), AuthError> {
    let mac = compute_mac(buf, nslp_id, covered_ranges, key, transform)?;
    buf.copy_from(mac_slot.0, &mac)?;
    tracing::debug!(nslp_id, mac_slot.0, mac_slot.1, ?transform, "wrote session-auth HMAC");
    Ok(())
}

/// Recompute the MAC (per [`compute_mac`]) and compare it byte-for-byte
/// against the bytes already sitting at `mac_slot`.
///
/// # Errors
/// As [`compute_mac`]; returns `Ok(false)` (not an error) on a mismatch —
/// callers decide whether a verification failure is fatal.
pub fn check_hmac(
    buf: &NetBuf,
    nslp_id: u16,
    covered_ranges: &[(usize, usize)],
    mac_slot: (usize, usize),
    key: &[u8],
    transform: TransformId,
) -> Result<bool, AuthError> {
    let expected = compute_mac(buf, nslp_id, covered_ranges, key, transform)?;
    let actual = buf.copy_to(mac_slot.0, mac_slot.1 - mac_slot.0)?;
    let matches = expected.as_slice() == actual;
    if !matches {
        tracing::warn!(nslp_id, ?transform, "session-auth HMAC verification failed");
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_unmodified_buffer() {
        let mut buf = NetBuf::new(64);
        buf.write_u16(0x00E5).unwrap(); // NSLP-id stand-in
        buf.write_bytes(b"mri-object..").unwrap();
        buf.write_bytes(b"session-id..").unwrap();
        let mac_slot_start = buf.position();
        buf.write_bytes(&[0u8; 12]).unwrap();

        let key = b"test-key-0123456789";
        let covered = [(2usize, 14usize), (14, 26)];
        serialize_hmac(&mut buf, 0x00E5, &covered, (mac_slot_start, mac_slot_start + 12), key, TransformId::HmacSha1_96).unwrap();

        assert!(check_hmac(&buf, 0x00E5, &covered, (mac_slot_start, mac_slot_start + 12), key, TransformId::HmacSha1_96).unwrap());
    }

    #[test]
    fn tampering_breaks_verification() {
        let mut buf = NetBuf::new(64);
        buf.write_u16(0x00E5).unwrap();
        buf.write_bytes(b"mri-object..").unwrap();
        buf.write_bytes(b"session-id..").unwrap();
        let mac_slot_start = buf.position();
        buf.write_bytes(&[0u8; 12]).unwrap();

        let key = b"test-key-0123456789";
        let covered = [(2usize, 14usize), (14, 26)];
        serialize_hmac(&mut buf, 0x00E5, &covered, (mac_slot_start, mac_slot_start + 12), key, TransformId::HmacSha1_96).unwrap();

        // Flip a byte inside the covered region (the 9th byte of the
        // session-id stand-in).
        let tampered_byte = buf.copy_to(14 + 8, 1).unwrap()[0] ^ 0xFF;
        buf.copy_from(14 + 8, &[tampered_byte]).unwrap();

        assert!(!check_hmac(&buf, 0x00E5, &covered, (mac_slot_start, mac_slot_start + 12), key, TransformId::HmacSha1_96).unwrap());
    }

    #[test]
    fn unsupported_transform_is_rejected() {
        let buf = NetBuf::new(16);
        let err = compute_mac(&buf, 0, &[], b"key", TransformId::None).unwrap_err();
        assert_eq!(err, AuthError::UnsupportedTransform(TransformId::None));
    }
}
