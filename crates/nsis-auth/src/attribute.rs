//! Session-authorization attributes: the typed items making up a
//! session-auth object's body.
//!
//! Every attribute starts with a 32-bit header — a 16-bit length in bytes
//! (header included, tail padding excluded), an 8-bit xtype, an 8-bit
//! subtype — followed by a body padded to a 4-byte boundary.

use std::net::IpAddr;

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::AuthError;
use crate::hmac::TransformId;

/// Attribute xtype assignments, carried from the reference session-auth
/// object so wire bytes match the original protocol.
pub mod xtype {
    /// Identifies the authorizing/authorized entity.
    pub const AUTH_ENT_ID: u8 = 1;
    /// Source address this authorization is scoped to.
    pub const SOURCE_ADDR: u8 = 2;
    /// Destination address this authorization is scoped to.
    pub const DEST_ADDR: u8 = 3;
    /// Authorization validity window start.
    pub const START_TIME: u8 = 4;
    /// Authorization validity window end.
    pub const END_TIME: u8 = 5;
    /// The set of NSLP object types covered by the signature.
    pub const NSLP_OBJECT_LIST: u8 = 6;
    /// The MAC or opaque authorization token itself.
    pub const AUTHENTICATION_DATA: u8 = 7;
}

/// `AuthEntId` / `SourceAddr` / `DestAddr` share one subtype space naming
/// what kind of identity or address the attribute body encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySubtype {
    /// A 4-byte IPv4 address.
    Ipv4,
    /// A 16-byte IPv6 address.
    Ipv6,
    /// A fully-qualified domain name.
    Fqdn,
    /// An X.501 distinguished name.
    DistinguishedName,
    /// A URI.
    Uri,
    /// A Kerberos principal name.
    Kerberos,
    /// A raw X.509 certificate.
    X509,
    /// A raw PGP certificate.
    Pgp,
    /// The `HMAC_SIGNED` marker: this `AuthEntId` carries a [`TransformId`]
    /// rather than an entity identity (subtype 10).
    HmacSigned,
    /// A subtype this crate has no name for.
    Other(u8),
}

const SUBTYPE_IPV4: u8 = 1;
const SUBTYPE_IPV6: u8 = 2;
const SUBTYPE_FQDN: u8 = 3;
const SUBTYPE_DN: u8 = 4;
const SUBTYPE_URI: u8 = 5;
const SUBTYPE_KERBEROS: u8 = 6;
const SUBTYPE_X509: u8 = 7;
const SUBTYPE_PGP: u8 = 8;
/// The HMAC_SIGNED marker: subtype 10 of `AuthEntId`.
pub const SUBTYPE_HMAC_SIGNED: u8 = 10;

impl EntitySubtype {
    fn from_raw(raw: u8) -> Self {
        match raw {
            SUBTYPE_IPV4 => Self::Ipv4,
            SUBTYPE_IPV6 => Self::Ipv6,
            SUBTYPE_FQDN => Self::Fqdn,
            SUBTYPE_DN => Self::DistinguishedName,
            SUBTYPE_URI => Self::Uri,
            SUBTYPE_KERBEROS => Self::Kerberos,
            SUBTYPE_X509 => Self::X509,
            SUBTYPE_PGP => Self::Pgp,
            SUBTYPE_HMAC_SIGNED => Self::HmacSigned,
            other => Self::Other(other),
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Ipv4 => SUBTYPE_IPV4,
            Self::Ipv6 => SUBTYPE_IPV6,
            Self::Fqdn => SUBTYPE_FQDN,
            Self::DistinguishedName => SUBTYPE_DN,
            Self::Uri => SUBTYPE_URI,
            Self::Kerberos => SUBTYPE_KERBEROS,
            Self::X509 => SUBTYPE_X509,
            Self::Pgp => SUBTYPE_PGP,
            Self::HmacSigned => SUBTYPE_HMAC_SIGNED,
            Self::Other(v) => v,
        }
    }
}

/// A source or destination address scope: an address plus the optional IPsec
/// SPI and port list the reference attribute space allows alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrScope {
    /// The address itself.
    pub address: IpAddr,
    /// Security Parameter Index, when this scope is bound to an IPsec SA.
    pub spi: Option<u32>,
    /// Transport-layer ports this scope is restricted to; empty means
    /// "all ports".
    pub ports: Vec<u16>,
}

/// One decoded session-authorization attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthAttribute {
    /// Identifies the authorizing or authorized entity.
    AuthEntId {
        /// Which kind of identity this is.
        subtype: EntitySubtype,
        /// The identity's encoded value (opaque for all but address/transform subtypes).
        value: Vec<u8>,
    },
    /// The `HMAC_SIGNED` marker, naming which transform protects this object.
    HmacSigned(TransformId),
    /// Source address scope.
    SourceAddr(AddrScope),
    /// Destination address scope.
    DestAddr(AddrScope),
    /// Authorization validity window start, NTP-style 64-bit absolute time.
    StartTime(u64),
    /// Authorization validity window end, NTP-style 64-bit absolute time.
    EndTime(u64),
    /// The NSLP object types this signature covers, beyond the always-included MRI/SessionID/session-auth objects.
    NslpObjectList(Vec<u16>),
    /// The MAC (when paired with `HMAC_SIGNED`) or an opaque authorization token.
    AuthData {
        /// Key used to compute or verify the MAC, looked up in the key registry.
        key_id: u32,
        /// The MAC or token bytes.
        data: Vec<u8>,
    },
    /// An attribute whose (xtype, subtype) has no decoder registered.
    Raw {
        /// The undecoded xtype.
        xtype: u8,
        /// The undecoded subtype.
        subtype: u8,
        /// The raw body bytes, not including padding.
        body: Vec<u8>,
    },
}

impl AuthAttribute {
    /// The (xtype, subtype) key this value would encode as; used both to
    /// dispatch decoding and to sort attributes before serialisation.
    #[must_use]
    pub fn key(&self) -> (u8, u8) {
        match self {
            Self::AuthEntId { subtype, .. } => (xtype::AUTH_ENT_ID, subtype.to_raw()),
            Self::HmacSigned(_) => (xtype::AUTH_ENT_ID, SUBTYPE_HMAC_SIGNED),
            Self::SourceAddr(scope) => (xtype::SOURCE_ADDR, addr_subtype(scope.address)),
            Self::DestAddr(scope) => (xtype::DEST_ADDR, addr_subtype(scope.address)),
            Self::StartTime(_) => (xtype::START_TIME, 0),
            Self::EndTime(_) => (xtype::END_TIME, 0),
            Self::NslpObjectList(_) => (xtype::NSLP_OBJECT_LIST, 0),
            Self::AuthData { .. } => (xtype::AUTHENTICATION_DATA, 0),
            Self::Raw { xtype, subtype, .. } => (*xtype, *subtype),
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Self::AuthEntId { value, .. } => value.len(),
            Self::HmacSigned(_) => 2,
            Self::SourceAddr(scope) | Self::DestAddr(scope) => addr_scope_len(scope),
            Self::StartTime(_) | Self::EndTime(_) => 8,
            Self::NslpObjectList(types) => 2 + types.len() * 2,
            Self::AuthData { data, .. } => 4 + data.len(),
            Self::Raw { body, .. } => body.len(),
        }
    }

    fn encode_body(&self, buf: &mut NetBuf) -> Result<(), AuthError> {
        match self {
            Self::AuthEntId { value, .. } => buf.write_bytes(value)?,
            Self::HmacSigned(transform) => buf.write_u16(transform.to_wire())?,
            Self::SourceAddr(scope) | Self::DestAddr(scope) => encode_addr_scope(buf, scope)?,
            Self::StartTime(t) | Self::EndTime(t) => buf.write_u64(*t)?,
            Self::NslpObjectList(types) => {
                buf.write_u16(types.len() as u16)?;
                for t in types {
                    buf.write_u16(*t)?;
                }
            }
            Self::AuthData { key_id, data } => {
                buf.write_u32(*key_id)?;
                buf.write_bytes(data)?;
            }
            Self::Raw { body, .. } => buf.write_bytes(body)?,
        }
        Ok(())
    }

    /// Encode this attribute (header, body, tail padding) into `buf`.
    ///
    /// # Errors
    /// Returns [`AuthError`] if the buffer runs out of space.
    pub fn encode(&self, buf: &mut NetBuf) -> Result<(), AuthError> {
        let (xtype, subtype) = self.key();
        let body_len = self.body_len();
        let declared_len = 4 + body_len;
        let header = (u32::from(declared_len as u16) << 16) | (u32::from(xtype) << 8) | u32::from(subtype);
        buf.write_u32(header)?;
        self.encode_body(buf)?;
        buf.pad_to_4()?;
        Ok(())
    }
}

fn addr_subtype(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => SUBTYPE_IPV4,
        IpAddr::V6(_) => SUBTYPE_IPV6,
    }
}

fn addr_scope_len(scope: &AddrScope) -> usize {
    let addr_len = match scope.address {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 16,
    };
    addr_len + 1 + scope.spi.map_or(0, |_| 4) + 2 + scope.ports.len() * 2
}

fn encode_addr_scope(buf: &mut NetBuf, scope: &AddrScope) -> Result<(), AuthError> {
    match scope.address {
        IpAddr::V4(v4) => buf.write_bytes(&v4.octets())?,
        IpAddr::V6(v6) => buf.write_bytes(&v6.octets())?,
    }
    buf.write_u8(u8::from(scope.spi.is_some()))?;
    if let Some(spi) = scope.spi {
        buf.write_u32(spi)?;
    }
    buf.write_u16(scope.ports.len() as u16)?;
    for port in &scope.ports {
        buf.write_u16(*port)?;
    }
    Ok(())
}

fn decode_addr_scope(buf: &mut NetBuf, ipv6: bool) -> Result<AddrScope, AuthError> {
    let address = if ipv6 {
        let octets = buf.read_bytes(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&octets);
        IpAddr::from(raw)
    } else {
        let octets = buf.read_bytes(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&octets);
        IpAddr::from(raw)
    };
    let has_spi = buf.read_u8()? != 0;
    let spi = if has_spi { Some(buf.read_u32()?) } else { None };
    let port_count = buf.read_u16()?;
    let mut ports = Vec::with_capacity(usize::from(port_count));
    for _ in 0..port_count {
        ports.push(buf.read_u16()?);
    }
    Ok(AddrScope { address, spi, ports })
}

/// Build the default attribute registry: every concrete attribute type
/// above, dispatched by (xtype, subtype), with unknown keys falling back
/// to [`AuthAttribute::Raw`].
#[must_use]
pub fn default_registry() -> Registry<(u8, u8), AuthAttribute, AuthError> {
    Registry::new()
        .register((xtype::AUTH_ENT_ID, SUBTYPE_HMAC_SIGNED), |buf, _| {
            Ok(AuthAttribute::HmacSigned(TransformId::from_wire(buf.read_u16()?)))
        })
        .register((xtype::SOURCE_ADDR, SUBTYPE_IPV4), |buf, _| Ok(AuthAttribute::SourceAddr(decode_addr_scope(buf, false)?)))
        .register((xtype::SOURCE_ADDR, SUBTYPE_IPV6), |buf, _| Ok(AuthAttribute::SourceAddr(decode_addr_scope(buf, true)?)))
        .register((xtype::DEST_ADDR, SUBTYPE_IPV4), |buf, _| Ok(AuthAttribute::DestAddr(decode_addr_scope(buf, false)?)))
        .register((xtype::DEST_ADDR, SUBTYPE_IPV6), |buf, _| Ok(AuthAttribute::DestAddr(decode_addr_scope(buf, true)?)))
        .register((xtype::START_TIME, 0), |buf, _| Ok(AuthAttribute::StartTime(buf.read_u64()?)))
        .register((xtype::END_TIME, 0), |buf, _| Ok(AuthAttribute::EndTime(buf.read_u64()?)))
        .register((xtype::NSLP_OBJECT_LIST, 0), |buf, _| {
            let count = buf.read_u16()?;
            let mut types = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                types.push(buf.read_u16()?);
            }
            Ok(AuthAttribute::NslpObjectList(types))
        })
        .register((xtype::AUTHENTICATION_DATA, 0), |buf, len| {
            let key_id = buf.read_u32()?;
            let data = buf.read_bytes(len.saturating_sub(4))?;
            Ok(AuthAttribute::AuthData { key_id, data })
        })
        .with_fallback(|(xtype, subtype), buf, len| {
            if xtype == self::xtype::AUTH_ENT_ID {
                let value = buf.read_bytes(len)?;
                return Ok(AuthAttribute::AuthEntId { subtype: EntitySubtype::from_raw(subtype), value });
            }
            let body = buf.read_bytes(len)?;
            Ok(AuthAttribute::Raw { xtype, subtype, body })
        })
}

/// Decode one attribute starting at the buffer's current position.
///
/// # Errors
/// Returns [`AuthError`] on a short buffer or a misdeclared length.
pub fn decode_attribute(
    buf: &mut NetBuf,
    registry: &Registry<(u8, u8), AuthAttribute, AuthError>,
) -> Result<AuthAttribute, AuthError> {
    let header_offset = buf.position();
    let header = buf.read_u32()?;
    let declared_len = ((header >> 16) & 0xFFFF) as u16;
    let xtype = ((header >> 8) & 0xFF) as u8;
    let subtype = (header & 0xFF) as u8;

    let body_start = buf.position();
    let body_len = usize::from(declared_len).saturating_sub(4);

    let attribute = registry
        .decode((xtype, subtype), buf, body_len)
        .unwrap_or_else(|| {
            let body = buf.read_bytes(body_len)?;
            Ok(AuthAttribute::Raw { xtype, subtype, body })
        })?;

    let actual = 4 + (buf.position() - body_start);
    if actual != usize::from(declared_len) {
        return Err(AuthError::WrongLength { xtype, subtype, offset: header_offset, declared: declared_len, actual });
    }
    buf.pad_to_4()?;
    Ok(attribute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn hmac_signed_round_trips() {
        let attr = AuthAttribute::HmacSigned(TransformId::HmacSha1_96);
        let mut buf = NetBuf::new(16);
        attr.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let registry = default_registry();
        assert_eq!(decode_attribute(&mut buf, &registry).unwrap(), attr);
    }

    #[test]
    fn source_addr_with_ports_round_trips() {
        let attr = AuthAttribute::SourceAddr(AddrScope {
            address: IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            spi: Some(0xDEAD_BEEF),
            ports: vec![5060, 5061],
        });
        let mut buf = NetBuf::new(32);
        attr.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let registry = default_registry();
        assert_eq!(decode_attribute(&mut buf, &registry).unwrap(), attr);
    }

    #[test]
    fn nslp_object_list_round_trips() {
        let attr = AuthAttribute::NslpObjectList(vec![0x00E4, 0x00E5]);
        let mut buf = NetBuf::new(16);
        attr.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let registry = default_registry();
        assert_eq!(decode_attribute(&mut buf, &registry).unwrap(), attr);
    }

    #[test]
    fn auth_data_round_trips() {
        let attr = AuthAttribute::AuthData { key_id: 7, data: vec![0u8; 12] };
        let mut buf = NetBuf::new(32);
        attr.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let registry = default_registry();
        assert_eq!(decode_attribute(&mut buf, &registry).unwrap(), attr);
    }
}
