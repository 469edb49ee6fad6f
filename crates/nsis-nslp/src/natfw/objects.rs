//! NATFW-NSLP objects. Type codes and field layouts are grounded on
//! `examples/original_source/nsis-ka/natfw-nslp/include/msg/*.h`; object
//! bodies that source only described as C++ member lists (no `.cpp` kept in
//! the retrieval pack) are packed here in the obvious, densest way and
//! documented at the point of packing.

use std::net::IpAddr;

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::NslpError;
use crate::natfw::information_code::InformationCode;
use nsis_auth::SessionAuthObject;

/// NATFW object type codes, grounded on each object's `OBJECT_TYPE` constant
/// in the reference headers.
pub mod object_type {
    /// `session_lifetime::OBJECT_TYPE`.
    pub const SESSION_LIFETIME: u16 = 0x00F1;
    /// `external_address::OBJECT_TYPE`.
    pub const EXTERNAL_ADDRESS: u16 = 0x00F2;
    /// `extended_flow_info::OBJECT_TYPE`.
    pub const EXTENDED_FLOW_INFO: u16 = 0x00F3;
    /// `information_code::OBJECT_TYPE`.
    pub const INFORMATION_CODE: u16 = 0x00F4;
    /// `nonce::OBJECT_TYPE`.
    pub const NONCE: u16 = 0x00F5;
    /// Message sequence number. Not present in the retrieved header set;
    /// this crate assigns it the unused slot between `NONCE` (0x00F5) and
    /// `DATA_TERMINAL_INFO` (0x00F7), consistent with the reference
    /// numbering's otherwise-contiguous 0x00F1..0x00F9 object block.
    pub const MESSAGE_SEQUENCE_NUMBER: u16 = 0x00F6;
    /// `data_terminal_info::OBJECT_TYPE`.
    pub const DATA_TERMINAL_INFO: u16 = 0x00F7;
    /// `icmp_types::OBJECT_TYPE`.
    pub const ICMP_TYPES: u16 = 0x00F9;
    /// The session-authorization object, shared with QoS-NSLP
    /// (`nsis_nslp::qos::objects::object_type::SESSION_AUTH`); reserved
    /// outside either application's 0x00Fx/0x00Ex block
    pub const SESSION_AUTH: u16 = 0x0005;
}

/// `extended_flow_info`'s rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Install a permit rule.
    Allow,
    /// Install a deny rule.
    Deny,
    /// An action code this crate has no name for.
    Other(u16),
}

impl RuleAction {
    fn from_raw(raw: u16) -> Self {
        match raw {
            1 => Self::Allow,
            2 => Self::Deny,
            other => Self::Other(other),
        }
    }

    fn to_raw(self) -> u16 {
        match self {
            Self::Allow => 1,
            Self::Deny => 2,
            Self::Other(v) => v,
        }
    }
}

/// `data_terminal_info`'s optional transport detail, present only when the
/// object's port-numbers flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortNumbers {
    /// Destination-side port.
    pub dest_port: u16,
    /// Source-side port.
    pub src_port: u16,
}

/// One decoded NATFW object.
#[derive(Debug, Clone, PartialEq)]
pub enum NatfwObject {
    /// Requested or granted session lifetime, in seconds.
    SessionLifetime(u32),
    /// An externally-visible address and port allocated for this flow.
    ExternalAddress {
        /// The allocated address.
        address: IpAddr,
        /// The allocated port.
        port: u16,
    },
    /// The packet-filter rule action and optional subsequent-port count.
    ExtendedFlowInfo {
        /// Allow or deny.
        rule_action: RuleAction,
        /// Number of additional ports beyond the flow's own to cover
        /// (e.g. for protocols that negotiate secondary ports).
        sub_ports: u16,
    },
    /// The protocol-level response code carried on RESPONSE/NOTIFY.
    InformationCode(InformationCode),
    /// A sender-chosen value used to correlate a proxied CREATE/EXT with
    /// its RESPONSE.
    Nonce(u32),
    /// The message sequence number (NATFW's wrap-around refresh counter).
    MessageSequenceNumber(u32),
    /// The data-terminal description for the private endpoint.
    DataTerminalInfo {
        /// The private endpoint's address.
        address: IpAddr,
        /// Address prefix length.
        prefix: u8,
        /// IP protocol number, if known.
        protocol: Option<u8>,
        /// Destination/source ports, if known.
        ports: Option<PortNumbers>,
        /// IPsec SPI, if the flow is bound to a security association.
        ipsec_spi: Option<u32>,
    },
    /// The set of ICMP types this flow's filter should permit.
    IcmpTypes(Vec<u8>),
    /// The session-authorization object.
    SessionAuth(SessionAuthObject),
    /// An object whose type this receiver does not recognise.
    Raw {
        /// The undecoded type code.
        object_type: u16,
        /// The raw body bytes, not including padding.
        body: Vec<u8>,
    },
}

impl NatfwObject {
    /// This object's wire type code.
    #[must_use]
    pub fn object_type(&self) -> u16 {
        match self {
            Self::SessionLifetime(_) => object_type::SESSION_LIFETIME,
            Self::ExternalAddress { .. } => object_type::EXTERNAL_ADDRESS,
            Self::ExtendedFlowInfo { .. } => object_type::EXTENDED_FLOW_INFO,
            Self::InformationCode(_) => object_type::INFORMATION_CODE,
            Self::Nonce(_) => object_type::NONCE,
            Self::MessageSequenceNumber(_) => object_type::MESSAGE_SEQUENCE_NUMBER,
            Self::DataTerminalInfo { .. } => object_type::DATA_TERMINAL_INFO,
            Self::IcmpTypes(_) => object_type::ICMP_TYPES,
            Self::SessionAuth(_) => object_type::SESSION_AUTH,
            Self::Raw { object_type, .. } => *object_type,
        }
    }

    pub(crate) fn encode_body(&self, buf: &mut NetBuf) -> Result<(), NslpError> {
        match self {
            Self::SessionLifetime(seconds) | Self::Nonce(seconds) | Self::MessageSequenceNumber(seconds) => {
                buf.write_u32(*seconds)?;
            }
            Self::ExternalAddress { address, port } => {
                encode_host_address(buf, *address)?;
                buf.write_u16(*port)?;
            }
            Self::ExtendedFlowInfo { rule_action, sub_ports } => {
                buf.write_u16(rule_action.to_raw())?;
                buf.write_u16(*sub_ports)?;
            }
            Self::InformationCode(ic) => buf.write_u32(ic.pack())?,
            Self::DataTerminalInfo { address, prefix, protocol, ports, ipsec_spi } => {
                let flags =
                    (u8::from(protocol.is_some())) | (u8::from(ports.is_some()) << 1) | (u8::from(ipsec_spi.is_some()) << 2);
                buf.write_u8(u8::from(matches!(address, IpAddr::V6(_))))?;
                buf.write_u8(*prefix)?;
                buf.write_u8(flags)?;
                buf.write_u8(0)?; // reserved
                encode_host_address(buf, *address)?;
                buf.write_u8(protocol.unwrap_or(0))?;
                buf.write_u8(0)?;
                buf.write_u8(0)?;
                buf.write_u8(0)?;
                if let Some(p) = ports {
                    buf.write_u16(p.dest_port)?;
                    buf.write_u16(p.src_port)?;
                }
                if let Some(spi) = ipsec_spi {
                    buf.write_u32(*spi)?;
                }
            }
            Self::IcmpTypes(types) => {
                buf.write_u16(types.len() as u16)?;
                buf.write_u16(0)?; // reserved, keeps the body word-aligned before the list
                buf.write_bytes(types)?;
            }
            Self::SessionAuth(object) => {
                object.encode(buf)?;
            }
            Self::Raw { body, .. } => buf.write_bytes(body)?,
        }
        Ok(())
    }

    pub(crate) fn body_len(&self, coding_hint: usize) -> usize {
        match self {
            Self::SessionLifetime(_) | Self::Nonce(_) | Self::MessageSequenceNumber(_) => 4,
            Self::ExternalAddress { address, .. } => host_address_len(*address) + 2,
            Self::ExtendedFlowInfo { .. } => 4,
            Self::InformationCode(_) => 4,
            Self::DataTerminalInfo { address, ports, ipsec_spi, .. } => {
                4 + host_address_len(*address) + 4 + ports.map_or(0, |_| 4) + ipsec_spi.map_or(0, |_| 4)
            }
            Self::IcmpTypes(types) => 4 + types.len(),
            Self::SessionAuth(_) => coding_hint,
            Self::Raw { body, .. } => body.len(),
        }
    }
}

fn host_address_len(addr: IpAddr) -> usize {
    match addr {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 16,
    }
}

fn encode_host_address(buf: &mut NetBuf, addr: IpAddr) -> Result<(), NslpError> {
    match addr {
        IpAddr::V4(v4) => buf.write_bytes(&v4.octets())?,
        IpAddr::V6(v6) => buf.write_bytes(&v6.octets())?,
    }
    Ok(())
}

fn decode_host_address(buf: &mut NetBuf, ipv6: bool) -> Result<IpAddr, NslpError> {
    if ipv6 {
        let octets = buf.read_bytes(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(&octets);
        Ok(IpAddr::from(raw))
    } else {
        let octets = buf.read_bytes(4)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&octets);
        Ok(IpAddr::from(raw))
    }
}

/// Build the default NATFW object registry, dispatched by type code.
/// `auth_registry` is threaded through for decoding nested session-auth
/// attributes.
#[must_use]
pub fn default_registry(
    auth_registry: Registry<(u8, u8), nsis_auth::AuthAttribute, nsis_auth::AuthError>,
) -> Registry<u16, NatfwObject, NslpError> {
    Registry::new()
        .register(object_type::SESSION_LIFETIME, |buf, _| Ok(NatfwObject::SessionLifetime(buf.read_u32()?)))
        .register(object_type::NONCE, |buf, _| Ok(NatfwObject::Nonce(buf.read_u32()?)))
        .register(object_type::MESSAGE_SEQUENCE_NUMBER, |buf, _| Ok(NatfwObject::MessageSequenceNumber(buf.read_u32()?)))
        .register(object_type::EXTERNAL_ADDRESS, |buf, len| {
            let ipv6 = len > 6;
            let address = decode_host_address(buf, ipv6)?;
            let port = buf.read_u16()?;
            Ok(NatfwObject::ExternalAddress { address, port })
        })
        .register(object_type::EXTENDED_FLOW_INFO, |buf, _| {
            let rule_action = RuleAction::from_raw(buf.read_u16()?);
            let sub_ports = buf.read_u16()?;
            Ok(NatfwObject::ExtendedFlowInfo { rule_action, sub_ports })
        })
        .register(object_type::INFORMATION_CODE, |buf, _| Ok(NatfwObject::InformationCode(InformationCode::unpack(buf.read_u32()?))))
        .register(object_type::DATA_TERMINAL_INFO, |buf, _| {
            let ipv6 = buf.read_u8()? != 0;
            let prefix = buf.read_u8()?;
            let flags = buf.read_u8()?;
            let _reserved = buf.read_u8()?;
            let address = decode_host_address(buf, ipv6)?;
            let protocol_raw = buf.read_u8()?;
            let _pad = buf.read_bytes(3)?;
            let protocol = (flags & 0b001 != 0).then_some(protocol_raw);
            let ports = if flags & 0b010 != 0 {
                let dest_port = buf.read_u16()?;
                let src_port = buf.read_u16()?;
                Some(PortNumbers { dest_port, src_port })
            } else {
                None
            };
            let ipsec_spi = if flags & 0b100 != 0 { Some(buf.read_u32()?) } else { None };
            Ok(NatfwObject::DataTerminalInfo { address, prefix, protocol, ports, ipsec_spi })
        })
        .register(object_type::ICMP_TYPES, |buf, _| {
            let count = buf.read_u16()?;
            let _reserved = buf.read_u16()?;
            Ok(NatfwObject::IcmpTypes(buf.read_bytes(usize::from(count))?))
        })
        .register(object_type::SESSION_AUTH, move |buf, len| {
            Ok(NatfwObject::SessionAuth(SessionAuthObject::decode(buf, &auth_registry, len)?))
        })
        .with_fallback(|object_type, buf, len| Ok(NatfwObject::Raw { object_type, body: buf.read_bytes(len)? }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{encode_object, peek_header, ObjectAction};
    use std::net::Ipv4Addr;

    fn registry() -> Registry<u16, NatfwObject, NslpError> {
        default_registry(nsis_auth::attribute::default_registry())
    }

    fn round_trip(object: &NatfwObject, action: ObjectAction) -> NatfwObject {
        let mut buf = NetBuf::new(256);
        let mut body = NetBuf::new(256);
        object.encode_body(&mut body).unwrap();
        let body_bytes = &body.as_slice()[..body.position()];
        encode_object(&mut buf, action, object.object_type(), body_bytes).unwrap();

        buf.set_position(0).unwrap();
        let header = peek_header(&buf).unwrap();
        buf.read_u32().unwrap();
        let registry = registry();
        let decoded = registry.decode(header.object_type, &mut buf, usize::from(header.length_words) * 4).unwrap().unwrap();
        decoded
    }

    #[test]
    fn session_lifetime_round_trips() {
        let object = NatfwObject::SessionLifetime(30);
        assert_eq!(round_trip(&object, ObjectAction::Mandatory), object);
    }

    #[test]
    fn external_address_round_trips() {
        let object = NatfwObject::ExternalAddress { address: IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)), port: 4000 };
        assert_eq!(round_trip(&object, ObjectAction::Ignore), object);
    }

    #[test]
    fn data_terminal_info_with_all_optionals_round_trips() {
        let object = NatfwObject::DataTerminalInfo {
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            prefix: 32,
            protocol: Some(6),
            ports: Some(PortNumbers { dest_port: 80, src_port: 1234 }),
            ipsec_spi: Some(0x1111_2222),
        };
        assert_eq!(round_trip(&object, ObjectAction::Mandatory), object);
    }

    #[test]
    fn data_terminal_info_minimal_round_trips() {
        let object =
            NatfwObject::DataTerminalInfo { address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), prefix: 24, protocol: None, ports: None, ipsec_spi: None };
        assert_eq!(round_trip(&object, ObjectAction::Mandatory), object);
    }

    #[test]
    fn icmp_types_round_trips() {
        let object = NatfwObject::IcmpTypes(vec![8, 0, 3]);
        assert_eq!(round_trip(&object, ObjectAction::Ignore), object);
    }

    #[test]
    fn unknown_type_falls_back_to_raw() {
        let mut buf = NetBuf::new(32);
        encode_object(&mut buf, ObjectAction::Forward, 0x0123, &[1, 2, 3, 4]).unwrap();
        buf.set_position(0).unwrap();
        let header = peek_header(&buf).unwrap();
        buf.read_u32().unwrap();
        let registry = registry();
        let decoded = registry.decode(header.object_type, &mut buf, 4).unwrap().unwrap();
        assert_eq!(decoded, NatfwObject::Raw { object_type: 0x0123, body: vec![1, 2, 3, 4] });
    }
}
