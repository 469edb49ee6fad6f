//! Shared NATFW session state, policy, and message-building helpers used by
//! the initiator, responder, and forwarder state machines.

use std::net::IpAddr;
use std::time::Duration;

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::InformationCode;
use nsis_nslp::natfw::objects::{NatfwObject, PortNumbers, RuleAction};
use nsis_nslp::natfw::{msg_type, NatfwHeader, NatfwMessage, NatfwObjectEntry};
use nsis_nslp::ObjectAction;

use crate::effect::OutboundMessage;

/// A session's lifecycle state. The state set is the union across NI/NR/NF
///; a given role simply never visits the states
/// its own table omits (e.g. NR never enters `WaitResp`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatfwState {
    /// No CREATE/RESERVE has been sent or accepted yet.
    Idle,
    /// A CREATE (or EXT) was sent; awaiting its RESPONSE.
    WaitResp,
    /// An accepted, live session with a refresh/state timer running.
    Session,
    /// Terminal. The session is removed from the manager once here.
    Final,
}

/// Tunable retry/lifetime policy for a NATFW session.
#[derive(Debug, Clone)]
pub struct NatfwPolicy {
    /// Number of response-timer expiries tolerated before giving up.
    pub max_retries: u32,
    /// Initial response-timer duration.
    pub initial_response_timeout: Duration,
    /// Ceiling for the exponential (doubling) response-timer backoff.
    pub response_timeout_cap: Duration,
    /// Policy-maximum advertised session lifetime, in seconds.
    pub max_lifetime: u32,
    /// Multiplier applied to the advertised lifetime to derive the
    /// responder/forwarder state-timer duration (1.5x the advertised
    /// lifetime, with a ceiling).
    pub state_timer_multiplier: f64,
    /// Ceiling for the derived state timer.
    pub state_timer_ceiling: Duration,
}

impl Default for NatfwPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_response_timeout: Duration::from_secs(2),
            response_timeout_cap: Duration::from_secs(32),
            max_lifetime: 3600,
            state_timer_multiplier: 1.5,
            state_timer_ceiling: Duration::from_secs(2 * 3600),
        }
    }
}

impl NatfwPolicy {
    /// Exponential backoff for the `n`-th (0-indexed) response timer,
    /// doubling from `initial_response_timeout` and capped at
    /// `response_timeout_cap`.
    #[must_use]
    pub fn response_timeout(&self, retry_count: u32) -> Duration {
        let doubled = self.initial_response_timeout.saturating_mul(1u32.checked_shl(retry_count).unwrap_or(u32::MAX));
        doubled.min(self.response_timeout_cap)
    }

    /// The responder/forwarder state-timer duration for an advertised `lifetime_secs`.
    #[must_use]
    pub fn state_timeout(&self, lifetime_secs: u32) -> Duration {
        let scaled = Duration::from_secs_f64(f64::from(lifetime_secs) * self.state_timer_multiplier);
        scaled.min(self.state_timer_ceiling)
    }
}

/// Build a CREATE (or, with `lifetime == 0`, a teardown CREATE) message.
pub(crate) fn build_create(msn: u32, lifetime: u32, icmp_types: &[u8]) -> NatfwMessage {
    let mut objects = vec![
        NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::SessionLifetime(lifetime) },
        NatfwObjectEntry {
            action: ObjectAction::Mandatory,
            object: NatfwObject::ExtendedFlowInfo { rule_action: RuleAction::Allow, sub_ports: 0 },
        },
        NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::MessageSequenceNumber(msn) },
    ];
    if !icmp_types.is_empty() {
        objects.push(NatfwObjectEntry {
            action: ObjectAction::Ignore,
            object: NatfwObject::IcmpTypes(icmp_types.to_vec()),
        });
    }
    NatfwMessage {
        header: NatfwHeader {
            version: nsis_nslp::natfw::header::VERSION,
            msg_type: msg_type::CREATE,
            hop_count: 0,
            flags: nsis_nslp::natfw::HeaderFlags(0),
            length_words: 0,
        },
        objects,
    }
}

/// Build an EXT message carrying the data-terminal description for the
/// private endpoint.
pub(crate) fn build_ext(
    msn: u32,
    lifetime: u32,
    terminal_address: std::net::IpAddr,
    terminal_prefix: u8,
    protocol: Option<u8>,
    ports: Option<PortNumbers>,
) -> NatfwMessage {
    let mut message = build_create(msn, lifetime, &[]);
    message.header.msg_type = msg_type::EXT;
    message.objects.push(NatfwObjectEntry {
        action: ObjectAction::Mandatory,
        object: NatfwObject::DataTerminalInfo {
            address: terminal_address,
            prefix: terminal_prefix,
            protocol,
            ports,
            ipsec_spi: None,
        },
    });
    message
}

/// Build a RESPONSE carrying the given information code. `in_reply_to_msn`,
/// when known, is echoed back as a `MessageSequenceNumber` object so the
/// initiator can correlate the RESPONSE with the CREATE/EXT it answers.
pub(crate) fn build_response(code: InformationCode, in_reply_to_msn: Option<u32>) -> NatfwMessage {
    let mut objects = vec![NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::InformationCode(code) }];
    if let Some(msn) = in_reply_to_msn {
        objects.push(NatfwObjectEntry { action: ObjectAction::Ignore, object: NatfwObject::MessageSequenceNumber(msn) });
    }
    NatfwMessage {
        header: NatfwHeader {
            version: nsis_nslp::natfw::header::VERSION,
            msg_type: msg_type::RESPONSE,
            hop_count: 0,
            flags: nsis_nslp::natfw::HeaderFlags(0),
            length_words: 0,
        },
        objects,
    }
}

/// The MSN carried on a NATFW message, if it has one.
pub(crate) fn msn_of(message: &NatfwMessage) -> Option<u32> {
    message.msn()
}

/// The advertised lifetime carried on a NATFW message, if any.
pub(crate) fn lifetime_of(message: &NatfwMessage) -> Option<u32> {
    message.objects.iter().find_map(|entry| match entry.object {
        NatfwObject::SessionLifetime(lifetime) => Some(lifetime),
        _ => None,
    })
}

/// The information code carried on a RESPONSE/NOTIFY, if any.
pub(crate) fn information_code_of(message: &NatfwMessage) -> Option<&InformationCode> {
    message.objects.iter().find_map(|entry| match &entry.object {
        NatfwObject::InformationCode(code) => Some(code),
        _ => None,
    })
}

/// The externally-visible address carried on a RESPONSE, if any (NAT-edge
/// NF/NR grant this to the initiator).
pub(crate) fn external_address_of(message: &NatfwMessage) -> Option<IpAddr> {
    message.objects.iter().find_map(|entry| match entry.object {
        NatfwObject::ExternalAddress { address, .. } => Some(address),
        _ => None,
    })
}

pub(crate) fn wrap(message: NatfwMessage) -> OutboundMessage {
    OutboundMessage::Natfw(message)
}

/// Debug-name of a state, for [`crate::error::SessionError::WrongState`].
pub(crate) fn state_name(state: NatfwState) -> &'static str {
    match state {
        NatfwState::Idle => "Idle",
        NatfwState::WaitResp => "WaitResp",
        NatfwState::Session => "Session",
        NatfwState::Final => "Final",
    }
}

/// Cached last-sent refreshable PDU plus the retry counter for its response
/// timer, shared by every role that may retransmit.
#[derive(Debug, Clone, Default)]
pub(crate) struct RetryState {
    pub cached: Option<NatfwMessage>,
    pub retry_count: u32,
}

/// Shared bookkeeping embedded in every NATFW role's session struct.
#[derive(Debug, Clone)]
pub struct NatfwCore {
    pub(crate) session_id: SessionId,
    pub(crate) state: NatfwState,
    pub(crate) msn: u32,
    pub(crate) policy: NatfwPolicy,
}

impl NatfwCore {
    pub(crate) fn new(session_id: SessionId, initial_msn: u32, policy: NatfwPolicy) -> Self {
        Self { session_id, state: NatfwState::Idle, msn: initial_msn, policy }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NatfwState {
        self.state
    }

    /// Current MSN.
    #[must_use]
    pub fn msn(&self) -> u32 {
        self.msn
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}
