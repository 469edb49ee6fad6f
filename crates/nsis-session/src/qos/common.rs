//! Shared QoS-NSLP session state, policy, and message-building helpers
//!, mirroring `natfw::common`'s shape.

use std::time::Duration;

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::InformationCode;
use nsis_nslp::qos::{msg_type, QosHeader, QosMessage, QosObjectEntry};
use nsis_nslp::qos::objects::QosObject;
use nsis_nslp::ObjectAction;
use nsis_qspec::QspecPdu;

use crate::effect::OutboundMessage;

/// A QoS-NSLP session's lifecycle state, the union across QNI/QNR/QNE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosState {
    /// No RESERVE has been sent or accepted yet.
    Idle,
    /// A RESERVE was sent; awaiting its RESPONSE.
    WaitResp,
    /// An accepted, live reservation with a refresh/state timer running.
    Session,
    /// Terminal. The session is removed from the manager once here.
    Final,
}

/// Tunable retry/lifetime policy for QoS-NSLP sessions, analogous to
/// [`crate::natfw::NatfwPolicy`].
#[derive(Debug, Clone)]
pub struct QosPolicy {
    /// Number of response-timer expiries tolerated before giving up.
    pub max_retries: u32,
    /// Initial response-timer duration.
    pub initial_response_timeout: Duration,
    /// Ceiling for the exponential (doubling) response-timer backoff.
    pub response_timeout_cap: Duration,
    /// Policy-maximum advertised reservation lifetime, in seconds.
    pub max_lifetime: u32,
    /// Multiplier applied to the advertised lifetime to derive the
    /// responder/forwarder state-timer duration.
    pub state_timer_multiplier: f64,
    /// Ceiling for the derived state timer.
    pub state_timer_ceiling: Duration,
}

impl Default for QosPolicy {
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

impl QosPolicy {
    /// Exponential backoff for the `n`-th (0-indexed) response timer.
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

/// Build a RESERVE message.
pub(crate) fn build_reserve(rii: u32, rsn: u32, lifetime: u32, qspec: QspecPdu) -> QosMessage {
    QosMessage {
        header: QosHeader { version: nsis_nslp::qos::header::VERSION, msg_type: msg_type::RESERVE, length_words: 0 },
        objects: vec![
            QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rii(rii) },
            QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rsn(rsn) },
            QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::SessionLifetime(lifetime) },
            QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::QspecObject(qspec) },
        ],
    }
}

/// Build a RESPONSE carrying the given information code, echoing `rii` so
/// the initiator can correlate it with the RESERVE it answers.
pub(crate) fn build_response(rii: u32, code: InformationCode) -> QosMessage {
    QosMessage {
        header: QosHeader { version: nsis_nslp::qos::header::VERSION, msg_type: msg_type::RESPONSE, length_words: 0 },
        objects: vec![
            QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::Rii(rii) },
            QosObjectEntry { action: ObjectAction::Mandatory, object: QosObject::InformationCode(code) },
        ],
    }
}

/// The RII carried on a message, if any.
pub(crate) fn rii_of(message: &QosMessage) -> Option<u32> {
    message.objects.iter().find_map(|entry| match entry.object {
        QosObject::Rii(rii) => Some(rii),
        _ => None,
    })
}

/// The advertised lifetime carried on a message, if any.
pub(crate) fn lifetime_of(message: &QosMessage) -> Option<u32> {
    message.objects.iter().find_map(|entry| match entry.object {
        QosObject::SessionLifetime(lifetime) => Some(lifetime),
        _ => None,
    })
}

/// The information code carried on a RESPONSE/NOTIFY, if any.
pub(crate) fn information_code_of(message: &QosMessage) -> Option<&InformationCode> {
    message.objects.iter().find_map(|entry| match &entry.object {
        QosObject::InformationCode(code) => Some(code),
        _ => None,
    })
}

/// The QSPEC PDU carried on a message, if any.
pub(crate) fn qspec_of(message: &QosMessage) -> Option<&QspecPdu> {
    message.objects.iter().find_map(|entry| match &entry.object {
        QosObject::QspecObject(pdu) => Some(pdu),
        _ => None,
    })
}

pub(crate) fn wrap(message: QosMessage) -> OutboundMessage {
    OutboundMessage::Qos(message)
}

/// Debug-name of a state, for [`crate::error::SessionError::WrongState`].
pub(crate) fn state_name(state: QosState) -> &'static str {
    match state {
        QosState::Idle => "Idle",
        QosState::WaitResp => "WaitResp",
        QosState::Session => "Session",
        QosState::Final => "Final",
    }
}

/// Shared bookkeeping embedded in every QoS-NSLP role's session struct.
#[derive(Debug, Clone)]
pub struct QosCore {
    pub(crate) session_id: SessionId,
    pub(crate) state: QosState,
    pub(crate) rsn: u32,
    pub(crate) policy: QosPolicy,
}

impl QosCore {
    pub(crate) fn new(session_id: SessionId, initial_rsn: u32, policy: QosPolicy) -> Self {
        Self { session_id, state: QosState::Idle, rsn: initial_rsn, policy }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QosState {
        self.state
    }

    /// Current RSN.
    #[must_use]
    pub fn rsn(&self) -> u32 {
        self.rsn
    }

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}
