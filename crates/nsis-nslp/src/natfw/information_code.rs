//! The NATFW `InformationCode` object: the protocol's wire-carried error
//! enum, used in RESPONSE and NOTIFY messages. Severity classes and
//! response codes are grounded on
//! `examples/original_source/nsis-ka/natfw-nslp/include/msg/information_code.h`.

/// Severity class of an [`InformationCode`]; the top-level discriminator a
/// receiver checks before looking at the specific response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Informational notice, not a failure (NOTIFY only).
    Informational,
    /// The request succeeded.
    Success,
    /// A protocol-level error (malformed or inconsistent message).
    ProtocolError,
    /// A transient failure; the request may succeed if retried later.
    TransientFailure,
    /// A permanent failure; retrying without changing the request is futile.
    PermanentFailure,
    /// The signalling session itself cannot proceed (see [`SigSessionFailure`]).
    SignalingSessionFailure,
    /// A severity class value this crate has no name for.
    Other(u8),
}

impl Severity {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Informational,
            2 => Self::Success,
            3 => Self::ProtocolError,
            4 => Self::TransientFailure,
            5 => Self::PermanentFailure,
            6 => Self::SignalingSessionFailure,
            other => Self::Other(other),
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Informational => 1,
            Self::Success => 2,
            Self::ProtocolError => 3,
            Self::TransientFailure => 4,
            Self::PermanentFailure => 5,
            Self::SignalingSessionFailure => 6,
            Self::Other(v) => v,
        }
    }
}

/// Informational response codes (severity [`Severity::Informational`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InformationalCode {
    /// The signalling path changed.
    RouteChange,
    /// A peer must re-authenticate.
    ReauthenticationRequired,
    /// A peer is shutting down gracefully.
    NodeGoingDown,
    /// Unrecognised code.
    Other(u8),
}

/// Success response codes (severity [`Severity::Success`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuccessCode {
    /// The request was processed without error.
    SuccessfullyProcessed,
    /// Unrecognised code.
    Other(u8),
}

/// Permanent-failure response codes (severity [`Severity::PermanentFailure`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermanentFailureCode {
    /// Peer authentication failed.
    AuthenticationFailed,
    /// Peer authorization failed.
    AuthorizationFailed,
    /// The transport did not provide the required security properties.
    TransportSecurity,
    /// An internal error at the responding node.
    InternalError,
    /// This node has no NAT function.
    NoNatHere,
    /// This node has no edge device function.
    NoEdgeDeviceHere,
    /// The NATFW responder could not be reached.
    NrNotReached,
    /// Path-tracing requests are not permitted here.
    TracingNotAllowed,
    /// Unrecognised code.
    Other(u8),
}

/// Signalling-session-failure response codes (severity
/// [`Severity::SignalingSessionFailure`]); these observation-only failures
/// never leave a session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigSessionFailure {
    /// The session was terminated asynchronously (e.g. by the local API).
    TerminatedAsync,
    /// The requested lifetime exceeds the policy maximum.
    LifetimeTooBig,
    /// No reservation was found to refresh or tear down.
    NoReservationFound,
    /// The policy engine denied the requested rule.
    PolicyRuleDenied,
    /// The rule action named is not recognised.
    UnknownPolicyRuleAction,
    /// The rule action is not applicable in this context.
    RuleActionNotApplicable,
    /// A `DataTerminalInfo` object was required but missing.
    DtinfoObjectRequired,
    /// Subsequent-port ranges are not permitted here.
    SubPortsNotPermitted,
    /// The requested IP protocol is not supported.
    IpProtocolUnsupported,
    /// Plain IP (no transport header) is not permitted.
    PlainIpNotPermitted,
    /// The requested ICMP type is not permitted.
    IcmpTypeNotPermitted,
    /// The requested source address range is too large.
    SourceIpRangeTooLarge,
    /// The requested destination address range is too large.
    DestIpRangeTooLarge,
    /// The requested source port range is too large.
    SourcePortRangeTooLarge,
    /// The requested destination port range is too large.
    DestPortRangeTooLarge,
    /// Unrecognised code.
    Other(u8),
}

impl SigSessionFailure {
    fn to_raw(self) -> u8 {
        match self {
            Self::TerminatedAsync => 1,
            Self::LifetimeTooBig => 2,
            Self::NoReservationFound => 3,
            Self::PolicyRuleDenied => 4,
            Self::UnknownPolicyRuleAction => 5,
            Self::RuleActionNotApplicable => 6,
            Self::DtinfoObjectRequired => 7,
            Self::SubPortsNotPermitted => 8,
            Self::IpProtocolUnsupported => 9,
            Self::PlainIpNotPermitted => 10,
            Self::IcmpTypeNotPermitted => 11,
            Self::SourceIpRangeTooLarge => 12,
            Self::DestIpRangeTooLarge => 13,
            Self::SourcePortRangeTooLarge => 14,
            Self::DestPortRangeTooLarge => 15,
            Self::Other(v) => v,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::TerminatedAsync,
            2 => Self::LifetimeTooBig,
            3 => Self::NoReservationFound,
            4 => Self::PolicyRuleDenied,
            5 => Self::UnknownPolicyRuleAction,
            6 => Self::RuleActionNotApplicable,
            7 => Self::DtinfoObjectRequired,
            8 => Self::SubPortsNotPermitted,
            9 => Self::IpProtocolUnsupported,
            10 => Self::PlainIpNotPermitted,
            11 => Self::IcmpTypeNotPermitted,
            12 => Self::SourceIpRangeTooLarge,
            13 => Self::DestIpRangeTooLarge,
            14 => Self::SourcePortRangeTooLarge,
            15 => Self::DestPortRangeTooLarge,
            other => Self::Other(other),
        }
    }
}

/// The decoded response code, scoped by its severity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// See [`InformationalCode`].
    Informational(InformationalCode),
    /// See [`SuccessCode`].
    Success(SuccessCode),
    /// A protocol-error response code; only `perr_unknown_object_field_value`
    /// (8) is named, so other values round-trip as their raw byte.
    ProtocolError(u8),
    /// A transient-failure response code; only
    /// `tfail_resources_unavailable` (1) is named.
    TransientFailure(u8),
    /// See [`PermanentFailureCode`].
    PermanentFailure(PermanentFailureCode),
    /// See [`SigSessionFailure`].
    SigSessionFailure(SigSessionFailure),
    /// A response code outside any severity this crate decodes into a
    /// named enum, preserved as its raw byte.
    Raw(u8),
}

impl ResponseCode {
    fn decode(severity: Severity, raw: u8) -> Self {
        match severity {
            Severity::Informational => Self::Informational(match raw {
                1 => InformationalCode::RouteChange,
                2 => InformationalCode::ReauthenticationRequired,
                3 => InformationalCode::NodeGoingDown,
                other => InformationalCode::Other(other),
            }),
            Severity::Success => Self::Success(match raw {
                1 => SuccessCode::SuccessfullyProcessed,
                other => SuccessCode::Other(other),
            }),
            Severity::ProtocolError => Self::ProtocolError(raw),
            Severity::TransientFailure => Self::TransientFailure(raw),
            Severity::PermanentFailure => Self::PermanentFailure(match raw {
                1 => PermanentFailureCode::AuthenticationFailed,
                2 => PermanentFailureCode::AuthorizationFailed,
                3 => PermanentFailureCode::TransportSecurity,
                4 => PermanentFailureCode::InternalError,
                5 => PermanentFailureCode::NoNatHere,
                6 => PermanentFailureCode::NoEdgeDeviceHere,
                7 => PermanentFailureCode::NrNotReached,
                8 => PermanentFailureCode::TracingNotAllowed,
                other => PermanentFailureCode::Other(other),
            }),
            Severity::SignalingSessionFailure => Self::SigSessionFailure(SigSessionFailure::from_raw(raw)),
            Severity::Other(_) => Self::Raw(raw),
        }
    }

    fn raw(self) -> u8 {
        match self {
            Self::Informational(c) => match c {
                InformationalCode::RouteChange => 1,
                InformationalCode::ReauthenticationRequired => 2,
                InformationalCode::NodeGoingDown => 3,
                InformationalCode::Other(v) => v,
            },
            Self::Success(c) => match c {
                SuccessCode::SuccessfullyProcessed => 1,
                SuccessCode::Other(v) => v,
            },
            Self::ProtocolError(v) | Self::TransientFailure(v) | Self::Raw(v) => v,
            Self::PermanentFailure(c) => match c {
                PermanentFailureCode::AuthenticationFailed => 1,
                PermanentFailureCode::AuthorizationFailed => 2,
                PermanentFailureCode::TransportSecurity => 3,
                PermanentFailureCode::InternalError => 4,
                PermanentFailureCode::NoNatHere => 5,
                PermanentFailureCode::NoEdgeDeviceHere => 6,
                PermanentFailureCode::NrNotReached => 7,
                PermanentFailureCode::TracingNotAllowed => 8,
                PermanentFailureCode::Other(v) => v,
            },
            Self::SigSessionFailure(c) => c.to_raw(),
        }
    }
}

/// The `InformationCode` object body: severity, response code, and the
/// object type the response refers to (0 when not applicable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InformationCode {
    /// The severity class.
    pub severity: Severity,
    /// The response code, scoped by `severity`.
    pub response_code: ResponseCode,
    /// The object type this response refers to, or 0.
    pub response_object_type: u16,
}

impl InformationCode {
    /// True when this code reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.severity, Severity::Success)
    }

    /// Convenience constructor for a `sc_success` / `suc_successfully_processed` code.
    #[must_use]
    pub fn success() -> Self {
        Self { severity: Severity::Success, response_code: ResponseCode::Success(SuccessCode::SuccessfullyProcessed), response_object_type: 0 }
    }

    /// Convenience constructor for a signalling-session-failure code.
    #[must_use]
    pub fn sig_session_failure(code: SigSessionFailure) -> Self {
        Self {
            severity: Severity::SignalingSessionFailure,
            response_code: ResponseCode::SigSessionFailure(code),
            response_object_type: 0,
        }
    }

    /// Convenience constructor for a permanent-failure code.
    #[must_use]
    pub fn permanent_failure(code: PermanentFailureCode) -> Self {
        Self { severity: Severity::PermanentFailure, response_code: ResponseCode::PermanentFailure(code), response_object_type: 0 }
    }

    pub(crate) fn pack(self) -> u32 {
        (u32::from(self.severity.to_raw() & 0x0F) << 28)
            | (u32::from(self.response_object_type & 0x0FFF) << 16)
            | (u32::from(self.response_code.raw()) << 8)
    }

    pub(crate) fn unpack(word: u32) -> Self {
        let severity = Severity::from_raw(((word >> 28) & 0x0F) as u8);
        let response_object_type = ((word >> 16) & 0x0FFF) as u16;
        let raw_code = ((word >> 8) & 0xFF) as u8;
        Self { severity, response_code: ResponseCode::decode(severity, raw_code), response_object_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_round_trips() {
        let ic = InformationCode::success();
        assert_eq!(InformationCode::unpack(ic.pack()), ic);
        assert!(ic.is_success());
    }

    #[test]
    fn sig_session_failure_round_trips() {
        let ic = InformationCode::sig_session_failure(SigSessionFailure::LifetimeTooBig);
        let back = InformationCode::unpack(ic.pack());
        assert_eq!(back, ic);
        assert!(!back.is_success());
    }
}
