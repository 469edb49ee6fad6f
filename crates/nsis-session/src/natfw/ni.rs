//! NATFW initiator (NI): the role that originates a CREATE on behalf of a
//! local application and drives it to a reservation or a reported failure.

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::{InformationCode, PermanentFailureCode};
use nsis_nslp::natfw::{msg_type, NatfwMessage};

use crate::effect::{ApiReport, Effect, TimerSlot};
use crate::error::SessionError;
use crate::natfw::common::{build_create, external_address_of, information_code_of, state_name, wrap, NatfwCore, NatfwPolicy, NatfwState};
use crate::serial;

/// State held by an NI session between events.
#[derive(Debug, Clone)]
pub struct NiSession {
    core: NatfwCore,
    lifetime: u32,
    icmp_types: Vec<u8>,
    retry_count: u32,
}

impl NiSession {
    /// A fresh NI session, born `Idle`, for a locally originated flow.
    #[must_use]
    pub fn new(session_id: SessionId, policy: NatfwPolicy) -> Self {
        Self { core: NatfwCore::new(session_id, 0, policy), lifetime: 0, icmp_types: Vec::new(), retry_count: 0 }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NatfwState {
        self.core.state()
    }

    /// This session's identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.core.session_id()
    }

    fn current(&self) -> NatfwMessage {
        build_create(self.core.msn, self.lifetime, &self.icmp_types)
    }

    /// `tg_CREATE`: originate a flow. Only valid from `Idle`.
    pub fn create(&mut self, lifetime: u32, icmp_types: Vec<u8>) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::Idle {
            return Err(SessionError::WrongState { state: state_name(self.core.state) });
        }
        self.lifetime = lifetime;
        self.icmp_types = icmp_types;
        self.retry_count = 0;
        self.core.state = NatfwState::WaitResp;
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(self.current()) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(0),
            },
        ])
    }

    /// `tg_TEARDOWN`: valid from `WaitResp` or `Session`.
    pub fn teardown(&mut self) -> Result<Vec<Effect>, SessionError> {
        match self.core.state {
            NatfwState::WaitResp | NatfwState::Session => {
                let teardown = build_create(self.core.msn, 0, &[]);
                self.core.state = NatfwState::Final;
                Ok(vec![
                    Effect::Send { session_id: self.core.session_id(), message: wrap(teardown) },
                    Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                    Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Refresh },
                    Effect::RemoveSession { session_id: self.core.session_id() },
                ])
            }
            other => Err(SessionError::WrongState { state: state_name(other) }),
        }
    }

    /// `rx_RESPONSE`: a RESPONSE arrived for the outstanding CREATE/refresh.
    pub fn on_response(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        if message.header.msg_type != msg_type::RESPONSE {
            return Ok(Vec::new());
        }
        let Some(code) = information_code_of(message) else {
            return Ok(Vec::new());
        };
        if let Some(msn) = message.msn() {
            if msn != self.core.msn {
                return Ok(Vec::new());
            }
        }
        match self.core.state {
            NatfwState::WaitResp if code.is_success() => {
                self.core.state = NatfwState::Session;
                Ok(vec![
                    Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                    Effect::StartTimer {
                        session_id: self.core.session_id(),
                        slot: TimerSlot::Refresh,
                        delay: self.core.policy.state_timeout(self.lifetime),
                    },
                    Effect::ReportToApi {
                        session_id: self.core.session_id(),
                        report: ApiReport::Success { external_address: external_address_of(message) },
                    },
                ])
            }
            NatfwState::WaitResp => self.fail(*code, TimerSlot::Response),
            NatfwState::Session if !code.is_success() => self.fail(*code, TimerSlot::Refresh),
            _ => Ok(Vec::new()),
        }
    }

    fn fail(&mut self, code: InformationCode, armed_slot: TimerSlot) -> Result<Vec<Effect>, SessionError> {
        self.core.state = NatfwState::Final;
        Ok(vec![
            Effect::CancelTimer { session_id: self.core.session_id(), slot: armed_slot },
            Effect::ReportToApi { session_id: self.core.session_id(), report: ApiReport::Failure(code) },
            Effect::RemoveSession { session_id: self.core.session_id() },
        ])
    }

    /// The response timer expired while awaiting an ack for the last CREATE
    /// (initial or refresh).
    pub fn on_response_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if !matches!(self.core.state, NatfwState::WaitResp | NatfwState::Session) {
            return Ok(Vec::new());
        }
        if self.retry_count >= self.core.policy.max_retries {
            self.core.state = NatfwState::Final;
            return Ok(vec![
                Effect::ReportToApi {
                    session_id: self.core.session_id(),
                    report: ApiReport::Failure(InformationCode::permanent_failure(PermanentFailureCode::NrNotReached)),
                },
                Effect::RemoveSession { session_id: self.core.session_id() },
            ]);
        }
        self.retry_count += 1;
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(self.current()) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(self.retry_count),
            },
        ])
    }

    /// The refresh timer expired: advance the MSN and resend CREATE,
    /// awaiting its RESPONSE on a freshly armed response timer.
    pub fn on_refresh_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::Session {
            return Ok(Vec::new());
        }
        self.core.msn = serial::max(self.core.msn, self.core.msn.wrapping_add(1));
        self.retry_count = 0;
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(self.current()) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(0),
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_nslp::natfw::header::{HeaderFlags, VERSION};
    use nsis_nslp::natfw::{NatfwHeader, NatfwObjectEntry};
    use nsis_nslp::ObjectAction as Action;
    use std::net::{IpAddr, Ipv4Addr};

    fn session() -> NiSession {
        NiSession::new(SessionId::new(1), NatfwPolicy::default())
    }

    fn response(code: InformationCode, msn: Option<u32>) -> NatfwMessage {
        let mut objects = vec![NatfwObjectEntry { action: Action::Mandatory, object: nsis_nslp::natfw::objects::NatfwObject::InformationCode(code) }];
        if let Some(msn) = msn {
            objects.push(NatfwObjectEntry { action: Action::Ignore, object: nsis_nslp::natfw::objects::NatfwObject::MessageSequenceNumber(msn) });
        }
        NatfwMessage {
            header: NatfwHeader { version: VERSION, msg_type: msg_type::RESPONSE, hop_count: 20, flags: HeaderFlags(0), length_words: 0 },
            objects,
        }
    }

    #[test]
    fn happy_path_s2() {
        let mut ni = session();
        let effects = ni.create(30, vec![]).unwrap();
        assert_eq!(ni.state(), NatfwState::WaitResp);
        assert!(matches!(effects[0], Effect::Send { .. }));
        assert!(matches!(effects[1], Effect::StartTimer { slot: TimerSlot::Response, .. }));

        let effects = ni.on_response(&response(InformationCode::success(), Some(0))).unwrap();
        assert_eq!(ni.state(), NatfwState::Session);
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { slot: TimerSlot::Refresh, .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::ReportToApi { report: ApiReport::Success { .. }, .. })));
    }

    #[test]
    fn wrong_msn_response_is_ignored() {
        let mut ni = session();
        ni.create(30, vec![]).unwrap();
        let effects = ni.on_response(&response(InformationCode::success(), Some(99))).unwrap();
        assert!(effects.is_empty());
        assert_eq!(ni.state(), NatfwState::WaitResp);
    }

    #[test]
    fn exhausted_retries_go_final() {
        let mut ni = session();
        ni.create(30, vec![]).unwrap();
        for _ in 0..ni.core.policy.max_retries {
            ni.on_response_timer_expiry().unwrap();
        }
        let effects = ni.on_response_timer_expiry().unwrap();
        assert_eq!(ni.state(), NatfwState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
    }

    #[test]
    fn external_address_is_reported_on_success() {
        let mut ni = session();
        ni.create(30, vec![]).unwrap();
        let mut resp = response(InformationCode::success(), Some(0));
        resp.objects.push(NatfwObjectEntry {
            action: Action::Ignore,
            object: nsis_nslp::natfw::objects::NatfwObject::ExternalAddress { address: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)), port: 4000 },
        });
        let effects = ni.on_response(&resp).unwrap();
        let report = effects.iter().find_map(|e| match e {
            Effect::ReportToApi { report, .. } => Some(report),
            _ => None,
        });
        assert_eq!(report, Some(&ApiReport::Success { external_address: Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))) }));
    }
}
