//! EXT roles: the private-side "edge forwarder" that turns an EXT into a
//! local reservation, and the "non-edge forwarder" that simply relays EXT
//! upstream with initiator-like retry semantics.

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::{InformationCode, PermanentFailureCode, SigSessionFailure};
use nsis_nslp::natfw::{msg_type, NatfwMessage};

use crate::effect::{Effect, TimerSlot};
use crate::error::SessionError;
use crate::natfw::common::{build_response, information_code_of, lifetime_of, msn_of, state_name, wrap, NatfwCore, NatfwPolicy, NatfwState};
use crate::serial;

/// An edge forwarder: the NATFW node co-located with the private endpoint
/// that receives EXT on its private side and answers locally, without
/// forwarding it further.
#[derive(Debug, Clone)]
pub struct EdgeExtSession {
    core: NatfwCore,
}

impl EdgeExtSession {
    /// A fresh edge EXT session, born `Idle`.
    #[must_use]
    pub fn new(session_id: SessionId, policy: NatfwPolicy) -> Self {
        Self { core: NatfwCore::new(session_id, 0, policy) }
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

    /// `rx_EXT` on the private side (`!public_side`), after `check_AA` has
    /// already passed.
    pub fn on_ext(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        let Some(msn) = msn_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "EXT carried no MSN" }));
        };
        let lifetime = lifetime_of(message).unwrap_or(0);

        match self.core.state {
            NatfwState::Idle if lifetime > 0 => {
                self.core.msn = msn;
                self.core.state = NatfwState::Session;
                let response = build_response(InformationCode::success(), Some(msn));
                Ok(vec![
                    Effect::Send { session_id: self.core.session_id(), message: wrap(response) },
                    Effect::StartTimer {
                        session_id: self.core.session_id(),
                        slot: TimerSlot::State,
                        delay: self.core.policy.state_timeout(lifetime),
                    },
                ])
            }
            NatfwState::Idle => {
                self.core.state = NatfwState::Final;
                Ok(vec![Effect::RemoveSession { session_id: self.core.session_id() }])
            }
            NatfwState::Session => {
                if !serial::precedes(self.core.msn, msn) {
                    return Ok(Vec::new());
                }
                if lifetime == 0 {
                    self.core.msn = msn;
                    self.core.state = NatfwState::Final;
                    return Ok(vec![
                        Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::State },
                        Effect::RemoveSession { session_id: self.core.session_id() },
                    ]);
                }
                if lifetime > self.core.policy.max_lifetime {
                    let response = build_response(InformationCode::sig_session_failure(SigSessionFailure::LifetimeTooBig), Some(msn));
                    return Ok(vec![Effect::Send { session_id: self.core.session_id(), message: wrap(response) }]);
                }
                self.core.msn = msn;
                let response = build_response(InformationCode::success(), Some(msn));
                Ok(vec![
                    Effect::Send { session_id: self.core.session_id(), message: wrap(response) },
                    Effect::StartTimer {
                        session_id: self.core.session_id(),
                        slot: TimerSlot::State,
                        delay: self.core.policy.state_timeout(lifetime),
                    },
                ])
            }
            other => Err(SessionError::WrongState { state: state_name(other) }),
        }
    }

    /// The state timer expired without a refresh.
    pub fn on_state_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::Session {
            return Ok(Vec::new());
        }
        self.core.state = NatfwState::Final;
        Ok(vec![Effect::RemoveSession { session_id: self.core.session_id() }])
    }
}

/// A non-edge forwarder: relays an EXT towards the edge device with the
/// same retry/backoff discipline an initiator uses for CREATE.
#[derive(Debug, Clone)]
pub struct RelayExtSession {
    core: NatfwCore,
    last_sent: Option<NatfwMessage>,
    retry_count: u32,
}

impl RelayExtSession {
    /// A fresh relay session, born `Idle`.
    #[must_use]
    pub fn new(session_id: SessionId, policy: NatfwPolicy) -> Self {
        Self { core: NatfwCore::new(session_id, 0, policy), last_sent: None, retry_count: 0 }
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

    /// An EXT arrived to be relayed onward (from `Idle` or as a refresh from
    /// `Session`).
    pub fn on_ext(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        let Some(msn) = msn_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "EXT carried no MSN" }));
        };
        if !matches!(self.core.state, NatfwState::Idle | NatfwState::Session) {
            return Ok(Vec::new());
        }
        if self.core.state == NatfwState::Session && !serial::precedes(self.core.msn, msn) {
            return Ok(Vec::new());
        }
        self.core.msn = msn;
        self.retry_count = 0;
        self.last_sent = Some(message.clone());
        self.core.state = NatfwState::WaitResp;
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(0),
            },
        ])
    }

    /// `rx_RESPONSE` for the relayed EXT.
    pub fn on_response(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        if message.header.msg_type != msg_type::RESPONSE || self.core.state != NatfwState::WaitResp {
            return Ok(Vec::new());
        }
        let Some(code) = information_code_of(message) else {
            return Ok(Vec::new());
        };
        if code.is_success() {
            self.core.state = NatfwState::Session;
            Ok(vec![
                Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) },
                Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                Effect::StartTimer {
                    session_id: self.core.session_id(),
                    slot: TimerSlot::State,
                    delay: self.core.policy.state_timeout(0),
                },
            ])
        } else {
            self.core.state = NatfwState::Final;
            Ok(vec![
                Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) },
                Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                Effect::RemoveSession { session_id: self.core.session_id() },
            ])
        }
    }

    /// The response timer expired: retry with backoff, or give up.
    pub fn on_response_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::WaitResp {
            return Ok(Vec::new());
        }
        let Some(pending) = self.last_sent.clone() else {
            return Ok(Vec::new());
        };
        if self.retry_count >= self.core.policy.max_retries {
            self.core.state = NatfwState::Final;
            let response = build_response(InformationCode::permanent_failure(PermanentFailureCode::NrNotReached), msn_of(&pending));
            return Ok(vec![
                Effect::Send { session_id: self.core.session_id(), message: wrap(response) },
                Effect::RemoveSession { session_id: self.core.session_id() },
            ]);
        }
        self.retry_count += 1;
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(pending) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(self.retry_count),
            },
        ])
    }

    /// The state timer expired without a refreshing EXT arriving in time.
    pub fn on_state_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::Session {
            return Ok(Vec::new());
        }
        self.core.state = NatfwState::Final;
        Ok(vec![Effect::RemoveSession { session_id: self.core.session_id() }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_nslp::natfw::header::{HeaderFlags, VERSION};
    use nsis_nslp::natfw::objects::{NatfwObject, RuleAction};
    use nsis_nslp::natfw::{NatfwHeader, NatfwObjectEntry};
    use nsis_nslp::ObjectAction as Action;

    fn ext(msn: u32, lifetime: u32) -> NatfwMessage {
        NatfwMessage {
            header: NatfwHeader { version: VERSION, msg_type: msg_type::EXT, hop_count: 20, flags: HeaderFlags(0), length_words: 0 },
            objects: vec![
                NatfwObjectEntry { action: Action::Mandatory, object: NatfwObject::SessionLifetime(lifetime) },
                NatfwObjectEntry { action: Action::Mandatory, object: NatfwObject::ExtendedFlowInfo { rule_action: RuleAction::Allow, sub_ports: 0 } },
                NatfwObjectEntry { action: Action::Mandatory, object: NatfwObject::MessageSequenceNumber(msn) },
            ],
        }
    }

    #[test]
    fn edge_accepts_ext_and_goes_session() {
        let mut edge = EdgeExtSession::new(SessionId::new(1), NatfwPolicy::default());
        let effects = edge.on_ext(&ext(1, 30)).unwrap();
        assert_eq!(edge.state(), NatfwState::Session);
        assert!(effects.iter().any(|e| matches!(e, Effect::Send { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { slot: TimerSlot::State, .. })));
    }

    #[test]
    fn edge_rejects_oversized_lifetime_while_in_session() {
        let mut edge = EdgeExtSession::new(SessionId::new(1), NatfwPolicy::default());
        edge.on_ext(&ext(1, 30)).unwrap();
        let effects = edge.on_ext(&ext(2, 1_000_000)).unwrap();
        assert_eq!(edge.state(), NatfwState::Session);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn edge_teardown_goes_final() {
        let mut edge = EdgeExtSession::new(SessionId::new(1), NatfwPolicy::default());
        edge.on_ext(&ext(1, 30)).unwrap();
        let effects = edge.on_ext(&ext(2, 0)).unwrap();
        assert_eq!(edge.state(), NatfwState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
    }

    #[test]
    fn relay_forwards_ext_and_waits_for_response() {
        let mut relay = RelayExtSession::new(SessionId::new(1), NatfwPolicy::default());
        let effects = relay.on_ext(&ext(1, 30)).unwrap();
        assert_eq!(relay.state(), NatfwState::WaitResp);
        assert!(matches!(effects[0], Effect::Send { .. }));
    }
}
