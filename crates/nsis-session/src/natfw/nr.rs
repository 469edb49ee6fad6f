//! NATFW responder (NR): accepts an inbound CREATE, installs (reports) a
//! reservation, and answers with success or a signalling-session-failure
//! RESPONSE.
//!
//! Authentication/authorization (`check_AA`) is not re-checked here: a
//! session-authorization failure aborts inbound processing before a PDU
//! ever reaches a session handler: cryptographic verification failure
//! aborts processing and the session is never created.

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::{InformationCode, SigSessionFailure};
use nsis_nslp::natfw::NatfwMessage;

use crate::effect::{Effect, TimerSlot};
use crate::error::SessionError;
use crate::natfw::common::{build_response, lifetime_of, msn_of, state_name, wrap, NatfwCore, NatfwPolicy, NatfwState};
use crate::serial;

/// State held by an NR session between events.
#[derive(Debug, Clone)]
pub struct NrSession {
    core: NatfwCore,
}

impl NrSession {
    /// A fresh NR session, born `Idle`, for an inbound flow.
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

    /// Current MSN.
    #[must_use]
    pub fn msn(&self) -> u32 {
        self.core.msn()
    }

    /// `rx_CREATE`.
    pub fn on_create(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        let Some(msn) = msn_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "CREATE carried no MSN" }));
        };
        let lifetime = lifetime_of(message).unwrap_or(0);

        match self.core.state {
            NatfwState::Idle => {
                self.core.msn = msn;
                if lifetime > self.core.policy.max_lifetime {
                    self.core.state = NatfwState::Final;
                    let response = build_response(InformationCode::sig_session_failure(SigSessionFailure::LifetimeTooBig), Some(msn));
                    Ok(vec![
                        Effect::Send { session_id: self.core.session_id(), message: wrap(response) },
                        Effect::RemoveSession { session_id: self.core.session_id() },
                    ])
                } else if lifetime > 0 {
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
                } else {
                    self.core.state = NatfwState::Final;
                    Ok(vec![Effect::RemoveSession { session_id: self.core.session_id() }])
                }
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

    /// The state timer expired without a refreshing CREATE arriving in time.
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
    use nsis_nslp::natfw::{msg_type, NatfwHeader, NatfwObjectEntry};
    use nsis_nslp::ObjectAction as Action;

    fn create(msn: u32, lifetime: u32) -> NatfwMessage {
        NatfwMessage {
            header: NatfwHeader { version: VERSION, msg_type: msg_type::CREATE, hop_count: 20, flags: HeaderFlags(0), length_words: 0 },
            objects: vec![
                NatfwObjectEntry { action: Action::Mandatory, object: NatfwObject::SessionLifetime(lifetime) },
                NatfwObjectEntry { action: Action::Mandatory, object: NatfwObject::ExtendedFlowInfo { rule_action: RuleAction::Allow, sub_ports: 0 } },
                NatfwObjectEntry { action: Action::Mandatory, object: NatfwObject::MessageSequenceNumber(msn) },
            ],
        }
    }

    #[test]
    fn idle_accepts_and_goes_session() {
        let mut nr = NrSession::new(SessionId::new(1), NatfwPolicy::default());
        let effects = nr.on_create(&create(1, 30)).unwrap();
        assert_eq!(nr.state(), NatfwState::Session);
        assert!(effects.iter().any(|e| matches!(e, Effect::Send { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { slot: TimerSlot::State, .. })));
    }

    #[test]
    fn lifetime_too_big_at_idle_goes_final() {
        let mut nr = NrSession::new(SessionId::new(1), NatfwPolicy::default());
        nr.core.msn = 77;
        let effects = nr.on_create(&create(78, 1_000_000)).unwrap();
        assert_eq!(nr.state(), NatfwState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::Send { .. })));
        assert!(!effects.iter().any(|e| matches!(e, Effect::StartTimer { .. })));
    }

    #[test]
    fn duplicate_msn_is_ignored() {
        let mut nr = NrSession::new(SessionId::new(1), NatfwPolicy::default());
        nr.core.msn = 77;
        nr.core.state = NatfwState::Session;
        let effects = nr.on_create(&create(77, 30)).unwrap();
        assert!(effects.is_empty());
        assert_eq!(nr.state(), NatfwState::Session);
        assert_eq!(nr.msn(), 77);
    }

    #[test]
    fn session_lifetime_too_big_stays_in_session() {
        let mut nr = NrSession::new(SessionId::new(1), NatfwPolicy::default());
        nr.core.msn = 77;
        nr.core.state = NatfwState::Session;
        let effects = nr.on_create(&create(78, 1_000_000)).unwrap();
        assert_eq!(nr.state(), NatfwState::Session);
        assert_eq!(nr.msn(), 77);
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::Send { .. }));
    }

    #[test]
    fn teardown_goes_final_and_forwards_nothing_itself() {
        let mut nr = NrSession::new(SessionId::new(1), NatfwPolicy::default());
        nr.core.msn = 77;
        nr.core.state = NatfwState::Session;
        let effects = nr.on_create(&create(78, 0)).unwrap();
        assert_eq!(nr.state(), NatfwState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::CancelTimer { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
    }
}
