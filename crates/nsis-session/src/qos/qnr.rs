//! QoS-NSLP responder (QNR): accepts an inbound RESERVE/QUERY and answers
//! with success or a signalling-session-failure RESPONSE, mirroring
//! `natfw::nr`'s shape for the QoS side of the path.

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::{InformationCode, SigSessionFailure};
use nsis_nslp::qos::QosMessage;

use crate::effect::{Effect, TimerSlot};
use crate::error::SessionError;
use crate::qos::common::{build_response, lifetime_of, rii_of, state_name, wrap, QosCore, QosPolicy, QosState};
use crate::serial;

/// State held by a QNR session between events.
#[derive(Debug, Clone)]
pub struct QnrSession {
    core: QosCore,
    rii: u32,
}

impl QnrSession {
    /// A fresh QNR session, born `Idle`, for an inbound reservation.
    #[must_use]
    pub fn new(session_id: SessionId, policy: QosPolicy) -> Self {
        Self { core: QosCore::new(session_id, 0, policy), rii: 0 }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> QosState {
        self.core.state()
    }

    /// This session's identifier.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.core.session_id()
    }

    /// Current RSN.
    #[must_use]
    pub fn rsn(&self) -> u32 {
        self.core.rsn()
    }

    /// `rx_RESERVE`.
    pub fn on_reserve(&mut self, message: &QosMessage) -> Result<Vec<Effect>, SessionError> {
        let Some(rii) = rii_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "RESERVE carried no RII" }));
        };
        let rsn = message.rsn().unwrap_or(0);
        let lifetime = lifetime_of(message).unwrap_or(0);
        self.rii = rii;

        match self.core.state {
            QosState::Idle => {
                self.core.rsn = rsn;
                if lifetime > self.core.policy.max_lifetime {
                    self.core.state = QosState::Final;
                    let response = build_response(rii, InformationCode::sig_session_failure(SigSessionFailure::LifetimeTooBig));
                    Ok(vec![
                        Effect::Send { session_id: self.core.session_id(), message: wrap(response) },
                        Effect::RemoveSession { session_id: self.core.session_id() },
                    ])
                } else if lifetime > 0 {
                    self.core.state = QosState::Session;
                    let response = build_response(rii, InformationCode::success());
                    Ok(vec![
                        Effect::Send { session_id: self.core.session_id(), message: wrap(response) },
                        Effect::StartTimer {
                            session_id: self.core.session_id(),
                            slot: TimerSlot::State,
                            delay: self.core.policy.state_timeout(lifetime),
                        },
                    ])
                } else {
                    self.core.state = QosState::Final;
                    Ok(vec![Effect::RemoveSession { session_id: self.core.session_id() }])
                }
            }
            QosState::Session => {
                if !serial::precedes(self.core.rsn, rsn) {
                    return Ok(Vec::new());
                }
                if lifetime == 0 {
                    self.core.rsn = rsn;
                    self.core.state = QosState::Final;
                    return Ok(vec![
                        Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::State },
                        Effect::RemoveSession { session_id: self.core.session_id() },
                    ]);
                }
                if lifetime > self.core.policy.max_lifetime {
                    let response = build_response(rii, InformationCode::sig_session_failure(SigSessionFailure::LifetimeTooBig));
                    return Ok(vec![Effect::Send { session_id: self.core.session_id(), message: wrap(response) }]);
                }
                self.core.rsn = rsn;
                let response = build_response(rii, InformationCode::success());
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

    /// The state timer expired without a refreshing RESERVE arriving in time.
    pub fn on_state_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::Session {
            return Ok(Vec::new());
        }
        self.core.state = QosState::Final;
        Ok(vec![Effect::RemoveSession { session_id: self.core.session_id() }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_nslp::natfw::information_code::InformationCode as Code;
    use nsis_nslp::qos::objects::QosObject;
    use nsis_nslp::qos::{msg_type, QosHeader, QosObjectEntry};
    use nsis_nslp::ObjectAction as Action;
    use nsis_qspec::object::object_id;
    use nsis_qspec::{MsgSequence, QspecObject, QspecParameter};

    fn sample_qspec() -> nsis_qspec::QspecPdu {
        let mut pdu = nsis_qspec::QspecPdu::new(MsgSequence::Reserve, 0, 0, false);
        let mut object = QspecObject::new(object_id::QOS_DESIRED);
        object.parameters.push(QspecParameter::PathLatency { flags: Default::default(), microseconds: 1000 });
        pdu.objects.push(object);
        pdu
    }

    fn reserve(rii: u32, rsn: u32, lifetime: u32) -> QosMessage {
        QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESERVE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: Action::Mandatory, object: QosObject::Rii(rii) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::Rsn(rsn) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::SessionLifetime(lifetime) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::QspecObject(sample_qspec()) },
            ],
        }
    }

    #[test]
    fn idle_accepts_and_goes_session() {
        let mut qnr = QnrSession::new(SessionId::new(1), QosPolicy::default());
        let effects = qnr.on_reserve(&reserve(7, 1, 60)).unwrap();
        assert_eq!(qnr.state(), QosState::Session);
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { slot: TimerSlot::State, .. })));
    }

    #[test]
    fn lifetime_too_big_at_idle_goes_final() {
        let mut qnr = QnrSession::new(SessionId::new(1), QosPolicy::default());
        let effects = qnr.on_reserve(&reserve(7, 1, 1_000_000)).unwrap();
        assert_eq!(qnr.state(), QosState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
    }

    #[test]
    fn duplicate_rsn_is_ignored() {
        let mut qnr = QnrSession::new(SessionId::new(1), QosPolicy::default());
        qnr.on_reserve(&reserve(7, 5, 60)).unwrap();
        let effects = qnr.on_reserve(&reserve(7, 5, 60)).unwrap();
        assert!(effects.is_empty());
        assert_eq!(qnr.rsn(), 5);
    }

    #[test]
    fn teardown_goes_final() {
        let mut qnr = QnrSession::new(SessionId::new(1), QosPolicy::default());
        qnr.on_reserve(&reserve(7, 5, 60)).unwrap();
        let effects = qnr.on_reserve(&reserve(7, 6, 0)).unwrap();
        assert_eq!(qnr.state(), QosState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
        let _ = Code::success();
    }
}
