//! QoS-NSLP initiator (QNI): originates a RESERVE on behalf of a local
//! application and drives it to a reservation or a reported failure.

use nsis_collab::SessionId;
use nsis_nslp::natfw::information_code::{InformationCode, PermanentFailureCode};
use nsis_nslp::qos::{msg_type, QosMessage};
use nsis_qspec::QspecPdu;

use crate::effect::{ApiReport, Effect, TimerSlot};
use crate::error::SessionError;
use crate::qos::common::{build_reserve, information_code_of, rii_of, state_name, wrap, QosCore, QosPolicy, QosState};
use crate::serial;

/// State held by a QNI session between events.
#[derive(Debug, Clone)]
pub struct QniSession {
    core: QosCore,
    rii: u32,
    lifetime: u32,
    qspec: Option<QspecPdu>,
    retry_count: u32,
}

impl QniSession {
    /// A fresh QNI session, born `Idle`.
    #[must_use]
    pub fn new(session_id: SessionId, rii: u32, policy: QosPolicy) -> Self {
        Self { core: QosCore::new(session_id, 0, policy), rii, lifetime: 0, qspec: None, retry_count: 0 }
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

    fn current(&self) -> Option<QosMessage> {
        self.qspec.clone().map(|qspec| build_reserve(self.rii, self.core.rsn, self.lifetime, qspec))
    }

    /// `tg_RESERVE`: originate a reservation. Only valid from `Idle`.
    pub fn reserve(&mut self, lifetime: u32, qspec: QspecPdu) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::Idle {
            return Err(SessionError::WrongState { state: state_name(self.core.state) });
        }
        self.lifetime = lifetime;
        let message = build_reserve(self.rii, self.core.rsn, lifetime, qspec.clone());
        self.qspec = Some(qspec);
        self.retry_count = 0;
        self.core.state = QosState::WaitResp;
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(message) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(0),
            },
        ])
    }

    /// `tg_TEARDOWN`: valid from `WaitResp` or `Session`, mirroring
    /// `natfw::ni::NiSession::teardown`.
    pub fn teardown(&mut self) -> Result<Vec<Effect>, SessionError> {
        match self.core.state {
            QosState::WaitResp | QosState::Session => {
                let qspec = self.qspec.clone().unwrap_or_else(|| QspecPdu::new(nsis_qspec::MsgSequence::Reserve, 0, 0, false));
                let message = build_reserve(self.rii, self.core.rsn, 0, qspec);
                self.core.state = QosState::Final;
                Ok(vec![
                    Effect::Send { session_id: self.core.session_id(), message: wrap(message) },
                    Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                    Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Refresh },
                    Effect::RemoveSession { session_id: self.core.session_id() },
                ])
            }
            other => Err(SessionError::WrongState { state: state_name(other) }),
        }
    }

    /// `rx_RESPONSE` for the outstanding RESERVE/refresh.
    pub fn on_response(&mut self, message: &QosMessage) -> Result<Vec<Effect>, SessionError> {
        if message.header.msg_type != msg_type::RESPONSE {
            return Ok(Vec::new());
        }
        let Some(code) = information_code_of(message) else {
            return Ok(Vec::new());
        };
        if let Some(rii) = rii_of(message) {
            if rii != self.rii {
                return Ok(Vec::new());
            }
        }
        match self.core.state {
            QosState::WaitResp if code.is_success() => {
                self.core.state = QosState::Session;
                Ok(vec![
                    Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                    Effect::StartTimer {
                        session_id: self.core.session_id(),
                        slot: TimerSlot::Refresh,
                        delay: self.core.policy.state_timeout(self.lifetime),
                    },
                    Effect::ReportToApi { session_id: self.core.session_id(), report: ApiReport::Success { external_address: None } },
                ])
            }
            QosState::WaitResp => self.fail(*code, TimerSlot::Response),
            QosState::Session if !code.is_success() => self.fail(*code, TimerSlot::Refresh),
            _ => Ok(Vec::new()),
        }
    }

    fn fail(&mut self, code: InformationCode, armed_slot: TimerSlot) -> Result<Vec<Effect>, SessionError> {
        self.core.state = QosState::Final;
        Ok(vec![
            Effect::CancelTimer { session_id: self.core.session_id(), slot: armed_slot },
            Effect::ReportToApi { session_id: self.core.session_id(), report: ApiReport::Failure(code) },
            Effect::RemoveSession { session_id: self.core.session_id() },
        ])
    }

    /// The response timer expired while awaiting an ack for the last
    /// RESERVE (initial or refresh).
    pub fn on_response_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if !matches!(self.core.state, QosState::WaitResp | QosState::Session) {
            return Ok(Vec::new());
        }
        if self.retry_count >= self.core.policy.max_retries {
            self.core.state = QosState::Final;
            return Ok(vec![
                Effect::ReportToApi {
                    session_id: self.core.session_id(),
                    report: ApiReport::Failure(InformationCode::permanent_failure(PermanentFailureCode::NrNotReached)),
                },
                Effect::RemoveSession { session_id: self.core.session_id() },
            ]);
        }
        self.retry_count += 1;
        let Some(message) = self.current() else { return Ok(Vec::new()) };
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(message) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(self.retry_count),
            },
        ])
    }

    /// The refresh timer expired: advance the RSN and resend RESERVE.
    pub fn on_refresh_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::Session {
            return Ok(Vec::new());
        }
        self.core.rsn = serial::max(self.core.rsn, self.core.rsn.wrapping_add(1));
        self.retry_count = 0;
        let Some(message) = self.current() else { return Ok(Vec::new()) };
        Ok(vec![
            Effect::Send { session_id: self.core.session_id(), message: wrap(message) },
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
    use nsis_nslp::natfw::information_code::InformationCode;
    use nsis_nslp::qos::objects::QosObject;
    use nsis_nslp::qos::{QosHeader, QosObjectEntry};
    use nsis_nslp::ObjectAction as Action;
    use nsis_qspec::object::object_id;
    use nsis_qspec::parameter::ParamFlags;
    use nsis_qspec::{MsgSequence, QspecObject, QspecParameter};

    fn sample_qspec() -> QspecPdu {
        let mut pdu = QspecPdu::new(MsgSequence::Reserve, 0, 0, false);
        let mut object = QspecObject::new(object_id::QOS_DESIRED);
        object.parameters.push(QspecParameter::PathLatency { flags: ParamFlags::default(), microseconds: 1000 });
        pdu.objects.push(object);
        pdu
    }

    fn response(rii: u32, code: InformationCode) -> QosMessage {
        QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESPONSE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: Action::Mandatory, object: QosObject::Rii(rii) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::InformationCode(code) },
            ],
        }
    }

    #[test]
    fn happy_path_reserve_succeeds() {
        let mut qni = QniSession::new(SessionId::new(1), 7, QosPolicy::default());
        let effects = qni.reserve(60, sample_qspec()).unwrap();
        assert_eq!(qni.state(), QosState::WaitResp);
        assert!(matches!(effects[0], Effect::Send { .. }));

        let effects = qni.on_response(&response(7, InformationCode::success())).unwrap();
        assert_eq!(qni.state(), QosState::Session);
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { slot: TimerSlot::Refresh, .. })));
    }

    #[test]
    fn teardown_from_session_removes_and_sends() {
        let mut qni = QniSession::new(SessionId::new(1), 7, QosPolicy::default());
        qni.reserve(60, sample_qspec()).unwrap();
        qni.on_response(&response(7, InformationCode::success())).unwrap();
        let effects = qni.teardown().unwrap();
        assert_eq!(qni.state(), QosState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::Send { .. })));
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
    }

    #[test]
    fn wrong_rii_is_ignored() {
        let mut qni = QniSession::new(SessionId::new(1), 7, QosPolicy::default());
        qni.reserve(60, sample_qspec()).unwrap();
        let effects = qni.on_response(&response(99, InformationCode::success())).unwrap();
        assert!(effects.is_empty());
        assert_eq!(qni.state(), QosState::WaitResp);
    }
}
