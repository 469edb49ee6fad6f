//! QoS-NSLP forwarder (QNE): forwards a RESERVE downstream after
//! aggregating this hop's own measurements into the carried QSPEC, and
//! installs the local reservation via the rule installer, mirroring
//! `natfw::nf`'s shape: per-hop QSPEC aggregation is computed by each QNE
//! forwarder before re-emitting the message downstream.

use nsis_collab::{Rule, RuleHandle, SessionId};
use nsis_qspec::object::object_id;
use nsis_qspec::parameter::QspecParameter;
use nsis_qspec::QspecPdu;

use crate::effect::{Effect, TimerSlot};
use crate::error::SessionError;
use crate::qos::common::{information_code_of, lifetime_of, qspec_of, rii_of, state_name, wrap, QosCore, QosPolicy, QosState};
use crate::serial;

/// Per-hop QoS measurements a QNE folds into a forwarded QSPEC's
/// `qos_available` object.
#[derive(Debug, Clone, Copy, Default)]
pub struct HopMetrics {
    /// This hop's available rate, bytes per second (folded by minimum).
    pub available_rate: Option<f32>,
    /// This hop's contribution to path latency, microseconds (folded by sum).
    pub added_latency_micros: Option<u32>,
}

/// Fold `hop` into `pdu`'s `qos_available` object in place: token-bucket
/// rate/peak-rate by minimum, path latency by sum. A PDU with no
/// `qos_available` object is left untouched -- that object is
/// QNI-populated and this crate does not invent one.
pub fn aggregate_hop(pdu: &mut QspecPdu, hop: HopMetrics) {
    let Some(object) = pdu.objects.iter_mut().find(|o| o.object_id == object_id::QOS_AVAILABLE) else { return };
    for parameter in &mut object.parameters {
        match parameter {
            QspecParameter::Tmod { rate, peak_data_rate, .. } => {
                if let Some(hop_rate) = hop.available_rate {
                    *rate = rate.min(hop_rate);
                    *peak_data_rate = peak_data_rate.min(hop_rate);
                }
            }
            QspecParameter::PathLatency { microseconds, .. } => {
                if let Some(added) = hop.added_latency_micros {
                    *microseconds = microseconds.saturating_add(added);
                }
            }
            _ => {}
        }
    }
}

/// State held by a QNE session between events.
#[derive(Debug, Clone)]
pub struct QnfSession {
    core: QosCore,
    rii: u32,
    lifetime: u32,
    rule_handle: Option<RuleHandle>,
}

impl QnfSession {
    /// A fresh QNE session, born `Idle`.
    #[must_use]
    pub fn new(session_id: SessionId, policy: QosPolicy) -> Self {
        Self { core: QosCore::new(session_id, 0, policy), rii: 0, lifetime: 0, rule_handle: None }
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

    /// Whether this session believes its rule installation has completed.
    #[must_use]
    pub fn rule_handle(&self) -> Option<RuleHandle> {
        self.rule_handle
    }

    /// `rx_RESERVE` at `Idle`: fold `hop` into the carried QSPEC's
    /// `qos_available` object, install `rule` locally, and forward the
    /// message downstream.
    pub fn on_reserve(&mut self, message: &nsis_nslp::qos::QosMessage, hop: HopMetrics, rule: Rule) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::Idle {
            return Err(SessionError::WrongState { state: state_name(self.core.state) });
        }
        let Some(rii) = rii_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "RESERVE carried no RII" }));
        };
        self.rii = rii;
        self.core.rsn = message.rsn().unwrap_or(0);
        self.lifetime = lifetime_of(message).unwrap_or(0);
        self.core.state = QosState::WaitResp;

        let mut forwarded = message.clone();
        if let Some(object) = forwarded.objects.iter_mut().find_map(|entry| match &mut entry.object {
            nsis_nslp::qos::objects::QosObject::QspecObject(pdu) => Some(pdu),
            _ => None,
        }) {
            aggregate_hop(object, hop);
        }

        Ok(vec![
            Effect::InstallRule { session_id: self.core.session_id(), rule },
            Effect::Send { session_id: self.core.session_id(), message: wrap(forwarded) },
            Effect::StartTimer {
                session_id: self.core.session_id(),
                slot: TimerSlot::Response,
                delay: self.core.policy.response_timeout(0),
            },
        ])
    }

    /// Record the handle the rule installer returned for a previously
    /// requested install, once the async call completes.
    pub fn record_rule_handle(&mut self, handle: RuleHandle) {
        self.rule_handle = Some(handle);
    }

    /// `rx_RESPONSE` from downstream: forward it upstream, committing or
    /// tearing down the local reservation accordingly.
    pub fn on_response(&mut self, message: &nsis_nslp::qos::QosMessage) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::WaitResp {
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

        if code.is_success() {
            self.core.state = QosState::Session;
            Ok(vec![
                Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) },
                Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                Effect::StartTimer {
                    session_id: self.core.session_id(),
                    slot: TimerSlot::State,
                    delay: self.core.policy.state_timeout(self.lifetime),
                },
            ])
        } else {
            self.core.state = QosState::Final;
            let mut effects = self.release_resources();
            effects.push(Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) });
            effects.push(Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response });
            effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
            Ok(effects)
        }
    }

    /// A RESERVE arrived for an already-forwarded flow: a refresh (forward,
    /// re-aggregate, renew the advertised lifetime) or a teardown
    /// (`lifetime == 0`).
    pub fn on_forwarded_reserve(&mut self, message: &nsis_nslp::qos::QosMessage, hop: HopMetrics) -> Result<Vec<Effect>, SessionError> {
        let rsn = message.rsn().unwrap_or(0);
        if !matches!(self.core.state, QosState::WaitResp | QosState::Session) {
            return Ok(Vec::new());
        }
        if !serial::precedes(self.core.rsn, rsn) {
            return Ok(Vec::new());
        }
        self.core.rsn = rsn;
        let lifetime = lifetime_of(message).unwrap_or(0);

        let mut forwarded = message.clone();
        if let Some(object) = forwarded.objects.iter_mut().find_map(|entry| match &mut entry.object {
            nsis_nslp::qos::objects::QosObject::QspecObject(pdu) => Some(pdu),
            _ => None,
        }) {
            aggregate_hop(object, hop);
        }

        if lifetime == 0 {
            let timer_to_cancel = if self.core.state == QosState::Session { TimerSlot::State } else { TimerSlot::Response };
            self.core.state = QosState::Final;
            let mut effects = self.release_resources();
            effects.push(Effect::Send { session_id: self.core.session_id(), message: wrap(forwarded) });
            effects.push(Effect::CancelTimer { session_id: self.core.session_id(), slot: timer_to_cancel });
            effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
            return Ok(effects);
        }

        self.lifetime = lifetime;
        Ok(vec![Effect::Send { session_id: self.core.session_id(), message: wrap(forwarded) }])
    }

    /// The state timer expired without a refresh arriving in time.
    pub fn on_state_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::Session {
            return Ok(Vec::new());
        }
        self.core.state = QosState::Final;
        let mut effects = self.release_resources();
        effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
        Ok(effects)
    }

    /// Downstream never answered the forwarded RESERVE: give up and release
    /// the local reservation (mirrors `natfw::nf::NfSession::on_response_timer_expiry`).
    pub fn on_response_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != QosState::WaitResp {
            return Ok(Vec::new());
        }
        self.core.state = QosState::Final;
        let mut effects = self.release_resources();
        effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
        Ok(effects)
    }

    fn release_resources(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(handle) = self.rule_handle.take() {
            effects.push(Effect::RemoveRule { session_id: self.core.session_id(), handle });
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_collab::RuleHandle;
    use nsis_nslp::natfw::information_code::InformationCode;
    use nsis_nslp::qos::objects::QosObject;
    use nsis_nslp::qos::{msg_type, QosHeader, QosMessage, QosObjectEntry};
    use nsis_nslp::ObjectAction as Action;
    use nsis_qspec::object::object_id as qid;
    use nsis_qspec::parameter::ParamFlags;
    use nsis_qspec::{MsgSequence, QspecObject, QspecParameter};

    fn sample_rule() -> Rule {
        Rule {
            action: nsis_collab::RuleAction::Allow,
            src: ("10.0.0.1".parse().unwrap(), 32),
            src_ports: (1234, 1234),
            dst: ("10.0.0.2".parse().unwrap(), 32),
            dst_ports: (4321, 4321),
            protocol: Some(6),
        }
    }

    fn reserve_with_available(rii: u32, rsn: u32, lifetime: u32, rate: f32, latency: u32) -> QosMessage {
        let mut available = QspecObject::new(qid::QOS_AVAILABLE);
        available.parameters.push(QspecParameter::Tmod {
            flags: ParamFlags::default(),
            rate,
            bucket_depth: 1000.0,
            peak_data_rate: rate,
            min_policed_unit: 40,
        });
        available.parameters.push(QspecParameter::PathLatency { flags: ParamFlags::default(), microseconds: latency });
        let mut pdu = nsis_qspec::QspecPdu::new(MsgSequence::Reserve, 0, 0, false);
        pdu.objects.push(available);

        QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESERVE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: Action::Mandatory, object: QosObject::Rii(rii) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::Rsn(rsn) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::SessionLifetime(lifetime) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::QspecObject(pdu) },
            ],
        }
    }

    #[test]
    fn aggregates_min_rate_and_sums_latency() {
        let mut qnf = QnfSession::new(SessionId::new(1), QosPolicy::default());
        let hop = HopMetrics { available_rate: Some(500_000.0), added_latency_micros: Some(2_000) };
        let effects = qnf.on_reserve(&reserve_with_available(7, 1, 60, 1_000_000.0, 10_000), hop, sample_rule()).unwrap();

        let sent = effects.iter().find_map(|e| match e {
            Effect::Send { message: crate::effect::OutboundMessage::Qos(message), .. } => Some(message),
            _ => None,
        });
        let pdu = qspec_of(sent.unwrap()).unwrap();
        let available = pdu.objects.iter().find(|o| o.object_id == qid::QOS_AVAILABLE).unwrap();
        for parameter in &available.parameters {
            match parameter {
                QspecParameter::Tmod { rate, .. } => assert_eq!(*rate, 500_000.0),
                QspecParameter::PathLatency { microseconds, .. } => assert_eq!(*microseconds, 12_000),
                _ => {}
            }
        }
    }

    #[test]
    fn teardown_removes_rule_and_forwards() {
        let mut qnf = QnfSession::new(SessionId::new(1), QosPolicy::default());
        qnf.on_reserve(&reserve_with_available(7, 1, 60, 1_000_000.0, 10_000), HopMetrics::default(), sample_rule()).unwrap();
        qnf.record_rule_handle(RuleHandle(9));
        let response = QosMessage {
            header: QosHeader { version: 1, msg_type: msg_type::RESPONSE, length_words: 0 },
            objects: vec![
                QosObjectEntry { action: Action::Mandatory, object: QosObject::Rii(7) },
                QosObjectEntry { action: Action::Mandatory, object: QosObject::InformationCode(InformationCode::success()) },
            ],
        };
        qnf.on_response(&response).unwrap();
        assert_eq!(qnf.state(), QosState::Session);

        let effects = qnf.on_forwarded_reserve(&reserve_with_available(7, 2, 0, 1_000_000.0, 10_000), HopMetrics::default()).unwrap();
        assert_eq!(qnf.state(), QosState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveRule { handle, .. } if *handle == RuleHandle(9))));
        assert!(qnf.rule_handle().is_none());
    }
}
