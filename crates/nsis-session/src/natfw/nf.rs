//! NATFW forwarder (NF): forwards a CREATE/EXT downstream while installing
//! a local packet-filter rule for the flow, and (on a NAT-edge node) also
//! reserves an externally routable address via the NAT broker.
//!
//! Rule installation and NAT reservation are requested as effects; the
//! dispatcher performs the actual (async) collaborator call after the
//! handler returns and feeds the result back through
//! [`NfSession::record_rule_handle`] / [`NfSession::record_external_address`]
//! once it has re-acquired the session.

use std::net::IpAddr;

use nsis_collab::{Rule, RuleHandle, SessionId};
use nsis_nslp::natfw::objects::NatfwObject;
use nsis_nslp::natfw::{NatfwMessage, NatfwObjectEntry};
use nsis_nslp::ObjectAction;

use crate::effect::{Effect, TimerSlot};
use crate::error::SessionError;
use crate::natfw::common::{information_code_of, lifetime_of, msn_of, state_name, wrap, NatfwCore, NatfwPolicy, NatfwState};
use crate::serial;

/// State held by an NF session between events.
#[derive(Debug, Clone)]
pub struct NfSession {
    core: NatfwCore,
    nat_edge: bool,
    lifetime: u32,
    rule_handle: Option<RuleHandle>,
    external_addr: Option<IpAddr>,
}

impl NfSession {
    /// A fresh NF session, born `Idle`. `nat_edge` selects whether this
    /// forwarder also owns a NAT-broker reservation for the flow.
    #[must_use]
    pub fn new(session_id: SessionId, policy: NatfwPolicy, nat_edge: bool) -> Self {
        Self { core: NatfwCore::new(session_id, 0, policy), nat_edge, lifetime: 0, rule_handle: None, external_addr: None }
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

    /// Whether this session believes its rule installation has completed.
    #[must_use]
    pub fn rule_handle(&self) -> Option<RuleHandle> {
        self.rule_handle
    }

    /// `rx_CREATE` at `Idle`: install `rule` locally, optionally reserve an
    /// external address for `private_addr`, and forward `message` downstream.
    pub fn on_create(&mut self, message: &NatfwMessage, rule: Rule, private_addr: Option<IpAddr>) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::Idle {
            return Err(SessionError::WrongState { state: state_name(self.core.state) });
        }
        let Some(msn) = msn_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "CREATE carried no MSN" }));
        };
        self.core.msn = msn;
        self.lifetime = lifetime_of(message).unwrap_or(0);
        self.core.state = NatfwState::WaitResp;

        let mut effects = vec![Effect::InstallRule { session_id: self.core.session_id(), rule }];
        if self.nat_edge {
            if let Some(addr) = private_addr {
                effects.push(Effect::ReserveExternal { session_id: self.core.session_id(), private_addr: addr });
            }
        }
        effects.push(Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) });
        effects.push(Effect::StartTimer {
            session_id: self.core.session_id(),
            slot: TimerSlot::Response,
            delay: self.core.policy.response_timeout(0),
        });
        Ok(effects)
    }

    /// Record the handle the rule installer returned for a previously
    /// requested install, once the async call completes.
    pub fn record_rule_handle(&mut self, handle: RuleHandle) {
        self.rule_handle = Some(handle);
    }

    /// Record the address the NAT broker returned for a previously
    /// requested reservation, once the async call completes.
    pub fn record_external_address(&mut self, addr: IpAddr) {
        self.external_addr = Some(addr);
    }

    /// `rx_RESPONSE` from downstream: forward it upstream (stamping the
    /// reserved external address, if any), committing or tearing down the
    /// local rule accordingly.
    pub fn on_response(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::WaitResp {
            return Ok(Vec::new());
        }
        let Some(code) = information_code_of(message) else {
            return Ok(Vec::new());
        };

        let mut forwarded = message.clone();
        if let Some(addr) = self.external_addr {
            forwarded.objects.push(NatfwObjectEntry { action: ObjectAction::Ignore, object: NatfwObject::ExternalAddress { address: addr, port: 0 } });
        }

        if code.is_success() {
            self.core.state = NatfwState::Session;
            Ok(vec![
                Effect::Send { session_id: self.core.session_id(), message: wrap(forwarded) },
                Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response },
                Effect::StartTimer {
                    session_id: self.core.session_id(),
                    slot: TimerSlot::State,
                    delay: self.core.policy.state_timeout(self.lifetime),
                },
            ])
        } else {
            self.core.state = NatfwState::Final;
            let mut effects = self.release_resources();
            effects.push(Effect::Send { session_id: self.core.session_id(), message: wrap(forwarded) });
            effects.push(Effect::CancelTimer { session_id: self.core.session_id(), slot: TimerSlot::Response });
            effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
            Ok(effects)
        }
    }

    /// A CREATE arrived for an already-forwarded flow: either a refresh
    /// (forward it, renew the advertised lifetime) or a teardown
    /// (`lifetime == 0`).
    pub fn on_forwarded_create(&mut self, message: &NatfwMessage) -> Result<Vec<Effect>, SessionError> {
        let Some(msn) = msn_of(message) else {
            return Err(SessionError::Codec(nsis_nslp::NslpError::PduSyntax { offset: 0, detail: "CREATE carried no MSN" }));
        };
        if !matches!(self.core.state, NatfwState::WaitResp | NatfwState::Session) {
            return Ok(Vec::new());
        }
        if !serial::precedes(self.core.msn, msn) {
            return Ok(Vec::new());
        }
        self.core.msn = msn;
        let lifetime = lifetime_of(message).unwrap_or(0);

        if lifetime == 0 {
            let timer_to_cancel = if self.core.state == NatfwState::Session { TimerSlot::State } else { TimerSlot::Response };
            self.core.state = NatfwState::Final;
            let mut effects = self.release_resources();
            effects.push(Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) });
            effects.push(Effect::CancelTimer { session_id: self.core.session_id(), slot: timer_to_cancel });
            effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
            return Ok(effects);
        }

        self.lifetime = lifetime;
        Ok(vec![Effect::Send { session_id: self.core.session_id(), message: wrap(message.clone()) }])
    }

    /// The state timer expired without a refresh arriving in time.
    pub fn on_state_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::Session {
            return Ok(Vec::new());
        }
        self.core.state = NatfwState::Final;
        let mut effects = self.release_resources();
        effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
        Ok(effects)
    }

    /// Downstream never answered the forwarded CREATE/EXT: give up and
    /// release whatever this hop already committed. Unlike NI, an NF has no
    /// failure RESPONSE of its own to originate -- the initiator's own
    /// response timer is what eventually reports the failure upstream.
    pub fn on_response_timer_expiry(&mut self) -> Result<Vec<Effect>, SessionError> {
        if self.core.state != NatfwState::WaitResp {
            return Ok(Vec::new());
        }
        self.core.state = NatfwState::Final;
        let mut effects = self.release_resources();
        effects.push(Effect::RemoveSession { session_id: self.core.session_id() });
        Ok(effects)
    }

    fn release_resources(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(handle) = self.rule_handle.take() {
            effects.push(Effect::RemoveRule { session_id: self.core.session_id(), handle });
        }
        if let Some(addr) = self.external_addr.take() {
            effects.push(Effect::ReleaseExternal { session_id: self.core.session_id(), public_addr: addr });
        }
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_collab::RuleHandle;
    use nsis_nslp::natfw::header::{HeaderFlags, VERSION};
    use nsis_nslp::natfw::information_code::InformationCode;
    use nsis_nslp::natfw::objects::RuleAction;
    use nsis_nslp::natfw::{msg_type, NatfwHeader};
    use std::net::{IpAddr, Ipv4Addr};

    fn create(msn: u32, lifetime: u32) -> NatfwMessage {
        NatfwMessage {
            header: NatfwHeader { version: VERSION, msg_type: msg_type::CREATE, hop_count: 20, flags: HeaderFlags(0), length_words: 0 },
            objects: vec![
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::SessionLifetime(lifetime) },
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::ExtendedFlowInfo { rule_action: RuleAction::Allow, sub_ports: 0 } },
                NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::MessageSequenceNumber(msn) },
            ],
        }
    }

    fn sample_rule() -> Rule {
        Rule {
            action: nsis_collab::RuleAction::Allow,
            src: (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 32),
            src_ports: (1234, 1234),
            dst: (IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 32),
            dst_ports: (4321, 4321),
            protocol: Some(6),
        }
    }

    #[test]
    fn teardown_removes_rule_and_forwards() {
        let mut nf = NfSession::new(SessionId::new(1), NatfwPolicy::default(), false);
        nf.on_create(&create(1, 30), sample_rule(), None).unwrap();
        nf.record_rule_handle(RuleHandle(42));
        nf.core.state = NatfwState::Session;

        let effects = nf.on_forwarded_create(&create(2, 0)).unwrap();
        assert_eq!(nf.state(), NatfwState::Final);
        let mut remove_count = 0;
        let mut sent = false;
        let mut cancelled = false;
        for effect in &effects {
            match effect {
                Effect::RemoveRule { handle, .. } => {
                    assert_eq!(*handle, RuleHandle(42));
                    remove_count += 1;
                }
                Effect::Send { .. } => sent = true,
                Effect::CancelTimer { .. } => cancelled = true,
                _ => {}
            }
        }
        assert_eq!(remove_count, 1);
        assert!(sent);
        assert!(cancelled);
        assert!(nf.rule_handle().is_none());
    }

    #[test]
    fn response_timeout_releases_rule_without_forwarding() {
        let mut nf = NfSession::new(SessionId::new(1), NatfwPolicy::default(), false);
        nf.on_create(&create(1, 30), sample_rule(), None).unwrap();
        nf.record_rule_handle(RuleHandle(7));

        let effects = nf.on_response_timer_expiry().unwrap();
        assert_eq!(nf.state(), NatfwState::Final);
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveRule { handle, .. } if *handle == RuleHandle(7))));
        assert!(effects.iter().any(|e| matches!(e, Effect::RemoveSession { .. })));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Send { .. })));
    }

    #[test]
    fn success_response_commits_rule_and_starts_state_timer() {
        let mut nf = NfSession::new(SessionId::new(1), NatfwPolicy::default(), false);
        nf.on_create(&create(1, 30), sample_rule(), None).unwrap();
        nf.record_rule_handle(RuleHandle(1));

        let response = NatfwMessage {
            header: NatfwHeader { version: VERSION, msg_type: msg_type::RESPONSE, hop_count: 20, flags: HeaderFlags(0), length_words: 0 },
            objects: vec![NatfwObjectEntry { action: ObjectAction::Mandatory, object: NatfwObject::InformationCode(InformationCode::success()) }],
        };
        let effects = nf.on_response(&response).unwrap();
        assert_eq!(nf.state(), NatfwState::Session);
        assert!(effects.iter().any(|e| matches!(e, Effect::StartTimer { slot: TimerSlot::State, .. })));
        assert!(nf.rule_handle().is_some());
    }
}
