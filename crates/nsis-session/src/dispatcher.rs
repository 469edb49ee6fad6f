//! The event dispatcher: resolves a transport-delivered message, a local
//! API call, or a fired timer to the right session, invokes its handler,
//! then performs the [`Effect`]s it returns against the collaborators:
//! event -> pure handler -> `Vec<Effect>` -> an async executor that awaits
//! each effect against real I/O while logging failures via `tracing`
//! instead of aborting the batch.
//!
//! GIST-level concerns -- resolving an inbound SDU to a `SessionId`,
//! interpreting MRI, handing an application-layer flow its packet-filter
//! rule -- are the transport's and the embedding binary's job, not this
//! module's: [`MessageContext`] is how the caller hands over the bits this
//! crate cannot derive from the NSLP message alone.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use nsis_buf::NetBuf;
use nsis_collab::{NatBroker, NtlpMessage, Rule, RuleHandle, RuleInstaller, SessionId, TimerHandle, TimerService, Transport, TransportAttributes};
use nsis_nslp::natfw::NatfwMessage;
use nsis_nslp::qos::QosMessage;
use nsis_qspec::QspecPdu;

use crate::effect::{ApiReport, Effect, OutboundMessage, TimerSlot};
use crate::error::SessionError;
use crate::manager::SessionManager;
use crate::natfw::{EdgeExtSession, NatfwPolicy, NatfwState, NfSession, NiSession, NrSession, RelayExtSession};
use crate::qos::{HopMetrics, QnfSession, QniSession, QnrSession, QosPolicy, QosState};

/// Which concrete state machine a live session holds. The manager stores
/// exactly one of these per [`SessionId`]; a deployment plays a single
/// fixed role per signalling application: a message that can legitimately
/// open a session at this role creates one, naming CREATE at NR/NF, EXT
/// at NF, and RESERVE at QNE as the only opening points.
#[derive(Debug, Clone)]
pub enum Session {
    /// NATFW initiator.
    NatfwNi(NiSession),
    /// NATFW responder.
    NatfwNr(NrSession),
    /// NATFW forwarder.
    NatfwNf(NfSession),
    /// NATFW edge EXT forwarder.
    NatfwEdgeExt(EdgeExtSession),
    /// NATFW non-edge (relay) EXT forwarder.
    NatfwRelayExt(RelayExtSession),
    /// QoS-NSLP initiator.
    QosQni(QniSession),
    /// QoS-NSLP responder.
    QosQnr(QnrSession),
    /// QoS-NSLP forwarder.
    QosQnf(QnfSession),
}

impl Session {
    /// This session's identifier, regardless of role.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::NatfwNi(s) => s.session_id(),
            Self::NatfwNr(s) => s.session_id(),
            Self::NatfwNf(s) => s.session_id(),
            Self::NatfwEdgeExt(s) => s.session_id(),
            Self::NatfwRelayExt(s) => s.session_id(),
            Self::QosQni(s) => s.session_id(),
            Self::QosQnr(s) => s.session_id(),
            Self::QosQnf(s) => s.session_id(),
        }
    }

    /// Whether this session has reached its terminal state. A handler that
    /// reaches `Final` always also emits `Effect::RemoveSession`, so
    /// callers normally don't need this directly; it's here for
    /// introspection (tests, metrics).
    #[must_use]
    pub fn is_final(&self) -> bool {
        match self {
            Self::NatfwNi(s) => s.state() == NatfwState::Final,
            Self::NatfwNr(s) => s.state() == NatfwState::Final,
            Self::NatfwNf(s) => s.state() == NatfwState::Final,
            Self::NatfwEdgeExt(s) => s.state() == NatfwState::Final,
            Self::NatfwRelayExt(s) => s.state() == NatfwState::Final,
            Self::QosQni(s) => s.state() == QosState::Final,
            Self::QosQnr(s) => s.state() == QosState::Final,
            Self::QosQnf(s) => s.state() == QosState::Final,
        }
    }
}

/// Which role (if any) this deployment plays for inbound CREATE messages
/// that carry no known session.
#[derive(Debug, Clone, Copy)]
pub enum NatfwCreateRole {
    /// Accept the CREATE locally and answer with a RESPONSE.
    Responder,
    /// Install a rule and forward the CREATE downstream.
    Forwarder {
        /// Whether this forwarder also owns a NAT-broker reservation for the flow.
        nat_edge: bool,
    },
}

/// Which role (if any) this deployment plays for inbound EXT messages.
#[derive(Debug, Clone, Copy)]
pub enum NatfwExtRole {
    /// Terminate EXT locally (the node co-located with the private endpoint).
    Edge,
    /// Relay EXT towards the edge device.
    Relay,
}

/// Which role (if any) this deployment plays for inbound RESERVE messages.
#[derive(Debug, Clone, Copy)]
pub enum QosReserveRole {
    /// Accept the RESERVE locally and answer with a RESPONSE.
    Responder,
    /// Aggregate this hop's measurements, install a rule, and forward downstream.
    Forwarder,
}

/// Fixed per-deployment configuration: which opening messages this node
/// accepts, in which role, plus the policy each newly created session is
/// born with.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Role this node plays for an inbound CREATE with no known session, if any.
    pub natfw_create_role: Option<NatfwCreateRole>,
    /// Role this node plays for an inbound EXT with no known session, if any.
    pub natfw_ext_role: Option<NatfwExtRole>,
    /// Role this node plays for an inbound RESERVE with no known session, if any.
    pub qos_reserve_role: Option<QosReserveRole>,
    /// Policy every NATFW session (of any role) is created with.
    pub natfw_policy: NatfwPolicy,
    /// Policy every QoS-NSLP session (of any role) is created with.
    pub qos_policy: QosPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            natfw_create_role: None,
            natfw_ext_role: None,
            qos_reserve_role: None,
            natfw_policy: NatfwPolicy::default(),
            qos_policy: QosPolicy::default(),
        }
    }
}

/// Either application's decoded PDU, as handed to the dispatcher by the transport.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// A NATFW-NSLP PDU.
    Natfw(NatfwMessage),
    /// A QoS-NSLP PDU.
    Qos(QosMessage),
}

/// Bits a [`Session::NatfwNf`] / [`Session::QosQnf`] needs to open or
/// refresh that this crate cannot derive from the NSLP message itself
/// — the rule installer and NAT broker adapters are abstract interfaces,
/// fed by whatever FIB/policy logic the embedding deployment owns.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    /// The packet-filter rule this hop should install for the flow, required
    /// to open or refresh a forwarder session.
    pub rule: Option<Rule>,
    /// The private-side address a NAT-edge forwarder should reserve an
    /// external mapping for.
    pub private_addr: Option<IpAddr>,
    /// This hop's own QoS measurements, folded into a forwarded RESERVE's QSPEC.
    pub hop_metrics: Option<HopMetrics>,
}

/// A local API call driving a session on behalf of an application.
#[derive(Debug, Clone)]
pub enum ApiEvent {
    /// `tg_CREATE`: originate a NATFW flow.
    NatfwCreate {
        /// Newly assigned session identifier.
        session_id: SessionId,
        /// Requested lifetime, in seconds.
        lifetime: u32,
        /// ICMP types this flow should additionally permit, if any.
        icmp_types: Vec<u8>,
    },
    /// `tg_TEARDOWN` for a live NATFW initiator session.
    NatfwTeardown {
        /// The session to tear down.
        session_id: SessionId,
    },
    /// `tg_RESERVE`: originate a QoS-NSLP reservation.
    QosReserve {
        /// Newly assigned session identifier.
        session_id: SessionId,
        /// Reservation identifier correlating RESERVE with its RESPONSE.
        rii: u32,
        /// Requested lifetime, in seconds.
        lifetime: u32,
        /// The QSPEC describing the desired reservation.
        qspec: QspecPdu,
    },
    /// `tg_TEARDOWN` for a live QoS-NSLP initiator session.
    QosTeardown {
        /// The session to tear down.
        session_id: SessionId,
    },
}

/// The three shapes of event the dispatcher accepts.
#[derive(Debug, Clone)]
pub enum Event {
    /// An inbound NSLP message, already decoded by the transport's codec.
    Message {
        /// Session this message belongs to (the transport assigns one, new
        /// or existing, before handing the event to the dispatcher).
        session_id: SessionId,
        /// The decoded PDU.
        message: InboundMessage,
        /// Context needed to open or refresh a forwarder session.
        context: MessageContext,
    },
    /// A local API call.
    Api(ApiEvent),
    /// A previously armed timer fired.
    Timer {
        /// Session the timer was armed for.
        session_id: SessionId,
        /// The handle the timer service returned when it was started.
        handle: TimerHandle,
    },
}

/// Outcome reported to whichever local caller originated an `ApiEvent`.
#[async_trait]
pub trait ApiSink: Send + Sync {
    /// Deliver `report` for `session_id`.
    async fn report(&self, session_id: SessionId, report: ApiReport);
}

/// Records every report delivered, in call order. For tests and
/// demonstration binaries; mirrors `nsis_collab::mock`'s recording collaborators.
#[derive(Default)]
pub struct RecordingApiSink {
    /// Reports delivered so far.
    pub reports: Mutex<Vec<(SessionId, ApiReport)>>,
}

#[async_trait]
impl ApiSink for RecordingApiSink {
    async fn report(&self, session_id: SessionId, report: ApiReport) {
        self.reports.lock().await.push((session_id, report));
    }
}

/// Failures raised while resolving or driving an event. Distinct from
/// [`SessionError`] (a handler rejecting its own event) in that these can
/// also arise from the dispatcher's own bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The session handler itself rejected the event.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// An `ApiEvent`/`Timer` named a session the manager does not have.
    #[error("no session for id {0}")]
    NoSession(SessionId),
    /// The event's message/API call does not match this session's role
    /// (e.g. a QoS RESPONSE delivered to a NATFW session).
    #[error("event does not apply to this session's role")]
    RoleMismatch,
    /// Opening a forwarder session requires a packet-filter rule the caller
    /// did not supply in the event's [`MessageContext`].
    #[error("opening this session requires a packet-filter rule the caller did not supply")]
    MissingRule,
    /// The NSLP codec rejected an outbound message during encoding.
    #[error(transparent)]
    Codec(#[from] nsis_nslp::NslpError),
    #[error(transparent)]
    /// The output buffer ran out of room while encoding an outbound message.
    Buffer(#[from] nsis_buf::BufferError),
}

/// Resolves events to sessions, invokes their handlers, and performs the
/// effects they return against the collaborators. The dispatcher itself is
/// `async fn`-free at its core (`drive_existing`/`open_session`/`drive_timer`
/// are synchronous); only collaborator I/O and lock acquisition are awaited —
/// the dispatcher itself has no suspension points of its own.
pub struct Dispatcher<T, R, N, Ti>
where
    T: Transport,
    R: RuleInstaller,
    N: NatBroker,
    Ti: TimerService,
{
    sessions: SessionManager,
    transport: Arc<T>,
    rule_installer: Arc<R>,
    nat_broker: Arc<N>,
    timers: Arc<Ti>,
    api_sink: Arc<dyn ApiSink>,
    config: DispatcherConfig,
    timer_slots: Mutex<HashMap<(SessionId, TimerSlot), TimerHandle>>,
    timer_index: Mutex<HashMap<TimerHandle, (SessionId, TimerSlot)>>,
}

impl<T, R, N, Ti> Dispatcher<T, R, N, Ti>
where
    T: Transport,
    R: RuleInstaller,
    N: NatBroker,
    Ti: TimerService,
{
    /// Build a dispatcher around its collaborators and deployment config.
    pub fn new(transport: Arc<T>, rule_installer: Arc<R>, nat_broker: Arc<N>, timers: Arc<Ti>, api_sink: Arc<dyn ApiSink>, config: DispatcherConfig) -> Self {
        Self {
            sessions: SessionManager::new(),
            transport,
            rule_installer,
            nat_broker,
            timers,
            api_sink,
            config,
            timer_slots: Mutex::new(HashMap::new()),
            timer_index: Mutex::new(HashMap::new()),
        }
    }

    /// The session manager backing this dispatcher (tests, metrics).
    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Resolve and act on one event.
    ///
    /// # Errors
    /// See [`DispatchError`].
    pub async fn dispatch(&self, event: Event) -> Result<(), DispatchError> {
        match event {
            Event::Message { session_id, message, context } => self.dispatch_message(session_id, message, context).await,
            Event::Api(api) => self.dispatch_api(api).await,
            Event::Timer { session_id, handle } => self.dispatch_timer(session_id, handle).await,
        }
    }

    async fn dispatch_message(&self, session_id: SessionId, message: InboundMessage, context: MessageContext) -> Result<(), DispatchError> {
        if let Some(existing) = self.sessions.get(session_id).await {
            let effects = {
                let mut guard = existing.lock().await;
                Self::drive_existing(&mut guard, &message, &context)?
            };
            return self.apply_effects(effects).await;
        }

        match Self::open_session(&self.config, session_id, &message, &context)? {
            Some((session, effects)) => {
                self.sessions.insert(session_id, session).await;
                self.apply_effects(effects).await
            }
            None => {
                tracing::debug!(%session_id, "message does not open a session under the configured role, dropping");
                Ok(())
            }
        }
    }

    fn drive_existing(session: &mut Session, message: &InboundMessage, context: &MessageContext) -> Result<Vec<Effect>, DispatchError> {
        use nsis_nslp::natfw::msg_type as natfw_type;
        use nsis_nslp::qos::msg_type as qos_type;

        let effects = match (session, message) {
            (Session::NatfwNi(s), InboundMessage::Natfw(m)) => s.on_response(m)?,
            (Session::NatfwNr(s), InboundMessage::Natfw(m)) => s.on_create(m)?,
            (Session::NatfwNf(s), InboundMessage::Natfw(m)) if m.header.msg_type == natfw_type::RESPONSE => s.on_response(m)?,
            (Session::NatfwNf(s), InboundMessage::Natfw(m)) => s.on_forwarded_create(m)?,
            (Session::NatfwEdgeExt(s), InboundMessage::Natfw(m)) => s.on_ext(m)?,
            (Session::NatfwRelayExt(s), InboundMessage::Natfw(m)) if m.header.msg_type == natfw_type::RESPONSE => s.on_response(m)?,
            (Session::NatfwRelayExt(s), InboundMessage::Natfw(m)) => s.on_ext(m)?,
            (Session::QosQni(s), InboundMessage::Qos(m)) => s.on_response(m)?,
            (Session::QosQnr(s), InboundMessage::Qos(m)) => s.on_reserve(m)?,
            (Session::QosQnf(s), InboundMessage::Qos(m)) if m.header.msg_type == qos_type::RESPONSE => s.on_response(m)?,
            (Session::QosQnf(s), InboundMessage::Qos(m)) => s.on_forwarded_reserve(m, context.hop_metrics.unwrap_or_default())?,
            _ => return Err(DispatchError::RoleMismatch),
        };
        Ok(effects)
    }

    fn open_session(config: &DispatcherConfig, session_id: SessionId, message: &InboundMessage, context: &MessageContext) -> Result<Option<(Session, Vec<Effect>)>, DispatchError> {
        match message {
            InboundMessage::Natfw(m) if m.header.msg_type == nsis_nslp::natfw::msg_type::CREATE => match config.natfw_create_role {
                Some(NatfwCreateRole::Responder) => {
                    let mut session = NrSession::new(session_id, config.natfw_policy.clone());
                    let effects = session.on_create(m)?;
                    Ok(Some((Session::NatfwNr(session), effects)))
                }
                Some(NatfwCreateRole::Forwarder { nat_edge }) => {
                    let rule = context.rule.clone().ok_or(DispatchError::MissingRule)?;
                    let mut session = NfSession::new(session_id, config.natfw_policy.clone(), nat_edge);
                    let effects = session.on_create(m, rule, context.private_addr)?;
                    Ok(Some((Session::NatfwNf(session), effects)))
                }
                None => Ok(None),
            },
            InboundMessage::Natfw(m) if m.header.msg_type == nsis_nslp::natfw::msg_type::EXT => match config.natfw_ext_role {
                Some(NatfwExtRole::Edge) => {
                    let mut session = EdgeExtSession::new(session_id, config.natfw_policy.clone());
                    let effects = session.on_ext(m)?;
                    Ok(Some((Session::NatfwEdgeExt(session), effects)))
                }
                Some(NatfwExtRole::Relay) => {
                    let mut session = RelayExtSession::new(session_id, config.natfw_policy.clone());
                    let effects = session.on_ext(m)?;
                    Ok(Some((Session::NatfwRelayExt(session), effects)))
                }
                None => Ok(None),
            },
            InboundMessage::Qos(m) if m.header.msg_type == nsis_nslp::qos::msg_type::RESERVE => match config.qos_reserve_role {
                Some(QosReserveRole::Responder) => {
                    let mut session = QnrSession::new(session_id, config.qos_policy.clone());
                    let effects = session.on_reserve(m)?;
                    Ok(Some((Session::QosQnr(session), effects)))
                }
                Some(QosReserveRole::Forwarder) => {
                    let rule = context.rule.clone().ok_or(DispatchError::MissingRule)?;
                    let hop = context.hop_metrics.unwrap_or_default();
                    let mut session = QnfSession::new(session_id, config.qos_policy.clone());
                    let effects = session.on_reserve(m, hop, rule)?;
                    Ok(Some((Session::QosQnf(session), effects)))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    async fn dispatch_api(&self, event: ApiEvent) -> Result<(), DispatchError> {
        match event {
            ApiEvent::NatfwCreate { session_id, lifetime, icmp_types } => {
                let mut session = NiSession::new(session_id, self.config.natfw_policy.clone());
                let effects = session.create(lifetime, icmp_types)?;
                self.sessions.insert(session_id, Session::NatfwNi(session)).await;
                self.apply_effects(effects).await
            }
            ApiEvent::NatfwTeardown { session_id } => {
                let arc = self.sessions.get(session_id).await.ok_or(DispatchError::NoSession(session_id))?;
                let effects = {
                    let mut guard = arc.lock().await;
                    match &mut *guard {
                        Session::NatfwNi(s) => s.teardown()?,
                        _ => return Err(DispatchError::RoleMismatch),
                    }
                };
                self.apply_effects(effects).await
            }
            ApiEvent::QosReserve { session_id, rii, lifetime, qspec } => {
                let mut session = QniSession::new(session_id, rii, self.config.qos_policy.clone());
                let effects = session.reserve(lifetime, qspec)?;
                self.sessions.insert(session_id, Session::QosQni(session)).await;
                self.apply_effects(effects).await
            }
            ApiEvent::QosTeardown { session_id } => {
                let arc = self.sessions.get(session_id).await.ok_or(DispatchError::NoSession(session_id))?;
                let effects = {
                    let mut guard = arc.lock().await;
                    match &mut *guard {
                        Session::QosQni(s) => s.teardown()?,
                        _ => return Err(DispatchError::RoleMismatch),
                    }
                };
                self.apply_effects(effects).await
            }
        }
    }

    async fn dispatch_timer(&self, session_id: SessionId, handle: TimerHandle) -> Result<(), DispatchError> {
        let resolved = self.timer_index.lock().await.remove(&handle);
        let Some((owner, slot)) = resolved else {
            tracing::debug!(%session_id, "timer fired after it was already cancelled, ignoring");
            return Ok(());
        };
        self.timer_slots.lock().await.remove(&(owner, slot));

        let Some(arc) = self.sessions.get(owner).await else {
            return Ok(());
        };
        let effects = {
            let mut guard = arc.lock().await;
            Self::drive_timer(&mut guard, slot)
        };
        self.apply_effects(effects).await
    }

    fn drive_timer(session: &mut Session, slot: TimerSlot) -> Vec<Effect> {
        let result = match (&mut *session, slot) {
            (Session::NatfwNi(s), TimerSlot::Response) => s.on_response_timer_expiry(),
            (Session::NatfwNi(s), TimerSlot::Refresh) => s.on_refresh_timer_expiry(),
            (Session::NatfwNr(s), TimerSlot::State) => s.on_state_timer_expiry(),
            (Session::NatfwNf(s), TimerSlot::Response) => s.on_response_timer_expiry(),
            (Session::NatfwNf(s), TimerSlot::State) => s.on_state_timer_expiry(),
            (Session::NatfwEdgeExt(s), TimerSlot::State) => s.on_state_timer_expiry(),
            (Session::NatfwRelayExt(s), TimerSlot::Response) => s.on_response_timer_expiry(),
            (Session::NatfwRelayExt(s), TimerSlot::State) => s.on_state_timer_expiry(),
            (Session::QosQni(s), TimerSlot::Response) => s.on_response_timer_expiry(),
            (Session::QosQni(s), TimerSlot::Refresh) => s.on_refresh_timer_expiry(),
            (Session::QosQnr(s), TimerSlot::State) => s.on_state_timer_expiry(),
            (Session::QosQnf(s), TimerSlot::Response) => s.on_response_timer_expiry(),
            (Session::QosQnf(s), TimerSlot::State) => s.on_state_timer_expiry(),
            _ => Ok(Vec::new()),
        };
        // A handler only ever rejects an event with `WrongState`/`Codec`/etc
        // for events it can choose to reject; a timer is never rejected by
        // construction (every arm above returns `Ok`), so collapse here
        // rather than thread a timer-specific error type through.
        result.unwrap_or_default()
    }

    async fn apply_effects(&self, effects: Vec<Effect>) -> Result<(), DispatchError> {
        for effect in effects {
            match effect {
                Effect::Send { session_id, message } => {
                    let mut buf = NetBuf::new(2048);
                    match message {
                        OutboundMessage::Natfw(m) => m.encode(&mut buf)?,
                        OutboundMessage::Qos(m) => m.encode(&mut buf)?,
                    }
                    let sdu = buf.copy_to(0, buf.position())?.to_vec();
                    let outbound = NtlpMessage {
                        session_id: Some(session_id),
                        mri: Vec::new(),
                        peer_identifier: Vec::new(),
                        nslp_sdu: sdu,
                        attributes: TransportAttributes::default(),
                    };
                    if let Err(err) = self.transport.send(outbound).await {
                        tracing::warn!(%session_id, error = %err, "transport could not resolve a next hop");
                    }
                }
                Effect::StartTimer { session_id, slot, delay } => self.rearm_timer(session_id, slot, delay).await,
                Effect::CancelTimer { session_id, slot } => self.disarm_timer(session_id, slot).await,
                Effect::InstallRule { session_id, rule } => match self.rule_installer.install(rule).await {
                    Ok(handle) => self.record_rule_handle(session_id, handle).await,
                    Err(err) => tracing::warn!(%session_id, error = %err, "rule install failed"),
                },
                Effect::RemoveRule { session_id, handle } => {
                    if let Err(err) = self.rule_installer.remove(handle).await {
                        tracing::warn!(%session_id, error = %err, "rule removal failed");
                    }
                }
                Effect::ReserveExternal { session_id, private_addr } => match self.nat_broker.reserve_external(private_addr).await {
                    Ok(addr) => self.record_external_address(session_id, addr).await,
                    Err(err) => tracing::warn!(%session_id, error = %err, "external reservation failed"),
                },
                Effect::ReleaseExternal { session_id, public_addr } => {
                    if let Err(err) = self.nat_broker.release_external(public_addr).await {
                        tracing::warn!(%session_id, error = %err, "external release failed");
                    }
                }
                Effect::RemoveSession { session_id } => {
                    self.sessions.remove(session_id).await;
                    self.clear_timers_for(session_id).await;
                }
                Effect::ReportToApi { session_id, report } => self.api_sink.report(session_id, report).await,
            }
        }
        Ok(())
    }

    async fn rearm_timer(&self, session_id: SessionId, slot: TimerSlot, delay: Duration) {
        self.disarm_timer(session_id, slot).await;
        let handle = self.timers.start(delay).await;
        self.timer_slots.lock().await.insert((session_id, slot), handle);
        self.timer_index.lock().await.insert(handle, (session_id, slot));
    }

    async fn disarm_timer(&self, session_id: SessionId, slot: TimerSlot) {
        if let Some(handle) = self.timer_slots.lock().await.remove(&(session_id, slot)) {
            self.timers.cancel(handle).await;
            self.timer_index.lock().await.remove(&handle);
        }
    }

    async fn clear_timers_for(&self, session_id: SessionId) {
        for slot in [TimerSlot::State, TimerSlot::Response, TimerSlot::Refresh] {
            self.disarm_timer(session_id, slot).await;
        }
    }

    async fn record_rule_handle(&self, session_id: SessionId, handle: RuleHandle) {
        let Some(arc) = self.sessions.get(session_id).await else { return };
        let mut guard = arc.lock().await;
        match &mut *guard {
            Session::NatfwNf(s) => s.record_rule_handle(handle),
            Session::QosQnf(s) => s.record_rule_handle(handle),
            _ => {}
        }
    }

    async fn record_external_address(&self, session_id: SessionId, addr: IpAddr) {
        let Some(arc) = self.sessions.get(session_id).await else { return };
        let mut guard = arc.lock().await;
        if let Session::NatfwNf(s) = &mut *guard {
            s.record_external_address(addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsis_collab::mock::{RecordingNatBroker, RecordingRuleInstaller, RecordingTimerService, RecordingTransport};
    use nsis_nslp::natfw::header::{HeaderFlags, VERSION};
    use nsis_nslp::natfw::objects::{NatfwObject, RuleAction};
    use nsis_nslp::natfw::{msg_type, NatfwHeader, NatfwObjectEntry};
    use nsis_nslp::ObjectAction as Action;

    type TestDispatcher = Dispatcher<RecordingTransport, RecordingRuleInstaller, RecordingNatBroker, RecordingTimerService>;

    fn responder_dispatcher() -> (TestDispatcher, Arc<RecordingTransport>, Arc<RecordingTimerService>) {
        let transport = Arc::new(RecordingTransport::default());
        let rule_installer = Arc::new(RecordingRuleInstaller::default());
        let nat_broker = Arc::new(RecordingNatBroker::with_pool(vec![]));
        let timers = Arc::new(RecordingTimerService::default());
        let config = DispatcherConfig { natfw_create_role: Some(NatfwCreateRole::Responder), ..DispatcherConfig::default() };
        let dispatcher = Dispatcher::new(transport.clone(), rule_installer, nat_broker, timers.clone(), Arc::new(RecordingApiSink::default()), config);
        (dispatcher, transport, timers)
    }

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

    #[tokio::test]
    async fn inbound_create_opens_a_responder_session_and_sends() {
        let (dispatcher, transport, timers) = responder_dispatcher();
        let session_id = SessionId::new(1);

        dispatcher
            .dispatch(Event::Message { session_id, message: InboundMessage::Natfw(create(1, 30)), context: MessageContext::default() })
            .await
            .unwrap();

        assert_eq!(dispatcher.sessions().len().await, 1);
        assert_eq!(transport.sent.lock().await.len(), 1);
        assert_eq!(timers.started.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_role_drops_the_message() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(
            transport,
            Arc::new(RecordingRuleInstaller::default()),
            Arc::new(RecordingNatBroker::with_pool(vec![])),
            Arc::new(RecordingTimerService::default()),
            Arc::new(RecordingApiSink::default()),
            DispatcherConfig::default(),
        );
        dispatcher
            .dispatch(Event::Message { session_id: SessionId::new(1), message: InboundMessage::Natfw(create(1, 30)), context: MessageContext::default() })
            .await
            .unwrap();
        assert_eq!(dispatcher.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn state_timer_expiry_removes_the_session() {
        let (dispatcher, _transport, timers) = responder_dispatcher();
        let session_id = SessionId::new(7);
        dispatcher
            .dispatch(Event::Message { session_id, message: InboundMessage::Natfw(create(1, 30)), context: MessageContext::default() })
            .await
            .unwrap();
        assert_eq!(dispatcher.sessions().len().await, 1);

        let handle = timers.started.lock().await[0].1;
        dispatcher.dispatch(Event::Timer { session_id, handle }).await.unwrap();
        assert_eq!(dispatcher.sessions().len().await, 0);
    }

    #[tokio::test]
    async fn api_create_then_teardown_round_trips() {
        let transport = Arc::new(RecordingTransport::default());
        let timers = Arc::new(RecordingTimerService::default());
        let dispatcher = Dispatcher::new(
            transport.clone(),
            Arc::new(RecordingRuleInstaller::default()),
            Arc::new(RecordingNatBroker::with_pool(vec![])),
            timers,
            Arc::new(RecordingApiSink::default()),
            DispatcherConfig::default(),
        );
        let session_id = SessionId::new(9);
        dispatcher.dispatch(Event::Api(ApiEvent::NatfwCreate { session_id, lifetime: 30, icmp_types: vec![] })).await.unwrap();
        assert_eq!(dispatcher.sessions().len().await, 1);
        assert_eq!(transport.sent.lock().await.len(), 1);

        dispatcher.dispatch(Event::Api(ApiEvent::NatfwTeardown { session_id })).await.unwrap();
        assert_eq!(dispatcher.sessions().len().await, 0);
        assert_eq!(transport.sent.lock().await.len(), 2);
    }
}
