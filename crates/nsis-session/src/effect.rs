//! Effects a session handler requests and the dispatcher performs: handlers
//! never touch a collaborator directly, they return a list of what should
//! happen once the session's mutex is released.

use std::net::IpAddr;
use std::time::Duration;

use nsis_collab::{Rule, RuleHandle, SessionId};
use nsis_nslp::natfw::NatfwMessage;
use nsis_nslp::qos::QosMessage;

/// Which signalling application produced/consumes a message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// A NATFW-NSLP PDU.
    Natfw(NatfwMessage),
    /// A QoS-NSLP PDU.
    Qos(QosMessage),
}

/// The three named timer slots a session may have live at once. Starting a
/// new timer for a slot implicitly cancels whichever handle currently
/// occupies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// NR/forwarder soft state expiry.
    State,
    /// NI/forwarder retransmission timer while awaiting a RESPONSE.
    Response,
    /// NI/forwarder refresh timer while in `Session`.
    Refresh,
}

/// Outcome reported to the local API for an `api_*_event` that originated
/// this session.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReport {
    /// The request succeeded; `external_address` is populated for NAT
    /// reservations, `None` otherwise.
    Success {
        /// Externally reserved address, when the session involved a NAT reservation.
        external_address: Option<IpAddr>,
    },
    /// The request failed; carries the information code received or synthesised.
    Failure(nsis_nslp::natfw::information_code::InformationCode),
}

/// An effect returned by a session handler for the dispatcher to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a message to the session's peer.
    Send {
        /// Target session.
        session_id: SessionId,
        /// The message to send.
        message: OutboundMessage,
    },
    /// Arm (or re-arm) a timer slot, cancelling whatever previously occupied it.
    StartTimer {
        /// Owning session.
        session_id: SessionId,
        /// Which slot.
        slot: TimerSlot,
        /// Delay before it fires.
        delay: Duration,
    },
    /// Cancel a timer slot if it is currently armed.
    CancelTimer {
        /// Owning session.
        session_id: SessionId,
        /// Which slot.
        slot: TimerSlot,
    },
    /// Install a packet-filter rule via the rule installer.
    InstallRule {
        /// Owning session.
        session_id: SessionId,
        /// The rule to install.
        rule: Rule,
    },
    /// Remove a previously installed rule.
    RemoveRule {
        /// Owning session.
        session_id: SessionId,
        /// The rule's handle.
        handle: RuleHandle,
    },
    /// Reserve an externally routable address via the NAT broker.
    ReserveExternal {
        /// Owning session.
        session_id: SessionId,
        /// The private address to map.
        private_addr: IpAddr,
    },
    /// Release a previously reserved external address.
    ReleaseExternal {
        /// Owning session.
        session_id: SessionId,
        /// The address to release.
        public_addr: IpAddr,
    },
    /// Remove the session from the manager (only valid once its state is `Final`).
    RemoveSession {
        /// The session to remove.
        session_id: SessionId,
    },
    /// Deliver an outcome to the local API caller that originated the request.
    ReportToApi {
        /// Owning session.
        session_id: SessionId,
        /// The outcome.
        report: ApiReport,
    },
}
