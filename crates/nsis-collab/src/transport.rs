//! The GIST/NTLP transport collaborator. GIST itself is out of scope; this
//! crate only models the narrow surface the dispatcher drives.

use async_trait::async_trait;

use crate::{error::NoNextNode, SessionId};

/// Transport-level delivery attributes a sender attaches to an outbound
/// message and a receiver observes on an inbound one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportAttributes {
    /// Request (or report) reliable delivery.
    pub reliable: bool,
    /// Request (or report) a secured (integrity/confidentiality protected) association.
    pub secure: bool,
    /// This hop is the final NSIS hop for the message.
    pub final_hop: bool,
    /// IP TTL/hop-limit used for the message.
    pub ip_ttl: u8,
    /// GIST "IP distance" hint (hop count to peer).
    pub ip_distance: u8,
    /// Guaranteed Hop Count, per the transport's loop-prevention scheme.
    pub ghc: u8,
}

/// One NSLP message as carried by the transport: a session, a message
/// routing information (opaque to the dispatcher), a peer identifier, and
/// the raw NSLP SDU bytes to be handed to the appropriate codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtlpMessage {
    /// Session this message belongs to, if the transport could associate one.
    pub session_id: Option<SessionId>,
    /// Opaque message-routing-information the transport uses for peer lookup.
    pub mri: Vec<u8>,
    /// Identifier of the peer this message was received from or is destined to.
    pub peer_identifier: Vec<u8>,
    /// The encoded NSLP SDU.
    pub nslp_sdu: Vec<u8>,
    /// Delivery attributes.
    pub attributes: TransportAttributes,
}

/// The transport collaborator. Peer lookup by session-id is the transport's
/// responsibility, not the dispatcher's.
///
/// Only the dispatcher is permitted to call `send`:
/// handlers request a send effect, the dispatcher performs it once the
/// session's lock has been released.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a received message into the dispatcher's event queue.
    ///
    /// # Errors
    /// [`NoNextNode`] when the transport could not resolve a next NSIS hop
    /// for a locally originated message.
    async fn send(&self, message: NtlpMessage) -> Result<(), NoNextNode>;
}
