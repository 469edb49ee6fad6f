//! Collaborator-side error kinds. These are never carried on the wire;
//! the session layer converts them into an `InformationCode` response and a
//! transition to `Final`.

use thiserror::Error;

/// Rule installer failure. Non-fatal at the session level: the caller turns
/// this into a permanent-failure response and tears the session down.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyRuleInstallerError {
    /// The installer rejected the rule itself (bad range, conflicting policy).
    #[error("rule rejected: {0}")]
    Rejected(String),
    /// The installer's backend (kernel, firewall daemon) is unavailable.
    #[error("rule installer backend unavailable: {0}")]
    BackendUnavailable(String),
    /// `remove`/`remove_all` was asked to act on a handle it does not know.
    #[error("unknown rule handle")]
    UnknownHandle,
}

/// NAT broker failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NatBrokerError {
    /// The external address pool has no addresses left to reserve.
    #[error("external address pool exhausted")]
    PoolExhausted,
    /// `release_external` was asked to release an address it never handed out.
    #[error("unknown external address")]
    UnknownAddress,
}

/// Raised by the transport when no next NSIS node could be found along the
/// path (graceful failure delivered as a local event).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no next NSIS node found")]
pub struct NoNextNode;
