//! Collaborator trait seams for the session dispatcher: transport, policy
//! rule installer, NAT broker, and timer service. These calls may fork to
//! the kernel or block on real I/O, so the traits are `async_trait` and a
//! Tokio-backed production implementation performs that I/O, while the
//! session state machines above them stay synchronous.

#![deny(missing_docs)]

pub mod error;
pub mod mock;
pub mod nat_broker;
pub mod rule_installer;
pub mod timer;
pub mod transport;

pub use error::{NatBrokerError, NoNextNode, PolicyRuleInstallerError};
pub use nat_broker::NatBroker;
pub use rule_installer::{Protocol, Rule, RuleAction, RuleHandle, RuleInstaller};
pub use timer::{TimerHandle, TimerService};
pub use transport::{NtlpMessage, Transport, TransportAttributes};

/// The 128-bit GIST session identifier shared by a peer's NTLP session and
/// every NSLP object that carries a `SessionID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u128);

impl SessionId {
    /// Wrap a raw 128-bit value.
    #[must_use]
    pub fn new(value: u128) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}
