//! The policy rule installer collaborator.

use async_trait::async_trait;

use crate::error::PolicyRuleInstallerError;

/// Packet filter action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Permit matching traffic.
    Allow,
    /// Block matching traffic.
    Deny,
}

/// IANA protocol number, or `None` for "any protocol".
pub type Protocol = Option<u8>;

/// A packet-filter rule as handed to the installer. Address ranges are
/// carried as CIDR-style `(address, prefix_len)` pairs; `prefix_len` of 32
/// (v4) or 128 (v6) denotes a host route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Allow or deny.
    pub action: RuleAction,
    /// Source address and prefix length.
    pub src: (std::net::IpAddr, u8),
    /// Source port range, inclusive.
    pub src_ports: (u16, u16),
    /// Destination address and prefix length.
    pub dst: (std::net::IpAddr, u8),
    /// Destination port range, inclusive.
    pub dst_ports: (u16, u16),
    /// Protocol this rule matches, or `None` for any.
    pub protocol: Protocol,
}

/// Opaque handle returned by `install`, used later to `remove` the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleHandle(pub u64);

/// The rule installer collaborator. Failure is non-fatal at the session
/// level: the caller converts it into a permanent-failure response and
/// tears the session down.
#[async_trait]
pub trait RuleInstaller: Send + Sync {
    /// One-time setup (open a netlink socket, attach to a chain, ...).
    async fn setup(&self) -> Result<(), PolicyRuleInstallerError>;

    /// Install `rule`, returning a handle for later removal.
    async fn install(&self, rule: Rule) -> Result<RuleHandle, PolicyRuleInstallerError>;

    /// Remove a previously installed rule.
    async fn remove(&self, handle: RuleHandle) -> Result<(), PolicyRuleInstallerError>;

    /// Remove every rule this installer currently owns (shutdown path).
    async fn remove_all(&self) -> Result<(), PolicyRuleInstallerError>;
}
