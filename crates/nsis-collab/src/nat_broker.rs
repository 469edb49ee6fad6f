//! The NAT broker collaborator.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::NatBrokerError;

/// The NAT broker collaborator: reserves and releases externally routable
/// addresses on behalf of a NAT-edge forwarder.
#[async_trait]
pub trait NatBroker: Send + Sync {
    /// Reserve a public address/port mapping for `private_addr`.
    ///
    /// # Errors
    /// [`NatBrokerError::PoolExhausted`] if no externally routable address
    /// remains.
    async fn reserve_external(&self, private_addr: IpAddr) -> Result<IpAddr, NatBrokerError>;

    /// Release a previously reserved public address.
    ///
    /// # Errors
    /// [`NatBrokerError::UnknownAddress`] if `public_addr` was never reserved.
    async fn release_external(&self, public_addr: IpAddr) -> Result<(), NatBrokerError>;
}
