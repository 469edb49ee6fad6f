//! Recording mock collaborators for the dispatcher test suite — lets tests
//! substitute a recording mock for transport/timer/rule/broker calls
//! without changing the handlers.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{NatBrokerError, NoNextNode, PolicyRuleInstallerError};
use crate::nat_broker::NatBroker;
use crate::rule_installer::{Rule, RuleHandle, RuleInstaller};
use crate::timer::{TimerHandle, TimerService};
use crate::transport::{NtlpMessage, Transport};

/// Records every message handed to `send`, in call order.
#[derive(Default)]
pub struct RecordingTransport {
    /// Messages sent so far.
    pub sent: Mutex<Vec<NtlpMessage>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: NtlpMessage) -> Result<(), NoNextNode> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

/// Records installed/removed rules; hands out monotonically increasing
/// handles starting at 1.
#[derive(Default)]
pub struct RecordingRuleInstaller {
    next_handle: AtomicU64,
    /// Rules currently believed installed, keyed by handle.
    pub installed: Mutex<std::collections::HashMap<RuleHandle, Rule>>,
    /// Handles removed so far, in call order.
    pub removed: Mutex<Vec<RuleHandle>>,
}

#[async_trait]
impl RuleInstaller for RecordingRuleInstaller {
    async fn setup(&self) -> Result<(), PolicyRuleInstallerError> {
        Ok(())
    }

    async fn install(&self, rule: Rule) -> Result<RuleHandle, PolicyRuleInstallerError> {
        let handle = RuleHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.installed.lock().await.insert(handle, rule);
        Ok(handle)
    }

    async fn remove(&self, handle: RuleHandle) -> Result<(), PolicyRuleInstallerError> {
        if self.installed.lock().await.remove(&handle).is_none() {
            return Err(PolicyRuleInstallerError::UnknownHandle);
        }
        self.removed.lock().await.push(handle);
        Ok(())
    }

    async fn remove_all(&self) -> Result<(), PolicyRuleInstallerError> {
        let mut installed = self.installed.lock().await;
        let mut removed = self.removed.lock().await;
        removed.extend(installed.keys().copied());
        installed.clear();
        Ok(())
    }
}

/// Hands out addresses from a fixed pool in order; records releases.
pub struct RecordingNatBroker {
    pool: Mutex<Vec<IpAddr>>,
    /// Addresses currently on loan.
    pub reserved: Mutex<Vec<IpAddr>>,
}

impl RecordingNatBroker {
    /// Build a broker backed by `pool`, handed out front-to-back.
    #[must_use]
    pub fn with_pool(pool: Vec<IpAddr>) -> Self {
        Self { pool: Mutex::new(pool), reserved: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl NatBroker for RecordingNatBroker {
    async fn reserve_external(&self, _private_addr: IpAddr) -> Result<IpAddr, NatBrokerError> {
        let mut pool = self.pool.lock().await;
        let addr = pool.pop().ok_or(NatBrokerError::PoolExhausted)?;
        self.reserved.lock().await.push(addr);
        Ok(addr)
    }

    async fn release_external(&self, public_addr: IpAddr) -> Result<(), NatBrokerError> {
        let mut reserved = self.reserved.lock().await;
        let position =
            reserved.iter().position(|addr| *addr == public_addr).ok_or(NatBrokerError::UnknownAddress)?;
        reserved.remove(position);
        self.pool.lock().await.push(public_addr);
        Ok(())
    }
}

/// Records start/cancel calls; never actually fires -- tests drive expiry
/// explicitly via a `TimerEvent`.
#[derive(Default)]
pub struct RecordingTimerService {
    next_handle: AtomicU64,
    /// `(delay, handle)` pairs for every `start` call, in order.
    pub started: Mutex<Vec<(Duration, TimerHandle)>>,
    /// Handles cancelled so far, in order.
    pub cancelled: Mutex<Vec<TimerHandle>>,
}

#[async_trait]
impl TimerService for RecordingTimerService {
    async fn start(&self, delay: Duration) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.started.lock().await.push((delay, handle));
        handle
    }

    async fn cancel(&self, handle: TimerHandle) {
        self.cancelled.lock().await.push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_installer_round_trips() {
        let installer = RecordingRuleInstaller::default();
        let rule = Rule {
            action: crate::rule_installer::RuleAction::Allow,
            src: ("10.0.0.1".parse().unwrap(), 32),
            src_ports: (1234, 1234),
            dst: ("10.0.0.2".parse().unwrap(), 32),
            dst_ports: (4321, 4321),
            protocol: Some(6),
        };
        let handle = installer.install(rule).await.unwrap();
        assert_eq!(installer.installed.lock().await.len(), 1);
        installer.remove(handle).await.unwrap();
        assert!(installer.installed.lock().await.is_empty());
        assert_eq!(installer.removed.lock().await.as_slice(), &[handle]);
    }

    #[tokio::test]
    async fn nat_broker_exhausts_pool() {
        let broker = RecordingNatBroker::with_pool(vec!["203.0.113.1".parse().unwrap()]);
        let addr = "10.0.0.5".parse().unwrap();
        let public = broker.reserve_external(addr).await.unwrap();
        assert!(broker.reserve_external(addr).await.is_err());
        broker.release_external(public).await.unwrap();
        assert!(broker.reserve_external(addr).await.is_ok());
    }

    #[tokio::test]
    async fn timer_service_records_start_and_cancel() {
        let timers = RecordingTimerService::default();
        let handle = timers.start(Duration::from_secs(5)).await;
        timers.cancel(handle).await;
        assert_eq!(timers.started.lock().await.len(), 1);
        assert_eq!(timers.cancelled.lock().await.as_slice(), &[handle]);
    }
}
