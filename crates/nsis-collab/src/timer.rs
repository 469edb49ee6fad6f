//! The timer service collaborator. Timers are fire-and-forget: expiry is
//! delivered back to the dispatcher as a `TimerEvent` carrying the handle.

use async_trait::async_trait;
use std::time::Duration;

/// An opaque, per-session-unique timer handle. Starting a new timer for the
/// same semantic slot (state/response/refresh) implicitly cancels whichever
/// handle previously occupied that slot -- the session state machine, not
/// this trait, enforces that exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// The timer service collaborator.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Arm a one-shot timer that fires after `delay`.
    async fn start(&self, delay: Duration) -> TimerHandle;

    /// Cancel a previously armed timer. A no-op if it already fired or was
    /// already cancelled.
    async fn cancel(&self, handle: TimerHandle);
}
