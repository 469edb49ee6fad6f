//! Session-layer error kinds.

use thiserror::Error;

/// Errors raised by a session state machine or the dispatcher around it.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A local API event was driven against a state that does not accept it
    /// (e.g. `tg_CREATE` on a session already in `Session`).
    #[error("event not valid in state {state}")]
    WrongState {
        /// The state's debug name at the time of the offending event.
        state: &'static str,
    },

    /// The NSLP codec rejected a message outright (malformed PDU, missing
    /// required object). The caller treats this like a dropped message, not
    /// a session failure.
    #[error("codec rejected message: {0}")]
    Codec(#[from] nsis_nslp::NslpError),

    /// Session-authorization HMAC verification failed or its preconditions
    /// were not met.
    #[error("session-authorization check failed: {0}")]
    Auth(#[from] nsis_auth::AuthError),

    /// The rule installer failed; non-fatal at the session level (the
    /// caller converts this into a permanent-failure response).
    #[error("rule installer error: {0}")]
    RuleInstaller(#[from] nsis_collab::PolicyRuleInstallerError),

    /// The NAT broker failed; non-fatal at the session level.
    #[error("NAT broker error: {0}")]
    NatBroker(#[from] nsis_collab::NatBrokerError),

    /// No live session exists for the event's session-id and the event
    /// cannot legitimately open one.
    #[error("no session for event")]
    NoSession,
}

impl SessionError {
    /// Whether retrying the same operation later might succeed. Mirrors
    /// [`nsis_nslp::NslpError::is_transient`] for the wrapped codec case and
    /// is conservatively `false` for every other kind.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Codec(inner) => inner.is_transient(),
            _ => false,
        }
    }
}
