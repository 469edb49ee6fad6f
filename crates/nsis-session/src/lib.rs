//! Session state machines for the two signalling applications (NATFW-NSLP,
//! QoS-NSLP) and the dispatcher that drives them from transport/API/timer
//! events. Every handler here is a pure
//! function from `(state, event)` to `(new state, Vec<Effect>)`; all I/O
//! happens in [`dispatcher`], which separates deciding what to do from
//! actually doing it.

#![deny(missing_docs)]

pub mod dispatcher;
pub mod effect;
pub mod error;
pub mod manager;
pub mod natfw;
pub mod qos;
pub mod serial;
pub mod wire;

pub use dispatcher::{ApiEvent, ApiSink, Dispatcher, DispatchError, DispatcherConfig, Event, InboundMessage, MessageContext, NatfwCreateRole, NatfwExtRole, QosReserveRole, RecordingApiSink, Session};
pub use effect::{ApiReport, Effect, OutboundMessage, TimerSlot};
pub use error::SessionError;
pub use manager::SessionManager;
