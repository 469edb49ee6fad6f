//! NATFW-NSLP: the middlebox-control signalling application. Message
//! framing, object set, and required-object matrices are grounded on
//! `examples/original_source/nsis-ka/natfw-nslp/include/msg/*.h`.

pub mod header;
pub mod information_code;
pub mod message;
pub mod objects;

pub use header::{msg_type, HeaderFlags, NatfwHeader};
pub use message::{NatfwMessage, NatfwObjectEntry};
pub use objects::{default_registry, NatfwObject, PortNumbers, RuleAction};
