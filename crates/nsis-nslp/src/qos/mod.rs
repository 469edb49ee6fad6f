//! QoS-NSLP: the reservation-control signalling application. Object type
//! codes are this crate's own assignment (no reference headers carried
//! concrete numeric assignments); the VLSP object is grounded on
//! `examples/original_source/nsis-ka/qos-nslp/include/vlsp_object.h`.

pub mod header;
pub mod message;
pub mod objects;

pub use header::{msg_type, QosHeader};
pub use message::{QosMessage, QosObjectEntry};
pub use objects::{default_registry, PacketClassifier, QosObject, TunnelType, Vlsp};
