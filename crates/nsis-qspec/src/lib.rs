//! QSPEC template codec.
//!
//! A QSPEC PDU nests three levels deep: [`pdu::QspecPdu`] carries one or
//! more [`object::QspecObject`]s, each of which carries one or more
//! [`parameter::QspecParameter`]s. All three levels share the same
//! word-counted length-header shape and the same tail-padding-to-4-bytes
//! convention; [`nsis_ie::Registry`] supplies the (type, subtype)-free
//! dispatch the parameter level needs to turn a parameter id into a
//! concrete Rust type without a global registry.

#![deny(missing_docs)]

pub mod error;
pub mod object;
pub mod parameter;
pub mod pdu;

pub use error::QspecError;
pub use object::QspecObject;
pub use parameter::{default_registry, QspecParameter};
pub use pdu::{decode_pdu, MsgSequence, QspecPdu};
