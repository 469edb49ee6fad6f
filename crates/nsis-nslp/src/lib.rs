//! NATFW-NSLP and QoS-NSLP PDU codecs, built on a shared NSLP object header
//! framework. Each application owns its own message framing, type-code
//! space, and required-object matrix; the object header (extensibility
//! action, 12-bit type, word-counted length) and the registry-based
//! dispatch pattern are shared, following the same non-global `Registry`
//! convention `nsis-qspec` and `nsis-auth` use.

#![deny(missing_docs)]

pub mod error;
pub mod natfw;
pub mod object;
pub mod qos;

pub use error::NslpError;
pub use object::{ObjectAction, ObjectHeader};
