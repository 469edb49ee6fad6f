//! Session-authorization: the cross-application NSLP object that carries a
//! keyed-HMAC signature over a fixed subset of a signalling message, plus
//! the process-wide key registry the MAC layer looks keys up in.
//!
//! Three pieces, from the inside out:
//! - [`attribute`] — the typed attributes making up a session-auth
//!   object's body (identity, address scope, validity window, the list of
//!   covered NSLP object types, the MAC/token itself).
//! - [`session_auth`] — [`session_auth::SessionAuthObject`], the attribute
//!   container with the cross-attribute presence rules and the
//!   post-hoc MAC-slot bookkeeping the HMAC layer needs.
//! - [`hmac`] — the actual keyed hash over caller-supplied byte ranges.
//!
//! [`key_registry::KeyRegistry`] is the key-id -> (key bytes, transform)
//! map every verification call reads from; it is an explicit value rather
//! than a process singleton.

#![deny(missing_docs)]

pub mod attribute;
pub mod error;
pub mod hmac;
pub mod key_registry;
pub mod session_auth;

pub use attribute::AuthAttribute;
pub use error::AuthError;
pub use hmac::TransformId;
pub use key_registry::KeyRegistry;
pub use session_auth::{EncodedAuth, SessionAuthObject};
