//! NATFW-NSLP session state machines: the
//! initiator (NI), responder (NR), forwarder (NF), and the two EXT roles.

pub mod common;
pub mod ext;
pub mod nf;
pub mod ni;
pub mod nr;

pub use common::{NatfwPolicy, NatfwState};
pub use ext::{EdgeExtSession, RelayExtSession};
pub use nf::NfSession;
pub use ni::NiSession;
pub use nr::NrSession;
