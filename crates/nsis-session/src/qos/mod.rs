//! QoS-NSLP session state machines: the initiator
//! (QNI), responder (QNR), and forwarder (QNE), mirroring NATFW's shape.

pub mod common;
pub mod qnf;
pub mod qni;
pub mod qnr;

pub use common::{QosPolicy, QosState};
pub use qnf::{HopMetrics, QnfSession};
pub use qni::QniSession;
pub use qnr::QnrSession;
