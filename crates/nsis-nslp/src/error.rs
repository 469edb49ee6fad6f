use thiserror::Error;

/// Failures raised while parsing or validating an NSLP PDU (NATFW or QoS).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NslpError {
    /// Underlying buffer ran out of bytes.
    #[error("buffer error: {0}")]
    Buffer(#[from] nsis_buf::BufferError),

    /// A nested QSPEC template failed to parse or validate.
    #[error("QSPEC error: {0}")]
    Qspec(#[from] nsis_qspec::QspecError),

    /// A nested session-authorization object failed to parse or validate.
    #[error("session-auth error: {0}")]
    Auth(#[from] nsis_auth::AuthError),

    /// An object's 12-bit length-in-words field disagreed with how many
    /// bytes its body actually consumed.
    #[error("object type {object_type:#x} at offset {offset}: declared length {declared} words, body needs {actual} bytes")]
    WrongLength {
        /// Type code of the mis-declared object.
        object_type: u16,
        /// Byte offset of the object header.
        offset: usize,
        /// Declared length in 32-bit words.
        declared: u16,
        /// Bytes the concrete object type actually required.
        actual: usize,
    },

    /// A PDU-level structural rule was violated: a duplicate object type,
    /// or a required object missing for this message type.
    #[error("PDU syntax error in message at offset {offset}: {detail}")]
    PduSyntax {
        /// Byte offset where the violation was detected (message start).
        offset: usize,
        /// Human-readable detail.
        detail: &'static str,
    },

    /// An object whose `Mandatory` action bit was set had a type code this
    /// receiver does not recognise; the whole PDU is rejected.
    #[error("unrecognised object type {0:#x} carried a Mandatory action bit")]
    UnrecognisedMandatoryObject(u16),

    /// No message-type decoder is registered and no fallback was installed.
    #[error("no decoder registered for message type {0:#x}")]
    WrongType(u8),
}

impl NslpError {
    /// True for errors that stem from a malformed peer message rather than
    /// a local resource limit.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        false
    }
}
