use thiserror::Error;

/// Failures raised while parsing, validating, or authenticating a
/// session-authorization object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Underlying buffer ran out of bytes.
    #[error("buffer error: {0}")]
    Buffer(#[from] nsis_buf::BufferError),

    /// An attribute's 16-bit length field disagreed with how many bytes
    /// its concrete type actually consumed.
    #[error("attribute xtype {xtype} subtype {subtype} at offset {offset}: declared length {declared}, body needs {actual} bytes")]
    WrongLength {
        /// xtype of the mis-declared attribute.
        xtype: u8,
        /// subtype of the mis-declared attribute.
        subtype: u8,
        /// Byte offset of the attribute header.
        offset: usize,
        /// Declared length in bytes, header included.
        declared: u16,
        /// Bytes the concrete attribute type actually required, header included.
        actual: usize,
    },

    /// One of the session-auth object's cross-attribute presence rules was
    /// violated (`HMAC_SIGNED` without a matching `NslpObjectList`/`AuthData`
    /// pair, or an `NslpObjectList` without an `AuthData`).
    #[error("session-auth object violates attribute presence rule: {0}")]
    MissingAttribute(&'static str),

    /// The key-id carried by an `AuthData` attribute has no entry in the
    /// key registry used for verification.
    #[error("no key registered for key-id {0}")]
    UnknownKey(u32),

    /// A session-auth object claimed an HMAC transform id this crate has
    /// no algorithm wired up for.
    #[error("unsupported HMAC transform id {0:?}")]
    UnsupportedTransform(crate::hmac::TransformId),

    /// The key material handed to the MAC implementation was rejected
    /// (in practice this never happens for HMAC, which accepts any key
    /// length, but the underlying crate's API is fallible).
    #[error("invalid HMAC key material")]
    InvalidKey,

    /// An `HMAC_SIGNED` session-auth object's MAC field did not match the
    /// value this crate computed over the covered byte ranges.
    #[error("HMAC verification failed")]
    VerificationFailed,
}

impl AuthError {
    /// True for errors that stem from local state (an unregistered key)
    /// rather than a malformed or hostile peer message.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UnknownKey(_))
    }
}
