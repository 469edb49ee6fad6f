use thiserror::Error;

/// Failures raised while parsing or validating a QSPEC PDU.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QspecError {
    /// Underlying buffer ran out of bytes.
    #[error("buffer error: {0}")]
    Buffer(#[from] nsis_buf::BufferError),

    /// An object's or parameter's 12-bit length-in-words field disagreed
    /// with how many bytes its body actually consumed.
    #[error("item {item_id} at offset {offset}: declared length {declared} words, body needs {actual} bytes")]
    WrongLength {
        /// Object or parameter id that mis-declared its length.
        item_id: u16,
        /// Byte offset of the parameter header.
        offset: usize,
        /// Declared length in 32-bit words.
        declared: u16,
        /// Bytes the concrete parameter type actually required.
        actual: usize,
    },

    /// A structural rule of the QSPEC-T grammar was violated (empty QSPEC,
    /// empty object, duplicate object/parameter, or a parameter that
    /// failed its own `check()`).
    #[error("PDU syntax error in object/parameter {item_id} at offset {offset}: {detail}")]
    PduSyntax {
        /// Object or parameter id involved.
        item_id: u16,
        /// Byte offset where the violation was detected.
        offset: usize,
        /// Human-readable detail.
        detail: &'static str,
    },

    /// No decoder is registered for this (object or parameter) id and no
    /// fallback was installed on the registry used.
    #[error("no decoder registered for id {0:#x}")]
    WrongType(u16),
}

impl QspecError {
    /// True for errors that stem from a malformed peer message rather than
    /// a local resource limit; kept for symmetry with the other codec
    /// crates' `is_transient`-style helpers even though nothing here
    /// currently retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        false
    }
}
