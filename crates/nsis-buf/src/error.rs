use thiserror::Error;

/// Failure modes raised by [`crate::NetBuf`] and the TLP list it backs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A typed read or write ran past the end of the backing storage.
    #[error("buffer too short: needed {needed} bytes, {available} available at position")]
    BufferTooShort {
        /// Bytes the operation required.
        needed: usize,
        /// Bytes actually available from the cursor to the end of the buffer.
        available: usize,
    },

    /// The cursor was moved to a position beyond the buffer's length.
    #[error("position {pos} out of range for buffer of length {len}")]
    PositionOutOfRange {
        /// Requested cursor position.
        pos: usize,
        /// Buffer length.
        len: usize,
    },

    /// A serialiser produced a body whose length is not a multiple of 4
    /// where padding was required to reach one.
    #[error("object at offset {offset} has unaligned length {len}, not a multiple of 4")]
    UnalignedObject {
        /// Byte offset of the offending object.
        offset: usize,
        /// The (incorrect) length observed.
        len: usize,
    },

    /// A TLP list lookup was attempted after the buffer it was built over
    /// had been mutated. TLP lists are generation-stamped and explicitly
    /// short-lived; this is the caller holding one too long, not a wire error.
    #[error("TLP list is stale: built at generation {built}, buffer is now at generation {now}")]
    StaleTlpList {
        /// Generation the list was built under.
        built: u64,
        /// Generation the buffer carries now.
        now: u64,
    },
}
