/// Error types for the buffering and framing primitives
///
/// Contract and capacity violations are returned to the immediate caller.
/// Packet loss, reordering and starvation are not errors and never show up here.

use thiserror::Error;

/// Jitter buffer errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterError {
    #[error("sequence number {seq_no} out of range (rollover at {rollover})")]
    SequenceOutOfRange { seq_no: u32, rollover: u32 },
}

/// Ring buffer errors
///
/// The buffer is left untouched whenever one of these is returned.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingBufferError {
    #[error("block of {len} elements is not a whole number of {channels}-channel records")]
    ShapeMismatch { len: usize, channels: usize },

    #[error("buffer overrun: {requested} records requested but only {free} free")]
    BufferOverrun { requested: usize, free: usize },

    #[error("buffer underrun: {requested} records requested but only {available} available")]
    BufferUnderrun { requested: usize, available: usize },
}

/// Wire framing errors (TCP and UDP packetizers)
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("payload of {0} bytes does not fit in a 16-bit length prefix")]
    PayloadTooLarge(usize),

    #[error("message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("malformed packet: {len} bytes is shorter than the {header_len}-byte header")]
    MalformedPacket { len: usize, header_len: usize },

    #[error("sequence number {seq_no} out of range (rollover at {rollover})")]
    SequenceOutOfRange { seq_no: u32, rollover: u32 },

    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for callers that drive several components at once
#[derive(Error, Debug)]
pub enum Error {
    #[error("jitter buffer error: {0}")]
    Jitter(#[from] JitterError),

    #[error("ring buffer error: {0}")]
    RingBuffer(#[from] RingBufferError),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
