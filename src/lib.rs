//! singt-transport - buffering and framing for real-time audio streams
//!
//! Receive path: datagram -> `net::udp::decode` -> `media::JitterBuffer::put`
//! -> `JitterBuffer::get` on the audio clock -> `media::RingBuffer::put` ->
//! `RingBuffer::get` in the audio callback, with `media::AutomaticGainControl`
//! applied to output blocks. Control messages travel over TCP with
//! `net::TcpPacketizer`.

pub mod config;
pub mod error;
pub mod media;
pub mod net;

pub use config::StreamConfig;
pub use error::{Error, FramingError, JitterError, Result, RingBufferError};
