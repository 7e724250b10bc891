/// UDP Packetizer
/// Timestamp and sequence number header around opaque datagram payloads
///
/// ```text
/// [ u32 BE timestamp (ms) ][ u16 BE sequence number ][ payload ]
/// ```
///
/// The timestamp is milliseconds on a process-wide monotonic clock, reduced
/// mod 2^32 - 1, so packetizers in one process share a time base.
/// The sequence counter wraps at the configured rollover, which must fit the
/// 16-bit field. Decoding is a pure function of the datagram.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::trace;

use super::transport::DatagramTransport;
use crate::error::FramingError;

/// Timestamp plus sequence number
pub const HEADER_LEN: usize = 6;

/// Default sequence number rollover for datagram framing
pub const DEFAULT_UDP_ROLLOVER: u32 = 1 << 15;

/// Largest rollover the 16-bit sequence field can carry
pub const MAX_UDP_ROLLOVER: u32 = 1 << 16;

/// Timestamps are reduced modulo this value
const TIMESTAMP_MODULUS: u128 = u32::MAX as u128;

/// Start of the shared millisecond clock, fixed on first use
fn clock_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

/// Milliseconds on the shared monotonic clock, mod 2^32 - 1
pub fn timestamp_ms() -> u32 {
    (clock_epoch().elapsed().as_millis() % TIMESTAMP_MODULUS) as u32
}

/// A decoded datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpFrame {
    pub timestamp: u32,
    pub seq_no: u16,
    pub payload: Bytes,
}

pub struct UdpPacketizer<T> {
    transport: T,
    destination: SocketAddr,
    seq_no: u32,
    rollover: u32,
}

impl<T: DatagramTransport> UdpPacketizer<T> {
    pub fn new(transport: T, destination: SocketAddr) -> Self {
        Self::with_rollover(transport, destination, DEFAULT_UDP_ROLLOVER)
    }

    /// # Panics
    ///
    /// Panics if `rollover` is zero or larger than 2^16.
    pub fn with_rollover(transport: T, destination: SocketAddr, rollover: u32) -> Self {
        assert!(
            rollover > 0 && rollover <= MAX_UDP_ROLLOVER,
            "UDP rollover must be in 1..=65536, got {}",
            rollover
        );
        clock_epoch();

        Self {
            transport,
            destination,
            seq_no: 0,
            rollover,
        }
    }

    /// Send `payload` with the next sequence number.
    ///
    /// The counter only advances once the datagram has been handed to the
    /// transport, so a failed send is retried with the same number.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), FramingError> {
        let seq_no = self.seq_no;
        self.send(seq_no, payload)?;
        self.seq_no = (self.seq_no + 1) % self.rollover;
        Ok(())
    }

    /// Send `payload` with a caller-chosen sequence number; the internal counter is untouched
    pub fn write_with_seq_no(&mut self, payload: &[u8], seq_no: u32) -> Result<(), FramingError> {
        if seq_no >= self.rollover {
            return Err(FramingError::SequenceOutOfRange {
                seq_no,
                rollover: self.rollover,
            });
        }
        self.send(seq_no, payload)
    }

    fn send(&mut self, seq_no: u32, payload: &[u8]) -> Result<(), FramingError> {
        let timestamp = timestamp_ms();
        // seq_no < rollover <= 2^16
        let datagram = encode(timestamp, seq_no as u16, payload);
        self.transport.write_to(&datagram, self.destination)?;
        trace!(
            "Sent seq {} ts {} ({} byte payload) to {}",
            seq_no,
            timestamp,
            payload.len(),
            self.destination
        );
        Ok(())
    }

    /// Sequence number the next [`write`](Self::write) will use
    pub fn next_seq_no(&self) -> u32 {
        self.seq_no
    }

    pub fn rollover(&self) -> u32 {
        self.rollover
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

/// Build a datagram
pub fn encode(timestamp: u32, seq_no: u16, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u32(timestamp);
    buf.put_u16(seq_no);
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a datagram into header fields and payload
pub fn decode(packet: &[u8]) -> Result<UdpFrame, FramingError> {
    if packet.len() < HEADER_LEN {
        return Err(FramingError::MalformedPacket {
            len: packet.len(),
            header_len: HEADER_LEN,
        });
    }

    let mut header = &packet[..HEADER_LEN];
    let timestamp = header.get_u32();
    let seq_no = header.get_u16();

    Ok(UdpFrame {
        timestamp,
        seq_no,
        payload: Bytes::copy_from_slice(&packet[HEADER_LEN..]),
    })
}
