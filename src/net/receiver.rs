use anyhow::{Context, Result};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::udp;
use crate::media::JitterBuffer;

/// Largest datagram read in one call
const RECV_BUFFER_LEN: usize = 2048;

/// Poll interval for the receive loop
const RECV_POLL: Duration = Duration::from_millis(20);

/// Counters for one receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveStats {
    pub datagrams: u64,
    /// Shorter than the UDP header
    pub malformed: u64,
    /// Sequence number outside the jitter buffer's range
    pub rejected: u64,
}

/// Reads framed datagrams off a socket and feeds the jitter buffer
pub struct PacketReceiver {
    socket: UdpSocket,
    jitter_buffer: Arc<JitterBuffer<Bytes>>,
    stats: ReceiveStats,
}

impl PacketReceiver {
    /// Bind to `addr` (port 0 for auto-assign)
    pub async fn bind(addr: SocketAddr, jitter_buffer: Arc<JitterBuffer<Bytes>>) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .context(format!("Failed to bind receive socket on {}", addr))?;

        debug!("Packet receiver bound to {}", socket.local_addr()?);

        Ok(Self::from_socket(socket, jitter_buffer))
    }

    /// Create from an already-bound socket (avoids port race conditions)
    pub fn from_socket(socket: UdpSocket, jitter_buffer: Arc<JitterBuffer<Bytes>>) -> Self {
        Self {
            socket,
            jitter_buffer,
            stats: ReceiveStats::default(),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn jitter_buffer(&self) -> &Arc<JitterBuffer<Bytes>> {
        &self.jitter_buffer
    }

    pub fn stats(&self) -> ReceiveStats {
        self.stats
    }

    /// Receive datagrams for the specified duration with cancellation support.
    ///
    /// Returns `Ok(false)` if cancelled, `Ok(true)` if the duration ran out.
    pub async fn receive_for_cancellable(
        &mut self,
        duration: Duration,
        cancel_token: CancellationToken,
    ) -> Result<bool> {
        let mut buf = [0u8; RECV_BUFFER_LEN];
        let deadline = tokio::time::Instant::now() + duration;
        let mut cancelled = false;
        let mut first_packet_logged = false;

        loop {
            if cancel_token.is_cancelled() {
                debug!("Packet receive cancelled by shutdown signal");
                cancelled = true;
                break;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                result = timeout(remaining.min(RECV_POLL), self.socket.recv_from(&mut buf)) => {
                    match result {
                        Ok(Ok((len, addr))) => {
                            if !first_packet_logged {
                                info!("First packet received: {} bytes from {}", len, addr);
                                first_packet_logged = true;
                            }
                            self.process_datagram(&buf[..len]);
                        }
                        Ok(Err(e)) => {
                            warn!("Receive error: {}", e);
                        }
                        Err(_) => {}
                    }
                }
                _ = cancel_token.cancelled() => {
                    debug!("Packet receive cancelled by shutdown signal");
                    cancelled = true;
                    break;
                }
            }
        }

        info!(
            "Receive done: {} datagrams, {} malformed, {} rejected, {} buffered",
            self.stats.datagrams,
            self.stats.malformed,
            self.stats.rejected,
            self.jitter_buffer.len()
        );
        Ok(!cancelled)
    }

    /// Decode one datagram and hand it to the jitter buffer; bad input is counted and dropped
    pub fn process_datagram(&mut self, data: &[u8]) {
        self.stats.datagrams += 1;

        let frame = match udp::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                trace!("Dropping datagram: {}", e);
                self.stats.malformed += 1;
                return;
            }
        };

        if let Err(e) = self
            .jitter_buffer
            .put(u32::from(frame.seq_no), frame.payload)
        {
            warn!("Dropping packet: {}", e);
            self.stats.rejected += 1;
        }
    }
}
