/// TCP Packetizer
/// Length-prefixed message framing over a byte stream
///
/// Wire format, repeated with no magic, checksum, or version:
///
/// ```text
/// [ u16 little-endian body length ][ body bytes ]
/// ```
///
/// Decoding is incremental. Bytes that do not yet form a complete message
/// are kept until the next chunk arrives, so a chunk may end anywhere: in the
/// middle of a length prefix, in the middle of a body, or hold many messages.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use super::transport::StreamTransport;
use crate::error::FramingError;

/// Bytes in the length prefix
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest body the prefix can describe
pub const MAX_MESSAGE_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DecodeState {
    AwaitingLength,
    AwaitingBody { length: usize },
}

/// Framing state machine, shared by [`TcpPacketizer`] and `tokio_util` framed streams
#[derive(Debug, Clone)]
pub struct FrameCodec {
    state: DecodeState,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::AwaitingLength,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_state(state: DecodeState) -> Self {
        Self { state }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> DecodeState {
        self.state
    }

    /// True when a length prefix has been read and its body is still incomplete
    pub fn awaiting_body(&self) -> bool {
        matches!(self.state, DecodeState::AwaitingBody { .. })
    }

    /// Append one framed message to `dst`
    pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), FramingError> {
        let length =
            u16::try_from(payload.len()).map_err(|_| FramingError::PayloadTooLarge(payload.len()))?;
        dst.reserve(LENGTH_PREFIX_LEN + payload.len());
        dst.put_u16_le(length);
        dst.put_slice(payload);
        Ok(())
    }

    /// Take the next complete message off the front of `buf`, if there is one
    pub fn next_frame(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            match self.state {
                DecodeState::AwaitingLength => {
                    if buf.len() < LENGTH_PREFIX_LEN {
                        return None;
                    }
                    let length = buf.get_u16_le() as usize;
                    self.state = DecodeState::AwaitingBody { length };
                }
                DecodeState::AwaitingBody { length } => {
                    if buf.len() < length {
                        buf.reserve(length - buf.len());
                        return None;
                    }
                    self.state = DecodeState::AwaitingLength;
                    return Some(buf.split_to(length).freeze());
                }
            }
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, FramingError> {
        Ok(self.next_frame(src))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), FramingError> {
        Self::encode_frame(&item, dst)
    }
}

impl Encoder<&str> for FrameCodec {
    type Error = FramingError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<(), FramingError> {
        Self::encode_frame(item.as_bytes(), dst)
    }
}

/// Writes framed messages to a stream transport and decodes received chunks
pub struct TcpPacketizer<T> {
    transport: T,
    codec: FrameCodec,
    /// Received bytes not yet part of a complete message
    buffer: BytesMut,
}

impl<T: StreamTransport> TcpPacketizer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(),
            buffer: BytesMut::new(),
        }
    }

    /// Send one binary message; prefix and body go out in a single write
    pub fn write_bytes(&mut self, payload: &[u8]) -> Result<(), FramingError> {
        let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
        FrameCodec::encode_frame(payload, &mut frame)?;
        self.transport.write(&frame)?;
        trace!("Wrote {} byte message", payload.len());
        Ok(())
    }

    /// Send one UTF-8 text message
    pub fn write(&mut self, text: &str) -> Result<(), FramingError> {
        self.write_bytes(text.as_bytes())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T> TcpPacketizer<T> {
    /// Feed a received chunk; returns every message it completes, in order
    pub fn decode_bytes(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(message) = self.codec.next_frame(&mut self.buffer) {
            messages.push(message);
        }

        if !self.buffer.is_empty() {
            trace!(
                "Holding {} bytes of partial message (awaiting body: {})",
                self.buffer.len(),
                self.codec.awaiting_body()
            );
        }
        messages
    }

    /// As [`decode_bytes`](Self::decode_bytes), then UTF-8 decodes each message.
    ///
    /// Every message in the chunk is consumed from the stream even when one of
    /// them fails to decode, so a single invalid message loses the valid ones
    /// decoded alongside it. Use [`decode_lossy`](Self::decode_lossy) to keep them.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<String>, FramingError> {
        self.decode_bytes(chunk)
            .iter()
            .map(|message| {
                std::str::from_utf8(message)
                    .map(str::to_owned)
                    .map_err(FramingError::from)
            })
            .collect()
    }

    /// As [`decode`](Self::decode), but skips messages that are not valid UTF-8
    pub fn decode_lossy(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode_bytes(chunk)
            .iter()
            .filter_map(|message| match std::str::from_utf8(message) {
                Ok(text) => Some(text.to_owned()),
                Err(e) => {
                    warn!("Skipping {} byte message that is not UTF-8: {}", message.len(), e);
                    None
                }
            })
            .collect()
    }

    /// Bytes held back waiting for the rest of a message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
