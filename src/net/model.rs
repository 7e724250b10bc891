/// Length-prefix decoder - Stateright Model
/// Explores every way a framed stream can be chopped into 1 to 3 byte chunks
/// and drives the real `FrameCodec` through each of them.
///
/// Run with: cargo test --release frame_model -- --nocapture

use bytes::BytesMut;
use stateright::*;

use super::tcp::{DecodeState, FrameCodec, LENGTH_PREFIX_LEN};

/// Decoder state after some prefix of the stream has been delivered
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct DecoderModel {
    /// Bytes of the encoded stream delivered so far
    pub delivered: usize,
    pub decode_state: DecodeState,
    /// Bytes held back by the decoder
    pub buffer: Vec<u8>,
    pub emitted: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum DecoderAction {
    /// Deliver the next `n` bytes as one chunk
    Deliver(usize),
}

#[derive(Clone)]
pub struct FrameDecoderChecker {
    pub messages: Vec<Vec<u8>>,
    pub max_chunk: usize,
    stream: Vec<u8>,
}

impl FrameDecoderChecker {
    pub fn new(messages: Vec<Vec<u8>>, max_chunk: usize) -> Self {
        let mut stream = BytesMut::new();
        for message in &messages {
            FrameCodec::encode_frame(message, &mut stream).unwrap();
        }
        Self {
            messages,
            max_chunk,
            stream: stream.to_vec(),
        }
    }
}

impl Default for FrameDecoderChecker {
    fn default() -> Self {
        Self::new(vec![b"hi".to_vec(), Vec::new(), b"abc".to_vec()], 3)
    }
}

impl Model for FrameDecoderChecker {
    type State = DecoderModel;
    type Action = DecoderAction;

    fn init_states(&self) -> Vec<Self::State> {
        vec![DecoderModel {
            delivered: 0,
            decode_state: DecodeState::AwaitingLength,
            buffer: Vec::new(),
            emitted: Vec::new(),
        }]
    }

    fn actions(&self, state: &Self::State, actions: &mut Vec<Self::Action>) {
        let left = self.stream.len() - state.delivered;
        for n in 1..=self.max_chunk.min(left) {
            actions.push(DecoderAction::Deliver(n));
        }
    }

    fn next_state(&self, state: &Self::State, action: Self::Action) -> Option<Self::State> {
        let DecoderAction::Deliver(n) = action;
        let end = state.delivered + n;

        let mut codec = FrameCodec::with_state(state.decode_state);
        let mut buf = BytesMut::from(&state.buffer[..]);
        buf.extend_from_slice(&self.stream[state.delivered..end]);

        let mut emitted = state.emitted.clone();
        while let Some(message) = codec.next_frame(&mut buf) {
            emitted.push(message.to_vec());
        }

        Some(DecoderModel {
            delivered: end,
            decode_state: codec.state(),
            buffer: buf.to_vec(),
            emitted,
        })
    }

    fn properties(&self) -> Vec<Property<Self>> {
        vec![
            // Safety: messages come out whole and in order
            Property::always("emitted_is_prefix", |model: &Self, state: &DecoderModel| {
                state.emitted.len() <= model.messages.len()
                    && state.emitted[..] == model.messages[..state.emitted.len()]
            }),
            // Safety: the decoder never sits on a complete message
            Property::always("at_most_one_partial", |_, state: &DecoderModel| {
                match state.decode_state {
                    DecodeState::AwaitingLength => state.buffer.len() < LENGTH_PREFIX_LEN,
                    DecodeState::AwaitingBody { length } => state.buffer.len() < length,
                }
            }),
            // Liveness: once the stream is delivered, every message is out
            Property::eventually("all_emitted", |model: &Self, state: &DecoderModel| {
                state.emitted.len() == model.messages.len()
            }),
            Property::sometimes("split_inside_prefix", |_, state: &DecoderModel| {
                state.decode_state == DecodeState::AwaitingLength && state.buffer.len() == 1
            }),
            Property::sometimes("split_inside_body", |_, state: &DecoderModel| {
                matches!(state.decode_state, DecodeState::AwaitingBody { .. })
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stateright::Checker;

    #[test]
    fn frame_model_check_properties() {
        let checker = FrameDecoderChecker::default().checker().spawn_bfs().join();

        println!("States explored: {}", checker.unique_state_count());

        checker.assert_properties();
    }

    #[test]
    fn frame_model_single_byte_chunks() {
        let checker = FrameDecoderChecker::new(
            vec![b"one".to_vec(), b"two".to_vec()],
            1,
        )
        .checker()
        .spawn_bfs()
        .join();

        checker.assert_properties();
        // One path: one state per delivered byte plus the initial one
        assert_eq!(checker.unique_state_count(), 11);
    }
}
