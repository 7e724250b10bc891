pub mod agc;
pub mod jitter;
pub mod playout;
pub mod ring;

pub use agc::AutomaticGainControl;
pub use jitter::{seq_distance, JitterBuffer, JitterBufferConfig, JitterBufferStats};
pub use playout::Playout;
pub use ring::RingBuffer;
