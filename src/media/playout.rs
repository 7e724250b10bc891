/// Playout
/// Moves one packet per audio tick from the jitter buffer into the ring buffer
///
/// Runs on the network/decoding side. Each tick pulls exactly one payload; a
/// missing one (playout-delay placeholder, lost packet, not started yet) is
/// replaced with a frame of `T::default()` so the ring buffer keeps being fed
/// at the audio clock rate.

use std::sync::Arc;
use tracing::trace;

use super::jitter::JitterBuffer;
use super::ring::RingBuffer;
use crate::error::RingBufferError;

pub struct Playout<T> {
    jitter: Arc<JitterBuffer<Vec<T>>>,
    ring: Arc<RingBuffer<T>>,
    silence: Vec<T>,
    frame_records: usize,
    frames_played: u64,
    frames_concealed: u64,
}

impl<T: Copy + Default> Playout<T> {
    /// `frame_records` is the number of records one packet decodes to
    pub fn new(
        jitter: Arc<JitterBuffer<Vec<T>>>,
        ring: Arc<RingBuffer<T>>,
        frame_records: usize,
    ) -> Self {
        let silence = vec![T::default(); frame_records * ring.channels()];
        Self {
            jitter,
            ring,
            silence,
            frame_records,
            frames_played: 0,
            frames_concealed: 0,
        }
    }

    /// Advance one frame.
    ///
    /// Returns `Ok(true)` if a real payload was written and `Ok(false)` if
    /// silence was. If the ring buffer has no room for a frame the tick fails
    /// with `BufferOverrun` before pulling, so the jitter buffer is untouched.
    pub fn tick(&mut self) -> Result<bool, RingBufferError> {
        let free = self.ring.free();
        if free < self.frame_records {
            return Err(RingBufferError::BufferOverrun {
                requested: self.frame_records,
                free,
            });
        }

        match self.jitter.get() {
            Some(frame) => {
                self.ring.put(&frame)?;
                self.frames_played += 1;
                Ok(true)
            }
            None => {
                trace!("Concealing missing frame with silence");
                self.ring.put(&self.silence)?;
                self.frames_concealed += 1;
                Ok(false)
            }
        }
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn frames_concealed(&self) -> u64 {
        self.frames_concealed
    }

    pub fn jitter_buffer(&self) -> &Arc<JitterBuffer<Vec<T>>> {
        &self.jitter
    }

    pub fn ring_buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring
    }
}
