/// Automatic Gain Control
/// Scales interleaved f32 blocks toward a target peak level
///
/// The gain adapts once per block from the block's scaled peak, and the
/// change is spread across the block as a linear ramp so there is no step
/// at block boundaries. A peak above the clipping threshold halves the gain
/// straight away instead of adapting slowly.

use tracing::{debug, trace};

/// Default ceiling for the gain
pub const DEFAULT_MAX_GAIN: f32 = 30.0;

/// Adaptation rate per block
const MU: f32 = 0.1;

/// Target peak amplitude after gain
const TARGET_PEAK: f32 = 0.5;

/// Scaled peak above which the gain is halved immediately
const LOUD_THRESHOLD: f32 = 0.95;

#[derive(Debug, Clone)]
pub struct AutomaticGainControl {
    gain: f32,
    mu: f32,
    target: f32,
    max_gain: f32,
    channels: usize,
}

impl AutomaticGainControl {
    /// # Panics
    ///
    /// Panics if `channels` is zero.
    pub fn new(channels: usize) -> Self {
        Self::with_max_gain(channels, DEFAULT_MAX_GAIN)
    }

    pub fn with_max_gain(channels: usize, max_gain: f32) -> Self {
        assert!(channels > 0, "AGC needs at least one channel");

        Self {
            gain: 1.0,
            mu: MU,
            target: TARGET_PEAK,
            max_gain,
            channels,
        }
    }

    /// Current gain; the next block's ramp starts from here
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn max_gain(&self) -> f32 {
        self.max_gain
    }

    /// Apply gain to an interleaved block in place.
    ///
    /// Frame `i` of `n` is scaled by `old + (new - old) * i / (n - 1)`, where
    /// `old` is the gain before this block and `new` the adapted gain. A block
    /// with a trailing partial frame treats it as one more frame.
    pub fn apply(&mut self, block: &mut [f32]) {
        if block.is_empty() {
            return;
        }

        let old_gain = self.gain;
        let peak = block
            .iter()
            .fold(0.0f32, |peak, &sample| peak.max((sample * old_gain).abs()));

        if peak > LOUD_THRESHOLD {
            self.gain /= 2.0;
            debug!("AGC: loud input (peak {:.3}), gain cut to {:.3}", peak, self.gain);
        } else {
            self.gain += self.mu * (self.target - peak);
            if self.gain.is_nan() {
                self.gain = 1.0;
            }
            // Cap first, then floor; `min` ignores a NaN ceiling
            self.gain = self.gain.min(self.max_gain).max(0.0);
        }
        trace!("AGC: peak {:.3}, gain {:.3} -> {:.3}", peak, old_gain, self.gain);

        let frames = block.len().div_ceil(self.channels);
        let step = if frames > 1 {
            (self.gain - old_gain) / (frames - 1) as f32
        } else {
            0.0
        };

        for (i, frame) in block.chunks_mut(self.channels).enumerate() {
            let gain = old_gain + step * i as f32;
            for sample in frame {
                *sample *= gain;
            }
        }
    }
}
