use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

use crate::media::agc::DEFAULT_MAX_GAIN;
use crate::media::JitterBufferConfig;
use crate::net::udp::{DEFAULT_UDP_ROLLOVER, MAX_UDP_ROLLOVER};

#[derive(Debug, Clone)]
pub struct StreamConfig {
    // Jitter buffer
    pub jitter_target_depth: usize,
    pub jitter_max_missed: u32,

    // Sequence numbers wrap here on the wire and in the jitter buffer.
    // Both ends of the receive path must agree, so there is only one setting.
    pub seq_rollover: u32,

    // Audio shape: records per packet, interleaved channels per record
    pub frame_len: usize,
    pub ring_channels: usize,
    // Ring buffer size in packets' worth of records
    pub ring_capacity_frames: usize,

    pub agc_max_gain: f32,

    // Local address the packet receiver binds
    pub receive_addr: SocketAddr,
}

impl StreamConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(StreamConfig {
            jitter_target_depth: get("JITTER_TARGET_DEPTH")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("JITTER_TARGET_DEPTH must be a non-negative integer")?,
            jitter_max_missed: get("JITTER_MAX_MISSED")
                .unwrap_or_else(|| "3".to_string())
                .parse()
                .context("JITTER_MAX_MISSED must be a non-negative integer")?,

            seq_rollover: get("SEQ_ROLLOVER")
                .unwrap_or_else(|| DEFAULT_UDP_ROLLOVER.to_string())
                .parse()
                .context("SEQ_ROLLOVER must be a non-negative integer")?,

            frame_len: get("FRAME_LEN")
                .unwrap_or_else(|| "960".to_string())
                .parse()
                .context("FRAME_LEN must be a non-negative integer")?,
            ring_channels: get("RING_CHANNELS")
                .unwrap_or_else(|| "1".to_string())
                .parse()
                .context("RING_CHANNELS must be a non-negative integer")?,
            ring_capacity_frames: get("RING_CAPACITY_FRAMES")
                .unwrap_or_else(|| "8".to_string())
                .parse()
                .context("RING_CAPACITY_FRAMES must be a non-negative integer")?,

            agc_max_gain: get("AGC_MAX_GAIN")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_GAIN),

            receive_addr: get("RECEIVE_ADDR")
                .context("RECEIVE_ADDR not set")?
                .parse()
                .context("RECEIVE_ADDR must be an address like 0.0.0.0:5004")?,
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.jitter_max_missed == 0 {
            errors.push("JITTER_MAX_MISSED must be greater than 0.".to_string());
        }

        if !Self::is_valid_rollover(self.seq_rollover) {
            errors.push(format!(
                "SEQ_ROLLOVER={} invalid. Expected 2..={} to fit the 16-bit sequence field.",
                self.seq_rollover, MAX_UDP_ROLLOVER
            ));
        } else if self.jitter_target_depth as u64 >= u64::from(self.seq_rollover / 2) {
            errors.push(format!(
                "JITTER_TARGET_DEPTH={} must be below half of SEQ_ROLLOVER ({}).",
                self.jitter_target_depth, self.seq_rollover
            ));
        }

        if self.frame_len == 0 {
            errors.push("FRAME_LEN must be greater than 0.".to_string());
        }
        if self.ring_channels == 0 {
            errors.push("RING_CHANNELS must be greater than 0.".to_string());
        }
        if self.ring_capacity_frames == 0 {
            errors.push("RING_CAPACITY_FRAMES must be greater than 0.".to_string());
        }

        if !self.agc_max_gain.is_finite() || self.agc_max_gain <= 0.0 {
            errors.push(format!(
                "AGC_MAX_GAIN={} must be a positive number.",
                self.agc_max_gain
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }

    /// Rollover must leave room for ahead/behind and fit in a u16 on the wire
    fn is_valid_rollover(rollover: u32) -> bool {
        (2..=MAX_UDP_ROLLOVER).contains(&rollover)
    }

    pub fn jitter_config(&self) -> JitterBufferConfig {
        JitterBufferConfig {
            target_depth: self.jitter_target_depth,
            rollover: self.seq_rollover,
            max_missed_run: self.jitter_max_missed,
        }
    }

    /// Ring buffer capacity in records
    pub fn ring_capacity(&self) -> usize {
        self.ring_capacity_frames * self.frame_len
    }

    /// Interleaved samples in one packet
    pub fn frame_samples(&self) -> usize {
        self.frame_len * self.ring_channels
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// Proves: every sequence number under a valid rollover fits the wire field
    #[kani::proof]
    fn valid_rollover_fits_u16() {
        let rollover: u32 = kani::any();
        let seq: u32 = kani::any();
        kani::assume(StreamConfig::is_valid_rollover(rollover));
        kani::assume(seq < rollover);
        kani::assert(u16::try_from(seq).is_ok(), "sequence must fit in 16 bits");
    }

    /// Proves: a valid rollover always has a non-empty "ahead" half
    #[kani::proof]
    fn valid_rollover_has_two_halves() {
        let rollover: u32 = kani::any();
        kani::assume(StreamConfig::is_valid_rollover(rollover));
        kani::assert(rollover / 2 >= 1, "half rollover must be positive");
    }
}
