/// Jitter Buffer
/// Turns out-of-order, lossy arrival of sequence-numbered payloads into an
/// in-order pull stream with a fixed playout delay.
///
/// The buffer starts with `target_depth` empty slots, so the consumer sees that
/// many `None`s before the first real payload. Packets ahead of the expected
/// sequence number wait in a side map until the gap closes; packets behind it
/// are dropped. A pull from an empty queue gives up on the overdue number, and
/// too many of those in a row resets the buffer so it can re-sync to whatever
/// arrives next.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace, warn};

use crate::error::JitterError;

/// Default sequence number modulus (16-bit counters)
pub const DEFAULT_ROLLOVER: u32 = 1 << 16;

/// Configuration for the jitter buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterBufferConfig {
    /// Initial playout delay in packets (default: 3)
    pub target_depth: usize,
    /// Value at which sequence numbers wrap back to zero
    pub rollover: u32,
    /// Consecutive empty pulls before the buffer resets itself
    pub max_missed_run: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            target_depth: 3,
            rollover: DEFAULT_ROLLOVER,
            max_missed_run: 3,
        }
    }
}

impl JitterBufferConfig {
    pub fn with_depth(target_depth: usize) -> Self {
        Self {
            target_depth,
            ..Self::default()
        }
    }
}

/// Signed wrap-aware distance from `current` to `new`.
///
/// Positive means `new` is ahead of `current`. Candidates are checked in the
/// order unshifted, `new` shifted, both shifted, `current` shifted; a candidate
/// only wins with a strictly smaller magnitude, so an exact half-rollover tie
/// keeps the unshifted difference.
pub fn seq_distance(new: u32, current: u32, rollover: u32) -> i64 {
    let r = rollover as i64;
    let (n, c) = (new as i64, current as i64);

    [(n + r) - c, (n + r) - (c + r), n - (c + r)]
        .into_iter()
        .fold(n - c, |best, candidate| {
            if candidate.abs() < best.abs() {
                candidate
            } else {
                best
            }
        })
}

/// Statistics about jitter buffer operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JitterBufferStats {
    pub packets_put: u64,
    /// Every call to `get`, including those before the first packet
    pub packets_got: u64,
    pub packets_missed: u64,
    /// Packets dropped for arriving behind the expected sequence number
    pub packets_late: u64,
    pub resets: u64,
    pub max_depth: usize,
    pub total_depth_at_get: u64,
}

impl JitterBufferStats {
    /// Mean buffer length observed at `get`, if there has been one
    pub fn average_depth(&self) -> Option<f64> {
        if self.packets_got == 0 {
            None
        } else {
            Some(self.total_depth_at_get as f64 / self.packets_got as f64)
        }
    }
}

#[derive(Debug)]
struct State<P> {
    /// Next sequence number due; `None` until the first `put`
    expected_seq_no: Option<u32>,
    /// Front is delivered next; `None` entries are playout-delay placeholders
    ordered: VecDeque<Option<P>>,
    /// Early arrivals keyed by sequence number
    pending: BTreeMap<u32, P>,
    missed_run: u32,
    stats: JitterBufferStats,
}

impl<P> State<P> {
    fn new(target_depth: usize) -> Self {
        let mut state = Self {
            expected_seq_no: None,
            ordered: VecDeque::with_capacity(target_depth),
            pending: BTreeMap::new(),
            missed_run: 0,
            stats: JitterBufferStats::default(),
        };
        state.reset(target_depth);
        state
    }

    fn len(&self) -> usize {
        self.ordered.len() + self.pending.len()
    }

    fn reset(&mut self, target_depth: usize) {
        self.expected_seq_no = None;
        self.ordered.clear();
        self.ordered.extend((0..target_depth).map(|_| None));
        self.pending.clear();
        self.missed_run = 0;
    }

    fn advance(&mut self, rollover: u32) {
        if let Some(expected) = self.expected_seq_no {
            self.expected_seq_no = Some(((expected as u64 + 1) % rollover as u64) as u32);
        }
    }

    /// Move any contiguous run starting at the expected number out of `pending`
    fn drain_pending(&mut self, rollover: u32) {
        while let Some(expected) = self.expected_seq_no {
            let Some(payload) = self.pending.remove(&expected) else {
                break;
            };
            self.ordered.push_back(Some(payload));
            self.advance(rollover);
        }
    }
}

/// Thread-safe jitter buffer, generic over the payload type.
///
/// Every public method holds the internal lock for the whole operation, so a
/// network thread calling `put` and an audio thread calling `get` can share one
/// instance through an `Arc`.
#[derive(Debug)]
pub struct JitterBuffer<P> {
    config: JitterBufferConfig,
    state: Mutex<State<P>>,
}

impl<P> JitterBuffer<P> {
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::new(config.target_depth)),
        }
    }

    pub fn config(&self) -> &JitterBufferConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, State<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a payload.
    ///
    /// Late packets (behind the expected sequence number) are dropped without
    /// error; only a sequence number outside `[0, rollover)` is rejected.
    pub fn put(&self, seq_no: u32, payload: P) -> Result<(), JitterError> {
        let rollover = self.config.rollover;
        if seq_no >= rollover {
            return Err(JitterError::SequenceOutOfRange { seq_no, rollover });
        }

        let mut state = self.lock();
        state.stats.packets_put += 1;

        let expected = *state.expected_seq_no.get_or_insert_with(|| {
            debug!("Jitter buffer initialized with first sequence: {}", seq_no);
            seq_no
        });

        if seq_no == expected {
            state.ordered.push_back(Some(payload));
            state.advance(rollover);
            state.drain_pending(rollover);
        } else if seq_distance(seq_no, expected, rollover) >= 0 {
            trace!("Holding early packet: seq={} (expected {})", seq_no, expected);
            state.pending.insert(seq_no, payload);
        } else {
            trace!("Dropping late packet: seq={} (expected {})", seq_no, expected);
            state.stats.packets_late += 1;
        }

        let depth = state.len();
        if depth > state.stats.max_depth {
            state.stats.max_depth = depth;
        }
        Ok(())
    }

    /// Pull the next payload in sequence order.
    ///
    /// Returns `None` for a playout-delay placeholder, for a missing packet,
    /// and before the first `put`. Never blocks.
    pub fn get(&self) -> Option<P> {
        let mut state = self.lock();
        let depth = state.len() as u64;
        state.stats.packets_got += 1;
        state.stats.total_depth_at_get += depth;

        // Nothing to give up on until the stream has started
        let expected = state.expected_seq_no?;

        if state.ordered.is_empty() {
            state.missed_run += 1;
            state.stats.packets_missed += 1;
            debug!(
                "Giving up on expected sequence {} ({} packets missed in total)",
                expected, state.stats.packets_missed
            );

            let rollover = self.config.rollover;
            state.advance(rollover);
            state.drain_pending(rollover);

            if state.missed_run >= self.config.max_missed_run {
                warn!(
                    "{} consecutive packets missed, resetting jitter buffer",
                    state.missed_run
                );
                state.reset(self.config.target_depth);
                state.stats.resets += 1;
            }
            return None;
        }

        state.missed_run = 0;
        state.ordered.pop_front().flatten()
    }

    /// Queued slots (placeholders included) plus early arrivals
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next sequence number due, or `None` before the first packet / after a reset
    pub fn expected_seq_no(&self) -> Option<u32> {
        self.lock().expected_seq_no
    }

    pub fn stats(&self) -> JitterBufferStats {
        self.lock().stats.clone()
    }
}

impl<P> Default for JitterBuffer<P> {
    fn default() -> Self {
        Self::new(JitterBufferConfig::default())
    }
}

impl<P> Drop for JitterBuffer<P> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let stats = &state.stats;
        debug!(
            "Jitter buffer stats: put={} got={} missed={} late={} resets={} max_depth={} avg_depth={:.1}",
            stats.packets_put,
            stats.packets_got,
            stats.packets_missed,
            stats.packets_late,
            stats.resets,
            stats.max_depth,
            stats.average_depth().unwrap_or(0.0)
        );
    }
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn distance_bounded_by_half_rollover() {
        let rollover: u32 = kani::any();
        let a: u32 = kani::any();
        let b: u32 = kani::any();
        kani::assume(rollover >= 2 && rollover <= DEFAULT_ROLLOVER);
        kani::assume(a < rollover && b < rollover);

        let d = seq_distance(a, b, rollover);
        kani::assert(d.abs() <= rollover as i64 / 2, "distance takes the short way");
        kani::assert(d == -seq_distance(b, a, rollover), "distance is antisymmetric");
    }
}
