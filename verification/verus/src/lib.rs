//! Verus Formal Verification for singt-transport
//!
//! Specifications and proofs for the index arithmetic of the ring buffer and
//! the wrap-aware sequence distance of the jitter buffer.
//! To verify, install Verus and run: verus verification/verus/src/lib.rs
//!
//! Verus installation: https://github.com/verus-lang/verus

use vstd::prelude::*;

verus! {

// ============================================================================
// RING BUFFER: len() is always below the slot count, puts never overfill
// ============================================================================

/// Specification: buffered records for a given pair of indices
#[spec]
pub fn ring_used(producer: nat, consumer: nat, slots: nat) -> nat
    recommends
        slots > 0,
{
    ((producer + slots - consumer) as nat) % slots
}

/// Proof: the buffered count never reaches the slot count
#[proof]
pub fn lemma_used_below_slots(producer: nat, consumer: nat, slots: nat)
    requires
        slots > 0,
        producer < slots,
        consumer < slots,
    ensures
        ring_used(producer, consumer, slots) < slots,
{
    assert(((producer + slots - consumer) as nat) % slots < slots) by (nonlinear_arith)
        requires slots > 0;
}

/// Proof: equal indices mean empty, so "full" needs the sentinel slot
#[proof]
pub fn lemma_equal_indices_empty(index: nat, slots: nat)
    requires
        slots > 0,
        index < slots,
    ensures
        ring_used(index, index, slots) == 0,
{
    assert((slots as nat) % slots == 0) by (nonlinear_arith)
        requires slots > 0;
}

/// Executable used-count with verified contract
#[exec]
pub fn used_verified(producer: usize, consumer: usize, slots: usize) -> (result: usize)
    requires
        slots > 0,
        producer < slots,
        consumer < slots,
        slots <= usize::MAX / 2,
    ensures
        result < slots,
        result == ring_used(producer as nat, consumer as nat, slots as nat),
{
    (producer + slots - consumer) % slots
}

/// Executable index advance: stays in range
#[exec]
pub fn advance_verified(index: usize, count: usize, slots: usize) -> (result: usize)
    requires
        slots > 0,
        index < slots,
        count < slots,
        slots <= usize::MAX / 2,
    ensures
        result < slots,
{
    (index + count) % slots
}

// ============================================================================
// SEQUENCE DISTANCE: short way round, exact half keeps the unshifted value
// ============================================================================

#[spec]
pub fn abs(x: int) -> int {
    if x < 0 { -x } else { x }
}

/// Specification: unshifted difference, replaced only by a strictly shorter candidate
#[spec]
pub fn seq_distance(new: int, current: int, rollover: int) -> int {
    let d0 = new - current;
    let d1 = if abs((new + rollover) - current) < abs(d0) { (new + rollover) - current } else { d0 };
    let d2 = if abs(new - current) < abs(d1) { new - current } else { d1 };
    if abs(new - (current + rollover)) < abs(d2) { new - (current + rollover) } else { d2 }
}

/// Proof: the distance is congruent to new - current and at most half the rollover
#[proof]
pub fn lemma_distance_short_way(new: int, current: int, rollover: int)
    requires
        rollover >= 2,
        0 <= new < rollover,
        0 <= current < rollover,
    ensures
        2 * abs(seq_distance(new, current, rollover)) <= rollover,
        seq_distance(new, current, rollover) == new - current
            || seq_distance(new, current, rollover) == new - current + rollover
            || seq_distance(new, current, rollover) == new - current - rollover,
{
}

/// Proof: an exact half-rollover difference keeps its sign
#[proof]
pub fn lemma_half_rollover_tie(current: int, half: int)
    requires
        half >= 1,
        0 <= current < half,
    ensures
        seq_distance(current + half, current, 2 * half) == half,
        seq_distance(current, current + half, 2 * half) == -half,
{
}

/// Proof: 65535 -> 0 is one step forward with 16-bit rollover
#[proof]
pub fn lemma_wraparound_boundary()
    ensures
        seq_distance(0, 65535, 65536) == 1,
        seq_distance(65535, 0, 65536) == -1,
{
}

} // verus!
