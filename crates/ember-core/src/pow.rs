//! Proof-of-work target checks, chainwork accounting, and retargeting.
//!
//! Targets are plain `u64` values: a header satisfies proof-of-work when
//! the first 8 bytes of its hash, read as a little-endian `u64`, are less
//! than or equal to the target. A *higher* target is therefore *easier*.
//! Expected work per block is `2^64 / (target + 1)`, accumulated per chain
//! in a `u128` so the sum cannot overflow at any realistic chain length.

use crate::params::NetworkParams;
use crate::types::BlockHeader;

/// Hardest representable target.
pub const MIN_TARGET: u64 = 1;

/// Maximum per-retarget adjustment factor in either direction.
pub const MAX_ADJUSTMENT_FACTOR: u64 = 4;

/// Difficulty value of a header hash: its first 8 bytes as a
/// little-endian `u64`. Smaller means more work.
pub fn hash_value(header: &BlockHeader) -> u64 {
    let hash = header.hash();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

/// Whether a header meets its own claimed difficulty target.
///
/// The caller is responsible for checking that the claimed `bits` match
/// the target the chain context requires.
pub fn check_pow(header: &BlockHeader) -> bool {
    hash_value(header) <= header.bits
}

/// Expected number of hash attempts to find a block at `target`,
/// `2^64 / (target + 1)`, never less than 1.
pub fn block_work(target: u64) -> u128 {
    let work = (1u128 << 64) / (u128::from(target) + 1);
    work.max(1)
}

/// Compute the difficulty target for the block following a window of
/// recent blocks.
///
/// `timestamps` holds the timestamps of the last `retarget_window + 1`
/// main-chain blocks in ascending height order (one extra so the window
/// spans `retarget_window` intervals). With fewer than two timestamps the
/// current target is kept. The adjustment is proportional to the observed
/// timespan over the expected timespan, clamped to a factor of
/// [`MAX_ADJUSTMENT_FACTOR`] per retarget and to `[MIN_TARGET, pow_limit]`
/// overall.
pub fn next_target(timestamps: &[u64], current_target: u64, params: &NetworkParams) -> u64 {
    if timestamps.len() < 2 {
        return current_target;
    }

    let intervals = (timestamps.len() - 1) as u64;
    let expected = intervals * params.target_spacing;
    let first = timestamps[0];
    let last = timestamps[timestamps.len() - 1];
    // Clock skew between miners can produce an out-of-order window; treat
    // it as the minimum timespan rather than underflowing.
    let actual = last.saturating_sub(first).max(1);

    let min_span = expected / MAX_ADJUSTMENT_FACTOR;
    let max_span = expected * MAX_ADJUSTMENT_FACTOR;
    let clamped = actual.clamp(min_span.max(1), max_span);

    // target scales with the observed timespan: slow blocks raise the
    // target (easier), fast blocks lower it (harder).
    let next = (u128::from(current_target) * u128::from(clamped)) / u128::from(expected);
    let next = u64::try_from(next).unwrap_or(params.pow_limit);
    next.clamp(MIN_TARGET, params.pow_limit)
}
