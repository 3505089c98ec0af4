//! Absolute and relative lock-time rules.
//!
//! Absolute finality follows the classic lock-time semantics: a lock-time
//! below [`LOCKTIME_THRESHOLD`](crate::constants::LOCKTIME_THRESHOLD) is a
//! block height, otherwise a Unix timestamp, and a transaction whose lock
//! has not yet passed is only final if every input carries the final
//! sequence.
//!
//! Relative locks are encoded in input sequence numbers: bit 31 disables
//! the lock, bit 22 selects time-based (512-second units) over
//! height-based, and the low 16 bits carry the value. They apply only to
//! version >= 2 transactions, and only once the `csv` deployment is active
//! — that gating is the orchestrator's job; the functions here are pure
//! decoders and predicates.

use crate::constants::{
    LOCKTIME_THRESHOLD, SEQUENCE_DISABLE_FLAG, SEQUENCE_FINAL, SEQUENCE_GRANULARITY,
    SEQUENCE_MASK, SEQUENCE_TYPE_FLAG,
};
use crate::types::Transaction;

/// A decoded relative lock from an input sequence number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelativeLock {
    /// Minimum number of blocks between the coin's creation and its spend.
    Height(u64),
    /// Minimum number of seconds between the coin's block median time and
    /// the spending block's median time.
    Time(u64),
}

/// Decode the relative lock encoded in `sequence`, if any.
///
/// Returns `None` when bit 31 (the disable flag) is set.
pub fn relative_lock(sequence: u32) -> Option<RelativeLock> {
    if sequence & SEQUENCE_DISABLE_FLAG != 0 {
        return None;
    }
    let value = u64::from(sequence & SEQUENCE_MASK);
    if sequence & SEQUENCE_TYPE_FLAG != 0 {
        Some(RelativeLock::Time(value << SEQUENCE_GRANULARITY))
    } else {
        Some(RelativeLock::Height(value))
    }
}

/// Whether a transaction's absolute lock-time permits inclusion in a block
/// at `height` whose parent has median-time-past `median_time`.
pub fn is_final(tx: &Transaction, height: u64, median_time: u64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let limit = if tx.lock_time < LOCKTIME_THRESHOLD {
        height
    } else {
        median_time
    };
    if u64::from(tx.lock_time) < limit {
        return true;
    }
    // A not-yet-passed lock-time can still be overridden when every input
    // opted out via the final sequence.
    tx.inputs.iter().all(|input| input.sequence == SEQUENCE_FINAL)
}
