//! Protocol constants. All monetary values in sparks (1 EMBER = 10^8 sparks).
//!
//! Consensus parameters that vary per network (maturity, retarget window,
//! deployments) live in [`NetworkParams`](crate::params::NetworkParams);
//! only values that are fixed across every Ember network belong here.

pub const COIN: u64 = 100_000_000;

/// Lock-time values below this threshold are block heights; at or above it
/// they are Unix timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Number of ancestor timestamps used for the median-time-past calculation.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Sequence value that opts an input out of all lock-time semantics.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Sequence bit 31: when set, the sequence encodes no relative lock.
pub const SEQUENCE_DISABLE_FLAG: u32 = 1 << 31;

/// Sequence bit 22: when set, the relative lock is time-based rather than
/// height-based.
pub const SEQUENCE_TYPE_FLAG: u32 = 1 << 22;

/// Mask extracting the 16-bit relative lock value from a sequence.
pub const SEQUENCE_MASK: u32 = 0x0000_ffff;

/// Time-based relative locks are expressed in units of 2^9 = 512 seconds.
pub const SEQUENCE_GRANULARITY: u32 = 9;
