//! Error taxonomy for the Ember chain core.
//!
//! Three layers, per the validation design:
//!
//! - [`ConsensusError`] — recoverable block/transaction rejections. The
//!   `Display` string of each variant is a *stable* rejection identifier
//!   (callers and tests compare it exactly), and [`ConsensusError::code`]
//!   carries the numeric reject code.
//! - [`StoreError`] — key-value backend failures and corrupt persisted data.
//! - [`EmberError`] — the top-level error, including `Invariant` for
//!   programming-contract violations (missing parent on connect, deployment
//!   cache mismatches, reorganization rollback failures). Invariant faults
//!   are fatal, never consensus rejections.

use thiserror::Error;

/// Reject code for invalid blocks and transactions.
pub const REJECT_INVALID: u8 = 0x10;
/// Reject code for obsolete block versions.
pub const REJECT_OBSOLETE: u8 = 0x11;
/// Reject code for blocks already known to the index.
pub const REJECT_DUPLICATE: u8 = 0x12;

/// A consensus-rule rejection with a stable reason identifier.
///
/// The `Display` implementation yields the canonical reason string
/// (e.g. `bad-txns-inputs-missingorspent`); no other text is appended, so
/// callers may match on `err.to_string()`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("duplicate")] Duplicate,
    #[error("bad-prevblk")] UnknownParent,
    #[error("high-hash")] HighHash,
    #[error("bad-diffbits")] BadDiffBits,
    #[error("time-too-old")] TimeTooOld,
    #[error("time-too-new")] TimeTooNew,
    #[error("bad-version")] BadVersion,
    #[error("bad-blk-length")] BadBlockLength,
    #[error("bad-cb-missing")] MissingCoinbase,
    #[error("bad-cb-multiple")] MultipleCoinbase,
    #[error("bad-cb-amount")] BadCoinbaseAmount,
    #[error("bad-txnmrklroot")] BadMerkleRoot,
    #[error("bad-txns-inputs-missingorspent")] InputsMissingOrSpent,
    #[error("bad-txns-nonfinal")] NonFinal,
    #[error("bad-txns-premature-spend-of-coinbase")] PrematureCoinbaseSpend,
    #[error("bad-txns-in-belowout")] InputsBelowOutputs,
    #[error("bad-txns-inputvalues-outofrange")] InputValuesOutOfRange,
    #[error("mandatory-script-verify-flag-failed")] ScriptVerifyFailed,
}

impl ConsensusError {
    /// Numeric reject code accompanying the reason string.
    pub const fn code(&self) -> u8 {
        match self {
            Self::Duplicate => REJECT_DUPLICATE,
            Self::BadVersion => REJECT_OBSOLETE,
            _ => REJECT_INVALID,
        }
    }

    /// The stable reason identifier (same as `Display`).
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Key-value store failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend: {0}")] Backend(String),
    #[error("corrupt record: {0}")] Corrupt(String),
}

/// Top-level error for the Ember chain core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmberError {
    #[error(transparent)] Consensus(#[from] ConsensusError),
    #[error(transparent)] Store(#[from] StoreError),
    /// A programming-contract violation. Unreachable by consensus input
    /// alone; indicates corruption or a bug and must abort the operation.
    #[error("invariant violated: {0}")] Invariant(String),
}

impl EmberError {
    /// The consensus rejection inside this error, if it is one.
    pub fn as_consensus(&self) -> Option<ConsensusError> {
        match self {
            Self::Consensus(e) => Some(*e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_stable() {
        assert_eq!(
            ConsensusError::InputsMissingOrSpent.to_string(),
            "bad-txns-inputs-missingorspent"
        );
        assert_eq!(ConsensusError::NonFinal.to_string(), "bad-txns-nonfinal");
        assert_eq!(
            ConsensusError::ScriptVerifyFailed.to_string(),
            "mandatory-script-verify-flag-failed"
        );
        assert_eq!(ConsensusError::BadDiffBits.to_string(), "bad-diffbits");
    }

    #[test]
    fn reject_codes() {
        assert_eq!(ConsensusError::Duplicate.code(), REJECT_DUPLICATE);
        assert_eq!(ConsensusError::BadVersion.code(), REJECT_OBSOLETE);
        assert_eq!(ConsensusError::HighHash.code(), REJECT_INVALID);
        assert_eq!(ConsensusError::NonFinal.code(), REJECT_INVALID);
    }

    #[test]
    fn consensus_error_wraps_transparently() {
        let err: EmberError = ConsensusError::NonFinal.into();
        assert_eq!(err.to_string(), "bad-txns-nonfinal");
        assert_eq!(err.as_consensus(), Some(ConsensusError::NonFinal));
    }

    #[test]
    fn invariant_is_not_consensus() {
        let err = EmberError::Invariant("parent not indexed".into());
        assert!(err.as_consensus().is_none());
        assert!(err.to_string().contains("invariant violated"));
    }
}
