//! Integration and scenario test suite for the Ember chain core.
//!
//! The tests exercise the public `Chain` surface end to end: fork choice
//! across competing branches, atomic reorganization with rollback,
//! coinbase maturity, soft-fork deployment activation, relative
//! locktimes, and wallet rescans. After every mutation the aggregate
//! counters are compared against a full UTXO recomputation.

pub mod helpers;
