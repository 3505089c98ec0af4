//! Core types and pure consensus math for the Ember protocol.
//!
//! This crate is the leaf of the workspace: transaction/block/coin types,
//! the network-parameter struct, proof-of-work and retarget math, merkle
//! roots, locktime rules, and the error taxonomy. Everything stateful
//! (chain index, UTXO store, fork choice) lives in `ember-chain`.

pub mod constants;
pub mod error;
pub mod locks;
pub mod merkle;
pub mod params;
pub mod pow;
pub mod types;
