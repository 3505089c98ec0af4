//! Block index entries.
//!
//! A [`ChainEntry`] is the index record for one block header: enough to
//! validate successors and to compare branches, without loading the block
//! body. Entries are append-only; once stored they are never rewritten.

use serde::{Deserialize, Serialize};

use ember_core::pow;
use ember_core::types::{BlockHeader, Hash256};

/// Index record for a single block header.
#[derive(
    Serialize, Deserialize, bincode::Encode, bincode::Decode, Debug, Clone, PartialEq, Eq,
)]
pub struct ChainEntry {
    /// Hash of this block's header.
    pub hash: Hash256,
    /// Hash of the parent header. Zero for genesis only.
    pub prev: Hash256,
    /// Height above genesis (genesis is 0).
    pub height: u64,
    /// Header version, carrying deployment signaling bits.
    pub version: u32,
    /// Header timestamp in Unix seconds.
    pub time: u64,
    /// Difficulty target claimed by the header.
    pub bits: u64,
    /// Header nonce.
    pub nonce: u64,
    /// Cumulative expected work of this block and all ancestors.
    pub chainwork: u128,
}

impl ChainEntry {
    /// Build the entry for `header` extending `parent`.
    pub fn from_header(header: &BlockHeader, parent: &ChainEntry) -> Self {
        Self {
            hash: header.hash(),
            prev: header.prev_hash,
            height: parent.height + 1,
            version: header.version,
            time: header.timestamp,
            bits: header.bits,
            nonce: header.nonce,
            chainwork: parent.chainwork + pow::block_work(header.bits),
        }
    }

    /// Build the genesis entry (height 0, work of its own target only).
    pub fn genesis(header: &BlockHeader) -> Self {
        Self {
            hash: header.hash(),
            prev: Hash256::ZERO,
            height: 0,
            version: header.version,
            time: header.timestamp,
            bits: header.bits,
            nonce: header.nonce,
            chainwork: pow::block_work(header.bits),
        }
    }

    /// Whether this entry is the genesis entry.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}
