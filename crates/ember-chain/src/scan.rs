//! Main-chain rescan for rebuilding derived state (wallets, indexers).
//!
//! [`Scanner`] is a pull iterator over committed main-chain blocks from a
//! start height forward, in strictly increasing height order. The
//! consumer drives the pace (natural backpressure) and cancels by
//! dropping the scanner. Scanning only reads the database and never takes
//! the ingestion lock, so it cannot stall block processing.

use std::collections::HashSet;

use ember_core::error::EmberError;
use ember_core::types::{Block, OutPoint, Transaction};

use crate::db::ChainDb;
use crate::entry::ChainEntry;

/// Selection filter for a rescan.
///
/// A transaction matches if any of its outputs pays a watched script or
/// any of its inputs spends a watched outpoint. Outputs paying a watched
/// script are added to the watched outpoints as they are found, so their
/// later spends match too.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    scripts: HashSet<Vec<u8>>,
    outpoints: HashSet<OutPoint>,
}

impl ScanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch_script(mut self, script: Vec<u8>) -> Self {
        self.scripts.insert(script);
        self
    }

    pub fn watch_outpoint(mut self, outpoint: OutPoint) -> Self {
        self.outpoints.insert(outpoint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty() && self.outpoints.is_empty()
    }

    /// Whether `tx` is relevant, extending the outpoint watch set with its
    /// matching outputs.
    fn matches(&mut self, tx: &Transaction) -> Result<bool, EmberError> {
        let mut hit = tx
            .inputs
            .iter()
            .any(|input| self.outpoints.contains(&input.prevout));
        let txid = tx.txid()?;
        for (index, output) in tx.outputs.iter().enumerate() {
            if self.scripts.contains(&output.script) {
                hit = true;
                self.outpoints.insert(OutPoint {
                    txid,
                    index: index as u32,
                });
            }
        }
        Ok(hit)
    }
}

/// One scanned main-chain block and its matching transactions.
#[derive(Debug, Clone)]
pub struct ScanHit {
    pub entry: ChainEntry,
    pub block: Block,
    /// Matching transactions in block order. May be empty.
    pub matches: Vec<Transaction>,
}

/// Pull iterator over main-chain blocks from a start height.
pub struct Scanner<'a> {
    db: &'a ChainDb,
    filter: ScanFilter,
    next_height: u64,
}

impl<'a> Scanner<'a> {
    pub fn new(db: &'a ChainDb, start_height: u64, filter: ScanFilter) -> Self {
        Self {
            db,
            filter,
            next_height: start_height,
        }
    }

    /// The next main-chain block, or `None` past the current tip.
    ///
    /// Blocks connected after the scanner passes their height are not
    /// revisited; blocks connected ahead of the cursor are picked up.
    pub fn next_block(&mut self) -> Result<Option<ScanHit>, EmberError> {
        let entry = match self.db.get_entry_by_height(self.next_height)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let block = self
            .db
            .get_block(&entry.hash)?
            .ok_or_else(|| EmberError::Invariant(format!("block {} missing", entry.hash)))?;
        let mut matches = Vec::new();
        for tx in &block.transactions {
            if self.filter.matches(tx)? {
                matches.push(tx.clone());
            }
        }
        self.next_height += 1;
        Ok(Some(ScanHit {
            entry,
            block,
            matches,
        }))
    }
}
