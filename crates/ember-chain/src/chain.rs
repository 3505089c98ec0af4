//! Block ingestion, contextual validation, fork choice, and
//! reorganization.
//!
//! [`Chain::add`] is the single entry point for candidate blocks from any
//! source. Ingestion is serialized by an internal async mutex: validation
//! and the resulting commit always observe a stable view of the tips and
//! the UTXO set. Events are broadcast for every committed connect and
//! disconnect, plus one `Reorganized` per completed chain switch.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use ember_core::error::{ConsensusError, EmberError};
use ember_core::locks::{self, RelativeLock};
use ember_core::params::{Deployment, DEPLOYMENT_CSV};
use ember_core::pow;
use ember_core::types::{Block, Coin, Transaction};

use crate::coinview::CoinView;
use crate::db::{ChainDb, ChainState};
use crate::deployments::ThresholdState;
use crate::entry::ChainEntry;

/// Script verification flags passed to the external interpreter.
pub mod script_flags {
    pub const NONE: u32 = 0;
    /// Relative-locktime deployment is active.
    pub const CHECKSEQUENCEVERIFY: u32 = 1 << 0;
}

/// External script interpreter interface.
///
/// Invoked once per non-coinbase input with the spending transaction, the
/// input index, and the coin being spent. A failure maps to the
/// `mandatory-script-verify-flag-failed` rejection.
pub trait ScriptVerifier: Send + Sync {
    fn verify(
        &self,
        tx: &Transaction,
        input_index: usize,
        coin: &Coin,
        flags: u32,
    ) -> Result<(), ConsensusError>;
}

/// Verifier that accepts every script. For tests and header-only sync.
pub struct NullVerifier;

impl ScriptVerifier for NullVerifier {
    fn verify(&self, _: &Transaction, _: usize, _: &Coin, _: u32) -> Result<(), ConsensusError> {
        Ok(())
    }
}

/// A committed chain mutation, broadcast to subscribers in commit order.
#[derive(Clone, Debug)]
pub enum ChainEvent {
    /// A block joined the main chain.
    Connected {
        entry: ChainEntry,
        block: Arc<Block>,
    },
    /// A block left the main chain.
    Disconnected {
        entry: ChainEntry,
        block: Arc<Block>,
    },
    /// The main chain switched to a competing branch. Emitted once per
    /// reorganization, after all connects.
    Reorganized {
        old_tip: ChainEntry,
        new_tip: ChainEntry,
    },
}

type Clock = Box<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The chain orchestrator.
pub struct Chain {
    db: ChainDb,
    verifier: Arc<dyn ScriptVerifier>,
    clock: Clock,
    events: broadcast::Sender<ChainEvent>,
    /// Serializes ingestion: at most one `add` mutates at a time.
    write_lock: Mutex<()>,
}

impl Chain {
    pub fn new(db: ChainDb, verifier: Arc<dyn ScriptVerifier>) -> Self {
        Self::with_clock(db, verifier, Box::new(system_clock))
    }

    /// Construct with an injected clock. Tests use this to control the
    /// future-timestamp bound.
    pub fn with_clock(db: ChainDb, verifier: Arc<dyn ScriptVerifier>, clock: Clock) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            db,
            verifier,
            clock,
            events,
            write_lock: Mutex::new(()),
        }
    }

    /// The underlying database, for the read-only query surface.
    pub fn db(&self) -> &ChainDb {
        &self.db
    }

    /// Subscribe to committed chain events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    /// Current main-chain tip entry.
    pub fn tip(&self) -> Result<ChainEntry, EmberError> {
        self.db.tip()
    }

    /// Aggregate chain state.
    pub fn state(&self) -> Result<ChainState, EmberError> {
        self.db.state()
    }

    /// Threshold state of `deployment` for a block extending `entry`.
    pub fn get_state(
        &self,
        entry: &ChainEntry,
        deployment: &Deployment,
    ) -> Result<ThresholdState, EmberError> {
        self.db.get_state(entry, deployment)
    }

    /// Validate and ingest one candidate block.
    ///
    /// On success the block is indexed; it joined the main chain if it
    /// extended the best tip or its branch overtook the best tip's
    /// chainwork. A valid block on a lighter branch is stored as a side
    /// branch and is not an error. Rejections carry a stable reason
    /// string via [`ConsensusError`].
    pub async fn add(&self, block: Block) -> Result<ChainEntry, EmberError> {
        let _guard = self.write_lock.lock().await;

        let hash = block.header.hash();
        if self.db.get_entry(&hash)?.is_some() {
            return Err(ConsensusError::Duplicate.into());
        }
        let parent = self
            .db
            .get_entry(&block.header.prev_hash)?
            .ok_or(ConsensusError::UnknownParent)?;

        self.check_header_context(&parent, &block)?;
        self.check_structure(&block)?;

        let entry = ChainEntry::from_header(&block.header, &parent);
        let tip = self.db.tip()?;
        if entry.prev == tip.hash {
            // Full validation runs before anything is persisted: a rejected
            // block must leave the index and the tip set untouched, and a
            // resubmission must report the same reason, not `duplicate`.
            let block = Arc::new(block);
            let view = self.build_view(&entry, &block)?;
            self.db.save_block(&entry, &block)?;
            self.commit_connect(&entry, &block, view)?;
            debug!(hash = %entry.hash, height = entry.height, "extended main chain");
        } else if entry.chainwork > tip.chainwork {
            // The candidate must be in the store before the branch walk,
            // so a failed switch unwinds it afterwards.
            let parent_was_tip = self.db.is_tip(&entry.prev)?;
            self.db.save_block(&entry, &block)?;
            if let Err(err) = self.reorganize(&tip, &entry) {
                self.db.remove_block(&entry, parent_was_tip)?;
                return Err(err);
            }
        } else {
            self.db.save_block(&entry, &block)?;
            debug!(
                hash = %entry.hash,
                height = entry.height,
                "stored side-branch block"
            );
        }
        Ok(entry)
    }

    // --- Header context ---

    fn check_header_context(&self, parent: &ChainEntry, block: &Block) -> Result<(), EmberError> {
        let header = &block.header;
        if !pow::check_pow(header) {
            return Err(ConsensusError::HighHash.into());
        }
        let required = self.db.next_target(parent)?;
        if header.bits != required {
            return Err(ConsensusError::BadDiffBits.into());
        }
        if header.timestamp <= self.db.median_time_past(parent)? {
            return Err(ConsensusError::TimeTooOld.into());
        }
        let now = (self.clock)();
        if header.timestamp > now + self.db.params().max_future_drift {
            return Err(ConsensusError::TimeTooNew.into());
        }
        // Once a deployment is locked in or active, blocks must carry its
        // signaling bit.
        for deployment in &self.db.params().deployments {
            let state = self.db.get_state(parent, deployment)?;
            if matches!(state, ThresholdState::LockedIn | ThresholdState::Active)
                && !deployment.signals(header.version)
            {
                return Err(ConsensusError::BadVersion.into());
            }
        }
        Ok(())
    }

    fn check_structure(&self, block: &Block) -> Result<(), EmberError> {
        if block.transactions.is_empty() {
            return Err(ConsensusError::BadBlockLength.into());
        }
        if !block.transactions[0].is_coinbase() {
            return Err(ConsensusError::MissingCoinbase.into());
        }
        if block.transactions[1..].iter().any(|tx| tx.is_coinbase()) {
            return Err(ConsensusError::MultipleCoinbase.into());
        }
        let txids = block.txids()?;
        if ember_core::merkle::merkle_root(&txids) != block.header.merkle_root {
            return Err(ConsensusError::BadMerkleRoot.into());
        }
        Ok(())
    }

    // --- Full validation and connection ---

    /// Validate a block's transactions against the committed UTXO set and
    /// connect it. The parent must be the current tip.
    fn connect_block(&self, entry: &ChainEntry, block: &Arc<Block>) -> Result<(), EmberError> {
        let view = self.build_view(entry, block)?;
        self.commit_connect(entry, block, view)
    }

    fn commit_connect(
        &self,
        entry: &ChainEntry,
        block: &Arc<Block>,
        view: CoinView,
    ) -> Result<(), EmberError> {
        self.db.connect(entry, block, view)?;
        let _ = self.events.send(ChainEvent::Connected {
            entry: entry.clone(),
            block: Arc::clone(block),
        });
        Ok(())
    }

    /// Validate a block's transactions against the committed UTXO set,
    /// producing the coin view to commit. Touches no chain state; spend
    /// lookups are correct only while the parent is the current tip.
    fn build_view(&self, entry: &ChainEntry, block: &Arc<Block>) -> Result<CoinView, EmberError> {
        let parent = if entry.is_genesis() {
            None
        } else {
            Some(self.db.get_entry(&entry.prev)?.ok_or_else(|| {
                EmberError::Invariant(format!("parent {} not indexed on connect", entry.prev))
            })?)
        };

        let mut view = CoinView::new();
        let mut fees: u64 = 0;
        let (csv_active, mtp) = match &parent {
            Some(parent) => {
                let csv = match self.db.params().deployment(DEPLOYMENT_CSV) {
                    Some(dep) => self.db.get_state(parent, dep)?.is_active(),
                    None => false,
                };
                (csv, self.db.median_time_past(parent)?)
            }
            None => (false, 0),
        };
        let flags = if csv_active {
            script_flags::CHECKSEQUENCEVERIFY
        } else {
            script_flags::NONE
        };

        for (i, tx) in block.transactions.iter().enumerate() {
            if i == 0 {
                // Coinbase outputs become coins; the value check needs the
                // block's total fees and happens after the other inputs.
                view.add_tx(tx, entry.height)?;
                continue;
            }
            let fee = self.verify_tx(&mut view, tx, entry, parent.as_ref(), csv_active, mtp, flags)?;
            fees = fees
                .checked_add(fee)
                .ok_or(ConsensusError::InputValuesOutOfRange)?;
            view.add_tx(tx, entry.height)?;
        }

        let coinbase = &block.transactions[0];
        let allowed = self
            .db
            .params()
            .block_subsidy(entry.height)
            .checked_add(fees)
            .ok_or(ConsensusError::InputValuesOutOfRange)?;
        let minted = coinbase
            .total_output_value()
            .ok_or(ConsensusError::InputValuesOutOfRange)?;
        if minted > allowed {
            return Err(ConsensusError::BadCoinbaseAmount.into());
        }

        Ok(view)
    }

    /// Validate one non-coinbase transaction's inputs. Returns its fee.
    #[allow(clippy::too_many_arguments)]
    fn verify_tx(
        &self,
        view: &mut CoinView,
        tx: &Transaction,
        entry: &ChainEntry,
        parent: Option<&ChainEntry>,
        csv_active: bool,
        mtp: u64,
        flags: u32,
    ) -> Result<u64, EmberError> {
        if !locks::is_final(tx, entry.height, mtp) {
            return Err(ConsensusError::NonFinal.into());
        }

        let mut total_in: u64 = 0;
        for (i, input) in tx.inputs.iter().enumerate() {
            let coin = view.spend(&self.db, &input.prevout)?;
            if !coin.is_mature(entry.height, self.db.params().coinbase_maturity) {
                return Err(ConsensusError::PrematureCoinbaseSpend.into());
            }
            // Sequence-encoded relative locks apply to v2+ transactions
            // once the CSV deployment is active.
            if csv_active && tx.version >= 2 {
                if let Some(lock) = locks::relative_lock(input.sequence) {
                    self.check_relative_lock(&coin, lock, entry, parent, mtp)?;
                }
            }
            self.verifier
                .verify(tx, i, &coin, flags)
                .map_err(|_| ConsensusError::ScriptVerifyFailed)?;
            total_in = total_in
                .checked_add(coin.value)
                .ok_or(ConsensusError::InputValuesOutOfRange)?;
        }

        let total_out = tx
            .total_output_value()
            .ok_or(ConsensusError::InputValuesOutOfRange)?;
        if total_in < total_out {
            return Err(ConsensusError::InputsBelowOutputs.into());
        }
        Ok(total_in - total_out)
    }

    fn check_relative_lock(
        &self,
        coin: &Coin,
        lock: RelativeLock,
        entry: &ChainEntry,
        parent: Option<&ChainEntry>,
        mtp: u64,
    ) -> Result<(), EmberError> {
        match lock {
            RelativeLock::Height(blocks) => {
                if entry.height < coin.height.saturating_add(blocks) {
                    return Err(ConsensusError::NonFinal.into());
                }
            }
            RelativeLock::Time(seconds) => {
                // Elapsed time is measured between median-time-past of the
                // coin's block and of the spending block's parent.
                let parent = parent.ok_or_else(|| {
                    EmberError::Invariant("relative time lock in genesis".into())
                })?;
                let coin_entry = self.db.get_ancestor(parent, coin.height)?;
                let coin_mtp = self.db.median_time_past(&coin_entry)?;
                if mtp < coin_mtp.saturating_add(seconds) {
                    return Err(ConsensusError::NonFinal.into());
                }
            }
        }
        Ok(())
    }

    // --- Reorganization ---

    /// Switch the main chain from `old_tip` to the branch ending at
    /// `new_tip`.
    ///
    /// Disconnects to the fork point, then connects the new branch with
    /// full validation (side-branch blocks were only header-validated when
    /// first seen). If any new block fails, the old chain is restored
    /// exactly; a rollback failure is an unrecoverable integrity fault.
    fn reorganize(&self, old_tip: &ChainEntry, new_tip: &ChainEntry) -> Result<(), EmberError> {
        let fork = self.find_fork(old_tip, new_tip)?;
        info!(
            old_tip = %old_tip.hash,
            new_tip = %new_tip.hash,
            fork = %fork.hash,
            fork_height = fork.height,
            "reorganizing"
        );

        // Old branch, tip down to (excluding) the fork point.
        let mut old_branch: Vec<(ChainEntry, Arc<Block>)> = Vec::new();
        let mut cur = old_tip.clone();
        while cur.hash != fork.hash {
            let block = self.require_block(&cur)?;
            let prev = cur.prev;
            old_branch.push((cur, block));
            cur = self.require_entry(prev)?;
        }

        // New branch in ascending height order.
        let mut new_branch: Vec<(ChainEntry, Arc<Block>)> = Vec::new();
        let mut cur = new_tip.clone();
        while cur.hash != fork.hash {
            let block = self.require_block(&cur)?;
            let prev = cur.prev;
            new_branch.push((cur, block));
            cur = self.require_entry(prev)?;
        }
        new_branch.reverse();

        for (entry, block) in &old_branch {
            self.disconnect_block(entry, block)?;
        }

        for (i, (entry, block)) in new_branch.iter().enumerate() {
            if let Err(err) = self.connect_block(entry, block) {
                warn!(
                    hash = %entry.hash,
                    height = entry.height,
                    %err,
                    "reorganization branch failed, rolling back"
                );
                self.rollback(&new_branch[..i], &old_branch)?;
                return Err(err);
            }
        }

        let _ = self.events.send(ChainEvent::Reorganized {
            old_tip: old_tip.clone(),
            new_tip: new_tip.clone(),
        });
        info!(
            new_tip = %new_tip.hash,
            height = new_tip.height,
            disconnected = old_branch.len(),
            connected = new_branch.len(),
            "reorganization complete"
        );
        Ok(())
    }

    /// Undo a failed branch switch: disconnect what was connected, then
    /// reconnect the old branch from the fork point up.
    fn rollback(
        &self,
        connected: &[(ChainEntry, Arc<Block>)],
        old_branch: &[(ChainEntry, Arc<Block>)],
    ) -> Result<(), EmberError> {
        for (entry, block) in connected.iter().rev() {
            self.disconnect_block(entry, block)
                .map_err(|e| EmberError::Invariant(format!("rollback disconnect failed: {e}")))?;
        }
        // old_branch is tip-down; reconnect bottom-up. These blocks were
        // on the main chain moments ago, so a failure here is corruption.
        for (entry, block) in old_branch.iter().rev() {
            self.connect_block(entry, block)
                .map_err(|e| EmberError::Invariant(format!("rollback reconnect failed: {e}")))?;
        }
        Ok(())
    }

    fn disconnect_block(&self, entry: &ChainEntry, block: &Arc<Block>) -> Result<(), EmberError> {
        self.db.disconnect(entry, block)?;
        let _ = self.events.send(ChainEvent::Disconnected {
            entry: entry.clone(),
            block: Arc::clone(block),
        });
        Ok(())
    }

    /// Lowest common ancestor of two entries.
    fn find_fork(&self, a: &ChainEntry, b: &ChainEntry) -> Result<ChainEntry, EmberError> {
        let mut a = a.clone();
        let mut b = b.clone();
        while a.hash != b.hash {
            if a.height >= b.height {
                a = self.require_entry(a.prev)?;
            } else {
                b = self.require_entry(b.prev)?;
            }
        }
        Ok(a)
    }

    fn require_entry(
        &self,
        hash: ember_core::types::Hash256,
    ) -> Result<ChainEntry, EmberError> {
        self.db
            .get_entry(&hash)?
            .ok_or_else(|| EmberError::Invariant(format!("entry {hash} missing from index")))
    }

    fn require_block(&self, entry: &ChainEntry) -> Result<Arc<Block>, EmberError> {
        Ok(Arc::new(self.db.get_block(&entry.hash)?.ok_or_else(
            || EmberError::Invariant(format!("block {} missing from store", entry.hash)),
        )?))
    }
}
