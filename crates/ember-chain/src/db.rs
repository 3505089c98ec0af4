//! Chain database: block index, UTXO set, aggregate state, tip set, and
//! the deployment-state cache.
//!
//! [`ChainDb`] is the persistence layer below [`Chain`](crate::chain::Chain).
//! It performs no consensus validation of its own beyond structural
//! invariants (parent indexed before child, connect/disconnect only at the
//! tip); blocks given to [`ChainDb::connect`] must already be validated.
//! Every mutation is a single atomic [`WriteBatch`], so a crash leaves the
//! database at a block boundary.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ember_core::error::{EmberError, StoreError};
use ember_core::params::{Deployment, NetworkParams};
use ember_core::pow;
use ember_core::types::{Block, Coin, Hash256, OutPoint};

use crate::coinview::{BlockUndo, CoinSource, CoinView};
use crate::deployments::{self, ThresholdState};
use crate::entry::ChainEntry;
use crate::kv::{KvStore, Table, WriteBatch};

// --- State table keys ---

const STATE_KEY: &[u8] = b"aggregates";
const TIP_KEY: &[u8] = b"tip";

/// Aggregate counters over the main chain.
///
/// Updated incrementally on every connect and disconnect; must always
/// equal a full recomputation from the UTXO table.
#[derive(
    Serialize, Deserialize, bincode::Encode, bincode::Decode,
    Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub struct ChainState {
    /// Sum of all unspent output values, in sparks.
    pub value: u64,
    /// Number of unspent coins.
    pub coin: u64,
    /// Transactions ever connected to the main chain.
    pub tx: u64,
}

fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, EmberError> {
    bincode::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StoreError::Corrupt(e.to_string()).into())
}

fn decode<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, EmberError> {
    let (value, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok(value)
}

fn height_key(height: u64) -> Vec<u8> {
    height.to_be_bytes().to_vec()
}

fn hash_from_bytes(bytes: &[u8]) -> Result<Hash256, EmberError> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt("hash record has wrong length".into()))?;
    Ok(Hash256::from_bytes(arr))
}

fn deployment_cache_key(name: &str, boundary: &Hash256) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1 + 32);
    key.extend_from_slice(name.as_bytes());
    key.push(b'/');
    key.extend_from_slice(boundary.as_bytes());
    key
}

/// Persistent chain database over an abstract [`KvStore`].
///
/// On first open, indexes and connects the genesis block of the given
/// network parameters.
pub struct ChainDb {
    kv: Arc<dyn KvStore>,
    params: NetworkParams,
}

impl fmt::Debug for ChainDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainDb").finish_non_exhaustive()
    }
}

impl CoinSource for ChainDb {
    fn read_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, EmberError> {
        self.get_coin(outpoint)
    }
}

impl ChainDb {
    /// Open the database, bootstrapping genesis if the store is empty.
    ///
    /// A non-empty store must hold the chain of the given network: its
    /// block at height zero is compared against the parameters' genesis,
    /// and a mismatch fails as corruption rather than silently proceeding
    /// against the wrong chain.
    pub fn open(kv: Arc<dyn KvStore>, params: NetworkParams) -> Result<Self, EmberError> {
        let db = Self { kv, params };
        let genesis = db.params.genesis_block();
        let entry = ChainEntry::genesis(&genesis.header);
        match db.main_hash_at(0)? {
            Some(stored) if stored == entry.hash => {}
            Some(stored) => {
                return Err(StoreError::Corrupt(format!(
                    "store holds genesis {stored}, network parameters expect {}",
                    entry.hash
                ))
                .into());
            }
            None => {
                let mut view = CoinView::new();
                for tx in &genesis.transactions {
                    view.add_tx(tx, 0)?;
                }
                db.save_block(&entry, &genesis)?;
                db.connect(&entry, &genesis, view)?;
                info!(hash = %entry.hash, "connected genesis block");
            }
        }
        Ok(db)
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    // --- Index reads ---

    /// Look up an index entry by block hash.
    pub fn get_entry(&self, hash: &Hash256) -> Result<Option<ChainEntry>, EmberError> {
        match self.kv.get(Table::Entries, hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up the main-chain index entry at `height`.
    pub fn get_entry_by_height(&self, height: u64) -> Result<Option<ChainEntry>, EmberError> {
        match self.main_hash_at(height)? {
            Some(hash) => self.get_entry(&hash),
            None => Ok(None),
        }
    }

    /// The main-chain block hash at `height`, if within the main chain.
    pub fn main_hash_at(&self, height: u64) -> Result<Option<Hash256>, EmberError> {
        match self.kv.get(Table::HeightIndex, &height_key(height))? {
            Some(bytes) => Ok(Some(hash_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a stored block body by hash.
    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, EmberError> {
        match self.kv.get(Table::Blocks, hash.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve the main-chain block body at `height`.
    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>, EmberError> {
        match self.main_hash_at(height)? {
            Some(hash) => self.get_block(&hash),
            None => Ok(None),
        }
    }

    /// Look up an unspent coin. `None` means spent or never existed.
    pub fn get_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, EmberError> {
        match self.kv.get(Table::Coins, &outpoint.key())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether `hash` is currently a leaf of the block tree.
    pub fn is_tip(&self, hash: &Hash256) -> Result<bool, EmberError> {
        Ok(self.kv.get(Table::Tips, hash.as_bytes())?.is_some())
    }

    /// All current leaf hashes, in key order.
    pub fn get_tips(&self) -> Result<Vec<Hash256>, EmberError> {
        self.kv
            .iter(Table::Tips)?
            .into_iter()
            .map(|(key, _)| hash_from_bytes(&key))
            .collect()
    }

    /// Hash of the current main-chain tip. `None` only before genesis.
    pub fn tip_hash(&self) -> Result<Option<Hash256>, EmberError> {
        match self.kv.get(Table::State, TIP_KEY)? {
            Some(bytes) => Ok(Some(hash_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Entry of the current main-chain tip.
    pub fn tip(&self) -> Result<ChainEntry, EmberError> {
        let hash = self
            .tip_hash()?
            .ok_or_else(|| StoreError::Corrupt("no chain tip recorded".into()))?;
        self.get_entry(&hash)?
            .ok_or_else(|| StoreError::Corrupt("tip entry missing from index".into()).into())
    }

    /// Aggregate chain state counters.
    pub fn state(&self) -> Result<ChainState, EmberError> {
        match self.kv.get(Table::State, STATE_KEY)? {
            Some(bytes) => decode(&bytes),
            None => Ok(ChainState::default()),
        }
    }

    /// Whether `entry` lies on the current main chain.
    pub fn is_main_chain(&self, entry: &ChainEntry) -> Result<bool, EmberError> {
        Ok(self.main_hash_at(entry.height)? == Some(entry.hash))
    }

    /// The ancestor of `entry` at `height`, following parent links, with a
    /// height-index shortcut once the walk reaches the main chain.
    pub fn get_ancestor(&self, entry: &ChainEntry, height: u64) -> Result<ChainEntry, EmberError> {
        if height > entry.height {
            return Err(EmberError::Invariant(format!(
                "ancestor height {height} above entry height {}",
                entry.height
            )));
        }
        let mut cur = entry.clone();
        while cur.height > height {
            if self.is_main_chain(&cur)? {
                return self.get_entry_by_height(height)?.ok_or_else(|| {
                    StoreError::Corrupt(format!("height index missing height {height}")).into()
                });
            }
            cur = self.get_entry(&cur.prev)?.ok_or_else(|| {
                StoreError::Corrupt(format!("unindexed parent {}", cur.prev))
            })?;
        }
        Ok(cur)
    }

    /// Median timestamp of `entry` and up to ten of its ancestors.
    pub fn median_time_past(&self, entry: &ChainEntry) -> Result<u64, EmberError> {
        let mut times = Vec::with_capacity(ember_core::constants::MEDIAN_TIME_SPAN);
        let mut cur = entry.clone();
        loop {
            times.push(cur.time);
            if times.len() == ember_core::constants::MEDIAN_TIME_SPAN || cur.is_genesis() {
                break;
            }
            cur = self.get_entry(&cur.prev)?.ok_or_else(|| {
                StoreError::Corrupt(format!("unindexed parent {}", cur.prev))
            })?;
        }
        times.sort_unstable();
        Ok(times[times.len() / 2])
    }

    /// Difficulty target required of the block extending `parent`.
    pub fn next_target(&self, parent: &ChainEntry) -> Result<u64, EmberError> {
        let count = (self.params.retarget_window + 1).min(parent.height + 1) as usize;
        let mut times = Vec::with_capacity(count);
        let mut cur = parent.clone();
        loop {
            times.push(cur.time);
            if times.len() == count {
                break;
            }
            cur = self.get_entry(&cur.prev)?.ok_or_else(|| {
                StoreError::Corrupt(format!("unindexed parent {}", cur.prev))
            })?;
        }
        times.reverse();
        Ok(pow::next_target(&times, parent.bits, &self.params))
    }

    // --- Mutations ---

    /// Index a block's entry and body without touching the UTXO set.
    ///
    /// Used for every accepted block, main chain or side branch. Updates
    /// the tip set: the new entry becomes a leaf, its parent stops being
    /// one.
    pub fn save_block(&self, entry: &ChainEntry, block: &Block) -> Result<(), EmberError> {
        if !entry.is_genesis() && self.get_entry(&entry.prev)?.is_none() {
            return Err(EmberError::Invariant(format!(
                "parent {} not indexed before child {}",
                entry.prev, entry.hash
            )));
        }
        let mut batch = WriteBatch::new();
        batch.put(Table::Entries, entry.hash.as_bytes().to_vec(), encode(entry)?);
        batch.put(Table::Blocks, entry.hash.as_bytes().to_vec(), encode(block)?);
        batch.put(Table::Tips, entry.hash.as_bytes().to_vec(), Vec::new());
        if !entry.is_genesis() {
            batch.delete(Table::Tips, entry.prev.as_bytes().to_vec());
        }
        self.kv.write(batch)
    }

    /// Apply a validated block's UTXO effect at the tip, atomically.
    ///
    /// Writes the surviving coins, deletes the spent ones, stores the undo
    /// record, extends the height index, advances the tip, and updates the
    /// aggregates, all in one batch.
    pub fn connect(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: CoinView,
    ) -> Result<(), EmberError> {
        if !entry.is_genesis() {
            if self.get_entry(&entry.prev)?.is_none() {
                return Err(EmberError::Invariant(format!(
                    "parent {} not indexed on connect",
                    entry.prev
                )));
            }
            if self.tip_hash()? != Some(entry.prev) {
                return Err(EmberError::Invariant(format!(
                    "connect of {} does not extend the tip",
                    entry.hash
                )));
            }
        }

        let (alive, undo) = view.into_parts();
        let state = self.apply_aggregates(block, &undo, true)?;

        let mut batch = WriteBatch::new();
        for (outpoint, coin) in &alive {
            batch.put(Table::Coins, outpoint.key().to_vec(), encode(coin)?);
        }
        for (outpoint, _) in &undo.spent {
            batch.delete(Table::Coins, outpoint.key().to_vec());
        }
        batch.put(Table::Undo, entry.hash.as_bytes().to_vec(), encode(&undo)?);
        batch.put(
            Table::HeightIndex,
            height_key(entry.height),
            entry.hash.as_bytes().to_vec(),
        );
        batch.put(Table::State, TIP_KEY.to_vec(), entry.hash.as_bytes().to_vec());
        batch.put(Table::State, STATE_KEY.to_vec(), encode(&state)?);
        self.kv.write(batch)?;

        debug!(
            hash = %entry.hash,
            height = entry.height,
            created = alive.len(),
            spent = undo.spent.len(),
            "connected block"
        );
        Ok(())
    }

    /// Drop a saved but never-connected block from the index.
    ///
    /// Reverses [`ChainDb::save_block`] for a leaf whose connection was
    /// rejected: removes the entry, the body, and its leaf record, and
    /// restores the parent's leaf record when the removed block was the
    /// parent's only child (`restore_parent_tip`, known to the caller from
    /// the state before the save).
    pub fn remove_block(
        &self,
        entry: &ChainEntry,
        restore_parent_tip: bool,
    ) -> Result<(), EmberError> {
        if self.is_main_chain(entry)? {
            return Err(EmberError::Invariant(format!(
                "remove of {} which is on the main chain",
                entry.hash
            )));
        }
        let mut batch = WriteBatch::new();
        batch.delete(Table::Entries, entry.hash.as_bytes().to_vec());
        batch.delete(Table::Blocks, entry.hash.as_bytes().to_vec());
        batch.delete(Table::Tips, entry.hash.as_bytes().to_vec());
        for deployment in &self.params.deployments {
            batch.delete(
                Table::Deployments,
                deployment_cache_key(deployment.name, &entry.hash),
            );
        }
        if restore_parent_tip {
            batch.put(Table::Tips, entry.prev.as_bytes().to_vec(), Vec::new());
        }
        self.kv.write(batch)?;
        debug!(hash = %entry.hash, height = entry.height, "removed rejected block");
        Ok(())
    }

    /// Reverse the tip block's UTXO effect using its stored undo record.
    ///
    /// Restored coins are written before the block's own outputs are
    /// deleted, so coins created and spent by the same block unwind to
    /// nothing. Disconnecting the chain root fails closed.
    pub fn disconnect(&self, entry: &ChainEntry, block: &Block) -> Result<(), EmberError> {
        if entry.is_genesis() {
            return Err(EmberError::Invariant(
                "cannot disconnect the chain root".into(),
            ));
        }
        if self.tip_hash()? != Some(entry.hash) {
            return Err(EmberError::Invariant(format!(
                "disconnect of {} which is not the tip",
                entry.hash
            )));
        }
        let undo: BlockUndo = match self.kv.get(Table::Undo, entry.hash.as_bytes())? {
            Some(bytes) => decode(&bytes)?,
            None => {
                return Err(StoreError::Corrupt(format!(
                    "missing undo record for {}",
                    entry.hash
                ))
                .into())
            }
        };

        let state = self.apply_aggregates(block, &undo, false)?;

        let mut batch = WriteBatch::new();
        for (outpoint, coin) in &undo.spent {
            batch.put(Table::Coins, outpoint.key().to_vec(), encode(coin)?);
        }
        for tx in &block.transactions {
            let txid = tx.txid()?;
            for index in 0..tx.outputs.len() {
                let outpoint = OutPoint {
                    txid,
                    index: index as u32,
                };
                batch.delete(Table::Coins, outpoint.key().to_vec());
            }
        }
        batch.delete(Table::Undo, entry.hash.as_bytes().to_vec());
        batch.delete(Table::HeightIndex, height_key(entry.height));
        batch.put(Table::State, TIP_KEY.to_vec(), entry.prev.as_bytes().to_vec());
        batch.put(Table::State, STATE_KEY.to_vec(), encode(&state)?);
        self.kv.write(batch)?;

        debug!(hash = %entry.hash, height = entry.height, "disconnected block");
        Ok(())
    }

    /// Aggregates after applying (or reversing) one block.
    fn apply_aggregates(
        &self,
        block: &Block,
        undo: &BlockUndo,
        forward: bool,
    ) -> Result<ChainState, EmberError> {
        let mut created_value: u64 = 0;
        let mut created_count: u64 = 0;
        for tx in &block.transactions {
            for output in &tx.outputs {
                created_value = created_value
                    .checked_add(output.value)
                    .ok_or_else(|| EmberError::Invariant("output value overflow".into()))?;
                created_count += 1;
            }
        }
        let spent_value: u64 = undo.spent.iter().map(|(_, c)| c.value).sum();
        let spent_count = undo.spent.len() as u64;
        let tx_count = block.transactions.len() as u64;

        let state = self.state()?;
        let shift = |base: u64, add: u64, sub: u64| -> Result<u64, EmberError> {
            base.checked_add(add)
                .and_then(|v| v.checked_sub(sub))
                .ok_or_else(|| EmberError::Invariant("aggregate counter out of range".into()))
        };
        Ok(if forward {
            ChainState {
                value: shift(state.value, created_value, spent_value)?,
                coin: shift(state.coin, created_count, spent_count)?,
                tx: shift(state.tx, tx_count, 0)?,
            }
        } else {
            ChainState {
                value: shift(state.value, spent_value, created_value)?,
                coin: shift(state.coin, spent_count, created_count)?,
                tx: shift(state.tx, 0, tx_count)?,
            }
        })
    }

    /// Recompute `(value, coin)` aggregates from the UTXO table.
    ///
    /// A full scan, used by tests and integrity checks, never on the block
    /// ingestion path.
    pub fn recompute_aggregates(&self) -> Result<(u64, u64), EmberError> {
        let mut value: u64 = 0;
        let mut count: u64 = 0;
        for (_, bytes) in self.kv.iter(Table::Coins)? {
            let coin: Coin = decode(&bytes)?;
            value = value
                .checked_add(coin.value)
                .ok_or_else(|| EmberError::Invariant("UTXO value overflow".into()))?;
            count += 1;
        }
        Ok((value, count))
    }

    /// Prune index entries and block bodies of all non-main branches.
    ///
    /// Walks down from every non-best tip until the main chain is reached,
    /// deleting entries along the way. The main chain and its tip are
    /// never touched. Returns the number of entries removed.
    pub fn remove_chains(&self) -> Result<usize, EmberError> {
        let best = self.tip()?;
        let mut batch = WriteBatch::new();
        let mut removed: HashSet<Hash256> = HashSet::new();
        for tip_hash in self.get_tips()? {
            if tip_hash == best.hash {
                continue;
            }
            batch.delete(Table::Tips, tip_hash.as_bytes().to_vec());
            let mut cur = self.get_entry(&tip_hash)?.ok_or_else(|| {
                StoreError::Corrupt(format!("tip {tip_hash} missing from index"))
            })?;
            while !self.is_main_chain(&cur)? && removed.insert(cur.hash) {
                batch.delete(Table::Entries, cur.hash.as_bytes().to_vec());
                batch.delete(Table::Blocks, cur.hash.as_bytes().to_vec());
                // Drop any cached window states anchored at the pruned entry.
                for deployment in &self.params.deployments {
                    batch.delete(
                        Table::Deployments,
                        deployment_cache_key(deployment.name, &cur.hash),
                    );
                }
                cur = self.get_entry(&cur.prev)?.ok_or_else(|| {
                    StoreError::Corrupt(format!("unindexed parent {}", cur.prev))
                })?;
            }
        }
        if !batch.is_empty() {
            self.kv.write(batch)?;
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), "pruned side branches");
        }
        Ok(removed.len())
    }

    // --- Deployment state ---

    /// Threshold state of `deployment` for a block whose parent is `entry`.
    ///
    /// Walks window boundaries back to the nearest cached state (or
    /// genesis), then replays the state machine forward, caching each
    /// finalized window as it goes.
    pub fn get_state(
        &self,
        entry: &ChainEntry,
        deployment: &Deployment,
    ) -> Result<ThresholdState, EmberError> {
        self.compute_state(entry, deployment, true)
    }

    fn compute_state(
        &self,
        entry: &ChainEntry,
        deployment: &Deployment,
        use_cache: bool,
    ) -> Result<ThresholdState, EmberError> {
        let child_height = entry.height + 1;
        let mut start = child_height - child_height % deployment.window;
        // Boundary entries whose window state is not yet known, newest first.
        let mut pending: Vec<ChainEntry> = Vec::new();
        let mut state = ThresholdState::Defined;
        while start > 0 {
            let boundary = self.get_ancestor(entry, start - 1)?;
            if use_cache {
                if let Some(cached) = self.cached_state(deployment, &boundary.hash)? {
                    state = cached;
                    break;
                }
            }
            pending.push(boundary);
            start -= deployment.window;
        }

        let mut batch = WriteBatch::new();
        for boundary in pending.iter().rev() {
            let mtp = self.median_time_past(boundary)?;
            let signals = match state {
                ThresholdState::Started => self.count_signals(boundary, deployment)?,
                _ => 0,
            };
            state = deployments::advance(state, deployment, mtp, signals);
            if use_cache {
                batch.put(
                    Table::Deployments,
                    deployment_cache_key(deployment.name, &boundary.hash),
                    vec![state.to_byte()],
                );
            }
        }
        if !batch.is_empty() {
            self.kv.write(batch)?;
        }
        Ok(state)
    }

    fn cached_state(
        &self,
        deployment: &Deployment,
        boundary: &Hash256,
    ) -> Result<Option<ThresholdState>, EmberError> {
        match self
            .kv
            .get(Table::Deployments, &deployment_cache_key(deployment.name, boundary))?
        {
            Some(bytes) if bytes.len() == 1 => Ok(Some(ThresholdState::from_byte(bytes[0])?)),
            Some(_) => Err(StoreError::Corrupt("deployment cache record length".into()).into()),
            None => Ok(None),
        }
    }

    /// Signaling blocks in the window ending at `boundary`, inclusive.
    fn count_signals(
        &self,
        boundary: &ChainEntry,
        deployment: &Deployment,
    ) -> Result<u64, EmberError> {
        let mut count = 0;
        let mut cur = boundary.clone();
        for step in 0..deployment.window {
            if deployment.signals(cur.version) {
                count += 1;
            }
            if step + 1 < deployment.window {
                cur = self.get_entry(&cur.prev)?.ok_or_else(|| {
                    StoreError::Corrupt(format!("unindexed parent {}", cur.prev))
                })?;
            }
        }
        Ok(count)
    }

    /// All cached deployment window states.
    pub fn state_cache(
        &self,
    ) -> Result<Vec<(String, Hash256, ThresholdState)>, EmberError> {
        let mut cache = Vec::new();
        for (key, value) in self.kv.iter(Table::Deployments)? {
            let sep = key
                .iter()
                .rposition(|&b| b == b'/')
                .ok_or_else(|| StoreError::Corrupt("deployment cache key format".into()))?;
            let name = String::from_utf8(key[..sep].to_vec())
                .map_err(|_| StoreError::Corrupt("deployment cache key encoding".into()))?;
            let boundary = hash_from_bytes(&key[sep + 1..])?;
            if value.len() != 1 {
                return Err(StoreError::Corrupt("deployment cache record length".into()).into());
            }
            cache.push((name, boundary, ThresholdState::from_byte(value[0])?));
        }
        Ok(cache)
    }

    /// Recompute every cached deployment state from scratch and compare.
    ///
    /// A mismatch is an integrity fault, reported as an invariant error.
    /// Returns the number of cache entries verified.
    pub fn verify_deployments(&self) -> Result<usize, EmberError> {
        let cache = self.state_cache()?;
        for (name, boundary_hash, cached) in &cache {
            let deployment = self.params.deployment(name).ok_or_else(|| {
                StoreError::Corrupt(format!("cached state for unknown deployment {name}"))
            })?;
            let boundary = self.get_entry(boundary_hash)?.ok_or_else(|| {
                StoreError::Corrupt(format!("cached boundary {boundary_hash} not indexed"))
            })?;
            let recomputed = self.compute_state(&boundary, deployment, false)?;
            if recomputed != *cached {
                return Err(EmberError::Invariant(format!(
                    "deployment cache mismatch for {name} at {boundary_hash}: \
                     cached {cached:?}, recomputed {recomputed:?}"
                )));
            }
        }
        Ok(cache.len())
    }
}
