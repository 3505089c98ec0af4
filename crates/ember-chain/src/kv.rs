//! Key-value storage interface and in-memory implementation.
//!
//! [`ChainDb`](crate::db::ChainDb) stores everything through the
//! [`KvStore`] trait: typed tables, point reads, ordered scans, and atomic
//! multi-table [`WriteBatch`] writes. [`MemoryKv`] is suitable for
//! testing; the production node uses RocksDB (`ember-store`), one column
//! family per table.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use ember_core::error::EmberError;

/// Logical tables of the chain database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Block hash → [`ChainEntry`](crate::entry::ChainEntry).
    Entries,
    /// Big-endian height → main-chain block hash.
    HeightIndex,
    /// Block hash → full block body.
    Blocks,
    /// Outpoint key → unspent [`Coin`](ember_core::types::Coin).
    Coins,
    /// Block hash → [`BlockUndo`](crate::coinview::BlockUndo).
    Undo,
    /// Aggregate chain state and tip metadata.
    State,
    /// Tip block hash → empty marker.
    Tips,
    /// Deployment name and window-boundary block hash → finalized
    /// threshold state.
    Deployments,
}

impl Table {
    /// All tables, in a fixed order.
    pub const ALL: [Table; 8] = [
        Table::Entries,
        Table::HeightIndex,
        Table::Blocks,
        Table::Coins,
        Table::Undo,
        Table::State,
        Table::Tips,
        Table::Deployments,
    ];

    /// Stable table name, used for RocksDB column families.
    pub const fn name(&self) -> &'static str {
        match self {
            Table::Entries => "entries",
            Table::HeightIndex => "height_index",
            Table::Blocks => "blocks",
            Table::Coins => "coins",
            Table::Undo => "undo",
            Table::State => "state",
            Table::Tips => "tips",
            Table::Deployments => "deployments",
        }
    }

    /// Position of this table in [`Table::ALL`].
    pub const fn index(&self) -> usize {
        match self {
            Table::Entries => 0,
            Table::HeightIndex => 1,
            Table::Blocks => 2,
            Table::Coins => 3,
            Table::Undo => 4,
            Table::State => 5,
            Table::Tips => 6,
            Table::Deployments => 7,
        }
    }
}

/// A single mutation within a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        table: Table,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: Table,
        key: Vec<u8>,
    },
}

/// An ordered set of mutations applied atomically.
///
/// Either every operation lands or none does; a batch is the unit of
/// crash consistency for block connection and disconnection.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { table, key, value });
    }

    pub fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { table, key });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Consume the batch into its operations, in insertion order.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Abstract chain storage backend.
///
/// Implementations must apply a [`WriteBatch`] atomically and iterate
/// tables in ascending key order.
pub trait KvStore: Send + Sync {
    /// Point read. Returns `None` if the key is absent.
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, EmberError>;

    /// Apply all operations in `batch` atomically.
    fn write(&self, batch: WriteBatch) -> Result<(), EmberError>;

    /// All entries of `table` in ascending key order.
    fn iter(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EmberError>;
}

/// In-memory storage for testing.
///
/// One `BTreeMap` per table behind a single lock, so batches are trivially
/// atomic. No persistence.
#[derive(Default)]
pub struct MemoryKv {
    tables: RwLock<[BTreeMap<Vec<u8>, Vec<u8>>; 8]>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, EmberError> {
        Ok(self.tables.read()[table.index()].get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), EmberError> {
        let mut tables = self.tables.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    tables[table.index()].insert(key, value);
                }
                BatchOp::Delete { table, key } => {
                    tables[table.index()].remove(&key);
                }
            }
        }
        Ok(())
    }

    fn iter(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EmberError> {
        Ok(self.tables.read()[table.index()]
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
