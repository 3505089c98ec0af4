//! RocksDB-backed persistent chain storage.
//!
//! Implements [`KvStore`] with one column family per logical
//! [`Table`]. All mutations go through an atomic RocksDB
//! [`WriteBatch`](rocksdb::WriteBatch) for crash safety; a crash leaves
//! the database at a block boundary, never mid-block.

use std::path::Path;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use tracing::info;

use ember_chain::{BatchOp, KvStore, Table, WriteBatch};
use ember_core::error::{EmberError, StoreError};

fn backend(e: rocksdb::Error) -> EmberError {
    StoreError::Backend(e.to_string()).into()
}

/// RocksDB-backed [`KvStore`].
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    /// Open or create a database at `path`, creating all column families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EmberError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.name(), Options::default()))
            .collect();

        let db =
            DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors).map_err(backend)?;
        info!(path = %path.as_ref().display(), "opened chain store");
        Ok(Self { db })
    }

    fn cf_handle(&self, table: Table) -> Result<&ColumnFamily, EmberError> {
        self.db
            .cf_handle(table.name())
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", table.name())).into())
    }
}

impl KvStore for RocksKv {
    fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, EmberError> {
        let cf = self.cf_handle(table)?;
        self.db.get_cf(cf, key).map_err(backend)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), EmberError> {
        let mut inner = rocksdb::WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { table, key, value } => {
                    inner.put_cf(self.cf_handle(table)?, key, value);
                }
                BatchOp::Delete { table, key } => {
                    inner.delete_cf(self.cf_handle(table)?, key);
                }
            }
        }
        self.db.write(inner).map_err(backend)
    }

    fn iter(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EmberError> {
        let cf = self.cf_handle(table)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item.map_err(backend)?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    use ember_chain::ChainDb;
    use ember_core::params::NetworkParams;

    fn open(dir: &TempDir) -> RocksKv {
        RocksKv::open(dir.path()).unwrap()
    }

    #[test]
    fn put_get_delete_round_trip() {
        let dir = TempDir::new().unwrap();
        let kv = open(&dir);
        let mut batch = WriteBatch::new();
        batch.put(Table::Coins, b"k".to_vec(), b"v".to_vec());
        kv.write(batch).unwrap();
        assert_eq!(kv.get(Table::Coins, b"k").unwrap(), Some(b"v".to_vec()));
        assert!(kv.get(Table::Blocks, b"k").unwrap().is_none());

        let mut batch = WriteBatch::new();
        batch.delete(Table::Coins, b"k".to_vec());
        kv.write(batch).unwrap();
        assert!(kv.get(Table::Coins, b"k").unwrap().is_none());
    }

    #[test]
    fn iter_is_key_ordered() {
        let dir = TempDir::new().unwrap();
        let kv = open(&dir);
        let mut batch = WriteBatch::new();
        for byte in [9u8, 3, 6] {
            batch.put(Table::HeightIndex, vec![byte], vec![byte]);
        }
        kv.write(batch).unwrap();
        let keys: Vec<Vec<u8>> = kv
            .iter(Table::HeightIndex)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![3], vec![6], vec![9]]);
    }

    #[test]
    fn chain_db_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let tip = {
            let db =
                ChainDb::open(Arc::new(open(&dir)), NetworkParams::regtest()).unwrap();
            db.tip().unwrap()
        };
        let db = ChainDb::open(Arc::new(open(&dir)), NetworkParams::regtest()).unwrap();
        assert_eq!(db.tip().unwrap(), tip);
        assert_eq!(db.state().unwrap().tx, 1);
        let (value, count) = db.recompute_aggregates().unwrap();
        assert_eq!(value, db.state().unwrap().value);
        assert_eq!(count, db.state().unwrap().coin);
    }
}
