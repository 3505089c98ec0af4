//! Ember chain layer: block index, UTXO database, deployment tracking,
//! contextual validation, and fork choice.
//!
//! The entry point is [`Chain`], which owns a [`ChainDb`] and exposes a
//! single ingestion operation, [`Chain::add`]. Everything below it is
//! synchronous and storage-agnostic: [`ChainDb`] talks to any
//! [`kv::KvStore`], with [`kv::MemoryKv`] for tests and a RocksDB backend
//! in `ember-store` for production.

pub mod chain;
pub mod coinview;
pub mod db;
pub mod deployments;
pub mod entry;
pub mod kv;
pub mod scan;

pub use chain::{Chain, ChainEvent, NullVerifier, ScriptVerifier};
pub use coinview::CoinView;
pub use db::{ChainDb, ChainState};
pub use deployments::ThresholdState;
pub use entry::ChainEntry;
pub use kv::{BatchOp, KvStore, MemoryKv, Table, WriteBatch};
pub use scan::{ScanFilter, ScanHit, Scanner};
