//! Shared helpers for building chains and blocks in tests.

use std::sync::Arc;

use ember_chain::{Chain, ChainDb, ChainEntry, ChainEvent, KvStore, MemoryKv, NullVerifier};
use ember_core::merkle;
use ember_core::params::NetworkParams;
use ember_core::types::{
    Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput,
};

/// Fixed "now" far past any test timestamp, so the future-drift check
/// never interferes unless a test wants it to.
pub const FAR_FUTURE: u64 = 3_000_000_000;

/// Install the test log subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Chain over a fresh in-memory store with an accept-all verifier.
pub fn chain_with(params: NetworkParams) -> Chain {
    chain_on(Arc::new(MemoryKv::new()), params)
}

/// Chain over a given store backend.
pub fn chain_on(kv: Arc<dyn KvStore>, params: NetworkParams) -> Chain {
    init_tracing();
    let db = ChainDb::open(kv, params).unwrap();
    Chain::with_clock(db, Arc::new(NullVerifier), Box::new(|| FAR_FUTURE))
}

pub fn regtest_chain() -> Chain {
    chain_with(NetworkParams::regtest())
}

/// Coinbase with a unique (height, tag) marker in its script_sig.
pub fn make_coinbase(chain: &Chain, height: u64, tag: u64) -> Transaction {
    let mut marker = height.to_le_bytes().to_vec();
    marker.extend_from_slice(&tag.to_le_bytes());
    Transaction {
        version: 1,
        inputs: vec![TxInput::new(OutPoint::null(), marker)],
        outputs: vec![TxOutput {
            value: chain.db().params().block_subsidy(height),
            script: vec![tag as u8],
        }],
        lock_time: 0,
    }
}

/// Simple spending transaction.
pub fn make_spend(inputs: Vec<(OutPoint, u32)>, outputs: Vec<u64>, version: u32) -> Transaction {
    Transaction {
        version,
        inputs: inputs
            .into_iter()
            .map(|(prevout, sequence)| TxInput {
                prevout,
                script_sig: vec![],
                sequence,
            })
            .collect(),
        outputs: outputs
            .into_iter()
            .map(|value| TxOutput {
                value,
                script: vec![0xcc],
            })
            .collect(),
        lock_time: 0,
    }
}

/// Sequence encoding a relative lock of `blocks` blocks.
pub fn seq_height(blocks: u16) -> u32 {
    u32::from(blocks)
}

/// Sequence encoding a relative lock of `units` 512-second units.
pub fn seq_time(units: u16) -> u32 {
    ember_core::constants::SEQUENCE_TYPE_FLAG | u32::from(units)
}

/// Build a block with a correct merkle root, schedule-matching difficulty,
/// and a timestamp one spacing past the parent.
pub fn build_block(
    chain: &Chain,
    parent: &ChainEntry,
    tag: u64,
    version: u32,
    txs: Vec<Transaction>,
) -> Block {
    let height = parent.height + 1;
    let mut transactions = vec![make_coinbase(chain, height, tag)];
    transactions.extend(txs);
    let txids: Vec<Hash256> = transactions.iter().map(|tx| tx.txid().unwrap()).collect();
    Block {
        header: BlockHeader {
            version,
            prev_hash: parent.hash,
            merkle_root: merkle::merkle_root(&txids),
            timestamp: parent.time + chain.db().params().target_spacing,
            bits: chain.db().next_target(parent).unwrap(),
            nonce: tag,
        },
        transactions,
    }
}

/// Mine one empty version-1 block on `parent`.
pub async fn mine(chain: &Chain, parent: &ChainEntry, tag: u64) -> ChainEntry {
    chain
        .add(build_block(chain, parent, tag, 1, vec![]))
        .await
        .unwrap()
}

/// Mine one empty block with an explicit version (for signaling tests).
pub async fn mine_versioned(
    chain: &Chain,
    parent: &ChainEntry,
    tag: u64,
    version: u32,
) -> ChainEntry {
    chain
        .add(build_block(chain, parent, tag, version, vec![]))
        .await
        .unwrap()
}

/// The outpoint of a block's coinbase output.
pub fn coinbase_outpoint(chain: &Chain, entry: &ChainEntry) -> OutPoint {
    let block = chain.db().get_block(&entry.hash).unwrap().unwrap();
    OutPoint {
        txid: block.transactions[0].txid().unwrap(),
        index: 0,
    }
}

/// Stable rejection reason of an `add` error.
pub fn reason(err: &ember_core::error::EmberError) -> String {
    err.as_consensus()
        .map(|e| e.to_string())
        .unwrap_or_else(|| err.to_string())
}

/// Drain all pending events from a subscription.
pub fn drain_events(
    events: &mut tokio::sync::broadcast::Receiver<ChainEvent>,
) -> Vec<ChainEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Assert the incremental aggregates equal a full UTXO recomputation.
pub fn assert_aggregates_consistent(chain: &Chain) {
    let state = chain.state().unwrap();
    let (value, count) = chain.db().recompute_aggregates().unwrap();
    assert_eq!(state.value, value, "aggregate value drifted from UTXO set");
    assert_eq!(state.coin, count, "aggregate coin count drifted from UTXO set");
}
