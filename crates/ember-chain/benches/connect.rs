//! Criterion benchmarks for ember-chain database operations.
//!
//! Covers: block connection and coin lookup against the in-memory store.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ember_chain::{ChainDb, ChainEntry, CoinView, MemoryKv};
use ember_core::merkle;
use ember_core::params::NetworkParams;
use ember_core::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};

fn coinbase(height: u64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxInput::new(OutPoint::null(), height.to_le_bytes().to_vec())],
        outputs: vec![TxOutput {
            value: 50,
            script: vec![0xaa],
        }],
        lock_time: 0,
    }
}

/// Build a coinbase-only block extending `parent`.
fn build_block(parent: &ChainEntry) -> (ChainEntry, Block) {
    let txs = vec![coinbase(parent.height + 1)];
    let txids: Vec<Hash256> = txs.iter().map(|tx| tx.txid().unwrap()).collect();
    let header = BlockHeader {
        version: 1,
        prev_hash: parent.hash,
        merkle_root: merkle::merkle_root(&txids),
        timestamp: parent.time + 60,
        bits: parent.bits,
        nonce: 0,
    };
    let entry = ChainEntry::from_header(&header, parent);
    (entry, Block { header, transactions: txs })
}

fn bench_connect(c: &mut Criterion) {
    // Pre-build the block outside the timed section to measure only the
    // save + connect batch writes.
    c.bench_function("db_connect_block", |b| {
        b.iter_with_setup(
            || {
                let db =
                    ChainDb::open(Arc::new(MemoryKv::new()), NetworkParams::regtest()).unwrap();
                let (entry, block) = build_block(&db.tip().unwrap());
                (db, entry, block)
            },
            |(db, entry, block)| {
                let mut view = CoinView::new();
                for tx in &block.transactions {
                    view.add_tx(tx, entry.height).unwrap();
                }
                db.save_block(&entry, &block).unwrap();
                db.connect(black_box(&entry), &block, view).unwrap();
            },
        );
    });
}

fn bench_coin_lookup(c: &mut Criterion) {
    let db = ChainDb::open(Arc::new(MemoryKv::new()), NetworkParams::regtest()).unwrap();
    let mut tip = db.tip().unwrap();
    let mut outpoints = Vec::new();
    for _ in 0..100 {
        let (entry, block) = build_block(&tip);
        let mut view = CoinView::new();
        for tx in &block.transactions {
            view.add_tx(tx, entry.height).unwrap();
        }
        outpoints.push(OutPoint {
            txid: block.transactions[0].txid().unwrap(),
            index: 0,
        });
        db.save_block(&entry, &block).unwrap();
        db.connect(&entry, &block, view).unwrap();
        tip = entry;
    }
    c.bench_function("db_get_coin", |b| {
        let mut i = 0;
        b.iter(|| {
            let outpoint = &outpoints[i % outpoints.len()];
            i += 1;
            black_box(db.get_coin(outpoint).unwrap())
        });
    });
}

criterion_group!(benches, bench_connect, bench_coin_lookup);
criterion_main!(benches);
