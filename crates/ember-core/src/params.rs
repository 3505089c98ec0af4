//! Network consensus parameters.
//!
//! Every consensus constant that could differ between networks (or that a
//! test wants to override) lives in [`NetworkParams`], passed explicitly
//! into the chain constructors. There is no process-global mutable
//! consensus state: a test that needs a two-block coinbase maturity builds
//! `NetworkParams { coinbase_maturity: 2, ..NetworkParams::regtest() }`.

use serde::{Deserialize, Serialize};

use crate::constants::COIN;
use crate::merkle;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Transaction, TxInput, TxOutput};

/// Name of the relative-locktime (sequence-lock) deployment.
pub const DEPLOYMENT_CSV: &str = "csv";

/// Network type: Mainnet, Testnet, or Regtest.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    /// Production network.
    #[default]
    Main,
    /// Public test network with lower difficulty.
    Testnet,
    /// Local regression-test network: maximal target, instant blocks.
    Regtest,
}

/// A soft-fork deployment rolled out via version-bit signaling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// Stable deployment name, e.g. [`DEPLOYMENT_CSV`].
    pub name: &'static str,
    /// Block-version bit miners set to signal readiness.
    pub bit: u8,
    /// Median-time-past at which signaling may begin.
    pub start_time: u64,
    /// Median-time-past after which an unlocked deployment fails.
    pub timeout: u64,
    /// Evaluation window size in blocks.
    pub window: u64,
    /// Minimum signaling blocks within one window to lock in.
    pub threshold: u64,
}

impl Deployment {
    /// Version mask for this deployment's signaling bit.
    pub const fn mask(&self) -> u32 {
        1u32 << self.bit
    }

    /// Whether a block version signals this deployment.
    pub const fn signals(&self, version: u32) -> bool {
        version & self.mask() != 0
    }
}

/// Consensus parameters for one Ember network.
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub network: Network,
    /// Confirmations before a coinbase output may be spent.
    pub coinbase_maturity: u64,
    /// Number of block intervals in the rolling retarget window.
    pub retarget_window: u64,
    /// Target seconds between blocks.
    pub target_spacing: u64,
    /// Easiest allowed difficulty target (higher = easier).
    pub pow_limit: u64,
    /// Maximum seconds a block timestamp may run ahead of the clock.
    pub max_future_drift: u64,
    /// Coinbase subsidy at height 0, halving every `halving_interval`.
    pub initial_subsidy: u64,
    pub halving_interval: u64,
    /// Timestamp of the genesis block.
    pub genesis_time: u64,
    /// Soft-fork deployment table.
    pub deployments: Vec<Deployment>,
}

impl NetworkParams {
    /// Production network parameters.
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            coinbase_maturity: 100,
            retarget_window: 60,
            target_spacing: 120,
            pow_limit: u64::MAX >> 10,
            max_future_drift: 2 * 120,
            initial_subsidy: 50 * COIN,
            halving_interval: 210_000,
            genesis_time: 1_761_955_200, // 2025-11-01 00:00:00 UTC
            deployments: vec![Deployment {
                name: DEPLOYMENT_CSV,
                bit: 5,
                start_time: 1_764_547_200, // 2025-12-01 00:00:00 UTC
                timeout: 1_796_083_200,    // 2026-12-01 00:00:00 UTC
                window: 2016,
                threshold: 1916,
            }],
        }
    }

    /// Regression-test parameters: any hash passes proof-of-work, short
    /// maturity, an always-available CSV deployment with a small window.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            coinbase_maturity: 10,
            retarget_window: 8,
            target_spacing: 60,
            pow_limit: u64::MAX,
            max_future_drift: 60 * 60,
            initial_subsidy: 50 * COIN,
            halving_interval: 150,
            genesis_time: 1_700_000_000,
            deployments: vec![Deployment {
                name: DEPLOYMENT_CSV,
                bit: 5,
                start_time: 0,
                timeout: u64::MAX,
                window: 16,
                threshold: 12,
            }],
        }
    }

    /// Look up a deployment by name.
    pub fn deployment(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }

    /// Coinbase subsidy at `height` under the halving schedule.
    pub fn block_subsidy(&self, height: u64) -> u64 {
        let halvings = height / self.halving_interval;
        if halvings >= 64 {
            return 0;
        }
        self.initial_subsidy >> halvings
    }

    /// Deterministically construct this network's genesis block.
    ///
    /// The genesis block is inserted into the store without validation, so
    /// it need not satisfy the proof-of-work check on networks with a real
    /// difficulty floor.
    pub fn genesis_block(&self) -> Block {
        let coinbase = Transaction {
            version: 1,
            inputs: vec![TxInput::new(
                OutPoint::null(),
                b"ember genesis: the fire that keeps its own ledger".to_vec(),
            )],
            outputs: vec![TxOutput {
                value: self.initial_subsidy,
                script: b"genesis".to_vec(),
            }],
            lock_time: 0,
        };
        let txid = coinbase
            .txid()
            .expect("genesis coinbase serialization cannot fail");
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: Hash256::ZERO,
                merkle_root: merkle::merkle_root(&[txid]),
                timestamp: self.genesis_time,
                bits: self.pow_limit,
                nonce: 0,
            },
            transactions: vec![coinbase],
        }
    }
}
