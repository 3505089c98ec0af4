//! Core protocol types: transactions, blocks, coins.
//!
//! All monetary values are in sparks (1 EMBER = 10^8 sparks). Transaction
//! IDs are BLAKE3 over the canonical bincode encoding; block header hashes
//! are double SHA-256 over a fixed byte layout.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::SEQUENCE_FINAL;
use crate::error::StoreError;

/// A 32-byte hash value.
///
/// Used for transaction IDs (BLAKE3), block header hashes (SHA-256d),
/// and merkle roots (BLAKE3).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Used as the genesis parent and coinbase outpoint txid.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, StoreError> {
        let bytes = hex::decode(s).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StoreError::Corrupt("hash must be 32 bytes".into()))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    /// Transaction ID containing the referenced output.
    pub txid: Hash256,
    /// Index of the output within the transaction.
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, index: u32) -> Self {
        Self { txid, index }
    }

    /// The null outpoint, used for coinbase transaction inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// Check if this is the null outpoint (coinbase marker).
    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == u32::MAX
    }

    /// Fixed-width key encoding: txid || index (big-endian).
    ///
    /// Big-endian index keeps outputs of one transaction contiguous and
    /// ordered under lexicographic key iteration.
    pub fn key(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[0..32].copy_from_slice(self.txid.as_bytes());
        key[32..36].copy_from_slice(&self.index.to_be_bytes());
        key
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

/// A transaction input, spending a previous output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxInput {
    /// The outpoint being spent. Null outpoint for coinbase.
    pub prevout: OutPoint,
    /// Unlocking script, opaque to the chain core. The external script
    /// interpreter consumes it together with the referenced coin's script.
    pub script_sig: Vec<u8>,
    /// Sequence number. Encodes a relative lock for version >= 2
    /// transactions unless bit 31 is set.
    pub sequence: u32,
}

impl TxInput {
    pub fn new(prevout: OutPoint, script_sig: Vec<u8>) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: SEQUENCE_FINAL,
        }
    }
}

/// A transaction output, creating a new coin.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOutput {
    /// Value in sparks.
    pub value: u64,
    /// Locking script, opaque to the chain core.
    pub script: Vec<u8>,
}

/// A transaction transferring value between outputs.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    /// Protocol version. Relative lock semantics apply from version 2.
    pub version: u32,
    /// Inputs consuming previous outputs.
    pub inputs: Vec<TxInput>,
    /// New outputs created by this transaction.
    pub outputs: Vec<TxOutput>,
    /// Block height or timestamp before which this tx is invalid.
    pub lock_time: u32,
}

impl Transaction {
    /// Compute the transaction ID (BLAKE3 hash of the canonical encoding).
    ///
    /// Uses bincode with standard config for deterministic serialization.
    pub fn txid(&self) -> Result<Hash256, StoreError> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Hash256(blake3::hash(&encoded).into()))
    }

    /// Check if this is a coinbase transaction (single input with null outpoint).
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Sum of all output values. Returns None on overflow.
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.value))
    }
}

/// Block header containing the proof-of-work puzzle.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version. The low bits carry soft-fork signaling.
    pub version: u32,
    /// Hash of the previous block header. Zero for genesis.
    pub prev_hash: Hash256,
    /// BLAKE3 merkle root of the block's transaction IDs.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Difficulty target: the first 8 bytes of the header hash, read as a
    /// little-endian u64, must not exceed this value. Higher = easier.
    pub bits: u64,
    /// Proof-of-work nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing.
    const HASH_SIZE: usize = 4 + 2 * 32 + 3 * 8;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Fixed byte layout: version || prev_hash || merkle_root || timestamp
    /// || bits || nonce, integers little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.bits.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        let first = Sha256::digest(&data);
        Hash256(Sha256::digest(first).into())
    }
}

/// A complete block: header plus transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Block header with proof-of-work.
    pub header: BlockHeader,
    /// Ordered list of transactions. First transaction must be coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Get the coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Transaction IDs in block order.
    pub fn txids(&self) -> Result<Vec<Hash256>, StoreError> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }
}

/// One unspent transaction output together with its creation context.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Coin {
    /// Value in sparks.
    pub value: u64,
    /// Locking script of the output.
    pub script: Vec<u8>,
    /// Height of the block that created this coin.
    pub height: u64,
    /// Whether this coin was created by a coinbase transaction.
    pub coinbase: bool,
}

impl Coin {
    /// Build the coin for `output` created by `tx` at `height`.
    pub fn from_output(output: &TxOutput, height: u64, coinbase: bool) -> Self {
        Self {
            value: output.value,
            script: output.script.clone(),
            height,
            coinbase,
        }
    }

    /// Whether this coin may be spent at `spend_height` under the given
    /// coinbase maturity. Non-coinbase coins are always spendable.
    pub fn is_mature(&self, spend_height: u64, maturity: u64) -> bool {
        if !self.coinbase {
            return true;
        }
        spend_height.saturating_sub(self.height) >= maturity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::COIN;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput::new(
                OutPoint::new(Hash256([0x11; 32]), 0),
                vec![0u8; 64],
            )],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                script: vec![0xAA; 25],
            }],
            lock_time: 0,
        }
    }

    fn sample_coinbase() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxInput::new(OutPoint::null(), b"ember".to_vec())],
            outputs: vec![TxOutput {
                value: 50 * COIN,
                script: vec![0xBB; 25],
            }],
            lock_time: 0,
        }
    }

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 1_700_000_000,
            bits: u64::MAX,
            nonce: 0,
        }
    }

    // --- Hash256 ---

    #[test]
    fn hash256_zero_detection() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!Hash256([1; 32]).is_zero());
        assert_eq!(Hash256::ZERO, Hash256::default());
    }

    #[test]
    fn hash256_display_and_hex_roundtrip() {
        let h = Hash256([0xAB; 32]);
        let s = format!("{h}");
        assert_eq!(s.len(), 64);
        assert_eq!(Hash256::from_hex(&s).unwrap(), h);
    }

    #[test]
    fn hash256_from_hex_rejects_bad_length() {
        assert!(Hash256::from_hex("abcd").is_err());
        assert!(Hash256::from_hex("zz").is_err());
    }

    // --- OutPoint ---

    #[test]
    fn outpoint_null_detection() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new(Hash256([1; 32]), 0).is_null());
    }

    #[test]
    fn outpoint_key_orders_indices() {
        let txid = Hash256([7; 32]);
        let k0 = OutPoint::new(txid, 0).key();
        let k1 = OutPoint::new(txid, 1).key();
        let k256 = OutPoint::new(txid, 256).key();
        assert!(k0 < k1);
        assert!(k1 < k256);
    }

    #[test]
    fn outpoint_display() {
        let op = OutPoint::new(Hash256([0xFF; 32]), 3);
        assert!(format!("{op}").ends_with(":3"));
    }

    // --- Transaction ---

    #[test]
    fn coinbase_detection() {
        assert!(sample_coinbase().is_coinbase());
        assert!(!sample_tx().is_coinbase());
    }

    #[test]
    fn two_null_inputs_not_coinbase() {
        let mut tx = sample_coinbase();
        tx.inputs.push(TxInput::new(OutPoint::null(), vec![]));
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn txid_deterministic_and_data_dependent() {
        let tx1 = sample_tx();
        let mut tx2 = sample_tx();
        assert_eq!(tx1.txid().unwrap(), tx1.txid().unwrap());
        tx2.lock_time = 1;
        assert_ne!(tx1.txid().unwrap(), tx2.txid().unwrap());
    }

    #[test]
    fn total_output_value_sums_and_overflows() {
        let mut tx = sample_tx();
        tx.outputs.push(TxOutput { value: 7, script: vec![] });
        assert_eq!(tx.total_output_value(), Some(50 * COIN + 7));

        tx.outputs.push(TxOutput { value: u64::MAX, script: vec![] });
        assert_eq!(tx.total_output_value(), None);
    }

    // --- BlockHeader ---

    #[test]
    fn header_hash_deterministic() {
        let h = sample_header();
        assert_eq!(h.hash(), h.hash());
    }

    #[test]
    fn header_hash_changes_with_nonce() {
        let h1 = sample_header();
        let mut h2 = h1;
        h2.nonce = 1;
        assert_ne!(h1.hash(), h2.hash());
    }

    #[test]
    fn header_hash_input_is_fixed_size() {
        let h = sample_header();
        let mut data = Vec::new();
        data.extend_from_slice(&h.version.to_le_bytes());
        data.extend_from_slice(h.prev_hash.as_bytes());
        data.extend_from_slice(h.merkle_root.as_bytes());
        data.extend_from_slice(&h.timestamp.to_le_bytes());
        data.extend_from_slice(&h.bits.to_le_bytes());
        data.extend_from_slice(&h.nonce.to_le_bytes());
        assert_eq!(data.len(), BlockHeader::HASH_SIZE);
    }

    // --- Block ---

    #[test]
    fn block_coinbase_accessor() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_coinbase(), sample_tx()],
        };
        assert!(block.coinbase().unwrap().is_coinbase());
        assert_eq!(block.txids().unwrap().len(), 2);
    }

    #[test]
    fn empty_block_has_no_coinbase() {
        let block = Block {
            header: sample_header(),
            transactions: vec![],
        };
        assert!(block.coinbase().is_none());
    }

    // --- Coin ---

    #[test]
    fn coinbase_coin_matures_at_threshold() {
        let coin = Coin {
            value: 50 * COIN,
            script: vec![],
            height: 100,
            coinbase: true,
        };
        assert!(!coin.is_mature(150, 100));
        assert!(!coin.is_mature(199, 100));
        assert!(coin.is_mature(200, 100));
        assert!(coin.is_mature(300, 100));
    }

    #[test]
    fn regular_coin_always_mature() {
        let coin = Coin {
            value: 1,
            script: vec![],
            height: 100,
            coinbase: false,
        };
        assert!(coin.is_mature(0, 100));
        assert!(coin.is_mature(100, 100));
    }

    #[test]
    fn coin_from_output_copies_context() {
        let out = TxOutput { value: 42, script: vec![1, 2, 3] };
        let coin = Coin::from_output(&out, 9, true);
        assert_eq!(coin.value, 42);
        assert_eq!(coin.script, vec![1, 2, 3]);
        assert_eq!(coin.height, 9);
        assert!(coin.coinbase);
    }

    // --- Bincode round-trips ---

    #[test]
    fn bincode_round_trip_block() {
        let block = Block {
            header: sample_header(),
            transactions: vec![sample_coinbase(), sample_tx()],
        };
        let encoded = bincode::encode_to_vec(&block, bincode::config::standard()).unwrap();
        let (decoded, _): (Block, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn bincode_round_trip_coin() {
        let coin = Coin {
            value: 50 * COIN,
            script: vec![0xCC; 25],
            height: 12345,
            coinbase: true,
        };
        let encoded = bincode::encode_to_vec(&coin, bincode::config::standard()).unwrap();
        let (decoded, _): (Coin, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(coin, decoded);
    }
}
