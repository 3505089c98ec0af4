//! In-memory UTXO overlay used while validating a block.
//!
//! A [`CoinView`] caches coins read from a backing source and buffers the
//! spends and creations a candidate block performs. Nothing touches the
//! database until the chain layer decides the block connects, at which
//! point the view is flushed as one atomic batch together with the
//! [`BlockUndo`] needed to revert it.

use std::collections::HashMap;

use ember_core::error::{ConsensusError, EmberError};
use ember_core::types::{Coin, OutPoint, Transaction};

/// Read access to the committed UTXO set.
pub trait CoinSource {
    /// Look up an unspent coin. Returns `None` if spent or unknown.
    fn read_coin(&self, outpoint: &OutPoint) -> Result<Option<Coin>, EmberError>;
}

/// Undo data for reverting a connected block.
///
/// Stores the coins consumed by the block's transactions, in spend order,
/// so disconnection can restore them.
#[derive(bincode::Encode, bincode::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUndo {
    /// Spent coins in the order they were consumed.
    pub spent: Vec<(OutPoint, Coin)>,
}

/// Cached overlay entry: `None` marks a coin spent within this view.
type Slot = Option<Coin>;

/// Buffered UTXO changes for one candidate block.
pub struct CoinView {
    /// Overlay on top of the backing source. Holds both plain read-through
    /// entries and this view's own spends and creations.
    cache: HashMap<OutPoint, Slot>,
    /// Outpoints created by this view, in creation order.
    created: Vec<OutPoint>,
    /// Coins spent through this view, for undo.
    undo: BlockUndo,
}

impl CoinView {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            created: Vec::new(),
            undo: BlockUndo::default(),
        }
    }

    /// Look up a coin through the overlay, falling back to `source`.
    pub fn get(
        &mut self,
        source: &dyn CoinSource,
        outpoint: &OutPoint,
    ) -> Result<Option<Coin>, EmberError> {
        if let Some(slot) = self.cache.get(outpoint) {
            return Ok(slot.clone());
        }
        let coin = source.read_coin(outpoint)?;
        self.cache.insert(*outpoint, coin.clone());
        Ok(coin)
    }

    /// Spend a coin, recording it for undo.
    ///
    /// Fails with `bad-txns-inputs-missingorspent` if the coin is unknown
    /// or already spent (in the committed set or earlier in this view).
    pub fn spend(
        &mut self,
        source: &dyn CoinSource,
        outpoint: &OutPoint,
    ) -> Result<Coin, EmberError> {
        let coin = self
            .get(source, outpoint)?
            .ok_or(ConsensusError::InputsMissingOrSpent)?;
        self.cache.insert(*outpoint, None);
        self.undo.spent.push((*outpoint, coin.clone()));
        Ok(coin)
    }

    /// Add all outputs of `tx` as fresh coins at `height`.
    pub fn add_tx(&mut self, tx: &Transaction, height: u64) -> Result<(), EmberError> {
        let txid = tx.txid()?;
        let coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            let outpoint = OutPoint {
                txid,
                index: index as u32,
            };
            self.cache
                .insert(outpoint, Some(Coin::from_output(output, height, coinbase)));
            self.created.push(outpoint);
        }
        Ok(())
    }

    /// Coins spent through this view so far.
    pub fn undo(&self) -> &BlockUndo {
        &self.undo
    }

    /// Consume the view into the coins to persist and the undo data.
    ///
    /// The first element holds the created coins that were not re-spent
    /// within the view itself; a coin created and spent by the same block
    /// never reaches the committed set (it still appears in the undo's
    /// spend list, balancing out on disconnect).
    pub fn into_parts(mut self) -> (Vec<(OutPoint, Coin)>, BlockUndo) {
        let mut alive = Vec::with_capacity(self.created.len());
        for outpoint in self.created {
            if let Some(Some(coin)) = self.cache.remove(&outpoint) {
                alive.push((outpoint, coin));
            }
        }
        (alive, self.undo)
    }
}

impl Default for CoinView {
    fn default() -> Self {
        Self::new()
    }
}
