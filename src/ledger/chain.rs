//! In-memory chain state: blocks, anonymity index, key images, spendable
//! prevouts and the mempool, with per-block undo data for reorgs.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use super::{
    anon_index::{AnonIndex, AnonOutput, ANON_INDEX_ORIGIN},
    mempool::Mempool,
    KeyImageSpend, UtxoEntry,
};
use crate::{
    config::EngineConfig,
    data_structures::{
        block::{Block, ConfirmedBlock},
        output::OutputKind,
        transaction::Transaction,
        types::{KeyImage, OutputRef, PublicKey, TxId},
    },
    errors::{ConsistencyError, ResourceError, ValidationError, WalletResult},
    validation::{ChainContext, TransactionValidator},
};

/// What a block changed, replayed backwards on disconnect
#[derive(Debug, Default)]
struct BlockUndo {
    spent: Vec<(OutputRef, UtxoEntry)>,
    created: Vec<OutputRef>,
    key_images: Vec<KeyImage>,
}

/// Result of removing the tip block
#[derive(Debug, Clone)]
pub struct DisconnectOutcome {
    pub block: ConfirmedBlock,
    /// Anonymous outputs whose indices were withdrawn
    pub withdrawn: Vec<AnonOutput>,
    /// Transactions of the block that went back to the mempool
    pub returned: Vec<TxId>,
    /// Transactions dropped because they no longer validate
    pub evicted: Vec<TxId>,
}

#[derive(Debug)]
pub struct ChainState {
    validator: TransactionValidator,
    blocks: Vec<ConfirmedBlock>,
    undo: Vec<BlockUndo>,
    anon_index: AnonIndex,
    key_images: HashMap<KeyImage, KeyImageSpend>,
    utxos: HashMap<OutputRef, UtxoEntry>,
    confirmed_txids: HashMap<TxId, u64>,
    mempool: Mempool,
}

impl ChainContext for ChainState {
    fn anon_output(&self, index: u64) -> Result<&AnonOutput, ConsistencyError> {
        self.anon_index.get(index)
    }

    fn is_anon_key_known(&self, one_time_key: &PublicKey) -> bool {
        self.anon_index.contains_key(one_time_key)
    }

    fn prevout(&self, outref: &OutputRef) -> Option<&UtxoEntry> {
        self.utxos.get(outref)
    }

    fn key_image_spend(&self, key_image: &KeyImage) -> Option<KeyImageSpend> {
        self.key_images.get(key_image).copied()
    }

    fn mempool_spender(&self, key_image: &KeyImage) -> Option<TxId> {
        self.mempool.spender_of(key_image)
    }
}

impl ChainState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            validator: TransactionValidator::from_config(config),
            blocks: vec![ConfirmedBlock {
                block: Block::genesis(),
                anon_index_start: ANON_INDEX_ORIGIN,
            }],
            undo: vec![BlockUndo::default()],
            anon_index: AnonIndex::new(),
            key_images: HashMap::new(),
            utxos: HashMap::new(),
            confirmed_txids: HashMap::new(),
            mempool: Mempool::new(),
        }
    }

    pub fn tip_height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    pub fn block(&self, height: u64) -> Result<&ConfirmedBlock, ConsistencyError> {
        self.blocks
            .get(height as usize)
            .ok_or(ConsistencyError::BlockNotFound(height))
    }

    pub fn anon_index(&self) -> &AnonIndex {
        &self.anon_index
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn confirmation_height(&self, txid: &TxId) -> Option<u64> {
        self.confirmed_txids.get(txid).copied()
    }

    /// Validate against chain and pool, then queue for the next block
    pub fn accept_to_mempool(&mut self, tx: Transaction) -> WalletResult<TxId> {
        let txid = tx.txid()?;
        if self.mempool.contains(&txid) || self.confirmed_txids.contains_key(&txid) {
            return Err(ValidationError::AlreadyKnown(txid).into());
        }
        self.validator.validate(&tx, self, true)?;
        debug!(txid = %txid, "accepted to mempool");
        self.mempool.insert(txid, tx);
        Ok(txid)
    }

    /// Connect a block holding `coinbase` (if any) and every pooled
    /// transaction that still validates, in arrival order.
    pub fn connect_block(&mut self, coinbase: Option<Transaction>) -> WalletResult<ConfirmedBlock> {
        let height = self.tip_height() + 1;
        let prev_hash = self.blocks[self.blocks.len() - 1].block.hash;
        let anon_index_start = self.anon_index.next_index();
        let mut undo = BlockUndo::default();
        let mut included = Vec::new();

        if let Some(coinbase) = coinbase {
            if !coinbase.is_coinbase() {
                return Err(ValidationError::Malformed("coinbase carries inputs".to_string()).into());
            }
            let txid = coinbase.txid()?;
            self.apply_transaction(txid, &coinbase, height, &mut undo)?;
            included.push(coinbase);
        }

        for (txid, tx) in self.mempool.drain() {
            match self.validator.validate(&tx, self, false) {
                Ok(_) => {
                    self.apply_transaction(txid, &tx, height, &mut undo)?;
                    included.push(tx);
                }
                Err(e) => warn!(txid = %txid, error = %e, "dropping transaction from block template"),
            }
        }

        let confirmed = ConfirmedBlock {
            block: Block::new(height, prev_hash, included)?,
            anon_index_start,
        };
        info!(
            height,
            transactions = confirmed.block.transactions.len(),
            anon_outputs = self.anon_index.next_index() - anon_index_start,
            "connected block"
        );
        self.blocks.push(confirmed.clone());
        self.undo.push(undo);
        Ok(confirmed)
    }

    fn apply_transaction(
        &mut self,
        txid: TxId,
        tx: &Transaction,
        height: u64,
        undo: &mut BlockUndo,
    ) -> WalletResult<()> {
        for input in &tx.inputs {
            if let Some(outref) = input.source.prevout() {
                if let Some(entry) = self.utxos.remove(outref) {
                    undo.spent.push((*outref, entry));
                }
            }
            self.key_images
                .insert(input.key_image, KeyImageSpend { txid, height });
            undo.key_images.push(input.key_image);
        }

        for (vout, output) in tx.outputs.iter().enumerate() {
            let outref = OutputRef::new(txid, vout as u32);
            match output.kind() {
                OutputKind::Anonymous => {
                    self.anon_index
                        .append(outref, output.one_time_key, output.commitment(), height)?;
                }
                kind => {
                    self.utxos.insert(
                        outref,
                        UtxoEntry {
                            kind,
                            one_time_key: output.one_time_key,
                            commitment: output.commitment(),
                            height,
                        },
                    );
                    undo.created.push(outref);
                }
            }
        }
        self.confirmed_txids.insert(txid, height);
        Ok(())
    }

    /// Remove the tip block. Its indices and key images are withdrawn and its
    /// transactions return to the mempool when they still validate; pooled
    /// transactions referencing withdrawn indices are evicted.
    pub fn disconnect_tip(&mut self) -> WalletResult<DisconnectOutcome> {
        if self.blocks.len() <= 1 {
            return Err(ConsistencyError::GenesisDisconnect.into());
        }
        let (Some(block), Some(undo)) = (self.blocks.pop(), self.undo.pop()) else {
            return Err(ConsistencyError::GenesisDisconnect.into());
        };

        let withdrawn = self.anon_index.rollback_to(block.anon_index_start);
        for key_image in &undo.key_images {
            self.key_images.remove(key_image);
        }
        for outref in &undo.created {
            self.utxos.remove(outref);
        }
        for (outref, entry) in undo.spent {
            self.utxos.insert(outref, entry);
        }

        let mut candidates = Vec::new();
        for tx in &block.block.transactions {
            let txid = tx.txid()?;
            self.confirmed_txids.remove(&txid);
            if !tx.is_coinbase() {
                candidates.push((txid, tx.clone()));
            }
        }
        let returned_ids: Vec<TxId> = candidates.iter().map(|(id, _)| *id).collect();
        candidates.extend(self.mempool.drain());

        let mut returned = Vec::new();
        let mut evicted = Vec::new();
        for (txid, tx) in candidates {
            match self.validator.validate(&tx, self, true) {
                Ok(_) => {
                    if returned_ids.contains(&txid) {
                        returned.push(txid);
                    }
                    self.mempool.insert(txid, tx);
                }
                Err(e) => {
                    warn!(txid = %txid, error = %e, "evicting transaction after disconnect");
                    evicted.push(txid);
                }
            }
        }

        info!(
            height = block.block.height,
            withdrawn = withdrawn.len(),
            evicted = evicted.len(),
            "disconnected block"
        );
        Ok(DisconnectOutcome {
            block,
            withdrawn,
            returned,
            evicted,
        })
    }

    pub fn sample_decoys(
        &self,
        count: usize,
        excluding: &BTreeSet<u64>,
    ) -> Result<Vec<u64>, ResourceError> {
        self.anon_index
            .sample_decoys(count, excluding, &mut rand::rngs::OsRng)
    }
}
