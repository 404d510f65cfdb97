use std::collections::HashMap;

use crate::data_structures::{
    transaction::Transaction,
    types::{KeyImage, TxId},
};

/// Transactions waiting for a block, in arrival order
#[derive(Debug, Default, Clone)]
pub struct Mempool {
    entries: Vec<(TxId, Transaction)>,
    key_images: HashMap<KeyImage, TxId>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.iter().any(|(id, _)| id == txid)
    }

    /// Pending transaction spending `key_image`, if any
    pub fn spender_of(&self, key_image: &KeyImage) -> Option<TxId> {
        self.key_images.get(key_image).copied()
    }

    pub fn insert(&mut self, txid: TxId, tx: Transaction) {
        for key_image in tx.key_images() {
            self.key_images.insert(*key_image, txid);
        }
        self.entries.push((txid, tx));
    }

    pub fn remove(&mut self, txid: &TxId) -> Option<Transaction> {
        let position = self.entries.iter().position(|(id, _)| id == txid)?;
        let (_, tx) = self.entries.remove(position);
        for key_image in tx.key_images() {
            self.key_images.remove(key_image);
        }
        Some(tx)
    }

    /// Remove and return everything, oldest first
    pub fn drain(&mut self) -> Vec<(TxId, Transaction)> {
        self.key_images.clear();
        std::mem::take(&mut self.entries)
    }

    pub fn txids(&self) -> Vec<TxId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    pub fn get(&self, txid: &TxId) -> Option<&Transaction> {
        self.entries
            .iter()
            .find_map(|(id, tx)| (id == txid).then_some(tx))
    }
}
