use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::hash::{hash_256, DOMAIN_BLOCK},
    data_structures::{
        output::{OutputKind, TxOutput},
        transaction::Transaction,
        types::{OutputRef, TxId},
    },
    errors::SerializationError,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub height: u64,
    pub hash: [u8; 32],
    pub prev_hash: [u8; 32],
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Empty block at height zero
    pub fn genesis() -> Self {
        Self {
            height: 0,
            hash: hash_256(DOMAIN_BLOCK, &[b"genesis"]),
            prev_hash: [0u8; 32],
            transactions: Vec::new(),
        }
    }

    pub fn new(
        height: u64,
        prev_hash: [u8; 32],
        transactions: Vec<Transaction>,
    ) -> Result<Self, SerializationError> {
        let mut txids = Vec::with_capacity(transactions.len() * 32);
        for tx in &transactions {
            txids.extend_from_slice(&tx.txid()?.0);
        }
        let hash = hash_256(DOMAIN_BLOCK, &[&height.to_le_bytes(), &prev_hash, &txids]);
        Ok(Self {
            height,
            hash,
            prev_hash,
            transactions,
        })
    }
}

/// A block together with the first anonymity-set index it assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedBlock {
    pub block: Block,
    /// Index the block's first anonymous output received. Subsequent
    /// anonymous outputs follow in transaction then output order.
    pub anon_index_start: u64,
}

/// One output of a confirmed block with its position in the chain
#[derive(Debug, Clone)]
pub struct PositionedOutput<'a> {
    pub outref: OutputRef,
    pub output: &'a TxOutput,
    pub height: u64,
    /// Only set for anonymous outputs
    pub anon_index: Option<u64>,
}

impl ConfirmedBlock {
    pub fn height(&self) -> u64 {
        self.block.height
    }

    pub fn txids(&self) -> Result<Vec<TxId>, SerializationError> {
        self.block.transactions.iter().map(|tx| tx.txid()).collect()
    }

    /// Every output in canonical order with its derived anonymity index
    pub fn positioned_outputs(&self) -> Result<Vec<PositionedOutput<'_>>, SerializationError> {
        let mut next_index = self.anon_index_start;
        let mut outputs = Vec::new();
        for tx in &self.block.transactions {
            let txid = tx.txid()?;
            for (vout, output) in tx.outputs.iter().enumerate() {
                let anon_index = if output.kind() == OutputKind::Anonymous {
                    let index = next_index;
                    next_index += 1;
                    Some(index)
                } else {
                    None
                };
                outputs.push(PositionedOutput {
                    outref: OutputRef::new(txid, vout as u32),
                    output,
                    height: self.block.height,
                    anon_index,
                });
            }
        }
        Ok(outputs)
    }
}
