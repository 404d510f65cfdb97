//! Validation module for confidential and anonymous transactions
//!
//! [`TransactionValidator`] holds the rule set; the chain it is checked
//! against is abstracted by [`ChainContext`] so the same rules run on mempool
//! admission, on block connection and in tests against a hand built chain.

pub mod transaction;

pub use transaction::TransactionValidator;

use crate::{
    data_structures::types::{KeyImage, OutputRef, PublicKey, TxId},
    errors::ConsistencyError,
    ledger::{anon_index::AnonOutput, KeyImageSpend, UtxoEntry},
};

/// Read access to the chain state a transaction is validated against
pub trait ChainContext {
    fn anon_output(&self, index: u64) -> Result<&AnonOutput, ConsistencyError>;

    fn is_anon_key_known(&self, one_time_key: &PublicKey) -> bool;

    /// Unspent plain or confidential output
    fn prevout(&self, outref: &OutputRef) -> Option<&UtxoEntry>;

    fn key_image_spend(&self, key_image: &KeyImage) -> Option<KeyImageSpend>;

    fn mempool_spender(&self, key_image: &KeyImage) -> Option<TxId>;
}
