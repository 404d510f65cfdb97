//! Base ledger interface and an in-process implementation
//!
//! The wallet only ever talks to the chain through [`LedgerView`]. The
//! [`LocalLedger`] implements it in memory: it validates transactions on
//! mempool admission and block connection, assigns anonymity-set indices at
//! confirmation and can disconnect its tip to exercise reorganizations.

pub mod anon_index;
pub mod chain;
pub mod local;
pub mod mempool;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    data_structures::{
        block::ConfirmedBlock,
        output::OutputKind,
        transaction::Transaction,
        types::{Commitment, KeyImage, OutputRef, PublicKey, TxId},
    },
    errors::WalletResult,
};

pub use anon_index::{AnonIndex, AnonOutput, ANON_INDEX_ORIGIN};
pub use chain::{ChainState, DisconnectOutcome};
pub use local::LocalLedger;

/// Unspent plain or confidential output known to the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub kind: OutputKind,
    pub one_time_key: PublicKey,
    pub commitment: Commitment,
    pub height: u64,
}

/// Where a key image was spent on chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyImageSpend {
    pub txid: TxId,
    pub height: u64,
}

/// Read and broadcast access to the base ledger
#[async_trait]
pub trait LedgerView: Send + Sync {
    /// Height of the best block; the genesis block is height 0
    async fn current_tip(&self) -> WalletResult<u64>;

    async fn get_block(&self, height: u64) -> WalletResult<ConfirmedBlock>;

    /// Fails with `IndexNotFound` outside `[ANON_INDEX_ORIGIN, last_anon_index]`
    async fn get_anon_output(&self, index: u64) -> WalletResult<AnonOutput>;

    /// Highest assigned index; `ANON_INDEX_ORIGIN - 1` while the set is empty
    async fn last_anon_index(&self) -> WalletResult<u64>;

    async fn lookup_anon_index(&self, outref: &OutputRef) -> WalletResult<Option<u64>>;

    async fn sample_decoys(&self, count: usize, excluding: &BTreeSet<u64>)
        -> WalletResult<Vec<u64>>;

    async fn find_key_image(&self, key_image: &KeyImage) -> WalletResult<Option<KeyImageSpend>>;

    async fn broadcast_transaction(&self, tx: Transaction) -> WalletResult<TxId>;
}
