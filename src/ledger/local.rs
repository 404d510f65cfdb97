use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    chain::{ChainState, DisconnectOutcome},
    AnonOutput, KeyImageSpend, LedgerView,
};
use crate::{
    config::EngineConfig,
    data_structures::{
        block::ConfirmedBlock,
        output::{OutputBody, TxOutput},
        transaction::Transaction,
        types::{KeyImage, OutputRef, TxId},
    },
    errors::WalletResult,
    key_management::stealth_address::{StealthAddress, StealthOutputKeys},
    validation::ChainContext,
};

/// In-process ledger sharing one [`ChainState`] between clones
#[derive(Debug, Clone)]
pub struct LocalLedger {
    state: Arc<RwLock<ChainState>>,
}

impl LocalLedger {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState::new(config))),
        }
    }

    /// Mine a block whose coinbase pays each `(address, amount)` a plain output,
    /// followed by every valid pooled transaction.
    pub async fn mine_block(&self, payouts: &[(StealthAddress, u64)]) -> WalletResult<ConfirmedBlock> {
        let coinbase = if payouts.is_empty() {
            None
        } else {
            let outputs = payouts
                .iter()
                .enumerate()
                .map(|(n, (address, amount))| -> WalletResult<TxOutput> {
                    let keys = StealthOutputKeys::generate(address, n as u32)?;
                    Ok(TxOutput {
                        one_time_key: keys.one_time_key,
                        ephemeral_key: keys.ephemeral_key,
                        encrypted_data: Vec::new(),
                        body: OutputBody::Plain { value: *amount },
                    })
                })
                .collect::<WalletResult<Vec<_>>>()?;
            Some(Transaction::coinbase(outputs))
        };
        self.state.write().await.connect_block(coinbase)
    }

    pub async fn mine_empty_blocks(&self, count: u64) -> WalletResult<Vec<ConfirmedBlock>> {
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            blocks.push(self.mine_block(&[]).await?);
        }
        Ok(blocks)
    }

    pub async fn disconnect_tip(&self) -> WalletResult<DisconnectOutcome> {
        self.state.write().await.disconnect_tip()
    }

    pub async fn mempool_txids(&self) -> Vec<TxId> {
        self.state.read().await.mempool().txids()
    }

    pub async fn confirmation_height(&self, txid: &TxId) -> Option<u64> {
        self.state.read().await.confirmation_height(txid)
    }

    pub async fn get_mempool_transaction(&self, txid: &TxId) -> Option<Transaction> {
        self.state.read().await.mempool().get(txid).cloned()
    }
}

#[async_trait]
impl LedgerView for LocalLedger {
    async fn current_tip(&self) -> WalletResult<u64> {
        Ok(self.state.read().await.tip_height())
    }

    async fn get_block(&self, height: u64) -> WalletResult<ConfirmedBlock> {
        Ok(self.state.read().await.block(height)?.clone())
    }

    async fn get_anon_output(&self, index: u64) -> WalletResult<AnonOutput> {
        Ok(self.state.read().await.anon_index().get(index)?.clone())
    }

    async fn last_anon_index(&self) -> WalletResult<u64> {
        Ok(self.state.read().await.anon_index().last_index())
    }

    async fn lookup_anon_index(&self, outref: &OutputRef) -> WalletResult<Option<u64>> {
        Ok(self.state.read().await.anon_index().lookup(outref))
    }

    async fn sample_decoys(
        &self,
        count: usize,
        excluding: &BTreeSet<u64>,
    ) -> WalletResult<Vec<u64>> {
        Ok(self.state.read().await.sample_decoys(count, excluding)?)
    }

    async fn find_key_image(&self, key_image: &KeyImage) -> WalletResult<Option<KeyImageSpend>> {
        Ok(self.state.read().await.key_image_spend(key_image))
    }

    async fn broadcast_transaction(&self, tx: Transaction) -> WalletResult<TxId> {
        let txid = self.state.write().await.accept_to_mempool(tx)?;
        info!(txid = %txid, "transaction broadcast");
        Ok(txid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::types::PrivateKey,
        errors::{ConsistencyError, WalletError},
        ledger::ANON_INDEX_ORIGIN,
    };

    fn address() -> StealthAddress {
        StealthAddress::new(PrivateKey::random().public_key(), PrivateKey::random().public_key())
    }

    #[tokio::test]
    async fn test_genesis_only_chain() {
        let ledger = LocalLedger::new(&EngineConfig::default());
        assert_eq!(ledger.current_tip().await.unwrap(), 0);
        assert_eq!(ledger.last_anon_index().await.unwrap(), ANON_INDEX_ORIGIN - 1);
        assert!(matches!(
            ledger.disconnect_tip().await,
            Err(WalletError::Consistency(ConsistencyError::GenesisDisconnect))
        ));
        assert!(matches!(
            ledger.get_block(1).await,
            Err(WalletError::Consistency(ConsistencyError::BlockNotFound(1)))
        ));
    }

    #[tokio::test]
    async fn test_mined_blocks_link() {
        let ledger = LocalLedger::new(&EngineConfig::default());
        let first = ledger.mine_block(&[(address(), 1_000)]).await.unwrap();
        let second = ledger.mine_block(&[]).await.unwrap();
        assert_eq!(first.height(), 1);
        assert_eq!(second.block.prev_hash, first.block.hash);
        assert_eq!(first.block.transactions.len(), 1);
        assert!(first.block.transactions[0].is_coinbase());
        assert!(second.block.transactions.is_empty());

        let fetched = ledger.get_block(1).await.unwrap();
        assert_eq!(fetched, first);
    }

    #[tokio::test]
    async fn test_coinbase_cannot_be_broadcast() {
        let ledger = LocalLedger::new(&EngineConfig::default());
        let block = ledger.mine_block(&[(address(), 5)]).await.unwrap();
        let coinbase = block.block.transactions[0].clone();
        assert!(ledger.broadcast_transaction(coinbase).await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_restores_height() {
        let ledger = LocalLedger::new(&EngineConfig::default());
        ledger.mine_empty_blocks(3).await.unwrap();
        let outcome = ledger.disconnect_tip().await.unwrap();
        assert_eq!(outcome.block.height(), 3);
        assert!(outcome.withdrawn.is_empty());
        assert_eq!(ledger.current_tip().await.unwrap(), 2);
    }
}
