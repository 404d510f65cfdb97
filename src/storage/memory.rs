//! In-memory storage backend
//!
//! Clones share the same maps, so dropping a wallet and opening a new one on a
//! clone behaves like a process restart against a persistent store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    storage_trait::{
        AccountRecord, AddressRecord, KeystoreRecord, OutputFilter, WalletStorage,
        WalletTransactionRecord,
    },
    stored_output::OwnedOutput,
};
use crate::{
    data_structures::types::{OutputRef, TxId},
    errors::{WalletError, WalletResult},
};

#[derive(Debug, Default)]
struct MemoryState {
    account: Option<AccountRecord>,
    addresses: BTreeMap<u32, AddressRecord>,
    keystore: Option<KeystoreRecord>,
    outputs: HashMap<OutputRef, OwnedOutput>,
    anon_lookup: HashMap<u64, OutputRef>,
    permanent_locks: BTreeSet<OutputRef>,
    scanned_height: Option<u64>,
    transactions: Vec<WalletTransactionRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> WalletResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| WalletError::StorageError("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl WalletStorage for MemoryStorage {
    async fn initialize(&self) -> WalletResult<()> {
        Ok(())
    }

    async fn save_account(&self, account: &AccountRecord) -> WalletResult<()> {
        self.lock()?.account = Some(account.clone());
        Ok(())
    }

    async fn get_account(&self) -> WalletResult<Option<AccountRecord>> {
        Ok(self.lock()?.account.clone())
    }

    async fn save_address(&self, address: &AddressRecord) -> WalletResult<()> {
        self.lock()?.addresses.insert(address.index, address.clone());
        Ok(())
    }

    async fn get_addresses(&self, account_id: &str) -> WalletResult<Vec<AddressRecord>> {
        Ok(self
            .lock()?
            .addresses
            .values()
            .filter(|a| a.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn save_keystore(&self, record: &KeystoreRecord) -> WalletResult<()> {
        self.lock()?.keystore = Some(record.clone());
        Ok(())
    }

    async fn get_keystore(&self) -> WalletResult<Option<KeystoreRecord>> {
        Ok(self.lock()?.keystore.clone())
    }

    async fn save_output(&self, output: &OwnedOutput) -> WalletResult<()> {
        let mut state = self.lock()?;
        if let Some(previous) = state.outputs.get(&output.outref).and_then(|o| o.anon_index) {
            state.anon_lookup.remove(&previous);
        }
        if let Some(index) = output.anon_index {
            state.anon_lookup.insert(index, output.outref);
        }
        state.outputs.insert(output.outref, output.clone());
        Ok(())
    }

    async fn get_output(&self, outref: &OutputRef) -> WalletResult<Option<OwnedOutput>> {
        Ok(self.lock()?.outputs.get(outref).cloned())
    }

    async fn get_output_by_anon_index(&self, index: u64) -> WalletResult<Option<OwnedOutput>> {
        let state = self.lock()?;
        Ok(state
            .anon_lookup
            .get(&index)
            .and_then(|outref| state.outputs.get(outref))
            .cloned())
    }

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<OwnedOutput>> {
        let state = self.lock()?;
        let filter = filter.unwrap_or_default();
        let mut outputs: Vec<OwnedOutput> = state
            .outputs
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        outputs.sort_by(|a, b| {
            a.height
                .unwrap_or(u64::MAX)
                .cmp(&b.height.unwrap_or(u64::MAX))
                .then(a.outref.cmp(&b.outref))
        });
        if let Some(limit) = filter.limit {
            outputs.truncate(limit);
        }
        Ok(outputs)
    }

    async fn delete_output(&self, outref: &OutputRef) -> WalletResult<bool> {
        let mut state = self.lock()?;
        match state.outputs.remove(outref) {
            Some(output) => {
                if let Some(index) = output.anon_index {
                    state.anon_lookup.remove(&index);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_outputs_from_height(&self, height: u64) -> WalletResult<usize> {
        let mut state = self.lock()?;
        let doomed: Vec<OutputRef> = state
            .outputs
            .values()
            .filter(|o| o.height.map_or(true, |h| h >= height))
            .map(|o| o.outref)
            .collect();
        for outref in &doomed {
            if let Some(index) = state.outputs.remove(outref).and_then(|o| o.anon_index) {
                state.anon_lookup.remove(&index);
            }
        }
        Ok(doomed.len())
    }

    async fn set_permanent_lock(&self, outref: &OutputRef, locked: bool) -> WalletResult<()> {
        let mut state = self.lock()?;
        if locked {
            state.permanent_locks.insert(*outref);
        } else {
            state.permanent_locks.remove(outref);
        }
        Ok(())
    }

    async fn get_permanent_locks(&self) -> WalletResult<Vec<OutputRef>> {
        Ok(self.lock()?.permanent_locks.iter().copied().collect())
    }

    async fn set_scanned_height(&self, height: Option<u64>) -> WalletResult<()> {
        self.lock()?.scanned_height = height;
        Ok(())
    }

    async fn get_scanned_height(&self) -> WalletResult<Option<u64>> {
        Ok(self.lock()?.scanned_height)
    }

    async fn save_transaction(&self, record: &WalletTransactionRecord) -> WalletResult<()> {
        let mut state = self.lock()?;
        match state.transactions.iter_mut().find(|t| t.txid == record.txid) {
            Some(existing) => *existing = record.clone(),
            None => state.transactions.push(record.clone()),
        }
        Ok(())
    }

    async fn get_transaction(&self, txid: &TxId) -> WalletResult<Option<WalletTransactionRecord>> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .find(|t| &t.txid == txid)
            .cloned())
    }

    async fn get_transactions(&self) -> WalletResult<Vec<WalletTransactionRecord>> {
        Ok(self.lock()?.transactions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_structures::{
            output::OutputKind,
            types::{Commitment, PublicKey},
        },
        storage::{
            output_status::OutputStatus,
            storage_trait::{TransactionCategory, TransactionState},
        },
    };

    pub(crate) fn output(vout: u32, height: Option<u64>, anon_index: Option<u64>) -> OwnedOutput {
        OwnedOutput {
            outref: OutputRef::new(TxId([vout as u8; 32]), vout),
            kind: if anon_index.is_some() {
                OutputKind::Anonymous
            } else {
                OutputKind::Confidential
            },
            amount: Some(100 * (vout as u64 + 1)),
            blinding: Some([0u8; 32]),
            one_time_key: PublicKey([vout as u8; 32]),
            ephemeral_key: PublicKey([0u8; 32]),
            commitment: Commitment([0u8; 32]),
            key_tweak: [0u8; 32],
            encrypted_data: vec![],
            address_index: vout % 2,
            anon_index,
            height,
            status: if height.is_some() {
                OutputStatus::Unspent
            } else {
                OutputStatus::Unconfirmed
            },
            spent_in: None,
            spent_height: None,
            key_image: None,
        }
    }

    #[tokio::test]
    async fn test_output_lookup_by_anon_index() {
        let storage = MemoryStorage::new();
        let out = output(1, Some(5), Some(42));
        storage.save_output(&out).await.unwrap();
        assert_eq!(storage.get_output_by_anon_index(42).await.unwrap(), Some(out.clone()));
        assert!(storage.delete_output(&out.outref).await.unwrap());
        assert!(storage.get_output_by_anon_index(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_from_height_includes_unconfirmed() {
        let storage = MemoryStorage::new();
        storage.save_output(&output(1, Some(3), None)).await.unwrap();
        storage.save_output(&output(2, Some(7), Some(1))).await.unwrap();
        storage.save_output(&output(3, None, None)).await.unwrap();
        assert_eq!(storage.delete_outputs_from_height(5).await.unwrap(), 2);
        let remaining = storage.get_outputs(None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].height, Some(3));
        assert!(storage.get_output_by_anon_index(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_filters() {
        let storage = MemoryStorage::new();
        for vout in 0..6 {
            storage
                .save_output(&output(vout, Some(vout as u64 + 1), None))
                .await
                .unwrap();
        }
        let filtered = storage
            .get_outputs(Some(
                OutputFilter::new()
                    .with_height_range(2, 5)
                    .with_address_indices(vec![1]),
            ))
            .await
            .unwrap();
        assert_eq!(
            filtered.iter().map(|o| o.outref.vout).collect::<Vec<_>>(),
            vec![1, 3]
        );
        let limited = storage
            .get_outputs(Some(OutputFilter::new().with_limit(2)))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let storage = MemoryStorage::new();
        let reopened = storage.clone();
        let outref = OutputRef::new(TxId([1u8; 32]), 0);
        storage.set_permanent_lock(&outref, true).await.unwrap();
        storage.set_scanned_height(Some(9)).await.unwrap();
        assert_eq!(reopened.get_permanent_locks().await.unwrap(), vec![outref]);
        assert_eq!(reopened.get_scanned_height().await.unwrap(), Some(9));
        reopened.set_permanent_lock(&outref, false).await.unwrap();
        assert!(storage.get_permanent_locks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_upsert() {
        let storage = MemoryStorage::new();
        let mut record = WalletTransactionRecord {
            txid: TxId([3u8; 32]),
            category: TransactionCategory::Send,
            input_kind: Some(OutputKind::Anonymous),
            output_kinds: vec![OutputKind::Anonymous],
            amount: 10,
            fee: 1,
            comment: Some("rent".to_string()),
            height: None,
            state: TransactionState::Pending,
            rings: vec![vec![1, 2, 3]],
            spent_outputs: vec![OutputRef::new(TxId([1u8; 32]), 0)],
        };
        storage.save_transaction(&record).await.unwrap();
        record.state = TransactionState::Confirmed;
        record.height = Some(4);
        storage.save_transaction(&record).await.unwrap();
        let all = storage.get_transactions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].state, TransactionState::Confirmed);
    }
}
