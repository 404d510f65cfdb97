//! Shared fixtures for the integration tests
//!
//! A [`Harness`] owns one in-process ledger and opens wallets against it.
//! Blocks are mined on the ledger and every wallet passed to the mining
//! helpers is synced afterwards, the way a node connection would notify them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anon_wallet_libs::{
    config::EngineConfig,
    data_structures::{
        block::ConfirmedBlock,
        types::{OutputRef, TxId},
    },
    ledger::LocalLedger,
    scanning::{CancellationToken, NeverCancelToken},
    storage::{
        AccountRecord, AddressRecord, KeystoreRecord, MemoryStorage, OutputFilter, OwnedOutput,
        WalletStorage, WalletTransactionRecord,
    },
    wallet::{ScanFrom, Wallet, WalletBuilder},
    StealthAddress, WalletError, WalletResult,
};
use async_trait::async_trait;

pub const COIN: u64 = 100_000_000;

pub const MNEMONIC_A: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
pub const MNEMONIC_B: &str =
    "legal winner thank year wave sausage worth useful legal winner thank yellow";
/// Twelve valid words with a bad checksum
pub const INVALID_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub config: EngineConfig,
    pub ledger: LocalLedger,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::for_testing())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let ledger = LocalLedger::new(&config);
        Self { config, ledger }
    }

    /// Wallet over fresh in-memory storage that starts watching at the tip
    pub async fn wallet(&self, phrase: &str) -> Wallet {
        self.wallet_with_storage(phrase, Arc::new(MemoryStorage::new()), ScanFrom::Tip)
            .await
    }

    pub async fn wallet_with_storage(
        &self,
        phrase: &str,
        storage: Arc<dyn WalletStorage>,
        scan_from: ScanFrom,
    ) -> Wallet {
        WalletBuilder::new()
            .with_config(self.config.clone())
            .with_ledger(Arc::new(self.ledger.clone()))
            .with_storage(storage)
            .from_mnemonic(phrase, "", scan_from)
            .build()
            .await
            .expect("wallet should build")
    }

    /// Reopen whatever account `storage` holds, as after a process restart
    pub async fn reopen(&self, storage: Arc<dyn WalletStorage>) -> Wallet {
        WalletBuilder::new()
            .with_config(self.config.clone())
            .with_ledger(Arc::new(self.ledger.clone()))
            .with_storage(storage)
            .build()
            .await
            .expect("wallet should reopen")
    }

    /// Mine a block with pooled transactions and sync `wallets`
    pub async fn mine(&self, wallets: &[&Wallet]) -> ConfirmedBlock {
        let block = self.ledger.mine_block(&[]).await.expect("block should connect");
        sync_all(wallets).await;
        block
    }

    /// Mine a block whose coinbase pays `amount` to `address`, then sync `wallets`
    pub async fn mine_to(
        &self,
        address: &StealthAddress,
        amount: u64,
        wallets: &[&Wallet],
    ) -> ConfirmedBlock {
        let block = self
            .ledger
            .mine_block(&[(address.clone(), amount)])
            .await
            .expect("block should connect");
        sync_all(wallets).await;
        block
    }
}

pub async fn sync_all(wallets: &[&Wallet]) {
    for wallet in wallets {
        wallet
            .sync(&NeverCancelToken)
            .await
            .expect("sync should succeed");
    }
}

/// Address at index 0, which receives change
pub async fn change_address(wallet: &Wallet) -> StealthAddress {
    wallet.list_addresses().await[0].address.clone()
}

/// Cancels after letting a fixed number of checks pass
#[derive(Debug)]
pub struct CountdownToken {
    remaining: AtomicUsize,
}

impl CountdownToken {
    pub fn new(checks: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(checks),
        }
    }
}

impl CancellationToken for CountdownToken {
    fn is_cancelled(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn cancel(&self) {
        self.remaining.store(0, Ordering::SeqCst);
    }
}

/// Memory storage whose key store and lock writes can be made to fail
#[derive(Debug, Clone, Default)]
pub struct FlakyStorage {
    inner: MemoryStorage,
    failing: Arc<AtomicBool>,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> WalletResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WalletError::StorageError("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl WalletStorage for FlakyStorage {
    async fn initialize(&self) -> WalletResult<()> {
        self.inner.initialize().await
    }

    async fn save_account(&self, account: &AccountRecord) -> WalletResult<()> {
        self.inner.save_account(account).await
    }

    async fn get_account(&self) -> WalletResult<Option<AccountRecord>> {
        self.inner.get_account().await
    }

    async fn save_address(&self, address: &AddressRecord) -> WalletResult<()> {
        self.inner.save_address(address).await
    }

    async fn get_addresses(&self, account_id: &str) -> WalletResult<Vec<AddressRecord>> {
        self.inner.get_addresses(account_id).await
    }

    async fn save_keystore(&self, record: &KeystoreRecord) -> WalletResult<()> {
        self.check()?;
        self.inner.save_keystore(record).await
    }

    async fn get_keystore(&self) -> WalletResult<Option<KeystoreRecord>> {
        self.inner.get_keystore().await
    }

    async fn save_output(&self, output: &OwnedOutput) -> WalletResult<()> {
        self.inner.save_output(output).await
    }

    async fn get_output(&self, outref: &OutputRef) -> WalletResult<Option<OwnedOutput>> {
        self.inner.get_output(outref).await
    }

    async fn get_output_by_anon_index(&self, index: u64) -> WalletResult<Option<OwnedOutput>> {
        self.inner.get_output_by_anon_index(index).await
    }

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<OwnedOutput>> {
        self.inner.get_outputs(filter).await
    }

    async fn delete_output(&self, outref: &OutputRef) -> WalletResult<bool> {
        self.inner.delete_output(outref).await
    }

    async fn delete_outputs_from_height(&self, height: u64) -> WalletResult<usize> {
        self.inner.delete_outputs_from_height(height).await
    }

    async fn set_permanent_lock(&self, outref: &OutputRef, locked: bool) -> WalletResult<()> {
        self.check()?;
        self.inner.set_permanent_lock(outref, locked).await
    }

    async fn get_permanent_locks(&self) -> WalletResult<Vec<OutputRef>> {
        self.inner.get_permanent_locks().await
    }

    async fn set_scanned_height(&self, height: Option<u64>) -> WalletResult<()> {
        self.inner.set_scanned_height(height).await
    }

    async fn get_scanned_height(&self) -> WalletResult<Option<u64>> {
        self.inner.get_scanned_height().await
    }

    async fn save_transaction(&self, record: &WalletTransactionRecord) -> WalletResult<()> {
        self.inner.save_transaction(record).await
    }

    async fn get_transaction(&self, txid: &TxId) -> WalletResult<Option<WalletTransactionRecord>> {
        self.inner.get_transaction(txid).await
    }

    async fn get_transactions(&self) -> WalletResult<Vec<WalletTransactionRecord>> {
        self.inner.get_transactions().await
    }
}
