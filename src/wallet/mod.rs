//! Wallet facade over key store, storage and ledger
//!
//! A [`Wallet`] owns one account derived from a mnemonic. All state changes,
//! whether they come from a send request or from chain and mempool
//! notifications, run under a single async mutex so a send can select, reserve,
//! build and broadcast without another task observing a half-applied state.

pub mod builder;
pub mod keystore;
mod send;
mod sync;
pub mod types;
pub mod utxo_tracker;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

pub use builder::{WalletBuildError, WalletBuilder};
pub use keystore::KeyStore;
pub use types::{
    AddressInfo, EncryptionStatus, LockedOutput, ScanFrom, UnspentFilter, UnspentOutput,
    WalletInfo,
};
pub use utxo_tracker::UtxoTracker;

use crate::{
    config::{EngineConfig, ScanPolicy},
    data_structures::{
        output::OutputKind,
        types::{OutputRef, PrivateKey},
    },
    errors::{StateError, WalletError, WalletResult},
    events::{EventDispatcher, EventListener},
    key_management::{
        derivation::AccountKeys, mnemonic::mnemonic_to_seed, stealth_address::StealthAddress,
    },
    ledger::LedgerView,
    scanning::{NeverCancelToken, OutputScanner, ScanKey},
    storage::{AccountRecord, AddressRecord, OutputStatus, WalletStorage, WalletTransactionRecord},
};

/// Address index receiving change; user addresses start after it
pub const CHANGE_ADDRESS_INDEX: u32 = 0;

struct WalletState {
    account: Option<AccountRecord>,
    addresses: BTreeMap<u32, AddressRecord>,
    keystore: KeyStore,
    scanner: OutputScanner,
    tracker: UtxoTracker,
    events: EventDispatcher,
}

impl WalletState {
    fn account(&self) -> WalletResult<&AccountRecord> {
        self.account.as_ref().ok_or_else(|| StateError::NoAccount.into())
    }

    fn address_of(&self, index: u32) -> Option<StealthAddress> {
        self.addresses
            .get(&index)
            .map(|record| StealthAddress::new(record.scan_pubkey, record.spend_pubkey))
    }

    fn index_of(&self, address: &StealthAddress) -> Option<u32> {
        self.addresses
            .values()
            .find(|record| {
                record.scan_pubkey == address.scan_pubkey
                    && record.spend_pubkey == address.spend_pubkey
            })
            .map(|record| record.index)
    }
}

fn address_record(
    keys: &AccountKeys,
    account_id: &str,
    index: u32,
    label: Option<String>,
    is_change: bool,
) -> WalletResult<AddressRecord> {
    let address_keys = keys.address_keys(index)?;
    Ok(AddressRecord {
        account_id: account_id.to_string(),
        index,
        label,
        scan_secret: address_keys.scan.to_bytes(),
        scan_pubkey: address_keys.scan.public_key(),
        spend_pubkey: address_keys.spend.public_key(),
        is_change,
    })
}

fn scan_key(record: &AddressRecord) -> WalletResult<ScanKey> {
    Ok(ScanKey {
        address_index: record.index,
        scan: PrivateKey::from_canonical_bytes(record.scan_secret)?,
        spend_pubkey: record.spend_pubkey,
    })
}

pub struct Wallet {
    config: EngineConfig,
    storage: Arc<dyn WalletStorage>,
    ledger: Arc<dyn LedgerView>,
    state: Mutex<WalletState>,
}

impl Wallet {
    /// Open the wallet persisted in `storage`, or an empty one
    pub async fn open(
        config: EngineConfig,
        storage: Arc<dyn WalletStorage>,
        ledger: Arc<dyn LedgerView>,
    ) -> WalletResult<Self> {
        config.validate()?;
        storage.initialize().await?;

        let account = storage.get_account().await?;
        let addresses = match &account {
            Some(account) => storage.get_addresses(&account.account_id).await?,
            None => Vec::new(),
        };
        let keystore = storage
            .get_keystore()
            .await?
            .map(KeyStore::from_record)
            .unwrap_or_else(KeyStore::empty);
        let tracker = UtxoTracker::with_permanent_locks(storage.get_permanent_locks().await?);
        let scanner = OutputScanner::new(
            addresses
                .iter()
                .map(scan_key)
                .collect::<WalletResult<Vec<_>>>()?,
        );

        if let Some(account) = &account {
            info!(
                account_id = %account.account_id,
                addresses = addresses.len(),
                "opened wallet"
            );
        }

        Ok(Self {
            config,
            storage,
            ledger,
            state: Mutex::new(WalletState {
                account,
                addresses: addresses.into_iter().map(|a| (a.index, a)).collect(),
                keystore,
                scanner,
                tracker,
                events: EventDispatcher::new(),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn register_listener(&self, listener: Box<dyn EventListener>) -> WalletResult<()> {
        self.state
            .lock()
            .await
            .events
            .register(listener)
            .map_err(|e| WalletError::Configuration(e.to_string()))
    }

    pub async fn account_id(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .account
            .as_ref()
            .map(|a| a.account_id.clone())
    }

    /// Create the wallet's account from a BIP39 mnemonic.
    ///
    /// Importing the mnemonic the wallet already holds is a no-op returning the
    /// same account id; any other mnemonic fails with `AccountExists`.
    pub async fn import_mnemonic(
        &self,
        phrase: &str,
        passphrase: &str,
        scan_from: ScanFrom,
    ) -> WalletResult<String> {
        let seed = mnemonic_to_seed(phrase, passphrase)?;
        let keys = AccountKeys::derive(&seed[..], self.config.coin_type, self.config.account)?;
        let account_id = keys.account_id();

        {
            let mut state = self.state.lock().await;
            if let Some(existing) = &state.account {
                if existing.account_id == account_id {
                    return Ok(account_id);
                }
                return Err(StateError::AccountExists(existing.account_id.clone()).into());
            }

            let (keystore, keystore_record) = KeyStore::create(&seed[..], self.config.kdf);
            let account = AccountRecord {
                account_id: account_id.clone(),
                coin_type: self.config.coin_type,
                account: self.config.account,
                spend_root_public: keys.spend_root_public(),
                scan_root_public: keys.scan_root_public(),
                next_address_index: CHANGE_ADDRESS_INDEX + 1,
            };
            let change = address_record(&keys, &account_id, CHANGE_ADDRESS_INDEX, None, true)?;

            self.storage.save_keystore(&keystore_record).await?;
            self.storage.save_account(&account).await?;
            self.storage.save_address(&change).await?;

            state.scanner.add_key(scan_key(&change)?);
            state.addresses.insert(change.index, change);
            state.keystore = keystore;
            state.account = Some(account);
            info!(account_id = %account_id, "imported mnemonic");
        }

        match scan_from {
            ScanFrom::Height(height) => {
                self.rescan(height, &NeverCancelToken).await?;
            }
            ScanFrom::Tip => {
                let tip = self.ledger.current_tip().await?;
                self.storage.set_scanned_height(Some(tip)).await?;
            }
            ScanFrom::Deferred => {}
        }
        Ok(account_id)
    }

    /// Derive the next receiving address. Requires the spend keys.
    pub async fn new_stealth_address(&self, label: Option<&str>) -> WalletResult<StealthAddress> {
        let mut state = self.state.lock().await;
        let mut account = state.account()?.clone();
        let keys = state
            .keystore
            .account_keys(self.config.coin_type, self.config.account)?;

        let index = account.next_address_index;
        let record = address_record(
            &keys,
            &account.account_id,
            index,
            label.map(str::to_string),
            false,
        )?;
        account.next_address_index = index.saturating_add(1);

        self.storage.save_address(&record).await?;
        self.storage.save_account(&account).await?;

        let address = StealthAddress::new(record.scan_pubkey, record.spend_pubkey);
        state.scanner.add_key(scan_key(&record)?);
        state.addresses.insert(index, record);
        state.account = Some(account);
        Ok(address)
    }

    pub async fn list_addresses(&self) -> Vec<AddressInfo> {
        let state = self.state.lock().await;
        state
            .addresses
            .values()
            .map(|record| AddressInfo {
                index: record.index,
                address: StealthAddress::new(record.scan_pubkey, record.spend_pubkey),
                label: record.label.clone(),
                is_change: record.is_change,
            })
            .collect()
    }

    /// Unspent, unlocked outputs within the confirmation window
    pub async fn list_unspent(&self, filter: UnspentFilter) -> WalletResult<Vec<UnspentOutput>> {
        let state = self.state.lock().await;
        let tip = self.ledger.current_tip().await?;
        let address_indices: Option<Vec<u32>> = filter
            .addresses
            .as_ref()
            .map(|addresses| addresses.iter().filter_map(|a| state.index_of(a)).collect());

        let mut unspent = Vec::new();
        for output in self.storage.get_outputs(None).await? {
            if output.status == OutputStatus::Spent || output.spent_in.is_some() {
                continue;
            }
            if state.tracker.is_unavailable(&output.outref) {
                continue;
            }
            if filter.kind.is_some_and(|kind| kind != output.kind) {
                continue;
            }
            if let Some(indices) = &address_indices {
                if !indices.contains(&output.address_index) {
                    continue;
                }
            }
            let confirmations = output.confirmations(tip);
            if confirmations < filter.min_confirmations || confirmations > filter.max_confirmations
            {
                continue;
            }
            let Some(record) = state.addresses.get(&output.address_index) else {
                continue;
            };
            unspent.push(UnspentOutput {
                outref: output.outref,
                kind: output.kind,
                amount: output.amount,
                address: StealthAddress::new(record.scan_pubkey, record.spend_pubkey),
                address_index: output.address_index,
                label: record.label.clone(),
                confirmations,
                anon_index: output.anon_index,
            });
        }
        Ok(unspent)
    }

    /// Exclude an unspent output from coin selection
    pub async fn lock_output(&self, outref: OutputRef, permanent: bool) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        let output = self
            .storage
            .get_output(&outref)
            .await?
            .ok_or(StateError::UnknownOutput(outref))?;
        if output.status == OutputStatus::Spent || output.spent_in.is_some() {
            return Err(StateError::OutputSpent(outref).into());
        }

        state.tracker.lock(outref, permanent)?;
        if permanent {
            if let Err(e) = self.storage.set_permanent_lock(&outref, true).await {
                state.tracker.unlock(&outref)?;
                return Err(e);
            }
        }
        Ok(())
    }

    pub async fn unlock_output(&self, outref: OutputRef) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        if state.tracker.is_permanent(&outref) {
            self.storage.set_permanent_lock(&outref, false).await?;
        }
        state.tracker.unlock(&outref)?;
        Ok(())
    }

    /// Drop every temporary lock, and permanent ones when asked. Storage is
    /// cleared first; on failure the locks already cleared are written back
    /// and nothing is unlocked.
    pub async fn unlock_all(&self, include_permanent: bool) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        if include_permanent {
            let permanent = state.tracker.permanent_locks();
            for (n, outref) in permanent.iter().enumerate() {
                if let Err(e) = self.storage.set_permanent_lock(outref, false).await {
                    for cleared in &permanent[..n] {
                        if let Err(restore) = self.storage.set_permanent_lock(cleared, true).await {
                            warn!(outref = %cleared, error = %restore, "failed to restore lock");
                        }
                    }
                    return Err(e);
                }
            }
        }
        state.tracker.unlock_all(include_permanent);
        Ok(())
    }

    pub async fn list_locked(&self) -> Vec<LockedOutput> {
        self.state.lock().await.tracker.locked()
    }

    pub async fn get_wallet_info(&self) -> WalletResult<WalletInfo> {
        let mut state = self.state.lock().await;
        let tip = self.ledger.current_tip().await?;

        let mut info = WalletInfo {
            account_id: state.account.as_ref().map(|a| a.account_id.clone()),
            plain_balance: 0,
            confidential_balance: 0,
            anon_balance: 0,
            unconfirmed_balance: 0,
            locked_balance: 0,
            pending_amounts: 0,
            scanned_height: self.storage.get_scanned_height().await?,
            encryption_status: state.keystore.status(),
        };

        for output in self.storage.get_outputs(None).await? {
            if output.status == OutputStatus::Spent || output.spent_in.is_some() {
                continue;
            }
            let Some(amount) = output.amount else {
                info.pending_amounts += 1;
                continue;
            };
            if state.tracker.is_locked(&output.outref) {
                info.locked_balance = info.locked_balance.saturating_add(amount);
                continue;
            }
            let confirmed = output.status == OutputStatus::Unspent
                && output.confirmations(tip) >= self.config.min_confirmations;
            let balance = if !confirmed {
                &mut info.unconfirmed_balance
            } else {
                match output.kind {
                    OutputKind::Plain => &mut info.plain_balance,
                    OutputKind::Confidential => &mut info.confidential_balance,
                    OutputKind::Anonymous => &mut info.anon_balance,
                }
            };
            *balance = balance.saturating_add(amount);
        }
        Ok(info)
    }

    /// Seal the seed under `passphrase`; the wallet is locked afterwards
    pub async fn encrypt_wallet(&self, passphrase: &str) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        state.account()?;
        let record = state.keystore.seal_seed(passphrase)?;
        self.storage.save_keystore(&record).await?;
        state.keystore.install(record);
        info!("wallet encrypted");
        Ok(())
    }

    /// Unlock for `timeout_secs` (the configured default when `None`, zero for
    /// no expiry), then recover amounts of outputs detected while locked.
    pub async fn unlock_wallet(&self, passphrase: &str, timeout_secs: Option<u64>) -> WalletResult<u64> {
        let mut state = self.state.lock().await;
        let timeout = Duration::from_secs(timeout_secs.unwrap_or(self.config.unlock_timeout_secs));
        state.keystore.unlock(passphrase, timeout)?;
        info!(timeout_secs = timeout.as_secs(), "wallet unlocked");
        self.complete_pending(&mut state).await
    }

    pub async fn lock_wallet(&self) -> WalletResult<()> {
        self.state.lock().await.keystore.lock()?;
        info!("wallet locked");
        Ok(())
    }

    /// Transaction history, optionally restricted to one output kind
    pub async fn list_transactions(
        &self,
        kind: Option<OutputKind>,
    ) -> WalletResult<Vec<WalletTransactionRecord>> {
        let _state = self.state.lock().await;
        Ok(self
            .storage
            .get_transactions()
            .await?
            .into_iter()
            .filter(|record| kind.map_or(true, |kind| record.involves_kind(kind)))
            .collect())
    }

    fn ensure_scan_allowed(&self, state: &mut WalletState) -> WalletResult<()> {
        if self.config.scan_policy == ScanPolicy::RequireUnlocked
            && state.keystore.status() == EncryptionStatus::Locked
        {
            return Err(StateError::ScanRequiresUnlock.into());
        }
        Ok(())
    }

    /// Spend secrets of every address, `None` while locked
    fn spend_keys(&self, state: &mut WalletState) -> WalletResult<Option<HashMap<u32, PrivateKey>>> {
        if !state.keystore.has_seed() {
            return Ok(None);
        }
        let keys = match state
            .keystore
            .account_keys(self.config.coin_type, self.config.account)
        {
            Ok(keys) => keys,
            Err(WalletError::State(StateError::WalletLocked)) => return Ok(None),
            Err(e) => return Err(e),
        };
        state
            .addresses
            .keys()
            .map(|index| Ok((*index, keys.address_keys(*index)?.spend)))
            .collect::<WalletResult<HashMap<_, _>>>()
            .map(Some)
    }
}
