//! Storage trait definition for wallet persistence
//!
//! This module defines the `WalletStorage` trait that provides a common interface
//! for the storage backends holding accounts, addresses, owned outputs, locks,
//! scan progress and transaction history.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::encryption::KdfParams,
    data_structures::{
        output::OutputKind,
        types::{OutputRef, PublicKey, TxId},
    },
    errors::WalletResult,
};

use super::output_status::OutputStatus;
use super::stored_output::OwnedOutput;

/// Query filters for retrieving outputs
#[derive(Debug, Clone, Default)]
pub struct OutputFilter {
    /// Filter by output status
    pub status: Option<OutputStatus>,
    /// Filter by output kind
    pub kind: Option<OutputKind>,
    /// Filter by confirming height range (inclusive)
    pub height_range: Option<(u64, u64)>,
    /// Restrict to outputs paying these address indices
    pub address_indices: Option<Vec<u32>>,
    /// Limit number of results
    pub limit: Option<usize>,
}

impl OutputFilter {
    /// Create a new empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by output status
    pub fn with_status(mut self, status: OutputStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_height_range(mut self, min: u64, max: u64) -> Self {
        self.height_range = Some((min, max));
        self
    }

    pub fn with_address_indices(mut self, indices: Vec<u32>) -> Self {
        self.address_indices = Some(indices);
        self
    }

    /// Set result limit
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, output: &OwnedOutput) -> bool {
        if self.status.is_some_and(|s| s != output.status) {
            return false;
        }
        if self.kind.is_some_and(|k| k != output.kind) {
            return false;
        }
        if let Some((min, max)) = self.height_range {
            match output.height {
                Some(h) if h >= min && h <= max => {}
                _ => return false,
            }
        }
        if let Some(indices) = &self.address_indices {
            if !indices.contains(&output.address_index) {
                return false;
            }
        }
        true
    }
}

/// Account created by a mnemonic import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_id: String,
    pub coin_type: u32,
    pub account: u32,
    pub spend_root_public: PublicKey,
    pub scan_root_public: PublicKey,
    /// Next unused address index on the scan and spend chains
    pub next_address_index: u32,
}

/// One derived stealth address. The scan secret is kept in the clear so that
/// outputs can be detected while the key store is locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub account_id: String,
    pub index: u32,
    pub label: Option<String>,
    pub scan_secret: [u8; 32],
    pub scan_pubkey: PublicKey,
    pub spend_pubkey: PublicKey,
    /// Internal address receiving change
    pub is_change: bool,
}

/// Persisted seed material, optionally sealed under a passphrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreRecord {
    pub encrypted: bool,
    pub kdf: KdfParams,
    pub salt: Vec<u8>,
    /// Raw seed when unencrypted, `nonce || ciphertext` otherwise
    pub seed: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    Send,
    Receive,
    /// Every output returned to the wallet
    SelfTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Pending,
    Confirmed,
    /// Dropped from the mempool or invalidated by a reorg
    Discarded,
}

/// Wallet transaction history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransactionRecord {
    pub txid: TxId,
    pub category: TransactionCategory,
    /// Kind of the inputs, for sends
    pub input_kind: Option<OutputKind>,
    /// Kinds of the outputs relevant to the wallet
    pub output_kinds: Vec<OutputKind>,
    /// Value paid to others (sends) or received (receives)
    pub amount: u64,
    pub fee: u64,
    pub comment: Option<String>,
    pub height: Option<u64>,
    pub state: TransactionState,
    /// Anonymity-set indices referenced by each anonymous input
    pub rings: Vec<Vec<u64>>,
    /// Wallet outputs consumed by the transaction
    #[serde(default)]
    pub spent_outputs: Vec<OutputRef>,
}

impl WalletTransactionRecord {
    pub fn involves_kind(&self, kind: OutputKind) -> bool {
        self.input_kind == Some(kind) || self.output_kinds.contains(&kind)
    }
}

/// Trait for wallet storage backends
#[async_trait]
pub trait WalletStorage: Send + Sync {
    /// Initialize the storage backend (create tables, indexes, etc.)
    async fn initialize(&self) -> WalletResult<()>;

    // === Account and address methods ===

    async fn save_account(&self, account: &AccountRecord) -> WalletResult<()>;

    async fn get_account(&self) -> WalletResult<Option<AccountRecord>>;

    async fn save_address(&self, address: &AddressRecord) -> WalletResult<()>;

    /// All addresses of the account ordered by index
    async fn get_addresses(&self, account_id: &str) -> WalletResult<Vec<AddressRecord>>;

    // === Key store ===

    async fn save_keystore(&self, record: &KeystoreRecord) -> WalletResult<()>;

    async fn get_keystore(&self) -> WalletResult<Option<KeystoreRecord>>;

    // === Output methods ===

    /// Insert or replace the record keyed by its output reference
    async fn save_output(&self, output: &OwnedOutput) -> WalletResult<()>;

    async fn get_output(&self, outref: &OutputRef) -> WalletResult<Option<OwnedOutput>>;

    async fn get_output_by_anon_index(&self, index: u64) -> WalletResult<Option<OwnedOutput>>;

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<OwnedOutput>>;

    async fn delete_output(&self, outref: &OutputRef) -> WalletResult<bool>;

    /// Remove outputs confirmed at or above `height` together with every
    /// unconfirmed one; returns how many were removed
    async fn delete_outputs_from_height(&self, height: u64) -> WalletResult<usize>;

    // === Locks ===

    async fn set_permanent_lock(&self, outref: &OutputRef, locked: bool) -> WalletResult<()>;

    async fn get_permanent_locks(&self) -> WalletResult<Vec<OutputRef>>;

    // === Scan progress ===

    async fn set_scanned_height(&self, height: Option<u64>) -> WalletResult<()>;

    async fn get_scanned_height(&self) -> WalletResult<Option<u64>>;

    // === Transaction history ===

    async fn save_transaction(&self, record: &WalletTransactionRecord) -> WalletResult<()>;

    async fn get_transaction(&self, txid: &TxId) -> WalletResult<Option<WalletTransactionRecord>>;

    async fn get_transactions(&self) -> WalletResult<Vec<WalletTransactionRecord>>;
}
