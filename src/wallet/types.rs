//! Request and report types of the wallet API

use serde::{Deserialize, Serialize};

use crate::{
    data_structures::{output::OutputKind, types::OutputRef},
    key_management::stealth_address::StealthAddress,
};

/// Where chain history is picked up after a mnemonic import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanFrom {
    /// Replay every block from this height before returning
    Height(u64),
    /// Ignore history and follow the chain from its current tip
    Tip,
    /// Record the account only; the caller rescans or syncs later
    #[default]
    Deferred,
}

/// Key store state reported by [`WalletInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionStatus {
    Unencrypted,
    Locked,
    Unlocked,
}

/// Balances and status of a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub account_id: Option<String>,
    pub plain_balance: u64,
    pub confidential_balance: u64,
    pub anon_balance: u64,
    /// Owned value not yet buried under the configured confirmation depth
    pub unconfirmed_balance: u64,
    /// Unspent value held by temporary or permanent locks
    pub locked_balance: u64,
    /// Owned outputs whose amount waits for an unlock
    pub pending_amounts: u64,
    pub scanned_height: Option<u64>,
    pub encryption_status: EncryptionStatus,
}

impl WalletInfo {
    pub fn balance(&self, kind: OutputKind) -> u64 {
        match kind {
            OutputKind::Plain => self.plain_balance,
            OutputKind::Confidential => self.confidential_balance,
            OutputKind::Anonymous => self.anon_balance,
        }
    }

    pub fn total_balance(&self) -> u64 {
        self.plain_balance
            .saturating_add(self.confidential_balance)
            .saturating_add(self.anon_balance)
    }
}

/// Derived address with its bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInfo {
    pub index: u32,
    pub address: StealthAddress,
    pub label: Option<String>,
    pub is_change: bool,
}

/// Filters of [`crate::wallet::Wallet::list_unspent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentFilter {
    pub min_confirmations: u64,
    pub max_confirmations: u64,
    /// Only outputs paying one of these addresses
    pub addresses: Option<Vec<StealthAddress>>,
    pub kind: Option<OutputKind>,
}

impl Default for UnspentFilter {
    fn default() -> Self {
        Self {
            min_confirmations: 1,
            max_confirmations: u64::MAX,
            addresses: None,
            kind: None,
        }
    }
}

impl UnspentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confirmations(mut self, min: u64, max: u64) -> Self {
        self.min_confirmations = min;
        self.max_confirmations = max;
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<StealthAddress>) -> Self {
        self.addresses = Some(addresses);
        self
    }

    pub fn with_kind(mut self, kind: OutputKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// One row of `list_unspent`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub outref: OutputRef,
    pub kind: OutputKind,
    /// `None` while the amount waits for an unlock
    pub amount: Option<u64>,
    pub address: StealthAddress,
    pub address_index: u32,
    pub label: Option<String>,
    pub confirmations: u64,
    pub anon_index: Option<u64>,
}

/// One row of `list_locked`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LockedOutput {
    pub outref: OutputRef,
    pub permanent: bool,
}
