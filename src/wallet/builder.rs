//! Wallet builder module providing a fluent API for wallet construction with event system integration
//!
//! The builder gathers the storage backend, ledger, configuration, event
//! listeners and an optional mnemonic, then opens the wallet and imports the
//! account in one step.

use std::sync::Arc;

use super::{types::ScanFrom, Wallet};
use crate::{
    config::EngineConfig,
    errors::WalletError,
    events::EventListener,
    key_management::mnemonic::generate_mnemonic,
    ledger::LedgerView,
    storage::{MemoryStorage, WalletStorage},
};

/// Errors that can occur during wallet building
#[derive(Debug)]
pub enum WalletBuildError {
    /// Opening the wallet or importing the mnemonic failed
    WalletCreation(WalletError),
    /// Error during event listener registration
    EventListenerError(String),
    /// Configuration validation error
    ConfigurationError(String),
    /// Missing required parameters
    MissingParameter(String),
}

impl std::fmt::Display for WalletBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletBuildError::WalletCreation(err) => write!(f, "Wallet creation error: {}", err),
            WalletBuildError::EventListenerError(msg) => {
                write!(f, "Event listener error: {}", msg)
            }
            WalletBuildError::ConfigurationError(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            WalletBuildError::MissingParameter(param) => {
                write!(f, "Missing required parameter: {}", param)
            }
        }
    }
}

impl std::error::Error for WalletBuildError {}

impl From<WalletError> for WalletBuildError {
    fn from(err: WalletError) -> Self {
        WalletBuildError::WalletCreation(err)
    }
}

/// How the account is created when the wallet is built
#[derive(Debug, Clone)]
enum AccountSource {
    /// Keep whatever account the storage already holds
    Existing,
    /// Generate a fresh mnemonic of the given word count
    Generate { words: usize, passphrase: String },
    /// Import an existing mnemonic
    Mnemonic {
        phrase: String,
        passphrase: String,
        scan_from: ScanFrom,
    },
}

/// Builder for opening wallets with optional event listeners
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use anon_wallet_libs::{config::EngineConfig, ledger::LocalLedger, wallet::WalletBuilder};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = EngineConfig::for_testing();
/// let ledger = Arc::new(LocalLedger::new(&config));
/// let wallet = WalletBuilder::new()
///     .with_config(config)
///     .with_ledger(ledger)
///     .generate_mnemonic(24)
///     .build()
///     .await?;
/// assert!(wallet.account_id().await.is_some());
/// # Ok(())
/// # }
/// ```
pub struct WalletBuilder {
    config: EngineConfig,
    storage: Option<Arc<dyn WalletStorage>>,
    ledger: Option<Arc<dyn LedgerView>>,
    account_source: AccountSource,
    listeners_to_register: Vec<Box<dyn EventListener>>,
    generated_mnemonic: Option<String>,
}

impl Default for WalletBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletBuilder {
    /// Builder with the default configuration, in-memory storage and no account
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            storage: None,
            ledger: None,
            account_source: AccountSource::Existing,
            listeners_to_register: Vec::new(),
            generated_mnemonic: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist the wallet in `storage`; defaults to a fresh [`MemoryStorage`]
    pub fn with_storage(mut self, storage: Arc<dyn WalletStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerView>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Import `phrase` when the wallet is built
    pub fn from_mnemonic(
        mut self,
        phrase: impl Into<String>,
        passphrase: impl Into<String>,
        scan_from: ScanFrom,
    ) -> Self {
        self.account_source = AccountSource::Mnemonic {
            phrase: phrase.into(),
            passphrase: passphrase.into(),
            scan_from,
        };
        self
    }

    /// Generate a fresh mnemonic when the wallet is built. The phrase is
    /// available from [`WalletBuilder::build_with_mnemonic`].
    pub fn generate_mnemonic(mut self, words: usize) -> Self {
        self.account_source = AccountSource::Generate {
            words,
            passphrase: String::new(),
        };
        self
    }

    /// Add an event listener to the wallet
    ///
    /// Listeners receive every event emitted after the wallet is built,
    /// including those of the initial import scan.
    pub fn with_event_listener(mut self, listener: Box<dyn EventListener>) -> Self {
        self.listeners_to_register.push(listener);
        self
    }

    /// Open the wallet, register listeners and create the account
    pub async fn build(self) -> Result<Wallet, WalletBuildError> {
        self.build_with_mnemonic().await.map(|(wallet, _)| wallet)
    }

    /// Like [`WalletBuilder::build`], also returning the generated mnemonic
    pub async fn build_with_mnemonic(
        mut self,
    ) -> Result<(Wallet, Option<String>), WalletBuildError> {
        self.config
            .validate()
            .map_err(|e| WalletBuildError::ConfigurationError(e.to_string()))?;
        let ledger = self
            .ledger
            .take()
            .ok_or_else(|| WalletBuildError::MissingParameter("ledger".to_string()))?;
        let storage = self
            .storage
            .take()
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        let wallet = Wallet::open(self.config.clone(), storage, ledger).await?;
        for listener in self.listeners_to_register.drain(..) {
            wallet
                .register_listener(listener)
                .await
                .map_err(|e| WalletBuildError::EventListenerError(e.to_string()))?;
        }

        match self.account_source.clone() {
            AccountSource::Existing => {}
            AccountSource::Generate { words, passphrase } => {
                let phrase = generate_mnemonic(words).map_err(WalletError::from)?;
                wallet
                    .import_mnemonic(&phrase, &passphrase, ScanFrom::Tip)
                    .await?;
                self.generated_mnemonic = Some(phrase);
            }
            AccountSource::Mnemonic {
                phrase,
                passphrase,
                scan_from,
            } => {
                wallet.import_mnemonic(&phrase, &passphrase, scan_from).await?;
            }
        }
        Ok((wallet, self.generated_mnemonic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{events::listeners::MockEventListener, ledger::LocalLedger};

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn ledger(config: &EngineConfig) -> Arc<dyn LedgerView> {
        Arc::new(LocalLedger::new(config))
    }

    #[tokio::test]
    async fn test_missing_ledger_is_reported() {
        let result = WalletBuilder::new().build().await;
        assert!(matches!(result, Err(WalletBuildError::MissingParameter(_))));
    }

    #[tokio::test]
    async fn test_build_from_mnemonic() {
        let config = EngineConfig::for_testing();
        let wallet = WalletBuilder::new()
            .with_ledger(ledger(&config))
            .with_config(config)
            .from_mnemonic(PHRASE, "", ScanFrom::Height(0))
            .build()
            .await
            .unwrap();
        assert!(wallet.account_id().await.is_some());
        assert_eq!(wallet.list_addresses().await.len(), 1);
    }

    #[tokio::test]
    async fn test_generated_mnemonic_is_returned() {
        let config = EngineConfig::for_testing();
        let (wallet, phrase) = WalletBuilder::new()
            .with_ledger(ledger(&config))
            .with_config(config)
            .generate_mnemonic(12)
            .with_event_listener(Box::new(MockEventListener::new()))
            .build_with_mnemonic()
            .await
            .unwrap();
        assert_eq!(phrase.unwrap().split_whitespace().count(), 12);
        assert!(wallet.account_id().await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_listener_rejected() {
        let config = EngineConfig::for_testing();
        let result = WalletBuilder::new()
            .with_ledger(ledger(&config))
            .with_event_listener(Box::new(MockEventListener::new()))
            .with_event_listener(Box::new(MockEventListener::new()))
            .build()
            .await;
        assert!(matches!(result, Err(WalletBuildError::EventListenerError(_))));
    }
}
