//! Engine configuration
//!
//! One [`EngineConfig`] is shared by the wallet and the in-process ledger so
//! both sides agree on ring size bounds and relay fees.

use serde::{Deserialize, Serialize};

use crate::{
    crypto::encryption::KdfParams,
    errors::{WalletError, WalletResult},
};

pub const MIN_RING_SIZE: usize = 1;
pub const MAX_RING_SIZE: usize = 32;
pub const DEFAULT_RING_SIZE: usize = 5;
pub const MAX_ANON_INPUTS: usize = 32;

/// Default fee rate, in base units per 1000 bytes of serialized transaction
pub const DEFAULT_FEE_RATE: u64 = 20_000;
pub const DEFAULT_MIN_RELAY_FEE_RATE: u64 = 10_000;

/// How block processing behaves while the key store is locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Record matched outputs with unknown amounts, completed on unlock
    #[default]
    DetectWhileLocked,
    /// Refuse to process blocks until the wallet is unlocked
    RequireUnlocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SLIP-44 style coin type in the derivation path
    pub coin_type: u32,
    /// Account number in the derivation path
    pub account: u32,
    pub default_ring_size: usize,
    pub min_ring_size: usize,
    pub max_ring_size: usize,
    pub max_anon_inputs: usize,
    /// Fee rate used when a request does not name one
    pub fee_rate: u64,
    /// Rate below which transactions are neither built nor relayed
    pub min_relay_fee_rate: u64,
    /// Seconds an unlock lasts when the caller passes no timeout; 0 keeps it open
    pub unlock_timeout_secs: u64,
    pub scan_policy: ScanPolicy,
    pub kdf: KdfParams,
    /// Confirmations before an output counts towards the confirmed balance
    pub min_confirmations: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coin_type: 1,
            account: 0,
            default_ring_size: DEFAULT_RING_SIZE,
            min_ring_size: MIN_RING_SIZE,
            max_ring_size: MAX_RING_SIZE,
            max_anon_inputs: MAX_ANON_INPUTS,
            fee_rate: DEFAULT_FEE_RATE,
            min_relay_fee_rate: DEFAULT_MIN_RELAY_FEE_RATE,
            unlock_timeout_secs: 300,
            scan_policy: ScanPolicy::default(),
            kdf: KdfParams::default(),
            min_confirmations: 1,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with cheap key stretching, for tests and local tooling
    pub fn for_testing() -> Self {
        Self::default().with_kdf(KdfParams::insecure_for_tests())
    }

    pub fn from_json(json: &str) -> WalletResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> WalletResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_coin_type(mut self, coin_type: u32) -> Self {
        self.coin_type = coin_type;
        self
    }

    pub fn with_account(mut self, account: u32) -> Self {
        self.account = account;
        self
    }

    pub fn with_default_ring_size(mut self, ring_size: usize) -> Self {
        self.default_ring_size = ring_size;
        self
    }

    pub fn with_ring_size_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_ring_size = min;
        self.max_ring_size = max;
        self
    }

    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_min_relay_fee_rate(mut self, rate: u64) -> Self {
        self.min_relay_fee_rate = rate;
        self
    }

    pub fn with_unlock_timeout_secs(mut self, secs: u64) -> Self {
        self.unlock_timeout_secs = secs;
        self
    }

    pub fn with_scan_policy(mut self, policy: ScanPolicy) -> Self {
        self.scan_policy = policy;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_min_confirmations(mut self, confirmations: u64) -> Self {
        self.min_confirmations = confirmations;
        self
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.min_ring_size < MIN_RING_SIZE || self.max_ring_size > MAX_RING_SIZE {
            return Err(WalletError::Configuration(format!(
                "ring size bounds must lie within {MIN_RING_SIZE}..={MAX_RING_SIZE}"
            )));
        }
        if self.min_ring_size > self.max_ring_size {
            return Err(WalletError::Configuration(
                "min_ring_size exceeds max_ring_size".to_string(),
            ));
        }
        if !(self.min_ring_size..=self.max_ring_size).contains(&self.default_ring_size) {
            return Err(WalletError::Configuration(format!(
                "default ring size {} outside {}..={}",
                self.default_ring_size, self.min_ring_size, self.max_ring_size
            )));
        }
        if self.max_anon_inputs == 0 || self.max_anon_inputs > MAX_ANON_INPUTS {
            return Err(WalletError::Configuration(format!(
                "max_anon_inputs must lie within 1..={MAX_ANON_INPUTS}"
            )));
        }
        if self.fee_rate < self.min_relay_fee_rate {
            return Err(WalletError::Configuration(format!(
                "fee rate {} below minimum relay rate {}",
                self.fee_rate, self.min_relay_fee_rate
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_ring_size, 5);
        assert_eq!(config.scan_policy, ScanPolicy::DetectWhileLocked);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(EngineConfig::default()
            .with_ring_size_bounds(0, 8)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_ring_size_bounds(2, 33)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_default_ring_size(9)
            .with_ring_size_bounds(1, 8)
            .validate()
            .is_err());
        assert!(EngineConfig::default().with_fee_rate(1).validate().is_err());
    }

    #[test]
    fn test_json_partial_overrides() {
        let config =
            EngineConfig::from_json(r#"{"default_ring_size": 11, "scan_policy": "require_unlocked"}"#)
                .unwrap();
        assert_eq!(config.default_ring_size, 11);
        assert_eq!(config.scan_policy, ScanPolicy::RequireUnlocked);
        assert_eq!(config.max_ring_size, MAX_RING_SIZE);

        let reparsed = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_json_rejects_invalid() {
        assert!(EngineConfig::from_json(r#"{"default_ring_size": 40}"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }
}
