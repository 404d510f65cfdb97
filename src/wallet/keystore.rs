//! Passphrase-gated seed storage
//!
//! The seed is sealed with XChaCha20-Poly1305 under an Argon2id key stretched
//! from the passphrase. Unlocking keeps the plaintext seed in memory until the
//! timeout passes or the wallet is locked again; a timeout of zero keeps it
//! unlocked until `lock`.

use std::time::{Duration, Instant};

use zeroize::Zeroizing;

use super::types::EncryptionStatus;
use crate::{
    crypto::encryption::{derive_passphrase_key, open, random_bytes, seal, KdfParams},
    errors::{StateError, WalletResult},
    key_management::derivation::AccountKeys,
    storage::KeystoreRecord,
};

const SEED_AAD: &[u8] = b"anon.keystore.seed";
const SALT_SIZE: usize = 16;

pub struct KeyStore {
    record: Option<KeystoreRecord>,
    seed: Option<Zeroizing<Vec<u8>>>,
    unlocked_until: Option<Instant>,
}

impl KeyStore {
    /// Key store of a wallet that has no account yet
    pub fn empty() -> Self {
        Self {
            record: None,
            seed: None,
            unlocked_until: None,
        }
    }

    /// Restore from the persisted record. Encrypted stores start locked.
    pub fn from_record(record: KeystoreRecord) -> Self {
        let seed = (!record.encrypted).then(|| Zeroizing::new(record.seed.clone()));
        Self {
            record: Some(record),
            seed,
            unlocked_until: None,
        }
    }

    /// Unencrypted store holding `seed`; returns the record to persist
    pub fn create(seed: &[u8], kdf: KdfParams) -> (Self, KeystoreRecord) {
        let record = KeystoreRecord {
            encrypted: false,
            kdf,
            salt: Vec::new(),
            seed: seed.to_vec(),
        };
        (Self::from_record(record.clone()), record)
    }

    pub fn has_seed(&self) -> bool {
        self.record.is_some()
    }

    pub fn is_encrypted(&self) -> bool {
        self.record.as_ref().is_some_and(|r| r.encrypted)
    }

    pub fn status(&mut self) -> EncryptionStatus {
        self.expire();
        if !self.is_encrypted() {
            EncryptionStatus::Unencrypted
        } else if self.seed.is_some() {
            EncryptionStatus::Unlocked
        } else {
            EncryptionStatus::Locked
        }
    }

    fn expire(&mut self) {
        if self.unlocked_until.is_some_and(|deadline| Instant::now() >= deadline) {
            self.seed = None;
            self.unlocked_until = None;
        }
    }

    /// Plaintext seed, or `WalletLocked`
    pub fn seed(&mut self) -> WalletResult<&[u8]> {
        self.expire();
        match &self.seed {
            Some(seed) => Ok(seed.as_slice()),
            None => Err(StateError::WalletLocked.into()),
        }
    }

    pub fn account_keys(&mut self, coin_type: u32, account: u32) -> WalletResult<AccountKeys> {
        let seed = self.seed()?;
        Ok(AccountKeys::derive(seed, coin_type, account)?)
    }

    /// Seal the seed under `passphrase`. The store itself is unchanged until
    /// the returned record is persisted and passed to [`KeyStore::install`].
    pub fn seal_seed(&self, passphrase: &str) -> WalletResult<KeystoreRecord> {
        let Some(record) = &self.record else {
            return Err(StateError::NoAccount.into());
        };
        if record.encrypted {
            return Err(StateError::AlreadyEncrypted.into());
        }

        let salt = random_bytes::<SALT_SIZE>().to_vec();
        let key = derive_passphrase_key(passphrase, &salt, &record.kdf)?;
        let sealed = seal(&key, &record.seed, SEED_AAD)?;
        Ok(KeystoreRecord {
            encrypted: true,
            kdf: record.kdf,
            salt,
            seed: sealed,
        })
    }

    /// Switch to a persisted record; an encrypted one leaves the store locked
    pub fn install(&mut self, record: KeystoreRecord) {
        *self = Self::from_record(record);
    }

    /// Open the sealed seed for `timeout` (zero keeps it open until `lock`)
    pub fn unlock(&mut self, passphrase: &str, timeout: Duration) -> WalletResult<()> {
        let Some(record) = &self.record else {
            return Err(StateError::NoAccount.into());
        };
        if !record.encrypted {
            return Err(StateError::NotEncrypted.into());
        }

        let key = derive_passphrase_key(passphrase, &record.salt, &record.kdf)?;
        let seed = open(&key, &record.seed, SEED_AAD).map_err(|_| StateError::IncorrectPassphrase)?;
        self.seed = Some(seed);
        self.unlocked_until = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        Ok(())
    }

    pub fn lock(&mut self) -> WalletResult<()> {
        if !self.is_encrypted() {
            return Err(StateError::NotEncrypted.into());
        }
        self.seed = None;
        self.unlocked_until = None;
        Ok(())
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("encrypted", &self.is_encrypted())
            .field("unlocked", &self.seed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::WalletError;

    fn store() -> KeyStore {
        KeyStore::create(&[7u8; 64], KdfParams::insecure_for_tests()).0
    }

    #[test]
    fn test_encrypt_locks_store() {
        let mut keystore = store();
        assert_eq!(keystore.status(), EncryptionStatus::Unencrypted);

        let record = keystore.seal_seed("hunter2").unwrap();
        assert!(record.encrypted);
        assert_ne!(record.seed, vec![7u8; 64]);
        assert_eq!(keystore.status(), EncryptionStatus::Unencrypted);

        keystore.install(record);
        assert_eq!(keystore.status(), EncryptionStatus::Locked);
        assert!(matches!(
            keystore.seed(),
            Err(WalletError::State(StateError::WalletLocked))
        ));
        assert!(matches!(
            keystore.seal_seed("again"),
            Err(WalletError::State(StateError::AlreadyEncrypted))
        ));
    }

    #[test]
    fn test_unlock_with_passphrase() {
        let mut keystore = store();
        let record = keystore.seal_seed("hunter2").unwrap();

        let mut reopened = KeyStore::from_record(record);
        assert!(matches!(
            reopened.unlock("wrong", Duration::ZERO),
            Err(WalletError::State(StateError::IncorrectPassphrase))
        ));
        reopened.unlock("hunter2", Duration::ZERO).unwrap();
        assert_eq!(reopened.seed().unwrap(), &[7u8; 64][..]);
        assert_eq!(reopened.status(), EncryptionStatus::Unlocked);

        reopened.lock().unwrap();
        assert_eq!(reopened.status(), EncryptionStatus::Locked);
    }

    #[test]
    fn test_unlock_expires() {
        let mut keystore = store();
        let record = keystore.seal_seed("pw").unwrap();
        keystore.install(record);
        keystore.unlock("pw", Duration::from_millis(20)).unwrap();
        assert!(keystore.seed().is_ok());
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(keystore.status(), EncryptionStatus::Locked);
    }

    #[test]
    fn test_unencrypted_store_cannot_lock() {
        let mut keystore = store();
        assert!(matches!(
            keystore.lock(),
            Err(WalletError::State(StateError::NotEncrypted))
        ));
        assert!(matches!(
            keystore.unlock("pw", Duration::ZERO),
            Err(WalletError::State(StateError::NotEncrypted))
        ));
    }
}
