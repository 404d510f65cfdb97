//! Hardened key hierarchy over Ristretto scalars
//!
//! Every level is hardened: the child is Blake2b-MAC-512 of the parent secret
//! and index keyed by the parent chain code, left half reduced into a scalar,
//! right half the new chain code.
//!
//! ```text
//! m / 44' / coin' / account' / chain' / index'
//!                              0' = spend, 1' = scan
//! ```

use blake2::{
    digest::{KeyInit, Mac},
    Blake2b, Blake2bMac512, Digest,
};
use curve25519_dalek::scalar::Scalar;
use digest::consts::U32;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    data_structures::types::{PrivateKey, PublicKey},
    errors::KeyManagementError,
};

pub const HARDENED: u32 = 0x8000_0000;
pub const PURPOSE: u32 = 44;
pub const SPEND_CHAIN: u32 = 0;
pub const SCAN_CHAIN: u32 = 1;
pub const ACCOUNT_ID_VERSION: u8 = 0x17;

const MASTER_KEY_DOMAIN: &[u8] = b"anon wallet seed";

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExtendedKey {
    key: PrivateKey,
    chain_code: [u8; 32],
}

impl std::fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

fn mac_512(key: &[u8], parts: &[&[u8]]) -> Result<[u8; 64], KeyManagementError> {
    let mut mac = <Blake2bMac512 as KeyInit>::new_from_slice(key)
        .map_err(|e| KeyManagementError::DerivationFailed(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

impl ExtendedKey {
    fn from_mac_output(mut bytes: [u8; 64]) -> Result<Self, KeyManagementError> {
        let mut left = [0u8; 32];
        left.copy_from_slice(&bytes[..32]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[32..]);
        bytes.zeroize();

        let key = PrivateKey::from_bytes_mod_order(left);
        left.zeroize();
        if key.scalar() == &Scalar::ZERO {
            return Err(KeyManagementError::DerivationFailed(
                "derived zero scalar".to_string(),
            ));
        }
        Ok(Self { key, chain_code })
    }

    /// Root of the hierarchy from a BIP39 seed
    pub fn master(seed: &[u8]) -> Result<Self, KeyManagementError> {
        Self::from_mac_output(mac_512(MASTER_KEY_DOMAIN, &[seed])?)
    }

    pub fn derive_hardened(&self, index: u32) -> Result<Self, KeyManagementError> {
        let index = index | HARDENED;
        Self::from_mac_output(mac_512(
            &self.chain_code,
            &[&[0u8], &self.key.to_bytes(), &index.to_be_bytes()],
        )?)
    }

    pub fn derive_path(&self, path: &[u32]) -> Result<Self, KeyManagementError> {
        path.iter()
            .try_fold(self.clone(), |key, index| key.derive_hardened(*index))
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }

    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }
}

/// Scan and spend key pair of one stealth address
#[derive(Clone, Debug)]
pub struct AddressKeys {
    pub index: u32,
    pub scan: PrivateKey,
    pub spend: PrivateKey,
}

/// Spend and scan chain roots of one account
#[derive(Clone, Debug)]
pub struct AccountKeys {
    spend_chain: ExtendedKey,
    scan_chain: ExtendedKey,
}

impl AccountKeys {
    pub fn derive(seed: &[u8], coin_type: u32, account: u32) -> Result<Self, KeyManagementError> {
        let account_root = ExtendedKey::master(seed)?.derive_path(&[PURPOSE, coin_type, account])?;
        Ok(Self {
            spend_chain: account_root.derive_hardened(SPEND_CHAIN)?,
            scan_chain: account_root.derive_hardened(SCAN_CHAIN)?,
        })
    }

    pub fn spend_root_public(&self) -> PublicKey {
        self.spend_chain.public_key()
    }

    pub fn scan_root_public(&self) -> PublicKey {
        self.scan_chain.public_key()
    }

    pub fn account_id(&self) -> String {
        account_id(&self.spend_root_public(), &self.scan_root_public())
    }

    pub fn address_keys(&self, index: u32) -> Result<AddressKeys, KeyManagementError> {
        Ok(AddressKeys {
            index,
            scan: self.scan_chain.derive_hardened(index)?.private_key().clone(),
            spend: self.spend_chain.derive_hardened(index)?.private_key().clone(),
        })
    }
}

type Blake2b256 = Blake2b<U32>;

/// `base58(version || Blake2b-256(spend || scan)[..20] || checksum[..4])`
pub fn account_id(spend_root: &PublicKey, scan_root: &PublicKey) -> String {
    let mut hasher = Blake2b256::new();
    hasher.update(spend_root.as_bytes());
    hasher.update(scan_root.as_bytes());
    let digest = hasher.finalize();

    let mut payload = Vec::with_capacity(25);
    payload.push(ACCOUNT_ID_VERSION);
    payload.extend_from_slice(&digest[..20]);
    let checksum = Blake2b256::digest(&payload);
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}

pub fn is_valid_account_id(id: &str) -> bool {
    let Ok(bytes) = bs58::decode(id).into_vec() else {
        return false;
    };
    if bytes.len() != 25 || bytes[0] != ACCOUNT_ID_VERSION {
        return false;
    }
    let checksum = Blake2b256::digest(&bytes[..21]);
    checksum[..4] == bytes[21..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_management::mnemonic::mnemonic_to_seed;

    const PHRASE: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";

    #[test]
    fn test_derivation_is_deterministic() {
        let seed = mnemonic_to_seed(PHRASE, "").unwrap();
        let a = AccountKeys::derive(seed.as_ref(), 1, 0).unwrap();
        let b = AccountKeys::derive(seed.as_ref(), 1, 0).unwrap();
        assert_eq!(a.account_id(), b.account_id());
        for i in 0..4 {
            let ka = a.address_keys(i).unwrap();
            let kb = b.address_keys(i).unwrap();
            assert_eq!(ka.scan.public_key(), kb.scan.public_key());
            assert_eq!(ka.spend.public_key(), kb.spend.public_key());
        }
    }

    #[test]
    fn test_paths_are_separated() {
        let seed = mnemonic_to_seed(PHRASE, "").unwrap();
        let account = AccountKeys::derive(seed.as_ref(), 1, 0).unwrap();
        let other_account = AccountKeys::derive(seed.as_ref(), 1, 1).unwrap();
        let other_coin = AccountKeys::derive(seed.as_ref(), 2, 0).unwrap();
        assert_ne!(account.account_id(), other_account.account_id());
        assert_ne!(account.account_id(), other_coin.account_id());

        let keys = account.address_keys(0).unwrap();
        assert_ne!(keys.scan.public_key(), keys.spend.public_key());
        assert_ne!(
            keys.spend.public_key(),
            account.address_keys(1).unwrap().spend.public_key()
        );
    }

    #[test]
    fn test_passphrase_changes_account() {
        let plain = mnemonic_to_seed(PHRASE, "").unwrap();
        let salted = mnemonic_to_seed(PHRASE, "extra").unwrap();
        let a = AccountKeys::derive(plain.as_ref(), 1, 0).unwrap();
        let b = AccountKeys::derive(salted.as_ref(), 1, 0).unwrap();
        assert_ne!(a.account_id(), b.account_id());
    }

    #[test]
    fn test_account_id_checksum() {
        let seed = mnemonic_to_seed(PHRASE, "").unwrap();
        let id = AccountKeys::derive(seed.as_ref(), 1, 0).unwrap().account_id();
        assert!(is_valid_account_id(&id));

        let mut tampered = id.into_bytes();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == b'2' { b'3' } else { b'2' };
        assert!(!is_valid_account_id(&String::from_utf8(tampered).unwrap()));
    }
}
