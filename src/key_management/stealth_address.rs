//! Dual-key stealth addresses
//!
//! An address publishes a scan key `A = a*G` and a spend key `B = b*G`. For
//! output `n` the sender picks `r`, publishes `R = r*G` and pays
//!
//! ```text
//! P = Hs(r*A || n)*G + B
//! ```
//!
//! The receiver recognises `P` from `a*R` alone and spends it with
//! `x = Hs(a*R || n) + b`. The amount payload is keyed by `r*B = b*R`, so
//! reading amounts needs the spend key while detection does not.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::hash::{hash_256, hash_to_scalar, DOMAIN_AMOUNT_KEY, DOMAIN_ONE_TIME_KEY},
    data_structures::types::{PrivateKey, PublicKey},
    errors::{CryptoError, KeyManagementError},
};

pub const STEALTH_ADDRESS_VERSION: u8 = 0x53;
const ENCODED_LENGTH: usize = 1 + 32 + 32 + 4;

/// Receiver address: scan and spend public keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StealthAddress {
    pub scan_pubkey: PublicKey,
    pub spend_pubkey: PublicKey,
}

impl StealthAddress {
    pub fn new(scan_pubkey: PublicKey, spend_pubkey: PublicKey) -> Self {
        Self {
            scan_pubkey,
            spend_pubkey,
        }
    }

    /// `base58(version || scan || spend || crc32)`
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(ENCODED_LENGTH);
        bytes.push(STEALTH_ADDRESS_VERSION);
        bytes.extend_from_slice(self.scan_pubkey.as_bytes());
        bytes.extend_from_slice(self.spend_pubkey.as_bytes());
        let checksum = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        bs58::encode(bytes).into_string()
    }

    pub fn decode(encoded: &str) -> Result<Self, KeyManagementError> {
        let bytes = bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| KeyManagementError::InvalidAddress(e.to_string()))?;
        if bytes.len() != ENCODED_LENGTH {
            return Err(KeyManagementError::InvalidAddress(format!(
                "expected {ENCODED_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        let (body, checksum) = bytes.split_at(ENCODED_LENGTH - 4);
        if crc32fast::hash(body).to_le_bytes() != checksum {
            return Err(KeyManagementError::InvalidAddress("checksum mismatch".to_string()));
        }
        if body[0] != STEALTH_ADDRESS_VERSION {
            return Err(KeyManagementError::InvalidAddress(format!(
                "unknown version byte {:#04x}",
                body[0]
            )));
        }

        let mut scan = [0u8; 32];
        scan.copy_from_slice(&body[1..33]);
        let mut spend = [0u8; 32];
        spend.copy_from_slice(&body[33..65]);
        let address = Self::new(PublicKey(scan), PublicKey(spend));
        address
            .scan_pubkey
            .to_point()
            .and(address.spend_pubkey.to_point())
            .map_err(|e| KeyManagementError::InvalidAddress(e.to_string()))?;
        Ok(address)
    }
}

impl Display for StealthAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for StealthAddress {
    type Err = KeyManagementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// ECDH: `secret * public`, compressed
pub fn derive_shared_secret(secret: &PrivateKey, public: &PublicKey) -> Result<[u8; 32], CryptoError> {
    Ok((secret.scalar() * public.to_point()?).compress().to_bytes())
}

/// `Hs(shared || n)`
pub fn one_time_key_tweak(shared: &[u8; 32], output_n: u32) -> Scalar {
    hash_to_scalar(DOMAIN_ONE_TIME_KEY, &[shared, &output_n.to_le_bytes()])
}

/// Symmetric key for the amount payload of output `n`
pub fn amount_key(spend_shared: &[u8; 32], output_n: u32) -> [u8; 32] {
    hash_256(DOMAIN_AMOUNT_KEY, &[spend_shared, &output_n.to_le_bytes()])
}

/// Sender side key material for one output
#[derive(Debug, Clone)]
pub struct StealthOutputKeys {
    pub ephemeral_key: PublicKey,
    pub one_time_key: PublicKey,
    pub amount_key: [u8; 32],
}

impl StealthOutputKeys {
    pub fn generate(address: &StealthAddress, output_n: u32) -> Result<Self, CryptoError> {
        Self::with_ephemeral(address, output_n, &PrivateKey::random())
    }

    pub fn with_ephemeral(
        address: &StealthAddress,
        output_n: u32,
        ephemeral: &PrivateKey,
    ) -> Result<Self, CryptoError> {
        let scan_shared = derive_shared_secret(ephemeral, &address.scan_pubkey)?;
        let spend_shared = derive_shared_secret(ephemeral, &address.spend_pubkey)?;
        let tweak = one_time_key_tweak(&scan_shared, output_n);
        let one_time = RistrettoPoint::mul_base(&tweak) + address.spend_pubkey.to_point()?;
        Ok(Self {
            ephemeral_key: ephemeral.public_key(),
            one_time_key: PublicKey::from_point(&one_time),
            amount_key: amount_key(&spend_shared, output_n),
        })
    }
}

/// Receiver side test: returns the tweak `Hs(a*R || n)` when the output pays
/// the address with scan secret `scan` and spend key `spend_pubkey`.
pub fn match_output(
    scan: &PrivateKey,
    spend_pubkey: &PublicKey,
    ephemeral_key: &PublicKey,
    one_time_key: &PublicKey,
    output_n: u32,
) -> Result<Option<Scalar>, CryptoError> {
    let shared = derive_shared_secret(scan, ephemeral_key)?;
    let tweak = one_time_key_tweak(&shared, output_n);
    let expected = RistrettoPoint::mul_base(&tweak) + spend_pubkey.to_point()?;
    Ok((PublicKey::from_point(&expected) == *one_time_key).then_some(tweak))
}

/// Receiver side amount key, `Hs(b*R || n)`
pub fn recover_amount_key(
    spend: &PrivateKey,
    ephemeral_key: &PublicKey,
    output_n: u32,
) -> Result<[u8; 32], CryptoError> {
    Ok(amount_key(&derive_shared_secret(spend, ephemeral_key)?, output_n))
}

/// Private key controlling a matched one-time key
pub fn one_time_private_key(tweak: &Scalar, spend: &PrivateKey) -> PrivateKey {
    PrivateKey::new(tweak + spend.scalar())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> (PrivateKey, PrivateKey, StealthAddress) {
        let scan = PrivateKey::random();
        let spend = PrivateKey::random();
        let address = StealthAddress::new(scan.public_key(), spend.public_key());
        (scan, spend, address)
    }

    #[test]
    fn test_encode_decode() {
        let (_, _, address) = keys();
        let encoded = address.encode();
        assert_eq!(StealthAddress::decode(&encoded).unwrap(), address);
        assert_eq!(encoded.parse::<StealthAddress>().unwrap(), address);
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let (_, _, address) = keys();
        let mut bytes = bs58::decode(address.encode()).into_vec().unwrap();
        bytes[10] ^= 1;
        assert!(StealthAddress::decode(&bs58::encode(&bytes).into_string()).is_err());

        let mut wrong_version = bs58::decode(address.encode()).into_vec().unwrap();
        wrong_version[0] = 0x01;
        let checksum = crc32fast::hash(&wrong_version[..65]).to_le_bytes();
        wrong_version[65..].copy_from_slice(&checksum);
        assert!(StealthAddress::decode(&bs58::encode(&wrong_version).into_string()).is_err());

        assert!(StealthAddress::decode("not-an-address").is_err());
        assert!(StealthAddress::decode(&bs58::encode([0x53u8; 10]).into_string()).is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_point() {
        let mut bytes = vec![STEALTH_ADDRESS_VERSION];
        bytes.extend_from_slice(&[0xff; 32]);
        bytes.extend_from_slice(PrivateKey::random().public_key().as_bytes());
        let checksum = crc32fast::hash(&bytes).to_le_bytes();
        bytes.extend_from_slice(&checksum);
        assert!(StealthAddress::decode(&bs58::encode(bytes).into_string()).is_err());
    }

    #[test]
    fn test_shared_secret_symmetry() {
        let (scan, _, address) = keys();
        let ephemeral = PrivateKey::random();
        assert_eq!(
            derive_shared_secret(&ephemeral, &address.scan_pubkey).unwrap(),
            derive_shared_secret(&scan, &ephemeral.public_key()).unwrap()
        );
    }

    #[test]
    fn test_receiver_detects_and_controls_output() {
        let (scan, spend, address) = keys();
        let sent = StealthOutputKeys::generate(&address, 3).unwrap();

        let tweak = match_output(&scan, &address.spend_pubkey, &sent.ephemeral_key, &sent.one_time_key, 3)
            .unwrap()
            .expect("output should match");
        assert_eq!(one_time_private_key(&tweak, &spend).public_key(), sent.one_time_key);
        assert_eq!(
            recover_amount_key(&spend, &sent.ephemeral_key, 3).unwrap(),
            sent.amount_key
        );

        // wrong output position or wrong receiver does not match
        assert!(match_output(&scan, &address.spend_pubkey, &sent.ephemeral_key, &sent.one_time_key, 4)
            .unwrap()
            .is_none());
        let (other_scan, _, other) = keys();
        assert!(match_output(&other_scan, &other.spend_pubkey, &sent.ephemeral_key, &sent.one_time_key, 3)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_one_time_keys_unlinkable() {
        let (_, _, address) = keys();
        let a = StealthOutputKeys::generate(&address, 0).unwrap();
        let b = StealthOutputKeys::generate(&address, 0).unwrap();
        assert_ne!(a.one_time_key, b.one_time_key);
        assert_ne!(a.one_time_key, address.spend_pubkey);
    }
}
