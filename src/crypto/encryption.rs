//! Authenticated encryption for output payloads and the key store
//!
//! Both use XChaCha20-Poly1305 with a random 24 byte nonce prefixed to the
//! ciphertext. Passphrase keys are stretched with Argon2id.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, Payload},
    Key, KeyInit, XChaCha20Poly1305, XNonce,
};
use curve25519_dalek::scalar::Scalar;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{data_structures::types::PublicKey, errors::CryptoError};

const NONCE_SIZE: usize = 24;
const AMOUNT_PLAINTEXT_SIZE: usize = 8 + 32;

/// Argon2id cost parameters for the key store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests
    pub fn insecure_for_tests() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// Stretch a passphrase into a 32 byte symmetric key
pub fn derive_passphrase_key(
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let params = Params::new(params.memory_kib, params.iterations, params.parallelism, Some(32))
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut())
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(key)
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Encrypt and authenticate `plaintext`, binding `aad`. Output is `nonce || ciphertext`.
pub fn seal(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce_bytes = random_bytes::<NONCE_SIZE>();
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn open(key: &[u8; 32], sealed: &[u8], aad: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if sealed.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed("ciphertext too short".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Encrypt an output's amount and blinding factor for its owner, bound to the
/// output's one-time key.
pub fn encrypt_amount(
    key: &[u8; 32],
    one_time_key: &PublicKey,
    amount: u64,
    blinding: &Scalar,
) -> Result<Vec<u8>, CryptoError> {
    let mut plaintext = Zeroizing::new([0u8; AMOUNT_PLAINTEXT_SIZE]);
    plaintext[..8].copy_from_slice(&amount.to_le_bytes());
    plaintext[8..].copy_from_slice(blinding.as_bytes());
    seal(key, plaintext.as_ref(), one_time_key.as_bytes())
}

/// Recover `(amount, blinding)` from an output payload
pub fn decrypt_amount(
    key: &[u8; 32],
    one_time_key: &PublicKey,
    payload: &[u8],
) -> Result<(u64, Scalar), CryptoError> {
    let plaintext = open(key, payload, one_time_key.as_bytes())?;
    if plaintext.len() != AMOUNT_PLAINTEXT_SIZE {
        return Err(CryptoError::DecryptionFailed(format!(
            "unexpected payload length {}",
            plaintext.len()
        )));
    }
    let mut amount = [0u8; 8];
    amount.copy_from_slice(&plaintext[..8]);
    let mut blinding = [0u8; 32];
    blinding.copy_from_slice(&plaintext[8..]);
    let blinding = Option::<Scalar>::from(Scalar::from_canonical_bytes(blinding))
        .ok_or_else(|| CryptoError::InvalidScalar("blinding factor".to_string()))?;
    Ok((u64::from_le_bytes(amount), blinding))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::PrivateKey;

    #[test]
    fn test_amount_payload_recovers_values() {
        let key = random_bytes::<32>();
        let otk = PrivateKey::random().public_key();
        let blind = Scalar::random(&mut rand::rngs::OsRng);
        let payload = encrypt_amount(&key, &otk, 123_456, &blind).unwrap();
        assert_eq!(decrypt_amount(&key, &otk, &payload).unwrap(), (123_456, blind));
    }

    #[test]
    fn test_payload_bound_to_one_time_key() {
        let key = random_bytes::<32>();
        let otk = PrivateKey::random().public_key();
        let payload = encrypt_amount(&key, &otk, 1, &Scalar::ONE).unwrap();
        let other = PrivateKey::random().public_key();
        assert!(decrypt_amount(&key, &other, &payload).is_err());
        assert!(decrypt_amount(&random_bytes::<32>(), &otk, &payload).is_err());
    }

    #[test]
    fn test_passphrase_key_is_deterministic_per_salt() {
        let params = KdfParams::insecure_for_tests();
        let a = derive_passphrase_key("hunter2", b"saltsaltsaltsalt", &params).unwrap();
        let b = derive_passphrase_key("hunter2", b"saltsaltsaltsalt", &params).unwrap();
        let c = derive_passphrase_key("hunter2", b"othersaltothersa", &params).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn test_truncated_ciphertext() {
        assert!(open(&[0u8; 32], &[0u8; 10], b"").is_err());
    }
}
