//! BIP39 mnemonic handling

use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

use crate::{crypto::encryption::random_bytes, errors::KeyManagementError};

/// Normalize whitespace and case, then check the word list and checksum
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, KeyManagementError> {
    let normalized = phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ");
    Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| KeyManagementError::InvalidMnemonic(e.to_string()))
}

/// Fresh English mnemonic of 12, 15, 18, 21 or 24 words
pub fn generate_mnemonic(word_count: usize) -> Result<String, KeyManagementError> {
    if !(12..=24).contains(&word_count) || word_count % 3 != 0 {
        return Err(KeyManagementError::InvalidMnemonic(format!(
            "unsupported word count {word_count}"
        )));
    }
    let entropy = Zeroizing::new(random_bytes::<32>());
    let entropy_len = word_count / 3 * 4;
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..entropy_len])
        .map_err(|e| KeyManagementError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// 64 byte BIP39 seed for `phrase` and the optional passphrase
pub fn mnemonic_to_seed(
    phrase: &str,
    passphrase: &str,
) -> Result<Zeroizing<[u8; 64]>, KeyManagementError> {
    let mnemonic = parse_mnemonic(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_valid_mnemonic_parses() {
        assert!(parse_mnemonic(VALID).is_ok());
        assert!(parse_mnemonic(&format!("  {}  ", VALID.to_uppercase())).is_ok());
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let phrase = vec!["abandon"; 12].join(" ");
        assert!(matches!(
            parse_mnemonic(&phrase),
            Err(KeyManagementError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_unknown_word_rejected() {
        let phrase = VALID.replace("about", "aboot");
        assert!(parse_mnemonic(&phrase).is_err());
    }

    #[test]
    fn test_seed_depends_on_passphrase() {
        let a = mnemonic_to_seed(VALID, "").unwrap();
        let b = mnemonic_to_seed(VALID, "TREZOR").unwrap();
        assert_ne!(*a, *b);
        // BIP39 reference vector
        assert_eq!(
            hex::encode(&b[..8]),
            "c55257c360c07c72"
        );
    }

    #[test]
    fn test_generated_mnemonic_round_trips() {
        let phrase = generate_mnemonic(24).unwrap();
        assert_eq!(phrase.split(' ').count(), 24);
        assert!(parse_mnemonic(&phrase).is_ok());
        assert!(generate_mnemonic(13).is_err());
    }
}
