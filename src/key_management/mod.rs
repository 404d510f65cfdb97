//! Mnemonics, the hardened key hierarchy and stealth addresses

pub mod derivation;
pub mod mnemonic;
pub mod stealth_address;

pub use derivation::{account_id, AccountKeys, AddressKeys, ExtendedKey};
pub use mnemonic::{generate_mnemonic, mnemonic_to_seed, parse_mnemonic};
pub use stealth_address::{derive_shared_secret, StealthAddress, StealthOutputKeys};
