//! Cryptographic building blocks
//!
//! - [`hash`]: domain separated hashing onto scalars and points
//! - [`commitment`]: Pedersen commitments and balance arithmetic
//! - [`range_proof`]: 64-bit Bulletproofs
//! - [`clsag`]: linkable ring signatures and key images
//! - [`encryption`]: XChaCha20-Poly1305 payloads and Argon2id key stretching

pub mod clsag;
pub mod commitment;
pub mod encryption;
pub mod hash;
pub mod range_proof;

pub use clsag::{key_image, RingMember};
pub use commitment::{balance_blinding, commit, verify_balance};
pub use encryption::KdfParams;
pub use range_proof::{prove_range, verify_range, MAX_AMOUNT};
