//! Anonymous-output transaction engine
//!
//! This crate provides wallet functionality for a chain carrying three kinds of
//! outputs: plain outputs with public amounts, confidential outputs hiding
//! their amount behind a Pedersen commitment, and anonymous outputs that are
//! additionally spent through CLSAG rings over a global anonymity set.
//!
//! ## Layout
//!
//! - [`key_management`]: BIP39 mnemonics, the hardened key hierarchy and
//!   stealth addresses
//! - [`crypto`]: commitments, range proofs, ring signatures and payload
//!   encryption
//! - [`ledger`]: the [`ledger::LedgerView`] interface and an in-process
//!   [`ledger::LocalLedger`] that validates, confirms and reorganizes
//! - [`signing`]: input selection, ring building and transaction assembly
//! - [`wallet`]: the [`wallet::Wallet`] facade tying everything together
//!
//! ## Features
//!
//! - `storage`: Enables SQLite persistence through [`storage::SqliteStorage`]
//!
//! Enable it in your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! anon_wallet_libs = { version = "0.1", features = ["storage"] }
//! ```
//!
//! Without the `storage` feature, wallets persist through
//! [`storage::MemoryStorage`] only.

pub mod config;
pub mod crypto;
pub mod data_structures;
pub mod errors;
pub mod events;
pub mod key_management;
pub mod ledger;
pub mod scanning;
pub mod signing;
pub mod storage;
pub mod validation;
pub mod wallet;

pub use config::{EngineConfig, ScanPolicy};
pub use data_structures::{
    output::OutputKind,
    types::{OutputRef, TxId},
};
pub use errors::*;
pub use key_management::StealthAddress;
pub use signing::{PaymentRecipient, SentTransaction, TransferRequest};
pub use wallet::{Wallet, WalletBuilder};
