//! Error types for the anonymous-output transaction engine
//!
//! Errors are grouped by how a caller is expected to react to them:
//!
//! - [`ValidationError`]: a transaction, proof or signature is malformed. The
//!   node rejects the single transaction; the sender aborts the send.
//! - [`ConsistencyError`]: the anonymity-set index moved underneath a ring
//!   (reorganization). The wallet must rebuild and rebroadcast.
//! - [`ResourceError`]: the request cannot be satisfied with the funds or
//!   decoys available. Surfaced to the caller, never retried.
//! - [`StateError`]: the wallet is in the wrong state for the operation.
//!
//! All of them fold into [`WalletError`], which is what the public API returns.

use thiserror::Error;

use crate::data_structures::types::{KeyImage, OutputRef, TxId};

/// Result alias used throughout the crate
pub type WalletResult<T> = Result<T, WalletError>;

/// Top level error type returned by the engine
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Key management error: {0}")]
    KeyManagement(#[from] KeyManagementError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl WalletError {
    /// True when the caller should rebuild the transaction against a fresh ledger view
    pub fn requires_rebuild(&self) -> bool {
        matches!(self, WalletError::Consistency(_))
    }

    /// True when the failure was caused by a malformed transaction
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WalletError::Validation(_) | WalletError::Crypto(CryptoError::RangeProof(_))
        )
    }
}

/// Malformed or non-verifying transaction data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Transaction has no outputs")]
    NoOutputs,

    #[error("Transaction has no inputs")]
    NoInputs,

    #[error("Coinbase transaction outside of block assembly")]
    UnexpectedCoinbase,

    #[error("Range proof verification failed for output {0}")]
    RangeProofFailed(usize),

    #[error("Commitment balance check failed")]
    BalanceMismatch,

    #[error("Ring signature verification failed for input {0}")]
    InvalidSignature(usize),

    #[error("Key image {0} already spent")]
    KeyImageSpent(KeyImage),

    #[error("Key image {0} conflicts with a transaction in the mempool")]
    KeyImageInMempool(KeyImage),

    #[error("Key image {0} used twice in one transaction")]
    DuplicateKeyImage(KeyImage),

    #[error("Output {0} is unknown or already spent")]
    MissingPrevout(OutputRef),

    #[error("Output {0} cannot be spent as {1} input")]
    PrevoutKindMismatch(OutputRef, String),

    #[error("Anonymous output key already present in the anonymity set")]
    AnonOutputKnown,

    #[error("Ring for input {input} has {size} members, allowed range is {min}..={max}")]
    RingSizeOutOfRange {
        input: usize,
        size: usize,
        min: usize,
        max: usize,
    },

    #[error("Ring for input {0} references the same index twice")]
    DuplicateRingMember(usize),

    #[error("Too many anonymous inputs: {0}")]
    TooManyAnonInputs(usize),

    #[error("Fee {fee} below relay minimum {minimum}")]
    FeeBelowMinimum { fee: u64, minimum: u64 },

    #[error("Malformed transaction data: {0}")]
    Malformed(String),

    #[error("Transaction {0} already known")]
    AlreadyKnown(TxId),
}

/// The anonymity set changed underneath an in-flight ring
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("Anonymity index {0} not found")]
    IndexNotFound(u64),

    #[error("Ring of transaction {txid} references invalidated index {index}")]
    RingInvalidated { txid: TxId, index: u64 },

    #[error("Block at height {got} does not follow the last scanned block, expected {expected}")]
    NonContiguousBlock { expected: u64, got: u64 },

    #[error("Cannot disconnect the genesis block")]
    GenesisDisconnect,

    #[error("Block at height {0} not found")]
    BlockNotFound(u64),
}

/// The request cannot be satisfied with what the wallet or ledger holds
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Not enough eligible decoys: requested {requested}, available {available}")]
    NoEligibleDecoys { requested: usize, available: usize },

    #[error("All candidate inputs are locked")]
    LockedInputsOnly,

    #[error("Invalid ring size {size}, allowed range is {min}..={max}")]
    InvalidRingSize { size: usize, min: usize, max: usize },

    #[error("Fee rate {rate} below minimum relay rate {minimum}")]
    FeeTooLow { rate: u64, minimum: u64 },

    #[error("Amount {amount} does not cover its fee share {fee}")]
    AmountBelowFee { amount: u64, fee: u64 },

    #[error("Amount overflow")]
    AmountOverflow,
}

/// The wallet is not in a state that allows the operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Wallet is locked")]
    WalletLocked,

    #[error("Wallet is not encrypted")]
    NotEncrypted,

    #[error("Wallet is already encrypted")]
    AlreadyEncrypted,

    #[error("The passphrase entered was incorrect")]
    IncorrectPassphrase,

    #[error("Wallet has no account, import a mnemonic first")]
    NoAccount,

    #[error("Wallet already holds account {0}")]
    AccountExists(String),

    #[error("Output {0} is not owned by this wallet")]
    UnknownOutput(OutputRef),

    #[error("Output {0} is already spent")]
    OutputSpent(OutputRef),

    #[error("Output {0} is already locked")]
    AlreadyLocked(OutputRef),

    #[error("Output {0} is locked")]
    OutputLocked(OutputRef),

    #[error("Output {0} is reserved by pending transaction {1}")]
    OutputReserved(OutputRef, TxId),

    #[error("Invalid parameter, expected locked output {0}")]
    NotLocked(OutputRef),

    #[error("Output {0} kind does not match the requested input kind")]
    KindMismatch(OutputRef),

    #[error("Amount of output {0} is not known yet")]
    AmountUnknown(OutputRef),

    #[error("Wallet requires unlocking to process blocks")]
    ScanRequiresUnlock,
}

/// Key derivation and address errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyManagementError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Low level cryptographic failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Range proof error: {0}")]
    RangeProof(String),

    #[error("Invalid point encoding: {0}")]
    InvalidPoint(String),

    #[error("Invalid scalar encoding: {0}")]
    InvalidScalar(String),

    #[error("Signer index {index} out of bounds for ring of size {ring_size}")]
    SignerIndexOutOfBounds { index: usize, ring_size: usize },

    #[error("Ring is empty")]
    EmptyRing,

    #[error("Signature does not close the ring")]
    SignatureMismatch,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation function failed: {0}")]
    Kdf(String),
}

/// Encoding failures for persisted or hashed data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Borsh serialization error: {0}")]
    BorshSerializationError(String),

    #[error("JSON serialization error: {0}")]
    Json(String),

    #[error("Hex decoding error: {0}")]
    Hex(String),
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::Serialization(SerializationError::Json(err.to_string()))
    }
}

impl From<std::io::Error> for SerializationError {
    fn from(err: std::io::Error) -> Self {
        SerializationError::BorshSerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err: WalletError = ConsistencyError::IndexNotFound(7).into();
        assert!(err.requires_rebuild());
        assert!(!err.is_validation());

        let err: WalletError = ValidationError::BalanceMismatch.into();
        assert!(err.is_validation());

        let err: WalletError = CryptoError::RangeProof("bad".into()).into();
        assert!(err.is_validation());
    }

    #[test]
    fn test_not_locked_message() {
        let outref = OutputRef::new(TxId([1u8; 32]), 3);
        let err = StateError::NotLocked(outref);
        assert!(err.to_string().contains("expected locked output"));
    }
}
