//! Transaction construction: input selection, ring assembly, fees and signing

pub mod fee;
pub mod prepare;
pub mod transaction_builder;
pub mod types;

pub use fee::{estimate_fee, estimate_weight, TxShape, ANON_FEE_MULTIPLIER};
pub use prepare::{build_anon_ring, InputSelector, PreparedRing, UtxoSelection};
pub use transaction_builder::{
    split_subtracted_fee, BuiltTransaction, SpendableInput, TransactionBuilder,
};
pub use types::{PaymentRecipient, SentTransaction, TransferRequest};
