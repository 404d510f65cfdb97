//! Chain data types: keys, commitments, outputs, transactions and blocks

pub mod block;
pub mod output;
pub mod transaction;
pub mod types;

pub use block::{Block, ConfirmedBlock, PositionedOutput};
pub use output::{OutputBody, OutputKind, TxOutput};
pub use transaction::{ClsagSignature, InputSource, Transaction, TxInput};
pub use types::{Commitment, KeyImage, OutputRef, PrivateKey, PublicKey, TxId};
