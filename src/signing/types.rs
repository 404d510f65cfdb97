use serde::{Deserialize, Serialize};

use crate::{
    data_structures::{
        output::OutputKind,
        types::{OutputRef, TxId},
    },
    key_management::stealth_address::StealthAddress,
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRecipient {
    pub address: StealthAddress,
    pub amount: u64,
    /// Take this recipient's share of the fee out of `amount`
    pub subtract_fee: bool,
}

impl PaymentRecipient {
    pub fn new(address: StealthAddress, amount: u64) -> Self {
        Self {
            address,
            amount,
            subtract_fee: false,
        }
    }

    pub fn subtracting_fee(mut self) -> Self {
        self.subtract_fee = true;
        self
    }
}

/// A send between two output kinds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
    pub input_kind: OutputKind,
    pub output_kind: OutputKind,
    pub recipients: Vec<PaymentRecipient>,
    /// Fee per 1000 weight units, the configured rate when `None`
    pub fee_rate: Option<u64>,
    /// Ring size for anonymous inputs, the configured default when `None`
    pub ring_size: Option<usize>,
    /// Coin control: spend exactly these outputs
    pub inputs: Option<Vec<OutputRef>>,
    pub comment: Option<String>,
    /// Build and price the transaction without reserving or broadcasting
    pub test_fee: bool,
}

impl TransferRequest {
    pub fn new(input_kind: OutputKind, output_kind: OutputKind) -> Self {
        Self {
            input_kind,
            output_kind,
            recipients: Vec::new(),
            fee_rate: None,
            ring_size: None,
            inputs: None,
            comment: None,
            test_fee: false,
        }
    }

    pub fn with_recipient(mut self, recipient: PaymentRecipient) -> Self {
        self.recipients.push(recipient);
        self
    }

    pub fn with_fee_rate(mut self, fee_rate: u64) -> Self {
        self.fee_rate = Some(fee_rate);
        self
    }

    pub fn with_ring_size(mut self, ring_size: usize) -> Self {
        self.ring_size = Some(ring_size);
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<OutputRef>) -> Self {
        self.inputs = Some(inputs);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.test_fee = true;
        self
    }

    pub fn total_amount(&self) -> Option<u64> {
        self.recipients
            .iter()
            .try_fold(0u64, |acc, r| acc.checked_add(r.amount))
    }

    pub fn subtracts_fee(&self) -> bool {
        self.recipients.iter().any(|r| r.subtract_fee)
    }
}

/// Result of a send or a fee test
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SentTransaction {
    pub txid: TxId,
    pub fee: u64,
    /// Serialized size in bytes
    pub size: usize,
    /// Anonymity-set indices of each anonymous input's ring
    pub rings: Vec<Vec<u64>>,
    /// Amounts actually paid to each recipient, in request order
    pub recipient_amounts: Vec<u64>,
    pub change: Option<u64>,
    /// False for dry runs
    pub broadcast: bool,
}
