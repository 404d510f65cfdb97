//! Assembles and signs transactions between any pair of output kinds
//!
//! The builder receives fully resolved inputs (owned output, one-time private
//! key, ring) and planned outputs with exact amounts. Selection, decoy sampling
//! and fee calculation happen before it runs; everything here is CPU work.

use curve25519_dalek::scalar::Scalar;
use rand::{rngs::OsRng, seq::SliceRandom};
use tracing::debug;

use super::{prepare::ring_builder::PreparedRing, types::PaymentRecipient};
use crate::{
    crypto::{
        clsag,
        commitment::{balance_blinding, checked_sum, commit},
        encryption::encrypt_amount,
        range_proof::prove_range,
    },
    data_structures::{
        output::{OutputBody, OutputKind, TxOutput},
        transaction::{ClsagSignature, Transaction, TxInput},
        types::{KeyImage, PrivateKey, TxId},
    },
    errors::{ResourceError, StateError, ValidationError, WalletResult},
    key_management::stealth_address::{StealthAddress, StealthOutputKeys},
    storage::OwnedOutput,
};

/// A real input ready to be signed
pub struct SpendableInput {
    pub output: OwnedOutput,
    /// One-time private key of `output`
    pub secret: PrivateKey,
    pub ring: PreparedRing,
}

#[derive(Debug, Clone)]
struct PlannedOutput {
    address: StealthAddress,
    amount: u64,
    kind: OutputKind,
    is_change: bool,
}

#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub transaction: Transaction,
    pub txid: TxId,
    pub fee: u64,
    /// Ring indices of each anonymous input
    pub rings: Vec<Vec<u64>>,
    pub change_vout: Option<u32>,
}

pub struct TransactionBuilder {
    input_kind: OutputKind,
    output_kind: OutputKind,
    inputs: Vec<SpendableInput>,
    outputs: Vec<PlannedOutput>,
    fee: u64,
}

impl TransactionBuilder {
    pub fn new(input_kind: OutputKind, output_kind: OutputKind) -> Self {
        Self {
            input_kind,
            output_kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
            fee: 0,
        }
    }

    pub fn add_input(mut self, input: SpendableInput) -> Self {
        self.inputs.push(input);
        self
    }

    /// Pay `amount` to `address` with an output of the builder's output kind
    pub fn add_output(mut self, address: StealthAddress, amount: u64) -> Self {
        self.outputs.push(PlannedOutput {
            address,
            amount,
            kind: self.output_kind,
            is_change: false,
        });
        self
    }

    /// Change returns to the sender with the kind it was spent from
    pub fn add_change(mut self, address: StealthAddress, amount: u64) -> Self {
        self.outputs.push(PlannedOutput {
            address,
            amount,
            kind: self.input_kind,
            is_change: true,
        });
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    fn check_amounts(&self) -> WalletResult<Vec<Scalar>> {
        if self.inputs.is_empty() {
            return Err(ValidationError::NoInputs.into());
        }
        if self.outputs.is_empty() {
            return Err(ValidationError::NoOutputs.into());
        }

        let mut blindings = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            let output = &input.output;
            if output.kind != self.input_kind {
                return Err(StateError::KindMismatch(output.outref).into());
            }
            if output.amount.is_none() {
                return Err(StateError::AmountUnknown(output.outref).into());
            }
            let blinding = output
                .blinding_scalar()
                .ok_or(StateError::AmountUnknown(output.outref))?;
            blindings.push(blinding);
        }

        let available = checked_sum(self.inputs.iter().map(|i| i.output.value()))?;
        let required = checked_sum(
            self.outputs
                .iter()
                .map(|o| o.amount)
                .chain(std::iter::once(self.fee)),
        )?;
        if available < required {
            return Err(ResourceError::InsufficientFunds {
                available,
                required,
            }
            .into());
        }
        if available != required {
            return Err(ValidationError::BalanceMismatch.into());
        }
        Ok(blindings)
    }

    fn build_output(
        planned: &PlannedOutput,
        output_n: u32,
    ) -> WalletResult<(TxOutput, Scalar)> {
        let keys = StealthOutputKeys::generate(&planned.address, output_n)?;
        if planned.kind == OutputKind::Plain {
            let output = TxOutput {
                one_time_key: keys.one_time_key,
                ephemeral_key: keys.ephemeral_key,
                encrypted_data: Vec::new(),
                body: OutputBody::Plain {
                    value: planned.amount,
                },
            };
            return Ok((output, Scalar::ZERO));
        }

        let blinding = Scalar::random(&mut OsRng);
        let (range_proof, commitment) = prove_range(planned.amount, &blinding)?;
        let encrypted_data = encrypt_amount(
            &keys.amount_key,
            &keys.one_time_key,
            planned.amount,
            &blinding,
        )?;
        let body = match planned.kind {
            OutputKind::Anonymous => OutputBody::Anonymous {
                commitment,
                range_proof,
            },
            _ => OutputBody::Confidential {
                commitment,
                range_proof,
            },
        };
        Ok((
            TxOutput {
                one_time_key: keys.one_time_key,
                ephemeral_key: keys.ephemeral_key,
                encrypted_data,
                body,
            },
            blinding,
        ))
    }

    pub fn build(mut self) -> WalletResult<BuiltTransaction> {
        let input_blindings = self.check_amounts()?;

        self.outputs.shuffle(&mut OsRng);

        let mut outputs = Vec::with_capacity(self.outputs.len());
        let mut output_blindings = Vec::with_capacity(self.outputs.len());
        let mut change_vout = None;
        for (n, planned) in self.outputs.iter().enumerate() {
            let (output, blinding) = Self::build_output(planned, n as u32)?;
            if planned.is_change {
                change_vout = Some(n as u32);
            }
            outputs.push(output);
            output_blindings.push(blinding);
        }

        // Pseudo outputs re-blind each input; the last one closes the balance
        let last = self.inputs.len() - 1;
        let mut pseudo_blindings: Vec<Scalar> =
            (0..last).map(|_| Scalar::random(&mut OsRng)).collect();
        pseudo_blindings.push(balance_blinding(&output_blindings, &pseudo_blindings));

        let placeholder = ClsagSignature {
            c1: [0u8; 32],
            s: Vec::new(),
            d: [0u8; 32],
        };
        let inputs = self
            .inputs
            .iter()
            .zip(&pseudo_blindings)
            .map(|(input, pseudo_blinding)| TxInput {
                source: input.ring.input_source(&input.output),
                key_image: KeyImage([0u8; 32]),
                pseudo_out: commit(input.output.value(), pseudo_blinding),
                signature: placeholder.clone(),
            })
            .collect();

        let mut transaction = Transaction::new(inputs, outputs, self.fee);
        let message = transaction.prefix_hash()?;

        for (i, input) in self.inputs.iter().enumerate() {
            let mask_difference = input_blindings[i] - pseudo_blindings[i];
            let (signature, key_image) = clsag::sign(
                &message,
                &input.ring.members,
                &transaction.inputs[i].pseudo_out,
                input.ring.real_position,
                &input.secret,
                &mask_difference,
            )?;
            transaction.inputs[i].signature = signature;
            transaction.inputs[i].key_image = key_image;
        }

        let txid = transaction.txid()?;
        let rings = self
            .inputs
            .iter()
            .filter(|i| i.output.kind == OutputKind::Anonymous)
            .map(|i| i.ring.indices.clone())
            .collect();

        debug!(
            txid = %txid,
            inputs = transaction.inputs.len(),
            outputs = transaction.outputs.len(),
            fee = self.fee,
            "built transaction"
        );

        Ok(BuiltTransaction {
            transaction,
            txid,
            fee: self.fee,
            rings,
            change_vout,
        })
    }
}

/// Amounts each recipient receives once flagged recipients cover `fee`.
///
/// The fee is split evenly between flagged recipients; the first flagged
/// recipient also pays the remainder of the division.
pub fn split_subtracted_fee(recipients: &[PaymentRecipient], fee: u64) -> WalletResult<Vec<u64>> {
    let flagged = recipients.iter().filter(|r| r.subtract_fee).count() as u64;
    if flagged == 0 {
        return Ok(recipients.iter().map(|r| r.amount).collect());
    }

    let share = fee / flagged;
    let mut remainder = fee % flagged;
    recipients
        .iter()
        .map(|recipient| {
            if !recipient.subtract_fee {
                return Ok(recipient.amount);
            }
            let deduction = share + remainder;
            remainder = 0;
            if recipient.amount <= deduction {
                return Err(ResourceError::AmountBelowFee {
                    amount: recipient.amount,
                    fee: deduction,
                }
                .into());
            }
            Ok(recipient.amount - deduction)
        })
        .collect()
}
