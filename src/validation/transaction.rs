//! Consensus rules for confidential and anonymous transactions

use std::collections::HashSet;

use tracing::debug;

use crate::{
    config::{EngineConfig, MAX_ANON_INPUTS, MAX_RING_SIZE, MIN_RING_SIZE},
    crypto::{
        clsag::{self, RingMember},
        commitment::verify_balance,
        range_proof::verify_range,
    },
    data_structures::{
        output::OutputKind,
        transaction::{InputSource, Transaction},
        types::{Commitment, TxId},
    },
    errors::{ValidationError, WalletError, WalletResult},
    signing::fee::{estimate_fee, TxShape},
};

use super::ChainContext;

/// Stateless rule set; chain lookups go through a [`ChainContext`]
#[derive(Debug, Clone)]
pub struct TransactionValidator {
    pub min_ring_size: usize,
    pub max_ring_size: usize,
    pub max_anon_inputs: usize,
    pub min_relay_fee_rate: u64,
}

impl Default for TransactionValidator {
    fn default() -> Self {
        Self {
            min_ring_size: MIN_RING_SIZE,
            max_ring_size: MAX_RING_SIZE,
            max_anon_inputs: MAX_ANON_INPUTS,
            min_relay_fee_rate: 0,
        }
    }
}

impl TransactionValidator {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_ring_size: config.min_ring_size,
            max_ring_size: config.max_ring_size,
            max_anon_inputs: config.max_anon_inputs,
            min_relay_fee_rate: config.min_relay_fee_rate,
        }
    }

    /// Check `tx` against the chain state behind `ctx`. When `check_mempool`
    /// is set, key images already claimed by a pooled transaction are
    /// conflicts too.
    pub fn validate<C: ChainContext + ?Sized>(
        &self,
        tx: &Transaction,
        ctx: &C,
        check_mempool: bool,
    ) -> WalletResult<TxId> {
        let txid = tx.txid()?;
        if tx.is_coinbase() {
            return Err(ValidationError::UnexpectedCoinbase.into());
        }
        if tx.outputs.is_empty() {
            return Err(ValidationError::NoOutputs.into());
        }
        let anon_inputs = tx.anon_input_count();
        if anon_inputs > self.max_anon_inputs {
            return Err(ValidationError::TooManyAnonInputs(anon_inputs).into());
        }

        self.check_key_images(tx, ctx, check_mempool)?;
        let rings = self.resolve_rings(tx, ctx)?;
        self.check_outputs(tx, ctx)?;

        let minimum = estimate_fee(self.min_relay_fee_rate, &TxShape::of_transaction(tx));
        if tx.fee < minimum {
            return Err(ValidationError::FeeBelowMinimum {
                fee: tx.fee,
                minimum,
            }
            .into());
        }

        let pseudo_outs: Vec<Commitment> = tx.inputs.iter().map(|i| i.pseudo_out).collect();
        let output_commitments: Vec<Commitment> = tx.outputs.iter().map(|o| o.commitment()).collect();
        if !verify_balance(&pseudo_outs, &output_commitments, tx.fee)? {
            return Err(ValidationError::BalanceMismatch.into());
        }

        let message = tx.prefix_hash()?;
        for (i, (input, ring)) in tx.inputs.iter().zip(rings.iter()).enumerate() {
            let valid = clsag::verify(
                &message,
                ring,
                &input.pseudo_out,
                &input.key_image,
                &input.signature,
            )
            .map_err(|e| {
                debug!("input {} signature undecodable: {}", i, e);
                WalletError::Validation(ValidationError::InvalidSignature(i))
            })?;
            if !valid {
                return Err(ValidationError::InvalidSignature(i).into());
            }
        }

        debug!(
            txid = %txid,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee = tx.fee,
            "transaction valid"
        );
        Ok(txid)
    }

    fn check_key_images<C: ChainContext + ?Sized>(
        &self,
        tx: &Transaction,
        ctx: &C,
        check_mempool: bool,
    ) -> WalletResult<()> {
        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let key_image = input.key_image;
            if !clsag::is_valid_key_image(&key_image) {
                return Err(ValidationError::Malformed(format!("invalid key image {key_image}")).into());
            }
            if !seen.insert(key_image) {
                return Err(ValidationError::DuplicateKeyImage(key_image).into());
            }
            if ctx.key_image_spend(&key_image).is_some() {
                return Err(ValidationError::KeyImageSpent(key_image).into());
            }
            if check_mempool && ctx.mempool_spender(&key_image).is_some() {
                return Err(ValidationError::KeyImageInMempool(key_image).into());
            }
        }
        Ok(())
    }

    fn resolve_rings<C: ChainContext + ?Sized>(
        &self,
        tx: &Transaction,
        ctx: &C,
    ) -> WalletResult<Vec<Vec<RingMember>>> {
        let mut rings = Vec::with_capacity(tx.inputs.len());
        for (i, input) in tx.inputs.iter().enumerate() {
            let ring = match &input.source {
                InputSource::Anonymous { ring } => {
                    if ring.len() < self.min_ring_size || ring.len() > self.max_ring_size {
                        return Err(ValidationError::RingSizeOutOfRange {
                            input: i,
                            size: ring.len(),
                            min: self.min_ring_size,
                            max: self.max_ring_size,
                        }
                        .into());
                    }
                    let unique: HashSet<&u64> = ring.iter().collect();
                    if unique.len() != ring.len() {
                        return Err(ValidationError::DuplicateRingMember(i).into());
                    }
                    ring.iter()
                        .map(|index| {
                            ctx.anon_output(*index)
                                .map(|o| RingMember::new(o.one_time_key, o.commitment))
                                .map_err(WalletError::from)
                        })
                        .collect::<WalletResult<Vec<_>>>()?
                }
                InputSource::Plain(outref) | InputSource::Confidential(outref) => {
                    let entry = ctx
                        .prevout(outref)
                        .ok_or(ValidationError::MissingPrevout(*outref))?;
                    if entry.kind != input.source.kind() {
                        return Err(ValidationError::PrevoutKindMismatch(
                            *outref,
                            input.source.kind().to_string(),
                        )
                        .into());
                    }
                    vec![RingMember::new(entry.one_time_key, entry.commitment)]
                }
            };
            rings.push(ring);
        }
        Ok(rings)
    }

    fn check_outputs<C: ChainContext + ?Sized>(&self, tx: &Transaction, ctx: &C) -> WalletResult<()> {
        let mut keys = HashSet::with_capacity(tx.outputs.len());
        for (n, output) in tx.outputs.iter().enumerate() {
            if !keys.insert(output.one_time_key) {
                return Err(ValidationError::Malformed(format!("output {n} repeats a one-time key")).into());
            }
            if output.kind() == OutputKind::Anonymous && ctx.is_anon_key_known(&output.one_time_key) {
                return Err(ValidationError::AnonOutputKnown.into());
            }
            if let Some(proof) = output.range_proof() {
                if !verify_range(&output.commitment(), proof)? {
                    return Err(ValidationError::RangeProofFailed(n).into());
                }
            }
        }
        Ok(())
    }
}
