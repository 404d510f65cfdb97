//! Weight based fee estimation shared by builder and validator
//!
//! Weights approximate the serialized size of each component. Ring inputs
//! count [`ANON_FEE_MULTIPLIER`] times, so larger rings pay proportionally.

use crate::data_structures::{output::OutputKind, transaction::Transaction};

pub const ANON_FEE_MULTIPLIER: u64 = 2;

const BASE_WEIGHT: u64 = 16;
const KEY_SIZE: u64 = 32;
const RANGE_PROOF_SIZE: u64 = 672;
const AMOUNT_PAYLOAD_SIZE: u64 = 24 + 40 + 16;

/// Kinds and ring sizes of a transaction, enough to price it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxShape {
    /// `(kind, ring size)` per input
    pub inputs: Vec<(OutputKind, usize)>,
    pub outputs: Vec<OutputKind>,
}

impl TxShape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inputs(mut self, kind: OutputKind, ring_size: usize, count: usize) -> Self {
        self.inputs
            .extend(std::iter::repeat((kind, ring_size)).take(count));
        self
    }

    pub fn with_outputs(mut self, kind: OutputKind, count: usize) -> Self {
        self.outputs.extend(std::iter::repeat(kind).take(count));
        self
    }

    pub fn of_transaction(tx: &Transaction) -> Self {
        Self {
            inputs: tx
                .inputs
                .iter()
                .map(|i| (i.source.kind(), i.source.ring_size()))
                .collect(),
            outputs: tx.outputs.iter().map(|o| o.kind()).collect(),
        }
    }
}

fn input_weight(kind: OutputKind, ring_size: usize) -> u64 {
    let ring = ring_size as u64;
    // key image, pseudo output, c1, d and one response per member
    let signature = KEY_SIZE * 4 + KEY_SIZE * ring + 4;
    match kind {
        OutputKind::Plain | OutputKind::Confidential => 1 + KEY_SIZE + 4 + signature,
        OutputKind::Anonymous => (1 + 4 + 8 * ring + signature) * ANON_FEE_MULTIPLIER,
    }
}

fn output_weight(kind: OutputKind) -> u64 {
    let keys = KEY_SIZE * 2 + 4;
    match kind {
        OutputKind::Plain => keys + 1 + 8,
        OutputKind::Confidential | OutputKind::Anonymous => {
            keys + AMOUNT_PAYLOAD_SIZE + 1 + KEY_SIZE + 4 + RANGE_PROOF_SIZE
        }
    }
}

pub fn estimate_weight(shape: &TxShape) -> u64 {
    BASE_WEIGHT
        + shape
            .inputs
            .iter()
            .map(|(kind, ring)| input_weight(*kind, *ring))
            .sum::<u64>()
        + shape.outputs.iter().map(|k| output_weight(*k)).sum::<u64>()
}

/// Fee at `rate` per 1000 weight units, rounded up
pub fn fee_for_weight(rate: u64, weight: u64) -> u64 {
    rate.saturating_mul(weight).div_ceil(1000)
}

pub fn estimate_fee(rate: u64, shape: &TxShape) -> u64 {
    fee_for_weight(rate, estimate_weight(shape))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_inputs_cost_more() {
        let plain = TxShape::new()
            .with_inputs(OutputKind::Confidential, 1, 1)
            .with_outputs(OutputKind::Confidential, 2);
        let anon = TxShape::new()
            .with_inputs(OutputKind::Anonymous, 5, 1)
            .with_outputs(OutputKind::Confidential, 2);
        assert!(estimate_weight(&anon) > estimate_weight(&plain));

        let bigger_ring = TxShape::new()
            .with_inputs(OutputKind::Anonymous, 11, 1)
            .with_outputs(OutputKind::Confidential, 2);
        assert!(estimate_weight(&bigger_ring) > estimate_weight(&anon));
    }

    #[test]
    fn test_fee_rounds_up() {
        assert_eq!(fee_for_weight(1000, 1), 1);
        assert_eq!(fee_for_weight(1, 1), 1);
        assert_eq!(fee_for_weight(0, 500), 0);
        assert_eq!(fee_for_weight(2000, 1500), 3000);
    }

    #[test]
    fn test_more_outputs_more_fee() {
        let one = TxShape::new()
            .with_inputs(OutputKind::Plain, 1, 1)
            .with_outputs(OutputKind::Plain, 1);
        let two = one.clone().with_outputs(OutputKind::Anonymous, 1);
        assert!(estimate_fee(20_000, &two) > estimate_fee(20_000, &one));
    }
}
