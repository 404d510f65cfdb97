use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::hash::{hash_256, DOMAIN_TXID, DOMAIN_TX_PREFIX},
    data_structures::{
        output::{OutputKind, TxOutput},
        types::{Commitment, KeyImage, OutputRef, TxId},
    },
    errors::SerializationError,
};

pub const TRANSACTION_VERSION: u8 = 1;

/// CLSAG signature: initial challenge, one response per ring member and the
/// commitment auxiliary image `D`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ClsagSignature {
    pub c1: [u8; 32],
    pub s: Vec<[u8; 32]>,
    pub d: [u8; 32],
}

/// What an input spends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum InputSource {
    /// A plain output, signed as a ring of one
    Plain(OutputRef),
    /// A confidential output, signed as a ring of one
    Confidential(OutputRef),
    /// One of the listed anonymity-set indices
    Anonymous { ring: Vec<u64> },
}

impl InputSource {
    pub fn kind(&self) -> OutputKind {
        match self {
            InputSource::Plain(_) => OutputKind::Plain,
            InputSource::Confidential(_) => OutputKind::Confidential,
            InputSource::Anonymous { .. } => OutputKind::Anonymous,
        }
    }

    pub fn prevout(&self) -> Option<&OutputRef> {
        match self {
            InputSource::Plain(outref) | InputSource::Confidential(outref) => Some(outref),
            InputSource::Anonymous { .. } => None,
        }
    }

    pub fn ring_size(&self) -> usize {
        match self {
            InputSource::Anonymous { ring } => ring.len(),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TxInput {
    pub source: InputSource,
    pub key_image: KeyImage,
    /// Re-blinded commitment to the spent amount
    pub pseudo_out: Commitment,
    pub signature: ClsagSignature,
}

/// Signature-free view of an input, hashed into the signing message
#[derive(BorshSerialize)]
struct InputPrefix<'a> {
    source: &'a InputSource,
    pseudo_out: &'a Commitment,
}

#[derive(BorshSerialize)]
struct TransactionPrefix<'a> {
    version: u8,
    inputs: Vec<InputPrefix<'a>>,
    outputs: &'a [TxOutput],
    fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub version: u8,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, fee: u64) -> Self {
        Self {
            version: TRANSACTION_VERSION,
            inputs,
            outputs,
            fee,
        }
    }

    /// Block reward paying plain outputs. Carries no inputs and no fee.
    pub fn coinbase(outputs: Vec<TxOutput>) -> Self {
        Self::new(Vec::new(), outputs, 0)
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Message every input signature commits to. Covers everything except the
    /// signatures and key images themselves.
    pub fn prefix_hash(&self) -> Result<[u8; 32], SerializationError> {
        let prefix = TransactionPrefix {
            version: self.version,
            inputs: self
                .inputs
                .iter()
                .map(|input| InputPrefix {
                    source: &input.source,
                    pseudo_out: &input.pseudo_out,
                })
                .collect(),
            outputs: &self.outputs,
            fee: self.fee,
        };
        let bytes = borsh::to_vec(&prefix)?;
        Ok(hash_256(DOMAIN_TX_PREFIX, &[&bytes]))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(borsh::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        Ok(borsh::from_slice(bytes)?)
    }

    pub fn txid(&self) -> Result<TxId, SerializationError> {
        Ok(TxId(hash_256(DOMAIN_TXID, &[&self.to_bytes()?])))
    }

    /// Serialized size in bytes
    pub fn weight(&self) -> Result<usize, SerializationError> {
        Ok(self.to_bytes()?.len())
    }

    pub fn key_images(&self) -> impl Iterator<Item = &KeyImage> {
        self.inputs.iter().map(|i| &i.key_image)
    }

    pub fn anon_input_count(&self) -> usize {
        self.inputs
            .iter()
            .filter(|i| matches!(i.source, InputSource::Anonymous { .. }))
            .count()
    }

    pub fn anon_output_count(&self) -> usize {
        self.outputs
            .iter()
            .filter(|o| o.kind() == OutputKind::Anonymous)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{output::OutputBody, types::PublicKey};

    fn sample_tx() -> Transaction {
        Transaction::new(
            vec![TxInput {
                source: InputSource::Anonymous { ring: vec![3, 1, 7] },
                key_image: KeyImage([5u8; 32]),
                pseudo_out: Commitment([6u8; 32]),
                signature: ClsagSignature {
                    c1: [1u8; 32],
                    s: vec![[2u8; 32]; 3],
                    d: [3u8; 32],
                },
            }],
            vec![TxOutput {
                one_time_key: PublicKey([7u8; 32]),
                ephemeral_key: PublicKey([8u8; 32]),
                encrypted_data: vec![1, 2, 3],
                body: OutputBody::Plain { value: 99 },
            }],
            10,
        )
    }

    #[test]
    fn test_prefix_hash_ignores_signatures() {
        let tx = sample_tx();
        let mut resigned = tx.clone();
        resigned.inputs[0].signature.c1 = [9u8; 32];
        assert_eq!(tx.prefix_hash().unwrap(), resigned.prefix_hash().unwrap());
        assert_ne!(tx.txid().unwrap(), resigned.txid().unwrap());
    }

    #[test]
    fn test_prefix_hash_covers_fee_and_ring() {
        let tx = sample_tx();
        let mut higher_fee = tx.clone();
        higher_fee.fee += 1;
        assert_ne!(tx.prefix_hash().unwrap(), higher_fee.prefix_hash().unwrap());

        let mut other_ring = tx.clone();
        other_ring.inputs[0].source = InputSource::Anonymous { ring: vec![3, 1, 8] };
        assert_ne!(tx.prefix_hash().unwrap(), other_ring.prefix_hash().unwrap());
    }

    #[test]
    fn test_serialization_round_trip() {
        let tx = sample_tx();
        let decoded = Transaction::from_bytes(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.anon_input_count(), 1);
        assert!(!decoded.is_coinbase());
    }
}
