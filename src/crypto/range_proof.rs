//! 64-bit Bulletproofs over the engine's Pedersen generators

use bulletproofs::{BulletproofGens, RangeProof};
use curve25519_dalek::{ristretto::CompressedRistretto, scalar::Scalar};
use lazy_static::lazy_static;
use merlin::Transcript;

use super::commitment::PEDERSEN_GENS;
use crate::{data_structures::types::Commitment, errors::CryptoError};

/// Bit width of every range proof
pub const RANGE_PROOF_BITS: usize = 64;

/// Largest provable amount
pub const MAX_AMOUNT: u64 = u64::MAX;

const TRANSCRIPT_LABEL: &[u8] = b"anon.output.range_proof";

lazy_static! {
    static ref BULLETPROOF_GENS: BulletproofGens = BulletproofGens::new(RANGE_PROOF_BITS, 1);
}

/// Prove that `amount` lies in `[0, MAX_AMOUNT]`, returning the serialized
/// proof and the commitment it is bound to.
pub fn prove_range(amount: u64, blinding: &Scalar) -> Result<(Vec<u8>, Commitment), CryptoError> {
    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
    let (proof, committed) = RangeProof::prove_single(
        &BULLETPROOF_GENS,
        &PEDERSEN_GENS,
        &mut transcript,
        amount,
        blinding,
        RANGE_PROOF_BITS,
    )
    .map_err(|e| CryptoError::RangeProof(e.to_string()))?;
    Ok((proof.to_bytes(), Commitment(committed.to_bytes())))
}

/// `Ok(false)` when a well formed proof does not verify against the
/// commitment; `Err(RangeProof)` when the bytes are not a proof at all.
pub fn verify_range(commitment: &Commitment, proof: &[u8]) -> Result<bool, CryptoError> {
    let proof = RangeProof::from_bytes(proof).map_err(|e| CryptoError::RangeProof(e.to_string()))?;
    let mut transcript = Transcript::new(TRANSCRIPT_LABEL);
    Ok(proof
        .verify_single(
            &BULLETPROOF_GENS,
            &PEDERSEN_GENS,
            &mut transcript,
            &CompressedRistretto(commitment.0),
            RANGE_PROOF_BITS,
        )
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::commitment::commit;
    use rand::rngs::OsRng;

    #[test]
    fn test_proof_verifies_and_matches_commitment() {
        let blinding = Scalar::random(&mut OsRng);
        let (proof, commitment) = prove_range(1_000, &blinding).unwrap();
        assert_eq!(commitment, commit(1_000, &blinding));
        assert!(verify_range(&commitment, &proof).unwrap());
    }

    #[test]
    fn test_extreme_amounts() {
        for amount in [0, MAX_AMOUNT] {
            let blinding = Scalar::random(&mut OsRng);
            let (proof, commitment) = prove_range(amount, &blinding).unwrap();
            assert!(verify_range(&commitment, &proof).unwrap());
        }
    }

    #[test]
    fn test_proof_bound_to_its_commitment() {
        let (proof, _) = prove_range(5, &Scalar::random(&mut OsRng)).unwrap();
        let other = commit(5, &Scalar::random(&mut OsRng));
        assert!(!verify_range(&other, &proof).unwrap());
    }

    #[test]
    fn test_malformed_proof_is_an_error() {
        let commitment = commit(5, &Scalar::ONE);
        assert!(matches!(
            verify_range(&commitment, &[1, 2, 3]),
            Err(CryptoError::RangeProof(_))
        ));
    }
}
