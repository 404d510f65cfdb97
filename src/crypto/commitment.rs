//! Pedersen commitments to amounts
//!
//! `commit(v, b) = v*H + b*G` where `G` is the Ristretto basepoint and `H` a
//! nothing-up-my-sleeve generator. Blinding factors live on `G` so that a
//! difference of two commitments to the same amount is a public key the ring
//! signature can prove knowledge of.

use bulletproofs::PedersenGens;
use curve25519_dalek::{
    constants::RISTRETTO_BASEPOINT_POINT, ristretto::RistrettoPoint, scalar::Scalar,
    traits::Identity,
};
use lazy_static::lazy_static;

use super::hash::{hash_to_point, DOMAIN_VALUE_GENERATOR};
use crate::{
    data_structures::types::Commitment,
    errors::{CryptoError, ResourceError},
};

lazy_static! {
    static ref VALUE_GENERATOR: RistrettoPoint = hash_to_point(DOMAIN_VALUE_GENERATOR, &[]);
    pub(crate) static ref PEDERSEN_GENS: PedersenGens = PedersenGens {
        B: *VALUE_GENERATOR,
        B_blinding: RISTRETTO_BASEPOINT_POINT,
    };
}

/// Generator carrying the committed value
pub fn value_generator() -> RistrettoPoint {
    *VALUE_GENERATOR
}

pub fn commit_point(amount: u64, blinding: &Scalar) -> RistrettoPoint {
    PEDERSEN_GENS.commit(Scalar::from(amount), *blinding)
}

pub fn commit(amount: u64, blinding: &Scalar) -> Commitment {
    Commitment::from_point(&commit_point(amount, blinding))
}

/// Commitment with zero blinding, used for plain outputs and the fee
pub fn commit_public(amount: u64) -> Commitment {
    commit(amount, &Scalar::ZERO)
}

/// Homomorphic sum of commitments
pub fn sum_commitments<'a, I>(commitments: I) -> Result<RistrettoPoint, CryptoError>
where
    I: IntoIterator<Item = &'a Commitment>,
{
    commitments
        .into_iter()
        .try_fold(RistrettoPoint::identity(), |acc, c| Ok(acc + c.to_point()?))
}

/// `sum(inputs) == sum(outputs) + fee*H`
pub fn verify_balance(
    inputs: &[Commitment],
    outputs: &[Commitment],
    fee: u64,
) -> Result<bool, CryptoError> {
    let lhs = sum_commitments(inputs)?;
    let rhs = sum_commitments(outputs)? + commit_point(fee, &Scalar::ZERO);
    Ok(lhs == rhs)
}

/// Blinding factor that makes `sum(positive) - sum(negative) - result == 0`.
///
/// Used to close the balance: given every output blinding factor and all but
/// one pseudo-input blinding factor, the result is the remaining one.
pub fn balance_blinding(positive: &[Scalar], negative: &[Scalar]) -> Scalar {
    let pos: Scalar = positive.iter().sum();
    let neg: Scalar = negative.iter().sum();
    pos - neg
}

pub fn checked_sum<I: IntoIterator<Item = u64>>(amounts: I) -> Result<u64, ResourceError> {
    amounts
        .into_iter()
        .try_fold(0u64, |acc, v| acc.checked_add(v))
        .ok_or(ResourceError::AmountOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_commit_is_additively_homomorphic() {
        for (a, c) in [(0u64, 0u64), (1, 2), (100, 250), (u32::MAX as u64, 77)] {
            let b = Scalar::random(&mut OsRng);
            let d = Scalar::random(&mut OsRng);
            let lhs = commit_point(a, &b) + commit_point(c, &d);
            let rhs = commit_point(a + c, &(b + d));
            assert_eq!(lhs, rhs);
        }
    }

    #[test]
    fn test_balance_blinding_closes_sum() {
        let outs = [Scalar::random(&mut OsRng), Scalar::random(&mut OsRng)];
        let first_in = Scalar::random(&mut OsRng);
        let last_in = balance_blinding(&outs, &[first_in]);

        let inputs = [commit(70, &first_in), commit(40, &last_in)];
        let outputs = [commit(60, &outs[0]), commit(45, &outs[1])];
        assert!(verify_balance(&inputs, &outputs, 5).unwrap());
        assert!(!verify_balance(&inputs, &outputs, 6).unwrap());
    }

    #[test]
    fn test_public_commitment_has_no_blinding() {
        assert_eq!(
            commit_public(42).to_point().unwrap(),
            value_generator() * Scalar::from(42u64)
        );
    }

    #[test]
    fn test_checked_sum_overflow() {
        assert_eq!(checked_sum([u64::MAX, 1]), Err(ResourceError::AmountOverflow));
        assert_eq!(checked_sum([1, 2, 3]), Ok(6));
    }
}
