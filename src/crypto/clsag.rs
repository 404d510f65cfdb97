//! CLSAG linkable ring signatures over Ristretto
//!
//! One signature per input. The ring is a list of `(P_i, C_i)` pairs and the
//! signer proves knowledge of `x` with `P_l = x*G` together with `z` with
//! `C_l - pseudo_out = z*G`, without revealing `l`.
//!
//! ```text
//! I    = x * Hp(P_l)                       key image (linking tag)
//! D    = z * Hp(P_l)                       commitment auxiliary image
//! mu_P = Hs(agg_0 || P || C || I || D || pseudo_out)
//! mu_C = Hs(agg_1 || P || C || I || D || pseudo_out)
//! L_i  = s_i*G     + c_i*(mu_P*P_i + mu_C*(C_i - pseudo_out))
//! R_i  = s_i*Hp(P_i) + c_i*(mu_P*I + mu_C*D)
//! c_{i+1} = Hs(round || P || C || pseudo_out || msg || I || D || L_i || R_i)
//! ```
//!
//! The signature is valid when the loop closes back onto `c_1`.

use curve25519_dalek::{
    ristretto::RistrettoPoint,
    scalar::Scalar,
    traits::{Identity, IsIdentity, VartimeMultiscalarMul},
};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use super::hash::{
    hash_to_point, hash_to_scalar, DOMAIN_CLSAG_AGG_C, DOMAIN_CLSAG_AGG_P, DOMAIN_CLSAG_ROUND,
    DOMAIN_KEY_IMAGE,
};
use crate::{
    data_structures::{
        transaction::ClsagSignature,
        types::{Commitment, KeyImage, PrivateKey, PublicKey},
    },
    errors::CryptoError,
};

/// One candidate in a ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingMember {
    pub key: PublicKey,
    pub commitment: Commitment,
}

impl RingMember {
    pub fn new(key: PublicKey, commitment: Commitment) -> Self {
        Self { key, commitment }
    }
}

/// `Hp(P)`, the base point of the key image
pub fn key_image_base(key: &PublicKey) -> RistrettoPoint {
    hash_to_point(DOMAIN_KEY_IMAGE, &[key.as_bytes()])
}

/// Key image of the one-time key controlled by `secret`
pub fn key_image(secret: &PrivateKey) -> KeyImage {
    let base = key_image_base(&secret.public_key());
    KeyImage::from_point(&(secret.scalar() * base))
}

struct DecodedRing {
    keys: Vec<RistrettoPoint>,
    commitments: Vec<RistrettoPoint>,
    bases: Vec<RistrettoPoint>,
}

fn decode_ring(ring: &[RingMember]) -> Result<DecodedRing, CryptoError> {
    if ring.is_empty() {
        return Err(CryptoError::EmptyRing);
    }
    let mut decoded = DecodedRing {
        keys: Vec::with_capacity(ring.len()),
        commitments: Vec::with_capacity(ring.len()),
        bases: Vec::with_capacity(ring.len()),
    };
    for member in ring {
        decoded.keys.push(member.key.to_point()?);
        decoded.commitments.push(member.commitment.to_point()?);
        decoded.bases.push(key_image_base(&member.key));
    }
    Ok(decoded)
}

/// Transcript fields shared by every hash of one signature
struct Transcript {
    ring_bytes: Vec<u8>,
    round_prefix: Vec<u8>,
}

impl Transcript {
    fn new(
        ring: &[RingMember],
        pseudo_out: &Commitment,
        message: &[u8; 32],
        key_image: &KeyImage,
        d: &[u8; 32],
    ) -> Self {
        let mut ring_bytes = Vec::with_capacity(ring.len() * 64);
        for member in ring {
            ring_bytes.extend_from_slice(member.key.as_bytes());
        }
        for member in ring {
            ring_bytes.extend_from_slice(member.commitment.as_bytes());
        }

        let mut round_prefix = ring_bytes.clone();
        round_prefix.extend_from_slice(pseudo_out.as_bytes());
        round_prefix.extend_from_slice(message);
        round_prefix.extend_from_slice(key_image.as_bytes());
        round_prefix.extend_from_slice(d);

        Self {
            ring_bytes,
            round_prefix,
        }
    }

    fn mixing_coefficients(
        &self,
        key_image: &KeyImage,
        d: &[u8; 32],
        pseudo_out: &Commitment,
    ) -> (Scalar, Scalar) {
        let parts: [&[u8]; 4] = [
            &self.ring_bytes,
            key_image.as_bytes(),
            d,
            pseudo_out.as_bytes(),
        ];
        (
            hash_to_scalar(DOMAIN_CLSAG_AGG_P, &parts),
            hash_to_scalar(DOMAIN_CLSAG_AGG_C, &parts),
        )
    }

    fn round(&self, l: &RistrettoPoint, r: &RistrettoPoint) -> Scalar {
        hash_to_scalar(
            DOMAIN_CLSAG_ROUND,
            &[
                &self.round_prefix,
                l.compress().as_bytes(),
                r.compress().as_bytes(),
            ],
        )
    }
}

/// Sign `message` with the ring member at `secret_index`.
///
/// `mask_difference` is `z` such that `C_l - pseudo_out = z*G`, i.e. the
/// real output's blinding factor minus the pseudo-output blinding factor.
pub fn sign(
    message: &[u8; 32],
    ring: &[RingMember],
    pseudo_out: &Commitment,
    secret_index: usize,
    secret_key: &PrivateKey,
    mask_difference: &Scalar,
) -> Result<(ClsagSignature, KeyImage), CryptoError> {
    let n = ring.len();
    if secret_index >= n {
        return Err(CryptoError::SignerIndexOutOfBounds {
            index: secret_index,
            ring_size: n,
        });
    }
    let decoded = decode_ring(ring)?;
    if secret_key.public_key() != ring[secret_index].key {
        return Err(CryptoError::SignatureMismatch);
    }
    let pseudo = pseudo_out.to_point()?;
    let z = *mask_difference;
    if RistrettoPoint::mul_base(&z) != decoded.commitments[secret_index] - pseudo {
        return Err(CryptoError::SignatureMismatch);
    }

    let base = decoded.bases[secret_index];
    let key_image = KeyImage::from_point(&(secret_key.scalar() * base));
    let image_point = key_image.to_point()?;
    let d_point = z * base;
    let d = d_point.compress().to_bytes();

    let transcript = Transcript::new(ring, pseudo_out, message, &key_image, &d);
    let (mu_p, mu_c) = transcript.mixing_coefficients(&key_image, &d, pseudo_out);
    let aggregate_image = mu_p * image_point + mu_c * d_point;

    let mut alpha = Scalar::random(&mut OsRng);
    let mut challenges = vec![Scalar::ZERO; n];
    let mut responses = vec![Scalar::ZERO; n];

    let mut next = (secret_index + 1) % n;
    challenges[next] = transcript.round(&RistrettoPoint::mul_base(&alpha), &(alpha * base));

    while next != secret_index {
        let i = next;
        responses[i] = Scalar::random(&mut OsRng);
        let aggregate_key = mu_p * decoded.keys[i] + mu_c * (decoded.commitments[i] - pseudo);
        let l = RistrettoPoint::mul_base(&responses[i]) + challenges[i] * aggregate_key;
        let r = responses[i] * decoded.bases[i] + challenges[i] * aggregate_image;
        next = (i + 1) % n;
        challenges[next] = transcript.round(&l, &r);
    }

    let mut secret = mu_p * secret_key.scalar() + mu_c * z;
    responses[secret_index] = alpha - challenges[secret_index] * secret;
    secret.zeroize();
    alpha.zeroize();

    let signature = ClsagSignature {
        c1: challenges[0].to_bytes(),
        s: responses.iter().map(Scalar::to_bytes).collect(),
        d,
    };
    Ok((signature, key_image))
}

/// Verify a signature against its ring. Malformed encodings are errors; a
/// well formed signature that does not close the loop returns `Ok(false)`.
pub fn verify(
    message: &[u8; 32],
    ring: &[RingMember],
    pseudo_out: &Commitment,
    key_image: &KeyImage,
    signature: &ClsagSignature,
) -> Result<bool, CryptoError> {
    let decoded = decode_ring(ring)?;
    if signature.s.len() != ring.len() {
        return Ok(false);
    }
    let pseudo = pseudo_out.to_point()?;
    let image_point = key_image.to_point()?;
    if image_point.is_identity() {
        return Ok(false);
    }
    let d_point = Commitment(signature.d).to_point()?;
    let c1 = canonical_scalar(&signature.c1)?;
    let responses = signature
        .s
        .iter()
        .map(canonical_scalar)
        .collect::<Result<Vec<_>, _>>()?;

    let transcript = Transcript::new(ring, pseudo_out, message, key_image, &signature.d);
    let (mu_p, mu_c) = transcript.mixing_coefficients(key_image, &signature.d, pseudo_out);

    let mut c = c1;
    for i in 0..ring.len() {
        let cp = c * mu_p;
        let cc = c * mu_c;
        let l = RistrettoPoint::vartime_multiscalar_mul(
            [responses[i], cp, cc, -cc],
            [
                curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT,
                decoded.keys[i],
                decoded.commitments[i],
                pseudo,
            ],
        );
        let r = RistrettoPoint::vartime_multiscalar_mul(
            [responses[i], cp, cc],
            [decoded.bases[i], image_point, d_point],
        );
        c = transcript.round(&l, &r);
    }
    Ok(c == c1)
}

fn canonical_scalar(bytes: &[u8; 32]) -> Result<Scalar, CryptoError> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(*bytes))
        .ok_or_else(|| CryptoError::InvalidScalar("signature scalar not canonical".to_string()))
}

/// Identity check used by validators before trusting a key image
pub fn is_valid_key_image(key_image: &KeyImage) -> bool {
    key_image
        .to_point()
        .map(|p| p != RistrettoPoint::identity())
        .unwrap_or(false)
}
