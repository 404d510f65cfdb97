//! Domain separated hashing onto scalars and group elements.

use blake2::{Blake2b, Blake2b512, Digest};
use curve25519_dalek::{ristretto::RistrettoPoint, scalar::Scalar};
use digest::consts::U32;

pub const DOMAIN_ONE_TIME_KEY: &[u8] = b"anon.stealth.one_time_key";
pub const DOMAIN_AMOUNT_KEY: &[u8] = b"anon.stealth.amount_key";
pub const DOMAIN_KEY_IMAGE: &[u8] = b"anon.clsag.key_image_base";
pub const DOMAIN_CLSAG_AGG_P: &[u8] = b"anon.clsag.agg_0";
pub const DOMAIN_CLSAG_AGG_C: &[u8] = b"anon.clsag.agg_1";
pub const DOMAIN_CLSAG_ROUND: &[u8] = b"anon.clsag.round";
pub const DOMAIN_VALUE_GENERATOR: &[u8] = b"anon.pedersen.value_generator";
pub const DOMAIN_TXID: &[u8] = b"anon.tx.id";
pub const DOMAIN_TX_PREFIX: &[u8] = b"anon.tx.prefix";
pub const DOMAIN_BLOCK: &[u8] = b"anon.block.hash";

type Blake2b256 = Blake2b<U32>;

fn length_prefixed<D: Digest>(hasher: &mut D, domain: &[u8], parts: &[&[u8]]) {
    hasher.update((domain.len() as u64).to_le_bytes());
    hasher.update(domain);
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
}

/// Blake2b-256 over the domain and length-prefixed parts
pub fn hash_256(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    length_prefixed(&mut hasher, domain, parts);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn hash_512(domain: &[u8], parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Blake2b512::new();
    length_prefixed(&mut hasher, domain, parts);
    let mut out = [0u8; 64];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// `Hs`: wide reduction of a 512 bit hash, uniform over the scalar field
pub fn hash_to_scalar(domain: &[u8], parts: &[&[u8]]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&hash_512(domain, parts))
}

/// `Hp`: hash onto the Ristretto group with unknown discrete log
pub fn hash_to_point(domain: &[u8], parts: &[&[u8]]) -> RistrettoPoint {
    RistrettoPoint::from_uniform_bytes(&hash_512(domain, parts))
}
