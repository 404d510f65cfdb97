//! Primitive wire types shared by every module
//!
//! Group elements and scalars travel as fixed 32 byte arrays so they can be
//! hashed, persisted and compared without touching curve arithmetic. The crypto
//! layer converts them into Ristretto points and scalars when it needs to.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{CryptoError, SerializationError};

macro_rules! point_bytes_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, BorshSerialize, BorshDeserialize,
        )]
        pub struct $name(pub [u8; 32]);

        impl $name {
            pub fn from_point(point: &RistrettoPoint) -> Self {
                Self(point.compress().to_bytes())
            }

            pub fn to_point(&self) -> Result<RistrettoPoint, CryptoError> {
                CompressedRistretto(self.0).decompress().ok_or_else(|| {
                    CryptoError::InvalidPoint(format!("{} {}", stringify!($name), hex::encode(self.0)))
                })
            }

            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn from_hex(value: &str) -> Result<Self, SerializationError> {
                let bytes = hex::decode(value).map_err(|e| SerializationError::Hex(e.to_string()))?;
                let array: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| SerializationError::Hex("expected 32 bytes".to_string()))?;
                Ok(Self(array))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }
    };
}

point_bytes_type!(
    /// Compressed Ristretto public key
    PublicKey
);
point_bytes_type!(
    /// Pedersen commitment `v*H + b*G`
    Commitment
);
point_bytes_type!(
    /// Linking tag `x * Hp(P)` of a spent one-time key
    KeyImage
);

/// Transaction identifier (Blake2b-256 of the serialized transaction)
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct TxId(pub [u8; 32]);

impl TxId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, SerializationError> {
        let bytes = hex::decode(value).map_err(|e| SerializationError::Hex(e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SerializationError::Hex("txid must be 32 bytes".to_string()))?;
        Ok(Self(array))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl Display for TxId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Reference to a transaction output: (txid, output position)
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, BorshSerialize,
    BorshDeserialize,
)]
pub struct OutputRef {
    pub txid: TxId,
    pub vout: u32,
}

impl OutputRef {
    pub fn new(txid: TxId, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Debug for OutputRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl Display for OutputRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl FromStr for OutputRef {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (txid, vout) = s
            .split_once(':')
            .ok_or_else(|| SerializationError::Hex(format!("expected txid:vout, got {s}")))?;
        let vout = vout
            .parse::<u32>()
            .map_err(|e| SerializationError::Hex(format!("invalid vout: {e}")))?;
        Ok(Self::new(TxId::from_hex(txid)?, vout))
    }
}

/// Secret scalar, wiped on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Scalar);

impl PrivateKey {
    pub fn new(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub fn random() -> Self {
        Self(Scalar::random(&mut rand::rngs::OsRng))
    }

    /// Reduce arbitrary bytes into a scalar
    pub fn from_bytes_mod_order(bytes: [u8; 32]) -> Self {
        Self(Scalar::from_bytes_mod_order(bytes))
    }

    /// Accept only canonical scalar encodings
    pub fn from_canonical_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes))
            .map(Self)
            .ok_or_else(|| CryptoError::InvalidScalar("non-canonical scalar".to_string()))
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_point(&RistrettoPoint::mul_base(&self.0))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}
