use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};

use super::output_status::OutputStatus;
use crate::data_structures::{
    output::OutputKind,
    types::{Commitment, KeyImage, OutputRef, PublicKey, TxId},
};

/// An output owned by the wallet with everything needed to spend it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedOutput {
    pub outref: OutputRef,
    pub kind: OutputKind,
    /// Unknown while the output was detected with the wallet locked
    pub amount: Option<u64>,
    /// Blinding factor bytes; zero for plain outputs
    pub blinding: Option<[u8; 32]>,

    // Stealth data
    pub one_time_key: PublicKey,
    pub ephemeral_key: PublicKey,
    pub commitment: Commitment,
    /// `Hs(a*R || n)`; the one-time private key is this plus the spend key
    pub key_tweak: [u8; 32],
    pub encrypted_data: Vec<u8>,
    /// Stealth address the output paid
    pub address_index: u32,

    /// Global index, anonymous outputs only, assigned at confirmation
    pub anon_index: Option<u64>,
    /// Confirming block, `None` while in the mempool
    pub height: Option<u64>,

    // Status and spending tracking
    pub status: OutputStatus,
    pub spent_in: Option<TxId>,
    pub spent_height: Option<u64>,
    /// Computed once the spend key is available
    pub key_image: Option<KeyImage>,
}

impl OwnedOutput {
    pub fn confirmations(&self, tip: u64) -> u64 {
        match self.height {
            Some(height) if height <= tip => tip - height + 1,
            _ => 0,
        }
    }

    /// Confirmed, unspent and with a known amount
    pub fn is_spendable(&self) -> bool {
        self.status == OutputStatus::Unspent
            && self.spent_in.is_none()
            && self.height.is_some()
            && self.amount.is_some()
    }

    pub fn blinding_scalar(&self) -> Option<Scalar> {
        self.blinding
            .and_then(|bytes| Option::<Scalar>::from(Scalar::from_canonical_bytes(bytes)))
    }

    pub fn tweak_scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.key_tweak)
    }

    pub fn value(&self) -> u64 {
        self.amount.unwrap_or(0)
    }
}
