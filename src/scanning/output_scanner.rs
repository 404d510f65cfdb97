//! Stealth output detection and amount recovery
//!
//! Detection only needs the scan secret of each address. Recovering the amount
//! of a confidential or anonymous output additionally needs the spend secret,
//! so outputs found while the key store is locked are recorded with an unknown
//! amount and completed on unlock.

use std::collections::HashMap;

use curve25519_dalek::scalar::Scalar;
use tracing::{debug, warn};

use crate::{
    crypto::{clsag::key_image, commitment::commit, encryption::decrypt_amount},
    data_structures::{
        output::TxOutput,
        types::{OutputRef, PrivateKey, PublicKey},
    },
    errors::WalletResult,
    key_management::stealth_address::{match_output, one_time_private_key, recover_amount_key},
    storage::{OutputStatus, OwnedOutput},
};

/// Detection keys of one stealth address
#[derive(Debug, Clone)]
pub struct ScanKey {
    pub address_index: u32,
    pub scan: PrivateKey,
    pub spend_pubkey: PublicKey,
}

/// Where an output sits on chain, if anywhere yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLocation {
    pub outref: OutputRef,
    pub height: Option<u64>,
    pub anon_index: Option<u64>,
}

/// Matches outputs against every owned address
#[derive(Debug, Clone, Default)]
pub struct OutputScanner {
    keys: Vec<ScanKey>,
}

impl OutputScanner {
    pub fn new(keys: Vec<ScanKey>) -> Self {
        Self { keys }
    }

    pub fn add_key(&mut self, key: ScanKey) {
        self.keys.push(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Test `output` against every address. `spend_keys` maps address index to
    /// spend secret and is `None` while the key store is locked.
    pub fn scan_output(
        &self,
        location: OutputLocation,
        output: &TxOutput,
        spend_keys: Option<&HashMap<u32, PrivateKey>>,
    ) -> WalletResult<Option<OwnedOutput>> {
        let output_n = location.outref.vout;
        for key in &self.keys {
            let tweak = match match_output(
                &key.scan,
                &key.spend_pubkey,
                &output.ephemeral_key,
                &output.one_time_key,
                output_n,
            ) {
                Ok(Some(tweak)) => tweak,
                Ok(None) => continue,
                Err(e) => {
                    debug!(outref = %location.outref, error = %e, "skipping undecodable output");
                    return Ok(None);
                }
            };

            let mut owned = OwnedOutput {
                outref: location.outref,
                kind: output.kind(),
                amount: output.plain_value(),
                blinding: output.plain_value().map(|_| Scalar::ZERO.to_bytes()),
                one_time_key: output.one_time_key,
                ephemeral_key: output.ephemeral_key,
                commitment: output.commitment(),
                key_tweak: tweak.to_bytes(),
                encrypted_data: output.encrypted_data.clone(),
                address_index: key.address_index,
                anon_index: location.anon_index,
                height: location.height,
                status: if location.height.is_some() {
                    OutputStatus::Unspent
                } else {
                    OutputStatus::Unconfirmed
                },
                spent_in: None,
                spent_height: None,
                key_image: None,
            };

            if let Some(spend) = spend_keys.and_then(|keys| keys.get(&key.address_index)) {
                complete_output(&mut owned, spend)?;
            }

            debug!(
                outref = %owned.outref,
                kind = %owned.kind,
                address_index = owned.address_index,
                amount_known = owned.amount.is_some(),
                "detected owned output"
            );
            return Ok(Some(owned));
        }
        Ok(None)
    }
}

/// Fill in the amount, blinding factor and key image of a detected output
/// using the spend secret of the address it paid. Returns whether the amount
/// is now known.
pub fn complete_output(owned: &mut OwnedOutput, spend: &PrivateKey) -> WalletResult<bool> {
    let secret = one_time_private_key(&owned.tweak_scalar(), spend);
    if secret.public_key() != owned.one_time_key {
        warn!(outref = %owned.outref, "spend key does not control detected output");
        return Ok(false);
    }
    owned.key_image = Some(key_image(&secret));

    if owned.amount.is_some() {
        return Ok(true);
    }

    let amount_key = recover_amount_key(spend, &owned.ephemeral_key, owned.outref.vout)?;
    let (amount, blinding) =
        match decrypt_amount(&amount_key, &owned.one_time_key, &owned.encrypted_data) {
            Ok(recovered) => recovered,
            Err(e) => {
                warn!(outref = %owned.outref, error = %e, "amount payload did not decrypt");
                return Ok(false);
            }
        };
    if commit(amount, &blinding) != owned.commitment {
        warn!(outref = %owned.outref, "recovered amount does not open the commitment");
        return Ok(false);
    }

    owned.amount = Some(amount);
    owned.blinding = Some(blinding.to_bytes());
    Ok(true)
}
