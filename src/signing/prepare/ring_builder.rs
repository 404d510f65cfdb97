use std::collections::BTreeSet;

use rand::{rngs::OsRng, Rng};
use tracing::debug;

use crate::{
    crypto::clsag::RingMember,
    data_structures::{output::OutputKind, transaction::InputSource},
    errors::{ConsistencyError, StateError, WalletResult},
    ledger::LedgerView,
    storage::OwnedOutput,
};

/// Ring for one input with the position of the real member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRing {
    /// Anonymity-set indices, empty for plain and confidential inputs
    pub indices: Vec<u64>,
    pub members: Vec<RingMember>,
    pub real_position: usize,
}

impl PreparedRing {
    /// Ring of one over an output spent by reference
    pub fn single(output: &OwnedOutput) -> Self {
        Self {
            indices: Vec::new(),
            members: vec![RingMember::new(output.one_time_key, output.commitment)],
            real_position: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn input_source(&self, output: &OwnedOutput) -> InputSource {
        match output.kind {
            OutputKind::Plain => InputSource::Plain(output.outref),
            OutputKind::Confidential => InputSource::Confidential(output.outref),
            OutputKind::Anonymous => InputSource::Anonymous {
                ring: self.indices.clone(),
            },
        }
    }
}

/// Sample `ring_size - 1` decoys for an owned anonymous output and hide its
/// index among them at a uniformly random position.
pub async fn build_anon_ring(
    ledger: &dyn LedgerView,
    output: &OwnedOutput,
    ring_size: usize,
) -> WalletResult<PreparedRing> {
    let real_index = output
        .anon_index
        .ok_or(StateError::KindMismatch(output.outref))?;

    let real = ledger.get_anon_output(real_index).await?;
    if real.one_time_key != output.one_time_key || real.commitment != output.commitment {
        return Err(ConsistencyError::IndexNotFound(real_index).into());
    }

    let excluding = BTreeSet::from([real_index]);
    let mut indices = ledger
        .sample_decoys(ring_size.saturating_sub(1), &excluding)
        .await?;
    let real_position = OsRng.gen_range(0..=indices.len());
    indices.insert(real_position, real_index);

    let mut members = Vec::with_capacity(indices.len());
    for (position, index) in indices.iter().enumerate() {
        if position == real_position {
            members.push(RingMember::new(real.one_time_key, real.commitment));
            continue;
        }
        let decoy = ledger.get_anon_output(*index).await?;
        members.push(RingMember::new(decoy.one_time_key, decoy.commitment));
    }

    debug!(
        outref = %output.outref,
        ring_size = indices.len(),
        "built ring"
    );

    Ok(PreparedRing {
        indices,
        members,
        real_position,
    })
}
