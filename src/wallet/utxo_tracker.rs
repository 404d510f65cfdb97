//! Lock and reservation bookkeeping for owned outputs
//!
//! Temporary locks live only in memory. Permanent locks are mirrored to storage
//! by the wallet and reloaded on open. Reservations cover the outputs a send is
//! currently spending and are released on every exit path of the send.

use std::collections::BTreeSet;

use super::types::LockedOutput;
use crate::{
    data_structures::types::OutputRef,
    errors::{StateError, WalletResult},
};

#[derive(Debug, Clone, Default)]
pub struct UtxoTracker {
    temporary: BTreeSet<OutputRef>,
    permanent: BTreeSet<OutputRef>,
    reserved: BTreeSet<OutputRef>,
}

impl UtxoTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permanent_locks(locks: impl IntoIterator<Item = OutputRef>) -> Self {
        Self {
            permanent: locks.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_locked(&self, outref: &OutputRef) -> bool {
        self.temporary.contains(outref) || self.permanent.contains(outref)
    }

    pub fn is_permanent(&self, outref: &OutputRef) -> bool {
        self.permanent.contains(outref)
    }

    pub fn permanent_locks(&self) -> Vec<OutputRef> {
        self.permanent.iter().copied().collect()
    }

    pub fn is_reserved(&self, outref: &OutputRef) -> bool {
        self.reserved.contains(outref)
    }

    /// Locked or reserved
    pub fn is_unavailable(&self, outref: &OutputRef) -> bool {
        self.is_locked(outref) || self.is_reserved(outref)
    }

    pub fn lock(&mut self, outref: OutputRef, permanent: bool) -> WalletResult<()> {
        if self.is_locked(&outref) {
            return Err(StateError::AlreadyLocked(outref).into());
        }
        if permanent {
            self.permanent.insert(outref);
        } else {
            self.temporary.insert(outref);
        }
        Ok(())
    }

    /// Remove a lock; returns whether it was permanent
    pub fn unlock(&mut self, outref: &OutputRef) -> WalletResult<bool> {
        if self.temporary.remove(outref) {
            return Ok(false);
        }
        if self.permanent.remove(outref) {
            return Ok(true);
        }
        Err(StateError::NotLocked(*outref).into())
    }

    /// Drop temporary locks, and permanent ones when asked. Returns the
    /// permanent locks that were removed.
    pub fn unlock_all(&mut self, include_permanent: bool) -> Vec<OutputRef> {
        self.temporary.clear();
        if include_permanent {
            std::mem::take(&mut self.permanent).into_iter().collect()
        } else {
            Vec::new()
        }
    }

    pub fn locked(&self) -> Vec<LockedOutput> {
        let mut locked: Vec<LockedOutput> = self
            .temporary
            .iter()
            .map(|outref| LockedOutput {
                outref: *outref,
                permanent: false,
            })
            .chain(self.permanent.iter().map(|outref| LockedOutput {
                outref: *outref,
                permanent: true,
            }))
            .collect();
        locked.sort();
        locked
    }

    pub fn reserve(&mut self, outrefs: &[OutputRef]) {
        self.reserved.extend(outrefs.iter().copied());
    }

    pub fn release(&mut self, outrefs: &[OutputRef]) {
        for outref in outrefs {
            self.reserved.remove(outref);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data_structures::types::TxId, errors::WalletError};

    fn outref(n: u8) -> OutputRef {
        OutputRef::new(TxId([n; 32]), 0)
    }

    #[test]
    fn test_lock_twice_rejected() {
        let mut tracker = UtxoTracker::new();
        tracker.lock(outref(1), false).unwrap();
        assert!(matches!(
            tracker.lock(outref(1), true),
            Err(WalletError::State(StateError::AlreadyLocked(_)))
        ));
    }

    #[test]
    fn test_unlock_unlocked_output_fails() {
        let mut tracker = UtxoTracker::new();
        assert!(matches!(
            tracker.unlock(&outref(2)),
            Err(WalletError::State(StateError::NotLocked(_)))
        ));
    }

    #[test]
    fn test_unlock_all_keeps_permanent_by_default() {
        let mut tracker = UtxoTracker::new();
        tracker.lock(outref(1), false).unwrap();
        tracker.lock(outref(2), true).unwrap();

        assert!(tracker.unlock_all(false).is_empty());
        assert_eq!(
            tracker.locked(),
            vec![LockedOutput {
                outref: outref(2),
                permanent: true
            }]
        );

        assert_eq!(tracker.unlock_all(true), vec![outref(2)]);
        assert!(tracker.locked().is_empty());
    }

    #[test]
    fn test_reservations_are_released() {
        let mut tracker = UtxoTracker::new();
        tracker.reserve(&[outref(3), outref(4)]);
        assert!(tracker.is_unavailable(&outref(3)));
        assert!(!tracker.is_locked(&outref(3)));
        tracker.release(&[outref(3), outref(4)]);
        assert!(!tracker.is_unavailable(&outref(4)));
    }
}
