//! Global anonymity-set index
//!
//! Confirmed anonymous outputs live in an append-only arena addressed by a
//! dense integer starting at [`ANON_INDEX_ORIGIN`]. Entry `i` sits at arena
//! slot `i - ANON_INDEX_ORIGIN`; two side maps resolve outpoints and one-time
//! keys back to their index.

use std::collections::{BTreeSet, HashMap, HashSet};

use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    data_structures::types::{Commitment, OutputRef, PublicKey},
    errors::{ConsistencyError, ResourceError, ValidationError},
};

/// First index ever assigned
pub const ANON_INDEX_ORIGIN: u64 = 1;

/// Below this ratio of candidates to requested decoys, sampling enumerates
/// the candidates instead of drawing with rejection.
const REJECTION_SAMPLING_FACTOR: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonOutput {
    pub index: u64,
    pub outref: OutputRef,
    pub one_time_key: PublicKey,
    pub commitment: Commitment,
    pub height: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AnonIndex {
    entries: Vec<AnonOutput>,
    by_outref: HashMap<OutputRef, u64>,
    by_key: HashMap<PublicKey, u64>,
}

impl AnonIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index the next append will receive
    pub fn next_index(&self) -> u64 {
        ANON_INDEX_ORIGIN + self.entries.len() as u64
    }

    /// Highest assigned index, `ANON_INDEX_ORIGIN - 1` when empty
    pub fn last_index(&self) -> u64 {
        self.next_index() - 1
    }

    pub fn append(
        &mut self,
        outref: OutputRef,
        one_time_key: PublicKey,
        commitment: Commitment,
        height: u64,
    ) -> Result<u64, ValidationError> {
        if self.by_key.contains_key(&one_time_key) || self.by_outref.contains_key(&outref) {
            return Err(ValidationError::AnonOutputKnown);
        }
        let index = self.next_index();
        self.entries.push(AnonOutput {
            index,
            outref,
            one_time_key,
            commitment,
            height,
        });
        self.by_outref.insert(outref, index);
        self.by_key.insert(one_time_key, index);
        Ok(index)
    }

    pub fn get(&self, index: u64) -> Result<&AnonOutput, ConsistencyError> {
        index
            .checked_sub(ANON_INDEX_ORIGIN)
            .and_then(|slot| self.entries.get(slot as usize))
            .ok_or(ConsistencyError::IndexNotFound(index))
    }

    pub fn lookup(&self, outref: &OutputRef) -> Option<u64> {
        self.by_outref.get(outref).copied()
    }

    pub fn contains_key(&self, one_time_key: &PublicKey) -> bool {
        self.by_key.contains_key(one_time_key)
    }

    /// `count` distinct indices drawn uniformly from `[origin, last]` minus `excluding`
    pub fn sample_decoys<R: Rng + ?Sized>(
        &self,
        count: usize,
        excluding: &BTreeSet<u64>,
        rng: &mut R,
    ) -> Result<Vec<u64>, ResourceError> {
        let total = self.entries.len() as u64;
        let excluded_in_range = excluding
            .range(ANON_INDEX_ORIGIN..self.next_index())
            .count() as u64;
        let available = total - excluded_in_range;
        if (count as u64) > available {
            return Err(ResourceError::NoEligibleDecoys {
                requested: count,
                available: available as usize,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        if available < REJECTION_SAMPLING_FACTOR * count as u64 {
            let candidates: Vec<u64> = (ANON_INDEX_ORIGIN..self.next_index())
                .filter(|i| !excluding.contains(i))
                .collect();
            return Ok(candidates.choose_multiple(rng, count).copied().collect());
        }

        let mut picked = Vec::with_capacity(count);
        let mut seen = HashSet::with_capacity(count);
        while picked.len() < count {
            let candidate = rng.gen_range(ANON_INDEX_ORIGIN..self.next_index());
            if !excluding.contains(&candidate) && seen.insert(candidate) {
                picked.push(candidate);
            }
        }
        Ok(picked)
    }

    /// Drop every entry at or above `first_invalid`, returning them in index order
    pub fn rollback_to(&mut self, first_invalid: u64) -> Vec<AnonOutput> {
        let keep = first_invalid.saturating_sub(ANON_INDEX_ORIGIN) as usize;
        if keep >= self.entries.len() {
            return Vec::new();
        }
        let removed = self.entries.split_off(keep);
        for entry in &removed {
            self.by_outref.remove(&entry.outref);
            self.by_key.remove(&entry.one_time_key);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnonOutput> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::types::TxId;
    use rand::rngs::OsRng;

    fn filled(n: u64) -> AnonIndex {
        let mut index = AnonIndex::new();
        for i in 0..n {
            let mut key = [0u8; 32];
            key[..8].copy_from_slice(&i.to_le_bytes());
            index
                .append(
                    OutputRef::new(TxId([i as u8; 32]), i as u32),
                    PublicKey(key),
                    Commitment([0u8; 32]),
                    i / 3,
                )
                .unwrap();
        }
        index
    }

    #[test]
    fn test_indices_are_dense_from_origin() {
        let index = filled(10);
        for (offset, entry) in index.iter().enumerate() {
            assert_eq!(entry.index, ANON_INDEX_ORIGIN + offset as u64);
            assert_eq!(index.lookup(&entry.outref), Some(entry.index));
        }
        assert_eq!(index.last_index(), 10);
        assert_eq!(AnonIndex::new().last_index(), 0);
    }

    #[test]
    fn test_get_bounds() {
        let index = filled(3);
        assert!(index.get(1).is_ok());
        assert!(index.get(3).is_ok());
        assert_eq!(index.get(0), Err(ConsistencyError::IndexNotFound(0)));
        assert_eq!(index.get(4), Err(ConsistencyError::IndexNotFound(4)));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut index = filled(2);
        let existing = index.get(1).unwrap().clone();
        let err = index
            .append(
                OutputRef::new(TxId([99u8; 32]), 0),
                existing.one_time_key,
                existing.commitment,
                5,
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::AnonOutputKnown);
    }

    #[test]
    fn test_sample_decoys_respects_exclusions() {
        let index = filled(50);
        let excluding: BTreeSet<u64> = [3, 7, 11].into_iter().collect();
        for _ in 0..20 {
            let decoys = index.sample_decoys(10, &excluding, &mut OsRng).unwrap();
            let unique: HashSet<_> = decoys.iter().collect();
            assert_eq!(unique.len(), 10);
            assert!(decoys.iter().all(|d| (1..=50).contains(d) && !excluding.contains(d)));
        }
    }

    #[test]
    fn test_sample_all_remaining_candidates() {
        let index = filled(6);
        let excluding: BTreeSet<u64> = [2].into_iter().collect();
        let mut decoys = index.sample_decoys(5, &excluding, &mut OsRng).unwrap();
        decoys.sort_unstable();
        assert_eq!(decoys, vec![1, 3, 4, 5, 6]);
    }

    #[test]
    fn test_not_enough_decoys() {
        let index = filled(4);
        let excluding: BTreeSet<u64> = [1].into_iter().collect();
        assert_eq!(
            index.sample_decoys(4, &excluding, &mut OsRng),
            Err(ResourceError::NoEligibleDecoys {
                requested: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_rollback_truncates_and_reuses_indices() {
        let mut index = filled(8);
        let removed = index.rollback_to(6);
        assert_eq!(removed.iter().map(|e| e.index).collect::<Vec<_>>(), vec![6, 7, 8]);
        assert_eq!(index.last_index(), 5);
        assert!(index.lookup(&removed[0].outref).is_none());
        assert!(!index.contains_key(&removed[0].one_time_key));
        assert!(index.rollback_to(100).is_empty());

        let reappended = index
            .append(removed[0].outref, removed[0].one_time_key, removed[0].commitment, 9)
            .unwrap();
        assert_eq!(reappended, 6);
    }
}
