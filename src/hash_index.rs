//! HashIndex: dense, compactable collection of entries keyed by hash value.
//!
//! Three structures are kept in lockstep:
//! - `slots`: generational storage holding each entry's metadata, including
//!   its current `position`.
//! - `index`: hash table of slot keys for O(1) lookup by `HashValue`. Each
//!   slot stores its precomputed table hash so rehashing never re-hashes
//!   the key.
//! - `dense`: the ordered collection; `dense[p]` is the slot whose
//!   `position == p`.
//!
//! Removal swaps the last dense element into the vacated slot, so exactly
//! one surviving entry may change position per removal.

use crate::error::{InvariantViolation, RegistryError, Result};
use crate::events::{Journal, RegistryEvent};
use crate::types::{EntryInfo, EntryState, HashValue, Owner};
use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

/// Stable handle to a live entry.
///
/// Unlike `position`, a `NodeId` never changes while its entry lives and
/// never resolves again once the entry is removed (generational keys).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(DefaultKey);

impl NodeId {
    pub(crate) fn raw(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Slot {
    hash: HashValue,
    owner: Owner,
    state: EntryState,
    position: usize,
    table_hash: u64,
}

impl Slot {
    fn info(&self) -> EntryInfo {
        EntryInfo {
            position: self.position,
            owner: self.owner,
            state: self.state,
        }
    }
}

pub struct HashIndex<S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Slot>,
    dense: Vec<DefaultKey>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, Default::default())
    }
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> HashIndex<S>
where
    S: BuildHasher + Clone + Default,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::with_capacity(capacity),
            slots: SlotMap::with_capacity_and_key(capacity),
            dense: Vec::with_capacity(capacity),
        }
    }

    fn make_hash(&self, hash: &HashValue) -> u64 {
        self.hasher.hash_one(hash)
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn find(&self, hash: &HashValue) -> Option<NodeId> {
        let table_hash = self.make_hash(hash);
        self.index
            .find(table_hash, |&k| {
                self.slots.get(k).map(|s| s.hash == *hash).unwrap_or(false)
            })
            .map(|&k| NodeId(k))
    }

    pub fn contains(&self, hash: &HashValue) -> bool {
        self.find(hash).is_some()
    }

    /// Register `hash` under `owner` at the end of the dense collection.
    pub fn add(&mut self, hash: HashValue, owner: Owner, journal: &mut Journal) -> Result<NodeId> {
        if hash.is_zero() {
            return Err(RegistryError::InvalidKey);
        }
        let table_hash = self.make_hash(&hash);
        match self.index.entry(
            table_hash,
            |&k| self.slots.get(k).map(|s| s.hash == hash).unwrap_or(false),
            |&k| self.slots.get(k).map(|s| s.table_hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(RegistryError::DuplicateKey(hash)),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let position = self.dense.len();
                let k = self.slots.insert(Slot {
                    hash,
                    owner,
                    state: EntryState::Active,
                    position,
                    table_hash,
                });
                let _ = v.insert(k);
                self.dense.push(k);
                journal.push(RegistryEvent::HashAdded { hash, owner });
                Ok(NodeId(k))
            }
        }
    }

    pub fn read(&self, hash: &HashValue) -> Result<EntryInfo> {
        self.find(hash)
            .and_then(|id| self.slots.get(id.0))
            .map(Slot::info)
            .ok_or(RegistryError::NotFound(*hash))
    }

    /// Move `hash` to `next`. Only `Active -> Deprecated` is accepted.
    pub fn set_state(
        &mut self,
        hash: &HashValue,
        next: EntryState,
        journal: &mut Journal,
    ) -> Result<()> {
        let id = self.find(hash).ok_or(RegistryError::NotFound(*hash))?;
        let slot = self
            .slots
            .get_mut(id.0)
            .ok_or(RegistryError::NotFound(*hash))?;
        match (slot.state, next) {
            (EntryState::Active, EntryState::Deprecated) => {
                slot.state = EntryState::Deprecated;
                journal.push(RegistryEvent::HashDeprecated {
                    hash: *hash,
                    owner: slot.owner,
                });
                Ok(())
            }
            (from, to) => Err(RegistryError::InvalidTransition {
                hash: *hash,
                from,
                to,
            }),
        }
    }

    /// Remove `hash`, compacting the dense collection by swap-with-last.
    ///
    /// Returns the removed entry's metadata as it was just before removal.
    pub fn remove(&mut self, hash: &HashValue, journal: &mut Journal) -> Result<EntryInfo> {
        let table_hash = self.make_hash(hash);
        let slots = &self.slots;
        let entry = self
            .index
            .find_entry(table_hash, |&k| {
                slots.get(k).map(|s| s.hash == *hash).unwrap_or(false)
            })
            .map_err(|_| RegistryError::NotFound(*hash))?;
        let k = *entry.get();
        entry.remove();

        let slot = self
            .slots
            .remove(k)
            .expect("indexed key must resolve to a live slot");
        let removed = self.dense.swap_remove(slot.position);
        debug_assert_eq!(removed, k);
        if let Some(&moved) = self.dense.get(slot.position) {
            if let Some(m) = self.slots.get_mut(moved) {
                m.position = slot.position;
            }
        }

        journal.push(RegistryEvent::HashDeleted {
            hash: slot.hash,
            owner: slot.owner,
        });
        Ok(slot.info())
    }

    /// Hash stored at dense `position`.
    pub fn hash_at(&self, position: usize) -> Option<HashValue> {
        self.dense
            .get(position)
            .and_then(|&k| self.slots.get(k))
            .map(|s| s.hash)
    }

    /// The dense collection in position order.
    pub fn hashes(&self) -> impl Iterator<Item = HashValue> + '_ {
        self.dense.iter().filter_map(|&k| self.slots.get(k).map(|s| s.hash))
    }

    pub(crate) fn hash_of(&self, id: NodeId) -> Option<HashValue> {
        self.slots.get(id.0).map(|s| s.hash)
    }

    pub(crate) fn state_of(&self, id: NodeId) -> Option<EntryState> {
        self.slots.get(id.0).map(|s| s.state)
    }

    pub(crate) fn position_of(&self, id: NodeId) -> Option<usize> {
        self.slots.get(id.0).map(|s| s.position)
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dense.iter().map(|&k| NodeId(k))
    }

    /// Verify that `dense`, `slots` and `index` describe the same entries and
    /// that every stored position matches its dense index.
    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        if self.dense.len() != self.slots.len() || self.index.len() != self.slots.len() {
            return Err(InvariantViolation::LengthMismatch {
                dense: self.dense.len(),
                indexed: self.index.len(),
                slots: self.slots.len(),
            });
        }
        for (actual, &k) in self.dense.iter().enumerate() {
            let slot = self.slots.get(k).ok_or(InvariantViolation::LengthMismatch {
                dense: self.dense.len(),
                indexed: self.index.len(),
                slots: self.slots.len(),
            })?;
            if slot.hash.is_zero() {
                return Err(InvariantViolation::SentinelKey);
            }
            if slot.position != actual {
                return Err(InvariantViolation::PositionMismatch {
                    hash: slot.hash,
                    stored: slot.position,
                    actual,
                });
            }
            if self.find(&slot.hash) != Some(NodeId(k)) {
                return Err(InvariantViolation::Unindexed(slot.hash));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> HashValue {
        HashValue::from_bytes([n; 32])
    }

    const ALICE: Owner = Owner(1);

    /// Invariant: `add` places the entry at the end of the dense collection,
    /// owned by the caller and Active, and journals exactly one event.
    #[test]
    fn add_appends_and_reads_back() {
        let mut idx = HashIndex::new();
        let mut j = Journal::new();
        idx.add(h(1), ALICE, &mut j).unwrap();
        idx.add(h(2), ALICE, &mut j).unwrap();
        let info = idx.read(&h(2)).unwrap();
        assert_eq!(info.position, 1);
        assert_eq!(info.owner, ALICE);
        assert_eq!(info.state, EntryState::Active);
        assert_eq!(idx.len(), 2);
        assert_eq!(j.len(), 2);
        assert_eq!(
            j.as_slice()[1],
            RegistryEvent::HashAdded {
                hash: h(2),
                owner: ALICE
            }
        );
    }

    /// Invariant: the sentinel and duplicates are rejected with no side effect.
    #[test]
    fn sentinel_and_duplicate_rejected() {
        let mut idx = HashIndex::new();
        let mut j = Journal::new();
        assert_eq!(
            idx.add(HashValue::ZERO, ALICE, &mut j),
            Err(RegistryError::InvalidKey)
        );
        idx.add(h(1), ALICE, &mut j).unwrap();
        assert_eq!(
            idx.add(h(1), Owner(2), &mut j),
            Err(RegistryError::DuplicateKey(h(1)))
        );
        assert_eq!(idx.len(), 1);
        assert_eq!(j.len(), 1);
        assert_eq!(idx.read(&h(1)).unwrap().owner, ALICE);
    }

    /// Invariant: removing from the middle relocates exactly the last entry.
    #[test]
    fn remove_swaps_last_into_hole() {
        let mut idx = HashIndex::new();
        let mut j = Journal::new();
        for n in 1..=4 {
            idx.add(h(n), ALICE, &mut j).unwrap();
        }
        idx.remove(&h(2), &mut j).unwrap();
        assert_eq!(idx.read(&h(1)).unwrap().position, 0);
        assert_eq!(idx.read(&h(4)).unwrap().position, 1);
        assert_eq!(idx.read(&h(3)).unwrap().position, 2);
        assert_eq!(idx.read(&h(2)), Err(RegistryError::NotFound(h(2))));
        assert_eq!(
            idx.hashes().collect::<Vec<_>>(),
            vec![h(1), h(4), h(3)]
        );
        idx.check_invariants().unwrap();
    }

    /// Invariant: removing the last entry relocates nothing.
    #[test]
    fn remove_last_keeps_other_positions() {
        let mut idx = HashIndex::new();
        let mut j = Journal::new();
        idx.add(h(1), ALICE, &mut j).unwrap();
        idx.add(h(2), ALICE, &mut j).unwrap();
        let info = idx.remove(&h(2), &mut j).unwrap();
        assert_eq!(info.position, 1);
        assert_eq!(idx.read(&h(1)).unwrap().position, 0);
        assert_eq!(idx.hash_at(1), None);
        idx.check_invariants().unwrap();
    }

    /// Invariant: a removed NodeId never resolves again, even when the key
    /// is re-added and the slot is reused.
    #[test]
    fn stale_node_id_does_not_alias() {
        let mut idx = HashIndex::new();
        let mut j = Journal::new();
        let old = idx.add(h(1), ALICE, &mut j).unwrap();
        idx.remove(&h(1), &mut j).unwrap();
        let new = idx.add(h(1), Owner(2), &mut j).unwrap();
        assert_ne!(old, new);
        assert!(idx.hash_of(old).is_none());
        assert_eq!(idx.hash_of(new), Some(h(1)));
        assert_eq!(idx.read(&h(1)).unwrap().owner, Owner(2));
    }

    /// Invariant: state only moves Active -> Deprecated.
    #[test]
    fn state_is_monotonic() {
        let mut idx = HashIndex::new();
        let mut j = Journal::new();
        idx.add(h(1), ALICE, &mut j).unwrap();
        idx.set_state(&h(1), EntryState::Deprecated, &mut j).unwrap();
        assert_eq!(
            idx.set_state(&h(1), EntryState::Deprecated, &mut j),
            Err(RegistryError::InvalidTransition {
                hash: h(1),
                from: EntryState::Deprecated,
                to: EntryState::Deprecated,
            })
        );
        assert!(matches!(
            idx.set_state(&h(1), EntryState::Active, &mut j),
            Err(RegistryError::InvalidTransition { .. })
        ));
        assert_eq!(
            idx.set_state(&h(9), EntryState::Deprecated, &mut j),
            Err(RegistryError::NotFound(h(9)))
        );
        assert_eq!(j.len(), 2);
    }

    /// Invariant: lookups resolve correctly when every key lands in the same
    /// table bucket.
    #[test]
    fn collision_handling_with_const_hasher() {
        #[derive(Clone, Default)]
        struct ConstBuildHasher;
        struct ConstHasher;
        impl BuildHasher for ConstBuildHasher {
            type Hasher = ConstHasher;
            fn build_hasher(&self) -> Self::Hasher {
                ConstHasher
            }
        }
        impl core::hash::Hasher for ConstHasher {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                0
            }
        }

        let mut idx: HashIndex<ConstBuildHasher> = HashIndex::with_hasher(ConstBuildHasher);
        let mut j = Journal::new();
        for n in 1..=8 {
            idx.add(h(n), ALICE, &mut j).unwrap();
        }
        idx.remove(&h(3), &mut j).unwrap();
        for n in [1, 2, 4, 5, 6, 7, 8] {
            assert!(idx.contains(&h(n)));
        }
        assert!(!idx.contains(&h(3)));
        idx.check_invariants().unwrap();
    }
}
