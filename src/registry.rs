//! Registry: owner-gated transactions over HashIndex and LinkGraph.
//!
//! Every mutation validates all of its preconditions before touching any
//! state, so a call either commits completely or returns an error with the
//! registry unchanged. Committed notifications are appended to the journal
//! in the order the changes were made.

use crate::error::{InvariantViolation, RegistryError, Result};
use crate::events::{Journal, RegistryEvent};
use crate::hash_index::HashIndex;
use crate::link_graph::LinkGraph;
use crate::types::{EntryInfo, EntryState, HashValue, Owner};
use core::fmt;
use core::hash::BuildHasher;
use std::collections::hash_map::RandomState;

/// Construction-time settings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegistryConfig {
    /// Entry-count hint used to pre-size the index and adjacency storage.
    pub capacity: usize,
    /// Keep committed events until drained. When off, the journal is
    /// cleared at the start of every mutation.
    pub journal_events: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            journal_events: true,
        }
    }
}

/// One named operation of the transactional call interface.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Call {
    AddHash(HashValue),
    DeprecateHash(HashValue),
    DeleteHash(HashValue),
    AddLink { from: HashValue, to: HashValue },
    DeleteLink { from: HashValue, to: HashValue },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::AddHash(_) => "add_hash",
            Call::DeprecateHash(_) => "deprecate_hash",
            Call::DeleteHash(_) => "delete_hash",
            Call::AddLink { .. } => "add_link",
            Call::DeleteLink { .. } => "delete_link",
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Call::AddHash(h) | Call::DeprecateHash(h) | Call::DeleteHash(h) => {
                write!(f, "{}({})", self.name(), h)
            }
            Call::AddLink { from, to } | Call::DeleteLink { from, to } => {
                write!(f, "{}({} -> {})", self.name(), from, to)
            }
        }
    }
}

pub struct Registry<S = RandomState> {
    index: HashIndex<S>,
    graph: LinkGraph,
    journal: Journal,
    config: RegistryConfig,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self::with_config_and_hasher(config, Default::default())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Registry<S>
where
    S: BuildHasher + Clone + Default,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_config_and_hasher(RegistryConfig::default(), hasher)
    }

    pub fn with_config_and_hasher(config: RegistryConfig, hasher: S) -> Self {
        Self {
            index: HashIndex::with_capacity_and_hasher(config.capacity, hasher),
            graph: LinkGraph::with_capacity(config.capacity),
            journal: Journal::new(),
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Run one named operation as `caller` and return the notifications it
    /// committed, in order.
    pub fn execute(&mut self, caller: Owner, call: Call) -> Result<&[RegistryEvent]> {
        let mark = self.begin();
        let outcome = match call {
            Call::AddHash(hash) => self.add_hash(hash, caller),
            Call::DeprecateHash(hash) => self.deprecate_hash(&hash, caller),
            Call::DeleteHash(hash) => self.delete_hash(&hash, caller),
            Call::AddLink { from, to } => self.add_link(&from, &to, caller),
            Call::DeleteLink { from, to } => self.delete_link(&from, &to, caller),
        };
        if let Err(err) = outcome {
            tracing::debug!(op = call.name(), %caller, kind = ?err.kind(), "transaction rejected");
            return Err(err);
        }
        Ok(self.journal.since(mark))
    }

    // Returns the journal length before the mutation about to run.
    fn begin(&mut self) -> usize {
        if !self.config.journal_events {
            self.journal.clear();
        }
        self.journal.len()
    }

    fn authorize(&self, hash: &HashValue, caller: Owner) -> Result<EntryInfo> {
        let info = self.index.read(hash)?;
        if info.owner != caller {
            return Err(RegistryError::Unauthorized {
                hash: *hash,
                caller,
            });
        }
        Ok(info)
    }

    pub fn add_hash(&mut self, hash: HashValue, caller: Owner) -> Result<()> {
        self.begin();
        self.index.add(hash, caller, &mut self.journal)?;
        tracing::debug!(%hash, owner = %caller, position = self.index.len() - 1, "hash added");
        Ok(())
    }

    pub fn deprecate_hash(&mut self, hash: &HashValue, caller: Owner) -> Result<()> {
        self.begin();
        self.authorize(hash, caller)?;
        self.index
            .set_state(hash, EntryState::Deprecated, &mut self.journal)?;
        tracing::debug!(%hash, owner = %caller, "hash deprecated");
        Ok(())
    }

    /// Delete a Deprecated entry: drop its incident links, then compact it
    /// out of the dense collection.
    pub fn delete_hash(&mut self, hash: &HashValue, caller: Owner) -> Result<()> {
        self.begin();
        let info = self.authorize(hash, caller)?;
        if info.state != EntryState::Deprecated {
            return Err(RegistryError::PreconditionFailed(*hash));
        }
        let unlinked = self
            .graph
            .remove_all_edges_of(&self.index, hash, &mut self.journal)?;
        self.index.remove(hash, &mut self.journal)?;
        tracing::debug!(%hash, owner = %caller, unlinked, position = info.position, "hash deleted");
        Ok(())
    }

    pub fn add_link(&mut self, from: &HashValue, to: &HashValue, caller: Owner) -> Result<()> {
        self.begin();
        self.authorize(from, caller)?;
        self.graph
            .add_edge(&self.index, from, to, &mut self.journal)?;
        tracing::debug!(%from, %to, "link added");
        Ok(())
    }

    pub fn delete_link(&mut self, from: &HashValue, to: &HashValue, caller: Owner) -> Result<()> {
        self.begin();
        self.authorize(from, caller)?;
        self.graph
            .remove_edge(&self.index, from, to, &mut self.journal)?;
        tracing::debug!(%from, %to, "link deleted");
        Ok(())
    }

    pub fn read(&self, hash: &HashValue) -> Result<EntryInfo> {
        self.index.read(hash)
    }

    pub fn read_outgoing(&self, hash: &HashValue) -> Result<Vec<HashValue>> {
        self.graph.read_outgoing(&self.index, hash)
    }

    pub fn read_incoming(&self, hash: &HashValue) -> Result<Vec<HashValue>> {
        self.graph.read_incoming(&self.index, hash)
    }

    pub fn contains(&self, hash: &HashValue) -> bool {
        self.index.contains(hash)
    }

    pub fn contains_link(&self, from: &HashValue, to: &HashValue) -> bool {
        self.graph.contains_edge(&self.index, from, to)
    }

    /// Whether `to` is reachable from `from` through Active entries; a
    /// link `to -> from` would be rejected exactly when this is true.
    pub fn is_reachable(&self, from: &HashValue, to: &HashValue) -> Result<bool> {
        self.graph.is_reachable(&self.index, from, to)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Registered hashes in dense-collection order.
    pub fn hashes(&self) -> impl Iterator<Item = HashValue> + '_ {
        self.index.hashes()
    }

    pub fn links(&self) -> impl Iterator<Item = (HashValue, HashValue)> + '_ {
        self.graph.edges(&self.index)
    }

    pub fn events(&self) -> &[RegistryEvent] {
        self.journal.as_slice()
    }

    pub fn drain_events(&mut self) -> Vec<RegistryEvent> {
        self.journal.drain()
    }

    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        self.index.check_invariants()?;
        self.graph.check_invariants(&self.index)
    }
}
