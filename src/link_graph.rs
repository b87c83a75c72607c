//! LinkGraph: mirrored forward/backward adjacency over HashIndex entries.
//!
//! Edges live in a single generational arena. Each edge records its slot in
//! the source's `outgoing` list and the target's `incoming` list, so either
//! side can be unlinked in O(1) by swap-remove followed by a back-pointer
//! fix-up of the edge that moved into the hole.
//!
//! The graph stores `NodeId`s, never positions: positions shift under
//! HashIndex compaction, node ids do not.

use crate::error::{InvariantViolation, RegistryError, Result};
use crate::events::{Journal, RegistryEvent};
use crate::hash_index::{HashIndex, NodeId};
use crate::types::{EntryState, HashValue};
use core::hash::BuildHasher;
use hashbrown::HashMap;
use slotmap::{new_key_type, DefaultKey, SecondaryMap, SlotMap};

new_key_type! {
    /// Arena key of a stored edge.
    pub struct EdgeId;
}

#[derive(Debug)]
struct Edge {
    from: NodeId,
    to: NodeId,
    // Index of this edge inside `adjacency[from].outgoing`.
    out_slot: usize,
    // Index of this edge inside `adjacency[to].incoming`.
    in_slot: usize,
}

#[derive(Debug, Default)]
struct Adjacency {
    outgoing: Vec<EdgeId>,
    incoming: Vec<EdgeId>,
}

#[derive(Default)]
pub struct LinkGraph {
    edges: SlotMap<EdgeId, Edge>,
    adjacency: SecondaryMap<DefaultKey, Adjacency>,
    pairs: HashMap<(NodeId, NodeId), EdgeId>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            edges: SlotMap::with_capacity_and_key(capacity),
            adjacency: SecondaryMap::with_capacity(capacity),
            pairs: HashMap::with_capacity(capacity),
        }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn adjacency_mut(&mut self, node: NodeId) -> &mut Adjacency {
        if !self.adjacency.contains_key(node.raw()) {
            self.adjacency.insert(node.raw(), Adjacency::default());
        }
        &mut self.adjacency[node.raw()]
    }

    fn outgoing_of(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(node.raw())
            .map(|a| a.outgoing.as_slice())
            .unwrap_or(&[])
    }

    fn incoming_of(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(node.raw())
            .map(|a| a.incoming.as_slice())
            .unwrap_or(&[])
    }

    /// Insert `from -> to`, rejecting anything that would break the DAG.
    ///
    /// Checks run in order: both exist, not a self-link, both Active, not a
    /// duplicate, and `from` not already reachable from `to`.
    pub fn add_edge<S>(
        &mut self,
        index: &HashIndex<S>,
        from: &HashValue,
        to: &HashValue,
        journal: &mut Journal,
    ) -> Result<EdgeId>
    where
        S: BuildHasher + Clone + Default,
    {
        let src = index.find(from).ok_or(RegistryError::NotFound(*from))?;
        let dst = index.find(to).ok_or(RegistryError::NotFound(*to))?;
        if src == dst {
            return Err(RegistryError::SelfLink(*from));
        }
        for (id, hash) in [(src, from), (dst, to)] {
            if index.state_of(id) != Some(EntryState::Active) {
                return Err(RegistryError::InactiveEndpoint(*hash));
            }
        }
        if self.pairs.contains_key(&(src, dst)) {
            return Err(RegistryError::DuplicateEdge {
                from: *from,
                to: *to,
            });
        }
        if self.reaches(index, dst, src) {
            return Err(RegistryError::WouldCreateCycle {
                from: *from,
                to: *to,
            });
        }

        let out_slot = self.outgoing_of(src).len();
        let in_slot = self.incoming_of(dst).len();
        let edge = self.edges.insert(Edge {
            from: src,
            to: dst,
            out_slot,
            in_slot,
        });
        self.adjacency_mut(src).outgoing.push(edge);
        self.adjacency_mut(dst).incoming.push(edge);
        self.pairs.insert((src, dst), edge);
        journal.push(RegistryEvent::LinkAdded {
            from: *from,
            to: *to,
        });
        Ok(edge)
    }

    pub fn remove_edge<S>(
        &mut self,
        index: &HashIndex<S>,
        from: &HashValue,
        to: &HashValue,
        journal: &mut Journal,
    ) -> Result<()>
    where
        S: BuildHasher + Clone + Default,
    {
        let not_found = || RegistryError::EdgeNotFound {
            from: *from,
            to: *to,
        };
        let src = index.find(from).ok_or_else(not_found)?;
        let dst = index.find(to).ok_or_else(not_found)?;
        let edge = *self.pairs.get(&(src, dst)).ok_or_else(not_found)?;
        self.detach(edge);
        journal.push(RegistryEvent::LinkDeleted {
            from: *from,
            to: *to,
        });
        Ok(())
    }

    /// Drop every edge touching `hash`, outgoing first, then incoming.
    ///
    /// Returns the number of edges removed. Both adjacency lists are
    /// snapshotted before any mutation since `detach` reorders them.
    pub fn remove_all_edges_of<S>(
        &mut self,
        index: &HashIndex<S>,
        hash: &HashValue,
        journal: &mut Journal,
    ) -> Result<usize>
    where
        S: BuildHasher + Clone + Default,
    {
        let node = index.find(hash).ok_or(RegistryError::NotFound(*hash))?;
        let outgoing = self.outgoing_of(node).to_vec();
        let incoming = self.incoming_of(node).to_vec();

        for edge in outgoing.iter().chain(incoming.iter()) {
            if let Some(e) = self.detach(*edge) {
                let from = index.hash_of(e.from).unwrap_or(*hash);
                let to = index.hash_of(e.to).unwrap_or(*hash);
                journal.push(RegistryEvent::LinkDeleted { from, to });
            }
        }
        self.adjacency.remove(node.raw());
        Ok(outgoing.len() + incoming.len())
    }

    /// Remove `edge` from the arena, both adjacency lists and the pair index.
    fn detach(&mut self, edge: EdgeId) -> Option<Edge> {
        let removed = self.edges.remove(edge)?;

        if let Some(adj) = self.adjacency.get_mut(removed.from.raw()) {
            adj.outgoing.swap_remove(removed.out_slot);
            if let Some(&moved) = adj.outgoing.get(removed.out_slot) {
                if let Some(m) = self.edges.get_mut(moved) {
                    m.out_slot = removed.out_slot;
                }
            }
        }
        if let Some(adj) = self.adjacency.get_mut(removed.to.raw()) {
            adj.incoming.swap_remove(removed.in_slot);
            if let Some(&moved) = adj.incoming.get(removed.in_slot) {
                if let Some(m) = self.edges.get_mut(moved) {
                    m.in_slot = removed.in_slot;
                }
            }
        }
        self.pairs.remove(&(removed.from, removed.to));
        Some(removed)
    }

    /// Depth-first search from `start` following only edges into Active
    /// entries. Visitation state is a fresh bitmap over dense positions.
    fn reaches<S>(&self, index: &HashIndex<S>, start: NodeId, target: NodeId) -> bool
    where
        S: BuildHasher + Clone + Default,
    {
        let mut visited = vec![false; index.len()];
        let mut stack = Vec::new();
        if let Some(p) = index.position_of(start) {
            visited[p] = true;
            stack.push(start);
        }
        let mut seen = 0usize;
        while let Some(node) = stack.pop() {
            seen += 1;
            if node == target {
                tracing::trace!(seen, "reachability search hit target");
                return true;
            }
            for &edge in self.outgoing_of(node) {
                let Some(next) = self.edges.get(edge).map(|e| e.to) else {
                    continue;
                };
                if index.state_of(next) != Some(EntryState::Active) {
                    continue;
                }
                if let Some(p) = index.position_of(next) {
                    if !visited[p] {
                        visited[p] = true;
                        stack.push(next);
                    }
                }
            }
        }
        tracing::trace!(seen, "reachability search exhausted");
        false
    }

    /// Whether `to` can be reached from `from` along edges into Active
    /// entries. An entry always reaches itself.
    pub fn is_reachable<S>(&self, index: &HashIndex<S>, from: &HashValue, to: &HashValue) -> Result<bool>
    where
        S: BuildHasher + Clone + Default,
    {
        let src = index.find(from).ok_or(RegistryError::NotFound(*from))?;
        let dst = index.find(to).ok_or(RegistryError::NotFound(*to))?;
        Ok(self.reaches(index, src, dst))
    }

    pub fn contains_edge<S>(&self, index: &HashIndex<S>, from: &HashValue, to: &HashValue) -> bool
    where
        S: BuildHasher + Clone + Default,
    {
        match (index.find(from), index.find(to)) {
            (Some(src), Some(dst)) => self.pairs.contains_key(&(src, dst)),
            _ => false,
        }
    }

    /// Immediate successors of `hash`, in adjacency-list order.
    pub fn read_outgoing<S>(&self, index: &HashIndex<S>, hash: &HashValue) -> Result<Vec<HashValue>>
    where
        S: BuildHasher + Clone + Default,
    {
        let node = index.find(hash).ok_or(RegistryError::NotFound(*hash))?;
        Ok(self
            .outgoing_of(node)
            .iter()
            .filter_map(|&e| self.edges.get(e))
            .filter_map(|e| index.hash_of(e.to))
            .collect())
    }

    /// Immediate predecessors of `hash`, in adjacency-list order.
    pub fn read_incoming<S>(&self, index: &HashIndex<S>, hash: &HashValue) -> Result<Vec<HashValue>>
    where
        S: BuildHasher + Clone + Default,
    {
        let node = index.find(hash).ok_or(RegistryError::NotFound(*hash))?;
        Ok(self
            .incoming_of(node)
            .iter()
            .filter_map(|&e| self.edges.get(e))
            .filter_map(|e| index.hash_of(e.from))
            .collect())
    }

    /// All stored edges as `(from, to)` pairs, in arena order.
    pub fn edges<'a, S>(&'a self, index: &'a HashIndex<S>) -> impl Iterator<Item = (HashValue, HashValue)> + 'a
    where
        S: BuildHasher + Clone + Default,
    {
        self.edges
            .values()
            .filter_map(move |e| Some((index.hash_of(e.from)?, index.hash_of(e.to)?)))
    }

    /// Verify mirror consistency, back-pointers and acyclicity over Active
    /// entries.
    pub fn check_invariants<S>(&self, index: &HashIndex<S>) -> core::result::Result<(), InvariantViolation>
    where
        S: BuildHasher + Clone + Default,
    {
        for (id, e) in self.edges.iter() {
            let (Some(from), Some(to)) = (index.hash_of(e.from), index.hash_of(e.to)) else {
                return Err(InvariantViolation::DanglingEdge);
            };
            if e.from == e.to {
                return Err(InvariantViolation::SelfLoop(from));
            }
            if self.outgoing_of(e.from).get(e.out_slot) != Some(&id)
                || self.incoming_of(e.to).get(e.in_slot) != Some(&id)
            {
                return Err(InvariantViolation::BrokenBackPointer { from, to });
            }
            if self.pairs.get(&(e.from, e.to)) != Some(&id) {
                return Err(InvariantViolation::DuplicateEdge { from, to });
            }
        }

        let outgoing: usize = self.adjacency.values().map(|a| a.outgoing.len()).sum();
        let incoming: usize = self.adjacency.values().map(|a| a.incoming.len()).sum();
        if outgoing != self.edges.len()
            || incoming != self.edges.len()
            || self.pairs.len() != self.edges.len()
        {
            return Err(InvariantViolation::MirrorMismatch {
                edges: self.edges.len(),
                outgoing,
                incoming,
            });
        }

        self.check_acyclic(index)
    }

    // Kahn-style peel over the Active subgraph: whatever cannot be peeled
    // sits on a cycle or downstream of one.
    fn check_acyclic<S>(&self, index: &HashIndex<S>) -> core::result::Result<(), InvariantViolation>
    where
        S: BuildHasher + Clone + Default,
    {
        let active = |id: NodeId| index.state_of(id) == Some(EntryState::Active);
        let mut in_degree = vec![0usize; index.len()];
        let mut total = 0usize;
        for e in self.edges.values() {
            if active(e.from) && active(e.to) {
                if let Some(p) = index.position_of(e.to) {
                    in_degree[p] += 1;
                }
            }
        }

        let mut ready: Vec<NodeId> = Vec::new();
        for node in index.nodes().filter(|&n| active(n)) {
            total += 1;
            if index.position_of(node).map(|p| in_degree[p] == 0).unwrap_or(false) {
                ready.push(node);
            }
        }

        let mut peeled = 0usize;
        while let Some(node) = ready.pop() {
            peeled += 1;
            for &edge in self.outgoing_of(node) {
                let Some(next) = self.edges.get(edge).map(|e| e.to) else {
                    continue;
                };
                if !active(next) {
                    continue;
                }
                if let Some(p) = index.position_of(next) {
                    in_degree[p] -= 1;
                    if in_degree[p] == 0 {
                        ready.push(next);
                    }
                }
            }
        }

        if peeled == total {
            Ok(())
        } else {
            Err(InvariantViolation::Cycle {
                remaining: total - peeled,
            })
        }
    }
}
