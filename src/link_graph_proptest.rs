#![cfg(test)]

// Property tests for HashIndex + LinkGraph kept inside the crate so they can
// drive the layers directly, without the ownership checks of Registry.

use crate::error::{ErrorKind, RegistryError};
use crate::events::{Journal, RegistryEvent};
use crate::hash_index::HashIndex;
use crate::link_graph::LinkGraph;
use crate::types::{EntryState, HashValue, Owner};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const POOL: u8 = 6;

fn h(i: u8) -> HashValue {
    HashValue::from_bytes([i + 1; 32])
}

#[derive(Clone, Debug)]
enum Op {
    Add(u8),
    Deprecate(u8),
    Cascade(u8),
    Link(u8, u8),
    Unlink(u8, u8),
    Outgoing(u8),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let i = 0..POOL;
    prop_oneof![
        2 => i.clone().prop_map(Op::Add),
        1 => i.clone().prop_map(Op::Deprecate),
        1 => i.clone().prop_map(Op::Cascade),
        4 => (i.clone(), i.clone()).prop_map(|(a, b)| Op::Link(a, b)),
        1 => (i.clone(), i.clone()).prop_map(|(a, b)| Op::Unlink(a, b)),
        1 => i.prop_map(Op::Outgoing),
    ]
}

#[derive(Default)]
struct Model {
    // Present entries and whether they are still Active.
    nodes: BTreeMap<u8, bool>,
    edges: BTreeSet<(u8, u8)>,
}

impl Model {
    fn reaches(&self, start: u8, target: u8) -> bool {
        let mut seen = BTreeSet::from([start]);
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            if n == target {
                return true;
            }
            for &(a, b) in &self.edges {
                if a == n && self.nodes.get(&b) == Some(&true) && seen.insert(b) {
                    stack.push(b);
                }
            }
        }
        false
    }

    fn link(&self, a: u8, b: u8) -> Result<(), ErrorKind> {
        let (Some(&sa), Some(&sb)) = (self.nodes.get(&a), self.nodes.get(&b)) else {
            return Err(ErrorKind::NotFound);
        };
        if a == b {
            return Err(ErrorKind::SelfLink);
        }
        if !sa || !sb {
            return Err(ErrorKind::InactiveEndpoint);
        }
        if self.edges.contains(&(a, b)) {
            return Err(ErrorKind::DuplicateEdge);
        }
        if self.reaches(b, a) {
            return Err(ErrorKind::WouldCreateCycle);
        }
        Ok(())
    }
}

// Property: the layered index + graph behave like a plain node map plus an
// edge set. Invariants exercised after every step:
// - Every result kind (Ok or the first violated precondition) matches the model.
// - `check_invariants` holds: positions, mirrors, back-pointers, acyclicity.
// - The stored edge set equals the model's edge set.
// - A cascade journals one LinkDeleted per incident edge, then HashDeleted.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_graph_matches_model(ops in proptest::collection::vec(arb_op(), 1..80)) {
        let mut idx = HashIndex::new();
        let mut g = LinkGraph::new();
        let mut j = Journal::new();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Add(i) => {
                    let res = idx.add(h(i), Owner(0), &mut j);
                    if model.nodes.contains_key(&i) {
                        prop_assert_eq!(res, Err(RegistryError::DuplicateKey(h(i))));
                    } else {
                        prop_assert!(res.is_ok());
                        model.nodes.insert(i, true);
                    }
                }
                Op::Deprecate(i) => {
                    let res = idx.set_state(&h(i), EntryState::Deprecated, &mut j).map_err(|e| e.kind());
                    match model.nodes.get_mut(&i) {
                        None => prop_assert_eq!(res, Err(ErrorKind::NotFound)),
                        Some(active) if !*active => prop_assert_eq!(res, Err(ErrorKind::InvalidTransition)),
                        Some(active) => {
                            prop_assert_eq!(res, Ok(()));
                            *active = false;
                        }
                    }
                }
                Op::Cascade(i) => {
                    let mark = j.len();
                    let res = g.remove_all_edges_of(&idx, &h(i), &mut j);
                    if model.nodes.contains_key(&i) {
                        let incident: Vec<_> = model.edges.iter().copied().filter(|&(a, b)| a == i || b == i).collect();
                        prop_assert_eq!(res, Ok(incident.len()));
                        idx.remove(&h(i), &mut j).unwrap();
                        let journaled = &j.as_slice()[mark..];
                        prop_assert_eq!(journaled.len(), incident.len() + 1);
                        let deleted: BTreeSet<_> = journaled[..incident.len()].iter().map(|e| match e {
                            RegistryEvent::LinkDeleted { from, to } => (*from, *to),
                            other => panic!("unexpected event in cascade: {:?}", other),
                        }).collect();
                        let expected: BTreeSet<_> = incident.iter().map(|&(a, b)| (h(a), h(b))).collect();
                        prop_assert_eq!(deleted, expected);
                        let is_hash_deleted = matches!(journaled[incident.len()], RegistryEvent::HashDeleted { .. });
                        prop_assert!(is_hash_deleted);
                        for e in incident { model.edges.remove(&e); }
                        model.nodes.remove(&i);
                    } else {
                        prop_assert_eq!(res, Err(RegistryError::NotFound(h(i))));
                    }
                }
                Op::Link(a, b) => {
                    let expected = model.link(a, b);
                    let res = g.add_edge(&idx, &h(a), &h(b), &mut j).map(|_| ()).map_err(|e| e.kind());
                    prop_assert_eq!(res, expected);
                    if res.is_ok() { model.edges.insert((a, b)); }
                }
                Op::Unlink(a, b) => {
                    let res = g.remove_edge(&idx, &h(a), &h(b), &mut j).map_err(|e| e.kind());
                    if model.edges.remove(&(a, b)) {
                        prop_assert_eq!(res, Ok(()));
                    } else {
                        prop_assert_eq!(res, Err(ErrorKind::EdgeNotFound));
                    }
                }
                Op::Outgoing(i) => {
                    let res = g.read_outgoing(&idx, &h(i));
                    if model.nodes.contains_key(&i) {
                        let got: BTreeSet<_> = res.unwrap().into_iter().collect();
                        let want: BTreeSet<_> = model.edges.iter().filter(|e| e.0 == i).map(|e| h(e.1)).collect();
                        prop_assert_eq!(got, want);
                    } else {
                        prop_assert_eq!(res, Err(RegistryError::NotFound(h(i))));
                    }
                }
            }

            prop_assert_eq!(idx.check_invariants(), Ok(()));
            prop_assert_eq!(g.check_invariants(&idx), Ok(()));
            let stored: BTreeSet<_> = g.edges(&idx).collect();
            let modeled: BTreeSet<_> = model.edges.iter().map(|&(a, b)| (h(a), h(b))).collect();
            prop_assert_eq!(stored, modeled);
            prop_assert_eq!(idx.len(), model.nodes.len());
        }
    }
}
