// Registry property tests.
//
// Property: state-machine equivalence against a simple model.
//  - Model: entries keyed by pool index with (owner, state), the dense
//    collection as a Vec compacted by swap_remove, and an edge set.
//  - Operations: add, deprecate, delete, link, unlink from two callers,
//    plus the all-zero sentinel as a possible key.
//  - Invariants after every step:
//    - result kind (Ok or the first violated precondition) matches the model;
//    - `check_invariants` holds (positions, mirrors, back-pointers, DAG);
//    - dense order, positions, owners, states and edge set match the model;
//    - a committed call returns one event per change, LinkDeleted before
//      HashDeleted.
use dag_registry::{Call, EntryState, ErrorKind, HashValue, Owner, Registry, RegistryEvent};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

const POOL: u8 = 6;

// Index 0 maps to the sentinel.
fn key(i: u8) -> HashValue {
    if i == 0 {
        HashValue::ZERO
    } else {
        HashValue::from_bytes([i; 32])
    }
}

#[derive(Default)]
struct Model {
    entries: BTreeMap<u8, (Owner, EntryState)>,
    dense: Vec<u8>,
    edges: BTreeSet<(u8, u8)>,
}

impl Model {
    fn active(&self, i: u8) -> bool {
        matches!(self.entries.get(&i), Some((_, EntryState::Active)))
    }

    fn reaches(&self, start: u8, target: u8) -> bool {
        let mut seen = BTreeSet::from([start]);
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            if n == target {
                return true;
            }
            for &(a, b) in &self.edges {
                if a == n && self.active(b) && seen.insert(b) {
                    stack.push(b);
                }
            }
        }
        false
    }

    fn owned(&self, i: u8, caller: Owner) -> Result<EntryState, ErrorKind> {
        match self.entries.get(&i) {
            None => Err(ErrorKind::NotFound),
            Some((owner, _)) if *owner != caller => Err(ErrorKind::Unauthorized),
            Some((_, state)) => Ok(*state),
        }
    }

    // Predict the outcome of `call`; applies it when it would commit.
    fn apply(&mut self, caller: Owner, call: &Op) -> Result<(), ErrorKind> {
        match *call {
            Op::Add(i) => {
                if i == 0 {
                    return Err(ErrorKind::InvalidKey);
                }
                if self.entries.contains_key(&i) {
                    return Err(ErrorKind::DuplicateKey);
                }
                self.entries.insert(i, (caller, EntryState::Active));
                self.dense.push(i);
            }
            Op::Deprecate(i) => {
                if self.owned(i, caller)? == EntryState::Deprecated {
                    return Err(ErrorKind::InvalidTransition);
                }
                if let Some(entry) = self.entries.get_mut(&i) {
                    entry.1 = EntryState::Deprecated;
                }
            }
            Op::Delete(i) => {
                if self.owned(i, caller)? != EntryState::Deprecated {
                    return Err(ErrorKind::PreconditionFailed);
                }
                self.edges.retain(|&(a, b)| a != i && b != i);
                self.entries.remove(&i);
                let p = self.dense.iter().position(|&x| x == i).unwrap();
                self.dense.swap_remove(p);
            }
            Op::Link(a, b) => {
                self.owned(a, caller)?;
                if !self.entries.contains_key(&b) {
                    return Err(ErrorKind::NotFound);
                }
                if a == b {
                    return Err(ErrorKind::SelfLink);
                }
                if !self.active(a) || !self.active(b) {
                    return Err(ErrorKind::InactiveEndpoint);
                }
                if self.edges.contains(&(a, b)) {
                    return Err(ErrorKind::DuplicateEdge);
                }
                if self.reaches(b, a) {
                    return Err(ErrorKind::WouldCreateCycle);
                }
                self.edges.insert((a, b));
            }
            Op::Unlink(a, b) => {
                self.owned(a, caller)?;
                if !self.edges.remove(&(a, b)) {
                    return Err(ErrorKind::EdgeNotFound);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Op {
    Add(u8),
    Deprecate(u8),
    Delete(u8),
    Link(u8, u8),
    Unlink(u8, u8),
}

impl Op {
    fn call(&self) -> Call {
        match *self {
            Op::Add(i) => Call::AddHash(key(i)),
            Op::Deprecate(i) => Call::DeprecateHash(key(i)),
            Op::Delete(i) => Call::DeleteHash(key(i)),
            Op::Link(a, b) => Call::AddLink { from: key(a), to: key(b) },
            Op::Unlink(a, b) => Call::DeleteLink { from: key(a), to: key(b) },
        }
    }
}

fn arb_step() -> impl Strategy<Value = (Owner, Op)> {
    let i = 0..=POOL;
    let op = prop_oneof![
        3 => i.clone().prop_map(Op::Add),
        2 => i.clone().prop_map(Op::Deprecate),
        2 => i.clone().prop_map(Op::Delete),
        5 => (i.clone(), i.clone()).prop_map(|(a, b)| Op::Link(a, b)),
        1 => (i.clone(), i).prop_map(|(a, b)| Op::Unlink(a, b)),
    ];
    (prop_oneof![Just(Owner(1)), Just(Owner(2))], op)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]
    #[test]
    fn prop_registry_matches_model(steps in proptest::collection::vec(arb_step(), 1..120)) {
        let mut sut = Registry::new();
        let mut model = Model::default();

        for (caller, op) in steps {
            let edges_before = model.edges.clone();
            let expected = model.apply(caller, &op);
            let got = sut.execute(caller, op.call()).map(|events| events.to_vec());

            match (&got, expected) {
                (Ok(events), Ok(())) => {
                    match op {
                        Op::Delete(i) => {
                            let incident = edges_before.len() - model.edges.len();
                            prop_assert_eq!(events.len(), incident + 1);
                            let cascade_ok = events[..incident]
                                .iter()
                                .all(|e| matches!(e, RegistryEvent::LinkDeleted { .. }));
                            prop_assert!(cascade_ok);
                            prop_assert_eq!(
                                events[incident],
                                RegistryEvent::HashDeleted { hash: key(i), owner: caller }
                            );
                        }
                        _ => prop_assert_eq!(events.len(), 1),
                    }
                }
                (Err(e), Err(kind)) => prop_assert_eq!(e.kind(), kind),
                (got, expected) => {
                    prop_assert!(false, "{:?}: registry {:?}, model {:?}", op, got, expected);
                }
            }

            prop_assert_eq!(sut.check_invariants(), Ok(()));
            let dense: Vec<HashValue> = model.dense.iter().map(|&i| key(i)).collect();
            prop_assert_eq!(sut.hashes().collect::<Vec<_>>(), dense);
            for (pos, &i) in model.dense.iter().enumerate() {
                let info = sut.read(&key(i)).unwrap();
                let (owner, state) = model.entries[&i];
                prop_assert_eq!(info.position, pos);
                prop_assert_eq!(info.owner, owner);
                prop_assert_eq!(info.state, state);
            }
            let links: BTreeSet<_> = sut.links().collect();
            let modeled: BTreeSet<_> = model.edges.iter().map(|&(a, b)| (key(a), key(b))).collect();
            prop_assert_eq!(links, modeled);
        }
    }
}
