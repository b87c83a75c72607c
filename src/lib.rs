//! dag-registry: a registry of unique 256-bit hash identifiers with
//! owner-gated mutation, linked into a directed acyclic graph.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: keep three interlocking structures consistent across any
//!   interleaving of insert/deprecate/delete/link/unlink, with O(1)
//!   removal everywhere.
//! - Layers:
//!   - HashIndex<S>: dense, compactable collection of entries with O(1)
//!     lookup by hash and O(1) swap-with-last removal. Hands out stable
//!     `NodeId`s that, unlike positions, never move.
//!   - LinkGraph: arena of edges plus per-node `outgoing`/`incoming` lists.
//!     Each edge carries back-pointers into both lists so unlinking is a
//!     swap-remove plus one fix-up per side. Enforces the DAG invariant
//!     with a reachability check before every insertion.
//!   - Registry<S>: public operations. Applies ownership checks, drives
//!     the deletion cascade, and journals notifications.
//!   - SharedRegistry<S>: mutex-serialized handle for multi-threaded hosts.
//!
//! Constraints
//! - The all-zero hash is a sentinel and is never stored.
//! - Lifecycle only moves forward: Active -> Deprecated -> removed.
//! - Only the creator of an entry may deprecate it, delete it, or link
//!   from it. Ownership never changes.
//! - New links need both endpoints Active. Deprecation keeps existing
//!   links; deletion removes every incident link first.
//!
//! Transactions
//! - Every precondition is checked before the first write, so each call
//!   commits fully or returns an error with nothing changed.
//! - Each committed change journals one `RegistryEvent`. In a deletion
//!   cascade all `LinkDeleted` events precede the final `HashDeleted`.
//!
//! Positions
//! - `EntryInfo::position` is the entry's index in the dense collection.
//!   Deletion moves the last entry into the freed slot, so a position read
//!   before a mutation may be stale afterwards. The graph layer keys
//!   everything by `NodeId` for this reason.
//!
//! Cycle check
//! - Depth-first search from the proposed target along edges into Active
//!   entries, marking a bitmap sized to the current entry count and
//!   allocated per call. Reaching the proposed source rejects the link.
//!   Cost is O(V + E) per attempted link.
//!
//! Notes and non-goals
//! - In-memory only: no persistence format and no network surface.
//! - No edge weights or types, no ownership transfer.
//! - `check_invariants` re-derives every structural invariant and is meant
//!   for tests; regular operations never call it.

mod error;
mod events;
pub mod hash_index;
pub mod link_graph;
mod link_graph_proptest;
mod registry;
mod shared;
mod types;

// Public surface
pub use error::{ErrorKind, InvariantViolation, RegistryError, Result};
pub use events::{Journal, RegistryEvent};
pub use registry::{Call, Registry, RegistryConfig};
pub use shared::SharedRegistry;
pub use types::{EntryInfo, EntryState, HashValue, Owner, ParseHashError};
