//! Error taxonomy for registry transactions and invariant checks.

use crate::types::{EntryState, HashValue, Owner};

/// Reason a transaction was rejected. Every rejection is detected before
/// any state is touched, so an `Err` always means "nothing changed".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("the all-zero hash is reserved and cannot be registered")]
    InvalidKey,

    #[error("hash {0} is already registered")]
    DuplicateKey(HashValue),

    #[error("hash {0} is not registered")]
    NotFound(HashValue),

    #[error("{caller} does not own hash {hash}")]
    Unauthorized { hash: HashValue, caller: Owner },

    #[error("hash {hash} cannot move from {from} to {to}")]
    InvalidTransition {
        hash: HashValue,
        from: EntryState,
        to: EntryState,
    },

    #[error("hash {0} cannot link to itself")]
    SelfLink(HashValue),

    #[error("hash {0} is not active")]
    InactiveEndpoint(HashValue),

    #[error("link {from} -> {to} already exists")]
    DuplicateEdge { from: HashValue, to: HashValue },

    #[error("link {from} -> {to} would close a cycle")]
    WouldCreateCycle { from: HashValue, to: HashValue },

    #[error("link {from} -> {to} does not exist")]
    EdgeNotFound { from: HashValue, to: HashValue },

    #[error("hash {0} must be deprecated before it can be deleted")]
    PreconditionFailed(HashValue),
}

/// Fieldless mirror of [`RegistryError`] for matching and logging.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    InvalidKey,
    DuplicateKey,
    NotFound,
    Unauthorized,
    InvalidTransition,
    SelfLink,
    InactiveEndpoint,
    DuplicateEdge,
    WouldCreateCycle,
    EdgeNotFound,
    PreconditionFailed,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidKey => ErrorKind::InvalidKey,
            RegistryError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::Unauthorized { .. } => ErrorKind::Unauthorized,
            RegistryError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            RegistryError::SelfLink(_) => ErrorKind::SelfLink,
            RegistryError::InactiveEndpoint(_) => ErrorKind::InactiveEndpoint,
            RegistryError::DuplicateEdge { .. } => ErrorKind::DuplicateEdge,
            RegistryError::WouldCreateCycle { .. } => ErrorKind::WouldCreateCycle,
            RegistryError::EdgeNotFound { .. } => ErrorKind::EdgeNotFound,
            RegistryError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
        }
    }
}

pub type Result<T, E = RegistryError> = core::result::Result<T, E>;

/// A structural inconsistency found by `check_invariants`.
///
/// These never surface from regular operations; they exist so tests can
/// assert that every committed state is well formed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("sentinel hash stored in the index")]
    SentinelKey,

    #[error("dense collection holds {dense} entries, index holds {indexed}, slots hold {slots}")]
    LengthMismatch {
        dense: usize,
        indexed: usize,
        slots: usize,
    },

    #[error("hash {hash} stores position {stored} but sits at {actual}")]
    PositionMismatch {
        hash: HashValue,
        stored: usize,
        actual: usize,
    },

    #[error("hash {0} is not reachable through the key index")]
    Unindexed(HashValue),

    #[error("an edge references an entry that is no longer registered")]
    DanglingEdge,

    #[error("self-loop on {0}")]
    SelfLoop(HashValue),

    #[error("edge {from} -> {to} is stored more than once or not keyed")]
    DuplicateEdge { from: HashValue, to: HashValue },

    #[error("edge {from} -> {to} has a stale adjacency back-pointer")]
    BrokenBackPointer { from: HashValue, to: HashValue },

    #[error("{edges} edges but {outgoing} outgoing and {incoming} incoming adjacency slots")]
    MirrorMismatch {
        edges: usize,
        outgoing: usize,
        incoming: usize,
    },

    #[error("{remaining} active entries lie on or behind a cycle")]
    Cycle { remaining: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_hash() {
        let h = HashValue::from_bytes([0x11; 32]);
        let err = RegistryError::NotFound(h);
        assert!(err.to_string().contains(&h.to_string()));

        let err = RegistryError::Unauthorized {
            hash: h,
            caller: Owner(7),
        };
        assert!(err.to_string().contains("owner:7"));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn transition_message_uses_state_names() {
        let err = RegistryError::InvalidTransition {
            hash: HashValue::from_bytes([2; 32]),
            from: EntryState::Deprecated,
            to: EntryState::Deprecated,
        };
        assert!(err.to_string().contains("from deprecated to deprecated"));
    }
}
