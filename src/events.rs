//! Notifications emitted by committed transactions.

use crate::types::{HashValue, Owner};

/// One committed state change. Every successful mutation appends exactly
/// the notifications for the changes it made, in the order it made them.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegistryEvent {
    HashAdded { hash: HashValue, owner: Owner },
    HashDeprecated { hash: HashValue, owner: Owner },
    HashDeleted { hash: HashValue, owner: Owner },
    LinkAdded { from: HashValue, to: HashValue },
    LinkDeleted { from: HashValue, to: HashValue },
}

/// Append-only, in-memory log of committed events.
#[derive(Debug, Default)]
pub struct Journal {
    events: Vec<RegistryEvent>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn push(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn as_slice(&self) -> &[RegistryEvent] {
        &self.events
    }

    pub(crate) fn since(&self, mark: usize) -> &[RegistryEvent] {
        &self.events[mark..]
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Hand all recorded events to the caller and empty the journal.
    pub fn drain(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }
}
