//! SharedRegistry: serialized multi-threaded access to a [`Registry`].
//!
//! The lock is held for the whole of each transaction, so no two mutations
//! interleave and readers only ever observe committed state.

use crate::error::{InvariantViolation, Result};
use crate::events::RegistryEvent;
use crate::registry::{Call, Registry};
use crate::types::{EntryInfo, HashValue, Owner};
use core::hash::BuildHasher;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::sync::Arc;

pub struct SharedRegistry<S = RandomState> {
    inner: Arc<Mutex<Registry<S>>>,
}

impl<S> Clone for SharedRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::from_registry(Registry::new())
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> From<Registry<S>> for SharedRegistry<S> {
    fn from(registry: Registry<S>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(registry)),
        }
    }
}

impl<S> SharedRegistry<S>
where
    S: BuildHasher + Clone + Default,
{
    pub fn from_registry(registry: Registry<S>) -> Self {
        registry.into()
    }

    /// Run one transaction under the lock and return its committed events.
    pub fn execute(&self, caller: Owner, call: Call) -> Result<Vec<RegistryEvent>> {
        let mut registry = self.inner.lock();
        registry.execute(caller, call).map(<[RegistryEvent]>::to_vec)
    }

    pub fn read(&self, hash: &HashValue) -> Result<EntryInfo> {
        self.inner.lock().read(hash)
    }

    pub fn read_outgoing(&self, hash: &HashValue) -> Result<Vec<HashValue>> {
        self.inner.lock().read_outgoing(hash)
    }

    pub fn read_incoming(&self, hash: &HashValue) -> Result<Vec<HashValue>> {
        self.inner.lock().read_incoming(hash)
    }

    /// Inspect a consistent snapshot; no transaction can commit while `f`
    /// runs.
    pub fn with<R>(&self, f: impl FnOnce(&Registry<S>) -> R) -> R {
        let registry = self.inner.lock();
        f(&*registry)
    }

    pub fn drain_events(&self) -> Vec<RegistryEvent> {
        self.inner.lock().drain_events()
    }

    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        self.inner.lock().check_invariants()
    }
}
