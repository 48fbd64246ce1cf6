//! Global thunk registry
//!
//! Maps ThunkId → termination lease for every live actor.
//! Thread-safe for access from any caller or actor thread.
//!
//! The lease is the sending half of a channel that is never sent on:
//! the actor parks on the receiving half, and dropping the sender
//! (by removing the entry) is the revocation signal. `delete` and
//! actor self-reaping both come down to a `remove` here.

use std::collections::HashMap;
use std::sync::RwLock;

use crossbeam_channel::Sender;

use crate::thunk::ThunkId;

pub(crate) struct ThunkRegistry {
    leases: RwLock<HashMap<ThunkId, Sender<()>>>,
}

impl ThunkRegistry {
    fn new() -> Self {
        ThunkRegistry {
            leases: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new actor under its id, holding its lease alive.
    pub(crate) fn register(&self, id: ThunkId, lease: Sender<()>) {
        let mut leases = self.leases.write().expect("registry write lock poisoned");
        leases.insert(id, lease);
    }

    /// Remove an actor, dropping its lease. Idempotent.
    pub(crate) fn remove(&self, id: &ThunkId) {
        let mut leases = self.leases.write().expect("registry write lock poisoned");
        leases.remove(id);
    }

    /// Non-blocking liveness check.
    pub(crate) fn contains(&self, id: &ThunkId) -> bool {
        let leases = self.leases.read().expect("registry read lock poisoned");
        leases.contains_key(id)
    }
}

// Global registry instance
lazy_static::lazy_static! {
    pub(crate) static ref REGISTRY: ThunkRegistry = ThunkRegistry::new();
}
