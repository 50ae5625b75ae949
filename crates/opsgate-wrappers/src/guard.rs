//! Single-flight guard for wrapper execution.
//!
//! At most one wrapper may run per (requester, operation) pair at a
//! time; a second attempt is refused immediately rather than queued.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Tracks in-flight (requester, operation) pairs.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    inflight: DashMap<(String, String), ()>,
}

impl ExecutionGuard {
    /// Create an empty guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the (requester, operation) slot.
    ///
    /// Returns `None` when an execution for the same pair is already in
    /// flight. The returned slot releases on drop.
    #[must_use]
    pub fn try_acquire(&self, user: &str, operation: &str) -> Option<ExecutionSlot<'_>> {
        let key = (user.to_string(), operation.to_string());
        match self.inflight.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(ExecutionSlot { guard: self, key })
            },
        }
    }
}

/// RAII claim on a (requester, operation) pair.
#[derive(Debug)]
pub struct ExecutionSlot<'a> {
    guard: &'a ExecutionGuard,
    key: (String, String),
}

impl Drop for ExecutionSlot<'_> {
    fn drop(&mut self) {
        self.guard.inflight.remove(&self.key);
    }
}
