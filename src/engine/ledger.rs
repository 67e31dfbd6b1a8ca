use std::collections::{BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::client::MessageId;

/// Message ids already handed to the dispatcher this run. In memory only.
#[derive(Debug, Default)]
pub struct Ledger {
    seen: Mutex<HashSet<MessageId>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-mark in one step. Returns true if the caller now owns `id`,
    /// false if someone claimed it earlier.
    pub fn claim(&self, id: MessageId) -> bool {
        self.lock().insert(id)
    }

    pub fn already_processed(&self, id: MessageId) -> bool {
        self.lock().contains(&id)
    }

    pub fn mark_processed(&self, id: MessageId) {
        self.lock().insert(id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the processed ids.
    pub fn snapshot(&self) -> BTreeSet<MessageId> {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<MessageId>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
