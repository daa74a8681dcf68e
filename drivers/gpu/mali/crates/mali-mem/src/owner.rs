//! # Ownership Registry
//!
//! Per-client ledger of live allocations, used to free everything a client
//! owns when its connection goes away.
//!
//! Entries are weak references: the [`HandleTable`](crate::HandleTable) owns
//! each record, the registry only remembers who it belongs to.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use hashbrown::HashMap;
use mali_core::ClientId;

// =============================================================================
// OWNERSHIP REGISTRY
// =============================================================================

/// Per-client ordered lists of owned records
#[derive(Debug)]
pub struct OwnershipRegistry<T> {
    clients: HashMap<ClientId, Vec<Weak<T>>>,
}

impl<T> OwnershipRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Register a client with an empty ownership list
    pub fn connect(&mut self, client: ClientId) {
        self.clients.entry(client).or_default();
    }

    /// Discard a client's record
    ///
    /// Returns the number of entries that were still attached.
    pub fn disconnect(&mut self, client: ClientId) -> usize {
        self.clients
            .remove(&client)
            .map(|list| list.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Check whether a client record exists
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    /// Append a record to the client's list
    ///
    /// Returns `false` and records nothing if the client is not connected.
    pub fn attach(&mut self, client: ClientId, record: &Arc<T>) -> bool {
        match self.clients.get_mut(&client) {
            Some(list) => {
                list.push(Arc::downgrade(record));
                true
            }
            None => false,
        }
    }

    /// Remove a record from the client's list
    ///
    /// Returns `false` if it was not attached; that is not an error.
    pub fn detach(&mut self, client: ClientId, record: &Arc<T>) -> bool {
        let Some(list) = self.clients.get_mut(&client) else {
            return false;
        };

        let target = Arc::as_ptr(record);
        match list.iter().position(|w| w.as_ptr() == target) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Take every record still attached to the client, in attach order
    ///
    /// The client's list is left empty. Entries whose record is already gone
    /// are skipped.
    pub fn reclaim_all(&mut self, client: ClientId) -> Vec<Arc<T>> {
        match self.clients.get_mut(&client) {
            Some(list) => core::mem::take(list)
                .into_iter()
                .filter_map(|w| w.upgrade())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Records still attached to the client, in attach order
    pub fn owned(&self, client: ClientId) -> Vec<Arc<T>> {
        self.clients
            .get(&client)
            .map(|list| list.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Number of live records attached to the client
    pub fn owned_count(&self, client: ClientId) -> usize {
        self.clients
            .get(&client)
            .map(|list| list.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Empty every client's list, keeping the client records
    pub fn clear_lists(&mut self) {
        for list in self.clients.values_mut() {
            list.clear();
        }
    }
}

impl<T> Default for OwnershipRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
