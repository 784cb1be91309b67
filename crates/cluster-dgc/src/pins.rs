//! Per-client pinned identifiers, contributed as extra GC roots.
//!
//! Every connected client owns one pin set. All sets live behind a single
//! lock, so a disconnect removes a client's pins in one step and a root-set
//! snapshot sees either all of them or none of them.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::id::{ClientId, ObjectId, ObjectIdSet};
use crate::tracing::internal::{log_client_removed, log_pin_for_unknown_client};

/// Registry of the identifiers each connected client holds locally.
#[derive(Debug, Default)]
pub struct ClientPinRegistry {
    clients: RwLock<FxHashMap<ClientId, ObjectIdSet>>,
}

impl ClientPinRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly connected client with no pins.
    ///
    /// Returns `false` if the client was already connected.
    pub fn client_connected(&self, client: ClientId) -> bool {
        let mut clients = self.clients.write();
        if clients.contains_key(&client) {
            return false;
        }
        clients.insert(client, ObjectIdSet::new());
        true
    }

    /// Remove a disconnected client and all of its pins.
    ///
    /// Returns the number of pins dropped, or `None` for an unknown client.
    pub fn client_disconnected(&self, client: ClientId) -> Option<usize> {
        self.remove_client(client, "disconnected")
    }

    /// Forcefully remove a client and all of its pins.
    ///
    /// Returns the number of pins dropped, or `None` for an unknown client.
    pub fn evict_client(&self, client: ClientId) -> Option<usize> {
        self.remove_client(client, "evicted")
    }

    /// Record that `client` now holds `id`.
    ///
    /// Pins for clients that are not connected are ignored: the client may
    /// have disconnected while the notification was in flight.
    pub fn client_pinned(&self, client: ClientId, id: ObjectId) -> bool {
        if id.is_null() {
            return false;
        }
        let mut clients = self.clients.write();
        if let Some(pins) = clients.get_mut(&client) {
            pins.insert(id)
        } else {
            drop(clients);
            log_pin_for_unknown_client(client, id);
            false
        }
    }

    /// Record that `client` no longer holds `id`.
    pub fn client_unpinned(&self, client: ClientId, id: ObjectId) -> bool {
        self.clients
            .write()
            .get_mut(&client)
            .is_some_and(|pins| pins.remove(&id))
    }

    /// Append every pinned identifier of every connected client to `roots`.
    ///
    /// Returns how many identifiers were newly added.
    pub fn add_referenced_ids_to(&self, roots: &mut ObjectIdSet) -> usize {
        let before = roots.len();
        let clients = self.clients.read();
        for pins in clients.values() {
            roots.extend(pins.iter().copied());
        }
        drop(clients);
        roots.len() - before
    }

    /// Every pinned identifier, as one consistent snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ObjectIdSet {
        let mut roots = ObjectIdSet::new();
        self.add_referenced_ids_to(&mut roots);
        roots
    }

    /// Pins held by one client.
    #[must_use]
    pub fn pinned_ids(&self, client: ClientId) -> Option<ObjectIdSet> {
        self.clients.read().get(&client).cloned()
    }

    /// Returns `true` if the client is connected.
    #[must_use]
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.read().contains_key(&client)
    }

    /// Connected clients, sorted.
    #[must_use]
    pub fn connected_clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.clients.read().keys().copied().collect();
        clients.sort_unstable();
        clients
    }

    /// Total pins across all clients (an identifier pinned by two clients
    /// counts twice).
    #[must_use]
    pub fn total_pins(&self) -> usize {
        self.clients.read().values().map(ObjectIdSet::len).sum()
    }

    fn remove_client(&self, client: ClientId, reason: &str) -> Option<usize> {
        let removed = self.clients.write().remove(&client)?;
        log_client_removed(client, reason, removed.len());
        Some(removed.len())
    }
}
