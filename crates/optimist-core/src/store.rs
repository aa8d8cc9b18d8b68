//! Synced store
//!
//! The keyed collection of locally-known records, each paired with its sync
//! metadata, plus the ordered list of client-side ids used for display.
//!
//! ## Atomic batches
//!
//! `StoreHandle::update` is the only way to change a shared store. The closure
//! works on a private copy; when it returns, the copy is published as the new
//! snapshot in one step. Observers therefore see either none or all of the
//! changes a closure makes, never a subset.
//!
//! ## Observing
//!
//! - `StoreHandle::snapshot()` - the current state
//! - `StoreHandle::subscribe()` - a `watch` receiver for the latest state
//! - `StoreHandle::events()` - a `broadcast` receiver of every published state

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::warn;

use crate::client_id::ClientsideId;
use crate::status::NetworkStatus;

/// Capacity of the event channel; slow subscribers skip ahead when it overflows
const EVENT_CAPACITY: usize = 1024;

/// Sync metadata attached to each record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    pub clientside_id: ClientsideId,
    pub network_status: NetworkStatus,
}

/// A record paired with its sync metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synced<T> {
    pub data: T,
    pub meta: SyncMeta,
}

impl<T> Synced<T> {
    pub fn clientside_id(&self) -> &ClientsideId {
        &self.meta.clientside_id
    }

    pub fn status(&self) -> NetworkStatus {
        self.meta.network_status
    }
}

/// Ordered, keyed collection of synced records
///
/// Invariants maintained by every method:
/// - `clientside_ids` holds each key of `keyed_items` exactly once, in
///   insertion order
/// - an id is never handed out twice, even after its record is removed
#[derive(Debug, Clone)]
pub struct SyncedStore<T> {
    keyed_items: HashMap<ClientsideId, Synced<T>>,
    clientside_ids: Vec<ClientsideId>,
    issued: HashSet<ClientsideId>,
    revision: u64,
}

impl<T> Default for SyncedStore<T> {
    fn default() -> Self {
        Self {
            keyed_items: HashMap::new(),
            clientside_ids: Vec::new(),
            issued: HashSet::new(),
            revision: 0,
        }
    }
}

impl<T> SyncedStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from records already persisted remotely
    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.insert(record, NetworkStatus::Synced);
        }
        store
    }

    /// Allocate an id that this store has never issued before
    pub fn allocate_id(&mut self) -> ClientsideId {
        loop {
            let id = ClientsideId::generate();
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Append a record under a fresh client-side id
    pub fn insert(&mut self, data: T, network_status: NetworkStatus) -> ClientsideId {
        let clientside_id = self.allocate_id();
        self.clientside_ids.push(clientside_id.clone());
        self.keyed_items.insert(
            clientside_id.clone(),
            Synced {
                data,
                meta: SyncMeta {
                    clientside_id: clientside_id.clone(),
                    network_status,
                },
            },
        );
        clientside_id
    }

    /// Remove a record from both the keyed map and the ordering
    pub fn remove(&mut self, id: &ClientsideId) -> Option<Synced<T>> {
        let removed = self.keyed_items.remove(id)?;
        if let Some(position) = self.clientside_ids.iter().position(|c| c == id) {
            self.clientside_ids.remove(position);
        }
        Some(removed)
    }

    pub fn get(&self, id: &ClientsideId) -> Option<&Synced<T>> {
        self.keyed_items.get(id)
    }

    pub fn get_mut(&mut self, id: &ClientsideId) -> Option<&mut Synced<T>> {
        self.keyed_items.get_mut(id)
    }

    pub fn contains(&self, id: &ClientsideId) -> bool {
        self.keyed_items.contains_key(id)
    }

    /// Set the status of one record
    ///
    /// Returns false if the record is gone. Transitions outside the lifecycle
    /// are applied but logged.
    pub fn set_status(&mut self, id: &ClientsideId, status: NetworkStatus) -> bool {
        let Some(item) = self.keyed_items.get_mut(id) else {
            return false;
        };

        let current = item.meta.network_status;
        if !current.can_transition_to(status) {
            warn!("Irregular status change for item {}: {} -> {}", id, current, status);
        }
        item.meta.network_status = status;
        true
    }

    /// Set the same status on every listed record
    pub fn set_statuses<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a ClientsideId>,
        status: NetworkStatus,
    ) {
        for id in ids {
            self.set_status(id, status);
        }
    }

    pub fn len(&self) -> usize {
        self.clientside_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clientside_ids.is_empty()
    }

    /// Ids in display order
    pub fn clientside_ids(&self) -> &[ClientsideId] {
        &self.clientside_ids
    }

    /// Records in display order
    pub fn iter(&self) -> impl Iterator<Item = &Synced<T>> {
        self.clientside_ids
            .iter()
            .filter_map(|id| self.keyed_items.get(id))
    }

    /// Number of published updates this state has been through
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Status of a record, if present
    pub fn status_of(&self, id: &ClientsideId) -> Option<NetworkStatus> {
        self.get(id).map(Synced::status)
    }
}

impl<T: Clone> SyncedStore<T> {
    /// Owned copy of the records in display order
    pub fn items(&self) -> Vec<Synced<T>> {
        self.iter().cloned().collect()
    }
}

/// A published store state
#[derive(Debug)]
pub struct StoreEvent<T> {
    pub revision: u64,
    pub at: DateTime<Utc>,
    pub snapshot: Arc<SyncedStore<T>>,
}

impl<T> Clone for StoreEvent<T> {
    fn clone(&self) -> Self {
        Self {
            revision: self.revision,
            at: self.at,
            snapshot: Arc::clone(&self.snapshot),
        }
    }
}

struct StoreShared<T> {
    state: Mutex<Arc<SyncedStore<T>>>,
    latest: watch::Sender<Arc<SyncedStore<T>>>,
    events: broadcast::Sender<StoreEvent<T>>,
}

/// Shared handle to a synced store
///
/// Cheap to clone; every clone sees the same store.
pub struct StoreHandle<T> {
    shared: Arc<StoreShared<T>>,
}

impl<T> Clone for StoreHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> StoreHandle<T> {
    pub fn new(store: SyncedStore<T>) -> Self {
        let initial = Arc::new(store);
        let (latest, _) = watch::channel(Arc::clone(&initial));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(StoreShared {
                state: Mutex::new(initial),
                latest,
                events,
            }),
        }
    }

    /// Shorthand for `StoreHandle::new(SyncedStore::from_records(records))`
    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        Self::new(SyncedStore::from_records(records))
    }

    /// Apply a batch of changes atomically
    ///
    /// Updates are serialized; the closure must not call back into the handle.
    pub fn update<R>(&self, apply: impl FnOnce(&mut SyncedStore<T>) -> R) -> R {
        match self.try_update(|store| Ok::<R, std::convert::Infallible>(apply(store))) {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Like `update`, but nothing is published when the closure fails
    pub fn try_update<R, E>(
        &self,
        apply: impl FnOnce(&mut SyncedStore<T>) -> Result<R, E>,
    ) -> Result<R, E> {
        let mut state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next = SyncedStore::clone(&state);
        let result = apply(&mut next)?;
        next.revision += 1;

        let snapshot = Arc::new(next);
        *state = Arc::clone(&snapshot);

        self.shared.latest.send_replace(Arc::clone(&snapshot));
        let _ = self.shared.events.send(StoreEvent {
            revision: snapshot.revision,
            at: Utc::now(),
            snapshot,
        });

        Ok(result)
    }

    /// Current state
    pub fn snapshot(&self) -> Arc<SyncedStore<T>> {
        let state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&state)
    }

    /// Records in display order
    pub fn items(&self) -> Vec<Synced<T>> {
        self.snapshot().items()
    }

    /// Look up one record
    pub fn get(&self, id: &ClientsideId) -> Option<Synced<T>> {
        self.snapshot().get(id).cloned()
    }

    /// Watch the latest state
    pub fn subscribe(&self) -> watch::Receiver<Arc<SyncedStore<T>>> {
        self.shared.latest.subscribe()
    }

    /// Receive every state published from now on
    pub fn events(&self) -> broadcast::Receiver<StoreEvent<T>> {
        self.shared.events.subscribe()
    }
}
