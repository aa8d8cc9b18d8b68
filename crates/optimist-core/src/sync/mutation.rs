//! Optimistic field changes on existing items

use std::collections::HashSet;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{PendingSync, SyncEngine, SyncOutcome};
use crate::client_id::ClientsideId;
use crate::error::{SyncError, SyncResult};
use crate::field::Field;
use crate::remote::RemoteStore;
use crate::status::NetworkStatus;
use crate::store::SyncedStore;

/// A field change applied to a batch of items
pub struct SyncedMutation<T, K, V> {
    /// Items to change; duplicates are ignored
    pub items: Vec<ClientsideId>,
    /// Server key of each item, sent as the statement's bound parameter
    pub key_field: Field<T, Option<K>>,
    pub mutated_field: Field<T, V>,
    pub new_value: V,
    /// Statement run once per key on the remote side
    pub request_template: String,
}

impl<T, K, V: Clone> Clone for SyncedMutation<T, K, V> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            key_field: self.key_field,
            mutated_field: self.mutated_field,
            new_value: self.new_value.clone(),
            request_template: self.request_template.clone(),
        }
    }
}

impl<T, K, V: fmt::Debug> fmt::Debug for SyncedMutation<T, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedMutation")
            .field("items", &self.items)
            .field("key_field", &self.key_field)
            .field("mutated_field", &self.mutated_field)
            .field("new_value", &self.new_value)
            .field("request_template", &self.request_template)
            .finish()
    }
}

/// Pre-mutation values, restored on terminal failure
type Backup<V> = Vec<(ClientsideId, V)>;

impl<T, R> SyncEngine<T, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    R: RemoteStore,
{
    /// Apply a field change optimistically and sync it in the background
    ///
    /// The change and the `SentRequest` status land in one store update.
    /// Every item must be in the store and have a key; otherwise nothing is
    /// applied and the error is returned.
    pub fn run_synced_mutation<K, V>(
        &self,
        mut mutation: SyncedMutation<T, K, V>,
    ) -> SyncResult<PendingSync>
    where
        K: Serialize + 'static,
        V: Clone + fmt::Debug + Send + Sync + 'static,
    {
        if mutation.items.is_empty() {
            return Err(SyncError::EmptyBatch);
        }

        let mut seen = HashSet::new();
        mutation.items.retain(|id| seen.insert(id.clone()));

        let (keys, backup) = self
            .store
            .try_update(|store| apply_optimistically(store, &mutation))?;

        debug!(
            "Set {} to {:?} on {} items",
            mutation.mutated_field.name(),
            mutation.new_value,
            mutation.items.len()
        );

        let clientside_ids = mutation.items.clone();
        let engine = self.clone();
        let task =
            tokio::spawn(async move { engine.drive_mutation(mutation, keys, backup).await });

        Ok(PendingSync {
            clientside_ids,
            task,
        })
    }

    async fn drive_mutation<K, V>(
        &self,
        mutation: SyncedMutation<T, K, V>,
        keys: Vec<Value>,
        backup: Backup<V>,
    ) -> SyncOutcome
    where
        K: Serialize + 'static,
        V: Clone + fmt::Debug + Send + Sync + 'static,
    {
        let ids = mutation.items.clone();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Sending update for {} items (attempt {})", ids.len(), attempt);
            let result = self
                .remote
                .transactional_update(&keys, &mutation.request_template)
                .await;

            match result {
                Ok(outcomes) => {
                    self.store
                        .update(|store| store.set_statuses(&ids, NetworkStatus::Synced));

                    let rows_changed: usize = outcomes.iter().map(|o| o.rows_changed).sum();
                    info!(
                        "Synced {} on {} items ({} rows changed, attempt {})",
                        mutation.mutated_field.name(),
                        ids.len(),
                        rows_changed,
                        attempt
                    );

                    return SyncOutcome {
                        status: NetworkStatus::Synced,
                        attempts: attempt,
                        clientside_ids: ids,
                    };
                }
                Err(failure) => {
                    if self
                        .retry_after_failure(&ids, attempt, &mut backoff, &failure)
                        .await
                    {
                        continue;
                    }

                    error!(
                        "Giving up on {} update after {} attempts: {}",
                        mutation.mutated_field.name(),
                        attempt,
                        failure
                    );

                    let field = mutation.mutated_field;
                    self.store.update(|store| {
                        for (id, old_value) in backup {
                            if let Some(item) = store.get_mut(&id) {
                                warn!(
                                    "Resetting {} of item {} back to {:?}",
                                    field.name(),
                                    id,
                                    old_value
                                );
                                field.set(&mut item.data, old_value);
                            }
                        }
                        store.set_statuses(&ids, NetworkStatus::Failed);
                    });

                    self.failed.push_mutation(Box::new(
                        move |engine: &SyncEngine<T, R>| engine.run_synced_mutation(mutation),
                    ));

                    return SyncOutcome {
                        status: NetworkStatus::Failed,
                        attempts: attempt,
                        clientside_ids: ids,
                    };
                }
            }
        }
    }
}

/// Validate the batch, then set the new value and `SentRequest` on every item
///
/// Returns the server keys in item order and the values to restore.
fn apply_optimistically<T, K, V>(
    store: &mut SyncedStore<T>,
    mutation: &SyncedMutation<T, K, V>,
) -> SyncResult<(Vec<Value>, Backup<V>)>
where
    K: Serialize,
    V: Clone,
{
    let mut keys = Vec::with_capacity(mutation.items.len());
    for id in &mutation.items {
        let item = store
            .get(id)
            .ok_or_else(|| SyncError::UnknownItem(id.clone()))?;
        let key = mutation
            .key_field
            .get(&item.data)
            .ok_or_else(|| SyncError::MissingKey {
                clientside_id: id.clone(),
                field: mutation.key_field.name(),
            })?;
        keys.push(serde_json::to_value(key)?);
    }

    let mut backup = Vec::with_capacity(mutation.items.len());
    for id in &mutation.items {
        if let Some(item) = store.get_mut(id) {
            backup.push((id.clone(), mutation.mutated_field.get(&item.data)));
            mutation
                .mutated_field
                .set(&mut item.data, mutation.new_value.clone());
        }
    }
    store.set_statuses(&mutation.items, NetworkStatus::SentRequest);

    Ok((keys, backup))
}
