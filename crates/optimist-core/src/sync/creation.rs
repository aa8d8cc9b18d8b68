//! Optimistic inserts of new items

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use super::{PendingSync, SyncEngine, SyncOutcome};
use crate::client_id::ClientsideId;
use crate::error::{RemoteCallFailure, SyncError, SyncResult};
use crate::field::Field;
use crate::remote::{RemoteStore, Row};
use crate::status::NetworkStatus;

/// A new record to insert
pub struct SyncedCreation<T, K> {
    /// The record as the caller built it; its key is normally unset
    pub new_item: T,
    /// Where the server-assigned key goes once the insert succeeds
    pub key_field: Field<T, Option<K>>,
    /// Insert statement; must return the stored row
    pub request_template: String,
}

impl<T: Clone, K> Clone for SyncedCreation<T, K> {
    fn clone(&self) -> Self {
        Self {
            new_item: self.new_item.clone(),
            key_field: self.key_field,
            request_template: self.request_template.clone(),
        }
    }
}

impl<T: fmt::Debug, K> fmt::Debug for SyncedCreation<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedCreation")
            .field("new_item", &self.new_item)
            .field("key_field", &self.key_field)
            .field("request_template", &self.request_template)
            .finish()
    }
}

impl<T, R> SyncEngine<T, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    R: RemoteStore,
{
    /// Insert a record optimistically and sync it in the background
    ///
    /// The record appears at the end of the store right away, under a new
    /// client-side id, with status `SentRequest`.
    pub fn run_synced_creation<K>(
        &self,
        creation: SyncedCreation<T, K>,
    ) -> SyncResult<PendingSync>
    where
        K: DeserializeOwned + Send + 'static,
    {
        let record = match serde_json::to_value(&creation.new_item)? {
            Value::Object(record) => record,
            other => {
                return Err(SyncError::Serialization(serde::ser::Error::custom(
                    format!("record must serialize to an object, got {}", other),
                )))
            }
        };

        let new_item = creation.new_item.clone();
        let clientside_id = self
            .store
            .update(|store| store.insert(new_item, NetworkStatus::SentRequest));
        debug!("Created item {} pending insert", clientside_id);

        let engine = self.clone();
        let id = clientside_id.clone();
        let task = tokio::spawn(async move { engine.drive_creation(creation, record, id).await });

        Ok(PendingSync {
            clientside_ids: vec![clientside_id],
            task,
        })
    }

    async fn drive_creation<K>(
        &self,
        creation: SyncedCreation<T, K>,
        record: Row,
        id: ClientsideId,
    ) -> SyncOutcome
    where
        K: DeserializeOwned + Send + 'static,
    {
        let ids = std::slice::from_ref(&id);
        let key_name = creation.key_field.name();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Sending insert for item {} (attempt {})", id, attempt);
            let result = match self
                .remote
                .transactional_insert(&record, &creation.request_template)
                .await
            {
                Ok(rows) => inserted_key::<K>(rows, key_name),
                Err(failure) => Err(failure),
            };

            match result {
                Ok(key) => {
                    let key_field = creation.key_field;
                    self.store.update(|store| {
                        if let Some(item) = store.get_mut(&id) {
                            key_field.set(&mut item.data, Some(key));
                        }
                        store.set_status(&id, NetworkStatus::Synced);
                    });
                    info!("Synced new item {} (attempt {})", id, attempt);

                    return SyncOutcome {
                        status: NetworkStatus::Synced,
                        attempts: attempt,
                        clientside_ids: vec![id],
                    };
                }
                Err(failure) => {
                    if self
                        .retry_after_failure(ids, attempt, &mut backoff, &failure)
                        .await
                    {
                        continue;
                    }

                    error!(
                        "Giving up on insert of item {} after {} attempts: {}",
                        id, attempt, failure
                    );
                    self.store
                        .update(|store| store.set_status(&id, NetworkStatus::Failed));

                    tokio::time::sleep(self.policy.removal_grace()).await;
                    self.store.update(|store| store.remove(&id));
                    info!("Removed item {} after failed insert", id);

                    // Only replayable once the failed copy is gone
                    self.failed.push_creation(Box::new(
                        move |engine: &SyncEngine<T, R>| engine.run_synced_creation(creation),
                    ));

                    return SyncOutcome {
                        status: NetworkStatus::Failed,
                        attempts: attempt,
                        clientside_ids: vec![id],
                    };
                }
            }
        }
    }
}

/// Read the generated key out of the first returned row
///
/// A response without a usable key counts as a failed attempt.
fn inserted_key<K: DeserializeOwned>(rows: Vec<Row>, key_name: &str) -> Result<K, RemoteCallFailure> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| RemoteCallFailure::new("insert returned no rows"))?;

    match row.get(key_name) {
        None | Some(Value::Null) => Err(RemoteCallFailure::new(format!(
            "inserted row has no value for {:?}",
            key_name
        ))),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            RemoteCallFailure::new(format!("invalid {:?} in inserted row: {}", key_name, e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::models::Widget;
    use crate::remote::mock::MockRemote;
    use crate::remote::schema::INSERT_WIDGET;
    use crate::store::StoreHandle;

    fn engine_with(
        remote: MockRemote,
        widgets: Vec<Widget>,
    ) -> (SyncEngine<Widget, MockRemote>, Arc<MockRemote>) {
        let remote = Arc::new(remote);
        let engine = SyncEngine::new(
            StoreHandle::from_records(widgets),
            Arc::clone(&remote),
            RetryPolicy::default(),
        );
        (engine, remote)
    }

    fn create(description: &str) -> SyncedCreation<Widget, i64> {
        SyncedCreation {
            new_item: Widget::new(description, true),
            key_field: Widget::id_field(),
            request_template: INSERT_WIDGET.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_gets_server_key() {
        let (engine, remote) = engine_with(
            MockRemote::always_succeeding(),
            vec![Widget::with_id(1, "existing", false)],
        );

        let pending = engine.run_synced_creation(create("foo widget")).unwrap();
        let id = pending.clientside_ids()[0].clone();

        // Visible at the end of the list before the insert completes
        let snapshot = engine.store().snapshot();
        assert_eq!(snapshot.clientside_ids().last(), Some(&id));
        let item = snapshot.get(&id).unwrap();
        assert_eq!(item.data.id, None);
        assert_eq!(item.status(), NetworkStatus::SentRequest);

        let outcome = pending.wait().await.unwrap();
        assert!(outcome.is_synced());
        assert_eq!(outcome.attempts, 1);

        let item = engine.store().get(&id).unwrap();
        assert_eq!(item.data, Widget::with_id(42, "foo widget", true));
        assert_eq!(item.status(), NetworkStatus::Synced);

        assert_eq!(
            remote.seen_records.lock().unwrap()[0],
            *json!({"id": null, "description": "foo widget", "active": true})
                .as_object()
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_succeeds_after_retry() {
        let (engine, remote) = engine_with(MockRemote::failing_times(2).with_next_key(7), vec![]);

        let outcome = engine
            .run_synced_creation(create("w"))
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert!(outcome.is_synced());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(remote.inserts(), 3);
        assert_eq!(engine.store().items()[0].data.id, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_creation_is_removed_after_grace() {
        let (engine, remote) = engine_with(
            MockRemote::always_failing(),
            vec![Widget::with_id(1, "existing", false)],
        );

        let pending = engine.run_synced_creation(create("doomed")).unwrap();
        let id = pending.clientside_ids()[0].clone();
        let mut rx = engine.store().subscribe();

        // Wait until the item is marked failed, then check it is still shown
        loop {
            rx.changed().await.unwrap();
            if rx.borrow().status_of(&id) == Some(NetworkStatus::Failed) {
                break;
            }
        }
        let failed_at = Instant::now();
        assert!(engine.store().snapshot().contains(&id));

        // Not replayable while the failed copy is still listed
        assert_eq!(engine.failed_counts(), (0, 0));
        assert!(engine.retry_failed_creations().is_empty());

        let outcome = pending.wait().await.unwrap();
        assert_eq!(outcome.status, NetworkStatus::Failed);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(remote.inserts(), 3);
        assert!(failed_at.elapsed() >= Duration::from_secs(1));

        let snapshot = engine.store().snapshot();
        assert!(!snapshot.contains(&id));
        assert!(!snapshot.clientside_ids().contains(&id));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(engine.failed_counts(), (0, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_without_key_counts_as_failure() {
        struct KeylessRemote;

        #[async_trait::async_trait]
        impl RemoteStore for KeylessRemote {
            async fn fetch_all(&self, _query: &str) -> Result<Vec<Row>, RemoteCallFailure> {
                Ok(Vec::new())
            }

            async fn transactional_update(
                &self,
                _keys: &[Value],
                _request_template: &str,
            ) -> Result<Vec<crate::remote::UpdateOutcome>, RemoteCallFailure> {
                Ok(Vec::new())
            }

            async fn transactional_insert(
                &self,
                record: &Row,
                _request_template: &str,
            ) -> Result<Vec<Row>, RemoteCallFailure> {
                Ok(vec![record.clone()])
            }
        }

        let engine: SyncEngine<Widget, _> = SyncEngine::new(
            StoreHandle::from_records(Vec::new()),
            Arc::new(KeylessRemote),
            RetryPolicy::default(),
        );

        let outcome = engine
            .run_synced_creation(create("w"))
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(outcome.status, NetworkStatus::Failed);
        assert_eq!(outcome.attempts, 3);
        assert!(engine.store().snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_creations_inserts_again() {
        let (engine, remote) = engine_with(MockRemote::failing_times(3), vec![]);

        let first = engine
            .run_synced_creation(create("second chance"))
            .unwrap()
            .wait()
            .await
            .unwrap();
        assert_eq!(first.status, NetworkStatus::Failed);
        assert_eq!(engine.failed_counts(), (0, 1));

        let mut retried = engine.retry_failed_creations();
        let outcome = retried.remove(0).unwrap().wait().await.unwrap();

        assert!(outcome.is_synced());
        assert_ne!(outcome.clientside_ids, first.clientside_ids);
        assert_eq!(remote.inserts(), 4);

        let items = engine.store().items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, Widget::with_id(42, "second chance", true));
    }

    #[test]
    fn test_inserted_key() {
        let row = |v: serde_json::Value| v.as_object().unwrap().clone();

        let key: i64 = inserted_key(vec![row(json!({"id": 9}))], "id").unwrap();
        assert_eq!(key, 9);

        assert!(inserted_key::<i64>(vec![], "id").is_err());
        assert!(inserted_key::<i64>(vec![row(json!({"id": null}))], "id").is_err());
        assert!(inserted_key::<i64>(vec![row(json!({"id": "x"}))], "id").is_err());
    }

    #[tokio::test]
    async fn test_non_object_record_is_rejected() {
        let engine: SyncEngine<String, MockRemote> = SyncEngine::new(
            StoreHandle::from_records(Vec::new()),
            Arc::new(MockRemote::always_succeeding()),
            RetryPolicy::default(),
        );
        let result = engine.run_synced_creation(SyncedCreation::<String, i64> {
            new_item: "plain".to_string(),
            key_field: Field::new("id", |_| None, |_, _| {}),
            request_template: String::new(),
        });

        assert!(matches!(result, Err(SyncError::Serialization(_))));
        assert!(engine.store().snapshot().is_empty());
    }
}
