//! Synchronization engine
//!
//! Reconciles local changes with a `RemoteStore` in the background.
//!
//! ## Lifecycle
//!
//! 1. The change is applied to the store optimistically (`SentRequest`)
//! 2. The remote call is issued
//! 3. On success the items become `Synced`
//! 4. On failure with attempts left the items go `GotError` then `SentRetry`,
//!    and the call is repeated after a jittered exponential backoff
//! 5. On the last failure the items become `Failed`: mutations roll back,
//!    creations disappear after a grace delay
//!
//! Each operation runs as its own tokio task with its own `Backoff`; there is
//! no cancellation. The caller gets a `PendingSync` it may await or drop.
//!
//! ## Usage
//!
//! ```text
//! let engine = SyncEngine::load(remote, SELECT_ALL_WIDGETS, RetryPolicy::default()).await?;
//!
//! let ids = engine.store().snapshot().clientside_ids().to_vec();
//! engine.run_synced_mutation(SyncedMutation {
//!     items: ids,
//!     key_field: Widget::id_field(),
//!     mutated_field: Widget::active_field(),
//!     new_value: true,
//!     request_template: ACTIVATE_WIDGET.to_string(),
//! })?;
//! ```

mod creation;
mod failed;
mod mutation;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use creation::SyncedCreation;
pub use mutation::SyncedMutation;

use self::failed::FailedOperations;
use crate::backoff::Backoff;
use crate::client_id::ClientsideId;
pub use crate::config::RetryPolicy;
use crate::error::{RemoteCallFailure, SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::status::NetworkStatus;
use crate::store::StoreHandle;

/// How a retry chain ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// `Synced` or `Failed`
    pub status: NetworkStatus,
    /// Remote calls made, including the first
    pub attempts: u32,
    /// Items the operation covered
    pub clientside_ids: Vec<ClientsideId>,
}

impl SyncOutcome {
    pub fn is_synced(&self) -> bool {
        self.status == NetworkStatus::Synced
    }
}

/// Handle to a running retry chain
///
/// Dropping it does not cancel the chain.
#[derive(Debug)]
pub struct PendingSync {
    clientside_ids: Vec<ClientsideId>,
    task: JoinHandle<SyncOutcome>,
}

impl PendingSync {
    /// Items the operation covers
    pub fn clientside_ids(&self) -> &[ClientsideId] {
        &self.clientside_ids
    }

    /// Wait for the chain to reach `Synced` or `Failed`
    pub async fn wait(self) -> SyncResult<SyncOutcome> {
        Ok(self.task.await?)
    }
}

/// Background synchronization for one store
pub struct SyncEngine<T, R> {
    store: StoreHandle<T>,
    remote: Arc<R>,
    policy: RetryPolicy,
    failed: Arc<FailedOperations<T, R>>,
}

impl<T, R> Clone for SyncEngine<T, R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: Arc::clone(&self.remote),
            policy: self.policy,
            failed: Arc::clone(&self.failed),
        }
    }
}

impl<T, R> SyncEngine<T, R>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    R: RemoteStore,
{
    pub fn new(store: StoreHandle<T>, remote: Arc<R>, policy: RetryPolicy) -> Self {
        Self {
            store,
            remote,
            policy,
            failed: Arc::new(FailedOperations::default()),
        }
    }

    /// Seed a store with one bulk read and wrap it in an engine
    pub async fn load(remote: Arc<R>, query: &str, policy: RetryPolicy) -> SyncResult<Self> {
        let rows = remote.fetch_all(query).await?;
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                serde_json::from_value(Value::Object(row))
                    .map_err(|source| SyncError::Decode { index, source })
            })
            .collect::<SyncResult<Vec<T>>>()?;

        info!("Loaded {} records", records.len());
        Ok(Self::new(StoreHandle::from_records(records), remote, policy))
    }

    pub fn store(&self) -> &StoreHandle<T> {
        &self.store
    }

    /// Re-issue every mutation that reached terminal failure
    ///
    /// Each is applied optimistically again, with a fresh backup of the
    /// current values.
    pub fn retry_failed_mutations(&self) -> Vec<SyncResult<PendingSync>> {
        let replays = self.failed.take_mutations();
        info!("Retrying {} failed mutations", replays.len());
        replays.into_iter().map(|replay| replay(self)).collect()
    }

    /// Re-issue every creation that reached terminal failure
    ///
    /// The record is inserted again under a new client-side id.
    pub fn retry_failed_creations(&self) -> Vec<SyncResult<PendingSync>> {
        let replays = self.failed.take_creations();
        info!("Retrying {} failed creations", replays.len());
        replays.into_iter().map(|replay| replay(self)).collect()
    }

    /// Failed operations waiting for a manual retry: (mutations, creations)
    pub fn failed_counts(&self) -> (usize, usize) {
        self.failed.counts()
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.policy.initial_delay(), self.policy.max_delay())
    }

    /// Mark a failed attempt and wait before the next one
    ///
    /// Returns false when no attempts are left.
    async fn retry_after_failure(
        &self,
        ids: &[ClientsideId],
        attempt: u32,
        backoff: &mut Backoff,
        error: &RemoteCallFailure,
    ) -> bool {
        let max_attempts = self.policy.attempts();
        if attempt >= max_attempts {
            return false;
        }

        warn!(
            "Got error on attempt {}/{}, retrying {} more times: {}",
            attempt,
            max_attempts,
            max_attempts - attempt,
            error
        );

        self.store
            .update(|store| store.set_statuses(ids, NetworkStatus::GotError));
        self.store
            .update(|store| store.set_statuses(ids, NetworkStatus::SentRetry));

        tokio::time::sleep(backoff.next_delay()).await;
        true
    }
}
