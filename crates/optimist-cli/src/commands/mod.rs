//! Command handlers

pub mod config;
pub mod init;
pub mod widget;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future::join_all;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use optimist_core::remote::schema::SELECT_ALL_WIDGETS;
use optimist_core::{
    ClientsideId, Config, PendingSync, RemoteOptions, SqliteRemote, StoreEvent, Synced,
    SyncEngine, SyncOutcome, SyncResult, Widget,
};

use crate::output::Output;

pub type WidgetEngine = SyncEngine<Widget, SqliteRemote>;

/// Load configuration, honouring `--config`
pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config> {
    Config::load_with_cli_override(config_path).context("Failed to load configuration")
}

/// Open the widget database described by the configuration
pub fn open_remote(config: &Config) -> Result<SqliteRemote> {
    let path = config.database_path();
    SqliteRemote::open(&path, RemoteOptions::from(&config.remote))
        .with_context(|| format!("Failed to open database: {:?}", path))
}

/// Open the database and load every widget into a fresh engine
pub async fn open_engine(config: &Config) -> Result<WidgetEngine> {
    let remote = Arc::new(open_remote(config)?);
    let engine = SyncEngine::load(remote, SELECT_ALL_WIDGETS, config.retry)
        .await
        .context("Failed to load widgets")?;
    debug!("Loaded {} widgets", engine.store().snapshot().len());
    Ok(engine)
}

/// Report live status changes of the given operations until all of them settle
///
/// `events` must be subscribed before the operations were issued, so their
/// optimistic apply is reported too.
pub async fn follow(
    mut events: broadcast::Receiver<StoreEvent<Widget>>,
    pending: Vec<PendingSync>,
    output: &Output,
) -> Result<Vec<SyncOutcome>> {
    let watched = pending
        .iter()
        .flat_map(|p| p.clientside_ids().iter().cloned())
        .collect();
    let mut tracker = StatusTracker::new(watched);

    let outcomes = join_all(pending.into_iter().map(PendingSync::wait));
    tokio::pin!(outcomes);

    let results = loop {
        tokio::select! {
            results = &mut outcomes => break results,
            event = events.recv() => match event {
                Ok(event) => tracker.report(&event, output),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Status display skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => {}
            },
        }
    };

    // Updates published before the last operation settled are still queued
    while let Ok(event) = events.try_recv() {
        tracker.report(&event, output);
    }

    results
        .into_iter()
        .collect::<SyncResult<Vec<_>>>()
        .context("Sync task failed")
}

/// Prints a line whenever a watched item changes status or disappears
struct StatusTracker {
    watched: Vec<ClientsideId>,
    last: HashMap<ClientsideId, Synced<Widget>>,
}

impl StatusTracker {
    fn new(watched: Vec<ClientsideId>) -> Self {
        let mut seen = HashSet::new();
        let watched = watched
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        Self {
            watched,
            last: HashMap::new(),
        }
    }

    fn report(&mut self, event: &StoreEvent<Widget>, output: &Output) {
        for id in &self.watched {
            match event.snapshot.get(id) {
                Some(item) => {
                    let changed = self
                        .last
                        .get(id)
                        .map_or(true, |previous| previous.status() != item.status());
                    if changed {
                        output.status_change(item);
                        self.last.insert(id.clone(), item.clone());
                    }
                }
                None => {
                    if let Some(previous) = self.last.remove(id) {
                        output.removed(&previous);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use optimist_core::{NetworkStatus, StoreHandle, SyncedStore};

    #[test]
    fn test_tracker_reports_changes_once() {
        let handle = StoreHandle::new(SyncedStore::from_records(vec![Widget::with_id(
            1, "w", false,
        )]));
        let id = handle.snapshot().clientside_ids()[0].clone();
        let mut events = handle.events();
        let output = Output::new(OutputFormat::Quiet);
        let mut tracker = StatusTracker::new(vec![id.clone(), id.clone()]);
        assert_eq!(tracker.watched.len(), 1);

        handle.update(|store| store.set_status(&id, NetworkStatus::SentRequest));
        handle.update(|store| {
            store.get_mut(&id).unwrap().data.active = true;
        });
        handle.update(|store| store.remove(&id));

        tracker.report(&events.try_recv().unwrap(), &output);
        assert_eq!(tracker.last[&id].status(), NetworkStatus::SentRequest);

        // Same status, so the stored copy is not replaced
        tracker.report(&events.try_recv().unwrap(), &output);
        assert!(!tracker.last[&id].data.active);

        tracker.report(&events.try_recv().unwrap(), &output);
        assert!(tracker.last.is_empty());
    }
}
