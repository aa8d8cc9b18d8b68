//! Widget command handlers

use anyhow::{bail, Result};
use tracing::warn;

use optimist_core::client_id::random_label;
use optimist_core::remote::schema::{ACTIVATE_WIDGET, DEACTIVATE_WIDGET, INSERT_WIDGET};
use optimist_core::{
    ClientsideId, Config, PendingSync, SyncOutcome, SyncResult, SyncedCreation, SyncedMutation,
    SyncedStore, Widget,
};

use super::{follow, open_engine, WidgetEngine};
use crate::output::Output;

/// Length of generated descriptions for `create --random`
const RANDOM_DESCRIPTION_LEN: usize = 8;

/// List all widgets
pub async fn list(config: &Config, output: &Output) -> Result<()> {
    let engine = open_engine(config).await?;
    output.print_widgets(&engine.store().items())
}

/// Activate or deactivate widgets by server id
pub async fn set_active(
    config: &Config,
    ids: Vec<i64>,
    all: bool,
    active: bool,
    retry_failed: bool,
    output: &Output,
) -> Result<()> {
    let engine = open_engine(config).await?;
    let items = select_widgets(&engine.store().snapshot(), &ids, all)?;
    if items.is_empty() {
        output.message("No widgets to change.");
        return Ok(());
    }

    let template = if active {
        ACTIVATE_WIDGET
    } else {
        DEACTIVATE_WIDGET
    };

    let events = engine.store().events();
    let pending = engine.run_synced_mutation(SyncedMutation {
        items,
        key_field: Widget::id_field(),
        mutated_field: Widget::active_field(),
        new_value: active,
        request_template: template.to_string(),
    })?;

    let outcomes = follow(events, vec![pending], output).await?;
    finish(&engine, outcomes, retry_failed, output).await
}

/// Create a widget
pub async fn create(
    config: &Config,
    description: Option<String>,
    random: bool,
    active: bool,
    retry_failed: bool,
    output: &Output,
) -> Result<()> {
    let description = match (description, random) {
        (Some(description), _) => description,
        (None, true) => random_label(RANDOM_DESCRIPTION_LEN),
        (None, false) => bail!("Provide a description or use --random"),
    };

    let engine = open_engine(config).await?;

    let events = engine.store().events();
    let pending = engine.run_synced_creation(SyncedCreation {
        new_item: Widget::new(description, active),
        key_field: Widget::id_field(),
        request_template: INSERT_WIDGET.to_string(),
    })?;

    let outcomes = follow(events, vec![pending], output).await?;
    finish(&engine, outcomes, retry_failed, output).await
}

/// Optionally re-issue failed operations once, then print the result
async fn finish(
    engine: &WidgetEngine,
    mut outcomes: Vec<SyncOutcome>,
    retry_failed: bool,
    output: &Output,
) -> Result<()> {
    if retry_failed && outcomes.iter().any(|o| !o.is_synced()) {
        if !output.is_json() {
            output.message("Retrying failed operations...");
        }

        let events = engine.store().events();
        let mut retried = engine.retry_failed_mutations();
        retried.extend(engine.retry_failed_creations());
        let pending = started(retried);

        outcomes.retain(SyncOutcome::is_synced);
        outcomes.extend(follow(events, pending, output).await?);
    }

    output.print_result(&outcomes, &engine.store().items())?;

    let failed = outcomes.iter().filter(|o| !o.is_synced()).count();
    if failed > 0 {
        bail!("{} operation(s) failed to sync", failed);
    }
    Ok(())
}

/// Keep the operations that started; a replay can be refused if its items are gone
fn started(results: Vec<SyncResult<PendingSync>>) -> Vec<PendingSync> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(pending) => Some(pending),
            Err(e) => {
                warn!("Could not retry operation: {}", e);
                None
            }
        })
        .collect()
}

/// Map server ids to client-side ids
///
/// `all` selects every widget that has a server id.
fn select_widgets(
    store: &SyncedStore<Widget>,
    ids: &[i64],
    all: bool,
) -> Result<Vec<ClientsideId>> {
    if all {
        return Ok(store
            .iter()
            .filter(|item| item.data.id.is_some())
            .map(|item| item.clientside_id().clone())
            .collect());
    }

    if ids.is_empty() {
        bail!("Provide widget ids or use --all");
    }

    ids.iter()
        .map(|id| {
            store
                .iter()
                .find(|item| item.data.id == Some(*id))
                .map(|item| item.clientside_id().clone())
                .ok_or_else(|| anyhow::anyhow!("Widget not found: {}", id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SyncedStore<Widget> {
        SyncedStore::from_records(vec![
            Widget::with_id(1, "one", false),
            Widget::with_id(2, "two", true),
            Widget::new("pending", false),
        ])
    }

    #[test]
    fn test_select_by_id() {
        let store = store();
        let selected = select_widgets(&store, &[2], false).unwrap();
        assert_eq!(selected, vec![store.clientside_ids()[1].clone()]);
    }

    #[test]
    fn test_select_all_skips_unsaved() {
        let store = store();
        let selected = select_widgets(&store, &[], true).unwrap();
        assert_eq!(selected, store.clientside_ids()[..2].to_vec());
    }

    #[test]
    fn test_select_unknown_id() {
        let err = select_widgets(&store(), &[1, 99], false).unwrap_err();
        assert!(err.to_string().contains("99"));
    }

    #[test]
    fn test_select_requires_ids() {
        assert!(select_widgets(&store(), &[], false).is_err());
    }
}
