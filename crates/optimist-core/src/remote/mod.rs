//! Remote store contract
//!
//! The sync engine never talks to storage directly. It goes through a
//! `RemoteStore`, which executes a batched update or a single insert against
//! the backing store and reports either a payload or a `RemoteCallFailure`.
//!
//! Rows cross this boundary as JSON objects keyed by column name, which is
//! what lets the engine address fields by name.
//!
//! - `sqlite`: reference adapter backed by a local SQLite database
//! - `schema`: the demo `widgets` table

pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RemoteCallFailure;

pub use schema::{init_schema, seed_widgets};
pub use sqlite::{RemoteOptions, SqliteRemote};

/// A record as the remote store sees it: column name to value
pub type Row = Map<String, Value>;

/// Result for one key of a transactional update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// Rows changed by the statement for this key
    pub rows_changed: usize,
}

/// Operations the sync engine needs from the backing store
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Read every row produced by `query` (used once, to seed a store)
    async fn fetch_all(&self, query: &str) -> Result<Vec<Row>, RemoteCallFailure>;

    /// Run `request_template` once per key, all-or-nothing
    ///
    /// The key is the template's sole bound parameter. Results come back in
    /// key order.
    async fn transactional_update(
        &self,
        keys: &[Value],
        request_template: &str,
    ) -> Result<Vec<UpdateOutcome>, RemoteCallFailure>;

    /// Insert one record and return the persisted row(s), generated key included
    async fn transactional_insert(
        &self,
        record: &Row,
        request_template: &str,
    ) -> Result<Vec<Row>, RemoteCallFailure>;
}
