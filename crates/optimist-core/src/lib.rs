//! Optimist Core Library
//!
//! Keeps a locally-editable mirror of server-owned records and reconciles
//! every local change with the server in the background. Changes show up
//! immediately; failed ones are retried with backoff and rolled back once the
//! retry budget runs out.
//!
//! # Quick Start
//!
//! ```text
//! let remote = Arc::new(SqliteRemote::open(&config.database_path(), options)?);
//! let engine = SyncEngine::<Widget, _>::load(remote, SELECT_ALL_WIDGETS, config.retry).await?;
//!
//! // Activate every widget
//! let ids = engine.store().snapshot().clientside_ids().to_vec();
//! let pending = engine.run_synced_mutation(SyncedMutation {
//!     items: ids,
//!     key_field: Widget::id_field(),
//!     mutated_field: Widget::active_field(),
//!     new_value: true,
//!     request_template: ACTIVATE_WIDGET.to_string(),
//! })?;
//!
//! // Watch statuses change, or just wait for the outcome
//! let outcome = pending.wait().await?;
//! ```
//!
//! # Modules
//!
//! - `sync`: Mutation and creation engines (main entry point)
//! - `store`: Synced store and its shared, observable handle
//! - `status`: Per-item network status
//! - `backoff`: Jittered exponential backoff
//! - `client_id`: Client-side identifiers
//! - `field`: Named field accessors
//! - `remote`: Remote store contract and the SQLite adapter
//! - `models`: The demo widget record
//! - `config`: Application configuration

pub mod backoff;
pub mod client_id;
pub mod config;
pub mod error;
pub mod field;
pub mod models;
pub mod remote;
pub mod status;
pub mod store;
pub mod sync;

pub use backoff::Backoff;
pub use client_id::ClientsideId;
pub use config::{Config, RemoteSettings, RetryPolicy};
pub use error::{RemoteCallFailure, SyncError, SyncResult};
pub use field::Field;
pub use models::Widget;
pub use remote::{RemoteOptions, RemoteStore, Row, SqliteRemote, UpdateOutcome};
pub use status::NetworkStatus;
pub use store::{StoreEvent, StoreHandle, Synced, SyncMeta, SyncedStore};
pub use sync::{PendingSync, SyncEngine, SyncOutcome, SyncedCreation, SyncedMutation};
