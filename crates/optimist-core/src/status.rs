//! Per-item network status
//!
//! Every tracked item carries exactly one `NetworkStatus` describing where its
//! latest local change stands in the synchronization lifecycle:
//!
//! ```text
//! Synced ──► SentRequest ──► Synced
//!                 │
//!                 ▼
//!             GotError ──► SentRetry ──► Synced
//!                 ▲            │
//!                 └────────────┤
//!                              ▼
//!                            Failed
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Synchronization state of a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkStatus {
    /// Local copy matches the remote store
    Synced,
    /// First attempt is in flight
    SentRequest,
    /// Last attempt failed, a retry is about to be scheduled
    GotError,
    /// A retry has been scheduled or is in flight
    SentRetry,
    /// Retries exhausted
    Failed,
}

impl NetworkStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [NetworkStatus; 5] = [
        NetworkStatus::Synced,
        NetworkStatus::SentRequest,
        NetworkStatus::GotError,
        NetworkStatus::SentRetry,
        NetworkStatus::Failed,
    ];

    /// Check if moving from this status to `target` follows the lifecycle
    pub fn can_transition_to(&self, target: NetworkStatus) -> bool {
        use NetworkStatus::*;

        matches!(
            (self, target),
            (Synced, SentRequest)
                | (Failed, SentRequest)
                | (SentRequest, Synced)
                | (SentRequest, GotError)
                | (SentRequest, Failed)
                | (GotError, SentRetry)
                | (SentRetry, Synced)
                | (SentRetry, GotError)
                | (SentRetry, Failed)
        )
    }

    /// Stable string form, identical to the serialized name
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Synced => "synced",
            NetworkStatus::SentRequest => "sent-request",
            NetworkStatus::GotError => "got-error",
            NetworkStatus::SentRetry => "sent-retry",
            NetworkStatus::Failed => "failed",
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        NetworkStatus::Synced
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
