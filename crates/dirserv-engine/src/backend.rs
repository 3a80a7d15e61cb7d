//! Backend collaborator interface.
//!
//! The engine consumes storage through this trait; indexing, on-disk
//! format and replication live behind it.

use crate::config::WritabilityMode;
use async_trait::async_trait;
use dirserv_core::{Dn, Entry, Filter, Schema};
use dirserv_policy::{AccountState, StateDelta};
use thiserror::Error;

/// Backend failure.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Storage-level failure.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Account state deltas could not be committed. Drives the
    /// state-update-failure policy on bind.
    #[error("Account state update failed: {0}")]
    StateUpdate(String),
}

/// Entry storage consumed by the operation engine.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the entry at `dn`, `None` when absent.
    async fn lookup(&self, dn: &Dn) -> Result<Option<Entry>, BackendError>;

    /// Whether any entry exists below `dn`.
    async fn has_children(&self, dn: &Dn) -> Result<bool, BackendError>;

    /// Direct children of `dn`.
    async fn children(&self, dn: &Dn) -> Result<Vec<Dn>, BackendError>;

    /// Store an entry, replacing any existing one at its DN.
    async fn put(&self, entry: Entry) -> Result<(), BackendError>;

    /// Remove the entry at `dn`.
    async fn remove(&self, dn: &Dn) -> Result<(), BackendError>;

    /// Password-policy account state for `dn`, when one is tracked.
    async fn account_state(&self, dn: &Dn) -> Result<Option<AccountState>, BackendError>;

    /// Commit account state deltas for `dn`.
    async fn apply_deltas(&self, dn: &Dn, deltas: &[StateDelta]) -> Result<(), BackendError>;

    /// This backend's writability mode.
    fn writability(&self) -> WritabilityMode {
        WritabilityMode::Enabled
    }

    /// Evaluate a filter against an entry.
    fn matches_filter(&self, schema: &Schema, entry: &Entry, filter: &Filter) -> bool {
        filter.matches(schema, entry)
    }
}
