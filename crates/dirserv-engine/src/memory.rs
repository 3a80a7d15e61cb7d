//! In-memory backend.
//!
//! Exists to exercise the engine; not a storage engine. Account states are
//! tracked alongside entries, and a switch can force state updates to fail
//! so the state-update-failure policies are observable.

use crate::backend::{Backend, BackendError};
use crate::config::WritabilityMode;
use async_trait::async_trait;
use dirserv_core::{Dn, Entry};
use dirserv_policy::{apply_all, AccountState, StateDelta};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// A `HashMap`-backed [`Backend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<Dn, Entry>>,
    states: RwLock<HashMap<Dn, AccountState>>,
    writability: RwLock<WritabilityMode>,
    fail_state_updates: AtomicBool,
}

impl MemoryBackend {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry.
    pub async fn insert(&self, entry: Entry) {
        self.entries.write().await.insert(entry.dn().clone(), entry);
    }

    /// Seed an account state.
    pub async fn insert_state(&self, dn: Dn, state: AccountState) {
        self.states.write().await.insert(dn, state);
    }

    /// Change the backend writability mode.
    pub async fn set_writability(&self, mode: WritabilityMode) {
        *self.writability.write().await = mode;
    }

    /// Force [`Backend::apply_deltas`] to fail (state-update policy tests).
    pub fn set_fail_state_updates(&self, fail: bool) {
        self.fail_state_updates.store(fail, Ordering::SeqCst);
    }

    /// Number of stored entries.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn lookup(&self, dn: &Dn) -> Result<Option<Entry>, BackendError> {
        Ok(self.entries.read().await.get(dn).cloned())
    }

    async fn has_children(&self, dn: &Dn) -> Result<bool, BackendError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .any(|stored| stored.is_descendant_of(dn)))
    }

    async fn children(&self, dn: &Dn) -> Result<Vec<Dn>, BackendError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|stored| stored.parent().as_ref() == Some(dn))
            .cloned()
            .collect())
    }

    async fn put(&self, entry: Entry) -> Result<(), BackendError> {
        self.insert(entry).await;
        Ok(())
    }

    async fn remove(&self, dn: &Dn) -> Result<(), BackendError> {
        self.entries.write().await.remove(dn);
        self.states.write().await.remove(dn);
        Ok(())
    }

    async fn account_state(&self, dn: &Dn) -> Result<Option<AccountState>, BackendError> {
        Ok(self.states.read().await.get(dn).cloned())
    }

    async fn apply_deltas(&self, dn: &Dn, deltas: &[StateDelta]) -> Result<(), BackendError> {
        if self.fail_state_updates.load(Ordering::SeqCst) {
            return Err(BackendError::StateUpdate(
                "state updates are disabled".to_string(),
            ));
        }
        let mut states = self.states.write().await;
        let state = states.entry(dn.clone()).or_default();
        apply_all(state, deltas);
        Ok(())
    }

    fn writability(&self) -> WritabilityMode {
        // The mode only changes between operations, never mid-read.
        self.writability
            .try_read()
            .map_or(WritabilityMode::Enabled, |mode| *mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(text: &str) -> Dn {
        Dn::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_and_children() {
        let backend = MemoryBackend::new();
        backend.insert(Entry::new(dn("o=test"))).await;
        backend.insert(Entry::new(dn("ou=people,o=test"))).await;
        backend.insert(Entry::new(dn("uid=a,ou=people,o=test"))).await;

        assert!(backend.lookup(&dn("o=test")).await.unwrap().is_some());
        assert!(backend.lookup(&dn("o=missing")).await.unwrap().is_none());
        assert!(backend.has_children(&dn("o=test")).await.unwrap());
        assert!(!backend
            .has_children(&dn("uid=a,ou=people,o=test"))
            .await
            .unwrap());
        assert_eq!(backend.children(&dn("o=test")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_clears_state() {
        let backend = MemoryBackend::new();
        backend.insert(Entry::new(dn("uid=a,o=test"))).await;
        backend
            .insert_state(dn("uid=a,o=test"), AccountState::default())
            .await;
        backend.remove(&dn("uid=a,o=test")).await.unwrap();
        assert!(backend.lookup(&dn("uid=a,o=test")).await.unwrap().is_none());
        assert!(backend
            .account_state(&dn("uid=a,o=test"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_apply_deltas_failure_switch() {
        let backend = MemoryBackend::new();
        let target = dn("uid=a,o=test");
        backend.insert_state(target.clone(), AccountState::default()).await;

        backend.set_fail_state_updates(true);
        let err = backend
            .apply_deltas(&target, &[StateDelta::ResetFailureCount])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::StateUpdate(_)));

        backend.set_fail_state_updates(false);
        backend
            .apply_deltas(&target, &[StateDelta::ResetFailureCount])
            .await
            .unwrap();
    }
}
