//! Delete processing.
//!
//! A delete removes a leaf entry, or a whole subtree when the
//! subtree-delete control accompanies the request. The target is
//! write-locked for the duration, and every successful delete is
//! announced to the registered change listeners exactly once with a
//! monotonically increasing change number.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::operation::{Operation, OperationPayload};
use dirserv_core::control::OID_SUBTREE_DELETE;
use dirserv_core::{CoreError, Dn, RawDn, ResultCode};
use std::sync::atomic::Ordering;
use tracing::{debug, info};

/// Observer of committed entry changes.
pub trait ChangeListener: Send + Sync {
    /// Called once per deleted entry, after the removal is durable.
    fn entry_deleted(&self, dn: &Dn, change_number: i64);
}

/// A delete request.
#[derive(Debug, Clone)]
pub struct DeleteRequest {
    raw_dn: RawDn,
    change_number: Option<i64>,
}

impl DeleteRequest {
    /// Build a delete of the entry at `raw_dn`.
    #[must_use]
    pub fn new(raw_dn: impl Into<String>) -> Self {
        Self {
            raw_dn: RawDn::new(raw_dn),
            change_number: None,
        }
    }

    /// The raw target DN.
    #[must_use]
    pub fn raw_dn(&self) -> &str {
        self.raw_dn.raw()
    }

    /// Replace the raw target DN, dropping any resolved form.
    pub fn set_raw_dn(&mut self, raw: impl Into<String>) {
        self.raw_dn.set_raw(raw);
        self.change_number = None;
    }

    /// The resolved target DN, once parsed.
    #[must_use]
    pub fn dn(&self) -> Option<&Dn> {
        self.raw_dn.cached()
    }

    /// The change number assigned when the delete committed.
    #[must_use]
    pub fn change_number(&self) -> Option<i64> {
        self.change_number
    }

    pub(crate) fn entry_dn(&mut self) -> Result<&Dn, CoreError> {
        self.raw_dn.resolve()
    }
}

impl Engine {
    pub(crate) async fn process_delete(&self, op: &mut Operation) -> Result<(), EngineError> {
        let dn = match op.payload() {
            OperationPayload::Delete(request) => match request.dn() {
                Some(dn) => dn.clone(),
                None => {
                    op.set_result(ResultCode::ProtocolError);
                    return Ok(());
                }
            },
            _ => {
                op.set_result(ResultCode::ProtocolError);
                return Ok(());
            }
        };

        if let Some(code) = self.apply_proxied_auth(op).await? {
            op.set_result(code);
            return Ok(());
        }

        // Server-wide writability gates the backend's own mode.
        if !self.write_allowed(self.config.writability_mode, op.is_internal()) {
            op.set_result(ResultCode::UnwillingToPerform);
            op.append_error_message("the server is configured read-only");
            return Ok(());
        }
        if !self.write_allowed(self.backend.writability(), op.is_internal()) {
            op.set_result(ResultCode::UnwillingToPerform);
            op.append_error_message("the backend is configured read-only");
            return Ok(());
        }

        // Hold the write lock across existence check, removal and
        // listener notification.
        let Ok(_guard) = self.locks.lock_write(&dn).await else {
            op.set_result(ResultCode::Busy);
            op.append_error_message("timed out waiting for a write lock on the entry");
            return Ok(());
        };

        if self.backend.lookup(&dn).await?.is_none() {
            if let Some((matched_dn, urls)) = self.find_referral(&dn).await? {
                op.set_matched_dn(matched_dn);
                op.set_referral_urls(urls);
                op.set_result(ResultCode::Referral);
            } else {
                op.set_result(ResultCode::NoSuchObject);
            }
            return Ok(());
        }

        let subtree = op.request_control(OID_SUBTREE_DELETE).is_some();
        let has_children = self.backend.has_children(&dn).await?;
        if has_children && !subtree {
            op.set_result(ResultCode::NotAllowedOnNonLeaf);
            op.append_error_message("the entry has subordinates");
            return Ok(());
        }

        let mut removed = Vec::new();
        if has_children {
            removed = self.collect_subtree(&dn).await?;
        }
        removed.push(dn.clone());

        // Deepest first, the target itself last.
        for entry_dn in &removed {
            self.backend.remove(entry_dn).await?;
        }

        let change_number = self.next_change_number.fetch_add(1, Ordering::SeqCst) + 1;
        for entry_dn in &removed {
            self.connections.deregister_identity(entry_dn).await;
            for listener in &self.change_listeners {
                listener.entry_deleted(entry_dn, change_number);
            }
        }
        if let OperationPayload::Delete(request) = op.payload_mut() {
            request.change_number = Some(change_number);
        }
        info!(target = %dn, entries = removed.len(), change_number, "delete committed");
        op.set_result(ResultCode::Success);
        Ok(())
    }

    /// All strict descendants of `dn`, deepest first.
    async fn collect_subtree(&self, dn: &Dn) -> Result<Vec<Dn>, EngineError> {
        let mut ordered = Vec::new();
        let mut frontier = vec![dn.clone()];
        while let Some(parent) = frontier.pop() {
            for child in self.backend.children(&parent).await? {
                ordered.push(child.clone());
                frontier.push(child);
            }
        }
        // Breadth order reversed gives children before their parents.
        ordered.reverse();
        debug!(target = %dn, descendants = ordered.len(), "collected subtree for delete");
        Ok(ordered)
    }
}
