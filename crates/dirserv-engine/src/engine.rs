//! Operation dispatch.
//!
//! [`Engine::run`] drives a parsed request through the phased pipeline:
//! pre-parse plugins, semantic parse, control validation, pre-operation
//! plugins, the cancellation checkpoint, kind-specific core processing,
//! post-operation plugins, and post-response plugins. Any phase can stop
//! the pipeline early; post-response runs whenever pre-parse ran, except
//! after a plugin-initiated disconnect.

use crate::backend::Backend;
use crate::config::{EngineConfig, WritabilityMode};
use crate::connection::{ConnectionRegistry, DisconnectNotice};
use crate::delete::ChangeListener;
use crate::error::EngineError;
use crate::locks::EntryLockManager;
use crate::operation::{CancelResult, Operation, OperationKind, OperationPayload};
use crate::plugin::{Plugin, PluginChain, PluginPhase, PluginResult};
use chrono::{DateTime, Utc};
use dirserv_core::control::{
    OID_ASSERTION, OID_PROXIED_AUTH_V1, OID_PROXIED_AUTH_V2, OID_SUBTREE_DELETE,
};
use dirserv_core::entry::AttributeDescription;
use dirserv_core::{Dn, ResultCode, Schema};
use dirserv_policy::PasswordPolicy;
use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// The request-processing engine.
pub struct Engine {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) schema: Schema,
    pub(crate) config: EngineConfig,
    pub(crate) default_policy: Arc<PasswordPolicy>,
    pub(crate) account_policies: HashMap<Dn, Arc<PasswordPolicy>>,
    pub(crate) account_idle_limits: HashMap<Dn, u64>,
    pub(crate) locks: EntryLockManager,
    pub(crate) plugins: PluginChain,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) change_listeners: Vec<Arc<dyn ChangeListener>>,
    pub(crate) next_change_number: AtomicI64,
}

impl Engine {
    /// Start building an engine over a backend.
    #[must_use]
    pub fn builder(backend: Arc<dyn Backend>) -> EngineBuilder {
        EngineBuilder::new(backend)
    }

    /// The connection registry.
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// The plugin chain (and its invocation counters).
    #[must_use]
    pub fn plugins(&self) -> &PluginChain {
        &self.plugins
    }

    /// The entry lock manager.
    #[must_use]
    pub fn locks(&self) -> &EntryLockManager {
        &self.locks
    }

    /// Build an operation on a connection, assigning the next
    /// per-connection operation id.
    ///
    /// # Errors
    ///
    /// Fails when the connection is not registered.
    pub async fn new_operation(
        &self,
        connection_id: u64,
        message_id: i32,
        payload: OperationPayload,
    ) -> Result<Operation, EngineError> {
        let operation_id = self
            .connections
            .next_operation_id(connection_id)
            .await
            .ok_or(EngineError::UnknownConnection { connection_id })?;
        Ok(Operation::new(connection_id, operation_id, message_id, payload))
    }

    /// Run one operation through the full pipeline.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only; every client-visible verdict lands
    /// in the operation's result code.
    #[instrument(skip(self, op), fields(kind = %op.kind(), connection_id = op.connection_id(), operation_id = op.operation_id()))]
    pub async fn run(&self, op: &mut Operation) -> Result<(), EngineError> {
        op.mark_started();
        self.connections.touch(op.connection_id()).await;

        // Phase 1: pre-parse plugins, before any semantic validation.
        match self.plugins.run_phase(PluginPhase::PreParse, op) {
            PluginResult::Continue => {}
            PluginResult::SkipToPostResponse(code) => {
                op.set_result(code);
                return self.finalize(op, true).await;
            }
            PluginResult::Disconnect {
                notify_client,
                message,
            } => return self.disconnect(op, notify_client, message).await,
        }

        // Phase 2: semantic parse of raw request fields.
        if let Err(code) = self.parse_payload(op) {
            op.set_result(code);
            return self.finalize(op, true).await;
        }

        // Phase 3: control validation.
        if let Some(code) = self.validate_controls(op) {
            op.set_result(code);
            return self.finalize(op, true).await;
        }

        // Phase 4: pre-operation plugins.
        match self.plugins.run_phase(PluginPhase::PreOperation, op) {
            PluginResult::Continue => {}
            PluginResult::SkipToPostResponse(code) => {
                op.set_result(code);
                return self.finalize(op, true).await;
            }
            PluginResult::Disconnect {
                notify_client,
                message,
            } => return self.disconnect(op, notify_client, message).await,
        }

        // Cancellation checkpoint: the single cooperative check, before
        // core processing begins.
        if op.cancel_request().is_some() {
            debug!("operation canceled before core processing");
            op.set_result(ResultCode::Canceled);
            op.settle_cancel(CancelResult::Canceled);
            self.run_post_operation(op).await;
            return self.finalize(op, true).await;
        }

        // Phase 5: kind-specific core processing.
        let core = match op.kind() {
            OperationKind::Bind => self.process_bind(op).await,
            OperationKind::Compare => self.process_compare(op).await,
            OperationKind::Delete => self.process_delete(op).await,
            OperationKind::Unbind => self.process_unbind(op).await,
        };
        if let Err(error) = core {
            warn!(%error, "core processing failed");
            op.set_result(ResultCode::Other);
            op.append_error_message(error.to_string());
        }

        // Phase 6: post-operation, success or failure, since phase 4 ran.
        self.run_post_operation(op).await;

        self.finalize(op, true).await
    }

    async fn run_post_operation(&self, op: &mut Operation) {
        if let PluginResult::Disconnect {
            notify_client,
            message,
        } = self.plugins.run_phase(PluginPhase::PostOperation, op)
        {
            let notice = self
                .connections
                .disconnect(op.connection_id(), notify_client, message)
                .await;
            debug!(notice_sent = notice.is_some(), "post-operation disconnect");
        }
    }

    /// Phase 7: settle the result and run post-response.
    async fn finalize(
        &self,
        op: &mut Operation,
        run_post_response: bool,
    ) -> Result<(), EngineError> {
        if op.result().is_none() {
            op.set_result(ResultCode::Other);
        }
        op.mark_stopped();
        if run_post_response {
            if let PluginResult::Disconnect {
                notify_client,
                message,
            } = self.plugins.run_phase(PluginPhase::PostResponse, op)
            {
                self.connections
                    .disconnect(op.connection_id(), notify_client, message)
                    .await;
            }
        }
        debug!(
            result = ?op.result(),
            processing_time = ?op.processing_time(),
            "operation finished"
        );
        Ok(())
    }

    /// Plugin-initiated disconnect: the connection terminates and every
    /// remaining phase is suppressed.
    async fn disconnect(
        &self,
        op: &mut Operation,
        notify_client: bool,
        message: String,
    ) -> Result<(), EngineError> {
        let notice = self
            .connections
            .disconnect(op.connection_id(), notify_client, message)
            .await;
        debug!(notice_sent = notice.is_some(), "plugin requested disconnect");
        op.mark_stopped();
        Ok(())
    }

    fn parse_payload(&self, op: &mut Operation) -> Result<(), ResultCode> {
        match op.payload_mut() {
            OperationPayload::Bind(request) => request
                .resolve_bind_dn()
                .map_err(|_| ResultCode::InvalidDnSyntax),
            OperationPayload::Compare(request) => {
                request
                    .resolve_dn()
                    .map_err(|_| ResultCode::InvalidDnSyntax)?;
                request
                    .resolve_attribute()
                    .map_err(|_| ResultCode::ProtocolError)
            }
            OperationPayload::Delete(request) => request
                .entry_dn()
                .map(|_| ())
                .map_err(|_| ResultCode::InvalidDnSyntax),
            OperationPayload::Unbind => Ok(()),
        }
    }

    fn validate_controls(&self, op: &Operation) -> Option<ResultCode> {
        const KNOWN: [&str; 4] = [
            OID_ASSERTION,
            OID_PROXIED_AUTH_V1,
            OID_PROXIED_AUTH_V2,
            OID_SUBTREE_DELETE,
        ];
        for control in op.request_controls() {
            if KNOWN.contains(&control.oid.as_str()) {
                continue;
            }
            if control.criticality {
                debug!(oid = %control.oid, "unrecognized critical control");
                return Some(ResultCode::UnavailableCriticalExtension);
            }
            // Unknown non-critical controls are ignored.
        }
        None
    }

    async fn process_unbind(&self, op: &mut Operation) -> Result<(), EngineError> {
        self.connections.close(op.connection_id()).await;
        op.set_result(ResultCode::Success);
        Ok(())
    }

    /// Disconnect connections idle beyond their effective limit, returning
    /// the notices to deliver.
    pub async fn sweep_idle(&self) -> Vec<(u64, DisconnectNotice)> {
        self.sweep_idle_at(Utc::now()).await
    }

    /// Idle sweep against an explicit clock. A per-account limit for the
    /// bound identity takes precedence over the global one; connections
    /// with no applicable limit are never swept.
    pub async fn sweep_idle_at(&self, now: DateTime<Utc>) -> Vec<(u64, DisconnectNotice)> {
        let mut notices = Vec::new();
        for (id, identity, last_activity) in self.connections.activity_snapshot().await {
            let limit_secs = identity
                .as_ref()
                .and_then(|dn| self.account_idle_limits.get(dn).copied())
                .or(self.config.idle_time_limit_secs);
            let Some(limit_secs) = limit_secs else {
                continue;
            };
            // A limit beyond the representable range can never elapse.
            let Some(limit) = i64::try_from(limit_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
            else {
                continue;
            };
            if now.signed_duration_since(last_activity) > limit {
                if let Some(notice) = self
                    .connections
                    .disconnect(id, true, "idle time limit exceeded")
                    .await
                {
                    notices.push((id, notice));
                }
            }
        }
        notices
    }

    pub(crate) fn policy_for(&self, dn: &Dn) -> Arc<PasswordPolicy> {
        self.account_policies
            .get(dn)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_policy))
    }

    pub(crate) fn write_allowed(&self, mode: WritabilityMode, internal: bool) -> bool {
        match mode {
            WritabilityMode::Enabled => true,
            WritabilityMode::Disabled => false,
            WritabilityMode::InternalOnly => internal,
        }
    }

    pub(crate) fn schema_defines(&self, attribute: &AttributeDescription) -> bool {
        self.schema.is_defined(&attribute.name)
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    backend: Arc<dyn Backend>,
    schema: Schema,
    config: EngineConfig,
    default_policy: Option<Arc<PasswordPolicy>>,
    account_policies: HashMap<Dn, Arc<PasswordPolicy>>,
    account_idle_limits: HashMap<Dn, u64>,
    plugins: PluginChain,
    change_listeners: Vec<Arc<dyn ChangeListener>>,
}

impl EngineBuilder {
    fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            schema: Schema::default(),
            config: EngineConfig::default(),
            default_policy: None,
            account_policies: HashMap::new(),
            account_idle_limits: HashMap::new(),
            plugins: PluginChain::new(),
            change_listeners: Vec::new(),
        }
    }

    /// Replace the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the attribute schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Set the default password policy.
    #[must_use]
    pub fn default_policy(mut self, policy: PasswordPolicy) -> Self {
        self.default_policy = Some(Arc::new(policy));
        self
    }

    /// Attach a per-account password policy override.
    #[must_use]
    pub fn account_policy(mut self, dn: Dn, policy: PasswordPolicy) -> Self {
        self.account_policies.insert(dn, Arc::new(policy));
        self
    }

    /// Attach a per-account idle time limit, in seconds. Takes
    /// precedence over the global limit for connections bound as `dn`.
    #[must_use]
    pub fn account_idle_limit(mut self, dn: Dn, limit_secs: u64) -> Self {
        self.account_idle_limits.insert(dn, limit_secs);
        self
    }

    /// Register a plugin for the given phases and kinds.
    #[must_use]
    pub fn plugin(
        mut self,
        plugin: Arc<dyn Plugin>,
        phases: &[PluginPhase],
        kinds: &[OperationKind],
    ) -> Self {
        self.plugins.register(plugin, phases, kinds);
        self
    }

    /// Register a change-notification listener.
    #[must_use]
    pub fn change_listener(mut self, listener: Arc<dyn ChangeListener>) -> Self {
        self.change_listeners.push(listener);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Propagates default-policy construction failure.
    pub fn build(self) -> Result<Engine, EngineError> {
        let default_policy = match self.default_policy {
            Some(policy) => policy,
            None => Arc::new(PasswordPolicy::builder().build()?),
        };
        Ok(Engine {
            backend: self.backend,
            schema: self.schema,
            locks: EntryLockManager::new(Duration::from_millis(self.config.lock_timeout_ms)),
            config: self.config,
            default_policy,
            account_policies: self.account_policies,
            account_idle_limits: self.account_idle_limits,
            plugins: self.plugins,
            connections: ConnectionRegistry::new(),
            change_listeners: self.change_listeners,
            next_change_number: AtomicI64::new(0),
        })
    }
}
