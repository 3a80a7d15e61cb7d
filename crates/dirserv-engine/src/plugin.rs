//! Plugin chain.
//!
//! Plugins hook the four pipeline boundaries through a single entry point
//! per plugin, registered against a set of phases and operation kinds.
//! The chain runs plugins in registration order and stops at the first
//! non-[`PluginResult::Continue`] result.

use crate::operation::{Operation, OperationKind};
use dirserv_core::ResultCode;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Pipeline boundaries a plugin can hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginPhase {
    /// Before the request is semantically validated.
    PreParse,
    /// After validation, before core processing.
    PreOperation,
    /// After core processing, success or failure.
    PostOperation,
    /// After the response, last phase of the lifecycle.
    PostResponse,
}

/// What a plugin invocation asks the pipeline to do.
#[derive(Debug, Clone)]
pub enum PluginResult {
    /// Proceed normally.
    Continue,
    /// Stop the pipeline with this result; only post-response still runs.
    SkipToPostResponse(ResultCode),
    /// Terminate the client connection; remaining phases are suppressed.
    Disconnect {
        /// Send a notice of disconnection first.
        notify_client: bool,
        /// Reason recorded in the notice and the log.
        message: String,
    },
}

/// A pipeline extension point.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handle one phase of one operation.
    fn invoke(&self, phase: PluginPhase, op: &mut Operation) -> PluginResult;
}

struct Registration {
    plugin: Arc<dyn Plugin>,
    phases: HashSet<PluginPhase>,
    kinds: HashSet<OperationKind>,
}

/// Ordered, per-phase plugin registry.
///
/// Carries the phase invocation counters; with one chain per server
/// process these are the process-wide counters, backed by atomics and
/// cleared only through [`InvocationCounters::reset`].
#[derive(Default)]
pub struct PluginChain {
    registrations: Vec<Registration>,
    counters: Arc<InvocationCounters>,
}

impl PluginChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The chain's phase invocation counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<InvocationCounters> {
        &self.counters
    }

    /// Register a plugin for the given phases and operation kinds.
    pub fn register(
        &mut self,
        plugin: Arc<dyn Plugin>,
        phases: &[PluginPhase],
        kinds: &[OperationKind],
    ) {
        self.registrations.push(Registration {
            plugin,
            phases: phases.iter().copied().collect(),
            kinds: kinds.iter().copied().collect(),
        });
    }

    /// Run one phase over the registered plugins.
    ///
    /// Returns the first non-Continue result, or Continue when every
    /// plugin let the pipeline proceed.
    pub fn run_phase(&self, phase: PluginPhase, op: &mut Operation) -> PluginResult {
        self.counters.record(phase);
        let kind = op.kind();
        for registration in &self.registrations {
            if !registration.phases.contains(&phase) || !registration.kinds.contains(&kind) {
                continue;
            }
            match registration.plugin.invoke(phase, op) {
                PluginResult::Continue => {}
                other => {
                    debug!(
                        plugin = registration.plugin.name(),
                        ?phase,
                        %kind,
                        "plugin stopped the pipeline"
                    );
                    return other;
                }
            }
        }
        PluginResult::Continue
    }
}

/// Process-wide per-phase invocation counters.
#[derive(Debug, Default)]
pub struct InvocationCounters {
    pre_parse: AtomicU64,
    pre_operation: AtomicU64,
    post_operation: AtomicU64,
    post_response: AtomicU64,
}

impl InvocationCounters {
    fn record(&self, phase: PluginPhase) {
        self.cell(phase).fetch_add(1, Ordering::Relaxed);
    }

    /// Count for one phase.
    pub fn count(&self, phase: PluginPhase) -> u64 {
        self.cell(phase).load(Ordering::Relaxed)
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        self.pre_parse.store(0, Ordering::Relaxed);
        self.pre_operation.store(0, Ordering::Relaxed);
        self.post_operation.store(0, Ordering::Relaxed);
        self.post_response.store(0, Ordering::Relaxed);
    }

    fn cell(&self, phase: PluginPhase) -> &AtomicU64 {
        match phase {
            PluginPhase::PreParse => &self.pre_parse,
            PluginPhase::PreOperation => &self.pre_operation,
            PluginPhase::PostOperation => &self.post_operation,
            PluginPhase::PostResponse => &self.post_response,
        }
    }
}
