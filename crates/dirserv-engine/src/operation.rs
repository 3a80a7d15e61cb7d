//! Operations and cancellation.
//!
//! One [`Operation`] exists per request. The common state lives here; the
//! kind-specific request payloads live in the per-kind modules.

use crate::bind::BindRequest;
use crate::compare::CompareRequest;
use crate::delete::DeleteRequest;
use chrono::{DateTime, Utc};
use dirserv_core::{Control, Dn, ResultCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// The closed set of operation kinds the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Bind,
    Compare,
    Delete,
    Unbind,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bind => "BIND",
            Self::Compare => "COMPARE",
            Self::Delete => "DELETE",
            Self::Unbind => "UNBIND",
        };
        write!(f, "{name}")
    }
}

/// Kind-specific request payload.
#[derive(Debug, Clone)]
pub enum OperationPayload {
    Bind(BindRequest),
    Compare(CompareRequest),
    Delete(DeleteRequest),
    Unbind,
}

impl OperationPayload {
    /// The kind tag for this payload.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Bind(_) => OperationKind::Bind,
            Self::Compare(_) => OperationKind::Compare,
            Self::Delete(_) => OperationKind::Delete,
            Self::Unbind => OperationKind::Unbind,
        }
    }
}

/// A request to cancel an in-flight operation. Attached at most once.
#[derive(Debug, Clone)]
pub struct CancelRequest {
    /// Whether the client should be told the operation was canceled.
    pub notify_client: bool,
    /// Human-readable reason.
    pub reason: String,
}

/// Outcome of a cancellation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    /// The operation was (or will be) canceled at the checkpoint.
    Canceled,
    /// This operation kind never honors cancellation.
    CannotCancel,
    /// The operation already reached a terminal result.
    TooLate,
}

impl CancelResult {
    /// The protocol result code for this outcome.
    #[must_use]
    pub fn result_code(self) -> ResultCode {
        match self {
            Self::Canceled => ResultCode::Canceled,
            Self::CannotCancel => ResultCode::CannotCancel,
            Self::TooLate => ResultCode::TooLate,
        }
    }
}

/// One request flowing through the pipeline.
#[derive(Debug)]
pub struct Operation {
    connection_id: u64,
    operation_id: i64,
    message_id: i32,
    payload: OperationPayload,
    request_controls: Vec<Control>,
    response_controls: Vec<Control>,
    result: Option<ResultCode>,
    error_message: Option<String>,
    matched_dn: Option<Dn>,
    referral_urls: Vec<String>,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    start_time: Option<DateTime<Utc>>,
    stop_time: Option<DateTime<Utc>>,
    cancel_request: Option<CancelRequest>,
    cancel_result: Option<CancelResult>,
    attachments: HashMap<String, Value>,
    internal: bool,
}

impl Operation {
    /// Create an operation bound to a connection.
    #[must_use]
    pub fn new(
        connection_id: u64,
        operation_id: i64,
        message_id: i32,
        payload: OperationPayload,
    ) -> Self {
        Self {
            connection_id,
            operation_id,
            message_id,
            payload,
            request_controls: Vec::new(),
            response_controls: Vec::new(),
            result: None,
            error_message: None,
            matched_dn: None,
            referral_urls: Vec::new(),
            started_at: None,
            stopped_at: None,
            start_time: None,
            stop_time: None,
            cancel_request: None,
            cancel_result: None,
            attachments: HashMap::new(),
            internal: false,
        }
    }

    /// The owning connection's id. Operations hold the arena index, never
    /// a live connection reference.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Per-connection monotonic operation id.
    #[must_use]
    pub fn operation_id(&self) -> i64 {
        self.operation_id
    }

    /// Protocol correlation id.
    #[must_use]
    pub fn message_id(&self) -> i32 {
        self.message_id
    }

    /// The operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    /// The request payload.
    #[must_use]
    pub fn payload(&self) -> &OperationPayload {
        &self.payload
    }

    /// Mutable request payload.
    pub fn payload_mut(&mut self) -> &mut OperationPayload {
        &mut self.payload
    }

    /// Mark this operation as originating inside the server.
    pub fn set_internal(&mut self, internal: bool) {
        self.internal = internal;
    }

    /// Whether this operation originated inside the server.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.internal
    }

    /// Attach a request control.
    pub fn add_request_control(&mut self, control: Control) {
        self.request_controls.push(control);
    }

    /// The request controls, in order.
    #[must_use]
    pub fn request_controls(&self) -> &[Control] {
        &self.request_controls
    }

    /// First request control with the given OID.
    #[must_use]
    pub fn request_control(&self, oid: &str) -> Option<&Control> {
        self.request_controls.iter().find(|c| c.oid == oid)
    }

    /// Attach a response control.
    pub fn add_response_control(&mut self, control: Control) {
        self.response_controls.push(control);
    }

    /// The response controls.
    #[must_use]
    pub fn response_controls(&self) -> &[Control] {
        &self.response_controls
    }

    /// The terminal result, once set.
    #[must_use]
    pub fn result(&self) -> Option<ResultCode> {
        self.result
    }

    /// Set the terminal result. The first write wins; later writes are
    /// ignored.
    pub fn set_result(&mut self, code: ResultCode) {
        if let Some(existing) = self.result {
            debug!(%existing, attempted = %code, "result already set, ignoring");
            return;
        }
        self.result = Some(code);
    }

    /// Diagnostic message accompanying the result.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Append to the diagnostic message.
    pub fn append_error_message(&mut self, message: impl AsRef<str>) {
        match &mut self.error_message {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(message.as_ref());
            }
            None => self.error_message = Some(message.as_ref().to_string()),
        }
    }

    /// The matched DN reported with the result, if any.
    #[must_use]
    pub fn matched_dn(&self) -> Option<&Dn> {
        self.matched_dn.as_ref()
    }

    /// Set the matched DN.
    pub fn set_matched_dn(&mut self, dn: Dn) {
        self.matched_dn = Some(dn);
    }

    /// Referral URLs reported with the result.
    #[must_use]
    pub fn referral_urls(&self) -> &[String] {
        &self.referral_urls
    }

    /// Set the referral URLs.
    pub fn set_referral_urls(&mut self, urls: Vec<String>) {
        self.referral_urls = urls;
    }

    /// Record processing start.
    pub fn mark_started(&mut self) {
        self.started_at = Some(Instant::now());
        self.start_time = Some(Utc::now());
    }

    /// Record processing stop. Stop never precedes start.
    pub fn mark_stopped(&mut self) {
        self.stopped_at = Some(Instant::now());
        self.stop_time = Some(Utc::now());
    }

    /// Wall-clock start time.
    #[must_use]
    pub fn processing_start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Wall-clock stop time.
    #[must_use]
    pub fn processing_stop_time(&self) -> Option<DateTime<Utc>> {
        self.stop_time
    }

    /// Elapsed processing time, once both marks exist.
    #[must_use]
    pub fn processing_time(&self) -> Option<std::time::Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => Some(stop.duration_since(start)),
            _ => None,
        }
    }

    /// Whether this kind honors cancellation at all.
    #[must_use]
    pub fn is_cancelable(&self) -> bool {
        !matches!(self.kind(), OperationKind::Bind | OperationKind::Unbind)
    }

    /// Request cancellation.
    ///
    /// Non-cancelable kinds answer [`CancelResult::CannotCancel`] without
    /// retaining the request. A terminal result answers
    /// [`CancelResult::TooLate`]. Otherwise the first request is retained
    /// and honored at the pre-core checkpoint; the eventual outcome is
    /// readable through [`Operation::cancel_result`].
    pub fn cancel(&mut self, request: CancelRequest) -> Option<CancelResult> {
        if !self.is_cancelable() {
            return Some(CancelResult::CannotCancel);
        }
        if self.result.is_some() {
            return Some(CancelResult::TooLate);
        }
        if self.cancel_request.is_none() {
            self.cancel_request = Some(request);
        }
        None
    }

    /// The attached cancel request. Always `None` for non-cancelable kinds.
    #[must_use]
    pub fn cancel_request(&self) -> Option<&CancelRequest> {
        self.cancel_request.as_ref()
    }

    /// The settled cancellation outcome, once known.
    #[must_use]
    pub fn cancel_result(&self) -> Option<CancelResult> {
        self.cancel_result
    }

    pub(crate) fn settle_cancel(&mut self, result: CancelResult) {
        self.cancel_result = Some(result);
    }

    /// Read a cross-phase attachment.
    #[must_use]
    pub fn attachment(&self, name: &str) -> Option<&Value> {
        self.attachments.get(name)
    }

    /// Store a cross-phase attachment, returning the previous value.
    pub fn set_attachment(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.attachments.insert(name.into(), value)
    }

    /// Remove an attachment.
    pub fn remove_attachment(&mut self, name: &str) -> Option<Value> {
        self.attachments.remove(name)
    }
}
