//! Engine error types.
//!
//! Client input errors and policy verdicts never appear here; those are
//! surfaced as result codes on the operation. [`EngineError`] covers the
//! infrastructure failures that are not the client's fault.

use dirserv_core::CoreError;
use dirserv_policy::PolicyError;
use thiserror::Error;

/// Errors raised by the operation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Core value decoding failure.
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Password policy failure.
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Backend failure.
    #[error("Backend error: {0}")]
    Backend(#[from] crate::backend::BackendError),

    /// The named connection is not registered.
    #[error("Unknown connection: {connection_id}")]
    UnknownConnection {
        /// The connection id that failed to resolve.
        connection_id: u64,
    },
}

/// Type alias for Results using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;
