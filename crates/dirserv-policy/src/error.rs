//! Password policy error types.

use thiserror::Error;

/// Errors raised by the password policy crate.
#[derive(Debug, Clone, Error)]
pub enum PolicyError {
    /// A policy configuration field failed validation. Raised at
    /// construction time, never during request processing.
    #[error("Invalid password policy configuration: field '{field}': {reason}")]
    InvalidConfiguration {
        /// The offending configuration field.
        field: String,
        /// Description of the violated rule.
        reason: String,
    },

    /// Password hashing failed.
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// A stored password value carries no recognized scheme tag.
    #[error("Unrecognized password storage scheme in stored value")]
    UnknownScheme,

    /// A pre-encoded password was supplied but the policy forbids them.
    #[error("Pre-encoded passwords are not allowed by this policy")]
    PreEncodedNotAllowed,
}

/// Type alias for Results using [`PolicyError`].
pub type Result<T> = std::result::Result<T, PolicyError>;
