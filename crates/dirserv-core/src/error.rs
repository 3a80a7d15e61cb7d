//! Error Types
//!
//! Standardized error types for the dirserv core crates.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while decoding or evaluating core protocol values.
///
/// These map directly onto the client-input branch of the error taxonomy:
/// every variant corresponds to a result code the operation pipeline can
/// surface without aborting the request lifecycle.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// A distinguished name could not be parsed.
    #[error("Invalid DN syntax: {dn}: {reason}")]
    InvalidDnSyntax {
        /// The raw DN text that failed to parse.
        dn: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// An attribute description could not be parsed.
    #[error("Invalid attribute description: {text}")]
    InvalidAttributeDescription {
        /// The raw attribute description text.
        text: String,
    },

    /// A search filter could not be parsed.
    #[error("Invalid filter: {text}: {reason}")]
    InvalidFilter {
        /// The raw filter text.
        text: String,
        /// Description of the parse failure.
        reason: String,
    },

    /// A control value was malformed.
    #[error("Malformed value for control {oid}: {reason}")]
    MalformedControlValue {
        /// OID of the offending control.
        oid: String,
        /// Description of the problem.
        reason: String,
    },
}

/// Type alias for Results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dn_display() {
        let error = CoreError::InvalidDnSyntax {
            dn: "no-equals".to_string(),
            reason: "RDN has no attribute/value separator".to_string(),
        };
        let display = error.to_string();
        assert!(display.contains("no-equals"));
        assert!(display.contains("separator"));
    }

    #[test]
    fn test_is_std_error() {
        let error = CoreError::InvalidAttributeDescription {
            text: ";".to_string(),
        };
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn test_serialization_tags_variant() {
        let error = CoreError::InvalidFilter {
            text: "(".to_string(),
            reason: "unterminated".to_string(),
        };
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("\"type\":\"invalid_filter\""));
    }
}
