//! New-password acceptance.
//!
//! [`accept_new_password`] is the change-time counterpart of
//! [`crate::engine::evaluate`]: a pure function that decides whether a
//! proposed password may replace an account's current values, and
//! produces the encoded value set to store. It never touches storage;
//! recording the replaced values into [`crate::history::PasswordHistory`]
//! is the caller's commit step.

use crate::config::PasswordPolicy;
use crate::error::PolicyError;
use crate::scheme::{self, StorageScheme};
use crate::state::AccountState;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Verdict on a proposed password change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The proposal is acceptable.
    Accepted {
        /// The full scheme-tagged value set to store: the new encoding,
        /// preceded by the current values when the policy allows
        /// multiple password values.
        passwords: Vec<String>,
    },
    /// The current password is younger than the minimum age.
    TooSoon,
    /// The proposal matches a current value or a retained history entry.
    InHistory,
}

/// Decide whether `new_password` may replace the account's passwords
/// under `policy` at time `now`.
///
/// A pre-encoded proposal (one carrying a recognized scheme tag) is
/// accepted verbatim when the policy allows it; it bypasses the history
/// check since only the plain text can be verified against history.
///
/// # Errors
///
/// Returns [`PolicyError::PreEncodedNotAllowed`] when the proposal is
/// pre-encoded and the policy forbids that, or when it is encoded with a
/// deprecated scheme. Hashing and malformed-stored-value errors
/// propagate.
pub fn accept_new_password(
    policy: &PasswordPolicy,
    state: &AccountState,
    new_password: &str,
    now: DateTime<Utc>,
) -> Result<UpdateOutcome, PolicyError> {
    let pre_encoded = StorageScheme::of_stored(new_password).map(|(s, _)| s);
    if let Some(scheme) = pre_encoded {
        if !policy.allow_pre_encoded {
            return Err(PolicyError::PreEncodedNotAllowed);
        }
        // Deprecated schemes are verification-only; new values must not
        // reintroduce them.
        if policy.deprecated_schemes.contains(&scheme) {
            debug!(?scheme, "pre-encoded proposal uses a deprecated scheme");
            return Err(PolicyError::PreEncodedNotAllowed);
        }
    }

    // An administrative reset bypasses the minimum age.
    if let (Some(min_age), Some(changed_at), false) =
        (policy.min_age(), state.password_changed_at, state.must_change)
    {
        if now.signed_duration_since(changed_at) < min_age {
            return Ok(UpdateOutcome::TooSoon);
        }
    }

    if pre_encoded.is_none() && history_enabled(policy) {
        for stored in &state.passwords {
            if scheme::verify(new_password, stored)? {
                return Ok(UpdateOutcome::InHistory);
            }
        }
        if state.history.contains(
            new_password,
            now.timestamp_millis(),
            policy.history_count,
            policy.history_duration_secs,
        )? {
            return Ok(UpdateOutcome::InHistory);
        }
    }

    let encoded = match pre_encoded {
        Some(_) => new_password.to_string(),
        None => policy.default_scheme.encode(new_password)?,
    };
    let passwords = if policy.allow_multiple_values {
        let mut values = state.passwords.clone();
        values.push(encoded);
        values
    } else {
        vec![encoded]
    };
    Ok(UpdateOutcome::Accepted { passwords })
}

fn history_enabled(policy: &PasswordPolicy) -> bool {
    policy.history_count > 0 || policy.history_duration_secs > 0
}
