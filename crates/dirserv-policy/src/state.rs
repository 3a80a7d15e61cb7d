//! Account state and state deltas.
//!
//! The decision engine never mutates account state directly; it returns
//! [`StateDelta`] instructions and the caller decides whether and how to
//! commit them.

use crate::history::PasswordHistory;
use chrono::{DateTime, Utc};

/// Password-policy-relevant state of one account.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    /// Scheme-tagged stored password values.
    pub passwords: Vec<String>,
    /// Timestamps of authentication failures, oldest first.
    pub failure_times: Vec<DateTime<Utc>>,
    /// When the account was locked, if it is.
    pub locked_at: Option<DateTime<Utc>>,
    /// When the password last changed.
    pub password_changed_at: Option<DateTime<Utc>>,
    /// Last successful authentication.
    pub last_login_at: Option<DateTime<Utc>>,
    /// Last-login value formatted per the policy, as stored on the entry.
    pub last_login_value: Option<String>,
    /// Grace logins consumed since the password expired.
    pub grace_logins_used: u32,
    /// Set when an administrator reset the password.
    pub must_change: bool,
    /// Administratively disabled.
    pub disabled: bool,
    /// Password history.
    pub history: PasswordHistory,
}

impl AccountState {
    /// Failures still inside the expiration window at `now`.
    #[must_use]
    pub fn effective_failures(
        &self,
        now: DateTime<Utc>,
        expiration: Option<chrono::Duration>,
    ) -> u32 {
        let count = match expiration {
            None => self.failure_times.len(),
            Some(window) => self
                .failure_times
                .iter()
                .filter(|t| now.signed_duration_since(**t) <= window)
                .count(),
        };
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

/// A single instruction to mutate account state, produced by the decision
/// engine and applied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateDelta {
    /// Append an authentication failure at the given time.
    IncrementFailureCount {
        /// When the failure happened.
        at: DateTime<Utc>,
    },
    /// Clear all recorded failures.
    ResetFailureCount,
    /// Mark the account locked as of the given time.
    SetLockout {
        /// When the lockout began.
        at: DateTime<Utc>,
    },
    /// Clear the lockout marker.
    ClearLockout,
    /// Consume one grace login.
    ConsumeGraceLogin,
    /// Record a successful login at `at`; `formatted` is the value to
    /// store on the entry's last-login-time attribute.
    UpdateLastLogin {
        /// When the login happened.
        at: DateTime<Utc>,
        /// Formatted attribute value.
        formatted: String,
    },
}

impl StateDelta {
    /// Apply this delta to an account state.
    pub fn apply(&self, state: &mut AccountState) {
        match self {
            Self::IncrementFailureCount { at } => state.failure_times.push(*at),
            Self::ResetFailureCount => state.failure_times.clear(),
            Self::SetLockout { at } => state.locked_at = Some(*at),
            Self::ClearLockout => state.locked_at = None,
            Self::ConsumeGraceLogin => state.grace_logins_used += 1,
            Self::UpdateLastLogin { at, formatted } => {
                state.last_login_at = Some(*at);
                state.last_login_value = Some(formatted.clone());
            }
        }
    }
}

/// Apply a sequence of deltas in order.
pub fn apply_all(state: &mut AccountState, deltas: &[StateDelta]) {
    for delta in deltas {
        delta.apply(state);
    }
}
