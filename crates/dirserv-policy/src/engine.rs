//! Password policy decision engine.
//!
//! [`evaluate`] is a pure function over a policy, an account state and a
//! supplied credential. It never touches storage: every required mutation
//! comes back as a [`StateDelta`] list and the caller commits them under
//! its configured [`StateUpdatePolicy`].

use crate::config::PasswordPolicy;
use crate::error::PolicyError;
use crate::scheme;
use crate::state::{AccountState, StateDelta};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

/// Terminal outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// Authentication accepted.
    Success,
    /// Credential did not match.
    InvalidCredentials,
    /// Account is locked (failure lockout, idle lockout, or disabled).
    AccountLocked,
    /// Password expired with no grace logins remaining, or a reset
    /// password outlived its allowed age.
    PasswordExpired,
    /// Authentication accepted, but the password must change before other
    /// operations are allowed.
    MustChangePassword,
}

/// What a caller should do when committing state deltas fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StateUpdatePolicy {
    /// Best effort: an update failure never fails the bind.
    Ignore,
    /// Retry the given number of times; an exhausted retry budget still
    /// does not fail the bind.
    Reactive {
        /// Retry attempts after the initial failure.
        retries: u32,
    },
    /// Fail the bind when the update cannot be committed.
    Proactive,
}

impl Default for StateUpdatePolicy {
    fn default() -> Self {
        Self::Reactive { retries: 1 }
    }
}

/// The result of evaluating a bind credential against a policy.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    /// Terminal outcome.
    pub outcome: PolicyOutcome,
    /// State mutations the caller should commit.
    pub deltas: Vec<StateDelta>,
    /// Time remaining before expiry, when inside the warning window.
    pub expiration_warning: Option<Duration>,
    /// Grace logins left after this decision, when one was consumed.
    pub grace_logins_remaining: Option<u32>,
}

impl PolicyDecision {
    /// A plain success with no warning and no grace consumption, for
    /// authentication paths that bypass password evaluation.
    #[must_use]
    pub fn success(deltas: Vec<StateDelta>) -> Self {
        Self::terminal(PolicyOutcome::Success, deltas)
    }

    fn terminal(outcome: PolicyOutcome, deltas: Vec<StateDelta>) -> Self {
        Self {
            outcome,
            deltas,
            expiration_warning: None,
            grace_logins_remaining: None,
        }
    }
}

/// Evaluate `credential` for an account under `policy` at time `now`.
///
/// # Errors
///
/// Returns [`PolicyError`] only for malformed stored values; every policy
/// verdict is expressed through [`PolicyOutcome`].
pub fn evaluate(
    policy: &PasswordPolicy,
    state: &AccountState,
    credential: &str,
    now: DateTime<Utc>,
) -> Result<PolicyDecision, PolicyError> {
    let mut deltas = Vec::new();

    if state.disabled {
        return Ok(PolicyDecision::terminal(PolicyOutcome::AccountLocked, deltas));
    }

    // Failure lockout, with auto-expiry of a timed lockout.
    if let Some(locked_at) = state.locked_at {
        match policy.lockout_duration() {
            None => {
                return Ok(PolicyDecision::terminal(
                    PolicyOutcome::AccountLocked,
                    deltas,
                ));
            }
            Some(duration) if now.signed_duration_since(locked_at) < duration => {
                return Ok(PolicyDecision::terminal(
                    PolicyOutcome::AccountLocked,
                    deltas,
                ));
            }
            Some(_) => {
                debug!("lockout expired, auto-unlocking");
                deltas.push(StateDelta::ClearLockout);
                deltas.push(StateDelta::ResetFailureCount);
            }
        }
    }

    // Idle lockout: no authentication activity for too long.
    if let Some(idle) = policy.idle_lockout() {
        let reference = state.last_login_at.or(state.password_changed_at);
        if let Some(last_seen) = reference {
            if now.signed_duration_since(last_seen) > idle {
                return Ok(PolicyDecision::terminal(
                    PolicyOutcome::AccountLocked,
                    deltas,
                ));
            }
        }
    }

    // Credential verification against every stored value.
    let mut matched = false;
    for stored in &state.passwords {
        if scheme::verify(credential, stored)? {
            matched = true;
            break;
        }
    }
    if !matched {
        deltas.push(StateDelta::IncrementFailureCount { at: now });
        if policy.lockout_failure_count > 0 {
            // The auto-unlock above may have scheduled a reset; count from
            // zero in that case.
            let prior = if deltas.contains(&StateDelta::ResetFailureCount) {
                0
            } else {
                state.effective_failures(now, policy.failure_expiration())
            };
            if prior + 1 >= policy.lockout_failure_count {
                deltas.push(StateDelta::SetLockout { at: now });
            }
        }
        return Ok(PolicyDecision::terminal(
            PolicyOutcome::InvalidCredentials,
            deltas,
        ));
    }

    if !state.failure_times.is_empty() && !deltas.contains(&StateDelta::ResetFailureCount) {
        deltas.push(StateDelta::ResetFailureCount);
    }
    deltas.push(StateDelta::UpdateLastLogin {
        at: now,
        formatted: format_last_login(policy, now),
    });

    // Administrative reset handling.
    if state.must_change {
        if let (Some(bound), Some(changed_at)) =
            (policy.max_reset_age(), state.password_changed_at)
        {
            if now.signed_duration_since(changed_at) > bound {
                return Ok(PolicyDecision::terminal(
                    PolicyOutcome::PasswordExpired,
                    deltas,
                ));
            }
        }
        return Ok(PolicyDecision::terminal(
            PolicyOutcome::MustChangePassword,
            deltas,
        ));
    }

    // Mandatory change-by deadline.
    if let Some(deadline) = policy.require_change_by_time {
        let changed_after_deadline = state
            .password_changed_at
            .is_some_and(|at| at >= deadline);
        if now >= deadline && !changed_after_deadline {
            return Ok(PolicyDecision::terminal(
                PolicyOutcome::MustChangePassword,
                deltas,
            ));
        }
    }

    // Expiration and grace logins.
    if let (Some(max_age), Some(changed_at)) = (policy.max_age(), state.password_changed_at) {
        let age = now.signed_duration_since(changed_at);
        if age > max_age {
            if state.grace_logins_used < policy.grace_login_count {
                deltas.push(StateDelta::ConsumeGraceLogin);
                let remaining =
                    policy.grace_login_count - state.grace_logins_used - 1;
                debug!(remaining, "expired password accepted on grace login");
                return Ok(PolicyDecision {
                    outcome: PolicyOutcome::Success,
                    deltas,
                    expiration_warning: None,
                    grace_logins_remaining: Some(remaining),
                });
            }
            return Ok(PolicyDecision::terminal(
                PolicyOutcome::PasswordExpired,
                deltas,
            ));
        }
        if let Some(warning) = policy.expiration_warning() {
            let remaining = max_age - age;
            if remaining <= warning {
                return Ok(PolicyDecision {
                    outcome: PolicyOutcome::Success,
                    deltas,
                    expiration_warning: Some(remaining),
                    grace_logins_remaining: None,
                });
            }
        }
    }

    Ok(PolicyDecision::terminal(PolicyOutcome::Success, deltas))
}

fn format_last_login(policy: &PasswordPolicy, now: DateTime<Utc>) -> String {
    match &policy.last_login_time_format {
        Some(format) => now.format(format).to_string(),
        None => now.to_rfc3339(),
    }
}
