//! Password policy configuration.
//!
//! Policies are built once, at startup or reconfiguration, through
//! [`PasswordPolicyBuilder`]. Every numeric and time field has its own
//! validation rule and a malformed field fails the build; nothing is
//! validated lazily at request time.

use crate::error::PolicyError;
use crate::scheme::StorageScheme;
use chrono::{DateTime, Duration, Utc};

/// An account password policy. One default policy exists server-wide, with
/// optional per-account overrides selected by the caller.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Attribute holding password values on user entries.
    pub password_attribute: String,
    /// Scheme used to encode new passwords.
    pub default_scheme: StorageScheme,
    /// Schemes still accepted for verification but re-encoded on change.
    pub deprecated_schemes: Vec<StorageScheme>,
    /// Whether an account may hold more than one password value.
    pub allow_multiple_values: bool,
    /// Whether already-encoded values are accepted on password update.
    pub allow_pre_encoded: bool,
    /// Minimum password age in seconds; 0 disables.
    pub min_age_secs: i64,
    /// Maximum password age in seconds; 0 disables expiration.
    pub max_age_secs: i64,
    /// Maximum age of an administratively reset password; 0 disables.
    pub max_reset_age_secs: i64,
    /// How long before expiry warnings begin; 0 disables.
    pub expiration_warning_secs: i64,
    /// Grace logins permitted after expiration.
    pub grace_login_count: u32,
    /// Consecutive failures that trigger lockout; 0 disables lockout.
    pub lockout_failure_count: u32,
    /// Lockout duration in seconds; 0 means locked until admin unlock.
    pub lockout_duration_secs: i64,
    /// Age beyond which an old failure no longer counts; 0 disables.
    pub lockout_failure_expiration_secs: i64,
    /// Lockout after this much account inactivity; 0 disables.
    pub idle_lockout_secs: i64,
    /// All passwords must change by this time, once set.
    pub require_change_by_time: Option<DateTime<Utc>>,
    /// chrono format string for the last-login-time value; `None` keeps
    /// RFC 3339.
    pub last_login_time_format: Option<String>,
    /// History bound by count; 0 disables.
    pub history_count: u32,
    /// History bound by age in seconds; 0 disables.
    pub history_duration_secs: i64,
}

impl PasswordPolicy {
    /// Start building a policy with defaults.
    #[must_use]
    pub fn builder() -> PasswordPolicyBuilder {
        PasswordPolicyBuilder::default()
    }

    /// Minimum password age, `None` when disabled.
    #[must_use]
    pub fn min_age(&self) -> Option<Duration> {
        positive(self.min_age_secs)
    }

    /// Maximum password age, `None` when expiration is disabled.
    #[must_use]
    pub fn max_age(&self) -> Option<Duration> {
        positive(self.max_age_secs)
    }

    /// Lockout duration, `None` when lockout is permanent.
    #[must_use]
    pub fn lockout_duration(&self) -> Option<Duration> {
        positive(self.lockout_duration_secs)
    }

    /// Failure-expiration window, `None` when failures never expire.
    #[must_use]
    pub fn failure_expiration(&self) -> Option<Duration> {
        positive(self.lockout_failure_expiration_secs)
    }

    /// Idle lockout window, `None` when disabled.
    #[must_use]
    pub fn idle_lockout(&self) -> Option<Duration> {
        positive(self.idle_lockout_secs)
    }

    /// Warning window before expiry, `None` when disabled.
    #[must_use]
    pub fn expiration_warning(&self) -> Option<Duration> {
        positive(self.expiration_warning_secs)
    }

    /// Reset-password age bound, `None` when disabled.
    #[must_use]
    pub fn max_reset_age(&self) -> Option<Duration> {
        positive(self.max_reset_age_secs)
    }
}

fn positive(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::seconds(secs))
}

/// Builder for [`PasswordPolicy`] with per-field validation in
/// [`PasswordPolicyBuilder::build`].
#[derive(Debug, Clone)]
pub struct PasswordPolicyBuilder {
    policy: PasswordPolicy,
}

impl Default for PasswordPolicyBuilder {
    fn default() -> Self {
        Self {
            policy: PasswordPolicy {
                password_attribute: "userPassword".to_string(),
                default_scheme: StorageScheme::Argon2id,
                deprecated_schemes: vec![StorageScheme::ClearText],
                allow_multiple_values: false,
                allow_pre_encoded: false,
                min_age_secs: 0,
                max_age_secs: 0,
                max_reset_age_secs: 0,
                expiration_warning_secs: 0,
                grace_login_count: 0,
                lockout_failure_count: 0,
                lockout_duration_secs: 0,
                lockout_failure_expiration_secs: 0,
                idle_lockout_secs: 0,
                require_change_by_time: None,
                last_login_time_format: None,
                history_count: 0,
                history_duration_secs: 0,
            },
        }
    }
}

impl PasswordPolicyBuilder {
    /// Set the password attribute name.
    #[must_use]
    pub fn password_attribute(mut self, name: impl Into<String>) -> Self {
        self.policy.password_attribute = name.into();
        self
    }

    /// Set the default storage scheme.
    #[must_use]
    pub fn default_scheme(mut self, scheme: StorageScheme) -> Self {
        self.policy.default_scheme = scheme;
        self
    }

    /// Set the schemes accepted for verification but rejected for new
    /// values.
    #[must_use]
    pub fn deprecated_schemes(mut self, schemes: Vec<StorageScheme>) -> Self {
        self.policy.deprecated_schemes = schemes;
        self
    }

    /// Allow multiple password values per account.
    #[must_use]
    pub fn allow_multiple_values(mut self, allow: bool) -> Self {
        self.policy.allow_multiple_values = allow;
        self
    }

    /// Accept pre-encoded values on password update.
    #[must_use]
    pub fn allow_pre_encoded(mut self, allow: bool) -> Self {
        self.policy.allow_pre_encoded = allow;
        self
    }

    /// Minimum password age in seconds.
    #[must_use]
    pub fn min_age_secs(mut self, secs: i64) -> Self {
        self.policy.min_age_secs = secs;
        self
    }

    /// Maximum password age in seconds.
    #[must_use]
    pub fn max_age_secs(mut self, secs: i64) -> Self {
        self.policy.max_age_secs = secs;
        self
    }

    /// Maximum age for administratively reset passwords.
    #[must_use]
    pub fn max_reset_age_secs(mut self, secs: i64) -> Self {
        self.policy.max_reset_age_secs = secs;
        self
    }

    /// Expiration warning window in seconds.
    #[must_use]
    pub fn expiration_warning_secs(mut self, secs: i64) -> Self {
        self.policy.expiration_warning_secs = secs;
        self
    }

    /// Grace logins permitted after expiration.
    #[must_use]
    pub fn grace_login_count(mut self, count: u32) -> Self {
        self.policy.grace_login_count = count;
        self
    }

    /// Failure count that triggers lockout.
    #[must_use]
    pub fn lockout_failure_count(mut self, count: u32) -> Self {
        self.policy.lockout_failure_count = count;
        self
    }

    /// Lockout duration in seconds (0 = until admin unlock).
    #[must_use]
    pub fn lockout_duration_secs(mut self, secs: i64) -> Self {
        self.policy.lockout_duration_secs = secs;
        self
    }

    /// Failure expiration window in seconds.
    #[must_use]
    pub fn lockout_failure_expiration_secs(mut self, secs: i64) -> Self {
        self.policy.lockout_failure_expiration_secs = secs;
        self
    }

    /// Idle lockout window in seconds.
    #[must_use]
    pub fn idle_lockout_secs(mut self, secs: i64) -> Self {
        self.policy.idle_lockout_secs = secs;
        self
    }

    /// Deadline by which all passwords must have changed.
    #[must_use]
    pub fn require_change_by_time(mut self, at: DateTime<Utc>) -> Self {
        self.policy.require_change_by_time = Some(at);
        self
    }

    /// chrono format string for last-login-time values.
    #[must_use]
    pub fn last_login_time_format(mut self, format: impl Into<String>) -> Self {
        self.policy.last_login_time_format = Some(format.into());
        self
    }

    /// History count bound.
    #[must_use]
    pub fn history_count(mut self, count: u32) -> Self {
        self.policy.history_count = count;
        self
    }

    /// History age bound in seconds.
    #[must_use]
    pub fn history_duration_secs(mut self, secs: i64) -> Self {
        self.policy.history_duration_secs = secs;
        self
    }

    /// Validate every field and produce the policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] naming the first field
    /// that violates its rule.
    pub fn build(self) -> Result<PasswordPolicy, PolicyError> {
        let policy = self.policy;

        if policy.password_attribute.trim().is_empty() {
            return Err(invalid("password_attribute", "must not be empty"));
        }
        for (field, value) in [
            ("min_age_secs", policy.min_age_secs),
            ("max_age_secs", policy.max_age_secs),
            ("max_reset_age_secs", policy.max_reset_age_secs),
            ("expiration_warning_secs", policy.expiration_warning_secs),
            ("lockout_duration_secs", policy.lockout_duration_secs),
            (
                "lockout_failure_expiration_secs",
                policy.lockout_failure_expiration_secs,
            ),
            ("idle_lockout_secs", policy.idle_lockout_secs),
            ("history_duration_secs", policy.history_duration_secs),
        ] {
            if value < 0 {
                return Err(invalid(field, "must not be negative"));
            }
        }
        if policy.max_age_secs > 0 && policy.min_age_secs >= policy.max_age_secs {
            return Err(invalid(
                "min_age_secs",
                "must be less than max_age_secs when expiration is enabled",
            ));
        }
        if policy.expiration_warning_secs > 0 && policy.max_age_secs == 0 {
            return Err(invalid(
                "expiration_warning_secs",
                "requires max_age_secs to be set",
            ));
        }
        if policy.expiration_warning_secs >= policy.max_age_secs && policy.max_age_secs > 0 {
            return Err(invalid(
                "expiration_warning_secs",
                "must be less than max_age_secs",
            ));
        }
        if policy.grace_login_count > 0 && policy.max_age_secs == 0 {
            return Err(invalid(
                "grace_login_count",
                "requires max_age_secs to be set",
            ));
        }
        if policy.lockout_duration_secs > 0 && policy.lockout_failure_count == 0 {
            return Err(invalid(
                "lockout_duration_secs",
                "requires lockout_failure_count to be set",
            ));
        }
        if policy.lockout_failure_expiration_secs > 0 && policy.lockout_failure_count == 0 {
            return Err(invalid(
                "lockout_failure_expiration_secs",
                "requires lockout_failure_count to be set",
            ));
        }
        if let Some(format) = &policy.last_login_time_format {
            if format.trim().is_empty() {
                return Err(invalid("last_login_time_format", "must not be empty"));
            }
        }

        Ok(policy)
    }
}

fn invalid(field: &str, reason: &str) -> PolicyError {
    PolicyError::InvalidConfiguration {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_succeeds() {
        let policy = PasswordPolicy::builder().build().unwrap();
        assert_eq!(policy.password_attribute, "userPassword");
        assert!(policy.max_age().is_none());
        assert!(policy.lockout_duration().is_none());
    }

    #[test]
    fn test_empty_attribute_rejected() {
        let err = PasswordPolicy::builder()
            .password_attribute("  ")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidConfiguration { ref field, .. } if field == "password_attribute"
        ));
    }

    #[test]
    fn test_negative_interval_rejected() {
        let err = PasswordPolicy::builder()
            .idle_lockout_secs(-5)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidConfiguration { ref field, .. } if field == "idle_lockout_secs"
        ));
    }

    #[test]
    fn test_warning_requires_max_age() {
        let err = PasswordPolicy::builder()
            .expiration_warning_secs(600)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidConfiguration { ref field, .. }
                if field == "expiration_warning_secs"
        ));
    }

    #[test]
    fn test_warning_must_be_below_max_age() {
        let err = PasswordPolicy::builder()
            .max_age_secs(600)
            .expiration_warning_secs(600)
            .build()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_min_age_below_max_age() {
        let err = PasswordPolicy::builder()
            .max_age_secs(100)
            .min_age_secs(100)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidConfiguration { ref field, .. } if field == "min_age_secs"
        ));
    }

    #[test]
    fn test_lockout_duration_requires_failure_count() {
        let err = PasswordPolicy::builder()
            .lockout_duration_secs(300)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidConfiguration { ref field, .. }
                if field == "lockout_duration_secs"
        ));
    }

    #[test]
    fn test_grace_logins_require_expiration() {
        let err = PasswordPolicy::builder()
            .grace_login_count(3)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidConfiguration { ref field, .. } if field == "grace_login_count"
        ));
    }

    #[test]
    fn test_full_policy_builds() {
        let policy = PasswordPolicy::builder()
            .max_age_secs(86400)
            .min_age_secs(60)
            .expiration_warning_secs(3600)
            .grace_login_count(2)
            .lockout_failure_count(3)
            .lockout_duration_secs(300)
            .lockout_failure_expiration_secs(600)
            .idle_lockout_secs(86400 * 90)
            .history_count(3)
            .history_duration_secs(86400)
            .build()
            .unwrap();
        assert_eq!(policy.grace_login_count, 2);
        assert_eq!(policy.lockout_duration(), Some(Duration::seconds(300)));
    }
}
