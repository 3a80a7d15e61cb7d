//! Engine configuration.

use dirserv_policy::StateUpdatePolicy;
use serde::Deserialize;

/// Server or backend writability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritabilityMode {
    /// Writes accepted.
    #[default]
    Enabled,
    /// All writes rejected.
    Disabled,
    /// Only operations originating inside the server are accepted.
    InternalOnly,
}

/// Configuration surface consumed by the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Include detailed failure text in bind responses. Off by default:
    /// bind failures are information-minimized.
    #[serde(default)]
    pub return_bind_error_messages: bool,

    /// Reject a simple bind that names a DN but carries no password.
    #[serde(default = "default_true")]
    pub bind_with_dn_requires_password: bool,

    /// Server-wide writability.
    #[serde(default)]
    pub writability_mode: WritabilityMode,

    /// Disconnect connections idle beyond this many seconds; `None`
    /// disables the sweep.
    #[serde(default)]
    pub idle_time_limit_secs: Option<u64>,

    /// Bounded wait for entry lock acquisition before reporting Busy.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// What to do when committing password-policy state deltas fails.
    #[serde(default)]
    pub state_update_policy: StateUpdatePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            return_bind_error_messages: false,
            bind_with_dn_requires_password: true,
            writability_mode: WritabilityMode::Enabled,
            idle_time_limit_secs: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            state_update_policy: StateUpdatePolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout_ms() -> u64 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.return_bind_error_messages);
        assert!(config.bind_with_dn_requires_password);
        assert_eq!(config.writability_mode, WritabilityMode::Enabled);
        assert_eq!(config.lock_timeout_ms, 50);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "return_bind_error_messages": true,
                "writability_mode": "internal_only",
                "state_update_policy": {"mode": "proactive"}
            }"#,
        )
        .unwrap();
        assert!(config.return_bind_error_messages);
        assert_eq!(config.writability_mode, WritabilityMode::InternalOnly);
        assert_eq!(
            config.state_update_policy,
            StateUpdatePolicy::Proactive
        );
    }
}
