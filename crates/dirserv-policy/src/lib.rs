//! dirserv Password Policy
//!
//! Pure password-policy decision logic: configuration with fail-fast
//! validation, account state records, the bind-time decision engine, and
//! password history.
//!
//! # Modules
//!
//! - [`config`] - [`PasswordPolicy`] and its validating builder
//! - [`state`] - [`AccountState`] and [`StateDelta`] instructions
//! - [`engine`] - [`evaluate`] and the state-update-failure policy
//! - [`history`] - count- and duration-bounded password history
//! - [`update`] - [`accept_new_password`] for the password-change path
//! - [`scheme`] - tagged password storage schemes
//! - [`error`] - [`PolicyError`]

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod scheme;
pub mod state;
pub mod update;

pub use config::{PasswordPolicy, PasswordPolicyBuilder};
pub use engine::{evaluate, PolicyDecision, PolicyOutcome, StateUpdatePolicy};
pub use error::{PolicyError, Result};
pub use history::PasswordHistory;
pub use scheme::{verify, StorageScheme};
pub use state::{apply_all, AccountState, StateDelta};
pub use update::{accept_new_password, UpdateOutcome};
