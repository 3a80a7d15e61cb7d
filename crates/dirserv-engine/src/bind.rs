//! Bind processing.
//!
//! Simple binds verify a password against the target account under the
//! applicable password policy; SASL binds dispatch on mechanism. A bind
//! success rebinds the connection's authenticated identity, a failure
//! leaves the prior identity in place.

use crate::connection::{AuthType, AuthenticatedIdentity};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::operation::{Operation, OperationPayload};
use dirserv_core::{CoreError, Dn, ResultCode};
use dirserv_policy::{AccountState, PolicyOutcome, StateDelta, StateUpdatePolicy};
use chrono::Utc;
use tracing::{debug, warn};

/// Attachment key for the must-change flag on a bind.
pub const ATTACHMENT_MUST_CHANGE: &str = "pwpolicy.must_change";
/// Attachment key for seconds until password expiration.
pub const ATTACHMENT_EXPIRATION_WARNING: &str = "pwpolicy.seconds_until_expiration";
/// Attachment key for remaining grace logins.
pub const ATTACHMENT_GRACE_REMAINING: &str = "pwpolicy.grace_logins_remaining";

/// How a bind request authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMethod {
    /// DN plus password.
    Simple,
    /// SASL mechanism plus optional credentials.
    Sasl,
}

/// A bind request.
///
/// Exactly one of the simple password and the SASL mechanism is set at
/// any time; switching methods clears the other method's fields.
#[derive(Debug, Clone)]
pub struct BindRequest {
    raw_bind_dn: String,
    bind_dn: Option<Dn>,
    simple_password: Option<String>,
    sasl_mechanism: Option<String>,
    sasl_credentials: Option<Vec<u8>>,
    /// Identity established by SASL negotiation.
    sasl_auth_dn: Option<Dn>,
    /// Entry the bind ultimately authenticated as.
    user_entry_dn: Option<Dn>,
}

impl BindRequest {
    /// A simple bind. An empty DN with an empty password is an anonymous
    /// bind.
    #[must_use]
    pub fn simple(raw_bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            raw_bind_dn: raw_bind_dn.into(),
            bind_dn: None,
            simple_password: Some(password.into()),
            sasl_mechanism: None,
            sasl_credentials: None,
            sasl_auth_dn: None,
            user_entry_dn: None,
        }
    }

    /// A SASL bind.
    #[must_use]
    pub fn sasl(
        raw_bind_dn: impl Into<String>,
        mechanism: impl Into<String>,
        credentials: Option<Vec<u8>>,
    ) -> Self {
        Self {
            raw_bind_dn: raw_bind_dn.into(),
            bind_dn: None,
            simple_password: None,
            sasl_mechanism: Some(mechanism.into()),
            sasl_credentials: credentials,
            sasl_auth_dn: None,
            user_entry_dn: None,
        }
    }

    /// The raw, unvalidated bind DN.
    #[must_use]
    pub fn raw_bind_dn(&self) -> &str {
        &self.raw_bind_dn
    }

    /// The parsed bind DN, once resolved.
    #[must_use]
    pub fn bind_dn(&self) -> Option<&Dn> {
        self.bind_dn.as_ref()
    }

    /// The current method.
    #[must_use]
    pub fn method(&self) -> BindMethod {
        if self.sasl_mechanism.is_some() {
            BindMethod::Sasl
        } else {
            BindMethod::Simple
        }
    }

    /// Switch to simple authentication, clearing any SASL state.
    pub fn set_simple_password(&mut self, password: impl Into<String>) {
        self.simple_password = Some(password.into());
        self.sasl_mechanism = None;
        self.sasl_credentials = None;
        self.sasl_auth_dn = None;
    }

    /// Switch to SASL authentication, clearing any simple password.
    pub fn set_sasl_credentials(
        &mut self,
        mechanism: impl Into<String>,
        credentials: Option<Vec<u8>>,
    ) {
        self.sasl_mechanism = Some(mechanism.into());
        self.sasl_credentials = credentials;
        self.simple_password = None;
    }

    /// The simple password, when the method is simple.
    #[must_use]
    pub fn simple_password(&self) -> Option<&str> {
        self.simple_password.as_deref()
    }

    /// The SASL mechanism, when the method is SASL.
    #[must_use]
    pub fn sasl_mechanism(&self) -> Option<&str> {
        self.sasl_mechanism.as_deref()
    }

    /// Raw SASL credentials.
    #[must_use]
    pub fn sasl_credentials(&self) -> Option<&[u8]> {
        self.sasl_credentials.as_deref()
    }

    /// The identity SASL negotiation established.
    #[must_use]
    pub fn sasl_auth_dn(&self) -> Option<&Dn> {
        self.sasl_auth_dn.as_ref()
    }

    /// The entry the bind authenticated as. `None` until the bind
    /// succeeds, and always `None` for anonymous binds.
    #[must_use]
    pub fn user_entry_dn(&self) -> Option<&Dn> {
        self.user_entry_dn.as_ref()
    }

    pub(crate) fn resolve_bind_dn(&mut self) -> Result<(), CoreError> {
        let dn = if self.raw_bind_dn.is_empty() {
            Dn::root()
        } else {
            Dn::parse(&self.raw_bind_dn)?
        };
        self.bind_dn = Some(dn);
        Ok(())
    }
}

/// Outcome of an authentication attempt against one account, before the
/// connection identity is updated.
struct Authentication {
    dn: Dn,
    auth_type: AuthType,
    decision: dirserv_policy::PolicyDecision,
}

impl Engine {
    pub(crate) async fn process_bind(&self, op: &mut Operation) -> Result<(), EngineError> {
        let request = match op.payload() {
            OperationPayload::Bind(request) => request.clone(),
            _ => {
                op.set_result(ResultCode::ProtocolError);
                return Ok(());
            }
        };
        match request.method() {
            BindMethod::Simple => self.process_simple_bind(op, &request).await,
            BindMethod::Sasl => self.process_sasl_bind(op, &request).await,
        }
    }

    async fn process_simple_bind(
        &self,
        op: &mut Operation,
        request: &BindRequest,
    ) -> Result<(), EngineError> {
        let Some(bind_dn) = request.bind_dn().cloned() else {
            op.set_result(ResultCode::ProtocolError);
            return Ok(());
        };
        let password = request.simple_password().unwrap_or_default().to_owned();

        if bind_dn.is_root() {
            // Anonymous bind: drop any prior identity.
            self.connections.clear_identity(op.connection_id()).await;
            debug!(connection_id = op.connection_id(), "anonymous bind");
            op.set_result(ResultCode::Success);
            return Ok(());
        }

        if password.is_empty() {
            if self.config.bind_with_dn_requires_password {
                op.set_result(ResultCode::UnwillingToPerform);
                op.append_error_message("simple bind with a DN requires a password");
                return Ok(());
            }
            // Unauthenticated bind (DN, empty password): treated as
            // anonymous. Never reaches credential verification, so it
            // cannot touch the account's failure state.
            self.connections.clear_identity(op.connection_id()).await;
            debug!(
                connection_id = op.connection_id(),
                dn = %bind_dn,
                "unauthenticated bind treated as anonymous"
            );
            op.set_result(ResultCode::Success);
            return Ok(());
        }

        if self.backend.lookup(&bind_dn).await?.is_none() {
            if let Some((matched_dn, urls)) = self.find_referral(&bind_dn).await? {
                op.set_matched_dn(matched_dn);
                op.set_referral_urls(urls);
                op.set_result(ResultCode::Referral);
            } else {
                self.fail_bind(op, "no such account");
            }
            return Ok(());
        }

        match self.authenticate(&bind_dn, &password, AuthType::Simple).await? {
            Ok(authentication) => self.complete_bind(op, authentication).await,
            Err(reason) => {
                self.fail_bind(op, reason);
                Ok(())
            }
        }
    }

    async fn process_sasl_bind(
        &self,
        op: &mut Operation,
        request: &BindRequest,
    ) -> Result<(), EngineError> {
        let mechanism = request.sasl_mechanism().unwrap_or_default().to_uppercase();
        match mechanism.as_str() {
            "EXTERNAL" => self.process_sasl_external(op).await,
            "PLAIN" => self.process_sasl_plain(op, request).await,
            other => {
                debug!(mechanism = other, "unsupported SASL mechanism");
                self.fail_bind(op, "unsupported SASL mechanism");
                Ok(())
            }
        }
    }

    /// SASL EXTERNAL: the identity comes from the transport layer, the
    /// request carries no credentials of its own.
    async fn process_sasl_external(&self, op: &mut Operation) -> Result<(), EngineError> {
        let Some(credential) = self.connections.transport_credential(op.connection_id()).await
        else {
            self.fail_bind(op, "no transport identity available");
            return Ok(());
        };
        let Ok(dn) = Dn::parse(&credential) else {
            self.fail_bind(op, "transport identity is not a valid DN");
            return Ok(());
        };
        if self.backend.lookup(&dn).await?.is_none() {
            self.fail_bind(op, "no account for transport identity");
            return Ok(());
        }
        let state = self.account_state_for(&dn).await?;
        if state.disabled {
            self.fail_bind(op, "account is disabled");
            return Ok(());
        }
        self.complete_bind(
            op,
            Authentication {
                dn,
                auth_type: AuthType::Sasl("EXTERNAL".to_owned()),
                decision: dirserv_policy::PolicyDecision::success(Vec::new()),
            },
        )
        .await
    }

    /// SASL PLAIN: credentials are `authzid NUL authcid NUL password`.
    async fn process_sasl_plain(
        &self,
        op: &mut Operation,
        request: &BindRequest,
    ) -> Result<(), EngineError> {
        let Some(raw) = request.sasl_credentials() else {
            op.set_result(ResultCode::ProtocolError);
            op.append_error_message("SASL PLAIN requires credentials");
            return Ok(());
        };
        let Ok(text) = std::str::from_utf8(raw) else {
            op.set_result(ResultCode::ProtocolError);
            op.append_error_message("SASL PLAIN credentials are not valid UTF-8");
            return Ok(());
        };
        let fields: Vec<&str> = text.split('\0').collect();
        let [_authzid, authcid, password] = fields.as_slice() else {
            op.set_result(ResultCode::ProtocolError);
            op.append_error_message("malformed SASL PLAIN credentials");
            return Ok(());
        };
        if authcid.is_empty() {
            op.set_result(ResultCode::ProtocolError);
            op.append_error_message("SASL PLAIN authentication identity is empty");
            return Ok(());
        }
        let identity_text = authcid.strip_prefix("dn:").unwrap_or(authcid);
        let Ok(dn) = Dn::parse(identity_text) else {
            self.fail_bind(op, "authentication identity is not a valid DN");
            return Ok(());
        };
        if self.backend.lookup(&dn).await?.is_none() {
            self.fail_bind(op, "no such account");
            return Ok(());
        }
        let auth_type = AuthType::Sasl("PLAIN".to_owned());
        match self.authenticate(&dn, password, auth_type).await? {
            Ok(authentication) => self.complete_bind(op, authentication).await,
            Err(reason) => {
                self.fail_bind(op, reason);
                Ok(())
            }
        }
    }

    /// Verify a password against an account under its policy. `Ok(Err)`
    /// is an authentication verdict, `Err` an infrastructure failure.
    async fn authenticate(
        &self,
        dn: &Dn,
        password: &str,
        auth_type: AuthType,
    ) -> Result<Result<Authentication, &'static str>, EngineError> {
        let state = self.account_state_for(dn).await?;
        if state.passwords.is_empty() {
            return Ok(Err("account has no password"));
        }
        let policy = self.policy_for(dn);
        let decision = dirserv_policy::evaluate(&policy, &state, password, Utc::now())?;
        let committed = self.commit_state_deltas(dn, &decision.deltas).await;
        match decision.outcome {
            PolicyOutcome::Success | PolicyOutcome::MustChangePassword => {
                if !committed
                    && matches!(self.config.state_update_policy, StateUpdatePolicy::Proactive)
                {
                    return Ok(Err("account state update failed"));
                }
                Ok(Ok(Authentication {
                    dn: dn.clone(),
                    auth_type,
                    decision,
                }))
            }
            PolicyOutcome::InvalidCredentials => Ok(Err("invalid credentials")),
            PolicyOutcome::AccountLocked => Ok(Err("account is locked")),
            PolicyOutcome::PasswordExpired => Ok(Err("password is expired")),
        }
    }

    async fn complete_bind(
        &self,
        op: &mut Operation,
        authentication: Authentication,
    ) -> Result<(), EngineError> {
        let Authentication {
            dn,
            auth_type,
            decision,
        } = authentication;
        self.connections
            .bind_identity(
                op.connection_id(),
                AuthenticatedIdentity {
                    dn: dn.clone(),
                    auth_type,
                },
            )
            .await;
        if decision.outcome == PolicyOutcome::MustChangePassword {
            op.set_attachment(ATTACHMENT_MUST_CHANGE, serde_json::Value::Bool(true));
        }
        if let Some(remaining) = decision.expiration_warning {
            op.set_attachment(
                ATTACHMENT_EXPIRATION_WARNING,
                serde_json::Value::from(remaining.num_seconds()),
            );
        }
        if let Some(remaining) = decision.grace_logins_remaining {
            op.set_attachment(
                ATTACHMENT_GRACE_REMAINING,
                serde_json::Value::from(remaining),
            );
        }
        if let OperationPayload::Bind(request) = op.payload_mut() {
            request.user_entry_dn = Some(dn.clone());
        }
        debug!(bind_dn = %dn, "bind succeeded");
        op.set_result(ResultCode::Success);
        Ok(())
    }

    /// Fail a bind with `INVALID_CREDENTIALS`, withholding the cause
    /// unless configured otherwise.
    fn fail_bind(&self, op: &mut Operation, reason: &str) {
        debug!(connection_id = op.connection_id(), reason, "bind failed");
        op.set_result(ResultCode::InvalidCredentials);
        if self.config.return_bind_error_messages {
            op.append_error_message(reason);
        }
    }

    /// Account state tracked by the backend, or a fresh empty record.
    pub(crate) async fn account_state_for(&self, dn: &Dn) -> Result<AccountState, EngineError> {
        Ok(self.backend.account_state(dn).await?.unwrap_or_default())
    }

    /// Commit state deltas per the configured state-update policy.
    /// Returns whether the deltas landed.
    async fn commit_state_deltas(&self, dn: &Dn, deltas: &[StateDelta]) -> bool {
        if deltas.is_empty() {
            return true;
        }
        let attempts = match self.config.state_update_policy {
            StateUpdatePolicy::Reactive { retries } => 1 + retries as usize,
            StateUpdatePolicy::Ignore | StateUpdatePolicy::Proactive => 1,
        };
        for attempt in 1..=attempts {
            match self.backend.apply_deltas(dn, deltas).await {
                Ok(()) => return true,
                Err(error) => {
                    warn!(%error, account = %dn, attempt, "account state update failed");
                }
            }
        }
        false
    }

    /// Walk up from a missing entry to the nearest existing ancestor; a
    /// referral ancestor yields rewritten continuation URLs.
    pub(crate) async fn find_referral(
        &self,
        dn: &Dn,
    ) -> Result<Option<(Dn, Vec<String>)>, EngineError> {
        let mut current = dn.parent();
        while let Some(ancestor) = current {
            if let Some(entry) = self.backend.lookup(&ancestor).await? {
                if !entry.is_referral() {
                    return Ok(None);
                }
                let urls = rewrite_referral_urls(dn, &ancestor, &entry.ref_urls());
                if urls.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((ancestor, urls)));
            }
            current = ancestor.parent();
        }
        Ok(None)
    }
}

/// Rewrite each `ref` URL so its DN part names `target` relative to the
/// remote naming context. Values that are not parseable LDAP URLs are
/// skipped.
pub(crate) fn rewrite_referral_urls(
    target: &Dn,
    referral_dn: &Dn,
    ref_values: &[&str],
) -> Vec<String> {
    let mut urls = Vec::with_capacity(ref_values.len());
    for value in ref_values {
        let Some((scheme, rest)) = value.split_once("://") else {
            continue;
        };
        let (host_port, remote_base) = match rest.split_once('/') {
            Some((host_port, path)) => (host_port, path),
            None => (rest, ""),
        };
        let remote_dn = if remote_base.is_empty() {
            Dn::root()
        } else {
            match Dn::parse(remote_base) {
                Ok(dn) => dn,
                Err(_) => continue,
            }
        };
        let Some(rewritten) = target.rebase(referral_dn, &remote_dn) else {
            continue;
        };
        urls.push(format!("{scheme}://{host_port}/{rewritten}"));
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_switches_clear_other_mode() {
        let mut request = BindRequest::simple("cn=admin", "secret");
        assert_eq!(request.method(), BindMethod::Simple);

        request.set_sasl_credentials("PLAIN", Some(b"\0cn=admin\0secret".to_vec()));
        assert_eq!(request.method(), BindMethod::Sasl);
        assert!(request.simple_password().is_none());

        request.set_simple_password("secret");
        assert_eq!(request.method(), BindMethod::Simple);
        assert!(request.sasl_mechanism().is_none());
        assert!(request.sasl_credentials().is_none());
    }

    #[test]
    fn test_empty_dn_resolves_to_root() {
        let mut request = BindRequest::simple("", "");
        request.resolve_bind_dn().unwrap();
        assert!(request.bind_dn().unwrap().is_root());
    }

    #[test]
    fn test_rewrite_referral_urls() {
        let target = Dn::parse("uid=user,ou=people,o=local").unwrap();
        let referral = Dn::parse("ou=people,o=local").unwrap();
        let urls = rewrite_referral_urls(
            &target,
            &referral,
            &["ldap://remote.example.com:389/ou=staff,o=remote"],
        );
        assert_eq!(
            urls,
            vec!["ldap://remote.example.com:389/uid=user,ou=staff,o=remote"]
        );
    }

    #[test]
    fn test_rewrite_skips_unparseable_values() {
        let target = Dn::parse("uid=user,o=local").unwrap();
        let referral = Dn::parse("o=local").unwrap();
        let urls = rewrite_referral_urls(&target, &referral, &["not a url"]);
        assert!(urls.is_empty());
    }
}
