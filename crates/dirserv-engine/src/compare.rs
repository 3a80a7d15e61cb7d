//! Compare processing.
//!
//! A compare asks whether the target entry holds an attribute value
//! matching an assertion, under the schema's equality rule for that
//! type. The target is read-locked while it is examined.

use crate::engine::Engine;
use crate::error::EngineError;
use crate::operation::{Operation, OperationPayload};
use dirserv_core::control::{OID_ASSERTION, OID_PROXIED_AUTH_V1, OID_PROXIED_AUTH_V2};
use dirserv_core::entry::AttributeDescription;
use dirserv_core::{CoreError, Dn, Filter, RawDn, ResultCode};
use tracing::debug;

/// Attachment key for the authorization DN a proxied-auth control set.
pub const ATTACHMENT_PROXIED_AUTH_DN: &str = "proxied_authorization_dn";

/// A compare request.
#[derive(Debug, Clone)]
pub struct CompareRequest {
    raw_dn: RawDn,
    raw_attribute: String,
    attribute: Option<AttributeDescription>,
    assertion: String,
}

impl CompareRequest {
    /// Build a compare of `assertion` against `attribute` on the entry
    /// at `raw_dn`.
    #[must_use]
    pub fn new(
        raw_dn: impl Into<String>,
        attribute: impl Into<String>,
        assertion: impl Into<String>,
    ) -> Self {
        Self {
            raw_dn: RawDn::new(raw_dn),
            raw_attribute: attribute.into(),
            attribute: None,
            assertion: assertion.into(),
        }
    }

    /// The raw target DN.
    #[must_use]
    pub fn raw_dn(&self) -> &str {
        self.raw_dn.raw()
    }

    /// Replace the raw target DN, dropping any resolved form.
    pub fn set_raw_dn(&mut self, raw: impl Into<String>) {
        self.raw_dn.set_raw(raw);
    }

    /// The resolved target DN, once parsed.
    #[must_use]
    pub fn dn(&self) -> Option<&Dn> {
        self.raw_dn.cached()
    }

    /// The requested attribute description, once parsed.
    #[must_use]
    pub fn attribute(&self) -> Option<&AttributeDescription> {
        self.attribute.as_ref()
    }

    /// The assertion value.
    #[must_use]
    pub fn assertion(&self) -> &str {
        &self.assertion
    }

    pub(crate) fn resolve_dn(&mut self) -> Result<&Dn, CoreError> {
        self.raw_dn.resolve()
    }

    pub(crate) fn resolve_attribute(&mut self) -> Result<(), CoreError> {
        self.attribute = Some(AttributeDescription::parse(&self.raw_attribute)?);
        Ok(())
    }
}

impl Engine {
    pub(crate) async fn process_compare(&self, op: &mut Operation) -> Result<(), EngineError> {
        let (dn, attribute, assertion) = match op.payload() {
            OperationPayload::Compare(request) => match (request.dn(), request.attribute()) {
                (Some(dn), Some(attribute)) => {
                    (dn.clone(), attribute.clone(), request.assertion().to_owned())
                }
                _ => {
                    op.set_result(ResultCode::ProtocolError);
                    return Ok(());
                }
            },
            _ => {
                op.set_result(ResultCode::ProtocolError);
                return Ok(());
            }
        };

        if let Some(code) = self.apply_proxied_auth(op).await? {
            op.set_result(code);
            return Ok(());
        }

        if !self.schema_defines(&attribute) {
            op.set_result(ResultCode::NoSuchAttribute);
            op.append_error_message(format!(
                "attribute type {} is not defined in the schema",
                attribute.name
            ));
            return Ok(());
        }

        // Hold a read lock for the whole examination.
        let Ok(_guard) = self.locks.lock_read(&dn).await else {
            op.set_result(ResultCode::Busy);
            op.append_error_message("timed out waiting for a read lock on the entry");
            return Ok(());
        };

        let Some(entry) = self.backend.lookup(&dn).await? else {
            if let Some((matched_dn, urls)) = self.find_referral(&dn).await? {
                op.set_matched_dn(matched_dn);
                op.set_referral_urls(urls);
                op.set_result(ResultCode::Referral);
            } else {
                op.set_result(ResultCode::NoSuchObject);
            }
            return Ok(());
        };

        // The assertion control gates the operation on a filter evaluated
        // against the target entry.
        if let Some(control) = op.request_control(OID_ASSERTION) {
            let filter = control.value_utf8().and_then(|text| Filter::parse(text).ok());
            match filter {
                Some(filter) => {
                    if !self.backend.matches_filter(&self.schema, &entry, &filter) {
                        debug!(target = %dn, "assertion control filter did not match");
                        op.set_result(ResultCode::AssertionFailed);
                        return Ok(());
                    }
                }
                None => {
                    op.set_result(ResultCode::ProtocolError);
                    op.append_error_message("malformed assertion control filter");
                    return Ok(());
                }
            }
        }

        if entry.matching_attributes(&attribute).is_empty() {
            op.set_result(ResultCode::NoSuchAttribute);
            return Ok(());
        }

        let verdict = if entry.has_matching_value(&self.schema, &attribute, &assertion) {
            ResultCode::CompareTrue
        } else {
            ResultCode::CompareFalse
        };
        debug!(target = %dn, attribute = %attribute.name, ?verdict, "compare evaluated");
        op.set_result(verdict);
        Ok(())
    }

    /// Honor a proxied-authorization control when present. Returns the
    /// result code that should end the operation, or `None` to proceed
    /// (possibly under a substituted authorization identity).
    pub(crate) async fn apply_proxied_auth(
        &self,
        op: &mut Operation,
    ) -> Result<Option<ResultCode>, EngineError> {
        enum Version {
            V1,
            V2,
        }
        let (control, version) = if let Some(c) = op.request_control(OID_PROXIED_AUTH_V2) {
            (c.clone(), Version::V2)
        } else if let Some(c) = op.request_control(OID_PROXIED_AUTH_V1) {
            (c.clone(), Version::V1)
        } else {
            return Ok(None);
        };

        let authzid = control.value_utf8().map(str::to_owned);
        let dn_text = match version {
            // v2 carries an authzid, normally "dn:" prefixed. An empty
            // authzid requests anonymous authorization.
            Version::V2 => match authzid.as_deref() {
                Some("") | Some("dn:") => {
                    op.set_attachment(
                        ATTACHMENT_PROXIED_AUTH_DN,
                        serde_json::Value::String(String::new()),
                    );
                    return Ok(None);
                }
                Some(text) => match text.strip_prefix("dn:") {
                    Some(dn_text) => dn_text.to_owned(),
                    // A malformed v2 value is tolerated only when the
                    // control is not critical.
                    None if control.criticality => return Ok(Some(ResultCode::ProtocolError)),
                    None => return Ok(None),
                },
                None if control.criticality => return Ok(Some(ResultCode::ProtocolError)),
                None => return Ok(None),
            },
            // v1 carries a bare DN and is strict regardless of
            // criticality.
            Version::V1 => match authzid {
                Some(text) => text,
                None => return Ok(Some(ResultCode::ProtocolError)),
            },
        };

        let dn = match Dn::parse(&dn_text) {
            Ok(dn) => dn,
            Err(_) => {
                return Ok(Some(match version {
                    Version::V1 => ResultCode::ProtocolError,
                    Version::V2 if control.criticality => ResultCode::ProtocolError,
                    Version::V2 => return Ok(None),
                }));
            }
        };

        let Some(_entry) = self.backend.lookup(&dn).await? else {
            debug!(authorization_dn = %dn, "proxied authorization target does not exist");
            return Ok(Some(ResultCode::AuthorizationDenied));
        };
        let state = self.account_state_for(&dn).await?;
        if state.disabled || state.locked_at.is_some() {
            debug!(authorization_dn = %dn, "proxied authorization target is locked or disabled");
            return Ok(Some(ResultCode::AuthorizationDenied));
        }
        op.set_attachment(
            ATTACHMENT_PROXIED_AUTH_DN,
            serde_json::Value::String(dn.to_string()),
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_caches_dn_and_attribute() {
        let mut request = CompareRequest::new("uid=user,o=test", "cn;lang-ja", "value");
        assert!(request.dn().is_none());
        request.resolve_dn().unwrap();
        request.resolve_attribute().unwrap();
        assert_eq!(request.dn().unwrap().normalized(), "uid=user,o=test");
        let attribute = request.attribute().unwrap();
        assert_eq!(attribute.name, "cn");
        assert_eq!(attribute.options, ["lang-ja"]);
    }

    #[test]
    fn test_set_raw_dn_drops_cached_form() {
        let mut request = CompareRequest::new("o=one", "cn", "value");
        request.resolve_dn().unwrap();
        request.set_raw_dn("o=two");
        assert!(request.dn().is_none());
    }
}
