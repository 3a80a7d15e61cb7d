//! Request and response controls.

/// LDAP assertion control (RFC 4528).
pub const OID_ASSERTION: &str = "1.3.6.1.1.12";
/// Proxied authorization v1.
pub const OID_PROXIED_AUTH_V1: &str = "2.16.840.1.113730.3.4.12";
/// Proxied authorization v2 (RFC 4370).
pub const OID_PROXIED_AUTH_V2: &str = "2.16.840.1.113730.3.4.18";
/// Subtree delete.
pub const OID_SUBTREE_DELETE: &str = "1.2.840.113556.1.4.805";
/// Notice of disconnection unsolicited notification.
pub const OID_NOTICE_OF_DISCONNECTION: &str = "1.3.6.1.4.1.1466.20036";

/// A request or response control: an OID, a criticality flag, and an
/// optional opaque value.
#[derive(Debug, Clone)]
pub struct Control {
    /// The control's object identifier.
    pub oid: String,
    /// When true, a server that does not recognize the control must reject
    /// the operation.
    pub criticality: bool,
    /// Raw control value, if any.
    pub value: Option<Vec<u8>>,
}

impl Control {
    /// A control with no value.
    #[must_use]
    pub fn new(oid: impl Into<String>, criticality: bool) -> Self {
        Self {
            oid: oid.into(),
            criticality,
            value: None,
        }
    }

    /// A control carrying a value.
    #[must_use]
    pub fn with_value(
        oid: impl Into<String>,
        criticality: bool,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            oid: oid.into(),
            criticality,
            value: Some(value.into()),
        }
    }

    /// The value interpreted as UTF-8, if present and valid.
    #[must_use]
    pub fn value_utf8(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}
