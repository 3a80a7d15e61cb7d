//! Protocol result codes.

use serde::Serialize;

/// Result code attached to a completed operation.
///
/// The discriminants are the protocol-visible integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum ResultCode {
    Success = 0,
    ProtocolError = 2,
    CompareFalse = 5,
    CompareTrue = 6,
    Referral = 10,
    UnavailableCriticalExtension = 12,
    NoSuchAttribute = 16,
    ConstraintViolation = 19,
    NoSuchObject = 32,
    InvalidDnSyntax = 34,
    InvalidCredentials = 49,
    Busy = 51,
    UnwillingToPerform = 53,
    NotAllowedOnNonLeaf = 66,
    Other = 80,
    Canceled = 118,
    TooLate = 120,
    CannotCancel = 121,
    AssertionFailed = 122,
    AuthorizationDenied = 123,
}

impl ResultCode {
    /// The protocol integer value.
    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Whether this code denotes success. `CompareTrue` and `CompareFalse`
    /// are successful completions of a compare.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::CompareTrue | Self::CompareFalse)
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_values() {
        assert_eq!(ResultCode::Success.code(), 0);
        assert_eq!(ResultCode::CompareFalse.code(), 5);
        assert_eq!(ResultCode::CompareTrue.code(), 6);
        assert_eq!(ResultCode::Referral.code(), 10);
        assert_eq!(ResultCode::NoSuchObject.code(), 32);
        assert_eq!(ResultCode::InvalidCredentials.code(), 49);
        assert_eq!(ResultCode::Busy.code(), 51);
        assert_eq!(ResultCode::Canceled.code(), 118);
        assert_eq!(ResultCode::TooLate.code(), 120);
        assert_eq!(ResultCode::CannotCancel.code(), 121);
        assert_eq!(ResultCode::AuthorizationDenied.code(), 123);
    }

    #[test]
    fn test_is_success() {
        assert!(ResultCode::Success.is_success());
        assert!(ResultCode::CompareTrue.is_success());
        assert!(ResultCode::CompareFalse.is_success());
        assert!(!ResultCode::Busy.is_success());
        assert!(!ResultCode::Referral.is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ResultCode::UnwillingToPerform.to_string(),
            "UnwillingToPerform(53)"
        );
    }
}
