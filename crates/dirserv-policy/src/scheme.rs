//! Password storage schemes.
//!
//! Stored password values are prefix-tagged with the scheme that encoded
//! them: `{CLEAR}secret` or `{ARGON2}$argon2id$...`. Argon2id parameters
//! follow the OWASP 2024 recommendation.

use crate::error::PolicyError;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use subtle::ConstantTimeEq;

/// A password storage scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScheme {
    /// Clear-text storage. Comparison is constant-time.
    ClearText,
    /// Argon2id in PHC string format.
    Argon2id,
}

impl StorageScheme {
    /// The tag this scheme prefixes onto stored values.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::ClearText => "{CLEAR}",
            Self::Argon2id => "{ARGON2}",
        }
    }

    /// Recognize the scheme of a stored, tagged value.
    #[must_use]
    pub fn of_stored(stored: &str) -> Option<(Self, &str)> {
        for scheme in [Self::ClearText, Self::Argon2id] {
            if let Some(rest) = stored.strip_prefix(scheme.tag()) {
                return Some((scheme, rest));
            }
        }
        None
    }

    /// Encode a plain-text password under this scheme, tag included.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::HashingFailed`] when Argon2 hashing fails.
    pub fn encode(self, plain: &str) -> Result<String, PolicyError> {
        match self {
            Self::ClearText => Ok(format!("{}{plain}", self.tag())),
            Self::Argon2id => {
                let salt = SaltString::generate(&mut OsRng);
                let hash = argon2()
                    .hash_password(plain.as_bytes(), &salt)
                    .map_err(|e| PolicyError::HashingFailed(e.to_string()))?;
                Ok(format!("{}{hash}", self.tag()))
            }
        }
    }
}

/// Verify a plain-text password against a tagged stored value.
///
/// # Errors
///
/// Returns [`PolicyError::UnknownScheme`] when the stored value carries no
/// recognized tag.
pub fn verify(plain: &str, stored: &str) -> Result<bool, PolicyError> {
    let Some((scheme, body)) = StorageScheme::of_stored(stored) else {
        return Err(PolicyError::UnknownScheme);
    };
    match scheme {
        StorageScheme::ClearText => {
            Ok(plain.as_bytes().ct_eq(body.as_bytes()).into())
        }
        StorageScheme::Argon2id => {
            let Ok(parsed) = PasswordHash::new(body) else {
                return Ok(false);
            };
            match argon2().verify_password(plain.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(_) => Ok(false),
            }
        }
    }
}

fn argon2() -> Argon2<'static> {
    // OWASP 2024 parameters: m=19456 KiB, t=2, p=1. Constants are always
    // valid; a failure here is an argon2 library bug.
    let params =
        Params::new(19456, 2, 1, None).expect("OWASP 2024 Argon2 parameters are valid constants");
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_text_round_trip() {
        let stored = StorageScheme::ClearText.encode("password").unwrap();
        assert_eq!(stored, "{CLEAR}password");
        assert!(verify("password", &stored).unwrap());
        assert!(!verify("wrong", &stored).unwrap());
    }

    #[test]
    fn test_argon2_round_trip() {
        let stored = StorageScheme::Argon2id.encode("password").unwrap();
        assert!(stored.starts_with("{ARGON2}$argon2id$"));
        assert!(verify("password", &stored).unwrap());
        assert!(!verify("wrong", &stored).unwrap());
    }

    #[test]
    fn test_untagged_value_rejected() {
        assert!(matches!(
            verify("password", "password"),
            Err(PolicyError::UnknownScheme)
        ));
    }

    #[test]
    fn test_of_stored() {
        let (scheme, body) = StorageScheme::of_stored("{CLEAR}x").unwrap();
        assert_eq!(scheme, StorageScheme::ClearText);
        assert_eq!(body, "x");
        assert!(StorageScheme::of_stored("{SSHA}x").is_none());
    }

    #[test]
    fn test_clear_text_empty_password() {
        let stored = StorageScheme::ClearText.encode("").unwrap();
        assert!(verify("", &stored).unwrap());
        assert!(!verify("x", &stored).unwrap());
    }
}
