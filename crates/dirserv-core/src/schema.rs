//! Minimal attribute schema.
//!
//! The pipeline only needs to know which attribute types exist and which
//! equality rule each one uses. Full syntax/objectclass resolution belongs
//! to the schema subsystem, which is outside this crate.

use std::collections::HashMap;

/// Equality matching rule applied when comparing attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingRule {
    /// Case-insensitive, whitespace-trimmed match (directory strings).
    CaseIgnore,
    /// Case-sensitive match.
    CaseExact,
    /// Byte-for-byte match (octet strings, e.g. userPassword).
    OctetString,
}

impl MatchingRule {
    /// Evaluate the rule over two values.
    #[must_use]
    pub fn matches(self, stored: &str, assertion: &str) -> bool {
        match self {
            Self::CaseIgnore => {
                stored.trim().eq_ignore_ascii_case(assertion.trim())
            }
            Self::CaseExact => stored.trim() == assertion.trim(),
            Self::OctetString => stored == assertion,
        }
    }
}

/// Registry of known attribute types and their equality rules.
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: HashMap<String, MatchingRule>,
}

impl Default for Schema {
    fn default() -> Self {
        let mut schema = Self {
            attributes: HashMap::new(),
        };
        for name in [
            "objectclass",
            "cn",
            "sn",
            "givenname",
            "uid",
            "ou",
            "o",
            "dc",
            "mail",
            "description",
            "displayname",
            "member",
            "uniquemember",
            "preferredlanguage",
            "telephonenumber",
            "title",
            "l",
            "st",
            "street",
            "postalcode",
            "ref",
        ] {
            schema.register(name, MatchingRule::CaseIgnore);
        }
        schema.register("userpassword", MatchingRule::OctetString);
        schema.register("employeenumber", MatchingRule::CaseExact);
        schema
    }
}

impl Schema {
    /// Register an attribute type with its equality rule.
    pub fn register(&mut self, name: &str, rule: MatchingRule) {
        self.attributes.insert(name.to_lowercase(), rule);
    }

    /// Look up the equality rule for an attribute type, `None` when the
    /// type is not defined.
    #[must_use]
    pub fn matching_rule(&self, name: &str) -> Option<MatchingRule> {
        self.attributes.get(&name.to_lowercase()).copied()
    }

    /// Whether the attribute type is defined.
    #[must_use]
    pub fn is_defined(&self, name: &str) -> bool {
        self.attributes.contains_key(&name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_knows_common_types() {
        let schema = Schema::default();
        assert!(schema.is_defined("uid"));
        assert!(schema.is_defined("UID"));
        assert!(!schema.is_defined("frobnicator"));
    }

    #[test]
    fn test_case_ignore_rule() {
        assert!(MatchingRule::CaseIgnore.matches("Rogasawara", " rogasawara "));
        assert!(!MatchingRule::CaseIgnore.matches("a", "b"));
    }

    #[test]
    fn test_octet_rule_is_exact() {
        assert!(MatchingRule::OctetString.matches("secret", "secret"));
        assert!(!MatchingRule::OctetString.matches("Secret", "secret"));
        assert!(!MatchingRule::OctetString.matches(" secret", "secret"));
    }

    #[test]
    fn test_register_custom_attribute() {
        let mut schema = Schema::default();
        schema.register("x-custom", MatchingRule::CaseExact);
        assert_eq!(
            schema.matching_rule("X-Custom"),
            Some(MatchingRule::CaseExact)
        );
    }
}
