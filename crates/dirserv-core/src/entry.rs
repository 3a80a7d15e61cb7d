//! Entries and attributes.

use crate::dn::Dn;
use crate::error::CoreError;
use crate::schema::{MatchingRule, Schema};
use std::fmt;

/// An attribute type name plus its ordered `;option` tags, e.g.
/// `cn;lang-ja`. Both the base name and the options compare
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct AttributeDescription {
    /// Base attribute type name as written.
    pub name: String,
    /// Option tags, in the order written.
    pub options: Vec<String>,
}

impl AttributeDescription {
    /// Parse from `name;opt1;opt2` form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAttributeDescription`] when the base
    /// name or any option is empty.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let mut parts = text.split(';');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(CoreError::InvalidAttributeDescription {
                text: text.to_string(),
            });
        }
        let mut options = Vec::new();
        for option in parts {
            let option = option.trim();
            if option.is_empty() {
                return Err(CoreError::InvalidAttributeDescription {
                    text: text.to_string(),
                });
            }
            options.push(option.to_string());
        }
        Ok(Self {
            name: name.to_string(),
            options,
        })
    }

    /// Plain description with no options.
    #[must_use]
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    /// Whether the base names match, ignoring case.
    #[must_use]
    pub fn same_type(&self, other: &AttributeDescription) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }

    /// Whether every option requested here is present on `stored`,
    /// ignoring case. An option-free request matches any stored variant.
    #[must_use]
    pub fn options_subset_of(&self, stored: &AttributeDescription) -> bool {
        self.options.iter().all(|requested| {
            stored
                .options
                .iter()
                .any(|held| held.eq_ignore_ascii_case(requested))
        })
    }
}

impl fmt::Display for AttributeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for option in &self.options {
            write!(f, ";{option}")?;
        }
        Ok(())
    }
}

/// An attribute: description plus its values.
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Description (type name + options).
    pub description: AttributeDescription,
    /// Values in storage order.
    pub values: Vec<String>,
}

impl Attribute {
    /// Build an attribute from a description string and values.
    ///
    /// # Errors
    ///
    /// Propagates description parse failures.
    pub fn new(
        description: &str,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            description: AttributeDescription::parse(description)?,
            values: values.into_iter().map(Into::into).collect(),
        })
    }
}

/// A directory entry: a DN plus attributes.
#[derive(Debug, Clone)]
pub struct Entry {
    dn: Dn,
    attributes: Vec<Attribute>,
}

impl Entry {
    /// Create an empty entry at `dn`.
    #[must_use]
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: Vec::new(),
        }
    }

    /// The entry's DN.
    #[must_use]
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    /// All attributes.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Add an attribute, keeping any existing ones with the same type.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Builder-style attribute addition.
    ///
    /// # Errors
    ///
    /// Propagates description parse failures.
    pub fn with_attribute(
        mut self,
        description: &str,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, CoreError> {
        self.add_attribute(Attribute::new(description, values)?);
        Ok(self)
    }

    /// Attributes whose type matches `requested` and which carry every
    /// option `requested` names.
    #[must_use]
    pub fn matching_attributes(
        &self,
        requested: &AttributeDescription,
    ) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|attr| {
                requested.same_type(&attr.description)
                    && requested.options_subset_of(&attr.description)
            })
            .collect()
    }

    /// First value of the named attribute, options ignored.
    #[must_use]
    pub fn first_value(&self, name: &str) -> Option<&str> {
        let requested = AttributeDescription::simple(name);
        self.matching_attributes(&requested)
            .into_iter()
            .flat_map(|attr| attr.values.iter())
            .next()
            .map(String::as_str)
    }

    /// All values of the named attribute, options ignored.
    #[must_use]
    pub fn values(&self, name: &str) -> Vec<&str> {
        let requested = AttributeDescription::simple(name);
        self.matching_attributes(&requested)
            .into_iter()
            .flat_map(|attr| attr.values.iter())
            .map(String::as_str)
            .collect()
    }

    /// Whether any value under `requested` matches `assertion` using the
    /// schema's equality rule for that type.
    #[must_use]
    pub fn has_matching_value(
        &self,
        schema: &Schema,
        requested: &AttributeDescription,
        assertion: &str,
    ) -> bool {
        let rule = schema
            .matching_rule(&requested.name)
            .unwrap_or(MatchingRule::CaseIgnore);
        self.matching_attributes(requested)
            .iter()
            .flat_map(|attr| attr.values.iter())
            .any(|value| rule.matches(value, assertion))
    }

    /// Whether this entry is a referral (`objectClass: referral`).
    #[must_use]
    pub fn is_referral(&self) -> bool {
        self.values("objectclass")
            .iter()
            .any(|oc| oc.eq_ignore_ascii_case("referral"))
    }

    /// Referral target URLs from the `ref` attribute.
    #[must_use]
    pub fn ref_urls(&self) -> Vec<&str> {
        self.values("ref")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> Entry {
        Entry::new(Dn::parse("uid=rogasawara,o=test").unwrap())
            .with_attribute("objectClass", ["top", "person", "inetOrgPerson"])
            .unwrap()
            .with_attribute("uid", ["rogasawara"])
            .unwrap()
            .with_attribute("cn;lang-ja", ["小笠原"])
            .unwrap()
            .with_attribute("cn", ["Rodney Ogasawara"])
            .unwrap()
    }

    #[test]
    fn test_description_parse() {
        let desc = AttributeDescription::parse("cn;lang-ja;phonetic").unwrap();
        assert_eq!(desc.name, "cn");
        assert_eq!(desc.options, vec!["lang-ja", "phonetic"]);
    }

    #[test]
    fn test_description_parse_rejects_empty() {
        assert!(AttributeDescription::parse("").is_err());
        assert!(AttributeDescription::parse("cn;").is_err());
        assert!(AttributeDescription::parse(";lang-ja").is_err());
    }

    #[test]
    fn test_matching_attributes_respects_options() {
        let entry = sample_entry();
        let tagged = AttributeDescription::parse("cn;lang-ja").unwrap();
        let matches = entry.matching_attributes(&tagged);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].values, vec!["小笠原"]);

        let untagged = AttributeDescription::simple("cn");
        assert_eq!(entry.matching_attributes(&untagged).len(), 2);
    }

    #[test]
    fn test_options_case_insensitive() {
        let entry = sample_entry();
        let tagged = AttributeDescription::parse("CN;LANG-JA").unwrap();
        assert_eq!(entry.matching_attributes(&tagged).len(), 1);
    }

    #[test]
    fn test_has_matching_value_uses_rule() {
        let entry = sample_entry();
        let schema = Schema::default();
        let uid = AttributeDescription::simple("uid");
        assert!(entry.has_matching_value(&schema, &uid, "ROGASAWARA"));
        assert!(!entry.has_matching_value(&schema, &uid, "someone-else"));
    }

    #[test]
    fn test_referral_detection() {
        let entry = Entry::new(Dn::parse("ou=refs,o=test").unwrap())
            .with_attribute("objectClass", ["referral", "extensibleObject"])
            .unwrap()
            .with_attribute("ref", ["ldap://remote:389/o=remote"])
            .unwrap();
        assert!(entry.is_referral());
        assert_eq!(entry.ref_urls(), vec!["ldap://remote:389/o=remote"]);
        assert!(!sample_entry().is_referral());
    }
}
