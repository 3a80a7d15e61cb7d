//! Distinguished names.
//!
//! A [`Dn`] is an ordered sequence of relative distinguished names (RDNs),
//! most-specific first. Equality, hashing and ordering use a normalized
//! form (lowercased attribute names, case-folded values) while the original
//! text is preserved for display.

use crate::error::CoreError;
use std::fmt;

/// A single relative distinguished name component, e.g. `uid=rogasawara`.
#[derive(Debug, Clone)]
pub struct Rdn {
    /// Attribute type name as written.
    pub attr: String,
    /// Attribute value as written.
    pub value: String,
}

impl Rdn {
    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attr.trim().to_lowercase(),
            self.value.trim().to_lowercase()
        )
    }

    fn text(&self) -> String {
        format!("{}={}", self.attr.trim(), self.value.trim())
    }
}

/// A distinguished name.
///
/// The zero-RDN DN is valid and denotes the root / anonymous identity.
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    normalized: String,
}

impl Dn {
    /// The empty (root) DN.
    #[must_use]
    pub fn root() -> Self {
        Self {
            rdns: Vec::new(),
            normalized: String::new(),
        }
    }

    /// Parse a DN from its string representation.
    ///
    /// Commas escaped with a backslash are treated as part of the value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDnSyntax`] when any RDN is empty or has
    /// no `=` separator.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut rdns = Vec::new();
        for component in split_unescaped(trimmed, ',') {
            let component = component.trim();
            if component.is_empty() {
                return Err(CoreError::InvalidDnSyntax {
                    dn: text.to_string(),
                    reason: "empty RDN component".to_string(),
                });
            }
            let Some(eq) = component.find('=') else {
                return Err(CoreError::InvalidDnSyntax {
                    dn: text.to_string(),
                    reason: "RDN has no attribute/value separator".to_string(),
                });
            };
            let attr = component[..eq].trim();
            let value = component[eq + 1..].trim();
            if attr.is_empty() {
                return Err(CoreError::InvalidDnSyntax {
                    dn: text.to_string(),
                    reason: "RDN has empty attribute type".to_string(),
                });
            }
            rdns.push(Rdn {
                attr: attr.to_string(),
                value: value.replace("\\,", ","),
            });
        }

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let normalized = rdns
            .iter()
            .map(Rdn::normalized)
            .collect::<Vec<_>>()
            .join(",");
        Self { rdns, normalized }
    }

    /// Whether this is the empty root DN.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDN components.
    #[must_use]
    pub fn rdn_count(&self) -> usize {
        self.rdns.len()
    }

    /// RDN components, most-specific first.
    #[must_use]
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The normalized comparison form.
    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// The immediate parent DN, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// Whether `self` is strictly below `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        let n = self.rdns.len();
        let k = ancestor.rdns.len();
        if n <= k {
            return false;
        }
        self.tail_matches(ancestor)
    }

    /// Whether `self` equals `suffix` or sits below it.
    #[must_use]
    pub fn is_under(&self, suffix: &Dn) -> bool {
        self == suffix || self.is_descendant_of(suffix)
    }

    fn tail_matches(&self, suffix: &Dn) -> bool {
        let n = self.rdns.len();
        let k = suffix.rdns.len();
        self.rdns[n - k..]
            .iter()
            .zip(&suffix.rdns)
            .all(|(a, b)| a.normalized() == b.normalized())
    }

    /// Replace the `old_suffix` portion of this DN with `new_suffix`,
    /// preserving the more-specific remainder.
    ///
    /// Used for referral rewriting: a request DN under a reference entry is
    /// rebased onto the reference's stored path. Returns `None` when this
    /// DN is not under `old_suffix`.
    #[must_use]
    pub fn rebase(&self, old_suffix: &Dn, new_suffix: &Dn) -> Option<Dn> {
        if !self.is_under(old_suffix) {
            return None;
        }
        let keep = self.rdns.len() - old_suffix.rdns.len();
        let mut rdns = self.rdns[..keep].to_vec();
        rdns.extend(new_suffix.rdns.iter().cloned());
        Some(Self::from_rdns(rdns))
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .rdns
            .iter()
            .map(|rdn| Rdn {
                attr: rdn.attr.clone(),
                value: rdn.value.replace(',', "\\,"),
            })
            .map(|rdn| rdn.text())
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{text}")
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Dn {}

impl std::hash::Hash for Dn {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl std::str::FromStr for Dn {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A raw DN string paired with its lazily decoded form.
///
/// The decoded value is cached until the raw text is reassigned, at which
/// point the cache is invalidated and the next [`RawDn::resolve`] re-decodes.
#[derive(Debug, Clone, Default)]
pub struct RawDn {
    raw: String,
    cached: Option<Dn>,
}

impl RawDn {
    /// Wrap a raw DN string without decoding it.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            cached: None,
        }
    }

    /// The raw, undecoded text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Reassign the raw text, invalidating any cached decode.
    pub fn set_raw(&mut self, raw: impl Into<String>) {
        self.raw = raw.into();
        self.cached = None;
    }

    /// Decode the raw text, caching the result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDnSyntax`] when the raw text is malformed.
    pub fn resolve(&mut self) -> Result<&Dn, CoreError> {
        if self.cached.is_none() {
            self.cached = Some(Dn::parse(&self.raw)?);
        }
        Ok(self.cached.as_ref().unwrap())
    }

    /// The cached decode, if [`RawDn::resolve`] has run since the last
    /// reassignment.
    #[must_use]
    pub fn cached(&self) -> Option<&Dn> {
        self.cached.as_ref()
    }
}

fn split_unescaped(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in text.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let dn = Dn::parse("uid=rogasawara,o=test").unwrap();
        assert_eq!(dn.rdn_count(), 2);
        assert_eq!(dn.rdns()[0].attr, "uid");
        assert_eq!(dn.rdns()[0].value, "rogasawara");
    }

    #[test]
    fn test_parse_empty_is_root() {
        let dn = Dn::parse("").unwrap();
        assert!(dn.is_root());
        assert_eq!(dn.to_string(), "");
    }

    #[test]
    fn test_parse_rejects_missing_separator() {
        assert!(Dn::parse("no-equals-here").is_err());
        assert!(Dn::parse("uid=ok,bogus").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_component() {
        assert!(Dn::parse("uid=x,,o=test").is_err());
        assert!(Dn::parse("=value,o=test").is_err());
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let a = Dn::parse("CN=Directory Manager").unwrap();
        let b = Dn::parse("cn=directory manager").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "CN=Directory Manager");
    }

    #[test]
    fn test_escaped_comma_in_value() {
        let dn = Dn::parse("cn=Smith\\, Jane,o=test").unwrap();
        assert_eq!(dn.rdn_count(), 2);
        assert_eq!(dn.rdns()[0].value, "Smith, Jane");
        assert_eq!(dn.to_string(), "cn=Smith\\, Jane,o=test");
    }

    #[test]
    fn test_parent() {
        let dn = Dn::parse("uid=x,ou=people,o=test").unwrap();
        let parent = dn.parent().unwrap();
        assert_eq!(parent, Dn::parse("ou=people,o=test").unwrap());
        assert!(Dn::root().parent().is_none());
    }

    #[test]
    fn test_descendant() {
        let child = Dn::parse("uid=x,ou=people,o=test").unwrap();
        let suffix = Dn::parse("o=test").unwrap();
        assert!(child.is_descendant_of(&suffix));
        assert!(!suffix.is_descendant_of(&child));
        assert!(!suffix.is_descendant_of(&suffix));
        assert!(suffix.is_under(&suffix));
    }

    #[test]
    fn test_rebase_preserves_remainder() {
        let dn = Dn::parse("uid=x,ou=people,o=orig").unwrap();
        let old = Dn::parse("o=orig").unwrap();
        let new = Dn::parse("ou=moved,o=remote").unwrap();
        let rebased = dn.rebase(&old, &new).unwrap();
        assert_eq!(rebased, Dn::parse("uid=x,ou=people,ou=moved,o=remote").unwrap());
    }

    #[test]
    fn test_rebase_outside_suffix() {
        let dn = Dn::parse("uid=x,o=other").unwrap();
        let old = Dn::parse("o=orig").unwrap();
        assert!(dn.rebase(&old, &Dn::root()).is_none());
    }

    #[test]
    fn test_raw_dn_cache_invalidation() {
        let mut raw = RawDn::new("uid=x,o=test");
        assert!(raw.cached().is_none());
        let decoded = raw.resolve().unwrap().clone();
        assert_eq!(decoded, Dn::parse("uid=x,o=test").unwrap());
        assert!(raw.cached().is_some());

        raw.set_raw("uid=y,o=test");
        assert!(raw.cached().is_none());
        assert_eq!(
            raw.resolve().unwrap(),
            &Dn::parse("uid=y,o=test").unwrap()
        );
    }

    #[test]
    fn test_raw_dn_resolve_error() {
        let mut raw = RawDn::new("not a dn");
        assert!(raw.resolve().is_err());
    }
}
