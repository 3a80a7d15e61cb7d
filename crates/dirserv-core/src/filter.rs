//! Search filters.
//!
//! Only the filter shapes the pipeline itself needs (the LDAP-assertion
//! control payload): presence, equality, and the boolean combinators.

use crate::entry::{AttributeDescription, Entry};
use crate::error::CoreError;
use crate::schema::Schema;

/// A search filter.
#[derive(Debug, Clone)]
pub enum Filter {
    /// `(attr=*)`
    Present(AttributeDescription),
    /// `(attr=value)`
    Equality(AttributeDescription, String),
    /// `(&(f1)(f2)...)`
    And(Vec<Filter>),
    /// `(|(f1)(f2)...)`
    Or(Vec<Filter>),
    /// `(!(f))`
    Not(Box<Filter>),
}

impl Filter {
    /// Parse a filter from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFilter`] on malformed input.
    pub fn parse(text: &str) -> Result<Self, CoreError> {
        let trimmed = text.trim();
        let inner = strip_parens(trimmed).ok_or_else(|| invalid(text, "not parenthesized"))?;
        Self::parse_inner(text, inner)
    }

    fn parse_inner(original: &str, inner: &str) -> Result<Self, CoreError> {
        match inner.chars().next() {
            Some('&') => Ok(Self::And(Self::parse_list(original, &inner[1..])?)),
            Some('|') => Ok(Self::Or(Self::parse_list(original, &inner[1..])?)),
            Some('!') => {
                let mut parts = Self::parse_list(original, &inner[1..])?;
                if parts.len() != 1 {
                    return Err(invalid(original, "NOT takes exactly one component"));
                }
                Ok(Self::Not(Box::new(parts.remove(0))))
            }
            Some(_) => {
                let eq = inner
                    .find('=')
                    .ok_or_else(|| invalid(original, "no '=' in component"))?;
                let attr = AttributeDescription::parse(&inner[..eq]).map_err(|_| {
                    invalid(original, "bad attribute description")
                })?;
                let value = &inner[eq + 1..];
                if value == "*" {
                    Ok(Self::Present(attr))
                } else {
                    Ok(Self::Equality(attr, value.to_string()))
                }
            }
            None => Err(invalid(original, "empty component")),
        }
    }

    fn parse_list(original: &str, mut rest: &str) -> Result<Vec<Filter>, CoreError> {
        let mut filters = Vec::new();
        while !rest.is_empty() {
            let end = component_end(rest).ok_or_else(|| invalid(original, "unbalanced parens"))?;
            filters.push(Self::parse(&rest[..=end])?);
            rest = &rest[end + 1..];
        }
        if filters.is_empty() {
            return Err(invalid(original, "empty component list"));
        }
        Ok(filters)
    }

    /// Evaluate this filter against an entry.
    #[must_use]
    pub fn matches(&self, schema: &Schema, entry: &Entry) -> bool {
        match self {
            Self::Present(attr) => !entry.matching_attributes(attr).is_empty(),
            Self::Equality(attr, value) => entry.has_matching_value(schema, attr, value),
            Self::And(parts) => parts.iter().all(|f| f.matches(schema, entry)),
            Self::Or(parts) => parts.iter().any(|f| f.matches(schema, entry)),
            Self::Not(inner) => !inner.matches(schema, entry),
        }
    }
}

fn invalid(text: &str, reason: &str) -> CoreError {
    CoreError::InvalidFilter {
        text: text.to_string(),
        reason: reason.to_string(),
    }
}

fn strip_parens(text: &str) -> Option<&str> {
    let rest = text.strip_prefix('(')?;
    let end = component_end(text)?;
    if end + 1 != text.len() {
        return None;
    }
    Some(&rest[..rest.len() - 1])
}

/// Index of the `)` closing the component that starts at byte 0.
fn component_end(text: &str) -> Option<usize> {
    if !text.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::Dn;

    fn entry() -> Entry {
        Entry::new(Dn::parse("uid=test,o=test").unwrap())
            .with_attribute("uid", ["test"])
            .unwrap()
            .with_attribute("cn", ["Test User"])
            .unwrap()
    }

    #[test]
    fn test_equality_filter() {
        let filter = Filter::parse("(uid=test)").unwrap();
        assert!(filter.matches(&Schema::default(), &entry()));

        let filter = Filter::parse("(uid=other)").unwrap();
        assert!(!filter.matches(&Schema::default(), &entry()));
    }

    #[test]
    fn test_presence_filter() {
        let filter = Filter::parse("(cn=*)").unwrap();
        assert!(filter.matches(&Schema::default(), &entry()));

        let filter = Filter::parse("(mail=*)").unwrap();
        assert!(!filter.matches(&Schema::default(), &entry()));
    }

    #[test]
    fn test_and_or_not() {
        let schema = Schema::default();
        let filter = Filter::parse("(&(uid=test)(cn=Test User))").unwrap();
        assert!(filter.matches(&schema, &entry()));

        let filter = Filter::parse("(|(uid=nope)(cn=Test User))").unwrap();
        assert!(filter.matches(&schema, &entry()));

        let filter = Filter::parse("(!(uid=test))").unwrap();
        assert!(!filter.matches(&schema, &entry()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Filter::parse("uid=test").is_err());
        assert!(Filter::parse("(uid=test").is_err());
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(!(a=1)(b=2))").is_err());
        assert!(Filter::parse("(novalue)").is_err());
    }
}
