// ABOUTME: Scope set type and the pluggable scope-comparison predicate
// ABOUTME: Default matching is exact set membership; hierarchical schemes plug in via ScopeMatcher
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 oauth2-provider-core contributors

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A set of string capability tokens attached to an authorization.
///
/// Parsed from and formatted as the protocol's space-separated form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(BTreeSet<String>);

impl Scope {
    /// The empty scope
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a space-separated scope string
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split_whitespace()
                .map(std::string::ToString::to_string)
                .collect(),
        )
    }

    /// Exact set membership
    #[must_use]
    pub fn contains(&self, capability: &str) -> bool {
        self.0.contains(capability)
    }

    /// Whether no capabilities are granted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over granted capabilities
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for capability in &self.0 {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{capability}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<String> for Scope {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Scope-comparison predicate.
///
/// The matching rule is a policy decision of the embedding application
/// (exact string match, hierarchical prefix match, ...), so the validator
/// takes it as an injected trait object.
pub trait ScopeMatcher: Send + Sync {
    /// Whether the granted scope satisfies one required capability
    fn satisfies(&self, granted: &Scope, required: &str) -> bool;
}

/// Exact string-set membership, the default policy
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactScopeMatcher;

impl ScopeMatcher for ExactScopeMatcher {
    fn satisfies(&self, granted: &Scope, required: &str) -> bool {
        granted.contains(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format_round_trip() {
        let scope = Scope::parse("activities:read  profile:read");
        assert!(scope.contains("activities:read"));
        assert!(scope.contains("profile:read"));
        assert!(!scope.contains("profile:write"));
        assert_eq!(scope.to_string(), "activities:read profile:read");
    }

    #[test]
    fn test_empty_scope() {
        assert!(Scope::parse("").is_empty());
        assert_eq!(Scope::empty().to_string(), "");
    }

    #[test]
    fn test_exact_matcher_is_membership() {
        let matcher = ExactScopeMatcher;
        let granted = Scope::parse("read write");
        assert!(matcher.satisfies(&granted, "read"));
        assert!(!matcher.satisfies(&granted, "admin"));
        // No hierarchy in the default policy
        assert!(!matcher.satisfies(&granted, "rea"));
    }
}
