//! Hierarchical resource scopes and the coverage rule used by every check.
//!
//! A scope is a colon-delimited path such as `resources:id:42`. The final
//! segment may be the wildcard `*`, in which case the scope covers every
//! deeper scope sharing the preceding segments. The empty scope carries no
//! resource qualifier and covers everything.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rolescope_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const SEPARATOR: char = ':';
const WILDCARD: &str = "*";

/// Returns whether a declared scope covers a requested scope.
///
/// Matching is segment-aligned: `resources:id:*` covers `resources:id:42`
/// but not `resources:idx:42`, and never the bare `resources:id`.
#[must_use]
pub fn covers(declared: &str, requested: &str) -> bool {
    if declared.is_empty() || declared == WILDCARD || declared == requested {
        return true;
    }

    let Some(prefix) = declared.strip_suffix(":*") else {
        return false;
    };

    requested
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(SEPARATOR))
        .is_some_and(|rest| !rest.is_empty())
}

/// A validated resource scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope(String);

impl Scope {
    /// Creates a scope, rejecting empty segments and misplaced wildcards.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Ok(Self(value));
        }

        let segment_count = value.split(SEPARATOR).count();
        for (index, segment) in value.split(SEPARATOR).enumerate() {
            if segment.trim().is_empty() {
                return Err(AppError::Validation(format!(
                    "scope '{value}' contains an empty segment"
                )));
            }

            if segment.contains('*') && (segment != WILDCARD || index + 1 != segment_count) {
                return Err(AppError::Validation(format!(
                    "scope '{value}' may only use '*' as its whole final segment"
                )));
            }
        }

        Ok(Self(value))
    }

    /// Returns the empty scope, used by actions without a resource qualifier.
    #[must_use]
    pub fn global() -> Self {
        Self(String::new())
    }

    /// Builds a scope for one resource, e.g. `users:id:7`.
    pub fn for_resource(kind: &str, attribute: &str, identifier: &str) -> AppResult<Self> {
        Self::new(format!("{kind}{SEPARATOR}{attribute}{SEPARATOR}{identifier}"))
    }

    /// Returns the underlying scope string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns whether this is the empty scope.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns whether this scope, used as a declared scope, covers `requested`.
    #[must_use]
    pub fn covers(&self, requested: &Scope) -> bool {
        covers(self.as_str(), requested.as_str())
    }

    /// Returns every declared scope that covers this scope, sorted.
    ///
    /// Stores use this to turn a coverage check into an exact-match lookup.
    #[must_use]
    pub fn wildcard_ancestors(&self) -> Vec<Scope> {
        let mut candidates = vec![Self::global(), Self(WILDCARD.to_owned())];
        if self.is_global() {
            return candidates;
        }

        let segments: Vec<&str> = self.0.split(SEPARATOR).collect();
        for end in 1..segments.len() {
            candidates.push(Self(format!("{}:{WILDCARD}", segments[..end].join(":"))));
        }
        candidates.push(self.clone());

        candidates.sort();
        candidates.dedup();
        candidates
    }
}

impl Display for Scope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl FromStr for Scope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for Scope {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Scope> for String {
    fn from(value: Scope) -> Self {
        value.0
    }
}
