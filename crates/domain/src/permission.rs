use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rolescope_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{RoleId, Scope};

/// Action identifier such as `resources:action1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Action(String);

impl Action {
    /// Creates a validated action.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation("action must not be empty".to_owned()));
        }

        if value.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(format!(
                "action '{value}' must not contain whitespace"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the underlying action string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns whether the action starts with the given prefix.
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl Display for Action {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for Action {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        value.0
    }
}

/// An action paired with the scope it applies to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    action: Action,
    scope: Scope,
}

impl Permission {
    /// Creates a permission from already validated parts.
    #[must_use]
    pub fn new(action: Action, scope: Scope) -> Self {
        Self { action, scope }
    }

    /// Parses and validates both parts.
    pub fn parse(action: &str, scope: &str) -> AppResult<Self> {
        Ok(Self::new(Action::new(action)?, Scope::new(scope)?))
    }

    /// Creates a permission without resource qualifier.
    #[must_use]
    pub fn global(action: Action) -> Self {
        Self::new(action, Scope::global())
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Returns the declared scope.
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Persisted permission row owned by one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    /// Owning role.
    pub role_id: RoleId,
    /// Action and scope pair.
    pub permission: Permission,
    /// Creation timestamp.
    pub created: DateTime<Utc>,
    /// Last update timestamp.
    pub updated: DateTime<Utc>,
}

impl PermissionRecord {
    /// Creates a row stamped with the given time for both timestamps.
    #[must_use]
    pub fn new(role_id: RoleId, permission: Permission, now: DateTime<Utc>) -> Self {
        Self {
            role_id,
            permission,
            created: now,
            updated: now,
        }
    }
}

/// Resolved union of every permission a user holds in one organization.
///
/// Keys and scopes are ordered, so two resolutions over the same data compare
/// equal and iterate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissions(BTreeMap<Action, BTreeSet<Scope>>);

impl EffectivePermissions {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a permission. Returns `false` when the pair was already present.
    pub fn insert(&mut self, permission: Permission) -> bool {
        let Permission { action, scope } = permission;
        self.0.entry(action).or_default().insert(scope)
    }

    /// Merges another set into this one.
    pub fn merge(&mut self, other: &EffectivePermissions) {
        for (action, scopes) in &other.0 {
            self.0
                .entry(action.clone())
                .or_default()
                .extend(scopes.iter().cloned());
        }
    }

    /// Returns the scopes held for an action.
    #[must_use]
    pub fn scopes(&self, action: &Action) -> Option<&BTreeSet<Scope>> {
        self.0.get(action)
    }

    /// Returns whether any held scope for `action` covers `requested`.
    #[must_use]
    pub fn allows(&self, action: &Action, requested: &Scope) -> bool {
        self.scopes(action)
            .is_some_and(|scopes| scopes.iter().any(|scope| scope.covers(requested)))
    }

    /// Returns whether the exact pair is held.
    #[must_use]
    pub fn contains(&self, permission: &Permission) -> bool {
        self.scopes(permission.action())
            .is_some_and(|scopes| scopes.contains(permission.scope()))
    }

    /// Returns whether no permission is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of distinct (action, scope) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    /// Iterates over every pair ordered by action then scope.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().flat_map(|(action, scopes)| {
            scopes
                .iter()
                .map(|scope| Permission::new(action.clone(), scope.clone()))
        })
    }

    /// Returns every pair ordered by action then scope.
    #[must_use]
    pub fn to_permissions(&self) -> Vec<Permission> {
        self.iter().collect()
    }
}

impl FromIterator<Permission> for EffectivePermissions {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        let mut permissions = Self::new();
        for permission in iter {
            permissions.insert(permission);
        }
        permissions
    }
}

impl Extend<Permission> for EffectivePermissions {
    fn extend<T: IntoIterator<Item = Permission>>(&mut self, iter: T) {
        for permission in iter {
            self.insert(permission);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, EffectivePermissions, Permission};
    use crate::Scope;

    fn permission(action: &str, scope: &str) -> Permission {
        match Permission::parse(action, scope) {
            Ok(permission) => permission,
            Err(error) => panic!("invalid test permission: {error}"),
        }
    }

    #[test]
    fn action_rejects_blank_and_whitespace() {
        assert!(Action::new("  ").is_err());
        assert!(Action::new("users:read all").is_err());
        assert!(Action::new("users:read").is_ok());
    }

    #[test]
    fn merging_is_idempotent() {
        let mut permissions = EffectivePermissions::new();
        assert!(permissions.insert(permission("resources:read", "resources:id:1")));
        assert!(!permissions.insert(permission("resources:read", "resources:id:1")));

        let snapshot = permissions.clone();
        permissions.merge(&snapshot);

        assert_eq!(permissions, snapshot);
        assert_eq!(permissions.len(), 1);
    }

    #[test]
    fn wildcard_and_narrow_scopes_are_both_kept() {
        let permissions: EffectivePermissions = [
            permission("resources:read", "resources:id:*"),
            permission("resources:read", "resources:id:3"),
        ]
        .into_iter()
        .collect();

        assert_eq!(permissions.len(), 2);
        let requested = Scope::new("resources:id:9").unwrap_or_default();
        let action = Action::new("resources:read");
        assert!(action.is_ok_and(|action| permissions.allows(&action, &requested)));
    }

    #[test]
    fn iteration_is_sorted_by_action_then_scope() {
        let permissions: EffectivePermissions = [
            permission("b:write", ""),
            permission("a:read", "x:id:2"),
            permission("a:read", "x:id:1"),
        ]
        .into_iter()
        .collect();

        let flattened: Vec<(String, String)> = permissions
            .iter()
            .map(|value| {
                (
                    value.action().as_str().to_owned(),
                    value.scope().as_str().to_owned(),
                )
            })
            .collect();

        assert_eq!(
            flattened,
            vec![
                ("a:read".to_owned(), "x:id:1".to_owned()),
                ("a:read".to_owned(), "x:id:2".to_owned()),
                ("b:write".to_owned(), String::new()),
            ]
        );
    }
}
