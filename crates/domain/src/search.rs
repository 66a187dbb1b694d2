use rolescope_core::{AppError, AppResult, UserId};
use serde::{Deserialize, Serialize};

use crate::{Action, Permission, Scope};

/// Filter for searching many users' permissions at once.
///
/// Either `action_prefix` or `action` must be set, never both. `scope` narrows
/// an `action` search to permissions whose declared scope covers it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Match actions starting with this prefix.
    pub action_prefix: Option<String>,
    /// Match this action exactly.
    pub action: Option<Action>,
    /// Requested scope that matching permissions must cover.
    pub scope: Option<Scope>,
    /// Restrict the search to one user.
    pub user_id: Option<UserId>,
}

impl SearchOptions {
    /// Searches every action starting with `prefix`.
    #[must_use]
    pub fn by_action_prefix(prefix: impl Into<String>) -> Self {
        Self {
            action_prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Searches one action, optionally narrowed to a requested scope.
    #[must_use]
    pub fn by_action(action: Action, scope: Option<Scope>) -> Self {
        Self {
            action: Some(action),
            scope,
            ..Self::default()
        }
    }

    /// Restricts the search to one user.
    #[must_use]
    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Checks that the filter combination is meaningful.
    ///
    /// A blank prefix is rejected rather than ignored, since it would match
    /// every action.
    pub fn validate(&self) -> AppResult<()> {
        let prefix = self.action_prefix.as_deref();
        if prefix.is_some_and(|prefix| prefix.trim().is_empty()) {
            return Err(AppError::Validation(
                "search action prefix must not be empty".to_owned(),
            ));
        }

        match (prefix, &self.action) {
            (None, None) => Err(AppError::Validation(
                "search requires either an action prefix or an action".to_owned(),
            )),
            (Some(_), Some(_)) => Err(AppError::Validation(
                "search accepts an action prefix or an action, not both".to_owned(),
            )),
            (Some(_), None) if self.scope.is_some() => Err(AppError::Validation(
                "search scope can only be combined with an exact action".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    /// Returns whether a declared permission satisfies the filter.
    #[must_use]
    pub fn matches(&self, permission: &Permission) -> bool {
        if let Some(prefix) = &self.action_prefix {
            return permission.action().has_prefix(prefix);
        }

        let Some(action) = &self.action else {
            return false;
        };
        if permission.action() != action {
            return false;
        }

        self.scope
            .as_ref()
            .is_none_or(|requested| permission.scope().covers(requested))
    }
}
