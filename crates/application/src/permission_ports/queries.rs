use rolescope_core::UserId;
use rolescope_domain::{Action, Permission, RoleId, Scope, SearchOptions};

/// Action filter pushed down to the store by batched permission queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFilter {
    /// Every action.
    Any,
    /// Actions starting with the prefix.
    Prefix(String),
    /// One action, optionally restricted to the listed declared scopes.
    Exact {
        /// Action to match.
        action: Action,
        /// Declared scopes to keep. `None` keeps every scope.
        scopes: Option<Vec<Scope>>,
    },
}

impl ActionFilter {
    /// Builds the store filter for validated search options.
    ///
    /// A requested scope becomes the list of declared scopes able to cover it,
    /// so stores only read the matching rows.
    #[must_use]
    pub fn from_options(options: &SearchOptions) -> Self {
        if let Some(prefix) = &options.action_prefix {
            return Self::Prefix(prefix.clone());
        }

        match &options.action {
            Some(action) => Self::Exact {
                action: action.clone(),
                scopes: options.scope.as_ref().map(Scope::wildcard_ancestors),
            },
            None => Self::Any,
        }
    }

    /// Returns whether a stored permission passes the filter.
    #[must_use]
    pub fn matches(&self, permission: &Permission) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => permission.action().has_prefix(prefix),
            Self::Exact { action, scopes } => {
                permission.action() == action
                    && scopes
                        .as_ref()
                        .is_none_or(|scopes| scopes.contains(permission.scope()))
            }
        }
    }
}

/// Batched permission query over every user role of an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionQuery {
    /// Action filter.
    pub action: ActionFilter,
    /// Optional single-user restriction.
    pub user_id: Option<UserId>,
}

impl PermissionQuery {
    /// Queries every permission held by one user through role assignments.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            action: ActionFilter::Any,
            user_id: Some(user_id),
        }
    }
}

/// Permission reached by a user through one of its role assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermissionRow {
    /// User holding the assignment.
    pub user_id: UserId,
    /// Role carrying the permission.
    pub role_id: RoleId,
    /// Action and scope pair.
    pub permission: Permission,
}

#[cfg(test)]
mod tests {
    use rolescope_domain::{Action, Permission, Scope, SearchOptions};

    use super::ActionFilter;

    #[test]
    fn scoped_search_becomes_candidate_scope_lookup() {
        let Ok(action) = Action::new("resources:action2") else {
            panic!("invalid action");
        };
        let options = SearchOptions::by_action(action, Scope::new("resources:id:1").ok());
        let filter = ActionFilter::from_options(&options);

        let allowed = ["", "*", "resources:*", "resources:id:*", "resources:id:1"];
        for scope in allowed {
            let permission = Permission::parse("resources:action2", scope);
            assert!(permission.is_ok_and(|permission| filter.matches(&permission)));
        }

        let other = Permission::parse("resources:action2", "resources:id:2");
        assert!(other.is_ok_and(|permission| !filter.matches(&permission)));
    }

    #[test]
    fn prefix_search_keeps_every_scope() {
        let filter = ActionFilter::from_options(&SearchOptions::by_action_prefix("resources:"));
        let permission = Permission::parse("resources:action2", "resources:id:99");
        assert!(permission.is_ok_and(|permission| filter.matches(&permission)));
    }
}
