use std::collections::HashMap;

use rolescope_core::{AppResult, OrgId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Action, EffectivePermissions, Scope};

/// Action required to read other users' permissions.
pub const ACTION_USERS_PERMISSIONS_READ: &str = "users:permissions:read";

/// Returns the scope identifying one user, e.g. `users:id:7`.
pub fn user_scope(user_id: UserId) -> AppResult<Scope> {
    Scope::for_resource("users", "id", user_id.to_string().as_str())
}

/// Authenticated caller with the permissions it holds per organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
    user_id: UserId,
    org_id: OrgId,
    permissions: HashMap<OrgId, EffectivePermissions>,
}

impl SignedInUser {
    /// Creates a caller without any permission loaded.
    #[must_use]
    pub fn new(user_id: UserId, org_id: OrgId) -> Self {
        Self {
            user_id,
            org_id,
            permissions: HashMap::new(),
        }
    }

    /// Attaches the caller's resolved permissions for one organization.
    #[must_use]
    pub fn with_permissions(mut self, org_id: OrgId, permissions: EffectivePermissions) -> Self {
        self.permissions.insert(org_id, permissions);
        self
    }

    /// Returns the caller's user id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the organization the caller is currently acting in.
    #[must_use]
    pub fn org_id(&self) -> OrgId {
        self.org_id
    }

    /// Returns the caller's permissions in an organization.
    #[must_use]
    pub fn permissions_in(&self, org_id: OrgId) -> Option<&EffectivePermissions> {
        self.permissions.get(&org_id)
    }

    /// Returns whether the caller may perform `action` on `scope` in `org_id`.
    #[must_use]
    pub fn can(&self, org_id: OrgId, action: &Action, scope: &Scope) -> bool {
        self.permissions_in(org_id)
            .is_some_and(|permissions| permissions.allows(action, scope))
    }
}
