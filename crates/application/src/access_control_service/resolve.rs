use tracing::{debug, warn};

use rolescope_core::{AppResult, OrgId, UserId};
use rolescope_domain::{Action, EffectivePermissions, Scope};

use crate::PermissionQuery;

use super::AccessControlService;

impl AccessControlService {
    /// Resolves every permission a user holds in an organization.
    ///
    /// Combines the permissions granted to the user's basic role (fixed roles
    /// included, through inheritance) with those of every role assigned to the
    /// user, managed roles included. A user without roles resolves to an empty
    /// set.
    pub async fn resolve(&self, org_id: OrgId, user_id: UserId) -> AppResult<EffectivePermissions> {
        let memberships = self
            .store
            .list_org_memberships(org_id, Some(user_id))
            .await?;

        let mut permissions = EffectivePermissions::new();
        for membership in &memberships {
            match self.registry.basic_role_permissions(&membership.basic_role) {
                Some(basic_permissions) => permissions.merge(basic_permissions),
                None => warn!(
                    org_id = %org_id,
                    user_id = %user_id,
                    basic_role = %membership.basic_role,
                    "membership references an unregistered basic role"
                ),
            }
        }

        let rows = self
            .store
            .query_permissions_by_org_and_action(org_id, &PermissionQuery::for_user(user_id))
            .await?;
        permissions.extend(rows.into_iter().map(|row| row.permission));

        debug!(
            org_id = %org_id,
            user_id = %user_id,
            permissions = permissions.len(),
            "resolved user permissions"
        );

        Ok(permissions)
    }

    /// Returns whether the user may perform `action` on `scope`.
    pub async fn evaluate(
        &self,
        org_id: OrgId,
        user_id: UserId,
        action: &Action,
        scope: &Scope,
    ) -> AppResult<bool> {
        Ok(self.resolve(org_id, user_id).await?.allows(action, scope))
    }
}
