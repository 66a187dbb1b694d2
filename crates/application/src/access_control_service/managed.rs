use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, info};

use rolescope_core::{AppError, AppResult, OrgId, UserId};
use rolescope_domain::{
    NewRole, Permission, PermissionRecord, Role, RoleId, managed_user_role_name,
    managed_user_role_uid,
};

use super::AccessControlService;

impl AccessControlService {
    /// Grants a permission directly to a user through its managed role.
    ///
    /// The managed role is created and assigned on first use. Granting a
    /// permission the user already holds directly is a no-op.
    pub async fn grant_user_permission(
        &self,
        org_id: OrgId,
        user_id: UserId,
        permission: Permission,
    ) -> AppResult<Role> {
        let role = self.ensure_managed_role(org_id, user_id).await?;
        self.store
            .insert_permissions(&[PermissionRecord::new(role.id, permission.clone(), Utc::now())])
            .await?;

        info!(
            org_id = %org_id,
            user_id = %user_id,
            action = %permission.action(),
            scope = %permission.scope(),
            "granted managed permission"
        );

        Ok(role)
    }

    /// Revokes a directly granted permission.
    ///
    /// Returns whether the permission was held. The managed role is unassigned
    /// once it holds no permission anymore.
    pub async fn revoke_user_permission(
        &self,
        org_id: OrgId,
        user_id: UserId,
        permission: &Permission,
    ) -> AppResult<bool> {
        let uid = managed_user_role_uid(org_id, user_id);
        let Some(role) = self.store.find_role_by_uid(uid.as_str()).await? else {
            return Ok(false);
        };

        if !self.store.delete_role_permission(role.id, permission).await? {
            return Ok(false);
        }

        if self.store.list_role_permissions(role.id).await?.is_empty() {
            self.store
                .delete_user_role(org_id, user_id, role.id)
                .await?;
        }

        info!(
            org_id = %org_id,
            user_id = %user_id,
            action = %permission.action(),
            scope = %permission.scope(),
            "revoked managed permission"
        );

        Ok(true)
    }

    /// Lists role assignments of an organization grouped by user.
    pub async fn list_user_roles(&self, org_id: OrgId) -> AppResult<BTreeMap<UserId, Vec<RoleId>>> {
        let mut assignments: BTreeMap<UserId, Vec<RoleId>> = BTreeMap::new();
        for user_role in self.store.query_user_roles_by_org(org_id).await? {
            assignments
                .entry(user_role.user_id)
                .or_default()
                .push(user_role.role_id);
        }

        for role_ids in assignments.values_mut() {
            role_ids.sort();
            role_ids.dedup();
        }

        Ok(assignments)
    }

    /// Returns the user's managed role, creating and assigning it if needed.
    ///
    /// Concurrent first calls for the same user may race on creation; the
    /// loser reads back the role the winner stored.
    pub async fn ensure_managed_role(&self, org_id: OrgId, user_id: UserId) -> AppResult<Role> {
        let uid = managed_user_role_uid(org_id, user_id);
        let role = match self.store.find_role_by_uid(uid.as_str()).await? {
            Some(role) => role,
            None => self.create_managed_role(org_id, user_id, uid).await?,
        };

        self.store
            .assign_user_role(org_id, user_id, role.id)
            .await?;
        Ok(role)
    }

    async fn create_managed_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        uid: String,
    ) -> AppResult<Role> {
        let created = self
            .store
            .create_role(NewRole {
                uid: uid.clone(),
                name: managed_user_role_name(org_id, user_id),
                version: 1,
            })
            .await;

        match created {
            Err(AppError::DuplicateRegistration(message)) => {
                debug!(org_id = %org_id, user_id = %user_id, "managed role created concurrently");
                self.store
                    .find_role_by_uid(uid.as_str())
                    .await?
                    .ok_or(AppError::DuplicateRegistration(message))
            }
            other => other,
        }
    }
}
