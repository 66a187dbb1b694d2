use async_trait::async_trait;

use rolescope_core::{AppResult, OrgId, UserId};
use rolescope_domain::{
    BasicRole, NewRole, OrgMembership, Permission, PermissionRecord, Role, RoleId, UserRole,
};

use super::queries::{PermissionQuery, UserPermissionRow};

/// Durable storage of roles, permissions, assignments and memberships.
///
/// Bulk inserts are independent writes: callers loading data in chunks get
/// per-chunk atomicity at most, never all-or-nothing across chunks.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Finds a role by its stable uid.
    async fn find_role_by_uid(&self, uid: &str) -> AppResult<Option<Role>>;

    /// Creates a role and returns it with its assigned identifier.
    async fn create_role(&self, role: NewRole) -> AppResult<Role>;

    /// Sets the version of an existing role.
    async fn update_role_version(&self, role_id: RoleId, version: u32) -> AppResult<()>;

    /// Lists the permissions owned by a role.
    async fn list_role_permissions(&self, role_id: RoleId) -> AppResult<Vec<Permission>>;

    /// Replaces every permission owned by a role.
    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
    ) -> AppResult<()>;

    /// Records which basic roles receive a role. Edges not listed are removed.
    async fn save_basic_role_grants(&self, role_id: RoleId, grants: &[BasicRole]) -> AppResult<()>;

    /// Inserts role rows carrying their own identifiers.
    async fn insert_roles(&self, roles: &[Role]) -> AppResult<()>;

    /// Inserts permission rows. Existing (role, action, scope) rows are kept.
    async fn insert_permissions(&self, permissions: &[PermissionRecord]) -> AppResult<()>;

    /// Inserts user role rows carrying their own identifiers.
    async fn insert_user_roles(&self, user_roles: &[UserRole]) -> AppResult<()>;

    /// Inserts org membership rows.
    async fn insert_org_memberships(&self, memberships: &[OrgMembership]) -> AppResult<()>;

    /// Assigns a role to a user in an org. Assigning twice is a no-op.
    async fn assign_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()>;

    /// Removes an assignment. Returns whether a row was deleted.
    async fn delete_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool>;

    /// Removes one permission from a role. Returns whether a row was deleted.
    async fn delete_role_permission(
        &self,
        role_id: RoleId,
        permission: &Permission,
    ) -> AppResult<bool>;

    /// Lists org memberships, optionally for one user only.
    async fn list_org_memberships(
        &self,
        org_id: OrgId,
        user_id: Option<UserId>,
    ) -> AppResult<Vec<OrgMembership>>;

    /// Lists every user role assignment of an org.
    async fn query_user_roles_by_org(&self, org_id: OrgId) -> AppResult<Vec<UserRole>>;

    /// Returns, in one batched read, the permissions users reach through their
    /// role assignments in an org, filtered by action.
    async fn query_permissions_by_org_and_action(
        &self,
        org_id: OrgId,
        query: &PermissionQuery,
    ) -> AppResult<Vec<UserPermissionRow>>;
}
