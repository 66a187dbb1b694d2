//! PostgreSQL-backed permission store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::{FromRow, PgPool};

use rolescope_application::{PermissionQuery, PermissionStore, UserPermissionRow};
use rolescope_core::{AppError, AppResult, OrgId, UserId};
use rolescope_domain::{
    BasicRole, NewRole, OrgMembership, Permission, PermissionRecord, Role, RoleId, UserRole,
};

mod bulk;
mod queries;
mod roles;


static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Applies the access control schema migrations.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|error| AppError::Store(format!("failed to run migrations: {error}")))
}

/// PostgreSQL implementation of the permission store port.
#[derive(Clone)]
pub struct PostgresPermissionStore {
    pool: PgPool,
}

impl PostgresPermissionStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: i64,
    uid: String,
    name: String,
    version: i32,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl TryFrom<RoleRow> for Role {
    type Error = AppError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        let version = u32::try_from(row.version).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode version {} of role '{}': {error}",
                row.version, row.uid
            ))
        })?;

        Ok(Self {
            id: RoleId::new(row.id),
            uid: row.uid,
            name: row.name,
            version,
            created: row.created,
            updated: row.updated,
        })
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    action: String,
    scope: String,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = AppError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        Permission::parse(row.action.as_str(), row.scope.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode permission '{}' on '{}': {error}",
                row.action, row.scope
            ))
        })
    }
}

#[derive(Debug, FromRow)]
struct UserPermissionDbRow {
    user_id: i64,
    role_id: i64,
    action: String,
    scope: String,
}

impl TryFrom<UserPermissionDbRow> for UserPermissionRow {
    type Error = AppError;

    fn try_from(row: UserPermissionDbRow) -> Result<Self, Self::Error> {
        let permission = Permission::try_from(PermissionRow {
            action: row.action,
            scope: row.scope,
        })?;

        Ok(Self {
            user_id: UserId::new(row.user_id),
            role_id: RoleId::new(row.role_id),
            permission,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRoleRow {
    id: i64,
    org_id: i64,
    user_id: i64,
    role_id: i64,
    created: DateTime<Utc>,
}

impl From<UserRoleRow> for UserRole {
    fn from(row: UserRoleRow) -> Self {
        Self {
            id: row.id,
            org_id: OrgId::new(row.org_id),
            role_id: RoleId::new(row.role_id),
            user_id: UserId::new(row.user_id),
            created: row.created,
        }
    }
}

#[derive(Debug, FromRow)]
struct OrgMembershipRow {
    org_id: i64,
    user_id: i64,
    basic_role: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl TryFrom<OrgMembershipRow> for OrgMembership {
    type Error = AppError;

    fn try_from(row: OrgMembershipRow) -> Result<Self, Self::Error> {
        let basic_role = BasicRole::new(row.basic_role.as_str()).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode basic role '{}' of user '{}': {error}",
                row.basic_role, row.user_id
            ))
        })?;

        Ok(Self {
            org_id: OrgId::new(row.org_id),
            user_id: UserId::new(row.user_id),
            basic_role,
            created: row.created,
            updated: row.updated,
        })
    }
}

fn version_to_db(version: u32) -> AppResult<i32> {
    i32::try_from(version)
        .map_err(|error| AppError::Validation(format!("role version {version} is too large: {error}")))
}

#[async_trait]
impl PermissionStore for PostgresPermissionStore {
    async fn find_role_by_uid(&self, uid: &str) -> AppResult<Option<Role>> {
        self.find_role_by_uid_impl(uid).await
    }

    async fn create_role(&self, role: NewRole) -> AppResult<Role> {
        self.create_role_impl(role).await
    }

    async fn update_role_version(&self, role_id: RoleId, version: u32) -> AppResult<()> {
        self.update_role_version_impl(role_id, version).await
    }

    async fn list_role_permissions(&self, role_id: RoleId) -> AppResult<Vec<Permission>> {
        self.list_role_permissions_impl(role_id).await
    }

    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        self.replace_role_permissions_impl(role_id, permissions)
            .await
    }

    async fn save_basic_role_grants(&self, role_id: RoleId, grants: &[BasicRole]) -> AppResult<()> {
        self.save_basic_role_grants_impl(role_id, grants).await
    }

    async fn insert_roles(&self, roles: &[Role]) -> AppResult<()> {
        self.insert_roles_impl(roles).await
    }

    async fn insert_permissions(&self, permissions: &[PermissionRecord]) -> AppResult<()> {
        self.insert_permissions_impl(permissions).await
    }

    async fn insert_user_roles(&self, user_roles: &[UserRole]) -> AppResult<()> {
        self.insert_user_roles_impl(user_roles).await
    }

    async fn insert_org_memberships(&self, memberships: &[OrgMembership]) -> AppResult<()> {
        self.insert_org_memberships_impl(memberships).await
    }

    async fn assign_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()> {
        self.assign_user_role_impl(org_id, user_id, role_id).await
    }

    async fn delete_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        self.delete_user_role_impl(org_id, user_id, role_id).await
    }

    async fn delete_role_permission(
        &self,
        role_id: RoleId,
        permission: &Permission,
    ) -> AppResult<bool> {
        self.delete_role_permission_impl(role_id, permission).await
    }

    async fn list_org_memberships(
        &self,
        org_id: OrgId,
        user_id: Option<UserId>,
    ) -> AppResult<Vec<OrgMembership>> {
        self.list_org_memberships_impl(org_id, user_id).await
    }

    async fn query_user_roles_by_org(&self, org_id: OrgId) -> AppResult<Vec<UserRole>> {
        self.query_user_roles_by_org_impl(org_id).await
    }

    async fn query_permissions_by_org_and_action(
        &self,
        org_id: OrgId,
        query: &PermissionQuery,
    ) -> AppResult<Vec<UserPermissionRow>> {
        self.query_permissions_by_org_and_action_impl(org_id, query)
            .await
    }
}
