use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rolescope_core::{AppError, AppResult, OrgId, UserId};
use rolescope_domain::{
    BasicRole, NewRole, OrgMembership, Permission, PermissionRecord, Role, RoleId, UserRole,
};
use tokio::sync::Mutex;

use crate::{PermissionQuery, PermissionStore, UserPermissionRow};

#[derive(Default)]
struct FakeState {
    roles: Vec<Role>,
    permissions: Vec<PermissionRecord>,
    grants: BTreeMap<RoleId, Vec<BasicRole>>,
    user_roles: Vec<UserRole>,
    memberships: Vec<OrgMembership>,
}

#[derive(Default)]
pub(crate) struct FakePermissionStore {
    state: Mutex<FakeState>,
    fail_reads: AtomicBool,
    permission_writes: AtomicUsize,
    stale_role_lookups: AtomicUsize,
}

impl FakePermissionStore {
    pub(crate) fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Makes the next `count` role lookups miss, as if another writer had
    /// not committed yet.
    pub(crate) fn miss_role_lookups(&self, count: usize) {
        self.stale_role_lookups.store(count, Ordering::SeqCst);
    }

    pub(crate) fn permission_writes(&self) -> usize {
        self.permission_writes.load(Ordering::SeqCst)
    }

    pub(crate) async fn permission_rows(&self) -> usize {
        self.state.lock().await.permissions.len()
    }

    pub(crate) async fn grants_of(&self, role_id: RoleId) -> Vec<BasicRole> {
        self.state
            .lock()
            .await
            .grants
            .get(&role_id)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) async fn add_member(&self, org_id: OrgId, user_id: UserId, basic_role: BasicRole) {
        let now = Utc::now();
        self.state.lock().await.memberships.push(OrgMembership {
            org_id,
            user_id,
            basic_role,
            created: now,
            updated: now,
        });
    }

    fn check_reads(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Store("permission store unavailable".to_owned()));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for FakePermissionStore {
    async fn find_role_by_uid(&self, uid: &str) -> AppResult<Option<Role>> {
        self.check_reads()?;
        let stale = self
            .stale_role_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
        if stale.is_ok() {
            return Ok(None);
        }

        Ok(self
            .state
            .lock()
            .await
            .roles
            .iter()
            .find(|role| role.uid == uid)
            .cloned())
    }

    async fn create_role(&self, role: NewRole) -> AppResult<Role> {
        let mut state = self.state.lock().await;
        if state
            .roles
            .iter()
            .any(|existing| existing.uid == role.uid || existing.name == role.name)
        {
            return Err(AppError::DuplicateRegistration(format!(
                "role '{}' already exists",
                role.uid
            )));
        }

        let now = Utc::now();
        let id = i64::try_from(state.roles.len())
            .map_err(|error| AppError::Internal(error.to_string()))?
            + 1;
        let role = Role {
            id: RoleId::new(id),
            uid: role.uid,
            name: role.name,
            version: role.version,
            created: now,
            updated: now,
        };
        state.roles.push(role.clone());
        Ok(role)
    }

    async fn update_role_version(&self, role_id: RoleId, version: u32) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(role) = state.roles.iter_mut().find(|role| role.id == role_id) else {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        };
        role.version = version;
        Ok(())
    }

    async fn list_role_permissions(&self, role_id: RoleId) -> AppResult<Vec<Permission>> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .await
            .permissions
            .iter()
            .filter(|record| record.role_id == role_id)
            .map(|record| record.permission.clone())
            .collect())
    }

    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        self.permission_writes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.permissions.retain(|record| record.role_id != role_id);
        state.permissions.extend(
            permissions
                .iter()
                .map(|permission| PermissionRecord::new(role_id, permission.clone(), now)),
        );
        Ok(())
    }

    async fn save_basic_role_grants(&self, role_id: RoleId, grants: &[BasicRole]) -> AppResult<()> {
        let mut grants = grants.to_vec();
        grants.sort();
        grants.dedup();
        self.state.lock().await.grants.insert(role_id, grants);
        Ok(())
    }

    async fn insert_roles(&self, roles: &[Role]) -> AppResult<()> {
        self.state.lock().await.roles.extend(roles.iter().cloned());
        Ok(())
    }

    async fn insert_permissions(&self, permissions: &[PermissionRecord]) -> AppResult<()> {
        self.permission_writes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        for record in permissions {
            let exists = state.permissions.iter().any(|existing| {
                existing.role_id == record.role_id && existing.permission == record.permission
            });
            if !exists {
                state.permissions.push(record.clone());
            }
        }
        Ok(())
    }

    async fn insert_user_roles(&self, user_roles: &[UserRole]) -> AppResult<()> {
        self.state
            .lock()
            .await
            .user_roles
            .extend(user_roles.iter().cloned());
        Ok(())
    }

    async fn insert_org_memberships(&self, memberships: &[OrgMembership]) -> AppResult<()> {
        self.state
            .lock()
            .await
            .memberships
            .extend(memberships.iter().cloned());
        Ok(())
    }

    async fn assign_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let assigned = state.user_roles.iter().any(|user_role| {
            user_role.org_id == org_id && user_role.user_id == user_id && user_role.role_id == role_id
        });
        if !assigned {
            let id = i64::try_from(state.user_roles.len())
                .map_err(|error| AppError::Internal(error.to_string()))?
                + 1;
            state.user_roles.push(UserRole {
                id,
                org_id,
                role_id,
                user_id,
                created: Utc::now(),
            });
        }
        Ok(())
    }

    async fn delete_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.user_roles.len();
        state.user_roles.retain(|user_role| {
            !(user_role.org_id == org_id
                && user_role.user_id == user_id
                && user_role.role_id == role_id)
        });
        Ok(state.user_roles.len() != before)
    }

    async fn delete_role_permission(
        &self,
        role_id: RoleId,
        permission: &Permission,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.permissions.len();
        state
            .permissions
            .retain(|record| !(record.role_id == role_id && &record.permission == permission));
        Ok(state.permissions.len() != before)
    }

    async fn list_org_memberships(
        &self,
        org_id: OrgId,
        user_id: Option<UserId>,
    ) -> AppResult<Vec<OrgMembership>> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .await
            .memberships
            .iter()
            .filter(|membership| membership.org_id == org_id)
            .filter(|membership| user_id.is_none_or(|user_id| membership.user_id == user_id))
            .cloned()
            .collect())
    }

    async fn query_user_roles_by_org(&self, org_id: OrgId) -> AppResult<Vec<UserRole>> {
        self.check_reads()?;
        Ok(self
            .state
            .lock()
            .await
            .user_roles
            .iter()
            .filter(|user_role| user_role.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn query_permissions_by_org_and_action(
        &self,
        org_id: OrgId,
        query: &PermissionQuery,
    ) -> AppResult<Vec<UserPermissionRow>> {
        self.check_reads()?;
        let state = self.state.lock().await;
        let mut rows = Vec::new();
        for user_role in state.user_roles.iter().filter(|user_role| {
            user_role.org_id == org_id
                && query
                    .user_id
                    .is_none_or(|user_id| user_role.user_id == user_id)
        }) {
            rows.extend(
                state
                    .permissions
                    .iter()
                    .filter(|record| record.role_id == user_role.role_id)
                    .filter(|record| query.action.matches(&record.permission))
                    .map(|record| UserPermissionRow {
                        user_id: user_role.user_id,
                        role_id: record.role_id,
                        permission: record.permission.clone(),
                    }),
            );
        }
        Ok(rows)
    }
}
