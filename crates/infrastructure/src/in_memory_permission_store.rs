use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use rolescope_application::{PermissionQuery, PermissionStore, UserPermissionRow};
use rolescope_core::{AppError, AppResult, OrgId, UserId};
use rolescope_domain::{
    BasicRole, NewRole, OrgMembership, Permission, PermissionRecord, Role, RoleId, UserRole,
};


type AssignmentKey = (OrgId, UserId, RoleId);

/// In-memory permission store for tests and ephemeral runs.
#[derive(Debug)]
pub struct InMemoryPermissionStore {
    roles: RwLock<BTreeMap<RoleId, Role>>,
    permissions: RwLock<HashMap<RoleId, BTreeMap<Permission, PermissionRecord>>>,
    grants: RwLock<HashMap<RoleId, Vec<BasicRole>>>,
    user_roles: RwLock<BTreeMap<AssignmentKey, UserRole>>,
    memberships: RwLock<BTreeMap<(OrgId, UserId), OrgMembership>>,
    next_role_id: AtomicI64,
    next_user_role_id: AtomicI64,
}

impl Default for InMemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPermissionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(BTreeMap::new()),
            permissions: RwLock::new(HashMap::new()),
            grants: RwLock::new(HashMap::new()),
            user_roles: RwLock::new(BTreeMap::new()),
            memberships: RwLock::new(BTreeMap::new()),
            next_role_id: AtomicI64::new(1),
            next_user_role_id: AtomicI64::new(1),
        }
    }

    /// Returns the basic roles currently receiving a role.
    pub async fn basic_role_grants(&self, role_id: RoleId) -> Vec<BasicRole> {
        self.grants
            .read()
            .await
            .get(&role_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the number of stored permission rows.
    pub async fn permission_count(&self) -> usize {
        self.permissions.read().await.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn find_role_by_uid(&self, uid: &str) -> AppResult<Option<Role>> {
        Ok(self
            .roles
            .read()
            .await
            .values()
            .find(|role| role.uid == uid)
            .cloned())
    }

    async fn create_role(&self, role: NewRole) -> AppResult<Role> {
        let mut roles = self.roles.write().await;
        if roles
            .values()
            .any(|existing| existing.uid == role.uid || existing.name == role.name)
        {
            return Err(AppError::DuplicateRegistration(format!(
                "role '{}' already exists",
                role.uid
            )));
        }

        let now = Utc::now();
        let role = Role {
            id: RoleId::new(self.next_role_id.fetch_add(1, Ordering::SeqCst)),
            uid: role.uid,
            name: role.name,
            version: role.version,
            created: now,
            updated: now,
        };
        roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn update_role_version(&self, role_id: RoleId, version: u32) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        let role = roles
            .get_mut(&role_id)
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' was not found")))?;

        role.version = version;
        role.updated = Utc::now();
        Ok(())
    }

    async fn list_role_permissions(&self, role_id: RoleId) -> AppResult<Vec<Permission>> {
        Ok(self
            .permissions
            .read()
            .await
            .get(&role_id)
            .map(|permissions| permissions.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn replace_role_permissions(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        let now = Utc::now();
        let replaced = permissions
            .iter()
            .map(|permission| {
                (
                    permission.clone(),
                    PermissionRecord::new(role_id, permission.clone(), now),
                )
            })
            .collect();

        self.permissions.write().await.insert(role_id, replaced);
        Ok(())
    }

    async fn save_basic_role_grants(&self, role_id: RoleId, grants: &[BasicRole]) -> AppResult<()> {
        let mut grants = grants.to_vec();
        grants.sort();
        grants.dedup();

        let mut stored = self.grants.write().await;
        if grants.is_empty() {
            stored.remove(&role_id);
        } else {
            stored.insert(role_id, grants);
        }
        Ok(())
    }

    async fn insert_roles(&self, new_roles: &[Role]) -> AppResult<()> {
        let mut roles = self.roles.write().await;
        for role in new_roles {
            roles.entry(role.id).or_insert_with(|| role.clone());
            self.next_role_id
                .fetch_max(role.id.as_i64().saturating_add(1), Ordering::SeqCst);
        }
        Ok(())
    }

    async fn insert_permissions(&self, records: &[PermissionRecord]) -> AppResult<()> {
        let mut permissions = self.permissions.write().await;
        for record in records {
            permissions
                .entry(record.role_id)
                .or_default()
                .entry(record.permission.clone())
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn insert_user_roles(&self, new_user_roles: &[UserRole]) -> AppResult<()> {
        let mut user_roles = self.user_roles.write().await;
        for user_role in new_user_roles {
            user_roles
                .entry((user_role.org_id, user_role.user_id, user_role.role_id))
                .or_insert_with(|| user_role.clone());
            self.next_user_role_id
                .fetch_max(user_role.id.saturating_add(1), Ordering::SeqCst);
        }
        Ok(())
    }

    async fn insert_org_memberships(&self, new_memberships: &[OrgMembership]) -> AppResult<()> {
        let mut memberships = self.memberships.write().await;
        for membership in new_memberships {
            memberships
                .entry((membership.org_id, membership.user_id))
                .or_insert_with(|| membership.clone());
        }
        Ok(())
    }

    async fn assign_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()> {
        if !self.roles.read().await.contains_key(&role_id) {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        self.user_roles
            .write()
            .await
            .entry((org_id, user_id, role_id))
            .or_insert_with(|| UserRole {
                id: self.next_user_role_id.fetch_add(1, Ordering::SeqCst),
                org_id,
                role_id,
                user_id,
                created: Utc::now(),
            });
        Ok(())
    }

    async fn delete_user_role(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        Ok(self
            .user_roles
            .write()
            .await
            .remove(&(org_id, user_id, role_id))
            .is_some())
    }

    async fn delete_role_permission(
        &self,
        role_id: RoleId,
        permission: &Permission,
    ) -> AppResult<bool> {
        Ok(self
            .permissions
            .write()
            .await
            .get_mut(&role_id)
            .is_some_and(|permissions| permissions.remove(permission).is_some()))
    }

    async fn list_org_memberships(
        &self,
        org_id: OrgId,
        user_id: Option<UserId>,
    ) -> AppResult<Vec<OrgMembership>> {
        let memberships = self.memberships.read().await;
        let values = match user_id {
            Some(user_id) => memberships
                .get(&(org_id, user_id))
                .cloned()
                .into_iter()
                .collect(),
            None => memberships
                .range((org_id, UserId::new(i64::MIN))..=(org_id, UserId::new(i64::MAX)))
                .map(|(_, membership)| membership.clone())
                .collect(),
        };

        Ok(values)
    }

    async fn query_user_roles_by_org(&self, org_id: OrgId) -> AppResult<Vec<UserRole>> {
        Ok(self
            .user_roles
            .read()
            .await
            .values()
            .filter(|user_role| user_role.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn query_permissions_by_org_and_action(
        &self,
        org_id: OrgId,
        query: &PermissionQuery,
    ) -> AppResult<Vec<UserPermissionRow>> {
        let user_roles = self.user_roles.read().await;
        let permissions = self.permissions.read().await;

        let mut rows = Vec::new();
        for (user_id, role_id) in user_roles.keys().filter_map(|(stored_org, user_id, role_id)| {
            let in_scope = *stored_org == org_id
                && query.user_id.is_none_or(|wanted| wanted == *user_id);
            in_scope.then_some((*user_id, *role_id))
        }) {
            let Some(role_permissions) = permissions.get(&role_id) else {
                continue;
            };

            rows.extend(
                role_permissions
                    .keys()
                    .filter(|permission| query.action.matches(permission))
                    .map(|permission| UserPermissionRow {
                        user_id,
                        role_id,
                        permission: permission.clone(),
                    }),
            );
        }

        Ok(rows)
    }
}
