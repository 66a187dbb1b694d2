use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rolescope_application::{AccessControlService, PermissionStore, run_batches};
use rolescope_core::{AppError, AppResult, UserId};
use rolescope_domain::{BasicRole, OrgMembership, Permission, PermissionRecord, RoleId};
use tokio::sync::Mutex;
use tracing::info;

use crate::seeder_config::SeederConfig;

/// Counts of rows written by one seeding run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub permissions: usize,
}

/// Seeds viewer memberships plus one managed role per user holding
/// `resources:action2` on every seeded resource.
pub async fn seed_org(
    service: &AccessControlService,
    store: Arc<dyn PermissionStore>,
    config: &SeederConfig,
) -> AppResult<SeedSummary> {
    let org_id = config.org_id;
    let user_ids: Vec<UserId> = (1..=config.users)
        .map(|user| {
            i64::try_from(user)
                .map(UserId::new)
                .map_err(|error| AppError::Validation(format!("invalid user count: {error}")))
        })
        .collect::<AppResult<_>>()?;

    let created = Utc::now();
    let memberships: Vec<OrgMembership> = user_ids
        .iter()
        .map(|user_id| OrgMembership {
            org_id,
            user_id: *user_id,
            basic_role: BasicRole::viewer(),
            created,
            updated: created,
        })
        .collect();
    store.insert_org_memberships(&memberships).await?;

    let managed_roles = Arc::new(Mutex::new(BTreeMap::new()));
    let users = Arc::new(user_ids);
    {
        let service = service.clone();
        let managed_roles = Arc::clone(&managed_roles);
        let users = Arc::clone(&users);
        run_batches(config.batch, users.len(), move |bounds| {
            let service = service.clone();
            let managed_roles = Arc::clone(&managed_roles);
            let users = Arc::clone(&users);
            async move {
                for index in bounds.range() {
                    let Some(user_id) = users.get(index).copied() else {
                        continue;
                    };
                    let role = service.ensure_managed_role(org_id, user_id).await?;
                    managed_roles.lock().await.insert(index, role.id);
                }
                Ok(())
            }
        })
        .await?;
    }
    let role_ids: Arc<Vec<RoleId>> =
        Arc::new(managed_roles.lock().await.values().copied().collect());
    info!(org_id = %org_id, users = role_ids.len(), "seeded managed roles");

    let resources = config.resources;
    let permission_count = role_ids.len().saturating_mul(resources);
    {
        let store = Arc::clone(&store);
        let role_ids = Arc::clone(&role_ids);
        run_batches(config.batch, permission_count, move |bounds| {
            let store = Arc::clone(&store);
            let role_ids = Arc::clone(&role_ids);
            async move {
                let created = Utc::now();
                let records = bounds
                    .range()
                    .filter_map(|index| {
                        let role_id = role_ids.get(index / resources).copied()?;
                        Some((role_id, index % resources + 1))
                    })
                    .map(|(role_id, resource)| {
                        let scope = format!("resources:id:{resource}");
                        Permission::parse("resources:action2", scope.as_str())
                            .map(|permission| PermissionRecord::new(role_id, permission, created))
                    })
                    .collect::<AppResult<Vec<_>>>()?;
                store.insert_permissions(&records).await
            }
        })
        .await?;
    }
    info!(
        org_id = %org_id,
        permissions = permission_count,
        "seeded managed permissions"
    );

    Ok(SeedSummary {
        users: role_ids.len(),
        permissions: permission_count,
    })
}
