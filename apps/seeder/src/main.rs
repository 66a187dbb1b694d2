//! Rolescope seeding and search benchmark runner.

#![forbid(unsafe_code)]

mod seed;
mod seeder_config;

use std::sync::Arc;
use std::time::Instant;

use rolescope_application::{AccessControlService, PermissionStore, RegistryBuilder};
use rolescope_core::{AppError, AppResult, OrgId, UserId};
use rolescope_domain::{
    ACTION_USERS_PERMISSIONS_READ, Action, BasicRole, EffectivePermissions, FixedRoleDefinition,
    Permission, RoleRegistration, Scope, SearchOptions, SignedInUser,
};
use rolescope_infrastructure::{InMemoryPermissionStore, PostgresPermissionStore, run_migrations};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::seed::seed_org;
use crate::seeder_config::{SeederConfig, StoreConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = SeederConfig::load()?;
    let store = build_store(&config).await?;

    let mut registry = RegistryBuilder::new();
    registry.declare([RoleRegistration {
        role: FixedRoleDefinition::new(
            "fixed:resources:reader",
            vec![Permission::parse("resources:action1", "")?],
        ),
        grants: vec![BasicRole::viewer()],
    }])?;
    let registry = registry.commit(store.as_ref()).await?;
    let service = AccessControlService::new(Arc::clone(&store), Arc::new(registry));

    info!(
        org_id = %config.org_id,
        users = config.users,
        resources = config.resources,
        workers = config.batch.workers,
        batch_size = config.batch.batch_size,
        "rolescope-seeder started"
    );

    let started = Instant::now();
    let summary = seed_org(&service, Arc::clone(&store), &config).await?;
    info!(
        users = summary.users,
        permissions = summary.permissions,
        elapsed_ms = started.elapsed().as_millis(),
        "seeding finished"
    );

    let caller = admin_caller(config.org_id)?;

    let by_prefix = SearchOptions::by_action_prefix("resources:");
    run_search(&service, &caller, config.org_id, "prefix", &by_prefix).await?;

    let by_scope = SearchOptions::by_action(
        Action::new("resources:action2")?,
        Some(Scope::new("resources:id:1")?),
    );
    run_search(&service, &caller, config.org_id, "scoped", &by_scope).await?;

    Ok(())
}

async fn build_store(config: &SeederConfig) -> AppResult<Arc<dyn PermissionStore>> {
    match &config.store {
        StoreConfig::Memory => Ok(Arc::new(InMemoryPermissionStore::new())),
        StoreConfig::Postgres { database_url } => {
            let pool = PgPoolOptions::new()
                .max_connections(u32::try_from(config.batch.workers).unwrap_or(u32::MAX).max(1))
                .connect(database_url.as_str())
                .await
                .map_err(|error| {
                    AppError::Store(format!("failed to connect to database: {error}"))
                })?;
            run_migrations(&pool).await?;

            Ok(Arc::new(PostgresPermissionStore::new(pool)))
        }
    }
}

/// Caller allowed to read every user's permissions in the org.
fn admin_caller(org_id: OrgId) -> AppResult<SignedInUser> {
    let permissions: EffectivePermissions =
        [Permission::parse(ACTION_USERS_PERMISSIONS_READ, "users:*")?]
            .into_iter()
            .collect();

    Ok(SignedInUser::new(UserId::new(1), org_id).with_permissions(org_id, permissions))
}

async fn run_search(
    service: &AccessControlService,
    caller: &SignedInUser,
    org_id: OrgId,
    label: &str,
    options: &SearchOptions,
) -> AppResult<()> {
    let started = Instant::now();
    let results = service
        .search_users_permissions(caller, org_id, options)
        .await?;

    info!(
        search = label,
        users = results.len(),
        permissions = results.values().map(Vec::len).sum::<usize>(),
        elapsed_ms = started.elapsed().as_millis(),
        "search finished"
    );

    Ok(())
}
