use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use super::*;

/// Rows per multi-row statement, kept well below the bind parameter limit.
const ROWS_PER_STATEMENT: usize = 5_000;

impl PostgresPermissionStore {
    pub(super) async fn insert_roles_impl(&self, roles: &[Role]) -> AppResult<()> {
        if roles.is_empty() {
            return Ok(());
        }

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Store(format!("failed to begin transaction: {error}"))
        })?;

        for chunk in roles.chunks(ROWS_PER_STATEMENT) {
            let versions = chunk
                .iter()
                .map(|role| version_to_db(role.version))
                .collect::<AppResult<Vec<_>>>()?;

            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO roles (id, uid, name, version, created, updated) ",
            );
            builder.push_values(chunk.iter().zip(versions), |mut row, (role, version)| {
                row.push_bind(role.id.as_i64())
                    .push_bind(role.uid.as_str())
                    .push_bind(role.name.as_str())
                    .push_bind(version)
                    .push_bind(role.created)
                    .push_bind(role.updated);
            });
            builder.push(" ON CONFLICT DO NOTHING");

            builder
                .build()
                .execute(&mut *transaction)
                .await
                .map_err(|error| AppError::Store(format!("failed to insert roles: {error}")))?;
        }

        debug!(rows = roles.len(), "inserted roles");

        // Explicit ids bypass the sequence; move it past them.
        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('roles', 'id'),
                GREATEST((SELECT MAX(id) FROM roles), 1)
            )
            "#,
        )
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Store(format!("failed to advance role ids: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Store(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn insert_permissions_impl(
        &self,
        permissions: &[PermissionRecord],
    ) -> AppResult<()> {
        for chunk in permissions.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO permissions (role_id, action, scope, created, updated) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.role_id.as_i64())
                    .push_bind(record.permission.action().as_str())
                    .push_bind(record.permission.scope().as_str())
                    .push_bind(record.created)
                    .push_bind(record.updated);
            });
            builder.push(" ON CONFLICT (role_id, action, scope) DO NOTHING");

            builder.build().execute(&self.pool).await.map_err(|error| {
                AppError::Store(format!("failed to insert permissions: {error}"))
            })?;
        }

        debug!(rows = permissions.len(), "inserted permissions");

        Ok(())
    }

    pub(super) async fn insert_user_roles_impl(&self, user_roles: &[UserRole]) -> AppResult<()> {
        if user_roles.is_empty() {
            return Ok(());
        }

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Store(format!("failed to begin transaction: {error}"))
        })?;

        for chunk in user_roles.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO user_roles (id, org_id, user_id, role_id, created) ");
            builder.push_values(chunk, |mut row, user_role| {
                row.push_bind(user_role.id)
                    .push_bind(user_role.org_id.as_i64())
                    .push_bind(user_role.user_id.as_i64())
                    .push_bind(user_role.role_id.as_i64())
                    .push_bind(user_role.created);
            });
            builder.push(" ON CONFLICT DO NOTHING");

            builder
                .build()
                .execute(&mut *transaction)
                .await
                .map_err(|error| AppError::Store(format!("failed to insert user roles: {error}")))?;
        }

        sqlx::query(
            r#"
            SELECT setval(
                pg_get_serial_sequence('user_roles', 'id'),
                GREATEST((SELECT MAX(id) FROM user_roles), 1)
            )
            "#,
        )
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Store(format!("failed to advance user role ids: {error}")))?;

        transaction.commit().await.map_err(|error| {
            AppError::Store(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn insert_org_memberships_impl(
        &self,
        memberships: &[OrgMembership],
    ) -> AppResult<()> {
        for chunk in memberships.chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO org_memberships (org_id, user_id, basic_role, created, updated) ",
            );
            builder.push_values(chunk, |mut row, membership| {
                row.push_bind(membership.org_id.as_i64())
                    .push_bind(membership.user_id.as_i64())
                    .push_bind(membership.basic_role.as_str())
                    .push_bind(membership.created)
                    .push_bind(membership.updated);
            });
            builder.push(" ON CONFLICT (org_id, user_id) DO NOTHING");

            builder.build().execute(&self.pool).await.map_err(|error| {
                AppError::Store(format!("failed to insert org memberships: {error}"))
            })?;
        }

        Ok(())
    }
}
