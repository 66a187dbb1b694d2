use sqlx::{Postgres, QueryBuilder};

use super::*;

impl PostgresPermissionStore {
    pub(super) async fn find_role_by_uid_impl(&self, uid: &str) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, uid, name, version, created, updated
            FROM roles
            WHERE uid = $1
            LIMIT 1
            "#,
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Store(format!("failed to find role '{uid}': {error}")))?;

        row.map(Role::try_from).transpose()
    }

    pub(super) async fn create_role_impl(&self, role: NewRole) -> AppResult<Role> {
        let row = sqlx::query_as::<_, RoleRow>(
            r#"
            INSERT INTO roles (uid, name, version)
            VALUES ($1, $2, $3)
            RETURNING id, uid, name, version, created, updated
            "#,
        )
        .bind(role.uid.as_str())
        .bind(role.name.as_str())
        .bind(version_to_db(role.version)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_role_conflict(error, role.uid.as_str()))?;

        Role::try_from(row)
    }

    pub(super) async fn update_role_version_impl(
        &self,
        role_id: RoleId,
        version: u32,
    ) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE roles
            SET version = $2, updated = now()
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_i64())
        .bind(version_to_db(version)?)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!("failed to update version of role '{role_id}': {error}"))
        })?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("role '{role_id}' was not found")));
        }

        Ok(())
    }

    pub(super) async fn list_role_permissions_impl(
        &self,
        role_id: RoleId,
    ) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT action, scope
            FROM permissions
            WHERE role_id = $1
            ORDER BY action, scope
            "#,
        )
        .bind(role_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to list permissions of role '{role_id}': {error}"
            ))
        })?;

        rows.into_iter().map(Permission::try_from).collect()
    }

    pub(super) async fn replace_role_permissions_impl(
        &self,
        role_id: RoleId,
        permissions: &[Permission],
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Store(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query("DELETE FROM permissions WHERE role_id = $1")
            .bind(role_id.as_i64())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Store(format!(
                    "failed to clear permissions of role '{role_id}': {error}"
                ))
            })?;

        if !permissions.is_empty() {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO permissions (role_id, action, scope) ");
            builder.push_values(permissions, |mut row, permission| {
                row.push_bind(role_id.as_i64())
                    .push_bind(permission.action().as_str())
                    .push_bind(permission.scope().as_str());
            });
            builder.push(" ON CONFLICT (role_id, action, scope) DO NOTHING");

            builder
                .build()
                .execute(&mut *transaction)
                .await
                .map_err(|error| {
                    AppError::Store(format!(
                        "failed to persist permissions of role '{role_id}': {error}"
                    ))
                })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Store(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn save_basic_role_grants_impl(
        &self,
        role_id: RoleId,
        grants: &[BasicRole],
    ) -> AppResult<()> {
        let names: Vec<String> = grants.iter().map(|grant| grant.as_str().to_owned()).collect();

        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Store(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            DELETE FROM basic_role_grants
            WHERE role_id = $1
                AND basic_role <> ALL($2)
            "#,
        )
        .bind(role_id.as_i64())
        .bind(&names)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Store(format!("failed to prune grants of role '{role_id}': {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO basic_role_grants (role_id, basic_role)
            SELECT $1, grant_name
            FROM UNNEST($2::TEXT[]) AS grant_name
            ON CONFLICT (role_id, basic_role) DO NOTHING
            "#,
        )
        .bind(role_id.as_i64())
        .bind(&names)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Store(format!("failed to persist grants of role '{role_id}': {error}"))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Store(format!("failed to commit transaction: {error}"))
        })?;

        Ok(())
    }

    pub(super) async fn delete_role_permission_impl(
        &self,
        role_id: RoleId,
        permission: &Permission,
    ) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM permissions
            WHERE role_id = $1 AND action = $2 AND scope = $3
            "#,
        )
        .bind(role_id.as_i64())
        .bind(permission.action().as_str())
        .bind(permission.scope().as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to delete permission of role '{role_id}': {error}"
            ))
        })?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    /// Returns the basic roles currently receiving a role, sorted.
    pub async fn basic_role_grants(&self, role_id: RoleId) -> AppResult<Vec<BasicRole>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT basic_role
            FROM basic_role_grants
            WHERE role_id = $1
            ORDER BY basic_role
            "#,
        )
        .bind(role_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!("failed to list grants of role '{role_id}': {error}"))
        })?;

        names.into_iter().map(BasicRole::new).collect()
    }
}

fn map_role_conflict(error: sqlx::Error, uid: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.is_unique_violation()
    {
        return AppError::DuplicateRegistration(format!("role '{uid}' already exists"));
    }

    AppError::Store(format!("failed to create role '{uid}': {error}"))
}
