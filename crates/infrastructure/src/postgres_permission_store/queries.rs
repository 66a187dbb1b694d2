use rolescope_application::ActionFilter;
use sqlx::{Postgres, QueryBuilder};

use super::*;

impl PostgresPermissionStore {
    pub(super) async fn assign_user_role_impl(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (org_id, user_id, role_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (org_id, user_id, role_id) DO NOTHING
            "#,
        )
        .bind(org_id.as_i64())
        .bind(user_id.as_i64())
        .bind(role_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to assign role '{role_id}' to user '{user_id}' in org '{org_id}': {error}"
            ))
        })?;

        Ok(())
    }

    pub(super) async fn delete_user_role_impl(
        &self,
        org_id: OrgId,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            r#"
            DELETE FROM user_roles
            WHERE org_id = $1 AND user_id = $2 AND role_id = $3
            "#,
        )
        .bind(org_id.as_i64())
        .bind(user_id.as_i64())
        .bind(role_id.as_i64())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to remove role '{role_id}' from user '{user_id}': {error}"
            ))
        })?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    pub(super) async fn list_org_memberships_impl(
        &self,
        org_id: OrgId,
        user_id: Option<UserId>,
    ) -> AppResult<Vec<OrgMembership>> {
        let rows = sqlx::query_as::<_, OrgMembershipRow>(
            r#"
            SELECT org_id, user_id, basic_role, created, updated
            FROM org_memberships
            WHERE org_id = $1
                AND ($2::BIGINT IS NULL OR user_id = $2)
            ORDER BY user_id
            "#,
        )
        .bind(org_id.as_i64())
        .bind(user_id.map(|user_id| user_id.as_i64()))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to list memberships of org '{org_id}': {error}"
            ))
        })?;

        rows.into_iter().map(OrgMembership::try_from).collect()
    }

    pub(super) async fn query_user_roles_by_org_impl(
        &self,
        org_id: OrgId,
    ) -> AppResult<Vec<UserRole>> {
        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT id, org_id, user_id, role_id, created
            FROM user_roles
            WHERE org_id = $1
            ORDER BY user_id, role_id
            "#,
        )
        .bind(org_id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Store(format!(
                "failed to list user roles of org '{org_id}': {error}"
            ))
        })?;

        Ok(rows.into_iter().map(UserRole::from).collect())
    }

    pub(super) async fn query_permissions_by_org_and_action_impl(
        &self,
        org_id: OrgId,
        query: &PermissionQuery,
    ) -> AppResult<Vec<UserPermissionRow>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r#"
            SELECT user_roles.user_id, permissions.role_id, permissions.action, permissions.scope
            FROM user_roles
            INNER JOIN permissions
                ON permissions.role_id = user_roles.role_id
            WHERE user_roles.org_id = "#,
        );
        builder.push_bind(org_id.as_i64());

        if let Some(user_id) = query.user_id {
            builder.push(" AND user_roles.user_id = ");
            builder.push_bind(user_id.as_i64());
        }

        match &query.action {
            ActionFilter::Any => {}
            ActionFilter::Prefix(prefix) => {
                builder.push(" AND permissions.action LIKE ");
                builder.push_bind(format!("{}%", escape_like(prefix)));
                builder.push(" ESCAPE '\\'");
            }
            ActionFilter::Exact { action, scopes } => {
                builder.push(" AND permissions.action = ");
                builder.push_bind(action.as_str().to_owned());
                if let Some(scopes) = scopes {
                    let scopes: Vec<String> =
                        scopes.iter().map(|scope| scope.as_str().to_owned()).collect();
                    builder.push(" AND permissions.scope = ANY(");
                    builder.push_bind(scopes);
                    builder.push(")");
                }
            }
        }

        let rows = builder
            .build_query_as::<UserPermissionDbRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Store(format!(
                    "failed to query permissions of org '{org_id}': {error}"
                ))
            })?;

        rows.into_iter().map(UserPermissionRow::try_from).collect()
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}
