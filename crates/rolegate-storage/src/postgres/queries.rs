use chrono::{DateTime, Utc};

use rolegate_core::model::{
    Effect, GroupRole, Permission, Resource, Role, RolePermission, UserGroup, UserGroupMembership,
    UserRole,
};

use crate::traits::StorageError;

pub(super) fn to_storage_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(e.to_string()),
        _ => StorageError::Internal(e.to_string()),
    }
}

fn parse_effect(entity: &'static str, raw: &str) -> Result<Effect, StorageError> {
    raw.parse::<Effect>()
        .map_err(|e| StorageError::InvalidRecord {
            entity,
            reason: e.to_string(),
        })
}

type AssignmentRow = (String, String, Option<String>, Option<DateTime<Utc>>, bool);

pub async fn exists<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    table: &'static str,
    id: &str,
) -> Result<bool, StorageError> {
    let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    let row: (bool,) = sqlx::query_as(&query)
        .bind(id)
        .fetch_one(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(row.0)
}

pub async fn effective_user_roles<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: &str,
) -> Result<Vec<UserRole>, StorageError> {
    let rows: Vec<AssignmentRow> = sqlx::query_as(
        r#"
        SELECT ur.user_id, ur.role_id, ur.resource_id, ur.expires_at, ur.is_active
        FROM user_roles ur
        JOIN roles r ON r.id = ur.role_id
        WHERE ur.user_id = $1
          AND ur.is_active
          AND r.is_active
          AND (ur.expires_at IS NULL OR ur.expires_at > now())
        ORDER BY ur.role_id, ur.resource_id
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(user_id, role_id, resource_id, expires_at, is_active)| UserRole {
            user_id,
            role_id,
            resource_id,
            expires_at,
            is_active,
        })
        .collect())
}

pub async fn effective_group_roles<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    group_id: &str,
) -> Result<Vec<GroupRole>, StorageError> {
    let rows: Vec<AssignmentRow> = sqlx::query_as(
        r#"
        SELECT gr.group_id, gr.role_id, gr.resource_id, gr.expires_at, gr.is_active
        FROM group_roles gr
        JOIN roles r ON r.id = gr.role_id
        WHERE gr.group_id = $1
          AND gr.is_active
          AND r.is_active
          AND (gr.expires_at IS NULL OR gr.expires_at > now())
        ORDER BY gr.role_id, gr.resource_id
        "#,
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(group_id, role_id, resource_id, expires_at, is_active)| GroupRole {
            group_id,
            role_id,
            resource_id,
            expires_at,
            is_active,
        })
        .collect())
}

pub async fn active_groups_for_user<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: &str,
) -> Result<Vec<UserGroup>, StorageError> {
    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT g.id, g.name, g.parent_group_id
        FROM user_group_memberships m
        JOIN user_groups g ON g.id = m.group_id
        WHERE m.user_id = $1 AND m.is_active
        ORDER BY g.id
        "#,
    )
    .bind(user_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows
        .into_iter()
        .map(|(id, name, parent_group_id)| UserGroup {
            id,
            name,
            parent_group_id,
        })
        .collect())
}

pub async fn group_members<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    group_id: &str,
) -> Result<Vec<String>, StorageError> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT user_id FROM user_group_memberships WHERE group_id = $1 AND is_active ORDER BY user_id",
    )
    .bind(group_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn role_permissions<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role_id: &str,
) -> Result<Vec<RolePermission>, StorageError> {
    let rows: Vec<(
        String,
        String,
        String,
        String,
        Option<String>,
        Option<serde_json::Value>,
    )> = sqlx::query_as(
        r#"
        SELECT p.id, p.resource_type, p.action, p.effect, rp.effect_override, rp.conditions
        FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id
        WHERE rp.role_id = $1
        ORDER BY p.id
        "#,
    )
    .bind(role_id)
    .fetch_all(executor)
    .await
    .map_err(to_storage_error)?;

    rows.into_iter()
        .map(
            |(id, resource_type, action, effect, effect_override, conditions)| {
                Ok(RolePermission {
                    role_id: role_id.to_string(),
                    permission: Permission {
                        id,
                        resource_type,
                        action,
                        effect: parse_effect("permission", &effect)?,
                    },
                    effect_override: effect_override
                        .as_deref()
                        .map(|raw| parse_effect("role_permission", raw))
                        .transpose()?,
                    conditions,
                })
            },
        )
        .collect()
}

/// `column` is one of the fixed parent columns below, never caller input.
pub async fn parent_of<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    table: &'static str,
    column: &'static str,
    id: &str,
) -> Result<Option<String>, StorageError> {
    let query = format!("SELECT {column} FROM {table} WHERE id = $1");
    let row: Option<(Option<String>,)> = sqlx::query_as(&query)
        .bind(id)
        .fetch_optional(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(row.and_then(|(parent,)| parent))
}

pub async fn upsert_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role: &Role,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO roles (id, name, level, parent_role_id, is_system, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            level = EXCLUDED.level,
            parent_role_id = EXCLUDED.parent_role_id,
            is_system = EXCLUDED.is_system,
            is_active = EXCLUDED.is_active
        "#,
    )
    .bind(&role.id)
    .bind(&role.name)
    .bind(role.level)
    .bind(&role.parent_role_id)
    .bind(role.is_system)
    .bind(role.is_active)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn upsert_permission<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    permission: &Permission,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO permissions (id, resource_type, action, effect)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            resource_type = EXCLUDED.resource_type,
            action = EXCLUDED.action,
            effect = EXCLUDED.effect
        "#,
    )
    .bind(&permission.id)
    .bind(&permission.resource_type)
    .bind(&permission.action)
    .bind(permission.effect.as_str())
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn upsert_resource<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    resource: &Resource,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO resources (id, resource_type, identifier, parent_resource_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE SET
            resource_type = EXCLUDED.resource_type,
            identifier = EXCLUDED.identifier,
            parent_resource_id = EXCLUDED.parent_resource_id
        "#,
    )
    .bind(&resource.id)
    .bind(&resource.resource_type)
    .bind(&resource.identifier)
    .bind(&resource.parent_resource_id)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn upsert_group<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    group: &UserGroup,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO user_groups (id, name, parent_group_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            parent_group_id = EXCLUDED.parent_group_id
        "#,
    )
    .bind(&group.id)
    .bind(&group.name)
    .bind(&group.parent_group_id)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn bind_permission<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    role_id: &str,
    permission_id: &str,
    effect_override: Option<Effect>,
    conditions: Option<serde_json::Value>,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO role_permissions (role_id, permission_id, effect_override, conditions)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (role_id, permission_id) DO UPDATE SET
            effect_override = EXCLUDED.effect_override,
            conditions = EXCLUDED.conditions
        "#,
    )
    .bind(role_id)
    .bind(permission_id)
    .bind(effect_override.map(|e| e.as_str()))
    .bind(conditions)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn upsert_user_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    assignment: &UserRole,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id, resource_id, expires_at, is_active)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id, role_id, (COALESCE(resource_id, ''))) DO UPDATE SET
            expires_at = EXCLUDED.expires_at,
            is_active = EXCLUDED.is_active
        "#,
    )
    .bind(&assignment.user_id)
    .bind(&assignment.role_id)
    .bind(&assignment.resource_id)
    .bind(assignment.expires_at)
    .bind(assignment.is_active)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn upsert_group_role<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    assignment: &GroupRole,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO group_roles (group_id, role_id, resource_id, expires_at, is_active)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (group_id, role_id, (COALESCE(resource_id, ''))) DO UPDATE SET
            expires_at = EXCLUDED.expires_at,
            is_active = EXCLUDED.is_active
        "#,
    )
    .bind(&assignment.group_id)
    .bind(&assignment.role_id)
    .bind(&assignment.resource_id)
    .bind(assignment.expires_at)
    .bind(assignment.is_active)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

/// `table` and `owner_column` name one of the two assignment tables.
pub async fn delete_assignment<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    table: &'static str,
    owner_column: &'static str,
    owner_id: &str,
    role_id: &str,
    resource_id: Option<&str>,
) -> Result<bool, StorageError> {
    let query = format!(
        "DELETE FROM {table} WHERE {owner_column} = $1 AND role_id = $2 \
         AND resource_id IS NOT DISTINCT FROM $3"
    );
    let result = sqlx::query(&query)
        .bind(owner_id)
        .bind(role_id)
        .bind(resource_id)
        .execute(executor)
        .await
        .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_membership<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    membership: &UserGroupMembership,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO user_group_memberships (user_id, group_id, is_active)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, group_id) DO UPDATE SET is_active = EXCLUDED.is_active
        "#,
    )
    .bind(&membership.user_id)
    .bind(&membership.group_id)
    .bind(membership.is_active)
    .execute(executor)
    .await
    .map_err(to_storage_error)?;
    Ok(())
}

pub async fn delete_membership<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    user_id: &str,
    group_id: &str,
) -> Result<bool, StorageError> {
    let result =
        sqlx::query("DELETE FROM user_group_memberships WHERE user_id = $1 AND group_id = $2")
            .bind(user_id)
            .bind(group_id)
            .execute(executor)
            .await
            .map_err(to_storage_error)?;
    Ok(result.rows_affected() > 0)
}
