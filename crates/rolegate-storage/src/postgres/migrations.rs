use sqlx::PgPool;

use crate::traits::StorageError;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "roles",
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            level           INTEGER NOT NULL DEFAULT 0,
            parent_role_id  TEXT,
            is_system       BOOLEAN NOT NULL DEFAULT false,
            is_active       BOOLEAN NOT NULL DEFAULT true
        )
        "#,
    ),
    (
        "permissions",
        r#"
        CREATE TABLE IF NOT EXISTS permissions (
            id              TEXT PRIMARY KEY,
            resource_type   TEXT NOT NULL,
            action          TEXT NOT NULL,
            effect          TEXT NOT NULL
        )
        "#,
    ),
    (
        "resources",
        r#"
        CREATE TABLE IF NOT EXISTS resources (
            id                  TEXT PRIMARY KEY,
            resource_type       TEXT NOT NULL,
            identifier          TEXT NOT NULL,
            parent_resource_id  TEXT
        )
        "#,
    ),
    (
        "user_groups",
        r#"
        CREATE TABLE IF NOT EXISTS user_groups (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            parent_group_id TEXT
        )
        "#,
    ),
    (
        "role_permissions",
        r#"
        CREATE TABLE IF NOT EXISTS role_permissions (
            role_id         TEXT NOT NULL REFERENCES roles(id),
            permission_id   TEXT NOT NULL REFERENCES permissions(id),
            effect_override TEXT,
            conditions      JSONB,
            PRIMARY KEY (role_id, permission_id)
        )
        "#,
    ),
    (
        "user_roles",
        r#"
        CREATE TABLE IF NOT EXISTS user_roles (
            user_id     TEXT NOT NULL,
            role_id     TEXT NOT NULL REFERENCES roles(id),
            resource_id TEXT REFERENCES resources(id),
            expires_at  TIMESTAMPTZ,
            is_active   BOOLEAN NOT NULL DEFAULT true
        )
        "#,
    ),
    (
        "user_roles_key",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_user_roles_key
        ON user_roles (user_id, role_id, (COALESCE(resource_id, '')))
        "#,
    ),
    (
        "group_roles",
        r#"
        CREATE TABLE IF NOT EXISTS group_roles (
            group_id    TEXT NOT NULL REFERENCES user_groups(id),
            role_id     TEXT NOT NULL REFERENCES roles(id),
            resource_id TEXT REFERENCES resources(id),
            expires_at  TIMESTAMPTZ,
            is_active   BOOLEAN NOT NULL DEFAULT true
        )
        "#,
    ),
    (
        "group_roles_key",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_group_roles_key
        ON group_roles (group_id, role_id, (COALESCE(resource_id, '')))
        "#,
    ),
    (
        "user_group_memberships",
        r#"
        CREATE TABLE IF NOT EXISTS user_group_memberships (
            user_id     TEXT NOT NULL,
            group_id    TEXT NOT NULL REFERENCES user_groups(id),
            is_active   BOOLEAN NOT NULL DEFAULT true,
            PRIMARY KEY (user_id, group_id)
        )
        "#,
    ),
    (
        "memberships_by_group",
        r#"
        CREATE INDEX IF NOT EXISTS idx_memberships_group
        ON user_group_memberships (group_id, is_active)
        "#,
    ),
];

/// Idempotent: every statement is `IF NOT EXISTS`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StorageError> {
    for (name, statement) in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StorageError::Internal(format!("migration '{name}' failed: {e}")))?;
        tracing::debug!(migration = name, "migration applied");
    }
    tracing::info!(count = MIGRATIONS.len(), "migrations complete");
    Ok(())
}
