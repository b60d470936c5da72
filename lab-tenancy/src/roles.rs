//! Role storage inside a tenant database.
//!
//! Roles are created lazily, keyed by name: a second `ensure_role`
//! with the same name returns the stored role untouched, it never
//! overwrites permissions.

use lab_ability::{PermissionRule, Role};
use lab_core::PrincipalId;

use crate::error::{TenancyError, TenancyResult};
use crate::pool::LabHandle;

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: i64,
    name: String,
    description: Option<String>,
    permissions: serde_json::Value,
}

fn row_to_role(row: RoleRow) -> TenancyResult<Role> {
    let permissions: Vec<PermissionRule> =
        serde_json::from_value(row.permissions).map_err(|source| TenancyError::BadRoleRules {
            role: row.name.clone(),
            source,
        })?;
    Ok(Role {
        id: row.id,
        name: row.name,
        description: row.description,
        permissions,
    })
}

/// Fetch a role by name, if present.
pub async fn fetch_role(handle: &LabHandle, name: &str) -> TenancyResult<Option<Role>> {
    let row = sqlx::query_as::<_, RoleRow>(
        "SELECT id, name, description, permissions FROM roles WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(handle.pool())
    .await?;

    row.map(row_to_role).transpose()
}

/// Create-if-absent keyed by name.
pub async fn ensure_role(
    handle: &LabHandle,
    name: &str,
    description: Option<&str>,
    rules: &[PermissionRule],
) -> TenancyResult<Role> {
    if let Some(existing) = fetch_role(handle, name).await? {
        return Ok(existing);
    }

    let permissions =
        serde_json::to_value(rules).map_err(|source| TenancyError::BadRoleRules {
            role: name.to_string(),
            source,
        })?;

    let inserted = sqlx::query_as::<_, RoleRow>(
        "INSERT INTO roles (name, description, permissions) VALUES ($1, $2, $3) \
         ON CONFLICT (name) DO NOTHING RETURNING id, name, description, permissions",
    )
    .bind(name)
    .bind(description)
    .bind(&permissions)
    .fetch_optional(handle.pool())
    .await?;

    match inserted {
        Some(row) => row_to_role(row),
        // Lost the insert race; the winner's role is authoritative.
        None => fetch_role(handle, name)
            .await?
            .ok_or_else(|| TenancyError::RoleNotFound(name.to_string())),
    }
}

/// Bind a principal to a role inside this tenant database. Re-assigning
/// replaces the previous role.
pub async fn assign_role(
    handle: &LabHandle,
    principal: PrincipalId,
    role_id: i64,
) -> TenancyResult<()> {
    sqlx::query(
        "INSERT INTO lab_users (principal_id, role_id) VALUES ($1, $2) \
         ON CONFLICT (principal_id) DO UPDATE SET role_id = EXCLUDED.role_id",
    )
    .bind(principal.as_i64())
    .bind(role_id)
    .execute(handle.pool())
    .await?;
    Ok(())
}

/// The role assigned to a principal in this tenant database, if any.
pub async fn role_for_member(
    handle: &LabHandle,
    principal: PrincipalId,
) -> TenancyResult<Option<Role>> {
    let row = sqlx::query_as::<_, RoleRow>(
        "SELECT r.id, r.name, r.description, r.permissions \
         FROM lab_users u JOIN roles r ON r.id = u.role_id \
         WHERE u.principal_id = $1",
    )
    .bind(principal.as_i64())
    .fetch_optional(handle.pool())
    .await?;

    row.map(row_to_role).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_stored_permissions_are_reported() {
        let row = RoleRow {
            id: 1,
            name: "broken".to_string(),
            description: None,
            permissions: serde_json::json!({"actions": "read"}),
        };
        let err = row_to_role(row).unwrap_err();
        assert!(matches!(err, TenancyError::BadRoleRules { role, .. } if role == "broken"));
    }

    #[test]
    fn stored_permissions_decode() {
        let row = RoleRow {
            id: 3,
            name: "lab_tech".to_string(),
            description: Some("Runs tests".to_string()),
            permissions: serde_json::json!([
                {"actions": "read,update", "subject": "RequestMedicTest"},
                {"actions": "set_state", "subject": "RequestMedicTest", "fields": "IN_PROCESS,TO_VERIFY"}
            ]),
        };
        let role = row_to_role(row).unwrap();
        assert_eq!(role.permissions.len(), 2);
        assert_eq!(role.name, "lab_tech");
    }
}
