//! The system registry.
//!
//! `TenantDirectory` is the seam business code and the guard chain see:
//! tenant resolution, membership checks and the role lookup behind
//! context repopulation. The Postgres implementation keeps labs,
//! principals and memberships in the system database; member roles
//! live inside each tenant database and are reached through the pools.

use std::sync::Arc;

use async_trait::async_trait;
use lab_ability::Role;
use lab_core::{LabId, PrincipalId};
use sqlx::PgPool;

use crate::error::{map_unique_violation, TenancyError, TenancyResult};
use crate::model::{Principal, PrincipalRow, Tenant, TenantRow};
use crate::pool::TenantPools;
use crate::roles;

/// Registry contract consumed by the guard chain and admin surfaces.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Look up a tenant by id. NotFound when unknown.
    async fn resolve(&self, lab: LabId) -> TenancyResult<Tenant>;

    /// Whether the principal is a member of the lab.
    async fn is_member(&self, principal: PrincipalId, lab: LabId) -> TenancyResult<bool>;

    /// The member's role inside the lab, permissions included.
    async fn member_role(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<Role>;

    async fn find_principal(&self, email: &str) -> TenancyResult<Principal>;

    async fn create_principal(&self, email: &str, password_hash: &str)
        -> TenancyResult<Principal>;

    async fn add_member(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<()>;

    async fn remove_member(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<()>;

    /// Labs the principal belongs to, ordered by id.
    async fn labs_for(&self, principal: PrincipalId) -> TenancyResult<Vec<Tenant>>;
}

/// Postgres-backed registry.
pub struct PgTenantDirectory {
    system: PgPool,
    pools: Arc<TenantPools>,
}

impl PgTenantDirectory {
    pub fn new(system: PgPool, pools: Arc<TenantPools>) -> Self {
        Self { system, pools }
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn resolve(&self, lab: LabId) -> TenancyResult<Tenant> {
        let row = sqlx::query_as::<_, TenantRow>(
            "SELECT id, display_name, db_name, status, created_at FROM labs WHERE id = $1",
        )
        .bind(lab.as_i64())
        .fetch_optional(&self.system)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(TenancyError::TenantNotFound(lab)),
        }
    }

    async fn is_member(&self, principal: PrincipalId, lab: LabId) -> TenancyResult<bool> {
        let member: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lab_members WHERE lab_id = $1 AND principal_id = $2)",
        )
        .bind(lab.as_i64())
        .bind(principal.as_i64())
        .fetch_one(&self.system)
        .await?;
        Ok(member)
    }

    async fn member_role(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<Role> {
        let tenant = self.resolve(lab).await?;
        let handle = self.pools.handle(&tenant.db_name);
        roles::role_for_member(&handle, principal)
            .await?
            .ok_or(TenancyError::RoleNotAssigned { lab, principal })
    }

    async fn find_principal(&self, email: &str) -> TenancyResult<Principal> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "SELECT id, email, password_hash, created_at FROM principals WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.system)
        .await?;

        row.map(Principal::from)
            .ok_or_else(|| TenancyError::PrincipalNotFound(email.to_string()))
    }

    async fn create_principal(
        &self,
        email: &str,
        password_hash: &str,
    ) -> TenancyResult<Principal> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            "INSERT INTO principals (email, password_hash) VALUES ($1, $2) \
             RETURNING id, email, password_hash, created_at",
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.system)
        .await
        .map_err(|e| map_unique_violation(e, TenancyError::DuplicateEmail(email.to_string())))?;

        Ok(row.into())
    }

    async fn add_member(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<()> {
        // Resolve first so an unknown lab is NotFound, not an FK error.
        self.resolve(lab).await?;
        sqlx::query(
            "INSERT INTO lab_members (lab_id, principal_id) VALUES ($1, $2) \
             ON CONFLICT (lab_id, principal_id) DO NOTHING",
        )
        .bind(lab.as_i64())
        .bind(principal.as_i64())
        .execute(&self.system)
        .await?;
        Ok(())
    }

    async fn remove_member(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<()> {
        sqlx::query("DELETE FROM lab_members WHERE lab_id = $1 AND principal_id = $2")
            .bind(lab.as_i64())
            .bind(principal.as_i64())
            .execute(&self.system)
            .await?;
        Ok(())
    }

    async fn labs_for(&self, principal: PrincipalId) -> TenancyResult<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            "SELECT t.id, t.display_name, t.db_name, t.status, t.created_at \
             FROM labs t JOIN lab_members m ON m.lab_id = t.id \
             WHERE m.principal_id = $1 ORDER BY t.id",
        )
        .bind(principal.as_i64())
        .fetch_all(&self.system)
        .await?;

        rows.into_iter().map(Tenant::try_from).collect()
    }
}
