//! In-memory registry for tests and demos.
//!
//! Mirrors the Postgres directory's semantics closely enough to drive
//! the guard chain without a database: same error kinds, same
//! replace-on-reassign role behavior.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use lab_ability::Role;
use lab_core::{LabId, PrincipalId};
use parking_lot::RwLock;

use crate::directory::TenantDirectory;
use crate::error::{TenancyError, TenancyResult};
use crate::model::{Principal, Tenant, TenantStatus};

#[derive(Default)]
struct Inner {
    tenants: HashMap<LabId, Tenant>,
    members: HashSet<(LabId, PrincipalId)>,
    roles: HashMap<(LabId, PrincipalId), Role>,
    principals: HashMap<String, Principal>,
    next_principal_id: i64,
}

/// A registry that lives entirely in process memory.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<Inner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant directly, bypassing provisioning.
    pub fn insert_tenant(&self, id: LabId, display_name: &str, db_name: &str) -> Tenant {
        let tenant = Tenant {
            id,
            display_name: display_name.to_string(),
            db_name: db_name.to_string(),
            status: TenantStatus::Active,
            created_at: Utc::now(),
        };
        self.inner.write().tenants.insert(id, tenant.clone());
        tenant
    }

    /// Make the principal a member of the lab with the given role.
    pub fn set_member_role(&self, lab: LabId, principal: PrincipalId, role: Role) {
        let mut inner = self.inner.write();
        inner.members.insert((lab, principal));
        inner.roles.insert((lab, principal), role);
    }
}

#[async_trait]
impl TenantDirectory for MemoryDirectory {
    async fn resolve(&self, lab: LabId) -> TenancyResult<Tenant> {
        self.inner
            .read()
            .tenants
            .get(&lab)
            .cloned()
            .ok_or(TenancyError::TenantNotFound(lab))
    }

    async fn is_member(&self, principal: PrincipalId, lab: LabId) -> TenancyResult<bool> {
        Ok(self.inner.read().members.contains(&(lab, principal)))
    }

    async fn member_role(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<Role> {
        let inner = self.inner.read();
        if !inner.tenants.contains_key(&lab) {
            return Err(TenancyError::TenantNotFound(lab));
        }
        inner
            .roles
            .get(&(lab, principal))
            .cloned()
            .ok_or(TenancyError::RoleNotAssigned { lab, principal })
    }

    async fn find_principal(&self, email: &str) -> TenancyResult<Principal> {
        self.inner
            .read()
            .principals
            .get(email)
            .cloned()
            .ok_or_else(|| TenancyError::PrincipalNotFound(email.to_string()))
    }

    async fn create_principal(
        &self,
        email: &str,
        password_hash: &str,
    ) -> TenancyResult<Principal> {
        let mut inner = self.inner.write();
        if inner.principals.contains_key(email) {
            return Err(TenancyError::DuplicateEmail(email.to_string()));
        }
        inner.next_principal_id += 1;
        let principal = Principal {
            id: PrincipalId::new(inner.next_principal_id),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        inner
            .principals
            .insert(email.to_string(), principal.clone());
        Ok(principal)
    }

    async fn add_member(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<()> {
        let mut inner = self.inner.write();
        if !inner.tenants.contains_key(&lab) {
            return Err(TenancyError::TenantNotFound(lab));
        }
        inner.members.insert((lab, principal));
        Ok(())
    }

    async fn remove_member(&self, lab: LabId, principal: PrincipalId) -> TenancyResult<()> {
        let mut inner = self.inner.write();
        inner.members.remove(&(lab, principal));
        inner.roles.remove(&(lab, principal));
        Ok(())
    }

    async fn labs_for(&self, principal: PrincipalId) -> TenancyResult<Vec<Tenant>> {
        let inner = self.inner.read();
        let mut labs: Vec<Tenant> = inner
            .members
            .iter()
            .filter(|(_, p)| *p == principal)
            .filter_map(|(lab, _)| inner.tenants.get(lab).cloned())
            .collect();
        labs.sort_by_key(|t| t.id);
        Ok(labs)
    }
}
