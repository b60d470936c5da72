//! Registry records.

use std::fmt;

use chrono::{DateTime, Utc};
use lab_core::{LabId, PrincipalId};

use crate::error::{TenancyError, TenancyResult};

/// Lifecycle status of a registered lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }

    pub fn parse(s: &str) -> TenancyResult<Self> {
        match s {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            other => Err(TenancyError::UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered lab. `db_name` is derived once from the display name
/// at onboarding and never changes.
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: LabId,
    pub display_name: String,
    pub db_name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
}

/// A system-wide user account, independent of any tenant database.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct TenantRow {
    pub id: i64,
    pub display_name: String,
    pub db_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = TenancyError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            id: LabId::new(row.id),
            display_name: row.display_name,
            db_name: row.db_name,
            status: TenantStatus::parse(&row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PrincipalRow {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<PrincipalRow> for Principal {
    fn from(row: PrincipalRow) -> Self {
        Principal {
            id: PrincipalId::new(row.id),
            email: row.email,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}
