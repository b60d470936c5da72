use std::time::Duration;

use lab_core::{LabError, LabId, PrincipalId};
use thiserror::Error;

/// Result type for tenancy operations
pub type TenancyResult<T> = Result<T, TenancyError>;

/// Errors raised by the registry, the provisioner and the pools.
#[derive(Error, Debug)]
pub enum TenancyError {
    #[error("Lab {0} is not registered")]
    TenantNotFound(LabId),

    #[error("No principal registered for {0:?}")]
    PrincipalNotFound(String),

    #[error("No role assigned to principal {principal} in lab {lab}")]
    RoleNotAssigned { lab: LabId, principal: PrincipalId },

    #[error("Role {0:?} does not exist in this lab")]
    RoleNotFound(String),

    #[error("Lab {0:?} is already registered")]
    DuplicateTenant(String),

    #[error("Email {0:?} is already registered")]
    DuplicateEmail(String),

    #[error("Invalid tenant database name {0:?}")]
    InvalidName(String),

    #[error("Unknown tenant status {0:?}")]
    UnknownStatus(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("Stored permissions for role {role:?} are malformed: {source}")]
    BadRoleRules {
        role: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl TenancyError {
    /// Errors worth another attempt: I/O faults, pool exhaustion and
    /// connection-class (08xxx) server responses.
    pub fn is_transient(&self) -> bool {
        match self {
            TenancyError::Database(err) => match err {
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
                sqlx::Error::Database(db) => {
                    matches!(db.code().as_deref(), Some(code) if code.starts_with("08") || code == "57P03")
                }
                _ => false,
            },
            _ => false,
        }
    }
}

/// Map a unique violation onto a domain conflict, keep everything else.
pub(crate) fn map_unique_violation(err: sqlx::Error, conflict: TenancyError) -> TenancyError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => conflict,
        _ => TenancyError::Database(err),
    }
}

impl From<TenancyError> for LabError {
    fn from(err: TenancyError) -> Self {
        match &err {
            TenancyError::TenantNotFound(_)
            | TenancyError::PrincipalNotFound(_)
            | TenancyError::RoleNotFound(_)
            | TenancyError::RoleNotAssigned { .. } => LabError::not_found(err.to_string()),
            TenancyError::DuplicateTenant(_) | TenancyError::DuplicateEmail(_) => {
                LabError::conflict(err.to_string())
            }
            TenancyError::InvalidName(_) => LabError::bad_request(err.to_string()),
            TenancyError::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
                LabError::unavailable(err.to_string()).with_source(err.into())
            }
            TenancyError::Timeout { .. }
            | TenancyError::UnknownStatus(_)
            | TenancyError::BadRoleRules { .. }
            | TenancyError::Database(_)
            | TenancyError::Migration(_) => {
                LabError::fatal(err.to_string()).with_source(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::LabErrorKind;

    #[test]
    fn transient_classification() {
        let io = TenancyError::Database(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert!(io.is_transient());
        assert!(TenancyError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!TenancyError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!TenancyError::DuplicateTenant("lab_acme".into()).is_transient());
    }

    #[test]
    fn taxonomy_mapping() {
        let err: LabError = TenancyError::TenantNotFound(LabId::new(7)).into();
        assert_eq!(err.kind, LabErrorKind::NotFound);

        let err: LabError = TenancyError::DuplicateTenant("lab_acme_lab".into()).into();
        assert_eq!(err.kind, LabErrorKind::Conflict);

        let err: LabError = TenancyError::InvalidName("lab-💥".into()).into();
        assert_eq!(err.kind, LabErrorKind::BadRequest);

        let err: LabError = TenancyError::Timeout {
            what: "tenant provisioning",
            after: Duration::from_secs(30),
        }
        .into();
        assert_eq!(err.kind, LabErrorKind::Fatal);
    }
}
