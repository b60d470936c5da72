//! Tenant provisioning: registry rows, database creation, migrations.
//!
//! Provisioning is idempotent at the database level (create-if-absent
//! plus versioned migrations) and serialized per database name with a
//! Postgres advisory lock, so two concurrent registrations of the same
//! lab cannot race `CREATE DATABASE`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lab_core::{LabConfigSnapshot, LabId};
use serde::Serialize;
use sqlx::migrate::Migrator;
use sqlx::{Connection, PgPool};
use tracing::{error, info, instrument, warn};

use crate::error::{TenancyError, TenancyResult};
use crate::pool::TenantPools;

static SYSTEM_MIGRATOR: Migrator = sqlx::migrate!("./migrations/system");
static TENANT_MIGRATOR: Migrator = sqlx::migrate!("./migrations/tenant");

/// Postgres truncates identifiers beyond this.
const MAX_DB_NAME_LEN: usize = 63;

/// Tuning knobs for provisioning.
#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    /// Attempts per retryable step before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_backoff: Duration,
    /// Upper bound on the backoff delay.
    pub max_backoff: Duration,
    /// Wall-clock limit for creating and migrating one database.
    pub timeout: Duration,
}

impl Default for ProvisionerOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ProvisionerOptions {
    pub fn from_config(config: &LabConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: config
                .get_u32("tenancy.max_attempts")
                .unwrap_or(defaults.max_attempts),
            base_backoff: config
                .get_u64("tenancy.base_backoff_ms")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            max_backoff: config
                .get_duration_secs("tenancy.max_backoff_secs")
                .unwrap_or(defaults.max_backoff),
            timeout: config
                .get_duration_secs("tenancy.provision_timeout_secs")
                .unwrap_or(defaults.timeout),
        }
    }
}

/// Outcome of registering a lab.
#[derive(Debug, Clone, Serialize)]
pub struct Provisioned {
    pub lab: LabId,
    pub db_name: String,
    /// True when the tenant database was created by this call, false
    /// when it already existed from an earlier partial attempt.
    pub created: bool,
}

/// Derive the tenant database name from a display name.
///
/// `"Acme Lab"` becomes `"lab_acme_lab"`: lowercased, runs of
/// non-alphanumeric characters collapsed to a single underscore.
pub fn db_name_for(display_name: &str) -> TenancyResult<String> {
    let mut slug = String::with_capacity(display_name.len());
    let mut last_was_sep = true;
    for ch in display_name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        return Err(TenancyError::InvalidName(display_name.to_string()));
    }
    let mut db_name = format!("lab_{slug}");
    if db_name.len() > MAX_DB_NAME_LEN {
        db_name.truncate(MAX_DB_NAME_LEN);
        while db_name.ends_with('_') {
            db_name.pop();
        }
    }
    Ok(db_name)
}

/// Reject anything that is not safe to splice into `CREATE DATABASE`.
///
/// Database names cannot be bound as query parameters, so every name
/// passes through here before being formatted into SQL.
pub fn validate_db_name(db_name: &str) -> TenancyResult<()> {
    let ok = !db_name.is_empty()
        && db_name.len() <= MAX_DB_NAME_LEN
        && db_name.starts_with(|c: char| c.is_ascii_lowercase())
        && db_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(TenancyError::InvalidName(db_name.to_string()))
    }
}

/// Creates tenant databases and keeps the registry in step with them.
pub struct Provisioner {
    system: PgPool,
    pools: Arc<TenantPools>,
    options: ProvisionerOptions,
}

impl Provisioner {
    pub fn new(system: PgPool, pools: Arc<TenantPools>, options: ProvisionerOptions) -> Self {
        Self {
            system,
            pools,
            options,
        }
    }

    /// Run registry migrations on the system database.
    pub async fn migrate_system(&self) -> TenancyResult<()> {
        SYSTEM_MIGRATOR.run(&self.system).await?;
        Ok(())
    }

    /// Register a lab: insert the registry row, then create and
    /// migrate its database.
    ///
    /// A second registration that normalizes to the same database name
    /// fails with a duplicate error and leaves the first lab intact.
    /// If database provisioning fails the registry row is deleted
    /// again, so a later registration can start clean. A timeout skips
    /// that compensation: the database state is unknown and the row
    /// lets an operator find the half-provisioned lab.
    #[instrument(skip(self), fields(display_name = %display_name))]
    pub async fn register(&self, display_name: &str) -> TenancyResult<Provisioned> {
        let db_name = db_name_for(display_name)?;
        validate_db_name(&db_name)?;

        let lab = self.insert_registry_row(display_name, &db_name).await?;

        match tokio::time::timeout(self.options.timeout, self.ensure_database(&db_name)).await {
            Ok(Ok(created)) => {
                info!(lab = %lab, db_name = %db_name, created, "lab registered");
                Ok(Provisioned {
                    lab,
                    db_name,
                    created,
                })
            }
            Ok(Err(err)) => {
                self.compensate_registry_row(lab, &db_name).await;
                Err(err)
            }
            Err(_) => Err(TenancyError::Timeout {
                what: "provision",
                after: self.options.timeout,
            }),
        }
    }

    /// Create the database if absent and bring it to the latest
    /// migration, serialized by an advisory lock on the name.
    ///
    /// Returns true when the database was created by this call.
    pub async fn ensure_database(&self, db_name: &str) -> TenancyResult<bool> {
        validate_db_name(db_name)?;
        self.with_retries("ensure_database", || self.locked_provision(db_name))
            .await
    }

    /// Run tenant migrations against an existing database.
    pub async fn migrate(&self, db_name: &str) -> TenancyResult<()> {
        validate_db_name(db_name)?;
        let handle = self.pools.handle(db_name);
        match tokio::time::timeout(self.options.timeout, TENANT_MIGRATOR.run(handle.pool())).await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(TenancyError::Timeout {
                what: "migrate",
                after: self.options.timeout,
            }),
        }
    }

    /// Drop a lab's database and remove it from the registry.
    ///
    /// Open backends are terminated first so the drop cannot hang on
    /// a stray connection.
    #[instrument(skip(self), fields(lab = %lab))]
    pub async fn drop_database(&self, lab: LabId) -> TenancyResult<()> {
        let row: Option<(String,)> = sqlx::query_as("SELECT db_name FROM labs WHERE id = $1")
            .bind(lab.as_i64())
            .fetch_optional(&self.system)
            .await?;
        let (db_name,) = row.ok_or(TenancyError::TenantNotFound(lab))?;
        validate_db_name(&db_name)?;

        self.pools.close(&db_name).await;

        sqlx::query(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(&db_name)
        .execute(&self.system)
        .await?;

        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\""))
            .execute(&self.system)
            .await?;

        sqlx::query("DELETE FROM labs WHERE id = $1")
            .bind(lab.as_i64())
            .execute(&self.system)
            .await?;

        info!(db_name = %db_name, "lab database dropped");
        Ok(())
    }

    async fn insert_registry_row(
        &self,
        display_name: &str,
        db_name: &str,
    ) -> TenancyResult<LabId> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO labs (display_name, db_name, status) \
             VALUES ($1, $2, 'active') \
             ON CONFLICT (db_name) DO NOTHING \
             RETURNING id",
        )
        .bind(display_name)
        .bind(db_name)
        .fetch_optional(&self.system)
        .await?;
        match inserted {
            Some((id,)) => Ok(LabId::new(id)),
            None => Err(TenancyError::DuplicateTenant(db_name.to_string())),
        }
    }

    async fn compensate_registry_row(&self, lab: LabId, db_name: &str) {
        let result = sqlx::query("DELETE FROM labs WHERE id = $1")
            .bind(lab.as_i64())
            .execute(&self.system)
            .await;
        if let Err(err) = result {
            error!(lab = %lab, db_name = %db_name, error = %err,
                "failed to roll back registry row after provisioning error");
        }
    }

    /// One serialized create-and-migrate pass.
    ///
    /// The advisory lock lives on a dedicated connection detached from
    /// the pool; closing the connection releases the lock even if this
    /// future is cancelled mid-way.
    async fn locked_provision(&self, db_name: &str) -> TenancyResult<bool> {
        let mut conn = self.system.acquire().await?.detach();

        let result: TenancyResult<bool> = async {
            sqlx::query("SELECT pg_advisory_lock(hashtext($1))")
                .bind(db_name)
                .execute(&mut conn)
                .await?;

            let created = self.create_if_absent(&mut conn, db_name).await?;

            let handle = self.pools.handle(db_name);
            TENANT_MIGRATOR.run(handle.pool()).await?;

            sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
                .bind(db_name)
                .execute(&mut conn)
                .await?;
            Ok(created)
        }
        .await;

        let _ = conn.close().await;
        result
    }

    async fn create_if_absent(
        &self,
        conn: &mut sqlx::PgConnection,
        db_name: &str,
    ) -> TenancyResult<bool> {
        let exists: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM pg_database WHERE datname = $1")
                .bind(db_name)
                .fetch_optional(&mut *conn)
                .await?;
        if exists.is_some() {
            return Ok(false);
        }

        // Identifier validated by validate_db_name; names cannot be
        // bound as parameters here.
        match sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => {
                info!(db_name = %db_name, "tenant database created");
                Ok(true)
            }
            Err(err) if is_duplicate_database(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn with_retries<T, F, Fut>(&self, what: &'static str, mut op: F) -> TenancyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TenancyResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.options.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(what, attempt, delay_ms = delay.as_millis() as u64, error = %err,
                        "transient failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.options.base_backoff.saturating_mul(1 << shift);
        delay.min(self.options.max_backoff)
    }
}

fn is_duplicate_database(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("42P04"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_core::LabConfig;

    #[test]
    fn db_name_normalization() {
        assert_eq!(db_name_for("Acme Lab").unwrap(), "lab_acme_lab");
        assert_eq!(db_name_for("acme").unwrap(), "lab_acme");
        assert_eq!(db_name_for("  Acme -- Lab  ").unwrap(), "lab_acme_lab");
        assert_eq!(db_name_for("Lab #42").unwrap(), "lab_lab_42");
        assert!(matches!(
            db_name_for("---"),
            Err(TenancyError::InvalidName(_))
        ));
        assert!(matches!(
            db_name_for(""),
            Err(TenancyError::InvalidName(_))
        ));
    }

    #[test]
    fn db_name_truncated_to_identifier_limit() {
        let long = "x".repeat(100);
        let name = db_name_for(&long).unwrap();
        assert!(name.len() <= MAX_DB_NAME_LEN);
        assert!(name.starts_with("lab_"));
        validate_db_name(&name).unwrap();
    }

    #[test]
    fn db_name_validation() {
        validate_db_name("lab_acme").unwrap();
        validate_db_name("lab_acme_2").unwrap();
        assert!(validate_db_name("Lab_Acme").is_err());
        assert!(validate_db_name("lab-acme").is_err());
        assert!(validate_db_name("lab acme").is_err());
        assert!(validate_db_name("lab\"; DROP DATABASE postgres").is_err());
        assert!(validate_db_name("").is_err());
        assert!(validate_db_name("7lab").is_err());
    }

    #[tokio::test]
    async fn backoff_doubles_and_caps() {
        let options = crate::pool::TenantPoolOptions::new("postgres://localhost/lab_system");
        let provisioner = Provisioner::new(
            crate::pool::connect_system(&options).unwrap(),
            Arc::new(TenantPools::new(options).unwrap()),
            ProvisionerOptions::default(),
        );
        assert_eq!(provisioner.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(provisioner.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(provisioner.backoff_delay(3), Duration::from_millis(800));
        // Deep attempts saturate at the configured maximum.
        assert_eq!(provisioner.backoff_delay(30), Duration::from_secs(5));
    }

    #[test]
    fn options_from_config() {
        let mut config = LabConfig::new();
        config.set("tenancy.max_attempts", "5");
        config.set("tenancy.base_backoff_ms", "50");
        let options = ProvisionerOptions::from_config(&config.snapshot());
        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.base_backoff, Duration::from_millis(50));
        assert_eq!(options.timeout, Duration::from_secs(30));
    }
}
