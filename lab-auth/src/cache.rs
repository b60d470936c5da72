//! Per-principal authorization cache.
//!
//! One entry per principal holding the lab they are working in and
//! the grants compiled from their role there. Selecting another lab
//! replaces the whole entry; entries are never merged. The cache is
//! bounded, evicts least-recently-useful entries past capacity, and
//! can additionally expire entries on a clock.

use std::sync::Arc;
use std::time::Duration;

use lab_ability::GrantTable;
use lab_core::{LabConfigSnapshot, LabId, PrincipalId};
use moka::sync::Cache;

/// Everything the guard chain needs to authorize one principal's
/// requests against their currently selected lab.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub principal: PrincipalId,
    pub lab: LabId,
    /// Tenant database name, resolved once and carried here so the
    /// hot path does not re-query the registry for it.
    pub db_name: String,
    pub role_name: String,
    pub grants: Arc<GrantTable>,
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Maximum number of cached principals.
    pub capacity: u64,
    /// Optional wall-clock expiry per entry. None keeps entries until
    /// they are evicted or replaced.
    pub ttl: Option<Duration>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: 1024,
            ttl: None,
        }
    }
}

impl CacheOptions {
    /// Read `auth.cache_capacity` and `auth.cache_ttl_secs`.
    pub fn from_config(config: &LabConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            capacity: config
                .get_u64("auth.cache_capacity")
                .unwrap_or(defaults.capacity),
            ttl: config.get_duration_secs("auth.cache_ttl_secs"),
        }
    }
}

/// Bounded cache of [`AuthorizationContext`] keyed by principal.
pub struct AuthorizationCache {
    entries: Cache<i64, Arc<AuthorizationContext>>,
}

impl AuthorizationCache {
    pub fn new(options: CacheOptions) -> Self {
        let mut builder = Cache::builder().max_capacity(options.capacity);
        if let Some(ttl) = options.ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            entries: builder.build(),
        }
    }

    /// Store the context, replacing any previous entry for the same
    /// principal. Last write wins.
    pub fn set_context(&self, context: AuthorizationContext) {
        self.entries
            .insert(context.principal.as_i64(), Arc::new(context));
    }

    pub fn get_context(&self, principal: PrincipalId) -> Option<Arc<AuthorizationContext>> {
        self.entries.get(&principal.as_i64())
    }

    /// Drop one principal's entry, forcing repopulation on next use.
    pub fn invalidate(&self, principal: PrincipalId) {
        self.entries.invalidate(&principal.as_i64());
    }

    /// Drop everything, e.g. after roles changed.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate entry count; exact after [`Self::sync`].
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush pending maintenance so counts and evictions are visible.
    pub fn sync(&self) {
        self.entries.run_pending_tasks();
    }
}

impl Default for AuthorizationCache {
    fn default() -> Self {
        Self::new(CacheOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lab_ability::{GrantTable, PermissionRule};

    fn context_for(principal: i64, lab: i64, role_name: &str) -> AuthorizationContext {
        let rules = vec![PermissionRule::new("read", "Patient")];
        AuthorizationContext {
            principal: PrincipalId::new(principal),
            lab: LabId::new(lab),
            db_name: format!("lab_{lab}"),
            role_name: role_name.to_string(),
            grants: Arc::new(GrantTable::compile(&rules).unwrap()),
        }
    }

    #[test]
    fn get_returns_what_set_stored() {
        let cache = AuthorizationCache::default();
        cache.set_context(context_for(1, 7, "technician"));

        let context = cache.get_context(PrincipalId::new(1)).unwrap();
        assert_eq!(context.lab, LabId::new(7));
        assert_eq!(context.db_name, "lab_7");
        assert_eq!(context.role_name, "technician");
    }

    #[test]
    fn missing_principal_is_none() {
        let cache = AuthorizationCache::default();
        assert!(cache.get_context(PrincipalId::new(404)).is_none());
    }

    #[test]
    fn switching_labs_replaces_the_entry() {
        let cache = AuthorizationCache::default();
        cache.set_context(context_for(1, 7, "technician"));

        // Same principal selects a different lab.
        cache.set_context(context_for(1, 8, "admin"));

        let context = cache.get_context(PrincipalId::new(1)).unwrap();
        assert_eq!(context.lab, LabId::new(8));
        assert_eq!(context.role_name, "admin");
        cache.sync();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let cache = AuthorizationCache::new(CacheOptions {
            capacity: 2,
            ttl: None,
        });
        for principal in 1..=10 {
            cache.set_context(context_for(principal, 1, "technician"));
        }

        cache.sync();
        assert!(cache.len() <= 2);
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = AuthorizationCache::new(CacheOptions {
            capacity: 16,
            ttl: Some(Duration::from_millis(50)),
        });
        cache.set_context(context_for(1, 7, "technician"));
        assert!(cache.get_context(PrincipalId::new(1)).is_some());

        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get_context(PrincipalId::new(1)).is_none());
    }

    #[test]
    fn invalidate_drops_only_that_principal() {
        let cache = AuthorizationCache::default();
        cache.set_context(context_for(1, 7, "technician"));
        cache.set_context(context_for(2, 7, "admin"));

        cache.invalidate(PrincipalId::new(1));

        assert!(cache.get_context(PrincipalId::new(1)).is_none());
        assert!(cache.get_context(PrincipalId::new(2)).is_some());
    }
}
