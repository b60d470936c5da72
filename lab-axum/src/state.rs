use std::sync::Arc;

use lab_auth::{AuthTokens, AuthorizationCache};
use lab_tenancy::{TenantDirectory, TenantPools};

/// Shared handles the guard chain and handlers pull from router state.
#[derive(Clone)]
pub struct LabState {
    pub directory: Arc<dyn TenantDirectory>,
    pub pools: Arc<TenantPools>,
    pub cache: Arc<AuthorizationCache>,
    pub tokens: Arc<AuthTokens>,
}

impl LabState {
    pub fn new(
        directory: Arc<dyn TenantDirectory>,
        pools: Arc<TenantPools>,
        cache: Arc<AuthorizationCache>,
        tokens: Arc<AuthTokens>,
    ) -> Self {
        Self {
            directory,
            pools,
            cache,
            tokens,
        }
    }
}
