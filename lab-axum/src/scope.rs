//! What the guard chain hands to handlers.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use lab_auth::AuthorizationContext;
use lab_core::{LabError, PrincipalId};
use lab_tenancy::LabHandle;

use crate::error::LabAxumError;

/// The authenticated caller plus, on tenant-scoped routes, their lab
/// context and a handle bound to that lab's database.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub principal: PrincipalId,
    pub authorization: Option<Arc<AuthorizationContext>>,
    pub handle: Option<LabHandle>,
}

impl RequestScope {
    /// The lab-bound database handle. Errors on routes that skip
    /// tenant selection.
    pub fn lab_handle(&self) -> Result<&LabHandle, LabError> {
        self.handle
            .as_ref()
            .ok_or_else(|| LabError::bad_request("No lab is selected for this request"))
    }

    /// The caller's authorization context for the selected lab.
    pub fn authorization(&self) -> Result<&AuthorizationContext, LabError> {
        self.authorization
            .as_deref()
            .ok_or_else(|| LabError::bad_request("No lab is selected for this request"))
    }
}

impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = LabAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<RequestScope>().cloned().ok_or_else(|| {
            // Reaching this means the route was wired without the
            // guard chain in front of it.
            LabError::fatal("Request scope is missing; the route is not guarded").into()
        })
    }
}
