//! The request guard chain.
//!
//! Four stages in order: authenticate, public bypass, tenant
//! selection, ability check. Later stages only run when earlier ones
//! pass, and a route's ability requirements must all hold. Membership
//! is checked against the registry on every request; only the
//! compiled grants are cached between requests.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;
use lab_ability::{ActionVerb, GrantTable, TestState};
use lab_auth::{parse_bearer, AuthorizationContext};
use lab_core::{LabError, LabId, PrincipalId};
use tracing::{debug, instrument, warn};

use crate::error::LabAxumError;
use crate::requirements::{AbilityRequirement, RouteRequirements};
use crate::scope::RequestScope;
use crate::state::LabState;

/// Header selecting the lab a request operates in.
pub const LAB_HEADER: &str = "x-lab-id";

/// Guarded requests never need bodies beyond this.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub(crate) async fn enforce(
    State(state): State<LabState>,
    Extension(requirements): Extension<Arc<RouteRequirements>>,
    mut request: Request,
    next: Next,
) -> Result<Response, LabAxumError> {
    if let Some(scope) = authorize(&state, &requirements, &mut request).await? {
        request.extensions_mut().insert(scope);
    }
    Ok(next.run(request).await)
}

/// Run the stages. None means the request goes through without a
/// scope (anonymous access to a public route).
#[instrument(skip(state, requirements, request), fields(path = %request.uri().path()))]
async fn authorize(
    state: &LabState,
    requirements: &RouteRequirements,
    request: &mut Request,
) -> Result<Option<RequestScope>, LabError> {
    // On public routes a bad or missing token is not an error, it
    // just leaves the caller anonymous.
    if requirements.public {
        let principal = match authenticate(state, request.headers()) {
            Ok(principal) => Some(principal),
            Err(err) => {
                debug!(error = %err, "ignoring authentication failure on public route");
                None
            }
        };
        return Ok(principal.map(|principal| RequestScope {
            principal,
            authorization: None,
            handle: None,
        }));
    }

    let principal = match authenticate(state, request.headers()) {
        Ok(principal) => principal,
        Err(err) => {
            debug!(error = %err, "rejecting unauthenticated request");
            return Err(err);
        }
    };

    // Tenant selection.
    if requirements.skip_tenant_check {
        if !requirements.abilities.is_empty() {
            // Abilities are meaningless without a lab to read roles
            // from; deny rather than silently skip them.
            warn!(principal = %principal, "route declares abilities but skips tenant selection");
            return Err(LabError::forbidden("This route cannot declare required abilities"));
        }
        return Ok(Some(RequestScope {
            principal,
            authorization: None,
            handle: None,
        }));
    }

    let lab = selected_lab(request.headers())?;
    if !state.directory.is_member(principal, lab).await? {
        warn!(principal = %principal, lab = %lab, "denied: not a member of the selected lab");
        return Err(LabError::forbidden("You are not a member of this lab"));
    }
    let context = authorization_context(state, principal, lab).await?;

    // Ability check: every declared requirement must hold.
    for ability in &requirements.abilities {
        check_ability(&context, ability, request).await?;
    }

    let handle = state.pools.handle(&context.db_name);
    Ok(Some(RequestScope {
        principal,
        authorization: Some(context),
        handle: Some(handle),
    }))
}

fn authenticate(state: &LabState, headers: &HeaderMap) -> Result<PrincipalId, LabError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer)
        .ok_or_else(|| LabError::not_authenticated("No authentication token was provided"))?;

    let claims = state.tokens.verify(token).map_err(LabError::from)?;
    Ok(claims.principal()?)
}

fn selected_lab(headers: &HeaderMap) -> Result<LabId, LabError> {
    let value = headers
        .get(LAB_HEADER)
        .ok_or_else(|| LabError::bad_request("The x-lab-id header is required"))?;
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| LabError::bad_request("The x-lab-id header must be an integer lab id"))
}

/// Cached context when it matches the selected lab, rebuilt from the
/// registry otherwise. A rebuild replaces the cache entry whole.
async fn authorization_context(
    state: &LabState,
    principal: PrincipalId,
    lab: LabId,
) -> Result<Arc<AuthorizationContext>, LabError> {
    if let Some(context) = state.cache.get_context(principal) {
        if context.lab == lab {
            return Ok(context);
        }
    }

    debug!(principal = %principal, lab = %lab, "repopulating authorization context");
    let tenant = state.directory.resolve(lab).await?;
    let role = state.directory.member_role(lab, principal).await?;
    let grants = GrantTable::compile(&role.permissions).map_err(|err| {
        LabError::fatal(format!("Role {} has invalid permissions: {err}", role.name))
    })?;

    let context = AuthorizationContext {
        principal,
        lab,
        db_name: tenant.db_name,
        role_name: role.name,
        grants: Arc::new(grants),
    };
    state.cache.set_context(context.clone());
    Ok(Arc::new(context))
}

async fn check_ability(
    context: &AuthorizationContext,
    ability: &AbilityRequirement,
    request: &mut Request,
) -> Result<(), LabError> {
    if ability.action == ActionVerb::SetState {
        let state = target_state(request).await?;
        if !context
            .grants
            .can(ActionVerb::SetState, ability.subject, Some(state.as_str()))
        {
            warn!(
                principal = %context.principal,
                lab = %context.lab,
                state = state.as_str(),
                "denied: target state not granted"
            );
            return Err(LabError::forbidden(format!(
                "Target state {state} is not permitted for this role"
            )));
        }
        return Ok(());
    }

    let allowed = if ability.fields.is_empty() {
        context.grants.can(ability.action, ability.subject, None)
    } else {
        ability
            .fields
            .iter()
            .all(|field| context.grants.can(ability.action, ability.subject, Some(field)))
    };
    if !allowed {
        warn!(
            principal = %context.principal,
            lab = %context.lab,
            action = %ability.action,
            subject = %ability.subject,
            "denied: ability not granted"
        );
        return Err(LabError::forbidden(format!(
            "You are not allowed to {} {}",
            ability.action, ability.subject
        )));
    }
    Ok(())
}

/// Pull the target state out of the JSON body, then put the body back
/// so the handler still sees it.
async fn target_state(request: &mut Request) -> Result<TestState, LabError> {
    let body = std::mem::replace(request.body_mut(), Body::empty());
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| LabError::bad_request("Could not read the request body"))?;
    let state = parse_target_state(&bytes);
    *request.body_mut() = Body::from(bytes);
    state
}

fn parse_target_state(bytes: &Bytes) -> Result<TestState, LabError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|_| LabError::bad_request("The request body must be JSON"))?;
    let state = value
        .get("state")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LabError::bad_request("The request body must include a target state"))?;
    TestState::parse(state).map_err(|err| LabError::bad_request(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_state_comes_from_the_body() {
        let bytes = Bytes::from(r#"{"state":"IN_PROCESS","note":"x"}"#);
        assert_eq!(parse_target_state(&bytes).unwrap(), TestState::InProcess);
    }

    #[test]
    fn missing_or_invalid_bodies_are_bad_requests() {
        for body in ["", "{}", "not json", r#"{"state":42}"#, r#"{"state":"NOPE"}"#] {
            let err = parse_target_state(&Bytes::from(body.to_string())).unwrap_err();
            assert_eq!(err.code(), 400);
        }
    }
}
