//! Router wiring helpers.

use std::sync::Arc;

use axum::middleware;
use axum::routing::MethodRouter;
use axum::{Extension, Router};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::guard;
use crate::requirements::RouteRequirements;
use crate::state::LabState;

/// Put the guard chain in front of every route already in `router`,
/// enforcing `requirements` on each.
pub fn secure(
    router: Router<LabState>,
    state: &LabState,
    requirements: RouteRequirements,
) -> Router<LabState> {
    router
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::enforce,
        ))
        // Added after the guard so it runs before it; the guard reads
        // the extension this layer inserts.
        .route_layer(Extension(Arc::new(requirements)))
}

/// Like [`secure`], but for a single method router, so the methods of
/// one path can carry different requirements.
pub fn secure_method(
    routes: MethodRouter<LabState>,
    state: &LabState,
    requirements: RouteRequirements,
) -> MethodRouter<LabState> {
    routes
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::enforce,
        ))
        .route_layer(Extension(Arc::new(requirements)))
}

/// Outermost HTTP layers: request ids (generated when absent,
/// preserved when supplied, echoed on the response) and trace spans.
pub fn finalize(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}
