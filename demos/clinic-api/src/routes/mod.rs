mod labs;
mod requests;
mod session;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use lab_ability::{ActionVerb, SubjectKind};
use lab_auth::PasswordOptions;
use lab_axum::{secure, secure_method, LabState, RouteRequirements};
use lab_tenancy::Provisioner;

pub(crate) fn build(
    state: LabState,
    provisioner: Arc<Provisioner>,
    password: PasswordOptions,
) -> Router {
    let session = secure(
        Router::new()
            .route("/signup", post(session::signup))
            .route("/login", post(session::login)),
        &state,
        RouteRequirements::public(),
    )
    .layer(Extension(password));

    // Account-level routes run before any lab is selected.
    let account = secure(
        Router::new()
            .route("/labs", post(labs::register_lab))
            .route("/my-labs", get(labs::my_labs)),
        &state,
        RouteRequirements::authenticated().skip_tenant_check(),
    )
    .layer(Extension(provisioner));

    let members = secure(
        Router::new().route("/members", post(labs::add_member)),
        &state,
        RouteRequirements::authenticated().require(ActionVerb::Create, SubjectKind::LabUser),
    );

    let patients = Router::new().route(
        "/patients",
        secure_method(
            get(requests::list_patients),
            &state,
            RouteRequirements::authenticated().require(ActionVerb::Read, SubjectKind::Patient),
        )
        .merge(secure_method(
            post(requests::create_patient),
            &state,
            RouteRequirements::authenticated().require(ActionVerb::Create, SubjectKind::Patient),
        )),
    );

    let tests = Router::new().route(
        "/requests",
        secure_method(
            get(requests::list_requests),
            &state,
            RouteRequirements::authenticated()
                .require(ActionVerb::Read, SubjectKind::RequestMedicTest),
        )
        .merge(secure_method(
            post(requests::create_request),
            &state,
            RouteRequirements::authenticated()
                .require(ActionVerb::Create, SubjectKind::RequestMedicTest),
        )),
    );

    let transitions = secure(
        Router::new().route("/requests/{id}/state", post(requests::set_state)),
        &state,
        RouteRequirements::authenticated()
            .require(ActionVerb::SetState, SubjectKind::RequestMedicTest),
    );

    Router::new()
        .merge(session)
        .merge(account)
        .merge(members)
        .merge(patients)
        .merge(tests)
        .merge(transitions)
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}
