use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use lab_ability::PermissionRule;
use lab_axum::{LabAxumError, LabState, RequestScope};
use lab_core::LabError;
use lab_tenancy::{assign_role, ensure_role, fetch_role, Provisioner, TenancyError};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterLab {
    pub name: String,
}

/// Register a lab and enroll the caller as its owner.
pub(crate) async fn register_lab(
    State(state): State<LabState>,
    Extension(provisioner): Extension<Arc<Provisioner>>,
    scope: RequestScope,
    Json(body): Json<RegisterLab>,
) -> Result<(StatusCode, Json<Value>), LabAxumError> {
    let provisioned = provisioner
        .register(&body.name)
        .await
        .map_err(LabError::from)?;

    state
        .directory
        .add_member(provisioned.lab, scope.principal)
        .await
        .map_err(LabError::from)?;

    let handle = state.pools.handle(&provisioned.db_name);
    let owner = ensure_role(
        &handle,
        "owner",
        Some("Full access to the lab"),
        &[PermissionRule::new("manage", "all")],
    )
    .await
    .map_err(LabError::from)?;
    assign_role(&handle, scope.principal, owner.id)
        .await
        .map_err(LabError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "lab": provisioned.lab,
            "dbName": provisioned.db_name,
            "created": provisioned.created,
        })),
    ))
}

pub(crate) async fn my_labs(
    State(state): State<LabState>,
    scope: RequestScope,
) -> Result<Json<Value>, LabAxumError> {
    let labs: Vec<Value> = state
        .directory
        .labs_for(scope.principal)
        .await
        .map_err(LabError::from)?
        .into_iter()
        .map(|lab| {
            json!({
                "id": lab.id,
                "name": lab.display_name,
                "status": lab.status.as_str(),
            })
        })
        .collect();

    Ok(Json(json!(labs)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddMember {
    pub email: String,
    pub role: String,
}

/// Enroll an existing account into the selected lab under a role.
pub(crate) async fn add_member(
    State(state): State<LabState>,
    scope: RequestScope,
    Json(body): Json<AddMember>,
) -> Result<(StatusCode, Json<Value>), LabAxumError> {
    let member = state
        .directory
        .find_principal(&body.email)
        .await
        .map_err(LabError::from)?;
    let authorization = scope.authorization()?;
    let handle = scope.lab_handle()?;

    let role = fetch_role(handle, &body.role)
        .await
        .map_err(LabError::from)?
        .ok_or_else(|| LabError::from(TenancyError::RoleNotFound(body.role.clone())))?;

    state
        .directory
        .add_member(authorization.lab, member.id)
        .await
        .map_err(LabError::from)?;
    assign_role(handle, member.id, role.id)
        .await
        .map_err(LabError::from)?;

    // The member may hold cached grants from an earlier role.
    state.cache.invalidate(member.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "principal": member.id, "role": role.name })),
    ))
}
