use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use lab_auth::{hash_password, verify_password, AuthError, PasswordOptions};
use lab_axum::{LabAxumError, LabState};
use lab_core::LabError;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub(crate) struct Credentials {
    pub email: String,
    pub password: String,
}

pub(crate) async fn signup(
    State(state): State<LabState>,
    Extension(password): Extension<PasswordOptions>,
    Json(body): Json<Credentials>,
) -> Result<(StatusCode, Json<Value>), LabAxumError> {
    let hash = hash_password(&body.password, &password).map_err(LabError::from)?;
    let principal = state
        .directory
        .create_principal(&body.email, &hash)
        .await
        .map_err(LabError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": principal.id, "email": principal.email })),
    ))
}

pub(crate) async fn login(
    State(state): State<LabState>,
    Json(body): Json<Credentials>,
) -> Result<Json<Value>, LabAxumError> {
    // Unknown emails fail exactly like wrong passwords.
    let principal = state
        .directory
        .find_principal(&body.email)
        .await
        .map_err(|_| LabError::from(AuthError::InvalidCredentials))?;
    verify_password(&body.password, &principal.password_hash).map_err(LabError::from)?;

    let token = state.tokens.issue(principal.id).map_err(LabError::from)?;

    Ok(Json(json!({
        "accessToken": token,
        "principal": { "id": principal.id, "email": principal.email },
    })))
}
