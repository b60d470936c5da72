use axum::extract::Path;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use lab_ability::{approve_transition, TestState};
use lab_axum::{LabAxumError, RequestScope};
use lab_core::LabError;
use lab_tenancy::TenancyError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

fn db_err(err: sqlx::Error) -> LabAxumError {
    LabError::from(TenancyError::from(err)).into()
}

#[derive(Debug, Serialize, FromRow)]
pub(crate) struct Patient {
    pub id: i64,
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

pub(crate) async fn list_patients(
    scope: RequestScope,
) -> Result<Json<Vec<Patient>>, LabAxumError> {
    let handle = scope.lab_handle()?;
    let patients = sqlx::query_as::<_, Patient>(
        "SELECT id, full_name, birth_date, created_at FROM patients ORDER BY id",
    )
    .fetch_all(handle.pool())
    .await
    .map_err(db_err)?;

    Ok(Json(patients))
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewPatient {
    pub full_name: String,
    pub birth_date: Option<NaiveDate>,
}

pub(crate) async fn create_patient(
    scope: RequestScope,
    Json(body): Json<NewPatient>,
) -> Result<(StatusCode, Json<Patient>), LabAxumError> {
    let handle = scope.lab_handle()?;
    let patient = sqlx::query_as::<_, Patient>(
        "INSERT INTO patients (full_name, birth_date) VALUES ($1, $2) \
         RETURNING id, full_name, birth_date, created_at",
    )
    .bind(&body.full_name)
    .bind(body.birth_date)
    .fetch_one(handle.pool())
    .await
    .map_err(db_err)?;

    Ok((StatusCode::CREATED, Json(patient)))
}

#[derive(Debug, Serialize, FromRow)]
pub(crate) struct MedicTestRequest {
    pub id: i64,
    pub patient_id: i64,
    pub test_id: i64,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) async fn list_requests(
    scope: RequestScope,
) -> Result<Json<Vec<MedicTestRequest>>, LabAxumError> {
    let handle = scope.lab_handle()?;
    let requests = sqlx::query_as::<_, MedicTestRequest>(
        "SELECT id, patient_id, test_id, state, created_at, updated_at \
         FROM medic_test_requests ORDER BY id",
    )
    .fetch_all(handle.pool())
    .await
    .map_err(db_err)?;

    Ok(Json(requests))
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewRequest {
    pub patient_id: i64,
    pub test_id: i64,
}

pub(crate) async fn create_request(
    scope: RequestScope,
    Json(body): Json<NewRequest>,
) -> Result<(StatusCode, Json<MedicTestRequest>), LabAxumError> {
    let handle = scope.lab_handle()?;
    let request = sqlx::query_as::<_, MedicTestRequest>(
        "INSERT INTO medic_test_requests (patient_id, test_id) VALUES ($1, $2) \
         RETURNING id, patient_id, test_id, state, created_at, updated_at",
    )
    .bind(body.patient_id)
    .bind(body.test_id)
    .fetch_one(handle.pool())
    .await
    .map_err(db_err)?;

    Ok((StatusCode::CREATED, Json(request)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct StateChange {
    pub state: String,
}

/// Move a request along the workflow. The guard has already checked
/// that the role may set this target state; the edge itself is
/// validated against the current row here.
pub(crate) async fn set_state(
    scope: RequestScope,
    Path(id): Path<i64>,
    Json(body): Json<StateChange>,
) -> Result<Json<MedicTestRequest>, LabAxumError> {
    let authorization = scope.authorization()?;
    let handle = scope.lab_handle()?;
    let to = TestState::parse(&body.state).map_err(LabError::from)?;

    let row: Option<(String,)> =
        sqlx::query_as("SELECT state FROM medic_test_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(handle.pool())
            .await
            .map_err(db_err)?;
    let current =
        row.ok_or_else(|| LabError::not_found(format!("No medic test request with id {id}")))?;
    let from = TestState::parse(&current.0).map_err(LabError::from)?;

    approve_transition(&authorization.grants, from, to)?;

    // The state may have moved since it was read; update only if the
    // row still holds the state the transition was approved from.
    let updated = sqlx::query_as::<_, MedicTestRequest>(
        "UPDATE medic_test_requests SET state = $2, updated_at = now() \
         WHERE id = $1 AND state = $3 \
         RETURNING id, patient_id, test_id, state, created_at, updated_at",
    )
    .bind(id)
    .bind(to.as_str())
    .bind(from.as_str())
    .fetch_optional(handle.pool())
    .await
    .map_err(db_err)?
    .ok_or_else(|| LabError::conflict("The request state changed underneath this transition"))?;

    Ok(Json(updated))
}
