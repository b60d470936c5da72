use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lab_core::LabError;

/// Response-side wrapper for request failures.
///
/// Digs the structured [`LabError`] out of the error chain, however
/// deep anyhow context buried it, and renders the wire shape with the
/// matching status code. Anything without one becomes a sanitized
/// Fatal.
#[derive(Debug)]
pub struct LabAxumError(pub anyhow::Error);

impl From<anyhow::Error> for LabAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<LabError> for LabAxumError {
    fn from(e: LabError) -> Self {
        Self(e.into_anyhow())
    }
}

fn render(lab: &LabError) -> Response {
    let safe = lab.sanitize_for_client();
    let status = StatusCode::from_u16(safe.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(safe.to_json())).into_response()
}

impl IntoResponse for LabAxumError {
    fn into_response(self) -> Response {
        match self.0.chain().find_map(|e| e.downcast_ref::<LabError>()) {
            Some(lab) => render(lab),
            None => render(&LabError::fatal(self.0.to_string())),
        }
    }
}
