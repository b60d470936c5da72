use lab_core::LabError;
use thiserror::Error;

/// Result type for ability operations
pub type AbilityResult<T> = Result<T, AbilityError>;

/// Errors raised while parsing or compiling permission rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbilityError {
    #[error("Unknown action verb: {0}")]
    UnknownAction(String),

    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Unknown workflow state: {0}")]
    UnknownState(String),

    #[error("Permission rule for {0} declares no actions")]
    EmptyActions(String),
}

impl From<AbilityError> for LabError {
    fn from(err: AbilityError) -> Self {
        LabError::bad_request(err.to_string())
    }
}
