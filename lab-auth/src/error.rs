use lab_core::{LabError, LabErrorKind};

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Wrong email or wrong password. One message for both, so the
    /// response does not reveal which part failed.
    #[error("invalid login")]
    InvalidCredentials,

    #[error("no authentication token was provided")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token subject {0:?} is not a principal id")]
    MalformedSubject(String),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl From<AuthError> for LabError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::InvalidToken(_)
            | AuthError::MalformedSubject(_) => LabError::not_authenticated(err.to_string()),
            AuthError::Hash(_) => {
                let message = err.to_string();
                LabError::fatal(message).with_source(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_map_to_401() {
        let err: LabError = AuthError::InvalidCredentials.into();
        assert_eq!(err.kind, LabErrorKind::NotAuthenticated);
        assert_eq!(err.code(), 401);
    }

    #[test]
    fn hash_failures_are_server_errors() {
        // Cost 2 is below the bcrypt minimum.
        let bad = bcrypt::hash("pw", 2).unwrap_err();
        let err: LabError = AuthError::Hash(bad).into();
        assert_eq!(err.kind, LabErrorKind::Fatal);
        assert!(err.kind.is_server_error());
    }
}
