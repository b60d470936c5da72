//! Access tokens.
//!
//! HS256 JWTs with the usual registered claims. The subject is the
//! principal id; lab selection is not baked into the token, it travels
//! in the `x-lab-id` header per request.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use lab_core::{LabConfigSnapshot, PrincipalId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
pub struct TokenOptions {
    /// HMAC signing secret
    pub secret: String,
    /// iss claim, validated on verify
    pub issuer: String,
    /// aud claim, validated on verify
    pub audience: String,
    /// Access token lifetime
    pub expires_in: Duration,
}

impl TokenOptions {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "labrs-auth".to_string(),
            audience: "labrs-api".to_string(),
            expires_in: Duration::from_secs(60 * 60),
        }
    }

    /// Read `auth.secret`, `auth.issuer`, `auth.audience` and
    /// `auth.token_ttl_secs`. None without a secret.
    pub fn from_config(config: &LabConfigSnapshot) -> Option<Self> {
        let mut options = Self::new(config.get_string("auth.secret")?);
        if let Some(issuer) = config.get_string("auth.issuer") {
            options.issuer = issuer;
        }
        if let Some(audience) = config.get_string("auth.audience") {
            options.audience = audience;
        }
        if let Some(ttl) = config.get_duration_secs("auth.token_ttl_secs") {
            options.expires_in = ttl;
        }
        Some(options)
    }
}

/// Registered claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    /// The authenticated principal, parsed out of the subject claim.
    pub fn principal(&self) -> AuthResult<PrincipalId> {
        self.sub
            .parse()
            .map_err(|_| AuthError::MalformedSubject(self.sub.clone()))
    }
}

/// Signs and verifies access tokens with a shared HMAC secret.
pub struct AuthTokens {
    header: Header,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    options: TokenOptions,
}

impl AuthTokens {
    pub fn new(options: TokenOptions) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[options.issuer.as_str()]);
        validation.set_audience(&[options.audience.as_str()]);
        Self {
            header: Header::new(Algorithm::HS256),
            encoding: EncodingKey::from_secret(options.secret.as_bytes()),
            decoding: DecodingKey::from_secret(options.secret.as_bytes()),
            validation,
            options,
        }
    }

    /// Issue a fresh token for the principal.
    pub fn issue(&self, principal: PrincipalId) -> AuthResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: principal.to_string(),
            iss: self.options.issuer.clone(),
            aud: self.options.audience.clone(),
            iat: now,
            exp: now + self.options.expires_in.as_secs() as i64,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(&self.header, &claims, &self.encoding)?)
    }

    /// Verify signature, expiry, issuer and audience.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// Accepts `Bearer <token>`, `JWT <token>`, or a bare token. Any other
/// scheme is treated as not-a-token rather than an error.
pub fn parse_bearer(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Some((scheme, token)) = value.split_once(' ') {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let allowed = ["Bearer", "JWT"]
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme.trim()));
        return allowed.then_some(token);
    }
    // No scheme, treat the whole header as the token.
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> AuthTokens {
        AuthTokens::new(TokenOptions::new("test-secret"))
    }

    #[test]
    fn issue_then_verify_round_trips() {
        let tokens = tokens();
        let token = tokens.issue(PrincipalId::new(42)).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.principal().unwrap(), PrincipalId::new(42));
        assert_eq!(claims.iss, "labrs-auth");
        assert_eq!(claims.aud, "labrs-api");
        assert!(claims.exp > claims.iat);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = tokens().issue(PrincipalId::new(42)).unwrap();
        let other = AuthTokens::new(TokenOptions::new("different-secret"));

        let err = other.verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = tokens();
        let now = Utc::now().timestamp();
        // Well past the validator's leeway.
        let claims = Claims {
            sub: "42".to_string(),
            iss: "labrs-auth".to_string(),
            aud: "labrs-api".to_string(),
            iat: now - 600,
            exp: now - 300,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let err = tokens.verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn wrong_audience_is_rejected() {
        let tokens = tokens();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: "42".to_string(),
            iss: "labrs-auth".to_string(),
            aud: "someone-else".to_string(),
            iat: now,
            exp: now + 600,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(tokens.verify(&token).is_err());
    }

    #[test]
    fn non_numeric_subject_is_malformed() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            iss: String::new(),
            aud: String::new(),
            iat: 0,
            exp: 0,
            jti: String::new(),
        };
        assert!(matches!(
            claims.principal().unwrap_err(),
            AuthError::MalformedSubject(_)
        ));
    }

    #[test]
    fn bearer_parsing_accepts_known_schemes() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("JWT abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("  Bearer   abc  "), Some("abc"));
        assert_eq!(parse_bearer("abc"), Some("abc"));
    }

    #[test]
    fn bearer_parsing_rejects_unknown_schemes_and_empties() {
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer(""), None);
        assert_eq!(parse_bearer("   "), None);
    }
}
