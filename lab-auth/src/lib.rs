//! Authentication and per-principal authorization state for LabRS.
//!
//! Three small pieces: HS256 access tokens ([`AuthTokens`]), bcrypt
//! password hashing ([`hash_password`]/[`verify_password`]) and a
//! bounded [`AuthorizationCache`] holding each principal's selected
//! lab and compiled grants between requests.

mod cache;
mod error;
mod password;
mod token;

pub use cache::{AuthorizationCache, AuthorizationContext, CacheOptions};
pub use error::{AuthError, AuthResult};
pub use password::{hash_password, verify_password, PasswordOptions};
pub use token::{parse_bearer, AuthTokens, Claims, TokenOptions};
