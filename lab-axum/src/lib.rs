//! Axum integration for LabRS.
//!
//! Builds guarded routers: declare [`RouteRequirements`] per route
//! group, wrap the group with [`secure`], and handlers receive a
//! [`RequestScope`] carrying the authenticated principal, their
//! grants and a database handle bound to the selected lab. Errors
//! render as the standard wire shape via [`LabAxumError`].

mod error;
mod guard;
mod requirements;
mod router;
mod scope;
mod state;

pub use error::LabAxumError;
pub use guard::LAB_HEADER;
pub use requirements::{AbilityRequirement, RouteRequirements};
pub use router::{finalize, secure, secure_method};
pub use scope::RequestScope;
pub use state::LabState;
