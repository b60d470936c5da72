//! # lab-core
//!
//! Shared foundation for the LabRS workspace: tenant/principal ids,
//! the structured application error, and the configuration store.
//! Everything here is transport- and storage-agnostic; the heavier
//! crates (`lab-tenancy`, `lab-auth`, `lab-axum`) build on top.

pub mod config;
pub mod errors;
pub mod ids;

pub use config::{LabConfig, LabConfigSnapshot};
pub use errors::{LabError, LabErrorKind};
pub use ids::{LabId, PrincipalId};
