//! # lab-ability
//!
//! The authorization engine of LabRS: a small comma-separated
//! permission DSL, compiled into a flat [`GrantTable`] answering
//! `can(action, subject, field?)` as a pure lookup, plus the exam
//! request workflow state machine.
//!
//! ```rust
//! use lab_ability::{ActionVerb, GrantTable, PermissionRule, SubjectKind};
//!
//! let rules = [PermissionRule::new("read,update", "Patient").with_fields("name,dob")];
//! let grants = GrantTable::compile(&rules).unwrap();
//!
//! assert!(grants.can(ActionVerb::Read, SubjectKind::Patient, None));
//! assert!(grants.can(ActionVerb::Update, SubjectKind::Patient, Some("name")));
//! assert!(!grants.can(ActionVerb::Update, SubjectKind::Patient, Some("ssn")));
//! ```

pub mod error;
pub mod grants;
pub mod rules;
pub mod workflow;

pub use error::{AbilityError, AbilityResult};
pub use grants::{FieldScope, Grant, GrantTable};
pub use rules::{ActionVerb, PermissionRule, Role, SubjectKind};
pub use workflow::{approve_transition, TestState};
