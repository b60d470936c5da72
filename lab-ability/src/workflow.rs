//! Exam request workflow.
//!
//! The transition table is pure validation, independent of any
//! permission grant. State changes go through [`approve_transition`],
//! which requires both a covering `set_state` grant for the target
//! state and a legal edge from the current state.

use std::fmt;

use lab_core::LabError;

use crate::error::{AbilityError, AbilityResult};
use crate::grants::GrantTable;
use crate::rules::{ActionVerb, SubjectKind};

/// Lifecycle states of a medic test request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestState {
    Pending,
    InProcess,
    ToVerify,
    Canceled,
    Completed,
}

impl TestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestState::Pending => "PENDING",
            TestState::InProcess => "IN_PROCESS",
            TestState::ToVerify => "TO_VERIFY",
            TestState::Canceled => "CANCELED",
            TestState::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> AbilityResult<Self> {
        match s {
            "PENDING" => Ok(TestState::Pending),
            "IN_PROCESS" => Ok(TestState::InProcess),
            "TO_VERIFY" => Ok(TestState::ToVerify),
            "CANCELED" => Ok(TestState::Canceled),
            "COMPLETED" => Ok(TestState::Completed),
            other => Err(AbilityError::UnknownState(other.to_string())),
        }
    }

    /// Legal outgoing edges from this state.
    pub fn next_states(&self) -> &'static [TestState] {
        match self {
            TestState::Pending => &[TestState::InProcess, TestState::Canceled],
            TestState::InProcess => &[TestState::ToVerify, TestState::Canceled],
            TestState::ToVerify => &[
                TestState::Completed,
                TestState::InProcess,
                TestState::Canceled,
            ],
            TestState::Canceled => &[TestState::Pending],
            TestState::Completed => &[],
        }
    }

    pub fn can_transition(&self, to: TestState) -> bool {
        self.next_states().contains(&to)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_states().is_empty()
    }
}

impl fmt::Display for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approve a state change: the role must be granted `set_state` for the
/// target state, and the edge must be legal.
///
/// Grant failure is Forbidden; an illegal edge is Conflict.
pub fn approve_transition(grants: &GrantTable, from: TestState, to: TestState) -> Result<(), LabError> {
    if !grants.can(
        ActionVerb::SetState,
        SubjectKind::RequestMedicTest,
        Some(to.as_str()),
    ) {
        return Err(LabError::forbidden(format!(
            "Target state {to} is not permitted for this role"
        )));
    }
    if !from.can_transition(to) {
        return Err(LabError::conflict(format!(
            "Cannot transition a request from {from} to {to}"
        )));
    }
    Ok(())
}
