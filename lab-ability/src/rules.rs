//! Permission rules as they are declared and persisted.
//!
//! A role stores its rules as comma-separated DSL strings, e.g.
//! `{actions: "read,update", subject: "Patient", fields: "name,dob"}`.
//! Parsing into the typed verbs/subjects happens once, at compile time
//! of the grant table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AbilityError, AbilityResult};

/// The verbs a rule can grant.
///
/// `Manage` is the superaction: a grant for `manage` covers every verb
/// on its subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionVerb {
    Create,
    Read,
    Update,
    Delete,
    Manage,
    SetState,
}

impl ActionVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionVerb::Create => "create",
            ActionVerb::Read => "read",
            ActionVerb::Update => "update",
            ActionVerb::Delete => "delete",
            ActionVerb::Manage => "manage",
            ActionVerb::SetState => "set_state",
        }
    }

    pub fn parse(s: &str) -> AbilityResult<Self> {
        match s {
            "create" => Ok(ActionVerb::Create),
            "read" => Ok(ActionVerb::Read),
            "update" => Ok(ActionVerb::Update),
            "delete" => Ok(ActionVerb::Delete),
            "manage" => Ok(ActionVerb::Manage),
            "set_state" => Ok(ActionVerb::SetState),
            other => Err(AbilityError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ActionVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subjects a rule can target.
///
/// `All` is the universal subject: a grant for `all` covers every
/// subject for its action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    SystemUser,
    LabUser,
    Lab,
    Role,
    ActionHistory,
    Patient,
    MedicHistory,
    RequestMedicTest,
    MedicTestCatalog,
    All,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::SystemUser => "SystemUser",
            SubjectKind::LabUser => "LabUser",
            SubjectKind::Lab => "Lab",
            SubjectKind::Role => "Role",
            SubjectKind::ActionHistory => "ActionHistory",
            SubjectKind::Patient => "Patient",
            SubjectKind::MedicHistory => "MedicHistory",
            SubjectKind::RequestMedicTest => "RequestMedicTest",
            SubjectKind::MedicTestCatalog => "MedicTestCatalog",
            SubjectKind::All => "all",
        }
    }

    pub fn parse(s: &str) -> AbilityResult<Self> {
        match s {
            "SystemUser" => Ok(SubjectKind::SystemUser),
            "LabUser" => Ok(SubjectKind::LabUser),
            "Lab" => Ok(SubjectKind::Lab),
            "Role" => Ok(SubjectKind::Role),
            "ActionHistory" => Ok(SubjectKind::ActionHistory),
            "Patient" => Ok(SubjectKind::Patient),
            "MedicHistory" => Ok(SubjectKind::MedicHistory),
            "RequestMedicTest" => Ok(SubjectKind::RequestMedicTest),
            "MedicTestCatalog" => Ok(SubjectKind::MedicTestCatalog),
            "all" => Ok(SubjectKind::All),
            other => Err(AbilityError::UnknownSubject(other.to_string())),
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted permission rule.
///
/// `fields` is absent or `"*"` for an unrestricted grant; for
/// `set_state` rules on `RequestMedicTest` the listed "fields" are the
/// permitted target states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub actions: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
}

impl PermissionRule {
    pub fn new(actions: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            actions: actions.into(),
            subject: subject.into(),
            fields: None,
        }
    }

    pub fn with_fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }
}

/// A role as persisted inside a tenant database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<PermissionRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbs_round_trip_their_wire_names() {
        for verb in [
            ActionVerb::Create,
            ActionVerb::Read,
            ActionVerb::Update,
            ActionVerb::Delete,
            ActionVerb::Manage,
            ActionVerb::SetState,
        ] {
            assert_eq!(ActionVerb::parse(verb.as_str()).unwrap(), verb);
        }
        assert!(matches!(
            ActionVerb::parse("erase"),
            Err(AbilityError::UnknownAction(_))
        ));
    }

    #[test]
    fn subjects_are_case_sensitive() {
        assert_eq!(SubjectKind::parse("Patient").unwrap(), SubjectKind::Patient);
        assert_eq!(SubjectKind::parse("all").unwrap(), SubjectKind::All);
        assert!(SubjectKind::parse("patient").is_err());
        assert!(SubjectKind::parse("All").is_err());
    }

    #[test]
    fn rules_serialize_without_absent_fields() {
        let rule = PermissionRule::new("read", "Patient");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json, serde_json::json!({"actions": "read", "subject": "Patient"}));

        let rule = rule.with_fields("name,dob");
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["fields"], "name,dob");
    }

    #[test]
    fn role_permissions_decode_from_stored_json() {
        let raw = serde_json::json!([
            {"actions": "manage", "subject": "all"},
            {"actions": "set_state", "subject": "RequestMedicTest", "fields": "IN_PROCESS,TO_VERIFY"}
        ]);
        let rules: Vec<PermissionRule> = serde_json::from_value(raw).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].fields.as_deref(), Some("IN_PROCESS,TO_VERIFY"));
    }
}
