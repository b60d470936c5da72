//! Compiled grant tables.
//!
//! Rules are parsed once into a flat table of grants; `can` is a pure
//! lookup with no I/O, reflection or interpretation at request time.

use std::collections::BTreeSet;

use crate::error::{AbilityError, AbilityResult};
use crate::rules::{ActionVerb, PermissionRule, SubjectKind};

/// Field coverage of one grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldScope {
    /// No field restriction (absent or `"*"` in the rule).
    All,
    /// Only the listed fields are covered.
    Listed(BTreeSet<String>),
}

impl FieldScope {
    /// Parse the `fields` part of a rule. Blank lists collapse to `All`.
    fn parse(raw: Option<&str>) -> Self {
        let raw = match raw {
            None => return FieldScope::All,
            Some(r) => r,
        };
        if raw.trim() == "*" {
            return FieldScope::All;
        }
        let listed: BTreeSet<String> = raw
            .split(',')
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .map(|f| f.to_string())
            .collect();
        if listed.is_empty() {
            FieldScope::All
        } else {
            FieldScope::Listed(listed)
        }
    }

    pub fn covers(&self, field: &str) -> bool {
        match self {
            FieldScope::All => true,
            FieldScope::Listed(fields) => fields.contains(field),
        }
    }
}

/// One compiled (action, subject, fields) permission tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub action: ActionVerb,
    pub subject: SubjectKind,
    pub fields: FieldScope,
}

impl Grant {
    fn matches(&self, action: ActionVerb, subject: SubjectKind, field: Option<&str>) -> bool {
        if self.subject != subject && self.subject != SubjectKind::All {
            return false;
        }
        if self.action != action && self.action != ActionVerb::Manage {
            return false;
        }
        match field {
            None => true,
            Some(f) => self.fields.covers(f),
        }
    }
}

/// The compiled permission set of one role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantTable {
    grants: Vec<Grant>,
}

impl GrantTable {
    /// Compile persisted rules into a grant table.
    ///
    /// Each rule with N comma-separated actions expands into N grants.
    /// Unknown verbs or subjects fail the whole compilation.
    pub fn compile(rules: &[PermissionRule]) -> AbilityResult<GrantTable> {
        let mut grants = Vec::new();
        for rule in rules {
            let subject = SubjectKind::parse(rule.subject.trim())?;
            let fields = FieldScope::parse(rule.fields.as_deref());

            let mut actions = Vec::new();
            for token in rule.actions.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                actions.push(ActionVerb::parse(token)?);
            }
            if actions.is_empty() {
                return Err(AbilityError::EmptyActions(rule.subject.clone()));
            }

            for action in actions {
                grants.push(Grant {
                    action,
                    subject,
                    fields: fields.clone(),
                });
            }
        }
        Ok(GrantTable { grants })
    }

    /// Answer whether this table permits `action` on `subject`.
    ///
    /// A grant matches when its subject equals the asked subject or is
    /// the universal `all`, and its action equals the asked action or
    /// is the superaction `manage`. With a `field`, the grant must also
    /// cover that field.
    pub fn can(&self, action: ActionVerb, subject: SubjectKind, field: Option<&str>) -> bool {
        self.grants
            .iter()
            .any(|g| g.matches(action, subject, field))
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rules: &[PermissionRule]) -> GrantTable {
        GrantTable::compile(rules).unwrap()
    }

    #[test]
    fn comma_separated_actions_expand_into_grants() {
        let t = table(&[PermissionRule::new("read,update,delete", "Patient")]);
        assert_eq!(t.len(), 3);
        assert!(t.can(ActionVerb::Read, SubjectKind::Patient, None));
        assert!(t.can(ActionVerb::Update, SubjectKind::Patient, None));
        assert!(t.can(ActionVerb::Delete, SubjectKind::Patient, None));
        assert!(!t.can(ActionVerb::Create, SubjectKind::Patient, None));
    }

    #[test]
    fn read_only_role_denies_update() {
        let t = table(&[PermissionRule::new("read", "Patient")]);
        assert!(t.can(ActionVerb::Read, SubjectKind::Patient, None));
        assert!(!t.can(ActionVerb::Update, SubjectKind::Patient, None));
    }

    #[test]
    fn manage_covers_every_action_on_its_subject() {
        let t = table(&[PermissionRule::new("manage", "Role")]);
        assert!(t.can(ActionVerb::Create, SubjectKind::Role, None));
        assert!(t.can(ActionVerb::Delete, SubjectKind::Role, None));
        assert!(t.can(ActionVerb::SetState, SubjectKind::Role, None));
        assert!(!t.can(ActionVerb::Read, SubjectKind::Patient, None));
    }

    #[test]
    fn all_subject_covers_every_subject_for_its_action() {
        let t = table(&[PermissionRule::new("read", "all")]);
        assert!(t.can(ActionVerb::Read, SubjectKind::Patient, None));
        assert!(t.can(ActionVerb::Read, SubjectKind::MedicTestCatalog, None));
        assert!(!t.can(ActionVerb::Update, SubjectKind::Patient, None));
    }

    #[test]
    fn manage_all_is_the_superuser_rule() {
        let t = table(&[PermissionRule::new("manage", "all")]);
        assert!(t.can(ActionVerb::Delete, SubjectKind::Lab, None));
        assert!(t.can(ActionVerb::SetState, SubjectKind::RequestMedicTest, Some("CANCELED")));
    }

    #[test]
    fn field_restriction_scopes_the_grant() {
        let t = table(&[PermissionRule::new("update", "Patient").with_fields("name,dob")]);
        assert!(t.can(ActionVerb::Update, SubjectKind::Patient, Some("name")));
        assert!(t.can(ActionVerb::Update, SubjectKind::Patient, Some("dob")));
        assert!(!t.can(ActionVerb::Update, SubjectKind::Patient, Some("ssn")));
        // Without a specific field the grant still answers for the action.
        assert!(t.can(ActionVerb::Update, SubjectKind::Patient, None));
    }

    #[test]
    fn wildcard_and_blank_fields_mean_unrestricted() {
        let star = table(&[PermissionRule::new("update", "Patient").with_fields("*")]);
        assert!(star.can(ActionVerb::Update, SubjectKind::Patient, Some("anything")));

        let blank = table(&[PermissionRule::new("update", "Patient").with_fields("  , ,")]);
        assert!(blank.can(ActionVerb::Update, SubjectKind::Patient, Some("anything")));
    }

    #[test]
    fn set_state_fields_enumerate_target_states() {
        let t = table(&[
            PermissionRule::new("set_state", "RequestMedicTest").with_fields("IN_PROCESS,TO_VERIFY"),
        ]);
        assert!(t.can(ActionVerb::SetState, SubjectKind::RequestMedicTest, Some("IN_PROCESS")));
        assert!(t.can(ActionVerb::SetState, SubjectKind::RequestMedicTest, Some("TO_VERIFY")));
        assert!(!t.can(ActionVerb::SetState, SubjectKind::RequestMedicTest, Some("CANCELED")));
    }

    #[test]
    fn malformed_rules_fail_compilation() {
        let unknown_action = [PermissionRule::new("read,destroy", "Patient")];
        assert_eq!(
            GrantTable::compile(&unknown_action),
            Err(AbilityError::UnknownAction("destroy".to_string()))
        );

        let unknown_subject = [PermissionRule::new("read", "Invoice")];
        assert_eq!(
            GrantTable::compile(&unknown_subject),
            Err(AbilityError::UnknownSubject("Invoice".to_string()))
        );

        let empty_actions = [PermissionRule::new(" , ", "Patient")];
        assert_eq!(
            GrantTable::compile(&empty_actions),
            Err(AbilityError::EmptyActions("Patient".to_string()))
        );
    }

    #[test]
    fn empty_table_denies_everything() {
        let t = GrantTable::default();
        assert!(t.is_empty());
        assert!(!t.can(ActionVerb::Read, SubjectKind::Patient, None));
    }
}
