//! Per-route authorization metadata.
//!
//! Requirements are declared where routes are wired and attached to
//! them as an extension; the guard chain reads them at dispatch. A
//! route with several ability requirements needs all of them.

use lab_ability::{ActionVerb, SubjectKind};

/// One required ability: the caller's grants must allow `action` on
/// `subject`, and on every listed field if any are listed.
#[derive(Debug, Clone)]
pub struct AbilityRequirement {
    pub action: ActionVerb,
    pub subject: SubjectKind,
    pub fields: Vec<String>,
}

/// What the guard chain enforces for one route.
#[derive(Debug, Clone, Default)]
pub struct RouteRequirements {
    /// Public routes skip every check; authentication is still
    /// attempted so handlers can see who is calling, but failures are
    /// ignored here and surface later if the handler needs identity.
    pub public: bool,
    /// Authenticated routes that operate outside any one lab, e.g.
    /// listing the labs the caller belongs to.
    pub skip_tenant_check: bool,
    pub abilities: Vec<AbilityRequirement>,
}

impl RouteRequirements {
    /// Requires a valid token and a selected lab the caller belongs
    /// to. Add abilities on top with [`Self::require`].
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }

    pub fn skip_tenant_check(mut self) -> Self {
        self.skip_tenant_check = true;
        self
    }

    pub fn require(mut self, action: ActionVerb, subject: SubjectKind) -> Self {
        self.abilities.push(AbilityRequirement {
            action,
            subject,
            fields: Vec::new(),
        });
        self
    }

    /// Like [`Self::require`], but each named field must be granted
    /// individually.
    pub fn require_fields<I, S>(mut self, action: ActionVerb, subject: SubjectKind, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.abilities.push(AbilityRequirement {
            action,
            subject,
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_compose() {
        let requirements = RouteRequirements::authenticated()
            .require(ActionVerb::Read, SubjectKind::Patient)
            .require_fields(ActionVerb::Update, SubjectKind::Patient, ["full_name"]);

        assert!(!requirements.public);
        assert!(!requirements.skip_tenant_check);
        assert_eq!(requirements.abilities.len(), 2);
        assert_eq!(requirements.abilities[1].fields, vec!["full_name"]);
    }

    #[test]
    fn public_routes_have_no_checks() {
        let requirements = RouteRequirements::public();
        assert!(requirements.public);
        assert!(requirements.abilities.is_empty());
    }
}
