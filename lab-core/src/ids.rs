use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a lab (tenant) in the system registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LabId(i64);

impl LabId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the numeric value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for LabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LabId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for LabId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identifier of a principal (authenticated user) in the system registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PrincipalId(i64);

impl PrincipalId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the numeric value
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PrincipalId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(Self)
    }
}

impl From<i64> for PrincipalId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lab_id_parses_with_whitespace() {
        assert_eq!("7".parse::<LabId>().unwrap(), LabId::new(7));
        assert_eq!(" 42 ".parse::<LabId>().unwrap(), LabId::new(42));
        assert!("seven".parse::<LabId>().is_err());
        assert!("".parse::<LabId>().is_err());
    }

    #[test]
    fn ids_display_as_plain_integers() {
        assert_eq!(LabId::new(3).to_string(), "3");
        assert_eq!(PrincipalId::new(-1).to_string(), "-1");
    }
}
