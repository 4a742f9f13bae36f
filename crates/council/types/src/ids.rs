//! Identifiers shared by the proposal and eligibility engines

use serde::{Deserialize, Serialize};

/// Seconds on the ledger's logical clock
pub type Timestamp = u64;

/// An account on the ledger: a voter, a voucher, a call target or a
/// contract address
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A role ("hat") in the external role hierarchy
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct HatId(pub u64);

impl HatId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for HatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "hat:{:#x}", self.0)
    }
}

/// Sequential index of a proposal within one engine
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ProposalId(pub u64);

impl ProposalId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_forms() {
        assert_eq!(Identity::new("alice").to_string(), "alice");
        assert_eq!(HatId(255).to_string(), "hat:0xff");
        assert_eq!(ProposalId(7).to_string(), "#7");
    }

    #[test]
    fn test_identity_ordering_is_lexicographic() {
        let mut ids = vec![Identity::new("carol"), Identity::new("alice")];
        ids.sort();
        assert_eq!(ids[0], Identity::new("alice"));
    }
}
