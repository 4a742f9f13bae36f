//! Eligibility rules and vouching configuration

use crate::HatId;
use serde::{Deserialize, Serialize};

/// Hierarchy eligibility for one hat, either the hat default or a
/// wearer-specific override
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WearerRule {
    pub eligible: bool,
    pub standing: bool,
}

impl WearerRule {
    pub fn new(eligible: bool, standing: bool) -> Self {
        Self { eligible, standing }
    }

    /// Reported for hats that have no default rule
    pub fn unset() -> Self {
        Self {
            eligible: false,
            standing: true,
        }
    }
}

impl Default for WearerRule {
    fn default() -> Self {
        Self::unset()
    }
}

/// What the resolver reports to the role hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WearerStatus {
    pub eligible: bool,
    pub standing: bool,
}

impl WearerStatus {
    /// Bad standing always wins over eligibility
    pub fn new(eligible: bool, standing: bool) -> Self {
        Self {
            eligible: eligible && standing,
            standing,
        }
    }

    pub fn can_wear(&self) -> bool {
        self.eligible && self.standing
    }
}

/// Community vouching for one hat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VouchConfig {
    /// Vouches required; vouching is active while this is non-zero
    pub quorum: u32,
    /// Wearers of this hat may vouch
    pub membership_hat: HatId,
    /// OR the vouch result with hierarchy eligibility instead of
    /// replacing it
    pub combine_with_hierarchy: bool,
}

impl VouchConfig {
    pub fn new(quorum: u32, membership_hat: HatId, combine_with_hierarchy: bool) -> Self {
        Self {
            quorum,
            membership_hat,
            combine_with_hierarchy,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.quorum > 0
    }

    pub fn is_met(&self, count: u32) -> bool {
        self.is_enabled() && count >= self.quorum
    }
}
