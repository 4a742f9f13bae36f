//! Voting classes for hybrid proposals
//!
//! A hybrid proposal blends several independently normalized tallies.
//! Each class decides how much power a voter carries in it and what share
//! of the final score the class controls.

use crate::{HatId, Identity};
use serde::{Deserialize, Serialize};

/// How a class derives a voter's power
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassStrategy {
    /// One identity, one vote
    Direct,
    /// Power follows the voter's balance of `asset`
    TokenBalance { asset: Identity },
}

/// One class of a hybrid tally
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassConfig {
    pub strategy: ClassStrategy,
    /// Percentage of the blended score this class controls
    pub slice_pct: u8,
    /// Take the integer square root of the balance (token classes)
    #[serde(default)]
    pub quadratic: bool,
    /// Balances below this carry no power (token classes)
    #[serde(default)]
    pub min_balance: u128,
    /// Hats whose wearers take part in this class; empty means every
    /// authorized voter
    #[serde(default)]
    pub hats: Vec<HatId>,
}

impl ClassConfig {
    pub fn direct(slice_pct: u8) -> Self {
        Self {
            strategy: ClassStrategy::Direct,
            slice_pct,
            quadratic: false,
            min_balance: 0,
            hats: Vec::new(),
        }
    }

    pub fn token(asset: Identity, slice_pct: u8) -> Self {
        Self {
            strategy: ClassStrategy::TokenBalance { asset },
            slice_pct,
            quadratic: false,
            min_balance: 0,
            hats: Vec::new(),
        }
    }

    pub fn with_quadratic(mut self, quadratic: bool) -> Self {
        self.quadratic = quadratic;
        self
    }

    pub fn with_min_balance(mut self, min_balance: u128) -> Self {
        self.min_balance = min_balance;
        self
    }

    pub fn with_hat(mut self, hat: HatId) -> Self {
        self.hats.push(hat);
        self
    }

    pub fn is_token_weighted(&self) -> bool {
        matches!(self.strategy, ClassStrategy::TokenBalance { .. })
    }
}
