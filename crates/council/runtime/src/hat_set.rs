//! Hat allow-lists
//!
//! An unordered set of hats used to gate who may create or vote.
//! Removal swaps the last entry into the freed slot, so iteration order is
//! unspecified once anything has been removed.

use crate::oracle::HatsOracle;
use council_types::{HatId, Identity};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HatSet {
    hats: Vec<HatId>,
}

impl HatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hats(hats: impl IntoIterator<Item = HatId>) -> Self {
        let mut set = Self::new();
        for hat in hats {
            set.add(hat);
        }
        set
    }

    /// Add a hat; returns false when already present
    pub fn add(&mut self, hat: HatId) -> bool {
        if self.contains(hat) {
            return false;
        }
        self.hats.push(hat);
        true
    }

    /// Remove a hat by swapping the last entry into its slot; returns false
    /// when absent
    pub fn remove(&mut self, hat: HatId) -> bool {
        match self.hats.iter().position(|h| *h == hat) {
            Some(pos) => {
                self.hats.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Add or remove depending on `allowed`; returns whether the set changed
    pub fn set(&mut self, hat: HatId, allowed: bool) -> bool {
        if allowed {
            self.add(hat)
        } else {
            self.remove(hat)
        }
    }

    pub fn contains(&self, hat: HatId) -> bool {
        self.hats.contains(&hat)
    }

    pub fn as_slice(&self) -> &[HatId] {
        &self.hats
    }

    pub fn len(&self) -> usize {
        self.hats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hats.is_empty()
    }

    /// One batched membership query: does `who` wear any hat in the set
    pub fn worn_by(&self, oracle: &dyn HatsOracle, who: &Identity) -> bool {
        wears_any(oracle, who, &self.hats)
    }
}

/// True when `who` wears at least one of `hats`, asked in a single batch
pub fn wears_any(oracle: &dyn HatsOracle, who: &Identity, hats: &[HatId]) -> bool {
    if hats.is_empty() {
        return false;
    }
    let wearers = vec![who.clone(); hats.len()];
    oracle
        .batch_balance_check(&wearers, hats)
        .iter()
        .any(|balance| *balance > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::InMemoryHats;

    #[test]
    fn test_add_is_idempotent() {
        let mut set = HatSet::new();
        assert!(set.add(HatId(1)));
        assert!(!set.add(HatId(1)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_remove_swaps_last_into_slot() {
        let mut set = HatSet::from_hats([HatId(1), HatId(2), HatId(3)]);
        assert!(set.remove(HatId(1)));
        assert_eq!(set.as_slice(), &[HatId(3), HatId(2)]);
        assert!(!set.remove(HatId(1)));
    }

    #[test]
    fn test_set_toggles() {
        let mut set = HatSet::new();
        assert!(set.set(HatId(9), true));
        assert!(set.contains(HatId(9)));
        assert!(set.set(HatId(9), false));
        assert!(set.is_empty());
    }

    #[test]
    fn test_worn_by() {
        let hats = InMemoryHats::new();
        let alice = Identity::new("alice");
        hats.wear(HatId(2), &alice);

        let set = HatSet::from_hats([HatId(1), HatId(2)]);
        assert!(set.worn_by(&hats, &alice));
        assert!(!set.worn_by(&hats, &Identity::new("bob")));
        assert!(!HatSet::new().worn_by(&hats, &alice));
    }
}
