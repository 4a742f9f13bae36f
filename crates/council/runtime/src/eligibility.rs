//! Eligibility & Vouching Resolver
//!
//! Answers whether an identity may wear a hat by combining two sources:
//!
//! - **Hierarchy rules**: a per-wearer override if one exists, else the
//!   hat's default rule, else `eligible = false, standing = true`.
//! - **Vouching**: when a hat has a vouch configuration, eligibility comes
//!   from whether the wearer has at least `quorum` vouches. With
//!   `combine_with_hierarchy` the two results are OR-ed, otherwise the vouch
//!   result replaces the hierarchy one.
//!
//! Bad standing always forces ineligibility. Every mutation is validated in
//! full before anything is written.

use crate::clock::Clock;
use crate::guard::ReentrancyGuard;
use crate::oracle::HatsOracle;
use crate::rate_limit::VouchRateLimiter;
use council_types::{
    EventJournal, GovernanceError, GovernanceEvent, GovernanceResult, HatId, Identity,
    JournalEntry, Timestamp, VouchConfig, VouchingLimits, WearerRule, WearerStatus,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persisted resolver state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EligibilityStore {
    pub super_admin: Identity,
    pub default_rules: BTreeMap<HatId, WearerRule>,
    /// hat -> wearer -> override
    pub wearer_rules: BTreeMap<HatId, BTreeMap<Identity, WearerRule>>,
    pub vouch_configs: BTreeMap<HatId, VouchConfig>,
    /// hat -> wearer -> vouchers; the vouch count is the set size
    pub vouches: BTreeMap<HatId, BTreeMap<Identity, BTreeSet<Identity>>>,
    pub limiter: VouchRateLimiter,
    pub journal: EventJournal,
}

impl EligibilityStore {
    fn new(super_admin: Identity) -> Self {
        Self {
            super_admin,
            default_rules: BTreeMap::new(),
            wearer_rules: BTreeMap::new(),
            vouch_configs: BTreeMap::new(),
            vouches: BTreeMap::new(),
            limiter: VouchRateLimiter::new(),
            journal: EventJournal::new(),
        }
    }

    fn wearer_rule(&self, wearer: &Identity, hat: HatId) -> Option<WearerRule> {
        self.wearer_rules
            .get(&hat)
            .and_then(|rules| rules.get(wearer))
            .copied()
    }

    fn hierarchy_rule(&self, wearer: &Identity, hat: HatId) -> WearerRule {
        self.wearer_rule(wearer, hat)
            .or_else(|| self.default_rules.get(&hat).copied())
            .unwrap_or_else(WearerRule::unset)
    }

    fn vouchers(&self, wearer: &Identity, hat: HatId) -> Option<&BTreeSet<Identity>> {
        self.vouches.get(&hat).and_then(|ledger| ledger.get(wearer))
    }

    fn vouch_count(&self, wearer: &Identity, hat: HatId) -> u32 {
        self.vouchers(wearer, hat)
            .map_or(0, |set| u32::try_from(set.len()).unwrap_or(u32::MAX))
    }

    fn enabled_config(&self, hat: HatId) -> Option<VouchConfig> {
        self.vouch_configs
            .get(&hat)
            .copied()
            .filter(VouchConfig::is_enabled)
    }

    fn status(&self, wearer: &Identity, hat: HatId) -> WearerStatus {
        let rule = self.hierarchy_rule(wearer, hat);
        let eligible = match self.enabled_config(hat) {
            Some(config) => {
                let vouched = config.is_met(self.vouch_count(wearer, hat));
                if config.combine_with_hierarchy {
                    rule.eligible || vouched
                } else {
                    vouched
                }
            }
            None => rule.eligible,
        };
        WearerStatus::new(eligible, rule.standing)
    }
}

pub struct EligibilityResolver {
    hats: Arc<dyn HatsOracle>,
    clock: Arc<dyn Clock>,
    limits: VouchingLimits,
    guard: ReentrancyGuard,
    state: Mutex<EligibilityStore>,
}

impl EligibilityResolver {
    /// Create a resolver with no rules and no vouching
    pub fn new(
        super_admin: Identity,
        limits: VouchingLimits,
        hats: Arc<dyn HatsOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            hats,
            clock,
            limits,
            guard: ReentrancyGuard::new(),
            state: Mutex::new(EligibilityStore::new(super_admin)),
        }
    }

    /// Resolved eligibility and standing of `wearer` for `hat`
    pub fn wearer_status(&self, wearer: &Identity, hat: HatId) -> WearerStatus {
        self.state.lock().status(wearer, hat)
    }

    // --- Hierarchy rules ---

    /// Override the hierarchy rule for one wearer of `hat`
    pub fn set_wearer_eligibility(
        &self,
        caller: &Identity,
        wearer: &Identity,
        hat: HatId,
        eligible: bool,
        standing: bool,
    ) -> GovernanceResult<()> {
        self.administer(caller, &[hat], |store| {
            store
                .wearer_rules
                .entry(hat)
                .or_default()
                .insert(wearer.clone(), WearerRule::new(eligible, standing));
            Ok(GovernanceEvent::WearerEligibilityUpdated {
                wearer: wearer.clone(),
                hat,
                eligible,
                standing,
            })
        })
    }

    /// Remove a wearer override so the hat default applies again
    pub fn clear_wearer_eligibility(
        &self,
        caller: &Identity,
        wearer: &Identity,
        hat: HatId,
    ) -> GovernanceResult<()> {
        self.administer(caller, &[hat], |store| {
            if let Some(rules) = store.wearer_rules.get_mut(&hat) {
                rules.remove(wearer);
                if rules.is_empty() {
                    store.wearer_rules.remove(&hat);
                }
            }
            Ok(GovernanceEvent::WearerEligibilityCleared {
                wearer: wearer.clone(),
                hat,
            })
        })
    }

    /// Set the rule applied to wearers of `hat` without an override
    pub fn set_default_eligibility(
        &self,
        caller: &Identity,
        hat: HatId,
        eligible: bool,
        standing: bool,
    ) -> GovernanceResult<()> {
        self.administer(caller, &[hat], |store| {
            store
                .default_rules
                .insert(hat, WearerRule::new(eligible, standing));
            Ok(GovernanceEvent::DefaultEligibilityUpdated {
                hat,
                eligible,
                standing,
            })
        })
    }

    /// Set overrides for many wearers of one hat with a single event
    pub fn batch_set_wearer_eligibility(
        &self,
        caller: &Identity,
        hat: HatId,
        wearers: &[Identity],
        eligible: &[bool],
        standing: &[bool],
    ) -> GovernanceResult<()> {
        check_lengths(wearers.len(), &[eligible.len(), standing.len()])?;
        self.administer(caller, &[hat], |store| {
            let rules = store.wearer_rules.entry(hat).or_default();
            for ((wearer, &e), &s) in wearers.iter().zip(eligible).zip(standing) {
                rules.insert(wearer.clone(), WearerRule::new(e, s));
            }
            Ok(GovernanceEvent::BulkWearerEligibilityUpdated {
                hat,
                wearers: wearers.to_vec(),
                eligible: eligible.to_vec(),
                standing: standing.to_vec(),
            })
        })
    }

    // --- Vouching configuration ---

    /// Enable vouching for `hat`, replacing any earlier configuration
    pub fn configure_vouching(
        &self,
        caller: &Identity,
        hat: HatId,
        quorum: u32,
        membership_hat: HatId,
        combine_with_hierarchy: bool,
    ) -> GovernanceResult<()> {
        if quorum == 0 {
            return Err(GovernanceError::InvalidQuorum(quorum));
        }
        self.administer(caller, &[hat], |store| {
            store.vouch_configs.insert(
                hat,
                VouchConfig::new(quorum, membership_hat, combine_with_hierarchy),
            );
            info!(
                hat = %hat,
                quorum,
                membership_hat = %membership_hat,
                combine_with_hierarchy,
                "Vouching configured"
            );
            Ok(GovernanceEvent::VouchingConfigured {
                hat,
                quorum,
                membership_hat,
                combine_with_hierarchy,
            })
        })
    }

    /// Configure vouching for several hats in one call
    pub fn batch_configure_vouching(
        &self,
        caller: &Identity,
        hats: &[HatId],
        quorums: &[u32],
        membership_hats: &[HatId],
        combine_with_hierarchy: &[bool],
    ) -> GovernanceResult<()> {
        check_lengths(
            hats.len(),
            &[quorums.len(), membership_hats.len(), combine_with_hierarchy.len()],
        )?;
        if let Some(&zero) = quorums.iter().find(|q| **q == 0) {
            return Err(GovernanceError::InvalidQuorum(zero));
        }
        self.administer(caller, hats, |store| {
            for (i, &hat) in hats.iter().enumerate() {
                store.vouch_configs.insert(
                    hat,
                    VouchConfig::new(quorums[i], membership_hats[i], combine_with_hierarchy[i]),
                );
            }
            info!(hats = hats.len(), "Vouching configured in bulk");
            Ok(GovernanceEvent::BulkVouchingConfigured {
                hats: hats.to_vec(),
            })
        })
    }

    /// Disable vouching for `hat`; recorded vouches are kept
    pub fn reset_vouching(&self, caller: &Identity, hat: HatId) -> GovernanceResult<()> {
        self.administer(caller, &[hat], |store| {
            store.vouch_configs.remove(&hat);
            Ok(GovernanceEvent::VouchingReset { hat })
        })
    }

    // --- Vouch ledger ---

    /// Record `caller`'s vouch for `wearer` on `hat`
    pub fn vouch_for(
        &self,
        caller: &Identity,
        wearer: &Identity,
        hat: HatId,
    ) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();

        if caller == wearer {
            return Err(GovernanceError::CannotVouchForSelf);
        }
        let config = store
            .enabled_config(hat)
            .ok_or(GovernanceError::VouchingNotEnabled(hat))?;
        if store
            .vouchers(wearer, hat)
            .is_some_and(|set| set.contains(caller))
        {
            return Err(GovernanceError::AlreadyVouched {
                hat,
                wearer: wearer.clone(),
                voucher: caller.clone(),
            });
        }
        let member = self.hats.is_wearer_of(caller, config.membership_hat);
        if !member && !(config.combine_with_hierarchy && self.hats.is_admin_of(caller, hat)) {
            warn!(caller = %caller, hat = %hat, "Vouch rejected: caller may not vouch");
            return Err(GovernanceError::NotAuthorizedToVouch {
                caller: caller.clone(),
                hat,
            });
        }
        store.limiter.check(&self.limits, caller, now)?;

        store.limiter.record(&self.limits, caller, now);
        store
            .vouches
            .entry(hat)
            .or_default()
            .entry(wearer.clone())
            .or_default()
            .insert(caller.clone());
        let count = store.vouch_count(wearer, hat);
        store.journal.record(
            now,
            GovernanceEvent::Vouched {
                hat,
                wearer: wearer.clone(),
                voucher: caller.clone(),
                count,
            },
        );

        debug!(
            hat = %hat,
            wearer = %wearer,
            voucher = %caller,
            count,
            quorum = config.quorum,
            "Vouch recorded"
        );
        Ok(())
    }

    /// Withdraw `caller`'s vouch
    ///
    /// When the count falls below quorum for a replacing configuration, a
    /// current wearer without an override is reported ineligible to the
    /// hierarchy before the ledger changes.
    pub fn revoke_vouch(
        &self,
        caller: &Identity,
        wearer: &Identity,
        hat: HatId,
    ) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();

        let config = store
            .enabled_config(hat)
            .ok_or(GovernanceError::VouchingNotEnabled(hat))?;
        if !store
            .vouchers(wearer, hat)
            .is_some_and(|set| set.contains(caller))
        {
            return Err(GovernanceError::NoVouchToRevoke {
                hat,
                wearer: wearer.clone(),
                voucher: caller.clone(),
            });
        }

        let count = store.vouch_count(wearer, hat).saturating_sub(1);
        let revoke_standing = !config.is_met(count)
            && !config.combine_with_hierarchy
            && store.wearer_rule(wearer, hat).is_none()
            && self.hats.is_wearer_of(wearer, hat);
        if revoke_standing && !self.hats.set_standing(hat, wearer, false, true) {
            return Err(GovernanceError::OracleRejected(format!(
                "eligibility update for {wearer} on {hat}"
            )));
        }

        if let Some(ledger) = store.vouches.get_mut(&hat) {
            if let Some(set) = ledger.get_mut(wearer) {
                set.remove(caller);
                if set.is_empty() {
                    ledger.remove(wearer);
                }
            }
        }
        store.journal.record(
            now,
            GovernanceEvent::VouchRevoked {
                hat,
                wearer: wearer.clone(),
                voucher: caller.clone(),
                count,
                standing_revoked: revoke_standing,
            },
        );

        debug!(
            hat = %hat,
            wearer = %wearer,
            voucher = %caller,
            count,
            standing_revoked = revoke_standing,
            "Vouch revoked"
        );
        Ok(())
    }

    /// Mint `hat` to the caller once they are eligible for it
    pub fn claim_vouched_hat(&self, caller: &Identity, hat: HatId) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();

        if !store.status(caller, hat).can_wear() {
            return Err(GovernanceError::NotEligible {
                wearer: caller.clone(),
                hat,
            });
        }
        if self.hats.is_wearer_of(caller, hat) {
            return Err(GovernanceError::AlreadyWearingHat {
                wearer: caller.clone(),
                hat,
            });
        }
        if !self.hats.mint(hat, caller) {
            return Err(GovernanceError::OracleRejected(format!(
                "mint of {hat} to {caller}"
            )));
        }

        store.journal.record(
            now,
            GovernanceEvent::HatClaimed {
                hat,
                wearer: caller.clone(),
            },
        );
        info!(hat = %hat, wearer = %caller, "Vouched hat claimed");
        Ok(())
    }

    // --- Minting ---

    /// Mint `hat` to `wearer` through the hats oracle
    pub fn mint_hat(
        &self,
        caller: &Identity,
        hat: HatId,
        wearer: &Identity,
    ) -> GovernanceResult<()> {
        self.batch_mint_hats(caller, &[hat], std::slice::from_ref(wearer))
    }

    /// Mint `hats[i]` to `wearers[i]` for every `i`
    ///
    /// Every pair is checked against the hierarchy before the first mint.
    pub fn batch_mint_hats(
        &self,
        caller: &Identity,
        hats: &[HatId],
        wearers: &[Identity],
    ) -> GovernanceResult<()> {
        check_lengths(hats.len(), &[wearers.len()])?;
        self.administer(caller, hats, |_| {
            let mut seen = BTreeSet::new();
            for (&hat, wearer) in hats.iter().zip(wearers) {
                // A repeated pair would be refused by its second mint
                if !seen.insert((hat, wearer)) || self.hats.is_wearer_of(wearer, hat) {
                    return Err(GovernanceError::AlreadyWearingHat {
                        wearer: wearer.clone(),
                        hat,
                    });
                }
            }
            for (&hat, wearer) in hats.iter().zip(wearers) {
                if !self.hats.mint(hat, wearer) {
                    return Err(GovernanceError::OracleRejected(format!(
                        "mint of {hat} to {wearer}"
                    )));
                }
            }
            Ok(GovernanceEvent::HatsMinted {
                hats: hats.to_vec(),
                wearers: wearers.to_vec(),
            })
        })
    }

    // --- Administration ---

    /// Hand super admin rights to `to`
    pub fn transfer_super_admin(&self, caller: &Identity, to: Identity) -> GovernanceResult<()> {
        self.as_super_admin(caller, |store| {
            let from = std::mem::replace(&mut store.super_admin, to.clone());
            info!(from = %from, to = %to, "Super admin transferred");
            Ok(GovernanceEvent::SuperAdminTransferred { from, to })
        })
    }

    /// Overwrite the recorded join time of `user`
    pub fn set_user_join_time(
        &self,
        caller: &Identity,
        user: &Identity,
        joined_at: Timestamp,
    ) -> GovernanceResult<()> {
        self.as_super_admin(caller, |store| {
            store.limiter.set_join_time(user, joined_at);
            Ok(GovernanceEvent::UserJoinTimeSet {
                user: user.clone(),
                joined_at,
            })
        })
    }

    /// Record the caller's own join time at the current instant
    pub fn register_join(&self, caller: &Identity) -> GovernanceResult<Timestamp> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();
        store.limiter.register_join(caller, now)?;
        store.journal.record(
            now,
            GovernanceEvent::UserJoinTimeSet {
                user: caller.clone(),
                joined_at: now,
            },
        );
        Ok(now)
    }

    /// Replace the whole store from a snapshot made by `export_state`
    pub fn restore_state(&self, caller: &Identity, snapshot: &str) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let restored: EligibilityStore = serde_json::from_str(snapshot)
            .map_err(|e| GovernanceError::Snapshot(e.to_string()))?;
        let mut store = self.state.lock();
        if caller != &store.super_admin {
            return Err(GovernanceError::NotSuperAdmin(caller.clone()));
        }
        *store = restored;
        info!("Eligibility store restored");
        Ok(())
    }

    // --- Queries ---

    /// Current super admin
    pub fn super_admin(&self) -> Identity {
        self.state.lock().super_admin.clone()
    }

    /// Per-wearer override of the hierarchy rule, if any
    pub fn wearer_rule(&self, wearer: &Identity, hat: HatId) -> Option<WearerRule> {
        self.state.lock().wearer_rule(wearer, hat)
    }

    /// Default rule of `hat`, or the unset rule when none was configured
    pub fn default_rule(&self, hat: HatId) -> WearerRule {
        self.state
            .lock()
            .default_rules
            .get(&hat)
            .copied()
            .unwrap_or_else(WearerRule::unset)
    }

    /// Vouching configuration of `hat`, if enabled
    pub fn vouch_config(&self, hat: HatId) -> Option<VouchConfig> {
        self.state.lock().vouch_configs.get(&hat).copied()
    }

    /// Number of vouches `wearer` holds for `hat`
    pub fn vouch_count(&self, wearer: &Identity, hat: HatId) -> u32 {
        self.state.lock().vouch_count(wearer, hat)
    }

    /// Whether `voucher` currently vouches for `wearer` on `hat`
    pub fn has_vouched(&self, voucher: &Identity, wearer: &Identity, hat: HatId) -> bool {
        self.state
            .lock()
            .vouchers(wearer, hat)
            .is_some_and(|set| set.contains(voucher))
    }

    /// Vouches `voucher` has issued today
    pub fn vouches_today(&self, voucher: &Identity) -> u32 {
        let now = self.clock.now();
        self.state
            .lock()
            .limiter
            .vouches_today(&self.limits, voucher, now)
    }

    /// Vouches `voucher` may still issue today
    pub fn remaining_vouches_today(&self, voucher: &Identity) -> u32 {
        let now = self.clock.now();
        self.state
            .lock()
            .limiter
            .remaining_today(&self.limits, voucher, now)
    }

    /// Recorded join time of `who`
    pub fn join_time(&self, who: &Identity) -> Option<Timestamp> {
        self.state.lock().limiter.join_time(who)
    }

    /// Journal of every successful mutation
    pub fn events(&self) -> Vec<JournalEntry> {
        self.state.lock().journal.entries.clone()
    }

    /// Serialize the whole store to JSON
    pub fn export_state(&self) -> GovernanceResult<String> {
        serde_json::to_string(&*self.state.lock())
            .map_err(|e| GovernanceError::Snapshot(e.to_string()))
    }

    // --- Internals ---

    /// Run a mutation that every hat in `hats` must authorize
    fn administer(
        &self,
        caller: &Identity,
        hats: &[HatId],
        apply: impl FnOnce(&mut EligibilityStore) -> GovernanceResult<GovernanceEvent>,
    ) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();
        if caller != &store.super_admin {
            if let Some(&hat) = hats.iter().find(|h| !self.hats.is_admin_of(caller, **h)) {
                warn!(caller = %caller, hat = %hat, "Eligibility change rejected: not a hat admin");
                return Err(GovernanceError::NotHatAdmin {
                    caller: caller.clone(),
                    hat,
                });
            }
        }
        let event = apply(&mut *store)?;
        debug!(?event, "Eligibility state updated");
        store.journal.record(now, event);
        Ok(())
    }

    fn as_super_admin(
        &self,
        caller: &Identity,
        apply: impl FnOnce(&mut EligibilityStore) -> GovernanceResult<GovernanceEvent>,
    ) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();
        if caller != &store.super_admin {
            warn!(caller = %caller, "Super admin call rejected");
            return Err(GovernanceError::NotSuperAdmin(caller.clone()));
        }
        let event = apply(&mut *store)?;
        store.journal.record(now, event);
        Ok(())
    }
}

fn check_lengths(expected: usize, others: &[usize]) -> GovernanceResult<()> {
    match others.iter().find(|len| **len != expected) {
        Some(&actual) => Err(GovernanceError::ArrayLengthMismatch { expected, actual }),
        None => Ok(()),
    }
}
