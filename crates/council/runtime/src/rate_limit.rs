//! Per-identity vouch issuance limits
//!
//! Counters are keyed by `(voucher, day)` where `day = now / seconds_per_day`,
//! so a new day starts from zero without any reset. Checking and recording
//! are separate steps: callers check, finish their own validation, then
//! record.

use council_types::{GovernanceError, GovernanceResult, Identity, Timestamp, VouchingLimits};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VouchRateLimiter {
    join_times: HashMap<Identity, Timestamp>,
    /// voucher -> day index -> vouches issued that day
    daily: HashMap<Identity, BTreeMap<u64, u32>>,
}

impl VouchRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn day_index(limits: &VouchingLimits, now: Timestamp) -> u64 {
        now / limits.seconds_per_day.max(1)
    }

    /// Reject when `voucher` may not issue another vouch at `now`
    pub fn check(
        &self,
        limits: &VouchingLimits,
        voucher: &Identity,
        now: Timestamp,
    ) -> GovernanceResult<()> {
        let day = Self::day_index(limits, now);
        if self.vouches_on(voucher, day) >= limits.max_daily_vouches {
            return Err(GovernanceError::VouchingRateLimitExceeded {
                voucher: voucher.clone(),
                day,
                limit: limits.max_daily_vouches,
            });
        }

        let window = limits.new_user_restriction_secs();
        if window > 0 {
            // Unknown tenure counts as brand new
            let allowed_at = self
                .join_times
                .get(voucher)
                .map_or(Timestamp::MAX, |joined| joined.saturating_add(window));
            if now < allowed_at {
                return Err(GovernanceError::NewUserVouchingRestricted {
                    voucher: voucher.clone(),
                    allowed_at,
                });
            }
        }
        Ok(())
    }

    /// Count one vouch against `voucher`'s current day
    ///
    /// Only the current day's counter is kept; earlier days are dropped.
    pub fn record(&mut self, limits: &VouchingLimits, voucher: &Identity, now: Timestamp) -> u32 {
        let day = Self::day_index(limits, now);
        let days = self.daily.entry(voucher.clone()).or_default();
        days.retain(|d, _| *d >= day);
        let count = days.entry(day).or_default();
        *count = count.saturating_add(1);
        *count
    }

    pub fn vouches_on(&self, voucher: &Identity, day: u64) -> u32 {
        self.daily
            .get(voucher)
            .and_then(|days| days.get(&day))
            .copied()
            .unwrap_or(0)
    }

    pub fn vouches_today(
        &self,
        limits: &VouchingLimits,
        voucher: &Identity,
        now: Timestamp,
    ) -> u32 {
        self.vouches_on(voucher, Self::day_index(limits, now))
    }

    pub fn remaining_today(
        &self,
        limits: &VouchingLimits,
        voucher: &Identity,
        now: Timestamp,
    ) -> u32 {
        limits
            .max_daily_vouches
            .saturating_sub(self.vouches_today(limits, voucher, now))
    }

    pub fn join_time(&self, who: &Identity) -> Option<Timestamp> {
        self.join_times.get(who).copied()
    }

    /// Overwrite the join time of `who`
    pub fn set_join_time(&mut self, who: &Identity, joined_at: Timestamp) {
        self.join_times.insert(who.clone(), joined_at);
    }

    /// Record a join time only once
    pub fn register_join(&mut self, who: &Identity, joined_at: Timestamp) -> GovernanceResult<()> {
        if self.join_times.contains_key(who) {
            return Err(GovernanceError::JoinTimeAlreadySet(who.clone()));
        }
        self.join_times.insert(who.clone(), joined_at);
        Ok(())
    }
}
