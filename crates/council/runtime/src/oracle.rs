//! External collaborators: the role hierarchy, token balances and the batch
//! executor
//!
//! The engines consume these as traits and never cache their answers across
//! calls. The in-memory implementations back development setups and tests.

use council_types::{Call, HatId, Identity, ProposalId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// The role hierarchy that answers who wears and who administers a hat
pub trait HatsOracle: Send + Sync {
    fn is_wearer_of(&self, who: &Identity, hat: HatId) -> bool;

    fn is_admin_of(&self, who: &Identity, hat: HatId) -> bool;

    /// Grant `hat` to `wearer`; false when the hierarchy refuses
    fn mint(&self, hat: HatId, wearer: &Identity) -> bool;

    /// Push an eligibility/standing verdict for a wearer; false when refused
    fn set_standing(&self, hat: HatId, wearer: &Identity, eligible: bool, standing: bool) -> bool;

    /// Pairwise balances: `result[i]` is how many of `hats[i]` `wearers[i]`
    /// holds
    fn batch_balance_check(&self, wearers: &[Identity], hats: &[HatId]) -> Vec<u64>;
}

/// Token balances for token-weighted voting classes
pub trait BalanceSource: Send + Sync {
    fn balance_of(&self, who: &Identity, asset: &Identity) -> u128;
}

/// Outcome of one call inside an executed batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub target: Identity,
    pub success: bool,
}

/// Per-call report of an executed batch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub results: Vec<CallResult>,
}

impl ExecutionReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("call {index} to {target} reverted: {reason}")]
    CallReverted {
        index: usize,
        target: Identity,
        reason: String,
    },

    #[error("executor unavailable: {0}")]
    Unavailable(String),
}

/// Runs a winning option's batch atomically: either every call lands or
/// the whole batch reverts
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        proposal: ProposalId,
        calls: &[Call],
    ) -> Result<ExecutionReport, ExecutorError>;
}

/// A standing update pushed to [`InMemoryHats`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StandingUpdate {
    pub hat: HatId,
    pub wearer: Identity,
    pub eligible: bool,
    pub standing: bool,
}

#[derive(Debug, Default)]
struct HatsState {
    wearers: HashMap<HatId, HashSet<Identity>>,
    admins: HashMap<HatId, HashSet<Identity>>,
    standing_updates: Vec<StandingUpdate>,
    refuse_writes: bool,
}

/// In-memory role hierarchy
///
/// Minting fails for existing wearers. An ineligible or bad-standing
/// verdict removes the wearer, as the hierarchy would burn the hat.
#[derive(Debug, Default)]
pub struct InMemoryHats {
    state: Mutex<HatsState>,
}

impl InMemoryHats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wear(&self, hat: HatId, who: &Identity) {
        self.state
            .lock()
            .wearers
            .entry(hat)
            .or_default()
            .insert(who.clone());
    }

    pub fn take_off(&self, hat: HatId, who: &Identity) {
        if let Some(set) = self.state.lock().wearers.get_mut(&hat) {
            set.remove(who);
        }
    }

    pub fn make_admin(&self, hat: HatId, who: &Identity) {
        self.state
            .lock()
            .admins
            .entry(hat)
            .or_default()
            .insert(who.clone());
    }

    /// Make every subsequent `mint` and `set_standing` fail
    pub fn refuse_writes(&self, refuse: bool) {
        self.state.lock().refuse_writes = refuse;
    }

    pub fn standing_updates(&self) -> Vec<StandingUpdate> {
        self.state.lock().standing_updates.clone()
    }

    pub fn wearer_count(&self, hat: HatId) -> usize {
        self.state
            .lock()
            .wearers
            .get(&hat)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

impl HatsOracle for InMemoryHats {
    fn is_wearer_of(&self, who: &Identity, hat: HatId) -> bool {
        self.state
            .lock()
            .wearers
            .get(&hat)
            .map(|set| set.contains(who))
            .unwrap_or(false)
    }

    fn is_admin_of(&self, who: &Identity, hat: HatId) -> bool {
        self.state
            .lock()
            .admins
            .get(&hat)
            .map(|set| set.contains(who))
            .unwrap_or(false)
    }

    fn mint(&self, hat: HatId, wearer: &Identity) -> bool {
        let mut state = self.state.lock();
        if state.refuse_writes {
            return false;
        }
        state.wearers.entry(hat).or_default().insert(wearer.clone())
    }

    fn set_standing(&self, hat: HatId, wearer: &Identity, eligible: bool, standing: bool) -> bool {
        let mut state = self.state.lock();
        if state.refuse_writes {
            return false;
        }
        if !(eligible && standing) {
            if let Some(set) = state.wearers.get_mut(&hat) {
                set.remove(wearer);
            }
        }
        state.standing_updates.push(StandingUpdate {
            hat,
            wearer: wearer.clone(),
            eligible,
            standing,
        });
        true
    }

    fn batch_balance_check(&self, wearers: &[Identity], hats: &[HatId]) -> Vec<u64> {
        let state = self.state.lock();
        wearers
            .iter()
            .zip(hats)
            .map(|(who, hat)| {
                let wears = state
                    .wearers
                    .get(hat)
                    .map(|set| set.contains(who))
                    .unwrap_or(false);
                u64::from(wears)
            })
            .collect()
    }
}

/// In-memory token balances
#[derive(Debug, Default)]
pub struct InMemoryBalances {
    balances: Mutex<HashMap<(Identity, Identity), u128>>,
}

impl InMemoryBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, who: &Identity, asset: &Identity, amount: u128) {
        self.balances
            .lock()
            .insert((who.clone(), asset.clone()), amount);
    }
}

impl BalanceSource for InMemoryBalances {
    fn balance_of(&self, who: &Identity, asset: &Identity) -> u128 {
        self.balances
            .lock()
            .get(&(who.clone(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }
}

/// Executor that records every batch it runs
///
/// A batch touching a target marked with [`RecordingExecutor::fail_on`]
/// reverts as a whole and is not recorded.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<(ProposalId, Vec<Call>)>>,
    failing_targets: Mutex<HashSet<Identity>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, target: &Identity) {
        self.failing_targets.lock().insert(target.clone());
    }

    pub fn executed(&self) -> Vec<(ProposalId, Vec<Call>)> {
        self.executed.lock().clone()
    }

    pub fn execution_count(&self) -> usize {
        self.executed.lock().len()
    }
}

impl Executor for RecordingExecutor {
    fn execute(
        &self,
        proposal: ProposalId,
        calls: &[Call],
    ) -> Result<ExecutionReport, ExecutorError> {
        {
            let failing = self.failing_targets.lock();
            if let Some((index, call)) = calls
                .iter()
                .enumerate()
                .find(|(_, call)| failing.contains(&call.target))
            {
                return Err(ExecutorError::CallReverted {
                    index,
                    target: call.target.clone(),
                    reason: "target reverted".into(),
                });
            }
        }

        self.executed.lock().push((proposal, calls.to_vec()));
        Ok(ExecutionReport {
            results: calls
                .iter()
                .map(|call| CallResult {
                    target: call.target.clone(),
                    success: true,
                })
                .collect(),
        })
    }
}
