//! Proposal Engine: creation, weighted voting and one-shot finalize
//!
//! A proposal is Open until its expiry, Expired afterwards and Finalized
//! once `finalize` has recorded an outcome. Ballots only ever add to the
//! tallies; finalize runs once and, when the winner carries calls, hands
//! them to the [`Executor`] after re-checking every target.

use crate::clock::Clock;
use crate::guard::ReentrancyGuard;
use crate::hat_set::{wears_any, HatSet};
use crate::oracle::{BalanceSource, Executor, HatsOracle};
use crate::tally::{self, Winner};
use council_types::{
    Call, ClassConfig, ClassStrategy, EventJournal, GovernanceError, GovernanceEvent,
    GovernanceResult, HatId, HatRole, Identity, JournalEntry, Outcome, Proposal, ProposalDraft,
    ProposalId, ProposalLimits, ProposalPhase, TallyError, TallyScheme, VoteOption,
    BALLOT_WEIGHT_UNITS,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persisted state of one engine. Fields are only ever appended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalStore {
    pub proposals: Vec<Proposal>,
    pub quorum_percent: u8,
    pub executor: Identity,
    pub allowed_targets: BTreeSet<Identity>,
    pub voting_hats: HatSet,
    pub creator_hats: HatSet,
    /// Scheme captured by proposals created from now on
    pub scheme: TallyScheme,
    pub journal: EventJournal,
}

/// Owns the proposals of one organization
pub struct ProposalEngine {
    /// The engine's own address; never a valid call target
    address: Identity,
    limits: ProposalLimits,
    hats: Arc<dyn HatsOracle>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<dyn Executor>,
    balances: Option<Arc<dyn BalanceSource>>,
    guard: ReentrancyGuard,
    state: Mutex<ProposalStore>,
}

impl ProposalEngine {
    /// Create a direct-democracy engine
    pub fn new(
        address: Identity,
        executor: Identity,
        limits: ProposalLimits,
        hats: Arc<dyn HatsOracle>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn Executor>,
    ) -> Self {
        let store = ProposalStore {
            proposals: Vec::new(),
            quorum_percent: limits.default_quorum_percent,
            executor,
            allowed_targets: BTreeSet::new(),
            voting_hats: HatSet::new(),
            creator_hats: HatSet::new(),
            scheme: TallyScheme::Majority,
            journal: EventJournal::new(),
        };
        Self {
            address,
            limits,
            hats,
            clock,
            dispatcher,
            balances: None,
            guard: ReentrancyGuard::new(),
            state: Mutex::new(store),
        }
    }

    /// Attach the balance source token-weighted classes read from
    pub fn with_balances(mut self, balances: Arc<dyn BalanceSource>) -> Self {
        self.balances = Some(balances);
        self
    }

    /// The engine's own address
    pub fn address(&self) -> &Identity {
        &self.address
    }

    // --- Lifecycle ---

    /// Open a new proposal and return its identifier
    pub fn create_proposal(
        &self,
        caller: &Identity,
        draft: ProposalDraft,
    ) -> GovernanceResult<ProposalId> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let store = &mut *guard;

        if caller != &store.executor && !store.creator_hats.worn_by(self.hats.as_ref(), caller) {
            warn!(caller = %caller, "Proposal creation rejected: not a creator");
            return Err(GovernanceError::unauthorized(caller, "create proposals"));
        }
        self.validate_draft(&store.allowed_targets, &draft)?;

        let expiry = draft
            .duration_minutes
            .checked_mul(60)
            .and_then(|secs| now.checked_add(secs))
            .ok_or(TallyError::Overflow)?;

        let id = ProposalId(store.proposals.len() as u64);
        let class_count = store.scheme.class_count();
        let batches = if draft.has_calls() {
            draft.batches
        } else {
            Vec::new()
        };
        let restricted_hats = HatSet::from_hats(draft.restricted_hats).as_slice().to_vec();
        let restricted = !restricted_hats.is_empty();

        store.proposals.push(Proposal {
            id,
            title: draft.title.clone(),
            creator: caller.clone(),
            options: (0..draft.option_count)
                .map(|_| VoteOption::new(class_count))
                .collect(),
            scheme: store.scheme.clone(),
            class_totals: vec![0; class_count],
            total_weight: 0,
            created_at: now,
            expiry,
            voters: BTreeSet::new(),
            batches,
            restricted_hats,
            outcome: None,
        });
        store.journal.record(
            now,
            GovernanceEvent::ProposalCreated {
                proposal: id,
                creator: caller.clone(),
                title: draft.title,
                option_count: draft.option_count,
                expiry,
                restricted,
            },
        );

        info!(
            proposal_id = %id,
            creator = %caller,
            options = draft.option_count,
            expiry,
            restricted,
            "Proposal created"
        );
        Ok(id)
    }

    /// Cast one irrevocable weighted ballot
    pub fn vote(
        &self,
        caller: &Identity,
        proposal_id: ProposalId,
        indices: &[usize],
        weights: &[u8],
    ) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut guard = self.state.lock();
        let store = &mut *guard;

        let index = proposal_id.index();
        let proposal = store
            .proposals
            .get(index)
            .ok_or(GovernanceError::UnknownProposal(proposal_id))?;
        if proposal.phase(now) != ProposalPhase::Open {
            return Err(GovernanceError::VotingExpired(proposal_id));
        }

        let oracle = self.hats.as_ref();
        if caller != &store.executor && !store.voting_hats.worn_by(oracle, caller) {
            return Err(GovernanceError::unauthorized(caller, "vote"));
        }
        if proposal.is_restricted() && !wears_any(oracle, caller, &proposal.restricted_hats) {
            return Err(GovernanceError::RoleNotAllowed(caller.clone()));
        }
        if proposal.has_voted(caller) {
            return Err(GovernanceError::AlreadyVoted {
                proposal: proposal_id,
                voter: caller.clone(),
            });
        }
        tally::validate_weights(indices, weights, proposal.option_count())?;

        let powers = self.class_powers(&proposal.scheme, caller)?;
        if powers.iter().all(|p| *p == 0) {
            return Err(GovernanceError::NoVotingPower(caller.clone()));
        }

        // Work on copies so an overflow in any class leaves the proposal as it was
        let mut class_scores: Vec<Vec<u128>> = (0..powers.len())
            .map(|class| proposal.class_scores(class))
            .collect();
        let mut class_totals = proposal.class_totals.clone();
        for (class, &power) in powers.iter().enumerate() {
            if power == 0 {
                continue;
            }
            let deltas = tally::score_deltas(indices, weights, power)?;
            tally::apply_deltas(&mut class_scores[class], &deltas)?;
            let units = power
                .checked_mul(BALLOT_WEIGHT_UNITS)
                .ok_or(TallyError::Overflow)?;
            class_totals[class] = class_totals[class]
                .checked_add(units)
                .ok_or(TallyError::Overflow)?;
        }
        let total_weight = proposal
            .total_weight
            .checked_add(BALLOT_WEIGHT_UNITS)
            .ok_or(TallyError::Overflow)?;

        let proposal = &mut store.proposals[index];
        for (class, scores) in class_scores.into_iter().enumerate() {
            for (option, score) in proposal.options.iter_mut().zip(scores) {
                option.class_votes[class] = score;
            }
        }
        proposal.class_totals = class_totals;
        proposal.total_weight = total_weight;
        proposal.voters.insert(caller.clone());

        store.journal.record(
            now,
            GovernanceEvent::VoteCast {
                proposal: proposal_id,
                voter: caller.clone(),
                indices: indices.to_vec(),
                weights: weights.to_vec(),
            },
        );
        debug!(
            proposal_id = %proposal_id,
            voter = %caller,
            total_weight,
            "Vote cast"
        );
        Ok(())
    }

    /// Pick the winner of an expired proposal and execute its calls
    ///
    /// Runs at most once per proposal. When execution fails the proposal
    /// returns to Expired and the error is reported.
    pub fn finalize(
        &self,
        caller: &Identity,
        proposal_id: ProposalId,
    ) -> GovernanceResult<Outcome> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let index = proposal_id.index();

        let (mut outcome, batch) = {
            let mut guard = self.state.lock();
            let store = &mut *guard;
            let proposal = store
                .proposals
                .get(index)
                .ok_or(GovernanceError::UnknownProposal(proposal_id))?;
            match proposal.phase(now) {
                ProposalPhase::Open => return Err(GovernanceError::VotingOpen(proposal_id)),
                ProposalPhase::Finalized => {
                    return Err(GovernanceError::AlreadyFinalized(proposal_id))
                }
                ProposalPhase::Expired => {}
            }

            let winner = Self::pick_winner(proposal, store.quorum_percent)?;
            let batch = if winner.valid {
                proposal.batch_for(winner.index).to_vec()
            } else {
                Vec::new()
            };
            // The allow-list may have changed since creation
            for call in &batch {
                self.check_target(&store.allowed_targets, &call.target)?;
            }

            let outcome = Outcome {
                winner: winner.index,
                valid: winner.valid,
                executed: false,
                finalized_at: now,
            };
            store.proposals[index].outcome = Some(outcome.clone());
            (outcome, batch)
        };

        // The store lock is released so the executor may read state; the
        // guard token stays held so it cannot mutate it
        if !batch.is_empty() {
            let result = self
                .dispatcher
                .execute(proposal_id, &batch)
                .map_err(|e| e.to_string())
                .and_then(|report| {
                    if report.all_succeeded() {
                        Ok(report)
                    } else {
                        Err("executor reported a failed call".to_string())
                    }
                });
            match result {
                Ok(report) => {
                    outcome.executed = true;
                    debug!(
                        proposal_id = %proposal_id,
                        calls = report.results.len(),
                        "Winning batch executed"
                    );
                }
                Err(reason) => {
                    if let Some(proposal) = self.state.lock().proposals.get_mut(index) {
                        proposal.outcome = None;
                    }
                    warn!(
                        proposal_id = %proposal_id,
                        reason = %reason,
                        "Execution failed, finalize reverted"
                    );
                    return Err(GovernanceError::ExecutionFailed {
                        proposal: proposal_id,
                        reason,
                    });
                }
            }
        }

        let mut guard = self.state.lock();
        if let Some(proposal) = guard.proposals.get_mut(index) {
            proposal.outcome = Some(outcome.clone());
        }
        guard.journal.record(
            now,
            GovernanceEvent::Winner {
                proposal: proposal_id,
                winner: outcome.winner,
                valid: outcome.valid,
                executed: outcome.executed,
            },
        );

        info!(
            proposal_id = %proposal_id,
            finalized_by = %caller,
            winner = outcome.winner,
            valid = outcome.valid,
            executed = outcome.executed,
            "Proposal finalized"
        );
        Ok(outcome)
    }

    // --- Administration (executor only) ---

    /// Set the winning margin as a percentage of total weight (1..=100)
    pub fn set_quorum(&self, caller: &Identity, quorum_percent: u8) -> GovernanceResult<()> {
        self.administer(caller, "set quorum", |store| {
            if quorum_percent == 0 || quorum_percent > 100 {
                return Err(GovernanceError::InvalidQuorum(u32::from(quorum_percent)));
            }
            store.quorum_percent = quorum_percent;
            Ok(GovernanceEvent::QuorumSet(quorum_percent))
        })
    }

    /// Hand the executor role to another identity
    pub fn set_executor(&self, caller: &Identity, executor: Identity) -> GovernanceResult<()> {
        self.administer(caller, "set executor", |store| {
            store.executor = executor.clone();
            Ok(GovernanceEvent::ExecutorSet(executor))
        })
    }

    /// Allow or disallow an address as a call target
    pub fn set_target_allowed(
        &self,
        caller: &Identity,
        target: Identity,
        allowed: bool,
    ) -> GovernanceResult<()> {
        self.administer(caller, "set call targets", |store| {
            if allowed && target == self.address {
                return Err(GovernanceError::TargetSelf);
            }
            if allowed {
                store.allowed_targets.insert(target.clone());
            } else {
                store.allowed_targets.remove(&target);
            }
            Ok(GovernanceEvent::TargetAllowed { target, allowed })
        })
    }

    /// Allow or disallow a hat for voting or for proposal creation
    pub fn set_hat_allowed(
        &self,
        caller: &Identity,
        hat: HatId,
        role: HatRole,
        allowed: bool,
    ) -> GovernanceResult<()> {
        self.administer(caller, "set hat permissions", |store| {
            let set = match role {
                HatRole::Voting => &mut store.voting_hats,
                HatRole::Creator => &mut store.creator_hats,
            };
            set.set(hat, allowed);
            Ok(GovernanceEvent::HatAllowed { hat, role, allowed })
        })
    }

    /// Switch new proposals to a hybrid tally over `classes`
    pub fn set_classes(
        &self,
        caller: &Identity,
        classes: Vec<ClassConfig>,
    ) -> GovernanceResult<()> {
        self.administer(caller, "set voting classes", |store| {
            let slices: Vec<u8> = classes.iter().map(|c| c.slice_pct).collect();
            tally::validate_class_slices(&slices)?;
            if self.balances.is_none() && classes.iter().any(ClassConfig::is_token_weighted) {
                return Err(GovernanceError::MissingBalanceSource);
            }
            let class_count = classes.len();
            store.scheme = TallyScheme::Sliced(classes);
            Ok(GovernanceEvent::ClassesSet { class_count })
        })
    }

    /// Replace the whole store from a snapshot made by [`export_state`]
    ///
    /// [`export_state`]: ProposalEngine::export_state
    pub fn restore_state(&self, caller: &Identity, snapshot: &str) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let restored: ProposalStore = serde_json::from_str(snapshot)
            .map_err(|e| GovernanceError::Snapshot(e.to_string()))?;
        let mut store = self.state.lock();
        if caller != &store.executor {
            return Err(GovernanceError::unauthorized(caller, "restore state"));
        }
        info!(proposals = restored.proposals.len(), "Proposal store restored");
        *store = restored;
        Ok(())
    }

    // --- Queries ---

    /// Number of proposals created so far
    pub fn proposal_count(&self) -> usize {
        self.state.lock().proposals.len()
    }

    /// Current winning margin in percent
    pub fn quorum_percent(&self) -> u8 {
        self.state.lock().quorum_percent
    }

    /// Current executor
    pub fn executor(&self) -> Identity {
        self.state.lock().executor.clone()
    }

    /// A copy of the proposal, if it exists
    pub fn proposal(&self, proposal_id: ProposalId) -> Option<Proposal> {
        self.state.lock().proposals.get(proposal_id.index()).cloned()
    }

    /// Lifecycle phase of the proposal at the current time
    pub fn phase(&self, proposal_id: ProposalId) -> GovernanceResult<ProposalPhase> {
        let now = self.clock.now();
        self.with_proposal(proposal_id, |p| p.phase(now))
    }

    /// Whether `voter` has already cast a ballot
    pub fn has_voted(&self, proposal_id: ProposalId, voter: &Identity) -> GovernanceResult<bool> {
        self.with_proposal(proposal_id, |p| p.has_voted(voter))
    }

    /// Whether voting is limited to the proposal's restricted hats
    pub fn is_restricted(&self, proposal_id: ProposalId) -> GovernanceResult<bool> {
        self.with_proposal(proposal_id, Proposal::is_restricted)
    }

    /// Hats allowed to vote on a restricted proposal
    pub fn restricted_hats(&self, proposal_id: ProposalId) -> GovernanceResult<Vec<HatId>> {
        self.with_proposal(proposal_id, |p| p.restricted_hats.clone())
    }

    /// Recorded outcome, once finalized
    pub fn outcome(&self, proposal_id: ProposalId) -> GovernanceResult<Option<Outcome>> {
        self.with_proposal(proposal_id, |p| p.outcome.clone())
    }

    /// Scores finalize would compare: raw for majority proposals, blended
    /// for hybrid ones
    pub fn option_scores(&self, proposal_id: ProposalId) -> GovernanceResult<Vec<u128>> {
        let scores = self.with_proposal(proposal_id, |p| match &p.scheme {
            TallyScheme::Majority => Ok(p.class_scores(0)),
            TallyScheme::Sliced(classes) => {
                let slices: Vec<u8> = classes.iter().map(|c| c.slice_pct).collect();
                tally::blend_scores(&p.score_matrix(), &p.class_totals, &slices)
            }
        })?;
        Ok(scores?)
    }

    /// Addresses winning batches may call
    pub fn allowed_targets(&self) -> Vec<Identity> {
        self.state.lock().allowed_targets.iter().cloned().collect()
    }

    /// Hats whose wearers may vote
    pub fn voting_hats(&self) -> Vec<HatId> {
        self.state.lock().voting_hats.as_slice().to_vec()
    }

    /// Hats whose wearers may create proposals
    pub fn creator_hats(&self) -> Vec<HatId> {
        self.state.lock().creator_hats.as_slice().to_vec()
    }

    /// Tally scheme new proposals will capture
    pub fn scheme(&self) -> TallyScheme {
        self.state.lock().scheme.clone()
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

    fn with_proposal<T>(
        &self,
        proposal_id: ProposalId,
        f: impl FnOnce(&Proposal) -> T,
    ) -> GovernanceResult<T> {
        self.state
            .lock()
            .proposals
            .get(proposal_id.index())
            .map(f)
            .ok_or(GovernanceError::UnknownProposal(proposal_id))
    }

    /// Run an executor-only mutation and journal its event
    fn administer(
        &self,
        caller: &Identity,
        action: &str,
        apply: impl FnOnce(&mut ProposalStore) -> GovernanceResult<GovernanceEvent>,
    ) -> GovernanceResult<()> {
        let _token = self.guard.enter()?;
        let now = self.clock.now();
        let mut store = self.state.lock();
        if caller != &store.executor {
            warn!(caller = %caller, action, "Privileged call rejected");
            return Err(GovernanceError::unauthorized(caller, action));
        }
        let event = apply(&mut *store)?;
        info!(action, ?event, "Configuration updated");
        store.journal.record(now, event);
        Ok(())
    }

    fn validate_draft(
        &self,
        allowed_targets: &BTreeSet<Identity>,
        draft: &ProposalDraft,
    ) -> GovernanceResult<()> {
        let limits = &self.limits;
        let title_len = draft.title.len();
        if title_len == 0 || title_len > limits.max_title_len {
            return Err(GovernanceError::InvalidTitle {
                len: title_len,
                max: limits.max_title_len,
            });
        }
        if draft.option_count == 0 || draft.option_count > limits.max_options {
            return Err(GovernanceError::InvalidOptionCount {
                count: draft.option_count,
                max: limits.max_options,
            });
        }
        if draft.duration_minutes < limits.min_duration_minutes
            || draft.duration_minutes > limits.max_duration_minutes
        {
            return Err(GovernanceError::InvalidDuration {
                minutes: draft.duration_minutes,
                min: limits.min_duration_minutes,
                max: limits.max_duration_minutes,
            });
        }

        if draft.has_calls() {
            if draft.batches.len() != draft.option_count {
                return Err(GovernanceError::ArrayLengthMismatch {
                    expected: draft.option_count,
                    actual: draft.batches.len(),
                });
            }
            for batch in &draft.batches {
                if batch.len() > limits.max_calls_per_batch {
                    return Err(GovernanceError::TooManyCalls {
                        count: batch.len(),
                        max: limits.max_calls_per_batch,
                    });
                }
                for Call { target, .. } in batch {
                    self.check_target(allowed_targets, target)?;
                }
            }
        }
        Ok(())
    }

    fn check_target(
        &self,
        allowed_targets: &BTreeSet<Identity>,
        target: &Identity,
    ) -> GovernanceResult<()> {
        if target == &self.address {
            return Err(GovernanceError::TargetSelf);
        }
        if !allowed_targets.contains(target) {
            return Err(GovernanceError::TargetNotAllowed(target.clone()));
        }
        Ok(())
    }

    /// Power of `voter` in each class of `scheme`
    fn class_powers(&self, scheme: &TallyScheme, voter: &Identity) -> GovernanceResult<Vec<u128>> {
        let classes = match scheme {
            TallyScheme::Majority => return Ok(vec![1]),
            TallyScheme::Sliced(classes) => classes,
        };
        classes
            .iter()
            .map(|class| {
                if !class.hats.is_empty() && !wears_any(self.hats.as_ref(), voter, &class.hats) {
                    return Ok(0);
                }
                match &class.strategy {
                    ClassStrategy::Direct => Ok(1),
                    ClassStrategy::TokenBalance { asset } => {
                        let balances = self
                            .balances
                            .as_ref()
                            .ok_or(GovernanceError::MissingBalanceSource)?;
                        Ok(tally::power_for(
                            balances.balance_of(voter, asset),
                            class.min_balance,
                            class.quadratic,
                        ))
                    }
                }
            })
            .collect()
    }

    fn pick_winner(proposal: &Proposal, quorum_percent: u8) -> GovernanceResult<Winner> {
        let winner = match &proposal.scheme {
            TallyScheme::Majority => tally::pick_winner_majority(
                &proposal.class_scores(0),
                proposal.total_weight,
                quorum_percent,
                true,
            )?,
            TallyScheme::Sliced(classes) => {
                let slices: Vec<u8> = classes.iter().map(|c| c.slice_pct).collect();
                tally::pick_winner_n_slices(
                    &proposal.score_matrix(),
                    &proposal.class_totals,
                    &slices,
                    quorum_percent,
                    true,
                )?
            }
        };
        Ok(winner)
    }
}
