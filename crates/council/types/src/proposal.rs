//! Proposal records and their lifecycle phases

use crate::{ClassConfig, HatId, Identity, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Weight units a single ballot adds to a class total (weights sum to 100)
pub const BALLOT_WEIGHT_UNITS: u128 = 100;

/// A side-effect call run when its option wins
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub target: Identity,
    pub value: u128,
    pub data: Vec<u8>,
}

impl Call {
    pub fn new(target: Identity, value: u128, data: Vec<u8>) -> Self {
        Self {
            target,
            value,
            data,
        }
    }
}

/// Which hat list a permission change applies to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HatRole {
    Voting,
    Creator,
}

impl std::fmt::Display for HatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HatRole::Voting => write!(f, "voting"),
            HatRole::Creator => write!(f, "creator"),
        }
    }
}

/// How a proposal's ballots are turned into a winner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TallyScheme {
    /// Direct democracy: a single class, every authorized voter has power 1
    Majority,
    /// Hybrid: per-class tallies blended by their slices
    Sliced(Vec<ClassConfig>),
}

impl TallyScheme {
    pub fn class_count(&self) -> usize {
        match self {
            TallyScheme::Majority => 1,
            TallyScheme::Sliced(classes) => classes.len(),
        }
    }
}

/// Accumulated score of one option, one entry per class
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOption {
    pub class_votes: Vec<u128>,
}

impl VoteOption {
    pub fn new(class_count: usize) -> Self {
        Self {
            class_votes: vec![0; class_count],
        }
    }

    pub fn votes_in(&self, class: usize) -> u128 {
        self.class_votes.get(class).copied().unwrap_or(0)
    }
}

/// Where a proposal sits in its lifecycle at a given instant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalPhase {
    /// `now <= expiry`, ballots accepted
    Open,
    /// Past expiry, waiting for finalize
    Expired,
    /// Terminal
    Finalized,
}

/// The recorded result of finalize
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub winner: usize,
    pub valid: bool,
    pub executed: bool,
    pub finalized_at: Timestamp,
}

/// A stored proposal
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    pub title: String,
    pub creator: Identity,
    pub options: Vec<VoteOption>,
    pub scheme: TallyScheme,
    /// Per-class sum of ballot weight units times voter power
    pub class_totals: Vec<u128>,
    /// Sum of ballot weight units over every ballot cast
    pub total_weight: u128,
    pub created_at: Timestamp,
    pub expiry: Timestamp,
    pub voters: BTreeSet<Identity>,
    /// Either empty or one batch per option
    #[serde(default)]
    pub batches: Vec<Vec<Call>>,
    /// Empty means any voting hat may vote
    #[serde(default)]
    pub restricted_hats: Vec<HatId>,
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl Proposal {
    /// Phase at `now`; the expiry comparison is never cached
    pub fn phase(&self, now: Timestamp) -> ProposalPhase {
        if self.outcome.is_some() {
            ProposalPhase::Finalized
        } else if now <= self.expiry {
            ProposalPhase::Open
        } else {
            ProposalPhase::Expired
        }
    }

    pub fn option_count(&self) -> usize {
        self.options.len()
    }

    pub fn is_restricted(&self) -> bool {
        !self.restricted_hats.is_empty()
    }

    pub fn has_voted(&self, voter: &Identity) -> bool {
        self.voters.contains(voter)
    }

    /// Scores of every option in one class
    pub fn class_scores(&self, class: usize) -> Vec<u128> {
        self.options.iter().map(|o| o.votes_in(class)).collect()
    }

    /// Raw per-option, per-class score matrix
    pub fn score_matrix(&self) -> Vec<Vec<u128>> {
        self.options.iter().map(|o| o.class_votes.clone()).collect()
    }

    /// Batch attached to an option, empty when none
    pub fn batch_for(&self, option: usize) -> &[Call] {
        self.batches.get(option).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Everything a creator supplies to open a proposal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDraft {
    pub title: String,
    pub duration_minutes: u64,
    pub option_count: usize,
    #[serde(default)]
    pub batches: Vec<Vec<Call>>,
    #[serde(default)]
    pub restricted_hats: Vec<HatId>,
}

impl ProposalDraft {
    pub fn new(title: impl Into<String>, duration_minutes: u64, option_count: usize) -> Self {
        Self {
            title: title.into(),
            duration_minutes,
            option_count,
            batches: Vec::new(),
            restricted_hats: Vec::new(),
        }
    }

    pub fn with_batches(mut self, batches: Vec<Vec<Call>>) -> Self {
        self.batches = batches;
        self
    }

    pub fn restricted_to(mut self, hat: HatId) -> Self {
        self.restricted_hats.push(hat);
        self
    }

    /// True when at least one option carries calls
    pub fn has_calls(&self) -> bool {
        self.batches.iter().any(|b| !b.is_empty())
    }
}
