//! Events emitted by successful operations
//!
//! Every state-changing call appends exactly one event on success; batch
//! variants append one combined event. Failed calls append nothing.

use crate::{HatId, HatRole, Identity, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceEvent {
    ProposalCreated {
        proposal: ProposalId,
        creator: Identity,
        title: String,
        option_count: usize,
        expiry: Timestamp,
        restricted: bool,
    },
    VoteCast {
        proposal: ProposalId,
        voter: Identity,
        indices: Vec<usize>,
        weights: Vec<u8>,
    },
    Winner {
        proposal: ProposalId,
        winner: usize,
        valid: bool,
        executed: bool,
    },
    QuorumSet(u8),
    ExecutorSet(Identity),
    TargetAllowed {
        target: Identity,
        allowed: bool,
    },
    HatAllowed {
        hat: HatId,
        role: HatRole,
        allowed: bool,
    },
    ClassesSet {
        class_count: usize,
    },
    WearerEligibilityUpdated {
        wearer: Identity,
        hat: HatId,
        eligible: bool,
        standing: bool,
    },
    WearerEligibilityCleared {
        wearer: Identity,
        hat: HatId,
    },
    DefaultEligibilityUpdated {
        hat: HatId,
        eligible: bool,
        standing: bool,
    },
    BulkWearerEligibilityUpdated {
        hat: HatId,
        wearers: Vec<Identity>,
        eligible: Vec<bool>,
        standing: Vec<bool>,
    },
    VouchingConfigured {
        hat: HatId,
        quorum: u32,
        membership_hat: HatId,
        combine_with_hierarchy: bool,
    },
    BulkVouchingConfigured {
        hats: Vec<HatId>,
    },
    VouchingReset {
        hat: HatId,
    },
    Vouched {
        hat: HatId,
        wearer: Identity,
        voucher: Identity,
        count: u32,
    },
    VouchRevoked {
        hat: HatId,
        wearer: Identity,
        voucher: Identity,
        count: u32,
        standing_revoked: bool,
    },
    HatClaimed {
        hat: HatId,
        wearer: Identity,
    },
    HatsMinted {
        hats: Vec<HatId>,
        wearers: Vec<Identity>,
    },
    SuperAdminTransferred {
        from: Identity,
        to: Identity,
    },
    UserJoinTimeSet {
        user: Identity,
        joined_at: Timestamp,
    },
}

/// An event with the logical time it was recorded at
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub at: Timestamp,
    pub event: GovernanceEvent,
}

/// Append-only log of emitted events
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventJournal {
    pub entries: Vec<JournalEntry>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Timestamp, event: GovernanceEvent) {
        self.entries.push(JournalEntry { at, event });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&GovernanceEvent> {
        self.entries.last().map(|e| &e.event)
    }

    /// Events recorded at or after `since`
    pub fn since(&self, since: Timestamp) -> Vec<&JournalEntry> {
        self.entries.iter().filter(|e| e.at >= since).collect()
    }
}
