//! Council domain types.
//!
//! Data shared by the council engines:
//! - **Identifiers** for accounts, hats and proposals ([`Identity`], [`HatId`], [`ProposalId`]).
//! - **Proposal records** and drafts ([`Proposal`], [`ProposalDraft`], [`Call`]).
//! - **Voting classes** for hybrid tallies ([`ClassConfig`]).
//! - **Eligibility rules** and vouching configuration ([`WearerRule`], [`VouchConfig`]).
//! - **Errors**, **configuration** and the **event journal**.

#![deny(unsafe_code)]

pub mod class;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod event;
pub mod ids;
pub mod proposal;

pub use class::{ClassConfig, ClassStrategy};
pub use config::{
    GovernanceConfig, LoggingConfig, ProposalLimits, VouchingLimits, MAX_SUPPORTED_OPTIONS,
};
pub use eligibility::{VouchConfig, WearerRule, WearerStatus};
pub use error::{ErrorKind, GovernanceError, GovernanceResult, TallyError, TallyResult};
pub use event::{EventJournal, GovernanceEvent, JournalEntry};
pub use ids::{HatId, Identity, ProposalId, Timestamp};
pub use proposal::{
    Call, HatRole, Outcome, Proposal, ProposalDraft, ProposalPhase, TallyScheme, VoteOption,
    BALLOT_WEIGHT_UNITS,
};
