//! Council Runtime
//!
//! Engines for hat-gated organizational governance: weighted proposals with
//! one-shot execution, and eligibility resolution backed by community
//! vouching.
//!
//! # Architecture
//!
//! The [`Organization`] is the main entry point. It owns:
//!
//! - [`ProposalEngine`]: proposal creation, weighted ballots and finalize,
//!   in direct-democracy or hybrid (multi-class) mode
//! - [`EligibilityResolver`]: hierarchy rules, vouch quorums and rate-limited
//!   vouch issuance
//!
//! Both delegate role membership to a [`HatsOracle`] and read time from a
//! [`Clock`]. The pure arithmetic lives in [`tally`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use council_runtime::{InMemoryHats, ManualClock, Organization, RecordingExecutor};
//! use council_types::{GovernanceConfig, Identity, ProposalDraft};
//!
//! let executor = Identity::new("executor");
//! let org = Organization::new(
//!     GovernanceConfig::default(),
//!     Identity::new("org"),
//!     executor.clone(),
//!     Identity::new("root"),
//!     Arc::new(InMemoryHats::new()),
//!     Arc::new(ManualClock::new(0)),
//!     Arc::new(RecordingExecutor::new()),
//! )
//! .unwrap();
//!
//! let id = org
//!     .proposals()
//!     .create_proposal(&executor, ProposalDraft::new("Adopt charter", 60, 2))
//!     .unwrap();
//! org.proposals().vote(&executor, id, &[0], &[100]).unwrap();
//! ```

#![deny(unsafe_code)]

pub mod clock;
pub mod eligibility;
pub mod guard;
pub mod hat_set;
pub mod oracle;
pub mod organization;
pub mod proposals;
pub mod rate_limit;
pub mod tally;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use eligibility::{EligibilityResolver, EligibilityStore};
pub use guard::{GuardToken, ReentrancyGuard};
pub use hat_set::{wears_any, HatSet};
pub use oracle::{
    BalanceSource, CallResult, ExecutionReport, Executor, ExecutorError, HatsOracle,
    InMemoryBalances, InMemoryHats, RecordingExecutor, StandingUpdate,
};
pub use organization::Organization;
pub use proposals::{ProposalEngine, ProposalStore};
pub use rate_limit::VouchRateLimiter;
pub use tally::Winner;
pub use telemetry::init_tracing;
