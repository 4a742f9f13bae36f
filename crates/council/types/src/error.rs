//! Council error types

use crate::{HatId, Identity, ProposalId, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the pure tally math
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TallyError {
    #[error("length mismatch: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("option index {index} out of range for {option_count} options")]
    InvalidIndex { index: usize, option_count: usize },

    #[error("weight {0} exceeds 100")]
    InvalidWeight(u8),

    #[error("duplicate option index: {0}")]
    DuplicateIndex(usize),

    #[error("weights sum to {0}, expected 100")]
    WeightSumNot100(u32),

    #[error("class slice {0} outside 1..=100")]
    InvalidSlice(u8),

    #[error("class slices sum to {0}, expected 100")]
    SliceSumNot100(u32),

    #[error("no voting classes configured")]
    NoClasses,

    #[error("arithmetic overflow")]
    Overflow,
}

/// Coarse classification of a failure, so callers can branch without
/// matching every variant
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    Rate,
    Arithmetic,
    Execution,
    Config,
}

impl ErrorKind {
    /// Only rate limits clear up on their own with time
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Rate)
    }
}

/// Errors from the proposal and eligibility engines
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("tally error: {0}")]
    Tally(#[from] TallyError),

    #[error("invalid title length {len}, expected 1..={max}")]
    InvalidTitle { len: usize, max: usize },

    #[error("invalid option count {count}, expected 1..={max}")]
    InvalidOptionCount { count: usize, max: usize },

    #[error("invalid duration {minutes}min, expected {min}..={max}")]
    InvalidDuration { minutes: u64, min: u64, max: u64 },

    #[error("batch holds {count} calls, limit is {max}")]
    TooManyCalls { count: usize, max: usize },

    #[error("array length mismatch: expected {expected}, got {actual}")]
    ArrayLengthMismatch { expected: usize, actual: usize },

    #[error("invalid quorum: {0}")]
    InvalidQuorum(u32),

    #[error("call target not allowed: {0}")]
    TargetNotAllowed(Identity),

    #[error("call target is the proposal engine itself")]
    TargetSelf,

    #[error("{caller} is not authorized to {action}")]
    Unauthorized { caller: Identity, action: String },

    #[error("{0} does not wear a hat allowed on this proposal")]
    RoleNotAllowed(Identity),

    #[error("{0} has no voting power in any class")]
    NoVotingPower(Identity),

    #[error("cannot vouch for yourself")]
    CannotVouchForSelf,

    #[error("{caller} is not authorized to vouch for {hat}")]
    NotAuthorizedToVouch { caller: Identity, hat: HatId },

    #[error("{caller} is neither super admin nor admin of {hat}")]
    NotHatAdmin { caller: Identity, hat: HatId },

    #[error("{0} is not the super admin")]
    NotSuperAdmin(Identity),

    #[error("proposal not found: {0}")]
    UnknownProposal(ProposalId),

    #[error("voting on proposal {0} has ended")]
    VotingExpired(ProposalId),

    #[error("voting on proposal {0} is still open")]
    VotingOpen(ProposalId),

    #[error("proposal {0} is already finalized")]
    AlreadyFinalized(ProposalId),

    #[error("{voter} already voted on proposal {proposal}")]
    AlreadyVoted { proposal: ProposalId, voter: Identity },

    #[error("vouching is not enabled for {0}")]
    VouchingNotEnabled(HatId),

    #[error("{voucher} already vouched for {wearer} on {hat}")]
    AlreadyVouched {
        hat: HatId,
        wearer: Identity,
        voucher: Identity,
    },

    #[error("{voucher} has no vouch for {wearer} on {hat}")]
    NoVouchToRevoke {
        hat: HatId,
        wearer: Identity,
        voucher: Identity,
    },

    #[error("{wearer} is not eligible for {hat}")]
    NotEligible { wearer: Identity, hat: HatId },

    #[error("{wearer} already wears {hat}")]
    AlreadyWearingHat { wearer: Identity, hat: HatId },

    #[error("join time already recorded for {0}")]
    JoinTimeAlreadySet(Identity),

    #[error("re-entrant call rejected")]
    Reentrant,

    #[error("{voucher} reached the limit of {limit} vouches for day {day}")]
    VouchingRateLimitExceeded {
        voucher: Identity,
        day: u64,
        limit: u32,
    },

    #[error("{voucher} may not vouch before {allowed_at}")]
    NewUserVouchingRestricted {
        voucher: Identity,
        allowed_at: Timestamp,
    },

    #[error("execution of proposal {proposal} failed: {reason}")]
    ExecutionFailed { proposal: ProposalId, reason: String },

    #[error("role oracle rejected {0}")]
    OracleRejected(String),

    #[error("token-weighted class configured without a balance source")]
    MissingBalanceSource,

    #[error("config error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl GovernanceError {
    pub fn unauthorized(caller: &Identity, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            caller: caller.clone(),
            action: action.into(),
        }
    }

    /// Map this error onto the taxonomy callers branch on
    pub fn kind(&self) -> ErrorKind {
        use GovernanceError::*;
        match self {
            Tally(TallyError::Overflow)
            | Tally(TallyError::InvalidSlice(_))
            | Tally(TallyError::SliceSumNot100(_))
            | Tally(TallyError::NoClasses) => ErrorKind::Arithmetic,
            Tally(_)
            | InvalidTitle { .. }
            | InvalidOptionCount { .. }
            | InvalidDuration { .. }
            | TooManyCalls { .. }
            | ArrayLengthMismatch { .. }
            | InvalidQuorum(_)
            | TargetNotAllowed(_)
            | TargetSelf => ErrorKind::Validation,
            Unauthorized { .. }
            | RoleNotAllowed(_)
            | NoVotingPower(_)
            | CannotVouchForSelf
            | NotAuthorizedToVouch { .. }
            | NotHatAdmin { .. }
            | NotSuperAdmin(_) => ErrorKind::Authorization,
            UnknownProposal(_)
            | VotingExpired(_)
            | VotingOpen(_)
            | AlreadyFinalized(_)
            | AlreadyVoted { .. }
            | VouchingNotEnabled(_)
            | AlreadyVouched { .. }
            | NoVouchToRevoke { .. }
            | NotEligible { .. }
            | AlreadyWearingHat { .. }
            | JoinTimeAlreadySet(_)
            | Reentrant => ErrorKind::State,
            VouchingRateLimitExceeded { .. } | NewUserVouchingRestricted { .. } => ErrorKind::Rate,
            ExecutionFailed { .. } | OracleRejected(_) => ErrorKind::Execution,
            MissingBalanceSource | Config(_) | Snapshot(_) => ErrorKind::Config,
        }
    }
}

/// Result type for council operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Result type for the tally math
pub type TallyResult<T> = Result<T, TallyError>;
