//! Configuration for a council organization

use crate::{GovernanceError, GovernanceResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound on options the tally bitset is sized for
pub const MAX_SUPPORTED_OPTIONS: usize = 255;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Proposal creation limits
    #[serde(default)]
    pub proposals: ProposalLimits,

    /// Vouch issuance limits
    #[serde(default)]
    pub vouching: VouchingLimits,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Proposal creation limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalLimits {
    #[serde(default = "default_max_options")]
    pub max_options: usize,

    /// Maximum title length in bytes
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,

    #[serde(default = "default_min_duration")]
    pub min_duration_minutes: u64,

    #[serde(default = "default_max_duration")]
    pub max_duration_minutes: u64,

    #[serde(default = "default_max_calls")]
    pub max_calls_per_batch: usize,

    /// Quorum percent a new engine starts with
    #[serde(default = "default_quorum")]
    pub default_quorum_percent: u8,
}

impl Default for ProposalLimits {
    fn default() -> Self {
        Self {
            max_options: default_max_options(),
            max_title_len: default_max_title_len(),
            min_duration_minutes: default_min_duration(),
            max_duration_minutes: default_max_duration(),
            max_calls_per_batch: default_max_calls(),
            default_quorum_percent: default_quorum(),
        }
    }
}

/// Vouch issuance limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VouchingLimits {
    /// Vouches one identity may issue per day index
    #[serde(default = "default_max_daily_vouches")]
    pub max_daily_vouches: u32,

    #[serde(default = "default_seconds_per_day")]
    pub seconds_per_day: u64,

    /// Minimum tenure before an identity may vouch; 0 disables the check
    #[serde(default)]
    pub new_user_restriction_days: u64,
}

impl Default for VouchingLimits {
    fn default() -> Self {
        Self {
            max_daily_vouches: default_max_daily_vouches(),
            seconds_per_day: default_seconds_per_day(),
            new_user_restriction_days: 0,
        }
    }
}

impl VouchingLimits {
    pub fn new_user_restriction_secs(&self) -> u64 {
        self.new_user_restriction_days
            .saturating_mul(self.seconds_per_day)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_options() -> usize {
    50
}

fn default_max_title_len() -> usize {
    512
}

fn default_min_duration() -> u64 {
    10
}

fn default_max_duration() -> u64 {
    43_200
}

fn default_max_calls() -> usize {
    20
}

fn default_quorum() -> u8 {
    50
}

fn default_max_daily_vouches() -> u32 {
    3
}

fn default_seconds_per_day() -> u64 {
    86_400
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GovernanceConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> GovernanceResult<Self> {
        let config: GovernanceConfig =
            toml::from_str(contents).map_err(|e| GovernanceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, falling back to defaults when the
    /// file does not exist
    pub fn load(path: Option<&Path>) -> GovernanceResult<Self> {
        match path {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p)
                    .map_err(|e| GovernanceError::Config(format!("{}: {}", p.display(), e)))?;
                Self::from_toml_str(&contents)
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> GovernanceResult<()> {
        let p = &self.proposals;
        if p.max_options == 0 || p.max_options > MAX_SUPPORTED_OPTIONS {
            return Err(GovernanceError::Config(format!(
                "max_options must be within 1..={MAX_SUPPORTED_OPTIONS}, got {}",
                p.max_options
            )));
        }
        if p.max_title_len == 0 {
            return Err(GovernanceError::Config("max_title_len must be non-zero".into()));
        }
        if p.min_duration_minutes == 0 || p.min_duration_minutes > p.max_duration_minutes {
            return Err(GovernanceError::Config(format!(
                "invalid duration window {}..={}",
                p.min_duration_minutes, p.max_duration_minutes
            )));
        }
        if p.max_calls_per_batch == 0 {
            return Err(GovernanceError::Config(
                "max_calls_per_batch must be non-zero".into(),
            ));
        }
        if p.default_quorum_percent == 0 || p.default_quorum_percent > 100 {
            return Err(GovernanceError::Config(format!(
                "default_quorum_percent must be within 1..=100, got {}",
                p.default_quorum_percent
            )));
        }

        let v = &self.vouching;
        if v.max_daily_vouches == 0 {
            return Err(GovernanceError::Config(
                "max_daily_vouches must be non-zero".into(),
            ));
        }
        if v.seconds_per_day == 0 {
            return Err(GovernanceError::Config("seconds_per_day must be non-zero".into()));
        }
        Ok(())
    }
}
