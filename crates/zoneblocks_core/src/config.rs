//! Engine configuration.
//!
//! # Responsibility
//! - Carry tunables of the ordering engine: renormalization epsilon, conflict
//!   retry bound, and optional zone budget overrides.
//!
//! # Invariants
//! - Every field has a default, so an empty JSON object is a valid config.
//! - Budget classification thresholds are not configurable.

use crate::model::block::Zone;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Smallest gap between adjacent positions before a zone is renormalized.
pub const DEFAULT_RENORMALIZE_EPSILON: f64 = 1e-9;

/// Attempts a move makes against concurrent writers before giving up.
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Tunables for `BlockService`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub renormalize_epsilon: f64,
    pub max_conflict_retries: u32,
    /// Token budget overrides applied on top of the seeded defaults.
    pub budgets: BTreeMap<Zone, u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            renormalize_epsilon: DEFAULT_RENORMALIZE_EPSILON,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
            budgets: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.renormalize_epsilon.is_finite() || self.renormalize_epsilon <= 0.0 {
            return Err(ConfigError::InvalidEpsilon(self.renormalize_epsilon));
        }
        if self.max_conflict_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(())
    }
}

/// Errors from config parsing and validation.
#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_json::Error),
    InvalidEpsilon(f64),
    ZeroRetries,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "invalid engine config: {err}"),
            Self::InvalidEpsilon(value) => write!(
                f,
                "renormalize_epsilon must be finite and positive, got {value}"
            ),
            Self::ZeroRetries => write!(f, "max_conflict_retries must be at least 1"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}
