//! Engine configuration with TOML support.

use cpt_types::{AccountRef, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables of the challenge engine.
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long to wait for a fee transaction to confirm.
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,

    /// Upper bound on a single fee submission, transfer or balance query.
    #[serde(default = "default_transfer_timeout_ms")]
    pub transfer_timeout_ms: u64,

    /// Distinct reporters needed to remove a challenge.
    #[serde(default = "default_report_threshold")]
    pub report_threshold: u32,

    /// Share of the reward pool paid to the top tally group, in basis
    /// points. The rest goes to the next group.
    #[serde(default = "default_winner_share_bps")]
    pub winner_share_bps: u32,

    /// Protocol cut of collected entry fees, in basis points.
    #[serde(default = "default_protocol_fee_bps")]
    pub protocol_fee_bps: u32,

    /// Ledger account receiving the protocol cut.
    #[serde(default = "default_protocol_treasury")]
    pub protocol_treasury: AccountRef,

    /// Voter payouts in flight at once during distribution.
    #[serde(default = "default_distribution_concurrency")]
    pub distribution_concurrency: usize,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_confirm_timeout_ms() -> u64 {
    30_000
}

fn default_transfer_timeout_ms() -> u64 {
    10_000
}

fn default_report_threshold() -> u32 {
    10
}

fn default_winner_share_bps() -> u32 {
    7_500
}

fn default_protocol_fee_bps() -> u32 {
    500
}

fn default_protocol_treasury() -> AccountRef {
    AccountRef::new("treasury/protocol")
}

fn default_distribution_concurrency() -> usize {
    8
}

// ── Impl ───────────────────────────────────────────────────────────────

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.winner_share_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "winner_share_bps {} exceeds {BPS_DENOMINATOR}",
                self.winner_share_bps
            )));
        }
        if self.protocol_fee_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "protocol_fee_bps {} exceeds {BPS_DENOMINATOR}",
                self.protocol_fee_bps
            )));
        }
        if self.report_threshold == 0 {
            return Err(ConfigError::Invalid("report_threshold must be at least 1".into()));
        }
        if self.distribution_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "distribution_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_ms: default_confirm_timeout_ms(),
            transfer_timeout_ms: default_transfer_timeout_ms(),
            report_threshold: default_report_threshold(),
            winner_share_bps: default_winner_share_bps(),
            protocol_fee_bps: default_protocol_fee_bps(),
            protocol_treasury: default_protocol_treasury(),
            distribution_concurrency: default_distribution_concurrency(),
        }
    }
}
