//! # Protocol Configuration & Constants
//!
//! Every magic number the term protocol depends on lives here, next to the
//! [`TermConfig`] that parameterizes a single engine instance.
//!
//! The reserve band (`target_reserve`, `max_reserve`) is fixed at
//! construction. Changing it means deploying a new engine, so these values
//! are validated up front rather than on every call.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Fixed-point scale for share prices. A price of `PRICE_SCALE` means one
/// share is worth exactly one unit of the base asset.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Ledger Id Layout
// ---------------------------------------------------------------------------

/// Bit position of the yield flag in a packed ledger id.
pub const YIELD_FLAG_BIT: u32 = 127;

/// Bit offset of the start timestamp in a packed ledger id.
pub const START_SHIFT: u32 = 64;

/// Mask selecting the maturity timestamp (low 64 bits) of a packed ledger id.
pub const MATURITY_MASK: u128 = u64::MAX as u128;

/// Mask selecting the start timestamp bits once shifted down. The yield flag
/// takes the top bit, so only 63 bits of start are representable.
pub const START_MASK: u128 = (1u128 << (YIELD_FLAG_BIT - START_SHIFT)) - 1;

// ---------------------------------------------------------------------------
// Engine Defaults
// ---------------------------------------------------------------------------

/// Ledger account that holds the engine's idle underlying when none is
/// configured explicitly.
pub const DEFAULT_ENGINE_ACCOUNT: &str = "term";

/// Default log directives for binaries and tests embedding the engine.
pub const DEFAULT_LOG_DIRECTIVES: &str = "term_contracts=info,term_protocol=info";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a [`TermConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The rebalancing target sits above the sweep ceiling.
    #[error("target reserve {target} exceeds max reserve {max}")]
    TargetAboveMax {
        /// Configured target reserve.
        target: Amount,
        /// Configured max reserve.
        max: Amount,
    },

    /// The engine needs a ledger account to hold its idle underlying.
    #[error("engine account must not be empty")]
    EmptyAccount,

    /// The config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid JSON for [`TermConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// TermConfig
// ---------------------------------------------------------------------------

/// Construction parameters for a term engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermConfig {
    /// Ledger account holding the engine's idle underlying.
    #[serde(default = "default_account")]
    pub account: String,

    /// Reserve level restored after a deposit pushes the reserve over
    /// `max_reserve`.
    pub target_reserve: Amount,

    /// Ceiling above which idle underlying is swept into the vault.
    pub max_reserve: Amount,
}

fn default_account() -> String {
    DEFAULT_ENGINE_ACCOUNT.to_string()
}

impl TermConfig {
    /// Creates a config with an explicit reserve band and the default
    /// engine account.
    pub fn new(target_reserve: Amount, max_reserve: Amount) -> Self {
        Self {
            account: default_account(),
            target_reserve,
            max_reserve,
        }
    }

    /// Creates a config whose target sits at half of `max_reserve`.
    pub fn from_max_reserve(max_reserve: Amount) -> Self {
        Self::new(max_reserve / 2, max_reserve)
    }

    /// Overrides the engine's custody account.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    /// Checks the reserve band and account.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TargetAboveMax`] if `target_reserve > max_reserve`
    /// and [`ConfigError::EmptyAccount`] if the account is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_reserve > self.max_reserve {
            return Err(ConfigError::TargetAboveMax {
                target: self.target_reserve,
                max: self.max_reserve,
            });
        }
        if self.account.trim().is_empty() {
            return Err(ConfigError::EmptyAccount);
        }
        Ok(())
    }

    /// Parses and validates a JSON config.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: TermConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_max_reserve_halves_target() {
        let config = TermConfig::from_max_reserve(50_000);
        assert_eq!(config.target_reserve, 25_000);
        assert_eq!(config.max_reserve, 50_000);
        assert_eq!(config.account, DEFAULT_ENGINE_ACCOUNT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn target_above_max_rejected() {
        let err = TermConfig::new(60_000, 50_000).validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TargetAboveMax {
                target: 60_000,
                max: 50_000
            }
        ));
    }

    #[test]
    fn equal_target_and_max_allowed() {
        assert!(TermConfig::new(10, 10).validate().is_ok());
    }

    #[test]
    fn blank_account_rejected() {
        let err = TermConfig::new(1, 2)
            .with_account("  ")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyAccount));
    }

    #[test]
    fn json_without_account_uses_default() {
        let config =
            TermConfig::from_json_str(r#"{"target_reserve": 100, "max_reserve": 400}"#).unwrap();
        assert_eq!(config.account, "term");
        assert_eq!(config.target_reserve, 100);
    }

    #[test]
    fn json_with_bad_band_rejected() {
        let result = TermConfig::from_json_str(r#"{"target_reserve": 500, "max_reserve": 400}"#);
        assert!(matches!(result, Err(ConfigError::TargetAboveMax { .. })));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("term.json");
        std::fs::write(
            &path,
            r#"{"account": "pool-a", "target_reserve": 25000, "max_reserve": 50000}"#,
        )
        .unwrap();
        let config = TermConfig::from_file(&path).unwrap();
        assert_eq!(config, TermConfig::new(25_000, 50_000).with_account("pool-a"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = TermConfig::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let result = TermConfig::from_json_str("{not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn id_layout_masks_do_not_overlap() {
        assert_eq!((START_MASK << START_SHIFT) & MATURITY_MASK, 0);
        assert_eq!((START_MASK << START_SHIFT) & (1u128 << YIELD_FLAG_BIT), 0);
    }
}
