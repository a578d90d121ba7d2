//! # Reserve State
//!
//! The unlocked family is backed by two pools: idle underlying held by the
//! engine and vault shares the engine has swept into the vault. This module
//! owns both counters plus the rules for drawing value out of them and for
//! sweeping the idle pool down when it grows past the ceiling.
//!
//! Locked families never touch this state. Their backing is tracked per
//! maturity by the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use term_protocol::math::{self, MathError};
use term_protocol::{Amount, TermConfig, VaultAdapter, VaultError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while drawing value out of the reserve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReserveError {
    /// The vault-share reserve can't cover the shortfall.
    #[error("reserve shortfall: needs {requested} vault shares, holds {available}")]
    Shortfall {
        /// Vault shares needed to cover the shortfall.
        requested: Amount,
        /// Vault shares held in reserve.
        available: Amount,
    },

    /// A vault quote failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Reserve arithmetic failed.
    #[error(transparent)]
    Math(#[from] MathError),
}

// ---------------------------------------------------------------------------
// Holdings
// ---------------------------------------------------------------------------

/// Value lifted out of a family's backing and not yet paid or re-deposited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Holdings {
    /// Idle underlying.
    pub underlying: Amount,
    /// Vault shares.
    pub vault_shares: Amount,
}

impl Holdings {
    /// Holdings made only of underlying.
    pub fn underlying(amount: Amount) -> Self {
        Self {
            underlying: amount,
            vault_shares: 0,
        }
    }

    /// Holdings made only of vault shares.
    pub fn vault_shares(shares: Amount) -> Self {
        Self {
            underlying: 0,
            vault_shares: shares,
        }
    }
}

// ---------------------------------------------------------------------------
// ReserveBand
// ---------------------------------------------------------------------------

/// The target/max band controlling when idle underlying is swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveBand {
    /// Level restored by a sweep.
    pub target: Amount,
    /// Ceiling that triggers a sweep.
    pub max: Amount,
}

impl ReserveBand {
    /// Underlying to sweep into the vault, if `underlying` sits above the ceiling.
    pub fn excess(&self, underlying: Amount) -> Option<Amount> {
        (underlying > self.max).then(|| underlying - self.target)
    }
}

impl From<&TermConfig> for ReserveBand {
    fn from(config: &TermConfig) -> Self {
        Self {
            target: config.target_reserve,
            max: config.max_reserve,
        }
    }
}

// ---------------------------------------------------------------------------
// ReserveState
// ---------------------------------------------------------------------------

/// Backing of the unlocked family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    /// Idle underlying held by the engine.
    pub underlying_reserve: Amount,
    /// Vault shares held by the engine for the unlocked family.
    pub vault_share_reserve: Amount,
}

impl ReserveState {
    /// Idle underlying plus the current redemption value of the vault shares.
    pub fn total_value<V: VaultAdapter>(&self, vault: &V) -> Result<Amount, ReserveError> {
        let in_vault = vault.preview_redeem(self.vault_share_reserve)?;
        Ok(math::add(self.underlying_reserve, in_vault)?)
    }

    /// Adds lifted holdings back to the reserve.
    pub fn absorb(&mut self, holdings: Holdings) -> Result<(), ReserveError> {
        self.underlying_reserve = math::add(self.underlying_reserve, holdings.underlying)?;
        self.vault_share_reserve = math::add(self.vault_share_reserve, holdings.vault_shares)?;
        Ok(())
    }

    /// Lifts `due` worth of underlying out of the reserve.
    ///
    /// Idle underlying is used first. Any shortfall is covered by vault
    /// shares sized with the vault's round-up withdraw quote, so redeeming
    /// them yields at least the shortfall. Nothing changes on error.
    pub fn draw<V: VaultAdapter>(
        &mut self,
        due: Amount,
        vault: &V,
    ) -> Result<Holdings, ReserveError> {
        if due <= self.underlying_reserve {
            self.underlying_reserve -= due;
            return Ok(Holdings::underlying(due));
        }

        let shortfall = due - self.underlying_reserve;
        let shares = vault.preview_withdraw(shortfall)?;
        if shares > self.vault_share_reserve {
            return Err(ReserveError::Shortfall {
                requested: shares,
                available: self.vault_share_reserve,
            });
        }

        let holdings = Holdings {
            underlying: self.underlying_reserve,
            vault_shares: shares,
        };
        self.underlying_reserve = 0;
        self.vault_share_reserve -= shares;
        Ok(holdings)
    }
}
