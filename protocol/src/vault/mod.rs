//! # Vault Module — Yield-Bearing Vault Interface
//!
//! The term engine parks idle base asset in an external yield-bearing vault
//! and holds vault shares in exchange. This module defines the interface the
//! engine calls and ships an in-memory ERC-4626-style vault.
//!
//! ```text
//! mod.rs        — VaultAdapter trait and VaultError
//! in_memory.rs  — InMemoryVault: share math, interest accrual, slashing
//! ```
//!
//! ## Exchange Rate
//!
//! The rate is a pure function of vault state at call time. It usually only
//! grows (interest), but callers must not assume that: a vault may lose
//! assets, and every quote can move between two calls.

pub mod in_memory;

use thiserror::Error;

use crate::math::MathError;
use crate::Amount;

pub use in_memory::InMemoryVault;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Tried to redeem more shares than the vault has issued.
    #[error("insufficient vault shares: outstanding {outstanding}, requested {requested}")]
    InsufficientShares {
        /// Shares currently issued by the vault.
        outstanding: Amount,
        /// Shares the caller tried to redeem.
        requested: Amount,
    },

    /// The vault cannot pay out the assets a redemption is worth.
    #[error("insufficient vault assets: holds {held}, owes {owed}")]
    InsufficientAssets {
        /// Assets the vault holds.
        held: Amount,
        /// Assets the redemption is worth.
        owed: Amount,
    },

    /// Share math failed.
    #[error("vault math error: {0}")]
    Math(#[from] MathError),
}

// ---------------------------------------------------------------------------
// VaultAdapter
// ---------------------------------------------------------------------------

/// Deposit/redeem/quote interface of a yield-bearing vault.
pub trait VaultAdapter {
    /// Deposits `assets` of base asset and returns the shares issued.
    fn deposit(&mut self, assets: Amount) -> Result<Amount, VaultError>;

    /// Redeems `shares` and returns the base asset paid out.
    fn redeem(&mut self, shares: Amount) -> Result<Amount, VaultError>;

    /// Shares a deposit of `assets` would issue right now. Rounds down.
    fn preview_deposit(&self, assets: Amount) -> Result<Amount, VaultError>;

    /// Base asset a redemption of `shares` would pay right now. Rounds down.
    fn preview_redeem(&self, shares: Amount) -> Result<Amount, VaultError>;

    /// Shares that must be redeemed to receive at least `assets`. Rounds up.
    fn preview_withdraw(&self, assets: Amount) -> Result<Amount, VaultError>;

    /// Base asset currently held by the vault.
    fn total_assets(&self) -> Amount;

    /// Vault shares currently outstanding.
    fn total_shares(&self) -> Amount;
}
