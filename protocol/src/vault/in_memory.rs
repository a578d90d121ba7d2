//! # In-Memory Vault
//!
//! ERC-4626 share math over two counters: assets held and shares issued.
//! An empty vault prices shares 1:1. Deposits and redemptions round down;
//! the withdraw quote rounds up so the caller never receives less than asked.
//!
//! The vault doesn't track individual holders. Whoever calls `redeem` is
//! trusted to own the shares, which is how the engine uses it: the engine
//! knows exactly how many shares it holds and never asks for more.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{VaultAdapter, VaultError};
use crate::math::{self, mul_div_down, mul_div_up};
use crate::Amount;

/// A self-contained yield-bearing vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryVault {
    /// Base asset held, including accrued interest.
    total_assets: Amount,
    /// Shares issued to depositors.
    total_shares: Amount,
}

impl InMemoryVault {
    /// Creates an empty vault. The first deposit is priced 1:1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a vault already holding `total_assets` against
    /// `total_shares`. `with_state(10_000, 9_000)` quotes 0.9 shares per unit.
    pub fn with_state(total_assets: Amount, total_shares: Amount) -> Self {
        Self {
            total_assets,
            total_shares,
        }
    }

    /// Adds interest. Every outstanding share becomes worth more.
    pub fn accrue(&mut self, interest: Amount) -> Result<(), VaultError> {
        self.total_assets = math::add(self.total_assets, interest)?;
        debug!(interest, total_assets = self.total_assets, "vault accrued");
        Ok(())
    }

    /// Removes assets without burning shares, lowering the exchange rate.
    pub fn slash(&mut self, loss: Amount) {
        self.total_assets = self.total_assets.saturating_sub(loss);
        debug!(loss, total_assets = self.total_assets, "vault slashed");
    }
}

impl VaultAdapter for InMemoryVault {
    fn deposit(&mut self, assets: Amount) -> Result<Amount, VaultError> {
        let shares = self.preview_deposit(assets)?;
        self.total_assets = math::add(self.total_assets, assets)?;
        self.total_shares = math::add(self.total_shares, shares)?;
        Ok(shares)
    }

    fn redeem(&mut self, shares: Amount) -> Result<Amount, VaultError> {
        if shares > self.total_shares {
            return Err(VaultError::InsufficientShares {
                outstanding: self.total_shares,
                requested: shares,
            });
        }
        let assets = self.preview_redeem(shares)?;
        if assets > self.total_assets {
            return Err(VaultError::InsufficientAssets {
                held: self.total_assets,
                owed: assets,
            });
        }
        self.total_shares -= shares;
        self.total_assets -= assets;
        Ok(assets)
    }

    fn preview_deposit(&self, assets: Amount) -> Result<Amount, VaultError> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        Ok(mul_div_down(assets, self.total_shares, self.total_assets)?)
    }

    fn preview_redeem(&self, shares: Amount) -> Result<Amount, VaultError> {
        if self.total_shares == 0 {
            return Ok(shares);
        }
        Ok(mul_div_down(shares, self.total_assets, self.total_shares)?)
    }

    fn preview_withdraw(&self, assets: Amount) -> Result<Amount, VaultError> {
        if self.total_shares == 0 {
            return Ok(assets);
        }
        Ok(mul_div_up(assets, self.total_shares, self.total_assets)?)
    }

    fn total_assets(&self) -> Amount {
        self.total_assets
    }

    fn total_shares(&self) -> Amount {
        self.total_shares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10k assets against 9k shares: 0.9 shares per unit.
    fn discounted() -> InMemoryVault {
        InMemoryVault::with_state(10_000, 9_000)
    }

    #[test]
    fn empty_vault_is_one_to_one() {
        let mut vault = InMemoryVault::new();
        assert_eq!(vault.deposit(1_000).unwrap(), 1_000);
        assert_eq!(vault.total_assets(), 1_000);
        assert_eq!(vault.total_shares(), 1_000);
    }

    #[test]
    fn seeded_price_quotes_point_nine() {
        let vault = discounted();
        assert_eq!(vault.preview_deposit(1_000).unwrap(), 900);
        assert_eq!(vault.preview_redeem(900).unwrap(), 1_000);
        assert_eq!(vault.preview_deposit(75_000).unwrap(), 67_500);
    }

    #[test]
    fn deposit_then_redeem_returns_assets() {
        let mut vault = discounted();
        let shares = vault.deposit(1_000).unwrap();
        assert_eq!(shares, 900);
        assert_eq!(vault.redeem(shares).unwrap(), 1_000);
        assert_eq!(vault, discounted());
    }

    #[test]
    fn withdraw_quote_rounds_up() {
        let vault = InMemoryVault::with_state(3, 2);
        // 1 asset needs 2/3 share: the quote must cover it.
        assert_eq!(vault.preview_withdraw(1).unwrap(), 1);
        assert_eq!(vault.preview_deposit(1).unwrap(), 0);
        let shares = vault.preview_withdraw(2).unwrap();
        assert!(vault.preview_redeem(shares).unwrap() >= 2);
    }

    #[test]
    fn accrual_raises_redemption_value() {
        let mut vault = InMemoryVault::new();
        vault.deposit(1_000).unwrap();
        vault.accrue(100).unwrap();
        assert_eq!(vault.preview_redeem(1_000).unwrap(), 1_100);
        assert_eq!(vault.preview_deposit(1_100).unwrap(), 1_000);
    }

    #[test]
    fn slash_lowers_redemption_value() {
        let mut vault = InMemoryVault::new();
        vault.deposit(1_000).unwrap();
        vault.slash(200);
        assert_eq!(vault.preview_redeem(500).unwrap(), 400);
    }

    #[test]
    fn over_redeem_rejected() {
        let mut vault = discounted();
        let err = vault.redeem(9_001).unwrap_err();
        assert_eq!(
            err,
            VaultError::InsufficientShares {
                outstanding: 9_000,
                requested: 9_001
            }
        );
    }

    #[test]
    fn deposit_into_wiped_vault_fails() {
        let mut vault = InMemoryVault::with_state(0, 10);
        assert!(matches!(vault.deposit(5), Err(VaultError::Math(_))));
    }
}
