//! # Multi-Token Ledger
//!
//! In-memory [`ShareLedger`]: per-id balances, per-id total supply, per-token
//! allowances and approval-for-all. The whole struct derives `Clone` and
//! serde so callers can snapshot it (the engine does, to roll back a failed
//! call) or persist it as JSON.
//!
//! ## Supply Tracking
//!
//! Total supply and per-address balances are updated together. Overflow is
//! checked on every mint, and a burn is rejected before anything changes.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{LedgerError, ShareLedger};
use crate::asset::TokenId;
use crate::Amount;

/// Per-owner, per-operator, per-token allowances.
type AllowanceBook = HashMap<String, HashMap<String, HashMap<TokenId, Amount>>>;

/// The in-memory multi-token ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiTokenLedger {
    /// `id -> (owner -> balance)`.
    balances: HashMap<TokenId, HashMap<String, Amount>>,
    /// `id -> total supply`.
    supply: HashMap<TokenId, Amount>,
    /// `owner -> operator -> id -> allowance`.
    allowances: AllowanceBook,
    /// `owner -> operators approved for every id`.
    operators: HashMap<String, HashSet<String>>,
}

impl MultiTokenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct ids that have ever been minted.
    pub fn id_count(&self) -> usize {
        self.supply.len()
    }

    /// Checks that `operator` may move `amount` of `id` for `owner` and
    /// returns the allowance to write back, if any.
    fn spend_allowance(
        &self,
        id: TokenId,
        operator: &str,
        owner: &str,
        amount: Amount,
    ) -> Result<Option<Amount>, LedgerError> {
        if operator == owner || self.is_approved_for_all(owner, operator) {
            return Ok(None);
        }
        let allowance = self.allowance(id, owner, operator);
        if allowance == Amount::MAX {
            return Ok(None);
        }
        if allowance < amount {
            return Err(LedgerError::InsufficientAllowance {
                id,
                allowance,
                amount,
            });
        }
        Ok(Some(allowance - amount))
    }
}

impl ShareLedger for MultiTokenLedger {
    fn mint(&mut self, id: TokenId, to: &str, amount: Amount) -> Result<(), LedgerError> {
        let supply = self.supply.get(&id).copied().unwrap_or(0);
        let new_supply = supply
            .checked_add(amount)
            .ok_or(LedgerError::SupplyOverflow { id, amount })?;

        // A balance can't exceed supply, so this add is covered by the check above.
        let balance = self
            .balances
            .entry(id)
            .or_default()
            .entry(to.to_string())
            .or_insert(0);
        *balance += amount;
        self.supply.insert(id, new_supply);

        trace!(id = %id, to, amount, "mint");
        Ok(())
    }

    fn burn(&mut self, id: TokenId, from: &str, amount: Amount) -> Result<(), LedgerError> {
        let balance = self.balance_of(id, from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                id,
                balance,
                amount,
            });
        }
        if amount == 0 {
            return Ok(());
        }

        if let Some(held) = self.balances.get_mut(&id).and_then(|b| b.get_mut(from)) {
            *held -= amount;
        }
        if let Some(supply) = self.supply.get_mut(&id) {
            *supply = supply.saturating_sub(amount);
        }

        trace!(id = %id, from, amount, "burn");
        Ok(())
    }

    fn transfer_from(
        &mut self,
        id: TokenId,
        operator: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let remaining = self.spend_allowance(id, operator, from, amount)?;

        let balance = self.balance_of(id, from);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                id,
                balance,
                amount,
            });
        }

        if let Some(remaining) = remaining {
            self.set_approval(id, from, operator, remaining);
        }
        if amount == 0 || from == to {
            return Ok(());
        }

        let book = self.balances.entry(id).or_default();
        if let Some(held) = book.get_mut(from) {
            *held -= amount;
        }
        // Total supply bounds every balance, so the receiver can't overflow.
        *book.entry(to.to_string()).or_insert(0) += amount;

        trace!(id = %id, operator, from, to, amount, "transfer");
        Ok(())
    }

    fn balance_of(&self, id: TokenId, owner: &str) -> Amount {
        self.balances
            .get(&id)
            .and_then(|b| b.get(owner))
            .copied()
            .unwrap_or(0)
    }

    fn total_supply(&self, id: TokenId) -> Amount {
        self.supply.get(&id).copied().unwrap_or(0)
    }

    fn allowance(&self, id: TokenId, owner: &str, operator: &str) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|ops| ops.get(operator))
            .and_then(|ids| ids.get(&id))
            .copied()
            .unwrap_or(0)
    }

    fn set_approval(&mut self, id: TokenId, owner: &str, operator: &str, amount: Amount) {
        self.allowances
            .entry(owner.to_string())
            .or_default()
            .entry(operator.to_string())
            .or_default()
            .insert(id, amount);
    }

    fn set_approval_for_all(&mut self, owner: &str, operator: &str, approved: bool) {
        let ops = self.operators.entry(owner.to_string()).or_default();
        if approved {
            ops.insert(operator.to_string());
        } else {
            ops.remove(operator);
        }
    }

    fn is_approved_for_all(&self, owner: &str, operator: &str) -> bool {
        self.operators
            .get(owner)
            .is_some_and(|ops| ops.contains(operator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetId;

    const TEN: Amount = 10_000_000_000;
    const FIVE: Amount = 5_000_000_000;

    fn token1() -> TokenId {
        AssetId::Locked(1_000).token_id()
    }

    fn token2() -> TokenId {
        TokenId::UNLOCKED
    }

    fn funded() -> MultiTokenLedger {
        let mut ledger = MultiTokenLedger::new();
        ledger.mint(token1(), "alice", TEN).unwrap();
        ledger.mint(token2(), "alice", FIVE).unwrap();
        ledger
    }

    #[test]
    fn mint_increases_supply_and_balance() {
        let ledger = funded();
        assert_eq!(ledger.total_supply(token1()), TEN);
        assert_eq!(ledger.balance_of(token1(), "alice"), TEN);
        assert_eq!(ledger.id_count(), 2);
    }

    #[test]
    fn mint_overflow_rejected() {
        let mut ledger = funded();
        let result = ledger.mint(token1(), "bob", Amount::MAX);
        assert!(matches!(result, Err(LedgerError::SupplyOverflow { .. })));
        assert_eq!(ledger.balance_of(token1(), "bob"), 0);
    }

    #[test]
    fn burn_decreases_supply_and_balance() {
        let mut ledger = funded();
        ledger.burn(token1(), "alice", 4).unwrap();
        assert_eq!(ledger.total_supply(token1()), TEN - 4);
        assert_eq!(ledger.balance_of(token1(), "alice"), TEN - 4);
    }

    #[test]
    fn burn_more_than_balance_rejected() {
        let mut ledger = funded();
        let err = ledger.burn(token2(), "alice", FIVE + 1).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                id: token2(),
                balance: FIVE,
                amount: FIVE + 1
            }
        );
        assert_eq!(ledger.total_supply(token2()), FIVE);
    }

    #[test]
    fn cannot_transfer_more_than_held() {
        let mut ledger = funded();
        assert!(ledger
            .transfer_from(token1(), "alice", "alice", "bob", TEN + 1)
            .is_err());
        assert!(ledger
            .transfer_from(token2(), "alice", "alice", "bob", FIVE + 1)
            .is_err());
    }

    #[test]
    fn cannot_transfer_for_another_user() {
        let mut ledger = funded();
        let err = ledger
            .transfer_from(token1(), "bob", "alice", "bob", TEN - 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
    }

    #[test]
    fn transfers_smallest_and_largest_amounts() {
        let mut ledger = funded();
        ledger
            .transfer_from(token1(), "alice", "alice", "bob", 1)
            .unwrap();
        assert_eq!(ledger.balance_of(token1(), "alice"), TEN - 1);
        assert_eq!(ledger.balance_of(token1(), "bob"), 1);

        ledger
            .transfer_from(token1(), "alice", "alice", "bob", TEN - 1)
            .unwrap();
        assert_eq!(ledger.balance_of(token1(), "alice"), 0);
        assert_eq!(ledger.balance_of(token1(), "bob"), TEN);
        assert_eq!(ledger.total_supply(token1()), TEN);
    }

    #[test]
    fn approval_for_all_covers_every_id() {
        let mut ledger = funded();
        ledger.set_approval_for_all("alice", "bob", true);
        ledger
            .transfer_from(token1(), "bob", "alice", "bob", TEN)
            .unwrap();
        ledger
            .transfer_from(token2(), "bob", "alice", "bob", FIVE)
            .unwrap();
        assert_eq!(ledger.balance_of(token1(), "bob"), TEN);
        assert_eq!(ledger.balance_of(token2(), "bob"), FIVE);

        ledger.set_approval_for_all("alice", "bob", false);
        assert!(!ledger.is_approved_for_all("alice", "bob"));
    }

    #[test]
    fn per_token_approval_is_spent_down() {
        let mut ledger = funded();
        ledger.set_approval(token1(), "alice", "bob", FIVE);
        ledger
            .transfer_from(token1(), "bob", "alice", "bob", FIVE - 1)
            .unwrap();
        assert_eq!(ledger.allowance(token1(), "alice", "bob"), 1);

        let err = ledger
            .transfer_from(token1(), "bob", "alice", "bob", 10)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientAllowance {
                id: token1(),
                allowance: 1,
                amount: 10
            }
        );
        assert_eq!(ledger.balance_of(token1(), "bob"), FIVE - 1);
        assert_eq!(ledger.balance_of(token1(), "alice"), FIVE + 1);
    }

    #[test]
    fn max_approval_is_infinite() {
        let mut ledger = funded();
        ledger.set_approval(token1(), "alice", "bob", Amount::MAX);
        ledger
            .transfer_from(token1(), "bob", "alice", "bob", 1)
            .unwrap();
        ledger
            .transfer_from(token1(), "bob", "alice", "carol", 2)
            .unwrap();
        assert_eq!(ledger.allowance(token1(), "alice", "bob"), Amount::MAX);
    }

    #[test]
    fn failed_transfer_keeps_allowance() {
        let mut ledger = funded();
        ledger.set_approval(token1(), "alice", "bob", TEN + 5);
        assert!(ledger
            .transfer_from(token1(), "bob", "alice", "bob", TEN + 1)
            .is_err());
        assert_eq!(ledger.allowance(token1(), "alice", "bob"), TEN + 5);
    }

    #[test]
    fn unknown_ids_read_as_zero() {
        let ledger = MultiTokenLedger::new();
        assert_eq!(ledger.total_supply(token1()), 0);
        assert_eq!(ledger.balance_of(token1(), "anyone"), 0);
        assert_eq!(ledger.allowance(token1(), "a", "b"), 0);
    }

    #[test]
    fn snapshot_survives_json() {
        let mut ledger = funded();
        ledger.set_approval(token1(), "alice", "bob", 3);
        let json = serde_json::to_string(&ledger).unwrap();
        let restored: MultiTokenLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.balance_of(token2(), "alice"), FIVE);
        assert_eq!(restored.allowance(token1(), "alice", "bob"), 3);
    }
}
