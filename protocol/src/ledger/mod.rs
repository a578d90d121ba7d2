//! # Share Ledger
//!
//! The multi-asset balance ledger the term engine mints into, burns from,
//! and pulls deposits through. Every balance is keyed by a packed
//! [`TokenId`](crate::asset::TokenId), so the base asset, unlocked shares,
//! every locked maturity and every yield token share one book.
//!
//! ```text
//! mod.rs          — ShareLedger trait and LedgerError
//! multi_token.rs  — MultiTokenLedger, the in-memory implementation
//! ```
//!
//! The engine only needs mint/burn/transfer and supply queries. Approvals are
//! part of the trait because `transfer_from` with a third-party operator must
//! respect them.

pub mod multi_token;

use thiserror::Error;

use crate::asset::TokenId;
use crate::Amount;

pub use multi_token::MultiTokenLedger;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Tried to burn or move more than the holder has.
    #[error("insufficient balance of {id}: has {balance}, needs {amount}")]
    InsufficientBalance {
        /// Ledger id being debited.
        id: TokenId,
        /// Current balance of the holder.
        balance: Amount,
        /// Amount the caller tried to debit.
        amount: Amount,
    },

    /// The operator is not approved to move this much on the owner's behalf.
    #[error("insufficient allowance for {id}: approved {allowance}, needs {amount}")]
    InsufficientAllowance {
        /// Ledger id being moved.
        id: TokenId,
        /// Remaining per-token allowance.
        allowance: Amount,
        /// Amount the operator tried to move.
        amount: Amount,
    },

    /// A mint would push total supply or a balance past `Amount::MAX`.
    #[error("supply overflow: minting {amount} of {id}")]
    SupplyOverflow {
        /// Ledger id being minted.
        id: TokenId,
        /// Amount that was attempted.
        amount: Amount,
    },
}

// ---------------------------------------------------------------------------
// ShareLedger
// ---------------------------------------------------------------------------

/// Mint/burn/transfer service keyed by ledger id.
///
/// Implementations must never fail a mint below `Amount::MAX` and must fail a
/// burn that exceeds the holder's balance.
pub trait ShareLedger {
    /// Credits `amount` of `id` to `to` and grows total supply.
    fn mint(&mut self, id: TokenId, to: &str, amount: Amount) -> Result<(), LedgerError>;

    /// Debits `amount` of `id` from `from` and shrinks total supply.
    fn burn(&mut self, id: TokenId, from: &str, amount: Amount) -> Result<(), LedgerError>;

    /// Moves `amount` of `id` from `from` to `to`. When `operator != from`,
    /// the operator needs approval-for-all or enough per-token allowance.
    fn transfer_from(
        &mut self,
        id: TokenId,
        operator: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Balance of `owner` for `id`, zero when unknown.
    fn balance_of(&self, id: TokenId, owner: &str) -> Amount;

    /// Total supply of `id`, zero when never minted.
    fn total_supply(&self, id: TokenId) -> Amount;

    /// Per-token allowance `owner` granted to `operator`.
    fn allowance(&self, id: TokenId, owner: &str, operator: &str) -> Amount;

    /// Sets the per-token allowance. `Amount::MAX` never decrements.
    fn set_approval(&mut self, id: TokenId, owner: &str, operator: &str, amount: Amount);

    /// Grants or revokes `operator` control over every id `owner` holds.
    fn set_approval_for_all(&mut self, owner: &str, operator: &str, approved: bool);

    /// Whether `operator` holds approval-for-all from `owner`.
    fn is_approved_for_all(&self, owner: &str, operator: &str) -> bool;
}
