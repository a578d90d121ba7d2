//! # Term Engine
//!
//! Issues two families of shares against a single base asset:
//!
//! - **Unlocked** shares are a pooled claim on the reserve: idle underlying
//!   held by the engine plus vault shares swept into the yield vault.
//! - **Locked** shares are a claim on the vault shares attributed to one
//!   maturity. Every maturity is its own family with its own supply.
//!
//! ## Lifecycle
//!
//! ```text
//!   lock(burns, deposit)          unlock(positions)
//!   ─────────────────────>  shares  ─────────────────>  underlying
//!           │                                  ▲
//!           └──── convert(burns, target) ──────┘
//! ```
//!
//! Deposits into the unlocked family land in the reserve. When the reserve
//! climbs past `max_reserve`, the excess above `target_reserve` is swept into
//! the vault. Withdrawals pay from the reserve first and redeem vault shares
//! for the shortfall.
//!
//! ## Custody
//!
//! The engine's idle underlying is booked in the ledger under
//! [`TermConfig::account`]. Underlying leaves the book when it goes into the
//! vault and comes back when vault shares are redeemed, so the custody
//! balance always equals `underlying_reserve`.
//!
//! ## Atomicity
//!
//! Every mutating call checkpoints ledger, vault and engine state before it
//! starts and restores the checkpoint if any step fails. A failed call leaves
//! no trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use term_protocol::asset::{AssetId, TokenId};
use term_protocol::config::PRICE_SCALE;
use term_protocol::math::{self, mul_div_down, MathError};
use term_protocol::{
    Amount, ConfigError, LedgerError, ShareLedger, TermConfig, Timestamp, VaultAdapter,
    VaultError,
};

use crate::metrics::TermMetrics;
use crate::reserve::{Holdings, ReserveBand, ReserveError, ReserveState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during term engine operations.
#[derive(Debug, Error)]
pub enum TermError {
    /// The requested term is malformed or already matured.
    #[error("invalid term: start {start}, maturity {maturity}, now {now}")]
    InvalidTerm {
        /// Requested accrual start.
        start: Timestamp,
        /// Requested maturity.
        maturity: Timestamp,
        /// Block timestamp of the call.
        now: Timestamp,
    },

    /// The depositor lacks base asset or hasn't approved the engine.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(#[source] LedgerError),

    /// The caller holds fewer shares than it tried to burn.
    #[error("insufficient balance: {0}")]
    InsufficientBalance(#[source] LedgerError),

    /// A withdrawal asked for more than the family's backing can pay.
    #[error("insufficient reserve for {asset}: needs {requested}, holds {available}")]
    InsufficientReserve {
        /// Family being withdrawn from.
        asset: AssetId,
        /// Shares or vault shares the withdrawal needs.
        requested: Amount,
        /// What the family can cover.
        available: Amount,
    },

    /// A conversion needs more vault shares than the source family holds.
    #[error("insufficient vault shares for {asset}: needs {requested}, holds {available}")]
    InsufficientVaultShares {
        /// Family being converted out of.
        asset: AssetId,
        /// Shares or vault shares the conversion needs.
        requested: Amount,
        /// What the family can cover.
        available: Amount,
    },

    /// A locked deposit or conversion bought no vault shares.
    #[error("{value} of underlying buys no vault shares for {asset}")]
    NoVaultShares {
        /// Family being deposited into.
        asset: AssetId,
        /// Underlying value offered.
        value: Amount,
    },

    /// A call arrived while another call on the same engine was running.
    #[error("engine is already executing a call")]
    Reentrant,

    /// The engine was constructed with an invalid config.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The vault rejected a deposit, redemption or quote.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Share pricing overflowed or divided by zero.
    #[error(transparent)]
    Math(#[from] MathError),

    /// Any other ledger failure.
    #[error("ledger error: {0}")]
    Ledger(#[source] LedgerError),
}

/// Which call is lifting value out of a family. Decides how a shortfall is
/// reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Debit {
    Withdraw,
    Convert,
}

impl Debit {
    fn shortfall(self, asset: AssetId, requested: Amount, available: Amount) -> TermError {
        match self {
            Debit::Withdraw => TermError::InsufficientReserve {
                asset,
                requested,
                available,
            },
            Debit::Convert => TermError::InsufficientVaultShares {
                asset,
                requested,
                available,
            },
        }
    }

    fn reserve_error(self, asset: AssetId, err: ReserveError) -> TermError {
        match err {
            ReserveError::Shortfall {
                requested,
                available,
            } => self.shortfall(asset, requested, available),
            ReserveError::Vault(e) => TermError::Vault(e),
            ReserveError::Math(e) => TermError::Math(e),
        }
    }
}

fn burn_error(err: LedgerError) -> TermError {
    match err {
        LedgerError::InsufficientBalance { .. } => TermError::InsufficientBalance(err),
        other => TermError::Ledger(other),
    }
}

// ---------------------------------------------------------------------------
// CallContext
// ---------------------------------------------------------------------------

/// Who is calling and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Account whose shares are burned by conversions and withdrawals.
    pub caller: String,
    /// Timestamp the call executes at, in seconds.
    pub timestamp: Timestamp,
}

impl CallContext {
    /// Creates a context at an explicit timestamp.
    pub fn new(caller: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            caller: caller.into(),
            timestamp,
        }
    }

    /// Creates a context stamped with the current wall-clock time.
    pub fn now(caller: impl Into<String>) -> Self {
        let timestamp = chrono::Utc::now().timestamp().max(0) as Timestamp;
        Self::new(caller, timestamp)
    }
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Everything a failed call must put back.
struct Checkpoint<L, V> {
    ledger: L,
    vault: V,
    reserve: ReserveState,
    locked_backing: BTreeMap<Timestamp, Amount>,
}

/// What a committed `lock` did, for logs and metrics.
#[derive(Debug, Default)]
struct LockOutcome {
    minted: Amount,
    conversions: u64,
    swept: bool,
}

// ---------------------------------------------------------------------------
// TermEngine
// ---------------------------------------------------------------------------

/// Reserve manager and share issuer for one base asset.
///
/// Owns its ledger and vault. Wrap it in a
/// [`SharedTermEngine`](crate::shared::SharedTermEngine) to reject re-entrant
/// calls from collaborators.
#[derive(Debug)]
pub struct TermEngine<L, V> {
    ledger: L,
    vault: V,
    config: TermConfig,
    reserve: ReserveState,
    /// Vault shares attributed to each locked maturity.
    locked_backing: BTreeMap<Timestamp, Amount>,
    metrics: Option<Arc<TermMetrics>>,
}

impl<L, V> TermEngine<L, V>
where
    L: ShareLedger + Clone,
    V: VaultAdapter + Clone,
{
    /// Creates an engine over `ledger` and `vault`.
    ///
    /// # Errors
    ///
    /// Returns [`TermError::Config`] if the reserve band or account is invalid.
    pub fn new(ledger: L, vault: V, config: TermConfig) -> Result<Self, TermError> {
        config.validate()?;
        info!(
            account = %config.account,
            target_reserve = config.target_reserve,
            max_reserve = config.max_reserve,
            "term engine created"
        );
        Ok(Self {
            ledger,
            vault,
            config,
            reserve: ReserveState::default(),
            locked_backing: BTreeMap::new(),
            metrics: None,
        })
    }

    /// Attaches a metrics sink. Metrics are updated after each committed call.
    pub fn with_metrics(mut self, metrics: Arc<TermMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    // -----------------------------------------------------------------------
    // Mutating calls
    // -----------------------------------------------------------------------

    /// Deposits underlying and converts existing shares into one family.
    ///
    /// `maturity == 0` targets the unlocked family. Otherwise the target is
    /// `Locked(maturity)` and the term must satisfy `start < maturity` and
    /// `maturity >= ctx.timestamp`.
    ///
    /// Each `(asset, amount)` in `burns` is burned from `ctx.caller` and its
    /// value re-issued in the target family. Then `deposit` underlying is
    /// pulled from `source` and issued as fresh shares. Everything minted
    /// goes to `destination`. Returns the total minted.
    ///
    /// # Errors
    ///
    /// - [`TermError::InvalidTerm`] for a malformed or matured term.
    /// - [`TermError::InsufficientFunds`] if `source` can't fund the deposit.
    /// - [`TermError::InsufficientBalance`] if the caller can't cover a burn.
    /// - [`TermError::InsufficientVaultShares`] if a source family can't back a
    ///   conversion.
    #[allow(clippy::too_many_arguments)]
    pub fn lock(
        &mut self,
        ctx: &CallContext,
        burns: &[(AssetId, Amount)],
        deposit: Amount,
        source: &str,
        destination: &str,
        start: Timestamp,
        maturity: Timestamp,
    ) -> Result<Amount, TermError> {
        let outcome = self.atomically("lock", |engine| {
            let target = engine.validate_term(ctx, start, maturity)?;
            engine.lock_into(ctx, target, burns, deposit, source, destination)
        })?;

        info!(
            caller = %ctx.caller,
            destination,
            start,
            maturity,
            deposit,
            conversions = outcome.conversions,
            minted = outcome.minted,
            "lock committed"
        );
        self.record_lock(&outcome);
        Ok(outcome.minted)
    }

    /// Moves the value of `burns` into `target` without a fresh deposit.
    ///
    /// Shorthand for [`lock`](Self::lock) with a zero deposit, taking the
    /// target family directly.
    ///
    /// # Errors
    ///
    /// Same as [`lock`](Self::lock). A locked target must not have matured.
    pub fn convert(
        &mut self,
        ctx: &CallContext,
        burns: &[(AssetId, Amount)],
        destination: &str,
        target: AssetId,
    ) -> Result<Amount, TermError> {
        let outcome = self.atomically("convert", |engine| {
            engine.validate_target(ctx, target)?;
            engine.lock_into(ctx, target, burns, 0, "", destination)
        })?;

        info!(
            caller = %ctx.caller,
            destination,
            %target,
            conversions = outcome.conversions,
            minted = outcome.minted,
            "convert committed"
        );
        self.record_lock(&outcome);
        Ok(outcome.minted)
    }

    /// Burns shares from `ctx.caller` and pays their underlying value to
    /// `destination`. Returns the total underlying paid.
    ///
    /// Unlocked shares are paid at the pool's current value per share, from
    /// idle reserve first and redeemed vault shares for the rest. Locked
    /// shares redeem their pro-rata slice of the maturity's vault shares.
    ///
    /// # Errors
    ///
    /// - [`TermError::InsufficientReserve`] if a family can't pay what is
    ///   asked of it.
    /// - [`TermError::InsufficientBalance`] if the caller can't cover a burn.
    pub fn unlock(
        &mut self,
        ctx: &CallContext,
        destination: &str,
        positions: &[(AssetId, Amount)],
    ) -> Result<Amount, TermError> {
        let paid = self.atomically("unlock", |engine| {
            let mut paid: Amount = 0;
            for &(asset, amount) in positions {
                let payout = engine.withdraw(ctx, asset, amount, destination)?;
                paid = math::add(paid, payout)?;
            }
            Ok(paid)
        })?;

        info!(
            caller = %ctx.caller,
            destination,
            positions = positions.len(),
            paid,
            "unlock committed"
        );
        if let Some(metrics) = &self.metrics {
            metrics.unlocks_total.inc();
            metrics.observe_reserve(&self.reserve);
        }
        Ok(paid)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `(underlying_reserve, vault_share_reserve)` of the unlocked family.
    pub fn reserve_details(&self) -> (Amount, Amount) {
        (
            self.reserve.underlying_reserve,
            self.reserve.vault_share_reserve,
        )
    }

    /// Reserve level restored by a sweep.
    pub fn target_reserve(&self) -> Amount {
        self.config.target_reserve
    }

    /// Reserve ceiling that triggers a sweep.
    pub fn max_reserve(&self) -> Amount {
        self.config.max_reserve
    }

    /// Construction parameters.
    pub fn config(&self) -> &TermConfig {
        &self.config
    }

    /// The yield vault.
    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Direct access to the vault, bypassing engine accounting.
    pub fn vault_mut(&mut self) -> &mut V {
        &mut self.vault
    }

    /// The share ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct access to the ledger, bypassing engine accounting.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Vault shares backing `Locked(maturity)`.
    pub fn locked_vault_shares(&self, maturity: Timestamp) -> Amount {
        self.locked_backing.get(&maturity).copied().unwrap_or(0)
    }

    /// Maturities with vault shares attributed, ascending.
    pub fn maturities(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.locked_backing
            .iter()
            .filter(|(_, shares)| **shares > 0)
            .map(|(maturity, _)| *maturity)
    }

    /// Vault shares held by the engine across every family.
    pub fn total_vault_shares(&self) -> Amount {
        self.locked_backing
            .values()
            .fold(self.reserve.vault_share_reserve, |acc, s| {
                acc.saturating_add(*s)
            })
    }

    /// Underlying value currently backing a family.
    pub fn total_value(&self, asset: AssetId) -> Result<Amount, TermError> {
        match asset {
            AssetId::Unlocked => self.unlocked_value(),
            AssetId::Locked(maturity) => {
                Ok(self.vault.preview_redeem(self.locked_vault_shares(maturity))?)
            }
        }
    }

    /// Underlying value of one share, scaled by `PRICE_SCALE`. An empty
    /// family prices at par.
    pub fn price_per_share(&self, asset: AssetId) -> Result<u128, TermError> {
        let supply = self.supply(asset);
        if supply == 0 {
            return Ok(PRICE_SCALE);
        }
        let value = self.total_value(asset)?;
        Ok(math::scaled_ratio(value, supply, PRICE_SCALE)?)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    fn validate_term(
        &self,
        ctx: &CallContext,
        start: Timestamp,
        maturity: Timestamp,
    ) -> Result<AssetId, TermError> {
        let target = AssetId::for_maturity(maturity);
        if target != AssetId::Unlocked && (start >= maturity || maturity < ctx.timestamp) {
            return Err(TermError::InvalidTerm {
                start,
                maturity,
                now: ctx.timestamp,
            });
        }
        Ok(target)
    }

    fn validate_target(&self, ctx: &CallContext, target: AssetId) -> Result<(), TermError> {
        match target {
            AssetId::Unlocked => Ok(()),
            AssetId::Locked(maturity) if maturity != 0 && maturity >= ctx.timestamp => Ok(()),
            AssetId::Locked(maturity) => Err(TermError::InvalidTerm {
                start: ctx.timestamp,
                maturity,
                now: ctx.timestamp,
            }),
        }
    }

    /// `Locked(0)` packs to the base asset's ledger id and is never a family.
    fn check_source(&self, ctx: &CallContext, asset: AssetId) -> Result<(), TermError> {
        if asset == AssetId::Locked(0) {
            return Err(TermError::InvalidTerm {
                start: 0,
                maturity: 0,
                now: ctx.timestamp,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Call bodies
    // -----------------------------------------------------------------------

    fn lock_into(
        &mut self,
        ctx: &CallContext,
        target: AssetId,
        burns: &[(AssetId, Amount)],
        deposit: Amount,
        source: &str,
        destination: &str,
    ) -> Result<LockOutcome, TermError> {
        let mut outcome = LockOutcome::default();

        for &(asset, amount) in burns {
            self.check_source(ctx, asset)?;
            let (holdings, value) = self.debit(asset, amount, Debit::Convert)?;
            self.ledger
                .burn(asset.token_id(), &ctx.caller, amount)
                .map_err(burn_error)?;
            let minted = self.credit(target, holdings, value, destination)?;
            debug!(from = %asset, to = %target, amount, value, minted, "shares converted");
            outcome.minted = math::add(outcome.minted, minted)?;
            outcome.conversions += 1;
        }

        if deposit > 0 {
            let custody = self.config.account.clone();
            self.ledger
                .transfer_from(TokenId::UNDERLYING, &custody, source, &custody, deposit)
                .map_err(TermError::InsufficientFunds)?;
            let minted = self.credit(target, Holdings::underlying(deposit), deposit, destination)?;
            outcome.minted = math::add(outcome.minted, minted)?;
        }

        outcome.swept = self.sweep()?;
        Ok(outcome)
    }

    fn withdraw(
        &mut self,
        ctx: &CallContext,
        asset: AssetId,
        amount: Amount,
        destination: &str,
    ) -> Result<Amount, TermError> {
        self.check_source(ctx, asset)?;
        let (holdings, due) = self.debit(asset, amount, Debit::Withdraw)?;

        let redeemed = self.redeem_to_custody(holdings.vault_shares)?;
        let in_hand = math::add(holdings.underlying, redeemed)?;
        let payout = match asset {
            AssetId::Unlocked => {
                // Round-up quote: redemption may exceed the shortfall.
                let surplus = math::sub(in_hand, due)?;
                self.reserve.absorb(Holdings::underlying(surplus)).map_err(|e| {
                    Debit::Withdraw.reserve_error(asset, e)
                })?;
                due
            }
            AssetId::Locked(_) => in_hand,
        };

        self.ledger
            .burn(asset.token_id(), &ctx.caller, amount)
            .map_err(burn_error)?;
        let custody = self.config.account.clone();
        self.ledger
            .transfer_from(TokenId::UNDERLYING, &custody, &custody, destination, payout)
            .map_err(TermError::Ledger)?;

        debug!(%asset, amount, payout, "shares withdrawn");
        Ok(payout)
    }

    // -----------------------------------------------------------------------
    // Debit / credit
    // -----------------------------------------------------------------------

    /// Lifts the backing of `amount` shares of `asset` out of the family.
    /// Returns the lifted holdings and their underlying value.
    fn debit(
        &mut self,
        asset: AssetId,
        amount: Amount,
        purpose: Debit,
    ) -> Result<(Holdings, Amount), TermError> {
        let supply = self.supply(asset);
        if amount > supply {
            return Err(purpose.shortfall(asset, amount, supply));
        }
        if amount == 0 {
            return Ok((Holdings::default(), 0));
        }

        match asset {
            AssetId::Unlocked => {
                let value = self.unlocked_value()?;
                let due = mul_div_down(amount, value, supply)?;
                if due == 0 {
                    return Err(purpose.shortfall(asset, amount, value));
                }
                let holdings = self
                    .reserve
                    .draw(due, &self.vault)
                    .map_err(|e| purpose.reserve_error(asset, e))?;
                Ok((holdings, due))
            }
            AssetId::Locked(maturity) => {
                let backing = self.locked_vault_shares(maturity);
                let shares = mul_div_down(amount, backing, supply)?;
                if shares == 0 || shares > backing {
                    return Err(purpose.shortfall(asset, amount, backing));
                }
                let value = self.vault.preview_redeem(shares)?;
                self.locked_backing.insert(maturity, backing - shares);
                Ok((Holdings::vault_shares(shares), value))
            }
        }
    }

    /// Adds `holdings` to the backing of `target` and mints shares for
    /// `value` to `destination`.
    ///
    /// Unlocked shares are priced against the pool before the new backing
    /// lands. Locked shares are issued at par: one share per unit of value.
    fn credit(
        &mut self,
        target: AssetId,
        holdings: Holdings,
        value: Amount,
        destination: &str,
    ) -> Result<Amount, TermError> {
        let minted = match target {
            AssetId::Unlocked => {
                let supply = self.supply(target);
                let pool_value = self.unlocked_value()?;
                let minted = if supply == 0 {
                    value
                } else if pool_value == 0 {
                    return Err(TermError::InsufficientReserve {
                        asset: target,
                        requested: value,
                        available: 0,
                    });
                } else {
                    mul_div_down(value, supply, pool_value)?
                };
                self.reserve
                    .absorb(holdings)
                    .map_err(|e| Debit::Convert.reserve_error(target, e))?;
                minted
            }
            AssetId::Locked(maturity) => {
                let backing = self.locked_vault_shares(maturity);
                let deposited = self.deposit_from_custody(holdings.underlying)?;
                let shares_in = math::add(holdings.vault_shares, deposited)?;
                if shares_in == 0 && value > 0 {
                    return Err(TermError::NoVaultShares {
                        asset: target,
                        value,
                    });
                }
                self.locked_backing
                    .insert(maturity, math::add(backing, shares_in)?);
                value
            }
        };

        self.ledger
            .mint(target.token_id(), destination, minted)
            .map_err(TermError::Ledger)?;
        Ok(minted)
    }

    // -----------------------------------------------------------------------
    // Vault routing
    // -----------------------------------------------------------------------

    /// Sweeps idle underlying above `max_reserve` down to `target_reserve`.
    fn sweep(&mut self) -> Result<bool, TermError> {
        let band = ReserveBand::from(&self.config);
        let Some(excess) = band.excess(self.reserve.underlying_reserve) else {
            return Ok(false);
        };

        let shares = self.deposit_from_custody(excess)?;
        self.reserve.underlying_reserve = band.target;
        self.reserve.vault_share_reserve = math::add(self.reserve.vault_share_reserve, shares)?;
        debug!(
            excess,
            shares,
            vault_share_reserve = self.reserve.vault_share_reserve,
            "reserve swept into vault"
        );
        Ok(true)
    }

    /// Moves `assets` of custody underlying into the vault.
    fn deposit_from_custody(&mut self, assets: Amount) -> Result<Amount, TermError> {
        if assets == 0 {
            return Ok(0);
        }
        self.ledger
            .burn(TokenId::UNDERLYING, &self.config.account, assets)
            .map_err(TermError::Ledger)?;
        Ok(self.vault.deposit(assets)?)
    }

    /// Redeems vault shares back into custody underlying.
    fn redeem_to_custody(&mut self, shares: Amount) -> Result<Amount, TermError> {
        if shares == 0 {
            return Ok(0);
        }
        let assets = self.vault.redeem(shares)?;
        self.ledger
            .mint(TokenId::UNDERLYING, &self.config.account, assets)
            .map_err(TermError::Ledger)?;
        Ok(assets)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn supply(&self, asset: AssetId) -> Amount {
        self.ledger.total_supply(asset.token_id())
    }

    fn unlocked_value(&self) -> Result<Amount, TermError> {
        self.reserve
            .total_value(&self.vault)
            .map_err(|e| Debit::Withdraw.reserve_error(AssetId::Unlocked, e))
    }

    fn checkpoint(&self) -> Checkpoint<L, V> {
        Checkpoint {
            ledger: self.ledger.clone(),
            vault: self.vault.clone(),
            reserve: self.reserve,
            locked_backing: self.locked_backing.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint<L, V>) {
        self.ledger = checkpoint.ledger;
        self.vault = checkpoint.vault;
        self.reserve = checkpoint.reserve;
        self.locked_backing = checkpoint.locked_backing;
    }

    /// Runs `body`, restoring the pre-call state if it fails.
    fn atomically<T>(
        &mut self,
        call: &'static str,
        body: impl FnOnce(&mut Self) -> Result<T, TermError>,
    ) -> Result<T, TermError> {
        let checkpoint = self.checkpoint();
        match body(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.restore(checkpoint);
                warn!(call, error = %e, "call reverted");
                if let Some(metrics) = &self.metrics {
                    metrics.failed_calls_total.inc();
                }
                Err(e)
            }
        }
    }

    fn record_lock(&self, outcome: &LockOutcome) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.locks_total.inc();
        metrics.conversions_total.inc_by(outcome.conversions);
        if outcome.swept {
            metrics.vault_sweeps_total.inc();
        }
        metrics.observe_reserve(&self.reserve);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use term_protocol::{InMemoryVault, MultiTokenLedger};

    const NOW: Timestamp = 1_000;

    fn engine() -> TermEngine<MultiTokenLedger, InMemoryVault> {
        let mut ledger = MultiTokenLedger::new();
        ledger.mint(TokenId::UNDERLYING, "alice", 1_000_000).unwrap();
        ledger.set_approval_for_all("alice", "term", true);
        TermEngine::new(ledger, InMemoryVault::new(), TermConfig::from_max_reserve(50_000))
            .unwrap()
    }

    fn alice() -> CallContext {
        CallContext::new("alice", NOW)
    }

    #[test]
    fn new_rejects_inverted_band() {
        let result = TermEngine::new(
            MultiTokenLedger::new(),
            InMemoryVault::new(),
            TermConfig::new(10, 5),
        );
        assert!(matches!(
            result,
            Err(TermError::Config(ConfigError::TargetAboveMax { .. }))
        ));
    }

    #[test]
    fn zero_maturity_targets_unlocked() {
        let engine = engine();
        assert_eq!(
            engine.validate_term(&alice(), 0, 0).unwrap(),
            AssetId::Unlocked
        );
        assert_eq!(
            engine.validate_term(&alice(), 5, 0).unwrap(),
            AssetId::Unlocked
        );
    }

    #[test]
    fn term_must_start_before_maturity() {
        let engine = engine();
        assert!(matches!(
            engine.validate_term(&alice(), 2_000, 2_000),
            Err(TermError::InvalidTerm { .. })
        ));
        assert!(matches!(
            engine.validate_term(&alice(), 3_000, 2_000),
            Err(TermError::InvalidTerm { .. })
        ));
    }

    #[test]
    fn matured_term_rejected() {
        let engine = engine();
        assert!(matches!(
            engine.validate_term(&alice(), 0, NOW - 1),
            Err(TermError::InvalidTerm { .. })
        ));
        // Maturing exactly now is still accepted.
        assert_eq!(
            engine.validate_term(&alice(), 0, NOW).unwrap(),
            AssetId::Locked(NOW)
        );
    }

    #[test]
    fn locked_zero_is_never_a_source() {
        let mut engine = engine();
        let err = engine
            .unlock(&alice(), "alice", &[(AssetId::Locked(0), 1)])
            .unwrap_err();
        assert!(matches!(err, TermError::InvalidTerm { maturity: 0, .. }));
        assert_eq!(engine.ledger().balance_of(TokenId::UNDERLYING, "alice"), 1_000_000);
    }

    #[test]
    fn convert_into_matured_family_rejected() {
        let mut engine = engine();
        engine.lock(&alice(), &[], 100, "alice", "alice", 0, 0).unwrap();
        let err = engine
            .convert(
                &alice(),
                &[(AssetId::Unlocked, 100)],
                "alice",
                AssetId::Locked(NOW - 1),
            )
            .unwrap_err();
        assert!(matches!(err, TermError::InvalidTerm { .. }));
    }

    #[test]
    fn custody_balance_tracks_idle_reserve() {
        let mut engine = engine();
        engine
            .lock(&alice(), &[], 80_000, "alice", "alice", 0, 0)
            .unwrap();
        engine
            .lock(&alice(), &[], 5_000, "alice", "alice", 0, 5_000)
            .unwrap();
        let (underlying, _) = engine.reserve_details();
        assert_eq!(underlying, 25_000);
        assert_eq!(
            engine.ledger().balance_of(TokenId::UNDERLYING, "term"),
            underlying
        );
    }

    #[test]
    fn sweep_is_noop_inside_band() {
        let mut engine = engine();
        engine
            .lock(&alice(), &[], 50_000, "alice", "alice", 0, 0)
            .unwrap();
        assert_eq!(engine.reserve_details(), (50_000, 0));
        assert_eq!(engine.vault().total_assets(), 0);
    }

    #[test]
    fn empty_family_prices_at_par() {
        let engine = engine();
        assert_eq!(engine.price_per_share(AssetId::Unlocked).unwrap(), PRICE_SCALE);
        assert_eq!(
            engine.price_per_share(AssetId::Locked(5_000)).unwrap(),
            PRICE_SCALE
        );
    }

    #[test]
    fn zero_amount_positions_are_noops() {
        let mut engine = engine();
        assert_eq!(
            engine
                .unlock(&alice(), "alice", &[(AssetId::Unlocked, 0)])
                .unwrap(),
            0
        );
        assert_eq!(engine.lock(&alice(), &[], 0, "alice", "alice", 0, 0).unwrap(), 0);
    }

    #[test]
    fn maturities_lists_backed_families() {
        let mut engine = engine();
        engine
            .lock(&alice(), &[], 100, "alice", "alice", 0, 3_000)
            .unwrap();
        engine
            .lock(&alice(), &[], 100, "alice", "alice", 0, 2_000)
            .unwrap();
        assert_eq!(engine.maturities().collect::<Vec<_>>(), vec![2_000, 3_000]);
        assert_eq!(engine.total_vault_shares(), 200);
    }
}
