//! # Shared Engine Handle
//!
//! A cloneable handle over one [`TermEngine`]. Every entry point takes the
//! engine lock with `try_lock`, so a collaborator that calls back into the
//! engine while a call is in flight is turned away with
//! [`TermError::Reentrant`] instead of observing half-applied state.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tracing::warn;

use term_protocol::{Amount, AssetId, ShareLedger, Timestamp, VaultAdapter};

use crate::term_engine::{CallContext, TermEngine, TermError};

/// Re-entrancy guarded, thread-safe handle to a [`TermEngine`].
pub struct SharedTermEngine<L, V> {
    inner: Arc<Mutex<TermEngine<L, V>>>,
}

impl<L, V> Clone for SharedTermEngine<L, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L, V> fmt::Debug for SharedTermEngine<L, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTermEngine")
            .field("busy", &self.inner.is_locked())
            .finish_non_exhaustive()
    }
}

impl<L, V> SharedTermEngine<L, V>
where
    L: ShareLedger + Clone,
    V: VaultAdapter + Clone,
{
    /// Wraps an engine.
    pub fn new(engine: TermEngine<L, V>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    fn enter(&self) -> Result<MutexGuard<'_, TermEngine<L, V>>, TermError> {
        self.inner.try_lock().ok_or_else(|| {
            warn!("re-entrant call rejected");
            TermError::Reentrant
        })
    }

    /// See [`TermEngine::lock`].
    #[allow(clippy::too_many_arguments)]
    pub fn lock(
        &self,
        ctx: &CallContext,
        burns: &[(AssetId, Amount)],
        deposit: Amount,
        source: &str,
        destination: &str,
        start: Timestamp,
        maturity: Timestamp,
    ) -> Result<Amount, TermError> {
        self.enter()?
            .lock(ctx, burns, deposit, source, destination, start, maturity)
    }

    /// See [`TermEngine::unlock`].
    pub fn unlock(
        &self,
        ctx: &CallContext,
        destination: &str,
        positions: &[(AssetId, Amount)],
    ) -> Result<Amount, TermError> {
        self.enter()?.unlock(ctx, destination, positions)
    }

    /// See [`TermEngine::convert`].
    pub fn convert(
        &self,
        ctx: &CallContext,
        burns: &[(AssetId, Amount)],
        destination: &str,
        target: AssetId,
    ) -> Result<Amount, TermError> {
        self.enter()?.convert(ctx, burns, destination, target)
    }

    /// See [`TermEngine::reserve_details`].
    pub fn reserve_details(&self) -> Result<(Amount, Amount), TermError> {
        Ok(self.enter()?.reserve_details())
    }

    /// Runs `f` against the engine while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&TermEngine<L, V>) -> R) -> Result<R, TermError> {
        let guard = self.enter()?;
        Ok(f(&guard))
    }

    /// Runs `f` against the engine mutably while holding the lock.
    pub fn with_mut<R>(
        &self,
        f: impl FnOnce(&mut TermEngine<L, V>) -> R,
    ) -> Result<R, TermError> {
        let mut guard = self.enter()?;
        Ok(f(&mut guard))
    }
}
