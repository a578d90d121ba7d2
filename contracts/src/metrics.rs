//! # Prometheus Metrics
//!
//! Operational metrics for a term engine. Counters move only when a call
//! commits, except `failed_calls_total` which counts reverted calls.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use std::fmt;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

use term_protocol::Amount;

use crate::reserve::ReserveState;

/// Holds all Prometheus metric handles for one engine.
///
/// Share it behind an `Arc`; prometheus handles are internally synchronized.
#[derive(Clone)]
pub struct TermMetrics {
    registry: Registry,
    /// Committed `lock` and `convert` calls.
    pub locks_total: IntCounter,
    /// Committed `unlock` calls.
    pub unlocks_total: IntCounter,
    /// Individual burn-and-reissue conversions.
    pub conversions_total: IntCounter,
    /// Times idle underlying was swept into the vault.
    pub vault_sweeps_total: IntCounter,
    /// Calls that failed and were rolled back.
    pub failed_calls_total: IntCounter,
    /// Idle underlying held for the unlocked family.
    pub underlying_reserve: IntGauge,
    /// Vault shares held for the unlocked family.
    pub vault_share_reserve: IntGauge,
}

impl fmt::Debug for TermMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermMetrics")
            .field("locks_total", &self.locks_total.get())
            .field("unlocks_total", &self.unlocks_total.get())
            .field("failed_calls_total", &self.failed_calls_total.get())
            .finish_non_exhaustive()
    }
}

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    collector: C,
) -> Result<C, prometheus::Error> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

impl TermMetrics {
    /// Creates and registers all metrics under the `term` namespace.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("term".into()), None)?;

        let locks_total = register(
            &registry,
            IntCounter::new("locks_total", "Committed lock and convert calls")?,
        )?;
        let unlocks_total = register(
            &registry,
            IntCounter::new("unlocks_total", "Committed unlock calls")?,
        )?;
        let conversions_total = register(
            &registry,
            IntCounter::new(
                "conversions_total",
                "Share positions burned and re-issued in another family",
            )?,
        )?;
        let vault_sweeps_total = register(
            &registry,
            IntCounter::new(
                "vault_sweeps_total",
                "Times idle underlying above the ceiling was swept into the vault",
            )?,
        )?;
        let failed_calls_total = register(
            &registry,
            IntCounter::new("failed_calls_total", "Calls that failed and were rolled back")?,
        )?;
        let underlying_reserve = register(
            &registry,
            IntGauge::new(
                "underlying_reserve",
                "Idle underlying held for the unlocked family",
            )?,
        )?;
        let vault_share_reserve = register(
            &registry,
            IntGauge::new(
                "vault_share_reserve",
                "Vault shares held for the unlocked family",
            )?,
        )?;

        Ok(Self {
            registry,
            locks_total,
            unlocks_total,
            conversions_total,
            vault_sweeps_total,
            failed_calls_total,
            underlying_reserve,
            vault_share_reserve,
        })
    }

    /// Copies reserve levels into the gauges.
    pub fn observe_reserve(&self, reserve: &ReserveState) {
        self.underlying_reserve
            .set(gauge_value(reserve.underlying_reserve));
        self.vault_share_reserve
            .set(gauge_value(reserve.vault_share_reserve));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn gauge_value(amount: Amount) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_namespaced() {
        let metrics = TermMetrics::new().unwrap();
        metrics.locks_total.inc();
        let text = metrics.encode().unwrap();
        assert!(text.contains("term_locks_total 1"));
        assert!(text.contains("term_vault_share_reserve 0"));
    }

    #[test]
    fn reserve_gauges_saturate() {
        let metrics = TermMetrics::new().unwrap();
        metrics.observe_reserve(&ReserveState {
            underlying_reserve: u64::MAX,
            vault_share_reserve: 42,
        });
        assert_eq!(metrics.underlying_reserve.get(), i64::MAX);
        assert_eq!(metrics.vault_share_reserve.get(), 42);
    }

    #[test]
    fn independent_instances_do_not_collide() {
        let a = TermMetrics::new().unwrap();
        let b = TermMetrics::new().unwrap();
        a.unlocks_total.inc();
        assert_eq!(b.unlocks_total.get(), 0);
    }
}
