// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Term Contracts
//!
//! The term engine: a reserve manager and multi-maturity share issuer built
//! on the `term-protocol` ledger and vault abstractions.
//!
//! - **Term Engine** — `lock`, `unlock` and `convert` across the unlocked
//!   family and every locked maturity, with atomic rollback on failure.
//! - **Reserve** — idle underlying and vault-share accounting for the
//!   unlocked family, plus the sweep band.
//! - **Shared** — a cloneable handle that rejects re-entrant calls.
//! - **Metrics** — Prometheus counters and reserve gauges.
//!
//! ## Design Principles
//!
//! 1. All monetary operations are checked. Share prices are computed with a
//!    widened intermediate and always round toward the pool.
//! 2. Unlocked pricing reads the pool before new backing lands; locked
//!    shares are issued at par.
//! 3. A failed call leaves ledger, vault and engine state exactly as it
//!    found them.
//! 4. Every public state type is serializable (serde).

pub mod metrics;
pub mod reserve;
pub mod shared;
pub mod term_engine;

pub use metrics::TermMetrics;
pub use reserve::{Holdings, ReserveBand, ReserveError, ReserveState};
pub use shared::SharedTermEngine;
pub use term_engine::{CallContext, TermEngine, TermError};
