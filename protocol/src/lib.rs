// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Term Protocol — Core Library
//!
//! Building blocks for the term engine: the identifiers it mints under, the
//! ledger it mints into, the vault it parks idle funds in, and the checked
//! arithmetic it prices everything with. The engine itself lives in the
//! `term-contracts` crate and consumes these through traits.
//!
//! ## Architecture
//!
//! - **asset** — `AssetId` share families and the packed ledger `TokenId`.
//! - **ledger** — `ShareLedger` trait and the in-memory multi-token ledger.
//! - **vault** — `VaultAdapter` trait and an in-memory ERC-4626-style vault.
//! - **math** — widened, checked `mul_div` in both rounding directions.
//! - **config** — protocol constants and `TermConfig`.
//! - **telemetry** — `tracing` subscriber bootstrap.
//!
//! ## Design Principles
//!
//! 1. All amounts are integers in smallest-unit denomination. No floats.
//! 2. Every product is widened before it is divided; every narrowing is checked.
//! 3. Collaborators sit behind traits so the engine never sees concrete storage.

pub mod asset;
pub mod config;
pub mod ledger;
pub mod math;
pub mod telemetry;
pub mod vault;

/// A quantity of base asset, shares, or vault shares in smallest units.
pub type Amount = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

pub use asset::{AssetError, AssetId, TokenClass, TokenId};
pub use config::{ConfigError, TermConfig};
pub use ledger::{LedgerError, MultiTokenLedger, ShareLedger};
pub use math::MathError;
pub use vault::{InMemoryVault, VaultAdapter, VaultError};
