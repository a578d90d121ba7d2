//! # Asset Identifiers
//!
//! The engine speaks in [`AssetId`]: a share is either the pooled
//! `Unlocked` family or a `Locked` family keyed by its maturity. The ledger
//! stores every balance under a flat [`TokenId`] instead, so this module owns
//! the packing between the two.
//!
//! ## Packed Layout
//!
//! ```text
//! bit 127      yield flag
//! bits 64..127 start timestamp (63 bits)
//! bits 0..64   maturity timestamp
//! ```
//!
//! | Class        | Flag | Start | Maturity |
//! |--------------|------|-------|----------|
//! | Underlying   | 0    | 0     | 0        |
//! | Locked(m)    | 0    | 0     | m != 0   |
//! | Unlocked     | 1    | 0     | 0        |
//! | Yield(s, m)  | 1    | s     | m        |
//!
//! Only `Unlocked` and `Locked` are engine shares. Yield ids belong to the
//! interest-splitting collaborators; the ledger can tell them apart by class
//! but the engine refuses to burn or mint them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{MATURITY_MASK, START_MASK, START_SHIFT, YIELD_FLAG_BIT};
use crate::Timestamp;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while packing or unpacking ledger ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// The ledger id names the base asset or a yield token, not an engine share.
    #[error("ledger id {0} is not a term share")]
    NotAShare(TokenId),

    /// A yield start timestamp does not fit in the 63 bits the layout reserves.
    #[error("start timestamp {0} does not fit in a packed ledger id")]
    StartOutOfRange(Timestamp),

    /// The hex string is not a valid 16-byte id.
    #[error("invalid ledger id hex: {0}")]
    InvalidHex(String),
}

// ---------------------------------------------------------------------------
// TokenId
// ---------------------------------------------------------------------------

/// A flat ledger key. See the module docs for the bit layout.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(u128);

const YIELD_FLAG: u128 = 1u128 << YIELD_FLAG_BIT;

impl TokenId {
    /// The base asset pulled on deposit and paid out on withdrawal.
    pub const UNDERLYING: TokenId = TokenId(0);

    /// The single id shared by every unlocked share.
    pub const UNLOCKED: TokenId = TokenId(YIELD_FLAG);

    /// Wraps a raw packed value.
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Returns the raw packed value.
    pub const fn raw(self) -> u128 {
        self.0
    }

    /// Packs a yield-flagged id for the `[start, maturity)` interval.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::StartOutOfRange`] if `start` needs more than 63 bits.
    pub fn yield_token(start: Timestamp, maturity: Timestamp) -> Result<Self, AssetError> {
        if start as u128 > START_MASK {
            return Err(AssetError::StartOutOfRange(start));
        }
        Ok(Self(
            YIELD_FLAG | ((start as u128) << START_SHIFT) | maturity as u128,
        ))
    }

    /// Decodes the id into its class.
    pub fn class(self) -> TokenClass {
        let maturity = (self.0 & MATURITY_MASK) as Timestamp;
        let start = ((self.0 >> START_SHIFT) & START_MASK) as Timestamp;
        if self.0 & YIELD_FLAG == 0 {
            if maturity == 0 {
                TokenClass::Underlying
            } else {
                TokenClass::Locked { maturity }
            }
        } else if start == 0 && maturity == 0 {
            TokenClass::Unlocked
        } else {
            TokenClass::Yield { start, maturity }
        }
    }

    /// Returns the `0x`-prefixed, zero-padded hex form.
    pub fn to_hex(self) -> String {
        format!("0x{}", hex::encode(self.0.to_be_bytes()))
    }

    /// Parses the hex form produced by [`to_hex`](Self::to_hex). The `0x`
    /// prefix is optional.
    pub fn from_hex(s: &str) -> Result<Self, AssetError> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).map_err(|_| AssetError::InvalidHex(s.to_string()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| AssetError::InvalidHex(s.to_string()))?;
        Ok(Self(u128::from_be_bytes(arr)))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenId({:?})", self.class())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for TokenId {
    type Err = AssetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Hex strings keep maps keyed by TokenId valid JSON objects.
impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// TokenClass
// ---------------------------------------------------------------------------

/// What a packed [`TokenId`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenClass {
    /// The base asset.
    Underlying,
    /// The pooled unlocked share.
    Unlocked,
    /// A locked share for one maturity.
    Locked {
        /// Maturity timestamp.
        maturity: Timestamp,
    },
    /// A yield token for an accrual interval. Owned by collaborators.
    Yield {
        /// When the position began accruing.
        start: Timestamp,
        /// Maturity timestamp.
        maturity: Timestamp,
    },
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// An engine share family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AssetId {
    /// Pooled, continuously redeemable claim on the reserve.
    Unlocked,
    /// Claim on the vault shares attributed to one maturity.
    Locked(Timestamp),
}

impl AssetId {
    /// Selects the family a deposit targets. Zero maturity means unlocked.
    pub fn for_maturity(maturity: Timestamp) -> Self {
        if maturity == 0 {
            AssetId::Unlocked
        } else {
            AssetId::Locked(maturity)
        }
    }

    /// Packs the family into its ledger key.
    pub fn token_id(self) -> TokenId {
        match self {
            AssetId::Unlocked => TokenId::UNLOCKED,
            AssetId::Locked(maturity) => TokenId(maturity as u128),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Unlocked => write!(f, "unlocked"),
            AssetId::Locked(maturity) => write!(f, "locked@{}", maturity),
        }
    }
}

impl From<AssetId> for TokenId {
    fn from(asset: AssetId) -> Self {
        asset.token_id()
    }
}

impl TryFrom<TokenId> for AssetId {
    type Error = AssetError;

    fn try_from(id: TokenId) -> Result<Self, Self::Error> {
        match id.class() {
            TokenClass::Unlocked => Ok(AssetId::Unlocked),
            TokenClass::Locked { maturity } => Ok(AssetId::Locked(maturity)),
            TokenClass::Underlying | TokenClass::Yield { .. } => Err(AssetError::NotAShare(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: Timestamp = 1_911_772_800;
    const MATURITY: Timestamp = START + 100_000;

    #[test]
    fn share_ids_unpack_to_themselves() {
        for asset in [AssetId::Unlocked, AssetId::Locked(MATURITY)] {
            assert_eq!(AssetId::try_from(asset.token_id()), Ok(asset));
        }
    }

    #[test]
    fn locked_id_is_the_bare_maturity() {
        assert_eq!(AssetId::Locked(MATURITY).token_id().raw(), MATURITY as u128);
    }

    #[test]
    fn unlocked_is_flag_only() {
        assert_eq!(TokenId::UNLOCKED.raw(), 1u128 << 127);
        assert_eq!(TokenId::UNLOCKED.class(), TokenClass::Unlocked);
    }

    #[test]
    fn yield_ids_are_distinct_from_locked() {
        let yield_id = TokenId::yield_token(START, MATURITY).unwrap();
        assert_eq!(
            yield_id.class(),
            TokenClass::Yield {
                start: START,
                maturity: MATURITY
            }
        );
        assert_ne!(yield_id, AssetId::Locked(MATURITY).token_id());
        assert_eq!(
            AssetId::try_from(yield_id),
            Err(AssetError::NotAShare(yield_id))
        );
    }

    #[test]
    fn yield_with_zero_start_is_still_yield() {
        let id = TokenId::yield_token(0, MATURITY).unwrap();
        assert!(matches!(id.class(), TokenClass::Yield { start: 0, .. }));
    }

    #[test]
    fn underlying_is_not_a_share() {
        assert_eq!(TokenId::UNDERLYING.class(), TokenClass::Underlying);
        assert!(AssetId::try_from(TokenId::UNDERLYING).is_err());
    }

    #[test]
    fn oversized_start_rejected() {
        assert_eq!(
            TokenId::yield_token(u64::MAX, MATURITY),
            Err(AssetError::StartOutOfRange(u64::MAX))
        );
    }

    #[test]
    fn zero_maturity_selects_unlocked() {
        assert_eq!(AssetId::for_maturity(0), AssetId::Unlocked);
        assert_eq!(AssetId::for_maturity(7), AssetId::Locked(7));
    }

    #[test]
    fn hex_form_parses_back() {
        let id = TokenId::yield_token(START, MATURITY).unwrap();
        let hex = id.to_hex();
        assert!(hex.starts_with("0x8"));
        assert_eq!(hex.len(), 34);
        assert_eq!(hex.parse::<TokenId>(), Ok(id));
        assert!(TokenId::from_hex("0x1234").is_err());
        assert!(TokenId::from_hex("zz").is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let json = serde_json::to_string(&TokenId::UNLOCKED).unwrap();
        assert_eq!(json, "\"0x80000000000000000000000000000000\"");
        let back: TokenId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TokenId::UNLOCKED);
    }
}
