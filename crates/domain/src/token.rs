use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WatchError;

/// Balance held by a token account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    /// Raw amount in base units.
    pub amount: u64,
    /// Decimals of the mint.
    pub decimals: u8,
    /// Amount scaled by `decimals`.
    pub ui_amount: Decimal,
    /// `ui_amount` formatted without trailing zeros.
    pub ui_amount_string: String,
}

impl TokenBalance {
    /// Balance of an account that does not exist yet.
    pub fn zero(decimals: u8) -> Self {
        Self {
            amount: 0,
            decimals,
            ui_amount: Decimal::ZERO,
            ui_amount_string: "0".to_string(),
        }
    }

    /// Builds a balance from a raw amount and the mint decimals.
    pub fn from_raw(amount: u64, decimals: u8) -> Result<Self, WatchError> {
        let ui_amount = Decimal::try_from_i128_with_scale(i128::from(amount), u32::from(decimals))
            .map_err(|e| {
                WatchError::Decode(format!(
                    "cannot scale amount {amount} by {decimals} decimals: {e}"
                ))
            })?
            .normalize();
        Ok(Self {
            amount,
            decimals,
            ui_amount,
            ui_amount_string: ui_amount.to_string(),
        })
    }

    /// Parses the string amount returned by token balance RPC calls.
    pub fn parse(amount: &str, decimals: u8) -> Result<Self, WatchError> {
        let raw = amount
            .parse::<u64>()
            .map_err(|e| WatchError::Decode(format!("invalid token amount '{amount}': {e}")))?;
        Self::from_raw(raw, decimals)
    }

    /// Whether the raw amount is zero.
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }
}

impl fmt::Display for TokenBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ui_amount_string)
    }
}
