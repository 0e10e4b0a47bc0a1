//! Token amounts and prices.
//!
//! [`TokenAmount`] is an amount in the asset's smallest unit, serialized as a
//! decimal string like every x402 amount field. [`Price`] is what an operator
//! configures: either a human money amount (`"0.10"`, `"$0.10"`) converted with
//! the asset's decimals, or an already-atomic amount.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// An amount in the smallest unit of a token (e.g. `100000` = 0.1 USDC).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(pub U256);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: Self = Self(U256::ZERO);

    /// Multiplies the amount by `factor`, returning `None` on overflow.
    #[must_use]
    pub fn checked_mul(self, factor: u64) -> Option<Self> {
        self.0.checked_mul(U256::from(factor)).map(Self)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl Display for TokenAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::InvalidAtomic(s.to_owned()));
        }
        U256::from_str_radix(s, 10)
            .map(Self)
            .map_err(|_| AmountError::Overflow)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors converting a configured price into an atomic token amount.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountError {
    /// The price is below zero.
    #[error("price must not be negative: {0}")]
    Negative(Decimal),
    /// The price has more fractional digits than the asset supports.
    #[error("price {price} has more than {decimals} fractional digits")]
    TooPrecise {
        /// The offending price.
        price: Decimal,
        /// Decimals of the asset.
        decimals: u8,
    },
    /// The converted or scaled amount does not fit in 256 bits.
    #[error("amount overflows 256 bits")]
    Overflow,
    /// Not a base-10 unsigned integer.
    #[error("invalid atomic amount: {0:?}")]
    InvalidAtomic(String),
    /// Not a decimal money amount.
    #[error("invalid money amount: {0:?}")]
    InvalidMoney(String),
}

/// A price as configured by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Price {
    /// A human amount in whole token units (e.g. `0.10` USDC).
    Money(Decimal),
    /// An amount already expressed in the asset's smallest unit.
    Atomic(TokenAmount),
}

impl Price {
    /// Converts the price to atomic units of an asset with `decimals` decimals.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if the price is negative, carries more
    /// fractional digits than the asset allows, or overflows.
    pub fn to_atomic(&self, decimals: u8) -> Result<TokenAmount, AmountError> {
        let money = match self {
            Self::Atomic(amount) => return Ok(*amount),
            Self::Money(money) => money.normalize(),
        };
        if money.is_sign_negative() && !money.is_zero() {
            return Err(AmountError::Negative(money));
        }
        let scale = money.scale();
        if scale > u32::from(decimals) {
            return Err(AmountError::TooPrecise {
                price: money,
                decimals,
            });
        }
        let mantissa = money.mantissa().unsigned_abs();
        let factor = U256::from(10u8)
            .checked_pow(U256::from(u32::from(decimals) - scale))
            .ok_or(AmountError::Overflow)?;
        U256::from(mantissa)
            .checked_mul(factor)
            .map(TokenAmount)
            .ok_or(AmountError::Overflow)
    }

    /// Scales the price by a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Overflow`] if the product does not fit.
    pub fn times(&self, quantity: u32) -> Result<Self, AmountError> {
        match self {
            Self::Money(money) => money
                .checked_mul(Decimal::from(quantity))
                .map(Self::Money)
                .ok_or(AmountError::Overflow),
            Self::Atomic(amount) => amount
                .checked_mul(u64::from(quantity))
                .map(Self::Atomic)
                .ok_or(AmountError::Overflow),
        }
    }
}

impl FromStr for Price {
    type Err = AmountError;

    /// Parses a money amount, optionally prefixed with `$`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('$').unwrap_or(trimmed).trim();
        Decimal::from_str(digits)
            .map(Self::Money)
            .map_err(|_| AmountError::InvalidMoney(s.to_owned()))
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Money(money) => write!(f, "${money}"),
            Self::Atomic(amount) => write!(f, "{amount} atomic units"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PriceWire {
    Money(String),
    Atomic(u64),
}

/// Strings are money amounts, bare integers are atomic amounts.
impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match PriceWire::deserialize(deserializer)? {
            PriceWire::Money(s) => s.parse().map_err(serde::de::Error::custom),
            PriceWire::Atomic(n) => Ok(Self::Atomic(TokenAmount::from(n))),
        }
    }
}
