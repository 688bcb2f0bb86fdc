//! Value Objects for the storefront ledger

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// Monetary amount in the store currency, always held at cent precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money::from_cents(0);

    pub fn new(amount: Decimal) -> Self {
        let mut cents = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        cents.rescale(2);
        Self(cents)
    }
    pub fn from_major(units: i64) -> Self { Self::new(Decimal::from(units)) }
    pub const fn from_cents(cents: u32) -> Self { Self(Decimal::from_parts(cents, 0, 0, false, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_positive(&self) -> bool { self.0 > Decimal::ZERO }
    pub fn multiply(&self, qty: Quantity) -> Money { self.multiply_units(qty.value()) }
    pub fn multiply_units(&self, units: u32) -> Money { Money::new(self.0 * Decimal::from(units)) }
    /// Applies a ratio (e.g. `0.30`) and rounds back to cents.
    pub fn portion(&self, ratio: Decimal) -> Money { Money::new(self.0 * ratio) }
    pub fn checked_add(&self, other: Money) -> Option<Money> { self.0.checked_add(other.0).map(Money) }
    /// `None` when the product leaves the representable range.
    pub fn checked_mul(&self, factor: Decimal) -> Option<Money> { self.0.checked_mul(factor).map(Money::new) }
    pub fn saturating_sub(&self, other: Money) -> Money {
        if other.0 >= self.0 { Money::ZERO } else { Money(self.0 - other.0) }
    }
    /// Amount in minor units (centavos), as payment gateways expect.
    pub fn minor_units(&self) -> i64 {
        (self.0 * Decimal::ONE_HUNDRED).trunc().try_into().unwrap_or(i64::MAX)
    }
}

impl Default for Money {
    fn default() -> Self { Money::ZERO }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Money::new(amount) }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self { money.0 }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Quantity value object; a purchased line always has at least one unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Quantity::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

#[derive(Debug, Clone)] pub enum QuantityError { Zero }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "quantity must be positive") }
}

/// Checkout fingerprint used to collapse repeated submissions of one checkout attempt.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionHash(String);

impl TransactionHash {
    pub fn new(value: impl Into<String>) -> Result<Self, TransactionHashError> {
        let value = value.into().trim().to_string();
        if value.is_empty() { return Err(TransactionHashError::Empty); }
        if value.len() > 128 { return Err(TransactionHashError::TooLong); }
        Ok(Self(value))
    }
    /// Client-style key: `${userId}-${counter}`.
    pub fn for_user(user_id: &str, counter: u64) -> Self { Self(format!("{user_id}-{counter}")) }
    /// Key derived by the server from a digest of the checkout.
    pub fn server_issued(digest: &str) -> Self { Self(format!("srv-{digest}")) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub enum TransactionHashError { Empty, TooLong }
impl std::error::Error for TransactionHashError {}
impl fmt::Display for TransactionHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "transaction hash empty"), Self::TooLong => write!(f, "transaction hash too long") }
    }
}
