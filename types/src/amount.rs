//! Token amount type for fees, rewards and treasury balances.
//!
//! Amounts are fixed-point integers (u128) in the token's smallest unit, so
//! every split in the settlement path is exact integer arithmetic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;

use crate::treasury::BPS_DENOMINATOR;

/// A CPT token amount in raw units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn checked_mul(self, factor: u128) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    /// The share of this amount expressed in basis points, rounded down.
    ///
    /// Returns `None` on overflow or when `bps` exceeds 10 000.
    pub fn share_bps(self, bps: u32) -> Option<Self> {
        if bps > BPS_DENOMINATOR {
            return None;
        }
        self.0
            .checked_mul(u128::from(bps))
            .map(|scaled| Self(scaled / u128::from(BPS_DENOMINATOR)))
    }

    /// Split this amount into `parts` equal shares.
    ///
    /// Returns `(share, remainder)` where `share * parts + remainder == self`.
    /// Splitting into zero parts yields no share and the whole amount as remainder.
    pub fn split_even(self, parts: usize) -> (Self, Self) {
        if parts == 0 {
            return (Self::ZERO, self);
        }
        let parts = parts as u128;
        (Self(self.0 / parts), Self(self.0 % parts))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, a| acc + a)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} CPT", self.0)
    }
}
