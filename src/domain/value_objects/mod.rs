//! Value Objects for the storefront

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self { Self(id) }
            pub const fn get(self) -> i64 { self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self { Self(id) }
        }
    };
}

define_id!(StoreId);
define_id!(ProductId);
define_id!(DeliveryZoneId);
define_id!(CouponId);
define_id!(OrderId);
define_id!(OrderItemId);

/// Public lookup key of a store
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    pub const MAX_LEN: usize = 64;

    pub fn parse(value: impl Into<String>) -> Result<Self, SlugError> {
        let value = value.into().trim().to_lowercase();
        if value.is_empty() { return Err(SlugError::Empty); }
        if value.len() > Self::MAX_LEN { return Err(SlugError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            return Err(SlugError::InvalidCharacter);
        }
        Ok(Self(value))
    }
    /// The slug exactly as given, or `None` when it is not already in canonical form.
    pub fn lookup(value: &str) -> Option<Self> { Self::parse(value).ok().filter(|slug| slug.0 == value) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(value) }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self { slug.0 }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlugError {
    #[error("slug is empty")]
    Empty,
    #[error("slug is longer than 64 characters")]
    TooLong,
    #[error("slug may only contain lowercase letters, digits and '-'")]
    InvalidCharacter,
}

/// Stock level of a product.
///
/// `None` is untracked: the product never runs out. `Some(n)` is enforced at
/// order time; it reaches `Some(0)` when the last unit sells and stays sold
/// out until restocked. Merchants enter zero or nothing to mean untracked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stock(Option<u32>);

impl Stock {
    pub const fn units(units: u32) -> Self { Self(Some(units)) }

    /// Level as entered by a merchant: zero, negative or nothing is untracked.
    pub fn from_input(units: Option<i32>) -> Self {
        Self(units.and_then(|n| u32::try_from(n).ok()).filter(|&n| n > 0))
    }

    /// Level as persisted: `NULL` is untracked, zero is sold out.
    pub fn from_stored(value: Option<i32>) -> Self { Self(value.and_then(|n| u32::try_from(n).ok())) }

    pub fn to_stored(self) -> Option<i32> { self.0.map(|n| i32::try_from(n).unwrap_or(i32::MAX)) }

    pub const fn remaining(self) -> Option<u32> { self.0 }

    /// Whether `quantity` units can be taken from this level.
    pub fn can_supply(self, quantity: u32) -> bool { self.0.map_or(true, |units| units >= quantity) }

    /// Level after taking `quantity` units, floored at zero.
    pub fn after_taking(self, quantity: u32) -> Self { Self(self.0.map(|units| units.saturating_sub(quantity))) }
}
