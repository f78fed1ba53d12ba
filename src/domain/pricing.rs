//! Order pricing: subtotal, delivery fee, coupon discount and total.
//!
//! Everything here is pure. Zones and coupons arrive already resolved for the
//! ordering store; this module only decides how much they are worth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::aggregates::{Coupon, DeliveryZone};

/// What happens when a requested coupon is unknown, inactive or below its minimum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponPolicy {
    /// Price the order without a discount and record no coupon code.
    #[default]
    Ignore,
    /// Fail the order.
    Reject,
}

/// What happens when the discount pushes the total below zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeTotalPolicy {
    #[default]
    Reject,
    /// Persist the total as computed; it is never clamped.
    Allow,
}

impl FromStr for CouponPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'ignore' or 'reject', got '{other}'")),
        }
    }
}

impl FromStr for NegativeTotalPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "allow" => Ok(Self::Allow),
            other => Err(format!("expected 'reject' or 'allow', got '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    pub coupon: CouponPolicy,
    pub negative_total: NegativeTotalPolicy,
}

/// The priced amounts of one order, ready to be frozen onto it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub subtotal: Decimal,
    pub delivery_zone_name: Option<String>,
    pub delivery_price: Decimal,
    pub coupon_code: Option<String>,
    pub discount_value: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("coupon '{0}' is not valid for this order")]
    CouponRejected(String),
    #[error("order total {0} is negative")]
    NegativeTotal(Decimal),
    #[error("order amounts exceed the supported range")]
    Overflow,
}

/// Sum of `unit_price * quantity` over every line.
pub fn subtotal<I>(lines: I) -> Result<Decimal, PricingError>
where
    I: IntoIterator<Item = (Decimal, u32)>,
{
    lines.into_iter().try_fold(Decimal::ZERO, |sum, (price, quantity)| {
        price
            .checked_mul(Decimal::from(quantity))
            .and_then(|line| sum.checked_add(line))
            .ok_or(PricingError::Overflow)
    })
}

/// Fee for `zone`, waived once `subtotal` reaches the zone's free-delivery threshold.
pub fn delivery_price(subtotal: Decimal, zone: Option<&DeliveryZone>) -> Decimal {
    match zone {
        None => Decimal::ZERO,
        Some(zone) => match zone.min_total_free {
            Some(threshold) if subtotal >= threshold => Decimal::ZERO,
            _ => zone.price,
        },
    }
}

pub fn coupon_applies(coupon: &Coupon, subtotal: Decimal) -> bool {
    coupon.active && coupon.min_total.map_or(true, |floor| subtotal >= floor)
}

pub fn discount(subtotal: Decimal, coupon: Option<&Coupon>) -> Result<Decimal, PricingError> {
    match coupon {
        Some(coupon) if coupon_applies(coupon, subtotal) => subtotal
            .checked_mul(coupon.percent)
            .map(|scaled| scaled / Decimal::ONE_HUNDRED)
            .ok_or(PricingError::Overflow),
        _ => Ok(Decimal::ZERO),
    }
}

/// Price an order without applying any policy.
pub fn quote(subtotal: Decimal, zone: Option<&DeliveryZone>, coupon: Option<&Coupon>) -> Result<Quote, PricingError> {
    let delivery_price = delivery_price(subtotal, zone);
    let applied = coupon.filter(|c| coupon_applies(c, subtotal));
    let discount_value = discount(subtotal, applied)?;
    let total = subtotal
        .checked_add(delivery_price)
        .and_then(|gross| gross.checked_sub(discount_value))
        .ok_or(PricingError::Overflow)?;
    Ok(Quote {
        subtotal,
        delivery_zone_name: zone.map(|z| z.name.clone()),
        delivery_price,
        coupon_code: applied.map(|c| c.code.clone()),
        discount_value,
        total,
    })
}

/// Price an order and enforce `policy`.
///
/// `requested_code` is the code the customer typed; `coupon` is what it resolved
/// to, if anything.
pub fn price_order(
    subtotal: Decimal,
    zone: Option<&DeliveryZone>,
    requested_code: Option<&str>,
    coupon: Option<&Coupon>,
    policy: PricingPolicy,
) -> Result<Quote, PricingError> {
    let quote = quote(subtotal, zone, coupon)?;
    if let Some(code) = requested_code {
        if quote.coupon_code.is_none() && policy.coupon == CouponPolicy::Reject {
            return Err(PricingError::CouponRejected(code.to_string()));
        }
    }
    if quote.total < Decimal::ZERO && policy.negative_total == NegativeTotalPolicy::Reject {
        return Err(PricingError::NegativeTotal(quote.total));
    }
    Ok(quote)
}
