//! Order Aggregate

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::aggregates::store::{Product, Store};
use crate::domain::pricing::Quote;
use crate::domain::value_objects::{OrderId, OrderItemId, ProductId, StoreId};

/// A placed order. Everything except `status` is a snapshot taken at creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub store_id: StoreId,
    /// ISO-8601 UTC timestamp.
    pub created_at: String,
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub customer_note: Option<String>,
    pub delivery_type: DeliveryType,
    pub payment_method: Option<String>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub delivery_zone_name: Option<String>,
    pub delivery_price: Decimal,
    pub coupon_code: Option<String>,
    pub discount_value: Decimal,
    pub total: Decimal,
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Confirmed, Preparing, Dispatched, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Dispatched => "dispatched",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "dispatched" => Ok(Self::Dispatched),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType { #[default] Pickup, Delivery }

impl DeliveryType {
    pub fn as_str(self) -> &'static str {
        match self { Self::Pickup => "pickup", Self::Delivery => "delivery" }
    }
}

impl FromStr for DeliveryType {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pickup" => Ok(Self::Pickup),
            "delivery" => Ok(Self::Delivery),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown value: {0}")]
pub struct UnknownVariant(pub String);

/// Free-form customer details carried onto the order verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub customer_name: Option<String>,
    pub customer_address: Option<String>,
    pub customer_note: Option<String>,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    pub payment_method: Option<String>,
}

/// An order ready to be persisted; storage assigns the ids.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub store_id: StoreId,
    pub created_at: String,
    pub customer: CustomerDetails,
    pub quote: Quote,
    pub items: Vec<NewOrderItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl NewOrderItem {
    /// Snapshot of `product` as it is right now.
    pub fn snapshot(product: &Product, quantity: u32) -> Self {
        Self { product_id: product.id, product_name: product.name.clone(), quantity, unit_price: product.price }
    }
}

impl NewOrder {
    pub fn create(store: &Store, customer: CustomerDetails, quote: Quote, items: Vec<NewOrderItem>, now: DateTime<Utc>) -> Self {
        Self { store_id: store.id, created_at: timestamp(now), customer, quote, items }
    }

    /// The persisted form once ids are known; status always starts as pending.
    pub fn into_order(self, id: OrderId, item_ids: impl IntoIterator<Item = OrderItemId>) -> Order {
        let items = self.items.into_iter().zip(item_ids)
            .map(|(item, item_id)| OrderItem {
                id: item_id, product_id: item.product_id, product_name: item.product_name,
                quantity: item.quantity, unit_price: item.unit_price,
            })
            .collect();
        Order {
            id, store_id: self.store_id, created_at: self.created_at,
            customer_name: self.customer.customer_name, customer_address: self.customer.customer_address,
            customer_note: self.customer.customer_note, delivery_type: self.customer.delivery_type,
            payment_method: self.customer.payment_method, status: OrderStatus::Pending,
            subtotal: self.quote.subtotal, delivery_zone_name: self.quote.delivery_zone_name,
            delivery_price: self.quote.delivery_price, coupon_code: self.quote.coupon_code,
            discount_value: self.quote.discount_value, total: self.quote.total, items,
        }
    }
}

pub fn timestamp(at: DateTime<Utc>) -> String { at.to_rfc3339_opts(SecondsFormat::Micros, true) }

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_text_round_trips() {
        for status in [OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Preparing,
                       OrderStatus::Dispatched, OrderStatus::Delivered, OrderStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
        assert_eq!(serde_json::to_string(&OrderStatus::Pending).unwrap(), "\"pending\"");
    }

    #[test]
    fn test_timestamp_is_utc_iso8601() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let ts = timestamp(at);
        assert_eq!(&ts[..10], "2024-03-09");
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_customer_details_default_to_pickup() {
        let details: CustomerDetails = serde_json::from_str(r#"{"customer_name":"Ana"}"#).unwrap();
        assert_eq!(details.delivery_type, DeliveryType::Pickup);
        assert_eq!(details.customer_name.as_deref(), Some("Ana"));
    }
}
