//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::Order;
use crate::domain::value_objects::{OrderId, StoreId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: OrderId, store_id: StoreId, total: Decimal, item_count: usize, created_at: String },
}

impl OrderEvent {
    pub fn created(order: &Order) -> Self {
        Self::Created {
            order_id: order.id,
            store_id: order.store_id,
            total: order.total,
            item_count: order.items.len(),
            created_at: order.created_at.clone(),
        }
    }

    /// Subject suffix the event is published under.
    pub fn subject(&self) -> &'static str {
        match self { Self::Created { .. } => "orders.created" }
    }
}
