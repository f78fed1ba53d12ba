//! Order creation.
//!
//! One call to [`OrderService::create_order`] is one unit of work: the store is
//! locked, products are resolved and checked for stock, the order is priced,
//! stock is taken and the order is written. Any failure before the commit
//! leaves nothing behind.

use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{CustomerDetails, NewOrder, NewOrderItem, Order, Product};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::{self, PricingPolicy};
use crate::domain::value_objects::{DeliveryZoneId, ProductId, Slug};
use crate::publisher::EventPublisher;
use crate::storage::{Storage, UnitOfWork};
use crate::{OrderError, Result, StorageError};

/// Largest quantity of one product a single order may take.
pub const MAX_QUANTITY: u32 = i32::MAX as u32;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub store_slug: String,
    pub items: Vec<OrderLine>,
    pub delivery_zone_id: Option<DeliveryZoneId>,
    pub coupon_code: Option<String>,
    #[serde(flatten)]
    pub customer: CustomerDetails,
}

#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct OrderLine {
    pub product_id: ProductId,
    #[validate(range(min = 1, max = 2147483647, message = "quantity must be between 1 and 2147483647"))]
    pub quantity: u32,
}

impl CreateOrderRequest {
    fn check(&self) -> Result<()> {
        if self.items.is_empty() {
            return Err(OrderError::Validation("order must contain at least one item".into()));
        }
        for line in &self.items {
            line.validate()
                .map_err(|e| OrderError::Validation(format!("product {}: {e}", line.product_id)))?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct OrderService {
    storage: Arc<dyn Storage>,
    publisher: EventPublisher,
    policy: PricingPolicy,
    timeout: Duration,
}

impl OrderService {
    pub fn new(storage: Arc<dyn Storage>, publisher: EventPublisher, policy: PricingPolicy, timeout: Duration) -> Self {
        Self { storage, publisher, policy, timeout }
    }

    /// Validate, price and persist one order.
    ///
    /// The whole operation is bounded by the configured storage timeout;
    /// expiry surfaces as [`StorageError::Timeout`] with nothing persisted.
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order> {
        let span = info_span!("create_order", request_id = %Uuid::new_v4(), store = %request.store_slug);
        async move {
            if let Err(e) = request.check() {
                warn!(error = %e, "order rejected");
                return Err(e);
            }

            let result = match tokio::time::timeout(self.timeout, self.place(request)).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Timeout(self.timeout).into()),
            };
            let order = match result {
                Ok(order) => order,
                Err(e) if e.is_retryable() => {
                    error!(error = %e, "order not persisted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "order rejected");
                    return Err(e);
                }
            };
            info!(order_id = %order.id, total = %order.total, items = order.items.len(), "order created");
            self.publisher.publish(&OrderEvent::created(&order)).await;
            Ok(order)
        }
        .instrument(span)
        .await
    }

    async fn place(&self, request: CreateOrderRequest) -> Result<Order> {
        let CreateOrderRequest { store_slug, items, delivery_zone_id, coupon_code, customer } = request;
        let not_found = || OrderError::NotFound(format!("store '{store_slug}'"));
        let slug = Slug::lookup(&store_slug).ok_or_else(not_found)?;

        let mut uow: Box<dyn UnitOfWork> = self.storage.begin().await?;
        let store = uow.store_by_slug(&slug).await?.ok_or_else(not_found)?;

        // Quantities summed per product so repeated lines cannot jointly oversell.
        let mut requested: BTreeMap<ProductId, u32> = BTreeMap::new();
        for line in &items {
            let total = requested.entry(line.product_id).or_default();
            *total = total.checked_add(line.quantity).filter(|&sum| sum <= MAX_QUANTITY).ok_or_else(|| {
                OrderError::Validation(format!("total quantity of product {} exceeds {MAX_QUANTITY}", line.product_id))
            })?;
        }
        let ids: Vec<ProductId> = requested.keys().copied().collect();
        let products: HashMap<ProductId, Product> = uow
            .products_by_ids(store.id, &ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        if products.len() < ids.len() {
            let missing: Vec<String> = ids.iter().filter(|id| !products.contains_key(id)).map(|id| id.to_string()).collect();
            return Err(OrderError::Validation(format!("product not found: {}", missing.join(", "))));
        }
        let product = |id: &ProductId| {
            products.get(id).ok_or_else(|| OrderError::Validation(format!("product not found: {id}")))
        };

        for (id, quantity) in &requested {
            let found = product(id)?;
            if !found.stock.can_supply(*quantity) {
                return Err(OrderError::InsufficientStock(found.name.clone()));
            }
        }

        let mut lines = Vec::with_capacity(items.len());
        for line in &items {
            lines.push(NewOrderItem::snapshot(product(&line.product_id)?, line.quantity));
        }
        let subtotal = pricing::subtotal(lines.iter().map(|l| (l.unit_price, l.quantity)))
            .map_err(|e| OrderError::Validation(e.to_string()))?;

        let zone = match delivery_zone_id {
            Some(zone_id) => Some(
                uow.delivery_zone(store.id, zone_id)
                    .await?
                    .ok_or_else(|| OrderError::Validation(format!("delivery zone {zone_id} is not valid for this store")))?,
            ),
            None => None,
        };

        let code = coupon_code.as_deref().filter(|c| !c.is_empty());
        let coupon = match code {
            Some(code) => uow.active_coupon(store.id, code).await?,
            None => None,
        };

        let quote = pricing::price_order(subtotal, zone.as_ref(), code, coupon.as_ref(), self.policy)
            .map_err(|e| OrderError::Validation(e.to_string()))?;
        let new_order = NewOrder::create(&store, customer, quote, lines, Utc::now());

        for (id, quantity) in &requested {
            if !uow.decrement_stock(*id, *quantity).await? {
                return Err(OrderError::InsufficientStock(product(id)?.name.clone()));
            }
        }

        let order = uow.insert_order(new_order).await?;
        uow.commit().await?;
        Ok(order)
    }
}
