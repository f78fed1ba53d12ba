//! Route handlers. Each one is a thin call into storage or a service.

use std::future::Future;

use axum::{
    async_trait,
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use validator::Validate;

use super::error::ApiError;
use super::AppState;
use crate::domain::aggregates::{
    Coupon, DeliveryZone, NewCoupon, NewDeliveryZone, NewProduct, NewStore, Order, OrderStatus, Product,
    ProductUpdate, Store, StoreUpdate,
};
use crate::domain::value_objects::{OrderId, ProductId, Slug, StoreId};
use crate::services::{stats, CreateOrderRequest, StatsSummary};
use crate::storage::{CatalogRepository, OrderRepository, StorageResult};
use crate::StorageError;

type ApiResult<T> = Result<T, ApiError>;

/// JSON body whose decoding failures answer 400 with a `detail`.
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

impl AppState {
    /// Run one storage call under the configured timeout.
    async fn bounded<T>(&self, call: impl Future<Output = StorageResult<T>>) -> ApiResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StorageError::Timeout(self.timeout).into()),
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "storefront-orders"}))
}

// =============================================================================
// Stores
// =============================================================================

pub async fn create_store(State(s): State<AppState>, Payload(r): Payload<NewStore>) -> ApiResult<(StatusCode, Json<Store>)> {
    r.validate()?;
    let store = s.bounded(s.storage.create_store(r)).await?;
    Ok((StatusCode::CREATED, Json(store)))
}

pub async fn list_stores(State(s): State<AppState>) -> ApiResult<Json<Vec<Store>>> {
    Ok(Json(s.bounded(s.storage.list_stores()).await?))
}

pub async fn get_store(State(s): State<AppState>, Path(id): Path<StoreId>) -> ApiResult<Json<Store>> {
    s.bounded(s.storage.get_store(id)).await?.map(Json).ok_or_else(|| ApiError::not_found(format!("store {id}")))
}

pub async fn update_store(State(s): State<AppState>, Path(id): Path<StoreId>, Payload(r): Payload<StoreUpdate>) -> ApiResult<Json<Store>> {
    r.validate()?;
    s.bounded(s.storage.update_store(id, r)).await?.map(Json).ok_or_else(|| ApiError::not_found(format!("store {id}")))
}

// =============================================================================
// Catalog
// =============================================================================

pub async fn create_product(State(s): State<AppState>, Path(id): Path<StoreId>, Payload(r): Payload<NewProduct>) -> ApiResult<(StatusCode, Json<Product>)> {
    r.validate()?;
    let product = s.bounded(s.storage.create_product(id, r)).await?.ok_or_else(|| ApiError::not_found(format!("store {id}")))?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list_products(State(s): State<AppState>, Path(id): Path<StoreId>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(s.bounded(s.storage.list_products(id, false)).await?))
}

pub async fn update_product(State(s): State<AppState>, Path(id): Path<ProductId>, Payload(r): Payload<ProductUpdate>) -> ApiResult<Json<Product>> {
    r.validate()?;
    s.bounded(s.storage.update_product(id, r)).await?.map(Json).ok_or_else(|| ApiError::not_found(format!("product {id}")))
}

pub async fn create_delivery_zone(State(s): State<AppState>, Path(id): Path<StoreId>, Payload(r): Payload<NewDeliveryZone>) -> ApiResult<(StatusCode, Json<DeliveryZone>)> {
    r.validate()?;
    let zone = s.bounded(s.storage.create_delivery_zone(id, r)).await?.ok_or_else(|| ApiError::not_found(format!("store {id}")))?;
    Ok((StatusCode::CREATED, Json(zone)))
}

pub async fn list_delivery_zones(State(s): State<AppState>, Path(id): Path<StoreId>) -> ApiResult<Json<Vec<DeliveryZone>>> {
    Ok(Json(s.bounded(s.storage.list_delivery_zones(id)).await?))
}

pub async fn create_coupon(State(s): State<AppState>, Path(id): Path<StoreId>, Payload(r): Payload<NewCoupon>) -> ApiResult<(StatusCode, Json<Coupon>)> {
    r.validate()?;
    let coupon = s.bounded(s.storage.create_coupon(id, r)).await?.ok_or_else(|| ApiError::not_found(format!("store {id}")))?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

pub async fn list_coupons(State(s): State<AppState>, Path(id): Path<StoreId>) -> ApiResult<Json<Vec<Coupon>>> {
    Ok(Json(s.bounded(s.storage.list_coupons(id, false)).await?))
}

/// What a shopper sees of a store.
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub store: Store,
    pub products: Vec<Product>,
    pub delivery_zones: Vec<DeliveryZone>,
    pub coupons: Vec<Coupon>,
}

pub async fn public_catalog(State(s): State<AppState>, Path(slug): Path<String>) -> ApiResult<Json<CatalogResponse>> {
    let not_found = || ApiError::not_found(format!("store '{slug}'"));
    let parsed = Slug::lookup(&slug).ok_or_else(not_found)?;
    let store = s.bounded(s.storage.get_store_by_slug(&parsed)).await?.ok_or_else(not_found)?;
    let products = s.bounded(s.storage.list_products(store.id, true)).await?;
    let delivery_zones = s.bounded(s.storage.list_delivery_zones(store.id)).await?;
    let coupons = s.bounded(s.storage.list_coupons(store.id, true)).await?;
    Ok(Json(CatalogResponse { store, products, delivery_zones, coupons }))
}

// =============================================================================
// Orders
// =============================================================================

pub async fn create_order(State(s): State<AppState>, Payload(r): Payload<CreateOrderRequest>) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = s.orders.create_order(r).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn get_order(State(s): State<AppState>, Path(id): Path<OrderId>) -> ApiResult<Json<Order>> {
    s.bounded(s.storage.get_order(id)).await?.map(Json).ok_or_else(|| ApiError::not_found(format!("order {id}")))
}

pub async fn list_orders(State(s): State<AppState>, Path(id): Path<StoreId>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(s.bounded(s.storage.list_orders_by_store(id)).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

pub async fn update_order_status(State(s): State<AppState>, Path(id): Path<OrderId>, Payload(r): Payload<StatusUpdate>) -> ApiResult<Json<Order>> {
    let order = s.bounded(s.storage.update_order_status(id, r.status)).await?.ok_or_else(|| ApiError::not_found(format!("order {id}")))?;
    tracing::info!(order_id = %id, status = %order.status, "order status updated");
    Ok(Json(order))
}

pub async fn stats_summary(State(s): State<AppState>, Path(id): Path<StoreId>) -> ApiResult<Json<StatsSummary>> {
    let today = Utc::now().date_naive();
    Ok(Json(s.bounded(stats::summary(s.storage.as_ref(), id, today)).await?))
}
