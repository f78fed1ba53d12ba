//! Storage for catalog and orders.
//!
//! # Backends
//!
//! - [`memory::MemoryStorage`] - process-local, one lock per store
//! - [`postgres::PgStorage`] - `PostgreSQL` through sqlx
//!
//! Plain reads and catalog writes go through [`CatalogRepository`] and
//! [`OrderRepository`]. Order creation runs inside a [`UnitOfWork`]: every
//! write made through it becomes visible on [`UnitOfWork::commit`] or not at
//! all. Dropping an uncommitted unit of work rolls it back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::domain::aggregates::{
    Coupon, DeliveryZone, NewCoupon, NewDeliveryZone, NewOrder, NewProduct, NewStore, Order, OrderStatus,
    Product, ProductUpdate, Store, StoreUpdate,
};
use crate::domain::value_objects::{DeliveryZoneId, OrderId, ProductId, Slug, StoreId};
use crate::StorageError;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Fails with [`StorageError::Conflict`] when the slug is taken.
    async fn create_store(&self, input: NewStore) -> StorageResult<Store>;
    async fn list_stores(&self) -> StorageResult<Vec<Store>>;
    async fn get_store(&self, id: StoreId) -> StorageResult<Option<Store>>;
    async fn get_store_by_slug(&self, slug: &Slug) -> StorageResult<Option<Store>>;
    async fn update_store(&self, id: StoreId, update: StoreUpdate) -> StorageResult<Option<Store>>;

    /// `None` when the store does not exist.
    async fn create_product(&self, store_id: StoreId, input: NewProduct) -> StorageResult<Option<Product>>;
    async fn list_products(&self, store_id: StoreId, active_only: bool) -> StorageResult<Vec<Product>>;
    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> StorageResult<Option<Product>>;

    async fn create_delivery_zone(&self, store_id: StoreId, input: NewDeliveryZone) -> StorageResult<Option<DeliveryZone>>;
    async fn list_delivery_zones(&self, store_id: StoreId) -> StorageResult<Vec<DeliveryZone>>;

    async fn create_coupon(&self, store_id: StoreId, input: NewCoupon) -> StorageResult<Option<Coupon>>;
    async fn list_coupons(&self, store_id: StoreId, active_only: bool) -> StorageResult<Vec<Coupon>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Newest first, items included.
    async fn list_orders_by_store(&self, store_id: StoreId) -> StorageResult<Vec<Order>>;
    async fn get_order(&self, id: OrderId) -> StorageResult<Option<Order>>;
    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StorageResult<Option<Order>>;
}

/// One atomic order-creation scope.
///
/// Reads see the state as of the first call to [`UnitOfWork::store_by_slug`]
/// plus this unit's own writes. Stock reads and decrements for a store are
/// serialized against every other unit of work touching that store.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Resolves the store and brings it into this unit's scope.
    async fn store_by_slug(&mut self, slug: &Slug) -> StorageResult<Option<Store>>;

    /// Products of `store_id` among `ids`. Unknown ids and ids of other stores are skipped.
    async fn products_by_ids(&mut self, store_id: StoreId, ids: &[ProductId]) -> StorageResult<Vec<Product>>;

    async fn delivery_zone(&mut self, store_id: StoreId, zone_id: DeliveryZoneId) -> StorageResult<Option<DeliveryZone>>;

    /// First active coupon of the store with exactly this code.
    async fn active_coupon(&mut self, store_id: StoreId, code: &str) -> StorageResult<Option<Coupon>>;

    /// Takes `quantity` units from a product, floored at zero.
    ///
    /// Returns `false`, leaving stock untouched, when the stock is tracked
    /// and holds fewer than `quantity` units. Untracked stock always succeeds.
    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> StorageResult<bool>;

    async fn insert_order(&mut self, order: NewOrder) -> StorageResult<Order>;

    async fn commit(self: Box<Self>) -> StorageResult<()>;
}

#[async_trait]
pub trait Storage: CatalogRepository + OrderRepository {
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>>;
}
