//! `PostgreSQL` storage.
//!
//! Order creation runs in one transaction. Product rows are read with
//! `FOR UPDATE`, so concurrent orders touching the same products queue behind
//! each other, and stock is taken with a conditional `UPDATE` that refuses to
//! go below the requested quantity.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;

use super::{CatalogRepository, OrderRepository, Storage, StorageResult, UnitOfWork};
use crate::domain::aggregates::{
    Coupon, CustomerDetails, DeliveryType, DeliveryZone, NewCoupon, NewDeliveryZone, NewOrder, NewProduct, NewStore, Order,
    OrderItem, OrderStatus, Product, ProductUpdate, Store, StoreUpdate,
};
use crate::domain::value_objects::{
    CouponId, DeliveryZoneId, OrderId, OrderItemId, ProductId, Slug, Stock, StoreId,
};
use crate::StorageError;

const STORE_COLUMNS: &str = "id, name, slug, whatsapp_number, logo_url, primary_color";
const PRODUCT_COLUMNS: &str =
    "id, store_id, name, description, price, image_url, category, is_active, stock, min_stock";
const ZONE_COLUMNS: &str = "id, store_id, name, price, min_total_free";
const COUPON_COLUMNS: &str = "id, store_id, code, percent, min_total, active";
const ORDER_COLUMNS: &str = "id, store_id, created_at, customer_name, customer_address, customer_note, \
    delivery_type, payment_method, status, subtotal, delivery_zone_name, delivery_price, coupon_code, \
    discount_value, total";
const ITEM_COLUMNS: &str = "id, order_id, product_id, product_name, quantity, unit_price";

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: i64,
    name: String,
    slug: String,
    whatsapp_number: String,
    logo_url: Option<String>,
    primary_color: Option<String>,
}

impl TryFrom<StoreRow> for Store {
    type Error = StorageError;
    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let slug = Slug::parse(&row.slug)
            .map_err(|e| StorageError::DataCorruption(format!("store {} has invalid slug: {e}", row.id)))?;
        Ok(Self {
            id: StoreId::new(row.id),
            name: row.name,
            slug,
            whatsapp_number: row.whatsapp_number,
            logo_url: row.logo_url,
            primary_color: row.primary_color,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    store_id: i64,
    name: String,
    description: Option<String>,
    price: Decimal,
    image_url: Option<String>,
    category: Option<String>,
    is_active: bool,
    stock: Option<i32>,
    min_stock: i32,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            store_id: StoreId::new(row.store_id),
            name: row.name,
            description: row.description,
            price: row.price,
            image_url: row.image_url,
            category: row.category,
            is_active: row.is_active,
            stock: Stock::from_stored(row.stock),
            min_stock: row.min_stock,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ZoneRow {
    id: i64,
    store_id: i64,
    name: String,
    price: Decimal,
    min_total_free: Option<Decimal>,
}

impl From<ZoneRow> for DeliveryZone {
    fn from(row: ZoneRow) -> Self {
        Self {
            id: DeliveryZoneId::new(row.id),
            store_id: StoreId::new(row.store_id),
            name: row.name,
            price: row.price,
            min_total_free: row.min_total_free,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: i64,
    store_id: i64,
    code: String,
    percent: Decimal,
    min_total: Option<Decimal>,
    active: bool,
}

impl From<CouponRow> for Coupon {
    fn from(row: CouponRow) -> Self {
        Self {
            id: CouponId::new(row.id),
            store_id: StoreId::new(row.store_id),
            code: row.code,
            percent: row.percent,
            min_total: row.min_total,
            active: row.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    store_id: i64,
    created_at: String,
    customer_name: Option<String>,
    customer_address: Option<String>,
    customer_note: Option<String>,
    delivery_type: String,
    payment_method: Option<String>,
    status: String,
    subtotal: Decimal,
    delivery_zone_name: Option<String>,
    delivery_price: Decimal,
    coupon_code: Option<String>,
    discount_value: Decimal,
    total: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> StorageResult<Order> {
        let corrupt = |field: &str, value: &str| {
            StorageError::DataCorruption(format!("order {} has invalid {field} '{value}'", self.id))
        };
        let status = self.status.parse::<OrderStatus>().map_err(|_| corrupt("status", &self.status))?;
        let delivery_type = self.delivery_type.parse::<DeliveryType>().map_err(|_| corrupt("delivery_type", &self.delivery_type))?;
        Ok(Order {
            id: OrderId::new(self.id),
            store_id: StoreId::new(self.store_id),
            created_at: self.created_at,
            customer_name: self.customer_name,
            customer_address: self.customer_address,
            customer_note: self.customer_note,
            delivery_type,
            payment_method: self.payment_method,
            status,
            subtotal: self.subtotal,
            delivery_zone_name: self.delivery_zone_name,
            delivery_price: self.delivery_price,
            coupon_code: self.coupon_code,
            discount_value: self.discount_value,
            total: self.total,
            items,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
    type Error = StorageError;
    fn try_from(row: OrderItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity)
            .map_err(|_| StorageError::DataCorruption(format!("order item {} has quantity {}", row.id, row.quantity)))?;
        Ok(Self {
            id: OrderItemId::new(row.id),
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity,
            unit_price: row.unit_price,
        })
    }
}

fn quantity_param(quantity: u32) -> StorageResult<i32> {
    i32::try_from(quantity).map_err(|_| StorageError::DataCorruption(format!("quantity {quantity} out of range")))
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str, max_connections: u32, acquire_timeout: Duration) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn orders_with_items(&self, rows: Vec<OrderRow>) -> StorageResult<Vec<Order>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_order: HashMap<i64, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id).or_default().push(item.try_into()?);
        }
        rows.into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect()
    }
}

#[async_trait]
impl CatalogRepository for PgStorage {
    async fn create_store(&self, input: NewStore) -> StorageResult<Store> {
        let row = sqlx::query_as::<_, StoreRow>(&format!(
            "INSERT INTO stores (name, slug, whatsapp_number, logo_url, primary_color) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {STORE_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(input.slug.as_str())
        .bind(&input.whatsapp_number)
        .bind(&input.logo_url)
        .bind(&input.primary_color)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_unique_violation() {
                    return StorageError::Conflict(format!("slug '{}' is already in use", input.slug));
                }
            }
            StorageError::Database(e)
        })?;
        row.try_into()
    }

    async fn list_stores(&self) -> StorageResult<Vec<Store>> {
        sqlx::query_as::<_, StoreRow>(&format!("SELECT {STORE_COLUMNS} FROM stores ORDER BY id"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Store::try_from)
            .collect()
    }

    async fn get_store(&self, id: StoreId) -> StorageResult<Option<Store>> {
        sqlx::query_as::<_, StoreRow>(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .map(Store::try_from)
            .transpose()
    }

    async fn get_store_by_slug(&self, slug: &Slug) -> StorageResult<Option<Store>> {
        sqlx::query_as::<_, StoreRow>(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE slug = $1"))
            .bind(slug.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Store::try_from)
            .transpose()
    }

    async fn update_store(&self, id: StoreId, update: StoreUpdate) -> StorageResult<Option<Store>> {
        sqlx::query_as::<_, StoreRow>(&format!(
            "UPDATE stores SET name = COALESCE($2, name), whatsapp_number = COALESCE($3, whatsapp_number), \
             logo_url = COALESCE($4, logo_url), primary_color = COALESCE($5, primary_color) \
             WHERE id = $1 RETURNING {STORE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(&update.name)
        .bind(&update.whatsapp_number)
        .bind(&update.logo_url)
        .bind(&update.primary_color)
        .fetch_optional(&self.pool)
        .await?
        .map(Store::try_from)
        .transpose()
    }

    async fn create_product(&self, store_id: StoreId, input: NewProduct) -> StorageResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (store_id, name, description, price, image_url, category, is_active, stock, min_stock) \
             SELECT id, $2, $3, $4, $5, $6, $7, $8, $9 FROM stores WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(store_id.get())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.image_url)
        .bind(&input.category)
        .bind(input.is_active)
        .bind(Stock::from_input(input.stock).to_stored())
        .bind(input.min_stock)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self, store_id: StoreId, active_only: bool) -> StorageResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE store_id = $1 AND (is_active OR NOT $2) ORDER BY id"
        ))
        .bind(store_id.get())
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> StorageResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET name = COALESCE($2, name), description = COALESCE($3, description), \
             price = COALESCE($4, price), image_url = COALESCE($5, image_url), category = COALESCE($6, category), \
             is_active = COALESCE($7, is_active), stock = CASE WHEN $10 THEN $8 ELSE stock END, \
             min_stock = COALESCE($9, min_stock) WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id.get())
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(&update.image_url)
        .bind(&update.category)
        .bind(update.is_active)
        .bind(update.stock.and_then(|units| Stock::from_input(Some(units)).to_stored()))
        .bind(update.min_stock)
        .bind(update.stock.is_some())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn create_delivery_zone(&self, store_id: StoreId, input: NewDeliveryZone) -> StorageResult<Option<DeliveryZone>> {
        let row = sqlx::query_as::<_, ZoneRow>(&format!(
            "INSERT INTO delivery_zones (store_id, name, price, min_total_free) \
             SELECT id, $2, $3, $4 FROM stores WHERE id = $1 RETURNING {ZONE_COLUMNS}"
        ))
        .bind(store_id.get())
        .bind(&input.name)
        .bind(input.price)
        .bind(input.min_total_free)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(DeliveryZone::from))
    }

    async fn list_delivery_zones(&self, store_id: StoreId) -> StorageResult<Vec<DeliveryZone>> {
        let rows = sqlx::query_as::<_, ZoneRow>(&format!(
            "SELECT {ZONE_COLUMNS} FROM delivery_zones WHERE store_id = $1 ORDER BY id"
        ))
        .bind(store_id.get())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(DeliveryZone::from).collect())
    }

    async fn create_coupon(&self, store_id: StoreId, input: NewCoupon) -> StorageResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "INSERT INTO coupons (store_id, code, percent, min_total, active) \
             SELECT id, $2, $3, $4, $5 FROM stores WHERE id = $1 RETURNING {COUPON_COLUMNS}"
        ))
        .bind(store_id.get())
        .bind(&input.code)
        .bind(input.percent)
        .bind(input.min_total)
        .bind(input.active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Coupon::from))
    }

    async fn list_coupons(&self, store_id: StoreId, active_only: bool) -> StorageResult<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE store_id = $1 AND (active OR NOT $2) ORDER BY id"
        ))
        .bind(store_id.get())
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Coupon::from).collect())
    }
}

#[async_trait]
impl OrderRepository for PgStorage {
    async fn list_orders_by_store(&self, store_id: StoreId) -> StorageResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE store_id = $1 ORDER BY id DESC"
        ))
        .bind(store_id.get())
        .fetch_all(&self.pool)
        .await?;
        self.orders_with_items(rows).await
    }

    async fn get_order(&self, id: OrderId) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        Ok(self.orders_with_items(row.into_iter().collect()).await?.pop())
    }

    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StorageResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.get())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(self.orders_with_items(row.into_iter().collect()).await?.pop())
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// Rolls back on drop unless committed.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn store_by_slug(&mut self, slug: &Slug) -> StorageResult<Option<Store>> {
        sqlx::query_as::<_, StoreRow>(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE slug = $1"))
            .bind(slug.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Store::try_from)
            .transpose()
    }

    async fn products_by_ids(&mut self, store_id: StoreId, ids: &[ProductId]) -> StorageResult<Vec<Product>> {
        let ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE store_id = $1 AND id = ANY($2) ORDER BY id FOR UPDATE"
        ))
        .bind(store_id.get())
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn delivery_zone(&mut self, store_id: StoreId, zone_id: DeliveryZoneId) -> StorageResult<Option<DeliveryZone>> {
        let row = sqlx::query_as::<_, ZoneRow>(&format!(
            "SELECT {ZONE_COLUMNS} FROM delivery_zones WHERE id = $1 AND store_id = $2"
        ))
        .bind(zone_id.get())
        .bind(store_id.get())
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(DeliveryZone::from))
    }

    async fn active_coupon(&mut self, store_id: StoreId, code: &str) -> StorageResult<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE store_id = $1 AND code = $2 AND active ORDER BY id LIMIT 1"
        ))
        .bind(store_id.get())
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Coupon::from))
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> StorageResult<bool> {
        let quantity = quantity_param(quantity)?;
        let result = sqlx::query(
            "UPDATE products SET stock = CASE WHEN stock IS NULL THEN NULL ELSE GREATEST(stock - $2, 0) END \
             WHERE id = $1 AND (stock IS NULL OR stock >= $2)",
        )
        .bind(product_id.get())
        .bind(quantity)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_order(&mut self, order: NewOrder) -> StorageResult<Order> {
        let CustomerDetails { customer_name, customer_address, customer_note, delivery_type, payment_method } =
            &order.customer;
        let (order_id,): (i64,) = sqlx::query_as(
            "INSERT INTO orders (store_id, created_at, customer_name, customer_address, customer_note, \
             delivery_type, payment_method, status, subtotal, delivery_zone_name, delivery_price, coupon_code, \
             discount_value, total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
        )
        .bind(order.store_id.get())
        .bind(&order.created_at)
        .bind(customer_name)
        .bind(customer_address)
        .bind(customer_note)
        .bind(delivery_type.as_str())
        .bind(payment_method)
        .bind(OrderStatus::Pending.as_str())
        .bind(order.quote.subtotal)
        .bind(&order.quote.delivery_zone_name)
        .bind(order.quote.delivery_price)
        .bind(&order.quote.coupon_code)
        .bind(order.quote.discount_value)
        .bind(order.quote.total)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut item_ids = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let (item_id,): (i64,) = sqlx::query_as(
                "INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(order_id)
            .bind(item.product_id.get())
            .bind(&item.product_name)
            .bind(quantity_param(item.quantity)?)
            .bind(item.unit_price)
            .fetch_one(&mut *self.tx)
            .await?;
            item_ids.push(OrderItemId::new(item_id));
        }
        Ok(order.into_order(OrderId::new(order_id), item_ids))
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::PricingPolicy;
    use crate::publisher::EventPublisher;
    use crate::services::orders::{CreateOrderRequest, OrderLine, OrderService};
    use crate::OrderError;
    use std::sync::Arc;

    // These need a migrated PostgreSQL reachable through DATABASE_URL.
    // Every test works in a store with a fresh slug, so runs do not collide.

    async fn storage() -> PgStorage {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/test".into());
        let storage = PgStorage::connect(&database_url, 5, Duration::from_secs(5)).await.unwrap();
        storage.migrate().await.unwrap();
        storage
    }

    struct Demo {
        storage: PgStorage,
        store: Store,
        product: Product,
        zone: DeliveryZoneId,
    }

    async fn demo() -> Demo {
        let storage = storage().await;
        let slug = Slug::parse(format!("pg-{}", uuid::Uuid::new_v4().simple())).unwrap();
        let store = storage
            .create_store(NewStore {
                name: "Demo".into(), slug, whatsapp_number: "5491100000000".into(), logo_url: None, primary_color: None,
            })
            .await
            .unwrap();
        let product = storage
            .create_product(store.id, NewProduct {
                name: "A".into(), description: None, price: Decimal::from(10), image_url: None, category: None,
                is_active: true, stock: Some(5), min_stock: 1,
            })
            .await
            .unwrap()
            .unwrap();
        let zone = storage
            .create_delivery_zone(store.id, NewDeliveryZone {
                name: "local".into(), price: Decimal::from(3), min_total_free: Some(Decimal::from(50)),
            })
            .await
            .unwrap()
            .unwrap();
        storage
            .create_coupon(store.id, NewCoupon {
                code: "SAVE10".into(), percent: Decimal::from(10), min_total: Some(Decimal::from(20)), active: true,
            })
            .await
            .unwrap()
            .unwrap();
        Demo { storage, store, product, zone: zone.id }
    }

    fn service(storage: &PgStorage) -> OrderService {
        OrderService::new(Arc::new(storage.clone()), EventPublisher::disabled(), PricingPolicy::default(), Duration::from_secs(5))
    }

    fn request(demo: &Demo, quantity: u32) -> CreateOrderRequest {
        CreateOrderRequest {
            store_slug: demo.store.slug.as_str().to_owned(),
            items: vec![OrderLine { product_id: demo.product.id, quantity }],
            delivery_zone_id: None,
            coupon_code: None,
            customer: CustomerDetails { customer_name: Some("Ana".into()), ..Default::default() },
        }
    }

    async fn stock_of(demo: &Demo) -> Stock {
        demo.storage.list_products(demo.store.id, false).await.unwrap()
            .into_iter().find(|p| p.id == demo.product.id).unwrap().stock
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_demo_order_is_priced_and_persisted() {
        let demo = demo().await;
        let mut req = request(&demo, 2);
        req.delivery_zone_id = Some(demo.zone);
        req.coupon_code = Some("SAVE10".into());

        let order = service(&demo.storage).create_order(req).await.unwrap();

        assert_eq!(order.subtotal, Decimal::from(20));
        assert_eq!(order.delivery_price, Decimal::from(3));
        assert_eq!(order.discount_value, Decimal::from(2));
        assert_eq!(order.total, Decimal::from(21));
        assert_eq!(stock_of(&demo).await, Stock::units(3));

        let stored = demo.storage.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total, Decimal::from(21));
        assert_eq!(stored.coupon_code.as_deref(), Some("SAVE10"));
        assert_eq!(stored.delivery_zone_name.as_deref(), Some("local"));
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.items[0].quantity, 2);
        assert_eq!(stored.items[0].unit_price, Decimal::from(10));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_insufficient_stock_rolls_back() {
        let demo = demo().await;
        let err = service(&demo.storage).create_order(request(&demo, 6)).await.unwrap_err();
        assert!(matches!(err, OrderError::InsufficientStock(ref name) if name == "A"));
        assert_eq!(stock_of(&demo).await, Stock::units(5));
        assert!(demo.storage.list_orders_by_store(demo.store.id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_concurrent_orders_for_last_unit() {
        let demo = demo().await;
        demo.storage
            .update_product(demo.product.id, ProductUpdate { stock: Some(1), ..Default::default() })
            .await
            .unwrap();
        let svc = service(&demo.storage);
        let (a, b) = tokio::join!(
            tokio::spawn({ let svc = svc.clone(); let req = request(&demo, 1); async move { svc.create_order(req).await } }),
            tokio::spawn({ let svc = svc.clone(); let req = request(&demo, 1); async move { svc.create_order(req).await } }),
        );
        let results = [a.unwrap(), b.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(OrderError::InsufficientStock(_)))));
        assert_eq!(stock_of(&demo).await, Stock::units(0));
        assert_eq!(demo.storage.list_orders_by_store(demo.store.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_duplicate_slug_is_conflict() {
        let demo = demo().await;
        let err = demo
            .storage
            .create_store(NewStore {
                name: "Other".into(), slug: demo.store.slug.clone(), whatsapp_number: "1".into(),
                logo_url: None, primary_color: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_conditional_decrement() {
        let demo = demo().await;
        let untracked = demo
            .storage
            .create_product(demo.store.id, NewProduct {
                name: "B".into(), description: None, price: Decimal::from(1), image_url: None, category: None,
                is_active: true, stock: None, min_stock: 0,
            })
            .await
            .unwrap()
            .unwrap();
        demo.storage
            .update_product(demo.product.id, ProductUpdate { stock: Some(2), ..Default::default() })
            .await
            .unwrap();

        let mut uow = demo.storage.begin().await.unwrap();
        assert!(!uow.decrement_stock(demo.product.id, 3).await.unwrap());
        assert!(uow.decrement_stock(demo.product.id, 2).await.unwrap());
        assert!(!uow.decrement_stock(demo.product.id, 1).await.unwrap());
        assert!(uow.decrement_stock(untracked.id, 99).await.unwrap());
        uow.commit().await.unwrap();

        assert_eq!(stock_of(&demo).await, Stock::units(0));
        let products = demo.storage.list_products(demo.store.id, false).await.unwrap();
        let b = products.into_iter().find(|p| p.id == untracked.id).unwrap();
        assert_eq!(b.stock, Stock::default());
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_dropped_unit_of_work_rolls_back() {
        let demo = demo().await;
        {
            let mut uow = demo.storage.begin().await.unwrap();
            let store = uow.store_by_slug(&demo.store.slug).await.unwrap().unwrap();
            let products = uow.products_by_ids(store.id, &[demo.product.id]).await.unwrap();
            assert_eq!(products.len(), 1);
            assert!(uow.decrement_stock(demo.product.id, 4).await.unwrap());
        }
        assert_eq!(stock_of(&demo).await, Stock::units(5));
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL instance"]
    async fn test_postgres_product_stock_update() {
        let demo = demo().await;
        let update = |stock| ProductUpdate { stock, ..Default::default() };

        let product = demo.storage.update_product(demo.product.id, update(Some(0))).await.unwrap().unwrap();
        assert_eq!(product.stock, Stock::default());

        let product = demo
            .storage
            .update_product(demo.product.id, ProductUpdate { name: Some("A2".into()), ..Default::default() })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.name, "A2");
        assert_eq!(product.stock, Stock::default());

        let product = demo.storage.update_product(demo.product.id, update(Some(7))).await.unwrap().unwrap();
        assert_eq!(product.stock, Stock::units(7));

        let product = demo.storage.update_product(demo.product.id, update(None)).await.unwrap().unwrap();
        assert_eq!(product.stock, Stock::units(7));
    }
}
