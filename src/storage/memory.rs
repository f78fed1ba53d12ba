//! Process-local storage.
//!
//! Each store's records sit behind their own `tokio::sync::Mutex`. A unit of
//! work takes that lock when it resolves the store and keeps it until it is
//! committed or dropped, so order creation is serialized per store while
//! different stores proceed in parallel. Writes go to a private copy that
//! replaces the store's state on commit.
//!
//! Lock order: the registry lock is never held while waiting on a store lock.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[cfg(test)]
use std::sync::atomic::AtomicBool;

use super::{CatalogRepository, OrderRepository, Storage, StorageResult, UnitOfWork};
use crate::domain::aggregates::{
    Coupon, DeliveryZone, NewCoupon, NewDeliveryZone, NewOrder, NewProduct, NewStore, Order, OrderStatus,
    Product, ProductUpdate, Store, StoreUpdate,
};
use crate::domain::value_objects::{
    CouponId, DeliveryZoneId, OrderId, OrderItemId, ProductId, Slug, Stock, StoreId,
};
use crate::StorageError;

#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    registry: RwLock<Registry>,
    sequences: Sequences,
    #[cfg(test)]
    fail_order_inserts: AtomicBool,
}

#[derive(Default)]
struct Registry {
    tenants: HashMap<StoreId, Arc<Mutex<Tenant>>>,
    slugs: HashMap<Slug, StoreId>,
    product_owners: HashMap<ProductId, StoreId>,
    order_owners: HashMap<OrderId, StoreId>,
}

/// Id arenas, one per record kind. Ids are never reused, even after a rollback.
#[derive(Default)]
struct Sequences {
    store: AtomicI64,
    product: AtomicI64,
    zone: AtomicI64,
    coupon: AtomicI64,
    order: AtomicI64,
    order_item: AtomicI64,
}

fn next(seq: &AtomicI64) -> i64 { seq.fetch_add(1, Ordering::Relaxed) + 1 }

struct Tenant {
    store: Store,
    products: BTreeMap<ProductId, Product>,
    zones: BTreeMap<DeliveryZoneId, DeliveryZone>,
    coupons: Vec<Coupon>,
    orders: Vec<Order>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    async fn tenant(&self, id: StoreId) -> Option<Arc<Mutex<Tenant>>> {
        self.inner.registry.read().await.tenants.get(&id).cloned()
    }

    async fn tenant_by_slug(&self, slug: &Slug) -> Option<Arc<Mutex<Tenant>>> {
        let registry = self.inner.registry.read().await;
        registry.slugs.get(slug).and_then(|id| registry.tenants.get(id)).cloned()
    }

    /// Make every following order insert fail, for exercising rollback.
    #[cfg(test)]
    pub fn fail_order_inserts(&self, fail: bool) { self.inner.fail_order_inserts.store(fail, Ordering::SeqCst); }
}

#[async_trait]
impl CatalogRepository for MemoryStorage {
    async fn create_store(&self, input: NewStore) -> StorageResult<Store> {
        let mut registry = self.inner.registry.write().await;
        if registry.slugs.contains_key(&input.slug) {
            return Err(StorageError::Conflict(format!("slug '{}' is already in use", input.slug)));
        }
        let store = Store {
            id: StoreId::new(next(&self.inner.sequences.store)),
            name: input.name,
            slug: input.slug,
            whatsapp_number: input.whatsapp_number,
            logo_url: input.logo_url,
            primary_color: input.primary_color,
        };
        let tenant = Tenant {
            store: store.clone(), products: BTreeMap::new(), zones: BTreeMap::new(), coupons: vec![], orders: vec![],
        };
        registry.slugs.insert(store.slug.clone(), store.id);
        registry.tenants.insert(store.id, Arc::new(Mutex::new(tenant)));
        Ok(store)
    }

    async fn list_stores(&self) -> StorageResult<Vec<Store>> {
        let tenants: Vec<_> = self.inner.registry.read().await.tenants.values().cloned().collect();
        let mut stores = Vec::with_capacity(tenants.len());
        for tenant in tenants {
            stores.push(tenant.lock().await.store.clone());
        }
        stores.sort_by_key(|s| s.id);
        Ok(stores)
    }

    async fn get_store(&self, id: StoreId) -> StorageResult<Option<Store>> {
        match self.tenant(id).await {
            Some(tenant) => Ok(Some(tenant.lock().await.store.clone())),
            None => Ok(None),
        }
    }

    async fn get_store_by_slug(&self, slug: &Slug) -> StorageResult<Option<Store>> {
        match self.tenant_by_slug(slug).await {
            Some(tenant) => Ok(Some(tenant.lock().await.store.clone())),
            None => Ok(None),
        }
    }

    async fn update_store(&self, id: StoreId, update: StoreUpdate) -> StorageResult<Option<Store>> {
        let Some(tenant) = self.tenant(id).await else { return Ok(None) };
        let mut tenant = tenant.lock().await;
        update.apply(&mut tenant.store);
        Ok(Some(tenant.store.clone()))
    }

    async fn create_product(&self, store_id: StoreId, input: NewProduct) -> StorageResult<Option<Product>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(None) };
        let product = Product {
            id: ProductId::new(next(&self.inner.sequences.product)),
            store_id,
            name: input.name,
            description: input.description,
            price: input.price,
            image_url: input.image_url,
            category: input.category,
            is_active: input.is_active,
            stock: Stock::from_input(input.stock),
            min_stock: input.min_stock,
        };
        tenant.lock().await.products.insert(product.id, product.clone());
        self.inner.registry.write().await.product_owners.insert(product.id, store_id);
        Ok(Some(product))
    }

    async fn list_products(&self, store_id: StoreId, active_only: bool) -> StorageResult<Vec<Product>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(vec![]) };
        let tenant = tenant.lock().await;
        Ok(tenant.products.values().filter(|p| !active_only || p.is_active).cloned().collect())
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> StorageResult<Option<Product>> {
        let owner = self.inner.registry.read().await.product_owners.get(&id).copied();
        let Some(tenant) = (match owner { Some(store_id) => self.tenant(store_id).await, None => None }) else {
            return Ok(None);
        };
        let mut tenant = tenant.lock().await;
        let Some(product) = tenant.products.get_mut(&id) else { return Ok(None) };
        update.apply(product);
        Ok(Some(product.clone()))
    }

    async fn create_delivery_zone(&self, store_id: StoreId, input: NewDeliveryZone) -> StorageResult<Option<DeliveryZone>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(None) };
        let zone = DeliveryZone {
            id: DeliveryZoneId::new(next(&self.inner.sequences.zone)),
            store_id,
            name: input.name,
            price: input.price,
            min_total_free: input.min_total_free,
        };
        tenant.lock().await.zones.insert(zone.id, zone.clone());
        Ok(Some(zone))
    }

    async fn list_delivery_zones(&self, store_id: StoreId) -> StorageResult<Vec<DeliveryZone>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(vec![]) };
        let zones = tenant.lock().await.zones.values().cloned().collect();
        Ok(zones)
    }

    async fn create_coupon(&self, store_id: StoreId, input: NewCoupon) -> StorageResult<Option<Coupon>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(None) };
        let coupon = Coupon {
            id: CouponId::new(next(&self.inner.sequences.coupon)),
            store_id,
            code: input.code,
            percent: input.percent,
            min_total: input.min_total,
            active: input.active,
        };
        tenant.lock().await.coupons.push(coupon.clone());
        Ok(Some(coupon))
    }

    async fn list_coupons(&self, store_id: StoreId, active_only: bool) -> StorageResult<Vec<Coupon>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(vec![]) };
        let tenant = tenant.lock().await;
        Ok(tenant.coupons.iter().filter(|c| !active_only || c.active).cloned().collect())
    }
}

#[async_trait]
impl OrderRepository for MemoryStorage {
    async fn list_orders_by_store(&self, store_id: StoreId) -> StorageResult<Vec<Order>> {
        let Some(tenant) = self.tenant(store_id).await else { return Ok(vec![]) };
        let mut orders = tenant.lock().await.orders.clone();
        orders.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(orders)
    }

    async fn get_order(&self, id: OrderId) -> StorageResult<Option<Order>> {
        let owner = self.inner.registry.read().await.order_owners.get(&id).copied();
        let Some(tenant) = (match owner { Some(store_id) => self.tenant(store_id).await, None => None }) else {
            return Ok(None);
        };
        let order = tenant.lock().await.orders.iter().find(|o| o.id == id).cloned();
        Ok(order)
    }

    async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> StorageResult<Option<Order>> {
        let owner = self.inner.registry.read().await.order_owners.get(&id).copied();
        let Some(tenant) = (match owner { Some(store_id) => self.tenant(store_id).await, None => None }) else {
            return Ok(None);
        };
        let mut tenant = tenant.lock().await;
        let Some(order) = tenant.orders.iter_mut().find(|o| o.id == id) else { return Ok(None) };
        order.status = status;
        Ok(Some(order.clone()))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn begin(&self) -> StorageResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork { storage: self.clone(), scope: None }))
    }
}

pub struct MemoryUnitOfWork {
    storage: MemoryStorage,
    scope: Option<Scope>,
}

/// A locked store plus the writes made so far.
struct Scope {
    tenant: OwnedMutexGuard<Tenant>,
    products: BTreeMap<ProductId, Product>,
    orders: Vec<Order>,
}

impl MemoryUnitOfWork {
    fn scope(&mut self, store_id: StoreId) -> StorageResult<&mut Scope> {
        match self.scope.as_mut() {
            Some(scope) if scope.tenant.store.id == store_id => Ok(scope),
            _ => Err(StorageError::ScopeViolation(format!("store {store_id} is not locked by this unit of work"))),
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn store_by_slug(&mut self, slug: &Slug) -> StorageResult<Option<Store>> {
        if let Some(scope) = &self.scope {
            if &scope.tenant.store.slug == slug {
                return Ok(Some(scope.tenant.store.clone()));
            }
            return Err(StorageError::ScopeViolation("a unit of work spans a single store".into()));
        }
        let Some(tenant) = self.storage.tenant_by_slug(slug).await else { return Ok(None) };
        let tenant = tenant.lock_owned().await;
        let store = tenant.store.clone();
        let products = tenant.products.clone();
        self.scope = Some(Scope { tenant, products, orders: vec![] });
        Ok(Some(store))
    }

    async fn products_by_ids(&mut self, store_id: StoreId, ids: &[ProductId]) -> StorageResult<Vec<Product>> {
        let scope = self.scope(store_id)?;
        let mut found: Vec<Product> = ids.iter().filter_map(|id| scope.products.get(id)).cloned().collect();
        found.sort_by_key(|p| p.id);
        found.dedup_by_key(|p| p.id);
        Ok(found)
    }

    async fn delivery_zone(&mut self, store_id: StoreId, zone_id: DeliveryZoneId) -> StorageResult<Option<DeliveryZone>> {
        let scope = self.scope(store_id)?;
        Ok(scope.tenant.zones.get(&zone_id).cloned())
    }

    async fn active_coupon(&mut self, store_id: StoreId, code: &str) -> StorageResult<Option<Coupon>> {
        let scope = self.scope(store_id)?;
        Ok(scope.tenant.coupons.iter().find(|c| c.active && c.code == code).cloned())
    }

    async fn decrement_stock(&mut self, product_id: ProductId, quantity: u32) -> StorageResult<bool> {
        let scope = self.scope.as_mut().ok_or_else(|| StorageError::ScopeViolation("no store resolved".into()))?;
        let product = scope.products.get_mut(&product_id).ok_or_else(|| {
            StorageError::ScopeViolation(format!("product {product_id} does not belong to the locked store"))
        })?;
        if !product.stock.can_supply(quantity) {
            return Ok(false);
        }
        product.stock = product.stock.after_taking(quantity);
        Ok(true)
    }

    async fn insert_order(&mut self, order: NewOrder) -> StorageResult<Order> {
        #[cfg(test)]
        if self.storage.inner.fail_order_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Injected("order insert"));
        }
        let inner = Arc::clone(&self.storage.inner);
        let sequences = &inner.sequences;
        let scope = self.scope(order.store_id)?;
        let id = OrderId::new(next(&sequences.order));
        let item_ids: Vec<_> = order.items.iter().map(|_| OrderItemId::new(next(&sequences.order_item))).collect();
        let order = order.into_order(id, item_ids);
        scope.orders.push(order.clone());
        Ok(order)
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let MemoryUnitOfWork { storage, scope } = *self;
        let Some(Scope { mut tenant, products, orders }) = scope else { return Ok(()) };
        let store_id = tenant.store.id;
        {
            // Taken while the store lock is held; nothing holds the registry while waiting on a store.
            let mut registry = storage.inner.registry.write().await;
            registry.order_owners.extend(orders.iter().map(|o| (o.id, store_id)));
        }
        tenant.products = products;
        tenant.orders.extend(orders);
        Ok(())
    }
}
