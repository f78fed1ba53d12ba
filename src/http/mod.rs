//! HTTP surface.

pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::OrderService;
use crate::storage::Storage;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub orders: OrderService,
    /// Bound on every storage call made outside order creation.
    pub timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    use handlers::*;

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/stores", get(list_stores).post(create_store))
        .route("/api/v1/stores/:id", get(get_store).patch(update_store))
        .route("/api/v1/stores/:id/products", get(list_products).post(create_product))
        .route("/api/v1/stores/:id/delivery-zones", get(list_delivery_zones).post(create_delivery_zone))
        .route("/api/v1/stores/:id/coupons", get(list_coupons).post(create_coupon))
        .route("/api/v1/stores/:id/orders", get(list_orders))
        .route("/api/v1/stores/:id/stats/summary", get(stats_summary))
        .route("/api/v1/products/:id", patch(update_product))
        .route("/api/v1/orders", post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", patch(update_order_status))
        .route("/api/v1/catalog/:slug", get(public_catalog))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::PricingPolicy;
    use crate::publisher::EventPublisher;
    use crate::storage::MemoryStorage;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let timeout = Duration::from_secs(5);
        let orders = OrderService::new(storage.clone(), EventPublisher::disabled(), PricingPolicy::default(), timeout);
        router(AppState { storage, orders, timeout })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    /// Store "demo" with product A (price 10, stock 5), zone "local" and coupon SAVE10.
    async fn seed(app: &Router) -> (i64, i64, i64) {
        let (status, store) = send(app, "POST", "/api/v1/stores",
            Some(json!({"name": "Demo", "slug": "demo", "whatsapp_number": "5491100000000"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let store_id = store["id"].as_i64().unwrap();

        let (status, product) = send(app, "POST", &format!("/api/v1/stores/{store_id}/products"),
            Some(json!({"name": "A", "price": 10, "stock": 5}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, zone) = send(app, "POST", &format!("/api/v1/stores/{store_id}/delivery-zones"),
            Some(json!({"name": "local", "price": 3, "min_total_free": 50}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(app, "POST", &format!("/api/v1/stores/{store_id}/coupons"),
            Some(json!({"code": "SAVE10", "percent": 10, "min_total": 20}))).await;
        assert_eq!(status, StatusCode::CREATED);

        (store_id, product["id"].as_i64().unwrap(), zone["id"].as_i64().unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_order_flow() {
        let app = app();
        let (store_id, product_id, zone_id) = seed(&app).await;

        let (status, order) = send(&app, "POST", "/api/v1/orders", Some(json!({
            "store_slug": "demo",
            "items": [{"product_id": product_id, "quantity": 2}],
            "delivery_zone_id": zone_id,
            "coupon_code": "SAVE10",
            "customer_name": "Ana",
            "delivery_type": "delivery",
        }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["total"].as_f64(), Some(21.0));
        assert_eq!(order["delivery_price"].as_f64(), Some(3.0));
        assert_eq!(order["discount_value"].as_f64(), Some(2.0));
        assert_eq!(order["status"], "pending");
        assert_eq!(order["items"][0]["product_name"], "A");

        let (_, products) = send(&app, "GET", &format!("/api/v1/stores/{store_id}/products"), None).await;
        assert_eq!(products[0]["stock"], 3);

        let order_id = order["id"].as_i64().unwrap();
        let (status, updated) = send(&app, "PATCH", &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({"status": "confirmed"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "confirmed");

        let (_, listed) = send(&app, "GET", &format!("/api/v1/stores/{store_id}/orders"), None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, stats) = send(&app, "GET", &format!("/api/v1/stores/{store_id}/stats/summary"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["today_orders"], 1);
        assert_eq!(stats["last7_total"].as_f64(), Some(21.0));
    }

    #[tokio::test]
    async fn test_order_errors() {
        let app = app();
        let (_, product_id, _) = seed(&app).await;

        let (status, body) = send(&app, "POST", "/api/v1/orders", Some(json!({
            "store_slug": "demo", "items": [{"product_id": product_id, "quantity": 6}],
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "insufficient stock for A");

        let (status, _) = send(&app, "POST", "/api/v1/orders", Some(json!({
            "store_slug": "nowhere", "items": [{"product_id": product_id, "quantity": 1}],
        }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, "POST", "/api/v1/orders", Some(json!({
            "store_slug": "demo", "items": [{"product_id": 999, "quantity": 1}],
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("999"));

        let (status, _) = send(&app, "POST", "/api/v1/orders", Some(json!({"store_slug": "demo"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "POST", "/api/v1/orders", Some(json!({
            "store_slug": "demo", "items": [{"product_id": product_id, "quantity": 1}], "delivery_type": "drone",
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("drone"));

        let (status, _) = send(&app, "POST", "/api/v1/orders", Some(json!({
            "store_slug": "demo", "items": [{"product_id": product_id, "quantity": 3_000_000_000_u64}],
        }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/v1/orders/12345", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let app = app();
        seed(&app).await;
        let (status, body) = send(&app, "POST", "/api/v1/stores",
            Some(json!({"name": "Other", "slug": "demo", "whatsapp_number": "1"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["detail"].as_str().unwrap().contains("demo"));
    }

    #[tokio::test]
    async fn test_catalog_input_validated() {
        let app = app();
        let (store_id, _, _) = seed(&app).await;

        let (status, _) = send(&app, "POST", "/api/v1/stores",
            Some(json!({"name": "Bad", "slug": "no spaces!", "whatsapp_number": "1"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", &format!("/api/v1/stores/{store_id}/products"),
            Some(json!({"name": "B", "price": -1}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", &format!("/api/v1/stores/{store_id}/coupons"),
            Some(json!({"code": "BIG", "percent": 150}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", &format!("/api/v1/stores/{store_id}/products"),
            Some(json!({"name": "B", "price": 1e28}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "POST", "/api/v1/stores/999/products",
            Some(json!({"name": "B", "price": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_public_catalog_hides_inactive() {
        let app = app();
        let (store_id, product_id, _) = seed(&app).await;
        send(&app, "POST", &format!("/api/v1/stores/{store_id}/products"),
            Some(json!({"name": "Hidden", "price": 1, "is_active": false}))).await;
        send(&app, "POST", &format!("/api/v1/stores/{store_id}/coupons"),
            Some(json!({"code": "OLD", "percent": 5, "active": false}))).await;

        let (status, catalog) = send(&app, "GET", "/api/v1/catalog/demo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(catalog["store"]["slug"], "demo");
        let products = catalog["products"].as_array().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0]["id"].as_i64(), Some(product_id));
        assert_eq!(catalog["delivery_zones"].as_array().unwrap().len(), 1);
        assert_eq!(catalog["coupons"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "GET", "/api/v1/catalog/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", "/api/v1/catalog/DEMO", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_partial_updates() {
        let app = app();
        let (store_id, product_id, _) = seed(&app).await;

        let (status, store) = send(&app, "PATCH", &format!("/api/v1/stores/{store_id}"),
            Some(json!({"primary_color": "#ff0000"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store["name"], "Demo");
        assert_eq!(store["primary_color"], "#ff0000");

        let (status, product) = send(&app, "PATCH", &format!("/api/v1/products/{product_id}"),
            Some(json!({"price": 12, "stock": 0}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(product["price"].as_f64(), Some(12.0));
        assert_eq!(product["stock"], Value::Null);

        let (status, _) = send(&app, "PATCH", "/api/v1/products/999", Some(json!({"price": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "PATCH", "/api/v1/orders/999/status", Some(json!({"status": "shipped"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
