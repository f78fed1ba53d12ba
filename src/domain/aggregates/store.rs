//! Catalog records: stores and what they own

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::value_objects::{CouponId, DeliveryZoneId, ProductId, Slug, Stock, StoreId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: Slug,
    pub whatsapp_number: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub is_active: bool,
    pub stock: Stock,
    /// Advisory reorder level, never enforced when ordering.
    pub min_stock: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: DeliveryZoneId,
    pub store_id: StoreId,
    pub name: String,
    pub price: Decimal,
    pub min_total_free: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub store_id: StoreId,
    pub code: String,
    pub percent: Decimal,
    pub min_total: Option<Decimal>,
    pub active: bool,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewStore {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    pub slug: Slug,
    #[validate(length(min = 1, message = "whatsapp_number must not be empty"))]
    pub whatsapp_number: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
}

/// Partial store update; the slug is fixed at creation.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct StoreUpdate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "whatsapp_number must not be empty"))]
    pub whatsapp_number: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
}

impl StoreUpdate {
    pub fn apply(self, store: &mut Store) {
        if let Some(name) = self.name { store.name = name; }
        if let Some(number) = self.whatsapp_number { store.whatsapp_number = number; }
        if let Some(url) = self.logo_url { store.logo_url = Some(url); }
        if let Some(color) = self.primary_color { store.primary_color = Some(color); }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "amount")]
    pub price: Decimal,
    pub image_url: Option<String>,
    pub category: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0, message = "min_stock must not be negative"))]
    pub min_stock: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "amount")]
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    #[validate(range(min = 0, message = "stock must not be negative"))]
    pub stock: Option<i32>,
    #[validate(range(min = 0, message = "min_stock must not be negative"))]
    pub min_stock: Option<i32>,
}

impl ProductUpdate {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name { product.name = name; }
        if let Some(description) = self.description { product.description = Some(description); }
        if let Some(price) = self.price { product.price = price; }
        if let Some(url) = self.image_url { product.image_url = Some(url); }
        if let Some(category) = self.category { product.category = Some(category); }
        if let Some(active) = self.is_active { product.is_active = active; }
        if let Some(stock) = self.stock { product.stock = Stock::from_input(Some(stock)); }
        if let Some(min_stock) = self.min_stock { product.min_stock = min_stock; }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewDeliveryZone {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: String,
    #[validate(custom = "amount")]
    pub price: Decimal,
    #[validate(custom = "amount")]
    pub min_total_free: Option<Decimal>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewCoupon {
    #[validate(length(min = 1, message = "code must not be empty"))]
    pub code: String,
    #[validate(custom = "percentage")]
    pub percent: Decimal,
    #[validate(custom = "amount")]
    pub min_total: Option<Decimal>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool { true }

/// Largest price, fee or threshold accepted from a merchant.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

fn amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > MAX_AMOUNT {
        return Err(ValidationError::new("amount_out_of_range"));
    }
    Ok(())
}

fn percentage(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("percent_out_of_range"));
    }
    Ok(())
}
