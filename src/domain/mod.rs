//! Storefront domain: catalog records, orders and pricing
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod value_objects;
