//! Aggregates module
pub mod order;
pub mod store;

pub use order::{CustomerDetails, DeliveryType, NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
pub use store::{
    Coupon, DeliveryZone, NewCoupon, NewDeliveryZone, NewProduct, NewStore, Product, ProductUpdate, Store,
    StoreUpdate,
};
