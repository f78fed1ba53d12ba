//! Application services on top of storage.

pub mod orders;
pub mod stats;

pub use orders::{CreateOrderRequest, OrderLine, OrderService};
pub use stats::StatsSummary;
