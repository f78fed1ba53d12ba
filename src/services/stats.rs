//! Order stats per store.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::aggregates::Order;
use crate::domain::value_objects::StoreId;
use crate::storage::{OrderRepository, StorageResult};

/// Counts and totals for today and for the seven days ending today.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatsSummary {
    pub today_orders: u64,
    pub today_total: Decimal,
    pub last7_orders: u64,
    pub last7_total: Decimal,
}

/// Calendar date of an order, taken from the first ten characters of its timestamp.
fn order_date(order: &Order) -> Option<NaiveDate> {
    let day = order.created_at.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Aggregate `orders` relative to `today`.
///
/// Orders without a readable date are skipped. Totals saturate instead of overflowing.
pub fn summarize(orders: &[Order], today: NaiveDate) -> StatsSummary {
    let week_start = today.checked_sub_days(Days::new(6)).unwrap_or(NaiveDate::MIN);
    let mut stats = StatsSummary::default();
    for order in orders {
        let Some(day) = order_date(order) else { continue };
        if day == today {
            stats.today_orders += 1;
            stats.today_total = stats.today_total.saturating_add(order.total);
        }
        if (week_start..=today).contains(&day) {
            stats.last7_orders += 1;
            stats.last7_total = stats.last7_total.saturating_add(order.total);
        }
    }
    stats
}

pub async fn summary<R>(repo: &R, store_id: StoreId, today: NaiveDate) -> StorageResult<StatsSummary>
where
    R: OrderRepository + ?Sized,
{
    let orders = repo.list_orders_by_store(store_id).await?;
    Ok(summarize(&orders, today))
}
