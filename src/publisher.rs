//! Order event publishing over NATS.
//!
//! Publishing is best effort: an order is committed before its event leaves,
//! and a failed publish is logged, never returned.

use tracing::{debug, warn};

use crate::domain::events::OrderEvent;

#[derive(Clone, Debug)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
    prefix: String,
}

impl EventPublisher {
    /// A publisher that drops every event.
    pub fn disabled() -> Self { Self { client: None, prefix: String::new() } }

    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client: Some(client), prefix: prefix.into() })
    }

    fn subject(&self, event: &OrderEvent) -> String {
        if self.prefix.is_empty() {
            event.subject().to_string()
        } else {
            format!("{}.{}", self.prefix, event.subject())
        }
    }

    pub async fn publish(&self, event: &OrderEvent) {
        let Some(client) = &self.client else { return };
        let subject = self.subject(event);
        let payload = match serde_json::to_vec(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(subject = %subject, error = %e, "failed to encode event");
                return;
            }
        };
        match client.publish(subject.clone(), payload.into()).await {
            Ok(()) => debug!(subject = %subject, "event published"),
            Err(e) => warn!(subject = %subject, error = %e, "failed to publish event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{OrderId, StoreId};
    use rust_decimal::Decimal;

    fn event() -> OrderEvent {
        OrderEvent::Created {
            order_id: OrderId::new(7), store_id: StoreId::new(1), total: Decimal::from(21),
            item_count: 1, created_at: "2024-03-10T09:00:00.000000Z".into(),
        }
    }

    #[test]
    fn test_subject_prefixed() {
        let publisher = EventPublisher { client: None, prefix: "storefront".into() };
        assert_eq!(publisher.subject(&event()), "storefront.orders.created");
        assert_eq!(EventPublisher::disabled().subject(&event()), "orders.created");
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_silent() {
        let publisher = EventPublisher::disabled();
        assert!(publisher.client.is_none());
        publisher.publish(&event()).await;
    }
}
