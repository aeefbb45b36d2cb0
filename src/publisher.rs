use std::sync::Arc;

use tracing::{error, info};

use crate::{
    clients::broker::MessageBroker,
    error::NotificationError,
    models::{
        notification::{NotificationEvent, NotificationEventDto, NotificationResult},
        topology::{BrokerTopology, NOTIFICATION_EXCHANGE},
    },
    routing::routing_key,
};

/// Entry point other services use to enqueue notifications.
#[derive(Clone)]
pub struct NotificationPublisher {
    broker: Arc<dyn MessageBroker>,
    topology: Arc<BrokerTopology>,
}

impl NotificationPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, topology: Arc<BrokerTopology>) -> Self {
        Self { broker, topology }
    }

    /// Never fails: every error becomes `success: false` with its message.
    pub async fn queue_notification(&self, event: NotificationEventDto) -> NotificationResult {
        match self.publish(event).await {
            Ok(routing_key) => NotificationResult::queued(&routing_key),
            Err(e) => NotificationResult::failed(e.to_string()),
        }
    }

    /// Validates `event` against the schema for its type and publishes it,
    /// returning the routing key it went out under.
    pub async fn publish(&self, event: NotificationEventDto) -> Result<String, NotificationError> {
        info!(
            event_id = %event.id,
            notification_type = %event.notification_type,
            user_id = %event.user_id,
            "Received request to queue notification"
        );

        let result = self.validate_and_publish(event).await;

        if let Err(e) = &result {
            error!(error = %e, "Error queueing notification");
        }

        result
    }

    async fn validate_and_publish(
        &self,
        event: NotificationEventDto,
    ) -> Result<String, NotificationError> {
        let event = NotificationEvent::try_from(event)?;
        let routing_key = routing_key(&event);
        let message = event.to_json()?;

        let exchange = self
            .topology
            .exchange(NOTIFICATION_EXCHANGE)
            .ok_or_else(|| NotificationError::UnknownExchange(NOTIFICATION_EXCHANGE.to_string()))?;

        self.broker
            .publish(&exchange.name, &routing_key, message.as_bytes())
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        info!(
            event_id = %event.id,
            routing_key = %routing_key,
            "Notification published"
        );

        Ok(routing_key)
    }
}
