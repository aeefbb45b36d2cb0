use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::{
    clients::{database::UserDirectory, email::EmailSender, redis::IdempotencyStore},
    consumer::MessageProcessor,
    models::{
        delivery::DeliveryOutcome, notification::NotificationEvent, status::IdempotencyStatus,
    },
};

/// Sends immediate notifications as templated emails.
///
/// Delivery is keyed by event id in the idempotency store: a message that is
/// redelivered after its email went out is acknowledged without resending.
pub struct ImmediateEmailProcessor {
    directory: Arc<dyn UserDirectory>,
    email_sender: Arc<dyn EmailSender>,
    idempotency: Arc<dyn IdempotencyStore>,
}

impl ImmediateEmailProcessor {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        email_sender: Arc<dyn EmailSender>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            directory,
            email_sender,
            idempotency,
        }
    }

    pub async fn deliver(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, Error> {
        let idempotency_key = event.id.to_string();
        let notification_type = event.notification_type();

        if self.idempotency.check_idempotency(&idempotency_key).await? == IdempotencyStatus::Sent {
            info!(
                event_id = %event.id,
                "Notification already sent, skipping"
            );
            return Ok(DeliveryOutcome::Delivered);
        }

        let user_email = self.directory.get_user_email_by_id(&event.user_id).await?;
        let preference = self
            .directory
            .get_user_notification_preference(&event.user_id)
            .await?;

        let Some(user_email) = user_email else {
            error!(user_id = %event.user_id, "User email not found");
            return Ok(DeliveryOutcome::failed(format!(
                "User email not found for user {}",
                event.user_id
            )));
        };

        if !preference.is_enabled(notification_type) {
            debug!(
                user_id = %event.user_id,
                notification_type = %notification_type,
                "User opted out of this notification type"
            );
            return Ok(DeliveryOutcome::Suppressed);
        }

        self.idempotency.mark_as_processing(&idempotency_key).await?;

        if let Err(e) = self.email_sender.send_templated(&user_email, event).await {
            if let Err(mark_err) = self.idempotency.mark_as_failed(&idempotency_key).await {
                warn!(error = %mark_err, "Failed to record failed delivery");
            }
            error!(
                event_id = %event.id,
                user_id = %event.user_id,
                error = %e,
                "Failed to send notification email"
            );
            return Ok(DeliveryOutcome::failed(format!("Email send failed: {}", e)));
        }

        // The email is out; a lost status write must not dead-letter it.
        if let Err(e) = self.idempotency.mark_as_sent(&idempotency_key).await {
            warn!(event_id = %event.id, error = %e, "Failed to record sent delivery");
        }

        info!(
            event_id = %event.id,
            user_id = %event.user_id,
            notification_type = %notification_type,
            "Notification delivered"
        );

        Ok(DeliveryOutcome::Delivered)
    }
}

#[async_trait]
impl MessageProcessor for ImmediateEmailProcessor {
    async fn process(&self, message: &str) -> Result<DeliveryOutcome, Error> {
        let event = match NotificationEvent::from_json(message) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, "Undecodable notification");
                return Ok(DeliveryOutcome::failed(e.to_string()));
            }
        };

        self.deliver(&event).await
    }
}
