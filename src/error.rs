use thiserror::Error;

use crate::models::notification::NotificationType;

/// Reasons a notification can be refused at the publishing boundary.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Malformed notification envelope: {0}")]
    Malformed(String),

    #[error("Invalid {notification_type} payload: {reason}")]
    Validation {
        notification_type: NotificationType,
        reason: String,
    },

    #[error("Failed to serialize notification: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Exchange '{0}' is not declared")]
    UnknownExchange(String),

    #[error("Broker publish failed: {0}")]
    Transport(String),
}

impl NotificationError {
    /// True when the caller sent something that can never be enqueued as-is.
    pub fn is_rejected_input(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::Validation { .. })
    }
}
