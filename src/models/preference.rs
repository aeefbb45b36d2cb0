use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::notification::NotificationType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserNotificationPreference {
    pub user_id: String,
    pub preferences: HashMap<NotificationType, bool>,
}

impl UserNotificationPreference {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            preferences: HashMap::new(),
        }
    }

    pub fn with(mut self, notification_type: NotificationType, enabled: bool) -> Self {
        self.preferences.insert(notification_type, enabled);
        self
    }

    /// Types the user never configured are delivered.
    pub fn is_enabled(&self, notification_type: NotificationType) -> bool {
        self.preferences
            .get(&notification_type)
            .copied()
            .unwrap_or(true)
    }
}
