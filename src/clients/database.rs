use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info, warn};

use crate::models::{notification::NotificationType, preference::UserNotificationPreference};

/// Where the consumer looks up who a notification goes to and whether they
/// still want it.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_email_by_id(&self, user_id: &str) -> Result<Option<String>, Error>;

    async fn get_user_notification_preference(
        &self,
        user_id: &str,
    ) -> Result<UserNotificationPreference, Error>;
}

pub struct DatabaseClient {
    client: Client,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection closed with error");
            }
        });

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| anyhow!("Database health check failed: {}", e))?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for DatabaseClient {
    async fn get_user_email_by_id(&self, user_id: &str) -> Result<Option<String>, Error> {
        let row = self
            .client
            .query_opt("SELECT email FROM users WHERE id = $1", &[&user_id])
            .await
            .map_err(|e| anyhow!("User lookup failed for {}: {}", user_id, e))?;

        let email = row
            .and_then(|row| row.get::<_, Option<String>>("email"))
            .filter(|email| !email.trim().is_empty());

        debug!(user_id, found = email.is_some(), "User email looked up");

        Ok(email)
    }

    async fn get_user_notification_preference(
        &self,
        user_id: &str,
    ) -> Result<UserNotificationPreference, Error> {
        let rows = self
            .client
            .query(
                "SELECT notification_type, enabled FROM user_notification_preferences \
                 WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(|e| anyhow!("Preference lookup failed for {}: {}", user_id, e))?;

        let mut preference = UserNotificationPreference::new(user_id);

        for row in rows {
            let raw_type: String = row.get("notification_type");
            let enabled: bool = row.get("enabled");

            match NotificationType::from_string(&raw_type) {
                Some(notification_type) => {
                    preference = preference.with(notification_type, enabled);
                }
                None => {
                    warn!(user_id, notification_type = %raw_type, "Ignoring unknown preference row");
                }
            }
        }

        Ok(preference)
    }
}
