use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use tracing::{info, warn};

use crate::{
    clients::broker::MessageBroker,
    models::{
        message::ReplayReport,
        notification::NotificationEvent,
        topology::{FAILED_QUEUE, NOTIFICATION_EXCHANGE},
    },
    routing::routing_key,
};

/// Moves dead-lettered notifications back onto the notification exchange.
///
/// Each message is re-validated and republished under its recomputed routing
/// key before being acked. Messages that no longer decode are acked and
/// counted as discarded, so a replay never spins on poison messages.
pub async fn replay_dead_letters(
    broker: &Arc<dyn MessageBroker>,
    limit: usize,
    fetch_timeout: Duration,
) -> Result<ReplayReport, Error> {
    let mut report = ReplayReport::default();

    while report.replayed + report.discarded < limit {
        let Some(message) = broker.get(FAILED_QUEUE, fetch_timeout).await? else {
            break;
        };

        let event = message
            .body_str()
            .and_then(|body| NotificationEvent::from_json(body).map_err(Error::from));

        match event {
            Ok(event) => {
                let routing_key = routing_key(&event);

                if let Err(e) = broker
                    .publish(NOTIFICATION_EXCHANGE, &routing_key, &message.body)
                    .await
                {
                    broker.reject(&message, true).await?;
                    return Err(e);
                }

                broker.acknowledge(&message).await?;
                report.replayed += 1;
            }
            Err(e) => {
                warn!(
                    delivery_tag = message.delivery_tag,
                    error = %e,
                    "Discarding undecodable dead letter"
                );
                broker.acknowledge(&message).await?;
                report.discarded += 1;
            }
        }
    }

    info!(
        replayed = report.replayed,
        discarded = report.discarded,
        "Dead-letter replay finished"
    );

    Ok(report)
}
