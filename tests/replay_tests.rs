use std::{sync::Arc, time::Duration};

use anyhow::Result;
use notification_service::{
    clients::broker::MessageBroker,
    models::{
        message::ReplayReport,
        topology::{DEAD_LETTER_EXCHANGE, FAILED_QUEUE, IMMEDIATE_QUEUE},
    },
    replay::replay_dead_letters,
};

use crate::common::{immediate_email_event, memory_broker};

/// Test: Dead letters go back to their original queue family
#[tokio::test]
async fn test_replay_moves_dead_letters_back() -> Result<()> {
    let memory = memory_broker();
    let broker: Arc<dyn MessageBroker> = memory.clone();

    for _ in 0..3 {
        broker
            .publish(
                DEAD_LETTER_EXCHANGE,
                "failed.immediate",
                immediate_email_event("u1").to_json()?.as_bytes(),
            )
            .await?;
    }

    let report = replay_dead_letters(&broker, 2, Duration::from_millis(10)).await?;

    assert_eq!(
        report,
        ReplayReport {
            replayed: 2,
            discarded: 0
        }
    );
    assert_eq!(memory.message_count(IMMEDIATE_QUEUE).await, 2);
    assert_eq!(memory.message_count(FAILED_QUEUE).await, 1);
    assert_eq!(memory.unacked_count().await, 0);

    let replayed = memory.peek(IMMEDIATE_QUEUE).await;
    assert_eq!(replayed[0].0, "notification.immediate.immediate_email");

    Ok(())
}

/// Test: Undecodable dead letters are dropped rather than replayed forever
#[tokio::test]
async fn test_replay_discards_poison_messages() -> Result<()> {
    let memory = memory_broker();
    let broker: Arc<dyn MessageBroker> = memory.clone();

    broker
        .publish(DEAD_LETTER_EXCHANGE, "failed.immediate", b"not json")
        .await?;
    broker
        .publish(
            DEAD_LETTER_EXCHANGE,
            "failed.immediate",
            immediate_email_event("u1").to_json()?.as_bytes(),
        )
        .await?;

    let report = replay_dead_letters(&broker, 10, Duration::from_millis(10)).await?;

    assert_eq!(report.replayed, 1);
    assert_eq!(report.discarded, 1);
    assert_eq!(memory.message_count(FAILED_QUEUE).await, 0);
    assert_eq!(memory.message_count(IMMEDIATE_QUEUE).await, 1);

    Ok(())
}
