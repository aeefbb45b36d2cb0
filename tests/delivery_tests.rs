use std::sync::Arc;

use anyhow::Result;
use notification_service::{
    clients::{
        broker::MessageBroker, memory::InMemoryIdempotencyStore, redis::IdempotencyStore,
    },
    consumer::{ConsumerLoop, ConsumerSettings, MessageProcessor},
    delivery::ImmediateEmailProcessor,
    models::{
        delivery::DeliveryOutcome,
        message::PollOutcome,
        notification::NotificationType,
        status::IdempotencyStatus,
        topology::{
            FAILED_QUEUE, IMMEDIATE_QUEUE, NOTIFICATION_EXCHANGE, create_notification_topology,
        },
    },
    publisher::NotificationPublisher,
};

use crate::common::{
    LossySentStore, RecordingEmailSender, StaticDirectory, immediate_email_dto,
    immediate_email_event, memory_broker,
};

struct Harness {
    processor: Arc<ImmediateEmailProcessor>,
    sender: Arc<RecordingEmailSender>,
    idempotency: Arc<InMemoryIdempotencyStore>,
}

fn harness(directory: StaticDirectory, sender: RecordingEmailSender) -> Harness {
    let sender = Arc::new(sender);
    let idempotency = Arc::new(InMemoryIdempotencyStore::new());
    let processor = Arc::new(ImmediateEmailProcessor::new(
        Arc::new(directory),
        sender.clone(),
        idempotency.clone(),
    ));

    Harness {
        processor,
        sender,
        idempotency,
    }
}

/// Test: A user with an email and default preferences receives exactly one email
#[tokio::test]
async fn test_immediate_email_is_delivered() -> Result<()> {
    let h = harness(
        StaticDirectory::default().with_user("u1", "a@b.com"),
        RecordingEmailSender::default(),
    );
    let event = immediate_email_event("u1");

    let outcome = h.processor.process(&event.to_json()?).await?;

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    assert_eq!(h.sender.sent().await, vec![("a@b.com".to_string(), event.id)]);
    assert_eq!(
        h.idempotency.check_idempotency(&event.id.to_string()).await?,
        IdempotencyStatus::Sent
    );

    Ok(())
}

/// Test: A user without an email on file cannot be delivered to
#[tokio::test]
async fn test_missing_email_fails_delivery() -> Result<()> {
    let h = harness(StaticDirectory::default(), RecordingEmailSender::default());
    let event = immediate_email_event("u1");

    let outcome = h.processor.process(&event.to_json()?).await?;

    assert!(matches!(outcome, DeliveryOutcome::Failed(ref reason) if reason.contains("u1")));
    assert!(h.sender.sent().await.is_empty());

    Ok(())
}

/// Test: An opted-out user is acknowledged without an email
#[tokio::test]
async fn test_disabled_preference_suppresses_delivery() -> Result<()> {
    let h = harness(
        StaticDirectory::default()
            .with_user("u1", "a@b.com")
            .with_preference("u1", NotificationType::ImmediateEmail, false),
        RecordingEmailSender::default(),
    );
    let event = immediate_email_event("u1");

    let outcome = h.processor.process(&event.to_json()?).await?;

    assert_eq!(outcome, DeliveryOutcome::Suppressed);
    assert!(outcome.should_ack());
    assert!(h.sender.sent().await.is_empty());

    Ok(())
}

/// Test: Opting out of another type does not suppress this one
#[tokio::test]
async fn test_unrelated_preference_does_not_suppress() -> Result<()> {
    let h = harness(
        StaticDirectory::default()
            .with_user("u1", "a@b.com")
            .with_preference("u1", NotificationType::DailySummary, false),
        RecordingEmailSender::default(),
    );

    let outcome = h
        .processor
        .process(&immediate_email_event("u1").to_json()?)
        .await?;

    assert_eq!(outcome, DeliveryOutcome::Delivered);
    assert_eq!(h.sender.sent().await.len(), 1);

    Ok(())
}

/// Test: Send failures are reported as failed and recorded
#[tokio::test]
async fn test_send_failure_is_reported() -> Result<()> {
    let h = harness(
        StaticDirectory::default().with_user("u1", "a@b.com"),
        RecordingEmailSender::failing(),
    );
    let event = immediate_email_event("u1");

    let outcome = h.processor.process(&event.to_json()?).await?;

    assert!(!outcome.should_ack());
    assert_eq!(
        h.idempotency.check_idempotency(&event.id.to_string()).await?,
        IdempotencyStatus::Failed
    );

    Ok(())
}

/// Test: Losing the "sent" write after a successful send still acks the message
#[tokio::test]
async fn test_sent_status_write_failure_still_delivers() -> Result<()> {
    let broker = memory_broker();
    let sender = Arc::new(RecordingEmailSender::default());
    let processor = Arc::new(ImmediateEmailProcessor::new(
        Arc::new(StaticDirectory::default().with_user("u1", "a@b.com")),
        sender.clone(),
        Arc::new(LossySentStore::default()),
    ));
    let consumer = ConsumerLoop::new(broker.clone(), ConsumerSettings::default())
        .with_queue(IMMEDIATE_QUEUE, processor.clone());

    let event = immediate_email_event("u1");
    assert_eq!(
        processor.process(&event.to_json()?).await?,
        DeliveryOutcome::Delivered
    );

    broker
        .publish(
            NOTIFICATION_EXCHANGE,
            "notification.immediate.immediate_email",
            immediate_email_event("u1").to_json()?.as_bytes(),
        )
        .await?;

    assert_eq!(consumer.poll_once().await, vec![PollOutcome::Acked]);
    assert_eq!(sender.sent().await.len(), 2);
    assert_eq!(broker.message_count(FAILED_QUEUE).await, 0);

    Ok(())
}

/// Test: Garbage and schema-mismatched bodies fail instead of erroring out
#[tokio::test]
async fn test_undecodable_message_fails() -> Result<()> {
    let h = harness(
        StaticDirectory::default().with_user("u1", "a@b.com"),
        RecordingEmailSender::default(),
    );

    let garbage = h.processor.process("{ invalid json }").await?;
    assert!(matches!(garbage, DeliveryOutcome::Failed(_)));

    let mismatched = r#"{"type":"low_balance","user_id":"u1","strategy":"IMMEDIATE","data":{"subject":"s","body":"b"}}"#;
    let outcome = h.processor.process(mismatched).await?;
    assert!(matches!(outcome, DeliveryOutcome::Failed(_)));

    assert!(h.sender.sent().await.is_empty());

    Ok(())
}

/// Test: Processing the same message twice sends one email and reports the same outcome
#[tokio::test]
async fn test_redelivery_does_not_resend() -> Result<()> {
    let h = harness(
        StaticDirectory::default().with_user("u1", "a@b.com"),
        RecordingEmailSender::default(),
    );
    let message = immediate_email_event("u1").to_json()?;

    let first = h.processor.process(&message).await?;
    let second = h.processor.process(&message).await?;

    assert_eq!(first, DeliveryOutcome::Delivered);
    assert_eq!(second, first);
    assert_eq!(h.sender.sent().await.len(), 1);

    Ok(())
}

/// Test: Producer to email, end to end over the in-memory broker
#[tokio::test]
async fn test_publish_consume_deliver_flow() -> Result<()> {
    let broker = memory_broker();
    let publisher = NotificationPublisher::new(
        broker.clone(),
        Arc::new(create_notification_topology()),
    );
    let h = harness(
        StaticDirectory::default().with_user("u1", "a@b.com"),
        RecordingEmailSender::default(),
    );
    let consumer = ConsumerLoop::new(broker.clone(), ConsumerSettings::default())
        .with_queue(IMMEDIATE_QUEUE, h.processor.clone());

    assert!(publisher.queue_notification(immediate_email_dto("u1")).await.success);
    assert!(publisher.queue_notification(immediate_email_dto("u2")).await.success);

    assert_eq!(consumer.poll_once().await, vec![PollOutcome::Acked]);
    assert_eq!(consumer.poll_once().await, vec![PollOutcome::Rejected]);
    assert_eq!(consumer.poll_once().await, vec![PollOutcome::Empty]);

    let sent = h.sender.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "a@b.com");
    assert_eq!(broker.message_count(FAILED_QUEUE).await, 1);

    Ok(())
}
