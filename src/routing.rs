use crate::models::notification::{BatchingStrategy, NotificationEvent, NotificationType};

pub fn routing_key(event: &NotificationEvent) -> String {
    routing_key_for(event.notification_type(), event.strategy)
}

/// Dot-segmented key so queues can bind with wildcards such as
/// `notification.immediate.#`.
pub fn routing_key_for(notification_type: NotificationType, strategy: BatchingStrategy) -> String {
    match strategy {
        BatchingStrategy::Immediate => format!("notification.immediate.{}", notification_type),
        BatchingStrategy::Backoff => format!("notification.backoff.{}", notification_type),
        BatchingStrategy::Hourly | BatchingStrategy::Daily => {
            format!("notification.{}", notification_type)
        }
    }
}

/// AMQP topic matching: `*` matches exactly one segment, `#` zero or more.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };

    matches_segments(&pattern, &key)
}

fn matches_segments(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_segments(rest, &key[skip..])),
        Some((&"*", rest)) => !key.is_empty() && matches_segments(rest, &key[1..]),
        Some((segment, rest)) => match key.split_first() {
            Some((word, key_rest)) => word == segment && matches_segments(rest, key_rest),
            None => false,
        },
    }
}
