use anyhow::{Result, anyhow};
use notification_service::{
    models::retry::RetryConfig,
    utils::{retry_with_backoff, retry_with_backoff_when},
};
use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use tokio::time::Instant;

fn config(max_attempts: u32, initial_delay_ms: u64, max_delay_ms: u64) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay_ms,
        max_delay_ms,
        backoff_multiplier: 2,
    }
}

/// Test: Successful operations complete without retry
#[tokio::test]
async fn test_successful_operation_no_retry() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff(&config(3, 100, 1000), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, anyhow::Error>("sent")
        }
    })
    .await?;

    assert_eq!(result, "sent");
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    Ok(())
}

/// Test: Transient email provider failures are retried until success
#[tokio::test]
async fn test_transient_failures_are_retried() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff(&config(5, 20, 200), || {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow!("502 from email provider"))
            } else {
                Ok("sent")
            }
        }
    })
    .await?;

    assert_eq!(result, "sent");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    Ok(())
}

/// Test: Permanent failures stop after max attempts
#[tokio::test]
async fn test_permanent_failure_exhausts_retries() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff(&config(4, 10, 100), || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(anyhow!("mailbox does not exist"))
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    Ok(())
}

/// Test: Delays grow but never exceed the cap plus jitter
#[tokio::test]
async fn test_backoff_respects_max_delay() -> Result<()> {
    let retry = config(5, 50, 120);
    let start = Instant::now();
    let times = Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let recorder = Arc::clone(&times);

    let _ = retry_with_backoff(&retry, || {
        let recorder = Arc::clone(&recorder);
        async move {
            recorder.lock().await.push(start.elapsed().as_millis());
            Err::<(), _>(anyhow!("fail"))
        }
    })
    .await;

    let times = times.lock().await;
    assert_eq!(times.len(), 5);
    assert!(times[0] < 40, "first attempt should be immediate");

    for pair in times.windows(2) {
        let delay = pair[1] - pair[0];
        assert!(delay >= 40, "delay {} below jittered minimum", delay);
        assert!(
            delay <= (retry.max_delay_ms * 12 / 10) as u128 + 40,
            "delay {} exceeds cap",
            delay
        );
    }

    Ok(())
}

/// Test: Errors classed as permanent are returned without retrying
#[tokio::test]
async fn test_permanent_error_stops_immediately() -> Result<()> {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let result = retry_with_backoff_when(
        &config(5, 10, 100),
        || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow!("422 invalid recipient"))
            }
        },
        |e| !e.to_string().starts_with("4"),
    )
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);

    Ok(())
}
