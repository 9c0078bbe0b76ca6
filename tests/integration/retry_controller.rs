//! Retry controller: attempt counting, backoff schedule, retry-after, classification.

use crate::integration::test_utils::RecordingSleeper;
use conduit::error::ApiError;
use conduit::retry::{Retrier, RetryConfig, RetryPolicy, RetrySettings};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(350),
        exponential_base: 2.0,
        jitter: false,
    }
}

fn retrier(max_attempts: u32) -> (Retrier, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let retrier =
        Retrier::new(config(max_attempts), RetryPolicy::default()).with_sleeper(sleeper.clone());
    (retrier, sleeper)
}

#[tokio::test]
async fn transient_failures_back_off_exponentially_up_to_the_cap() {
    let (retrier, sleeper) = retrier(5);
    let calls = AtomicU32::new(0);
    let value = retrier
        .run("flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 4 {
                    Err(ApiError::NetworkError("connection reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(
        *sleeper.sleeps.lock(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(350),
            Duration::from_millis(350),
        ]
    );
}

#[tokio::test]
async fn exhausted_attempts_wrap_the_last_error() {
    let (retrier, sleeper) = retrier(3);
    let calls = AtomicU32::new(0);
    let err = retrier
        .run::<(), _, _>("always-down", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::NetworkError("503 service unavailable".to_string())) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(sleeper.sleeps.lock().len(), 2);
    match err {
        ApiError::RetryExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ApiError::NetworkError(_)));
        }
        other => panic!("expected RetryExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
    let (retrier, sleeper) = retrier(5);
    let calls = AtomicU32::new(0);
    let err = retrier
        .run::<(), _, _>("auth", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::ProviderAuthFailed("invalid api key".to_string())) }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ProviderAuthFailed(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(sleeper.sleeps.lock().is_empty());
}

#[tokio::test]
async fn rate_limit_waits_for_the_server_hint() {
    let (retrier, sleeper) = retrier(3);
    let calls = AtomicU32::new(0);
    retrier
        .run("rate-limited", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ApiError::ProviderRateLimit {
                        message: "slow down".to_string(),
                        retry_after: Some(Duration::from_secs(7)),
                    })
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();
    assert_eq!(*sleeper.sleeps.lock(), vec![Duration::from_secs(7)]);
}

#[tokio::test]
async fn opaque_provider_text_is_classified() {
    let (retrier, _) = retrier(2);
    let calls = AtomicU32::new(0);
    let err = retrier
        .run::<(), _, _>("opaque", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ApiError::ProviderError("HTTP 429 Too Many Requests".to_string())) }
        })
        .await
        .unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(matches!(err, ApiError::RetryExhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn jittered_delays_stay_within_bounds() {
    let sleeper = Arc::new(RecordingSleeper::default());
    let retrier = Retrier::new(
        RetryConfig {
            jitter: true,
            max_delay: Duration::from_secs(10),
            ..config(4)
        },
        RetryPolicy::network(),
    )
    .with_sleeper(sleeper.clone());
    let _ = retrier
        .run::<(), _, _>("jitter", || async {
            Err(ApiError::NetworkError("connection refused".to_string()))
        })
        .await;

    let sleeps = sleeper.sleeps.lock();
    assert_eq!(sleeps.len(), 3);
    for (attempt, delay) in sleeps.iter().enumerate() {
        let base = 100u64 << attempt;
        assert!(*delay >= Duration::from_millis(base / 2));
        assert!(*delay <= Duration::from_millis(base * 3 / 2));
    }
}

#[test]
fn settings_validate_and_convert() {
    let settings = RetrySettings::default();
    assert!(settings.validate().is_ok());
    let config = settings.to_config();
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.initial_delay, Duration::from_secs(1));
    assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));

    let bad = RetrySettings {
        max_attempts: 0,
        ..RetrySettings::default()
    };
    assert!(bad.validate().is_err());
}
