use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use loadcell::error::Error;
use loadcell::session::connect_with_retry;

#[tokio::test(start_paused = true)]
async fn succeeds_on_attempt_k_plus_one() {
    let attempts = AtomicUsize::new(0);
    let backoff = Duration::from_secs(5);
    let start = tokio::time::Instant::now();

    let session = connect_with_retry(
        || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 3 {
                    Err(format!("connection refused (attempt {n})"))
                } else {
                    Ok(n)
                }
            }
        },
        90,
        backoff,
    )
    .await
    .unwrap();

    assert_eq!(session, 4);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    // three failures -> three sleeps between attempts
    assert_eq!(start.elapsed(), backoff * 3);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_reports_last_error() {
    let attempts = AtomicUsize::new(0);

    let result: Result<(), _> = connect_with_retry(
        || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err::<(), _>(format!("no route to host (attempt {n})")) }
        },
        5,
        Duration::from_secs(5),
    )
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 5);
    match result {
        Err(Error::Connection { attempts, last }) => {
            assert_eq!(attempts, 5);
            assert!(last.contains("attempt 5"));
        }
        other => panic!("expected connection error, got {other:?}"),
    }
}

#[tokio::test]
async fn immediate_success_does_not_sleep() {
    let start = std::time::Instant::now();
    let session = connect_with_retry(|| async { Ok::<_, String>(1u8) }, 90, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(session, 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}
