//! Queue and rate limiter composed the way callers use them: the limiter's
//! admission check runs inside queued work.

use pacer::{QueueConfig, RateLimitConfig, RateLimiter, TaskQueue};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

fn limiter(
    capacity: u32,
    refill_interval_ms: u64,
    min_spacing_ms: Option<u64>,
) -> Arc<RateLimiter> {
    Arc::new(
        RateLimiter::new(&RateLimitConfig {
            capacity,
            refill_interval_ms,
            min_spacing_ms,
        })
        .expect("limiter"),
    )
}

#[tokio::test(start_paused = true)]
async fn queued_work_respects_spacing() {
    let limiter = limiter(10, 60_000, Some(100));
    let queue = TaskQueue::new(&QueueConfig {
        concurrency: 3,
        inter_delay_ms: None,
    })
    .expect("queue");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            queue.add(async move {
                limiter.acquire().await;
                Instant::now()
            })
        })
        .collect();

    let mut admitted = Vec::new();
    for handle in handles {
        admitted.push(handle.await.expect("work completes"));
    }
    queue.drain().await;

    admitted.sort();
    for pair in admitted.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(100));
    }
    assert_eq!(limiter.tokens(), 6);
}

#[tokio::test(start_paused = true)]
async fn burst_beyond_capacity_waits_for_refill() {
    let limiter = limiter(2, 1_000, None);
    let queue = TaskQueue::new(&QueueConfig {
        concurrency: 4,
        inter_delay_ms: None,
    })
    .expect("queue");
    let start = Instant::now();
    let done = Arc::new(AtomicUsize::new(0));

    for _ in 0..4 {
        let limiter = Arc::clone(&limiter);
        let done = Arc::clone(&done);
        let _ = queue.add(async move {
            limiter.acquire().await;
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    queue.drain().await;

    assert_eq!(done.load(Ordering::SeqCst), 4);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn try_acquire_lets_work_skip_when_limited() {
    let limiter = limiter(1, 60_000, None);
    let queue = TaskQueue::new(&QueueConfig::default()).expect("queue");

    let outcomes: Vec<_> = (0..3)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            queue.add(async move {
                if limiter.try_acquire() {
                    Ok("sent")
                } else {
                    Err("rate limited")
                }
            })
        })
        .collect();

    let mut results = Vec::new();
    for outcome in outcomes {
        results.push(outcome.await.expect("work completes"));
    }

    assert_eq!(results, vec![Ok("sent"), Err("rate limited"), Err("rate limited")]);
    assert!(queue.is_idle());
}
