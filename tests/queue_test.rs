//! Integration tests for rate-limited dispatch timing

use std::sync::{Arc, Mutex};
use std::time::Duration;

use promptreel::queue::{RateLimitConfig, RateLimitQueue};
use promptreel::Result;
use tokio::time::Instant;

async fn dispatch_times(queue: &RateLimitQueue, count: usize) -> Vec<Duration> {
    let start = Instant::now();
    let times = Arc::new(Mutex::new(Vec::new()));

    let tasks = (0..count).map(|_| {
        let times = times.clone();
        queue.enqueue(move || async move {
            times.lock().unwrap().push(start.elapsed());
            Ok::<_, promptreel::Error>(())
        })
    });
    let results: Vec<Result<()>> = futures::future::join_all(tasks).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let times = times.lock().unwrap().clone();
    times
}

/// Ten tasks at 5/minute with 12s spacing take at least 9 x 12s
#[tokio::test(start_paused = true)]
async fn test_spacing_dominates_default_limits() {
    let queue = RateLimitQueue::new(RateLimitConfig::default());
    let start = Instant::now();

    let times = dispatch_times(&queue, 10).await;

    assert_eq!(times.len(), 10);
    assert!(start.elapsed() >= Duration::from_secs(108));
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_secs(12));
    }
}

/// Without spacing, the window caps dispatches per minute
#[tokio::test(start_paused = true)]
async fn test_window_limit_without_spacing() {
    let queue = RateLimitQueue::new(RateLimitConfig {
        max_requests: 5,
        window: Duration::from_secs(60),
        min_spacing: Duration::ZERO,
        task_timeout: None,
    });

    let times = dispatch_times(&queue, 7).await;

    assert!(times[..5].iter().all(|t| *t < Duration::from_secs(1)));
    assert!(times[5] >= Duration::from_secs(60));
    assert!(times[6] >= Duration::from_secs(60));
}

/// Tasks are dispatched in submission order
#[tokio::test(start_paused = true)]
async fn test_fifo_order() {
    let queue = RateLimitQueue::new(RateLimitConfig::unthrottled());
    let order = Arc::new(Mutex::new(Vec::new()));

    let tasks = (0..20).map(|i| {
        let order = order.clone();
        queue.enqueue(move || async move {
            order.lock().unwrap().push(i);
            Ok::<_, promptreel::Error>(i)
        })
    });
    let results = futures::future::join_all(tasks).await;

    let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, (0..20).collect::<Vec<_>>());
    assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
}
