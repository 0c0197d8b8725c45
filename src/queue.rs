//! Rate-limited task queue for calls to the image API
//!
//! A single worker task dequeues submitted tasks one at a time. Before each
//! dispatch it waits until both the rolling request window and the minimum
//! spacing allow another request. A failing task only rejects its own
//! caller; the worker carries on with the next task.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Limits applied by the queue worker
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum dispatches within one rolling window
    pub max_requests: u32,
    /// Length of the rolling window
    pub window: Duration,
    /// Minimum time between consecutive dispatches
    pub min_spacing: Duration,
    /// Abandon a task that runs longer than this
    pub task_timeout: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
            min_spacing: Duration::from_secs(12),
            task_timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl RateLimitConfig {
    /// No window limit and no spacing; for providers without throttling
    pub fn unthrottled() -> Self {
        Self {
            max_requests: u32::MAX,
            window: Duration::from_secs(60),
            min_spacing: Duration::ZERO,
            task_timeout: None,
        }
    }
}

/// Bookkeeping of recent dispatch instants
#[derive(Debug)]
pub struct RateWindow {
    max_requests: usize,
    window: Duration,
    min_spacing: Duration,
    dispatched: VecDeque<Instant>,
    last: Option<Instant>,
}

impl RateWindow {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            max_requests: (config.max_requests.max(1)) as usize,
            window: config.window,
            min_spacing: config.min_spacing,
            dispatched: VecDeque::new(),
            last: None,
        }
    }

    /// How long to wait before the next dispatch is allowed, if at all
    pub fn delay_until_ready(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);

        let mut ready_at = now;
        if self.dispatched.len() >= self.max_requests {
            if let Some(oldest) = self.dispatched.front() {
                ready_at = ready_at.max(*oldest + self.window);
            }
        }
        if let Some(last) = self.last {
            ready_at = ready_at.max(last + self.min_spacing);
        }

        (ready_at > now).then(|| ready_at - now)
    }

    /// Record a dispatch
    pub fn record(&mut self, at: Instant) {
        self.dispatched.push_back(at);
        self.last = Some(at);
    }

    /// Dispatches still inside the window as of the last check
    pub fn in_window(&self) -> usize {
        self.dispatched.len()
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.dispatched.front() {
            if now.duration_since(*oldest) >= self.window {
                self.dispatched.pop_front();
            } else {
                break;
            }
        }
    }
}

enum Dispatch {
    Run,
    Skip,
}

type TaskFn = Box<dyn FnOnce(Dispatch) -> BoxFuture<'static, ()> + Send>;

struct QueuedTask {
    cancel: CancellationToken,
    run: TaskFn,
}

/// FIFO queue serializing tasks under a rate limit
///
/// Cloning yields another handle to the same worker
#[derive(Clone)]
pub struct RateLimitQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
    config: Arc<RateLimitConfig>,
}

impl RateLimitQueue {
    /// Create the queue and spawn its worker. Must be called inside a
    /// Tokio runtime
    pub fn new(config: RateLimitConfig) -> Self {
        let config = Arc::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, config.clone()));
        Self { tx, config }
    }

    /// Queue a task and wait for its result
    pub async fn enqueue<T, F, Fut>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.enqueue_with_cancel(&CancellationToken::new(), task)
            .await
    }

    /// Queue a task that is skipped, or dropped mid-flight, once `cancel`
    /// fires
    pub async fn enqueue_with_cancel<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        task: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let timeout = self.config.task_timeout;
        let task_cancel = cancel.clone();

        let run: TaskFn = Box::new(move |dispatch: Dispatch| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let result = match dispatch {
                    Dispatch::Skip => Err(Error::Cancelled),
                    Dispatch::Run => {
                        tokio::select! {
                            _ = task_cancel.cancelled() => Err(Error::Cancelled),
                            result = with_timeout(task(), timeout) => result,
                        }
                    }
                };
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "Queued task failed");
                }
                let _ = done_tx.send(result);
            })
        });

        self.tx
            .send(QueuedTask {
                cancel: cancel.clone(),
                run,
            })
            .map_err(|_| Error::Cancelled)?;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = done_rx => result.unwrap_or(Err(Error::Cancelled)),
        }
    }
}

async fn with_timeout<T>(
    fut: impl Future<Output = Result<T>>,
    timeout: Option<Duration>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .unwrap_or(Err(Error::Timeout(limit))),
        None => fut.await,
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<QueuedTask>, config: Arc<RateLimitConfig>) {
    let mut window = RateWindow::new(&config);

    while let Some(task) = rx.recv().await {
        let mut cancelled = task.cancel.is_cancelled();

        while !cancelled {
            let Some(wait) = window.delay_until_ready(Instant::now()) else {
                break;
            };
            tracing::debug!(
                wait_ms = wait.as_millis() as u64,
                in_window = window.in_window(),
                "Rate limit reached, waiting",
            );
            tokio::select! {
                _ = task.cancel.cancelled() => cancelled = true,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        if cancelled {
            (task.run)(Dispatch::Skip).await;
            continue;
        }

        window.record(Instant::now());
        (task.run)(Dispatch::Run).await;
    }

    tracing::debug!("Rate limit queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_requests: u32, spacing_secs: u64) -> RateLimitConfig {
        RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            min_spacing: Duration::from_secs(spacing_secs),
            task_timeout: None,
        }
    }

    #[test]
    fn test_first_dispatch_is_immediate() {
        let mut window = RateWindow::new(&RateLimitConfig::default());
        assert_eq!(window.delay_until_ready(Instant::now()), None);
    }

    #[test]
    fn test_spacing_applies_between_dispatches() {
        let mut window = RateWindow::new(&config(5, 12));
        let t0 = Instant::now();
        window.record(t0);

        let wait = window.delay_until_ready(t0 + Duration::from_secs(2));
        assert_eq!(wait, Some(Duration::from_secs(10)));
        assert_eq!(window.delay_until_ready(t0 + Duration::from_secs(12)), None);
    }

    #[test]
    fn test_window_limit_waits_for_oldest_to_expire() {
        let mut window = RateWindow::new(&config(2, 0));
        let t0 = Instant::now();
        window.record(t0);
        window.record(t0 + Duration::from_secs(1));

        let wait = window.delay_until_ready(t0 + Duration::from_secs(5));
        assert_eq!(wait, Some(Duration::from_secs(55)));
        assert_eq!(window.delay_until_ready(t0 + Duration::from_secs(60)), None);
        assert_eq!(window.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_queue() {
        let queue = RateLimitQueue::new(config(5, 0));

        let failed: Result<()> = queue
            .enqueue(|| async { Err(Error::StagingFailed("boom".to_string())) })
            .await;
        let ok = queue.enqueue(|| async { Ok(7) }).await;

        assert!(failed.is_err());
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_task_is_skipped() {
        let queue = RateLimitQueue::new(config(5, 0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = queue
            .enqueue_with_cancel(&cancel, || async { Ok(1) })
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));

        let next = queue.enqueue(|| async { Ok(2) }).await;
        assert_eq!(next.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_task_times_out() {
        let queue = RateLimitQueue::new(RateLimitConfig {
            task_timeout: Some(Duration::from_secs(5)),
            ..config(5, 0)
        });

        let result: Result<()> = queue
            .enqueue(|| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_secs(5)));
    }
}
