//! Per-category throttling of remote calls
//!
//! A [`RateLimiter`] bounds both how many work items run at once and how soon a
//! slot can be reused after its item finishes. Work is admitted strictly in
//! submission order.
//!
//! # Implementation
//!
//! `submit` pushes a boxed job onto an unbounded FIFO channel at call time.
//! A single dispatcher task pops jobs in order, waits for a semaphore permit
//! (one permit per slot), and spawns the job. The permit is held until the job
//! finishes *and* the configured interval has elapsed, so the next item in that
//! slot cannot start earlier.

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use crate::types::LimiterStats;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Capacity of the completion broadcast channel
const COMPLETED_CHANNEL_CAPACITY: usize = 256;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Holds one unit of a shared counter until dropped
///
/// Dropping covers every exit: a job starting, being discarded, finishing or
/// panicking.
struct CountGuard(Arc<AtomicUsize>);

impl CountGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Throttled executor for a homogeneous pool of async work items
///
/// Cloning is cheap; clones share the same queue, slots and counters.
///
/// # Examples
///
/// ```no_run
/// use convo_mirror::config::RateLimitConfig;
/// use convo_mirror::rate_limiter::RateLimiter;
/// use std::time::Duration;
///
/// # async fn example() -> convo_mirror::Result<()> {
/// let limiter: RateLimiter<u32> = RateLimiter::new(RateLimitConfig::new(2, Duration::from_millis(500)));
/// let value = limiter.submit(|| async { Ok(42) }).await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub struct RateLimiter<T> {
    jobs: mpsc::UnboundedSender<Job>,
    running: Arc<AtomicUsize>,
    waiting: Arc<AtomicUsize>,
    completed_tx: broadcast::Sender<T>,
    closed: CancellationToken,
    config: RateLimitConfig,
}

impl<T> Clone for RateLimiter<T> {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            running: Arc::clone(&self.running),
            waiting: Arc::clone(&self.waiting),
            completed_tx: self.completed_tx.clone(),
            closed: self.closed.clone(),
            config: self.config,
        }
    }
}

impl<T> RateLimiter<T>
where
    T: Clone + Send + 'static,
{
    /// Create a limiter and start its dispatcher
    ///
    /// Must be called from within a tokio runtime. A concurrency of 0 is
    /// treated as 1.
    pub fn new(config: RateLimitConfig) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (completed_tx, _rx) = broadcast::channel(COMPLETED_CHANNEL_CAPACITY);
        let closed = CancellationToken::new();

        tokio::spawn(dispatch(
            rx,
            Arc::new(Semaphore::new(config.concurrency.max(1))),
            config.interval,
            closed.clone(),
        ));

        Self {
            jobs,
            running: Arc::new(AtomicUsize::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
            completed_tx,
            closed,
            config,
        }
    }

    /// Enqueue a work item and get a future for its result
    ///
    /// The item is queued immediately, before the returned future is polled,
    /// and runs even if the returned future is dropped. The item's own error
    /// settles only this future. After [`close`](Self::close) the future
    /// resolves to [`Error::ShuttingDown`].
    pub fn submit<F, Fut>(&self, work: F) -> impl Future<Output = Result<T>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let closed = self.closed.clone();

        if !self.closed.is_cancelled() {
            let waiting = CountGuard::new(Arc::clone(&self.waiting));
            let running = Arc::clone(&self.running);
            let completed_tx = self.completed_tx.clone();

            let job: Job = Box::new(move || {
                Box::pin(async move {
                    drop(waiting);
                    let running = CountGuard::new(running);
                    let result = work().await;
                    drop(running);

                    if let Ok(value) = &result
                        && completed_tx.receiver_count() > 0
                    {
                        completed_tx.send(value.clone()).ok();
                    }

                    // Receiver may be gone (caller stopped waiting); the work still counted
                    result_tx.send(result).ok();
                })
            });

            // A send failure drops the job and its result sender, settling the future below
            self.jobs.send(job).ok();
        }

        async move {
            match result_rx.await {
                Ok(result) => result,
                Err(_) if closed.is_cancelled() => Err(Error::ShuttingDown),
                Err(_) => Err(Error::Other(
                    "rate limited work item was dropped before completing".to_string(),
                )),
            }
        }
    }

    /// Observe every successful result
    ///
    /// Failures are not broadcast. Receivers that fall behind lose the oldest values.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.completed_tx.subscribe()
    }

    /// Stop admitting work
    ///
    /// Items already running finish normally; queued items resolve to
    /// [`Error::ShuttingDown`].
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl<T> RateLimiter<T> {
    /// Number of work items currently executing
    pub fn running_count(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of work items waiting for a slot
    pub fn queue_length(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Snapshot of running and waiting counts
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            active: self.running_count(),
            waiting: self.queue_length(),
        }
    }

    /// The limits this limiter enforces
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }
}

/// Pop jobs in submission order and run each once a slot is free
async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Job>,
    slots: Arc<Semaphore>,
    interval: Duration,
    closed: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                // Every limiter handle was dropped
                None => break,
            },
        };

        let permit = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        tokio::spawn(async move {
            job().await;
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            drop(permit);
        });
    }

    tracing::debug!(discarded = rx.len(), "rate limiter dispatcher stopped");
}
