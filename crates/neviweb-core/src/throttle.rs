// ── Write throttle ──
//
// Neviweb drops or rejects writes that arrive concurrently or in quick
// succession. Every attribute write takes a ticket from this queue first:
// at most `concurrency` writes run at once, starts are spaced by
// `min_spacing`, and waiters are served by priority, then arrival order.
//
// A ticket is handed directly from the finishing write to the next
// waiter through a oneshot channel, so a slot is never up for grabs
// between the two.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use neviweb_api::duration_millis;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, trace};

use crate::config::ThrottleConfig;
use crate::error::CoreError;

/// Queue priority of a write. Higher is served first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

struct Waiter {
    priority: Priority,
    seq: u64,
    tx: oneshot::Sender<Ticket>,
}

// Max-heap order: highest priority first, then lowest sequence number.
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

#[derive(Default)]
struct QueueState {
    running: usize,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,
    /// Start time reserved by the most recent write.
    last_start: Option<Instant>,
}

impl QueueState {
    /// Forget waiters that gave up (timed out or were cancelled).
    fn prune(&mut self) {
        self.waiters.retain(|w| !w.tx.is_closed());
    }

    fn pending(&self) -> usize {
        self.running + self.waiters.len()
    }
}

struct Inner {
    state: Mutex<QueueState>,
    config: ThrottleConfig,
    wait: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand the slot to the next live waiter, or free it.
    fn release(self: &Arc<Self>) {
        let mut declined = Vec::new();
        {
            let mut state = self.lock();
            loop {
                let Some(waiter) = state.waiters.pop() else {
                    state.running = state.running.saturating_sub(1);
                    break;
                };
                match waiter.tx.send(Ticket::armed(Arc::clone(self))) {
                    Ok(()) => {
                        trace!(seq = waiter.seq, priority = %waiter.priority, "write ticket handed over");
                        break;
                    }
                    // The waiter left; its ticket must not release again.
                    Err(mut ticket) => {
                        ticket.inner = None;
                        declined.push(ticket);
                    }
                }
            }
        }
        drop(declined);
    }
}

/// Permission to run one write. Dropping it passes the slot on.
pub struct Ticket {
    inner: Option<Arc<Inner>>,
}

impl Ticket {
    fn armed(inner: Arc<Inner>) -> Self {
        Self { inner: Some(inner) }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

/// Priority-aware, bounded write queue.
#[derive(Clone)]
pub struct WriteThrottle {
    inner: Arc<Inner>,
}

impl WriteThrottle {
    /// `wait` bounds how long a write may queue for its ticket.
    pub fn new(config: ThrottleConfig, wait: Duration) -> Self {
        let config = ThrottleConfig {
            concurrency: config.concurrency.max(1),
            max_pending: config.max_pending.max(1),
            ..config
        };
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                config,
                wait,
            }),
        }
    }

    /// Writes running or waiting right now.
    pub fn pending(&self) -> usize {
        let mut state = self.inner.lock();
        state.prune();
        state.pending()
    }

    /// Take a ticket, waiting behind earlier and higher-priority writes.
    ///
    /// Fails with `Busy` when the queue is at its ceiling and with
    /// `LockTimeout` when no ticket arrives within the wait bound.
    pub async fn acquire(&self, priority: Priority) -> Result<Ticket, CoreError> {
        let rx = {
            let mut state = self.inner.lock();
            state.prune();

            let pending = state.pending();
            if pending >= self.inner.config.max_pending {
                debug!(pending, "write queue full");
                return Err(CoreError::Busy { pending });
            }

            if state.running < self.inner.config.concurrency && state.waiters.is_empty() {
                state.running += 1;
                return Ok(Ticket::armed(Arc::clone(&self.inner)));
            }

            let (tx, rx) = oneshot::channel();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiters.push(Waiter { priority, seq, tx });
            trace!(seq, %priority, waiting = state.waiters.len(), "write queued");
            rx
        };

        match timeout(self.inner.wait, rx).await {
            Ok(Ok(ticket)) => Ok(ticket),
            Ok(Err(_)) => Err(CoreError::Internal("write queue dropped a waiter".into())),
            Err(_) => Err(CoreError::LockTimeout {
                resource: "write ticket".into(),
                waited_ms: duration_millis(self.inner.wait),
            }),
        }
    }

    /// Run exactly one write under a ticket, respecting the minimum
    /// spacing between write starts.
    pub async fn enqueue<F, Fut, T, E>(&self, priority: Priority, op: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        CoreError: From<E>,
    {
        let ticket = self.acquire(priority).await?;
        self.space_out().await;
        let result = op().await;
        drop(ticket);
        result.map_err(CoreError::from)
    }

    /// Reserve the next start slot and sleep until it.
    async fn space_out(&self) {
        let start = {
            let mut state = self.inner.lock();
            let now = Instant::now();
            let start = state
                .last_start
                .map_or(now, |last| now.max(last + self.inner.config.min_spacing));
            state.last_start = Some(start);
            start
        };
        sleep_until(start).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use futures_util::future::join_all;

    use super::*;

    fn throttle(concurrency: usize, max_pending: usize, min_spacing: Duration) -> WriteThrottle {
        WriteThrottle::new(
            ThrottleConfig {
                concurrency,
                max_pending,
                min_spacing,
            },
            Duration::from_secs(5),
        )
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn spawn_write(
        throttle: &WriteThrottle,
        log: &Log,
        priority: Priority,
        name: &'static str,
    ) -> tokio::task::JoinHandle<Result<(), CoreError>> {
        let throttle = throttle.clone();
        let log = Arc::clone(log);
        tokio::spawn(async move {
            throttle
                .enqueue(priority, || async move {
                    log.lock().unwrap().push(name);
                    Ok::<_, CoreError>(())
                })
                .await
        })
    }

    #[tokio::test(start_paused = true)]
    async fn writes_run_in_arrival_order() {
        let throttle = throttle(1, 16, Duration::ZERO);
        let log: Log = Arc::default();

        let holder = throttle.acquire(Priority::Normal).await.unwrap();
        let mut handles = Vec::new();
        for name in ["a", "b", "c", "d"] {
            handles.push(spawn_write(&throttle, &log, Priority::Normal, name));
            tokio::task::yield_now().await;
        }
        assert_eq!(throttle.pending(), 5);

        drop(holder);
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn higher_priority_jumps_the_queue() {
        let throttle = throttle(1, 16, Duration::ZERO);
        let log: Log = Arc::default();

        let holder = throttle.acquire(Priority::Normal).await.unwrap();
        let mut handles = Vec::new();
        for (priority, name) in [
            (Priority::Low, "low"),
            (Priority::Normal, "normal"),
            (Priority::High, "high"),
            (Priority::Normal, "normal-2"),
        ] {
            handles.push(spawn_write(&throttle, &log, priority, name));
            tokio::task::yield_now().await;
        }

        drop(holder);
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(
            *log.lock().unwrap(),
            vec!["high", "normal", "normal-2", "low"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_capped() {
        let throttle = throttle(2, 16, Duration::ZERO);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let writes = (0..6).map(|_| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            throttle.enqueue(Priority::Normal, move || async move {
                let now = running.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                peak.fetch_max(now, AtomicOrdering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                running.fetch_sub(1, AtomicOrdering::SeqCst);
                Ok::<_, CoreError>(())
            })
        });
        for result in join_all(writes).await {
            result.unwrap();
        }

        assert_eq!(peak.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(throttle.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn starts_are_spaced() {
        let throttle = throttle(1, 16, Duration::from_millis(250));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let writes = (0..3).map(|_| {
            let starts = Arc::clone(&starts);
            throttle.enqueue(Priority::Normal, move || async move {
                starts.lock().unwrap().push(Instant::now());
                Ok::<_, CoreError>(())
            })
        });
        for result in join_all(writes).await {
            result.unwrap();
        }

        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_is_busy() {
        let throttle = throttle(1, 2, Duration::ZERO);
        let log: Log = Arc::default();

        let holder = throttle.acquire(Priority::Normal).await.unwrap();
        let queued = spawn_write(&throttle, &log, Priority::Normal, "queued");
        tokio::task::yield_now().await;

        let result = throttle.acquire(Priority::High).await;
        assert!(matches!(result, Err(CoreError::Busy { pending: 2 })));

        drop(holder);
        queued.await.unwrap().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["queued"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ticket_wait_is_bounded_and_does_not_leak() {
        let throttle = WriteThrottle::new(ThrottleConfig::default(), Duration::from_secs(1));

        let holder = throttle.acquire(Priority::Normal).await.unwrap();
        let result = throttle.acquire(Priority::Normal).await;
        assert!(matches!(result, Err(CoreError::LockTimeout { waited_ms: 1_000, .. })));
        assert_eq!(throttle.pending(), 1);

        drop(holder);
        assert_eq!(throttle.pending(), 0);
        let again = throttle.acquire(Priority::Low).await.unwrap();
        assert_eq!(throttle.pending(), 1);
        drop(again);
    }

    #[tokio::test(start_paused = true)]
    async fn write_error_is_returned_and_slot_freed() {
        let throttle = throttle(1, 16, Duration::ZERO);

        let result: Result<(), CoreError> = throttle
            .enqueue(Priority::Normal, || async {
                Err(neviweb_api::Error::Rejected {
                    status: 500,
                    code: None,
                    payload: "nope".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(CoreError::Api { status: Some(500), .. })));
        assert_eq!(throttle.pending(), 0);
    }
}
