//! Processor implementation

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::clock::{Clock, TokioClock};
use super::queue::{OrderedQueue, Queueable};

/// Errors from processor operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor has been stopped and no longer accepts items.
    #[error("processor is stopped")]
    Closed,
}

/// Callback invoked with each item when it becomes due.
///
/// Called synchronously by the waiter, outside the queue lock. A slow
/// callback delays subsequently-due items but never blocks enqueue/dequeue.
/// The processor treats it as infallible and never retries.
pub type ExecuteFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Queue state guarded by the processor's mutex
struct Inner<T: Queueable> {
    queue: OrderedQueue<T>,
    closed: bool,
}

/// State shared between the public surface and the waiter task
struct Shared<T: Queueable> {
    inner: Mutex<Inner<T>>,
    /// Coalesced wake signal: `notify_one` stores at most one permit, so any
    /// number of signals between waiter wake-ups collapse into one recompute
    /// and senders never block.
    wake: Notify,
    execute_fn: ExecuteFn<T>,
    clock: Arc<dyn Clock>,
}

struct Waiter {
    stop_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// The Processor holds uniquely-keyed items with future due times and hands
/// each one to the execution callback once its due time passes.
///
/// A single background waiter task sleeps until the next item is due; there
/// are no per-item timers and no polling. Enqueueing an item whose key is
/// already queued replaces the earlier scheduling atomically.
pub struct Processor<T: Queueable> {
    shared: Arc<Shared<T>>,
    waiter: Mutex<Option<Waiter>>,
}

impl<T: Queueable> Processor<T> {
    /// Create a processor and start its background waiter.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(execute_fn: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self::with_clock(execute_fn, TokioClock)
    }

    /// Create a processor with an injected time source.
    pub fn with_clock(
        execute_fn: impl Fn(T) + Send + Sync + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: OrderedQueue::new(),
                closed: false,
            }),
            wake: Notify::new(),
            execute_fn: Arc::new(execute_fn),
            clock: Arc::new(clock),
        });

        let (stop_tx, stop_rx) = mpsc::channel(1);
        let task = tokio::spawn(waiter_loop(Arc::clone(&shared), stop_rx));
        debug!("Processor::new: waiter started");

        Self {
            shared,
            waiter: Mutex::new(Some(Waiter { stop_tx, task })),
        }
    }

    /// Add an item to the queue, replacing any existing item with the same key.
    ///
    /// The replacement happens in one critical section, so no observer ever
    /// sees the key absent in between. Returns [`ProcessorError::Closed`]
    /// after [`stop`](Self::stop).
    pub async fn enqueue(&self, item: T) -> Result<(), ProcessorError> {
        let key = item.key();
        debug!(?key, "Processor::enqueue: called");

        let mut inner = self.shared.inner.lock().await;
        if inner.closed {
            debug!(?key, "Processor::enqueue: processor stopped, rejecting");
            return Err(ProcessorError::Closed);
        }

        if inner.queue.remove(&key).is_some() {
            debug!(?key, "Processor::enqueue: replacing existing item");
        }
        inner.queue.push(item);

        // Wake the waiter only when this item became the next one due; the
        // current sleep already ends no later than any other deadline.
        let became_min = inner.queue.peek().is_some_and(|next| next.key() == key);
        drop(inner);

        if became_min {
            trace!(?key, "Processor::enqueue: new minimum, waking waiter");
            self.shared.wake.notify_one();
        }
        Ok(())
    }

    /// Remove the item with this key, if queued. Idempotent: absent keys are
    /// a no-op. A dequeued item is never executed.
    pub async fn dequeue(&self, key: &T::Key) {
        debug!(?key, "Processor::dequeue: called");

        let mut inner = self.shared.inner.lock().await;
        let was_min = inner.queue.peek().is_some_and(|next| next.key() == *key);
        if inner.queue.remove(key).is_none() {
            debug!(?key, "Processor::dequeue: key not queued");
            return;
        }
        drop(inner);

        if was_min {
            trace!(?key, "Processor::dequeue: minimum removed, waking waiter");
            self.shared.wake.notify_one();
        }
    }

    /// Number of items currently queued.
    pub async fn len(&self) -> usize {
        self.shared.inner.lock().await.queue.len()
    }

    /// Due time of the next item to execute, if any.
    pub async fn next_due(&self) -> Option<Instant> {
        let inner = self.shared.inner.lock().await;
        inner.queue.peek().map(|item| item.due_time())
    }

    /// Stop the processor and wait for the waiter task to exit.
    ///
    /// Items still queued are dropped, not executed; callers wanting
    /// drain-to-completion must inspect and dequeue before stopping.
    /// Idempotent: a second call returns immediately.
    pub async fn stop(&self) {
        debug!("Processor::stop: called");
        let Some(waiter) = self.waiter.lock().await.take() else {
            debug!("Processor::stop: already stopped");
            return;
        };

        {
            let mut inner = self.shared.inner.lock().await;
            inner.closed = true;
        }

        // The waiter may exit via the closed flag before reading the channel.
        let _ = waiter.stop_tx.send(()).await;
        if let Err(err) = waiter.task.await {
            warn!(%err, "Processor::stop: waiter task panicked");
        }
        debug!("Processor::stop: waiter exited");
    }
}

/// The single background waiter.
///
/// Idle when the queue is empty, sleeping until the head's due time when it
/// is not; either way a wake signal forces a recompute of the sleep target
/// and a stop request exits promptly without executing remaining items.
async fn waiter_loop<T: Queueable>(shared: Arc<Shared<T>>, mut stop_rx: mpsc::Receiver<()>) {
    debug!("waiter: running");
    loop {
        let next_due = {
            let inner = shared.inner.lock().await;
            if inner.closed {
                break;
            }
            inner.queue.peek().map(|item| item.due_time())
        };

        match next_due {
            None => {
                trace!("waiter: idle");
                tokio::select! {
                    _ = shared.wake.notified() => {
                        trace!("waiter: woken while idle");
                    }
                    _ = stop_rx.recv() => break,
                }
            }
            Some(due) => {
                let delay = due.saturating_duration_since(shared.clock.now());
                trace!(?delay, "waiter: sleeping until next due time");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        drain(&shared).await;
                    }
                    _ = shared.wake.notified() => {
                        trace!("waiter: woken to recompute sleep");
                    }
                    _ = stop_rx.recv() => break,
                }
            }
        }
    }
    debug!("waiter: stopped");
}

/// Pop and execute every item whose due time has elapsed, without re-arming
/// the timer in between, so a burst of items due together is handled in one
/// wake cycle. The lock is held only while mutating the queue; the callback
/// runs outside the critical section.
async fn drain<T: Queueable>(shared: &Shared<T>) {
    loop {
        let item = {
            let mut inner = shared.inner.lock().await;
            if inner.closed {
                return;
            }
            let now = shared.clock.now();
            let head_due = inner.queue.peek().is_some_and(|next| next.due_time() <= now);
            if !head_due {
                return;
            }
            inner.queue.pop_min()
        };

        if let Some(item) = item {
            trace!(key = ?item.key(), "waiter: executing item");
            (shared.execute_fn)(item);
        }
    }
}
