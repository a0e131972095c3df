//! EventQueue - delayed-event queue processor
//!
//! Events are maintained in an in-memory queue ordered by when they are to
//! be executed. Users interact with the [`Processor`]: items go in with
//! [`Processor::enqueue`] and come out through the execution callback once
//! their due time passes. When the queue has at least one item, a single
//! background task waits on the next item to be executed; there are no
//! per-item timers and no polling.
//!
//! # Core Concepts
//!
//! - **One waiter per processor**: a lone background task sleeps until the
//!   earliest due time and drains every item that became due in one wake
//!   cycle, so a burst of items due together costs one wakeup.
//! - **Keys identify items**: enqueueing a key that is already queued
//!   atomically replaces the earlier scheduling; [`Processor::dequeue`]
//!   cancels one by key.
//! - **Coalesced wake signal**: any number of enqueue/dequeue calls between
//!   waiter wake-ups collapse into a single non-blocking recompute signal.
//! - **Abandon on stop**: [`Processor::stop`] joins the waiter and drops
//!   whatever is still queued; shutdown is not a drain-and-flush.
//!
//! # Example
//!
//! ```
//! use eventqueue::{Processor, Queueable};
//! use tokio::time::{Duration, Instant};
//!
//! struct Reminder {
//!     name: &'static str,
//!     due: Instant,
//! }
//!
//! impl Queueable for Reminder {
//!     type Key = &'static str;
//!
//!     fn key(&self) -> &'static str {
//!         self.name
//!     }
//!
//!     fn due_time(&self) -> Instant {
//!         self.due
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let processor = Processor::new(move |item: Reminder| {
//!     let _ = tx.send(item.name);
//! });
//!
//! processor
//!     .enqueue(Reminder {
//!         name: "item1",
//!         due: Instant::now() + Duration::from_millis(20),
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(rx.recv().await, Some("item1"));
//! processor.stop().await;
//! # }
//! ```

pub mod processor;

pub use processor::{
    Clock, ExecuteFn, OrderedQueue, Processor, ProcessorError, Queueable, TokioClock,
};
