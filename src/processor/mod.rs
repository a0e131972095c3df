//! Delayed-event queue processor
//!
//! Items are kept in an in-memory queue ordered by due time. A single
//! background waiter task sleeps until the next item is due and hands it to
//! the execution callback; enqueueing an earlier item or removing the head
//! wakes the waiter to recompute its sleep.

mod clock;
mod core;
mod queue;

pub use clock::{Clock, TokioClock};
pub use core::{ExecuteFn, Processor, ProcessorError};
pub use queue::{OrderedQueue, Queueable};
