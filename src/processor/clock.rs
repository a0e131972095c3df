//! Injectable time source for due-time comparison

use tokio::time::Instant;

/// Time source the processor reads when deciding whether an item is due.
///
/// Injectable so tests can control time; the default reads the tokio clock,
/// which is already virtualized under `#[tokio::test(start_paused = true)]`.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Default clock backed by [`tokio::time::Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
