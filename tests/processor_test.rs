//! Integration tests for the delayed-event queue processor
//!
//! These run under tokio's paused clock, so due times are exact and the
//! tests complete without real waiting.

use std::sync::Arc;

use eventqueue::{Clock, Processor, Queueable};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::{Duration, Instant, sleep};

#[derive(Debug, Clone)]
struct Reminder {
    name: String,
    due: Instant,
}

impl Reminder {
    fn new(name: &str, due: Instant) -> Self {
        Self {
            name: name.to_string(),
            due,
        }
    }
}

impl Queueable for Reminder {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }

    fn due_time(&self) -> Instant {
        self.due
    }
}

/// Processor whose callback records each executed item and when it ran.
fn recording_processor() -> (Processor<Reminder>, UnboundedReceiver<(String, Instant)>) {
    let (tx, rx) = unbounded_channel();
    let processor = Processor::new(move |item: Reminder| {
        let _ = tx.send((item.name, Instant::now()));
    });
    (processor, rx)
}

fn in_ms(ms: u64) -> Instant {
    Instant::now() + Duration::from_millis(ms)
}

// =============================================================================
// Execution ordering
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_replace_and_dequeue_scenario() {
    let (processor, mut rx) = recording_processor();

    processor.enqueue(Reminder::new("a", in_ms(500))).await.unwrap();
    processor.enqueue(Reminder::new("b", in_ms(200))).await.unwrap();
    processor.enqueue(Reminder::new("c", in_ms(300))).await.unwrap();
    processor.enqueue(Reminder::new("d", in_ms(1000))).await.unwrap();

    // Re-enqueueing "c" replaces its scheduling; dequeueing "d" cancels it.
    processor.enqueue(Reminder::new("c", in_ms(100))).await.unwrap();
    processor.dequeue(&"d".to_string()).await;

    let mut executed = Vec::new();
    for _ in 0..3 {
        let (name, _) = rx.recv().await.expect("callback channel closed");
        executed.push(name);
    }
    assert_eq!(executed, vec!["c", "b", "a"]);

    // "d" must never execute, even well past its original due time.
    sleep(Duration::from_millis(1500)).await;
    assert!(rx.try_recv().is_err());

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shuffled_enqueue_executes_in_due_order() {
    let (processor, mut rx) = recording_processor();

    for (name, offset) in [
        ("g", 700),
        ("b", 200),
        ("e", 500),
        ("a", 100),
        ("f", 600),
        ("c", 300),
        ("d", 400),
    ] {
        processor.enqueue(Reminder::new(name, in_ms(offset))).await.unwrap();
    }

    let mut executed = Vec::new();
    for _ in 0..7 {
        let (name, _) = rx.recv().await.expect("callback channel closed");
        executed.push(name);
    }
    assert_eq!(executed, vec!["a", "b", "c", "d", "e", "f", "g"]);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_items_due_together_drain_in_one_wake_cycle() {
    let (processor, mut rx) = recording_processor();
    let due = in_ms(100);

    processor.enqueue(Reminder::new("b", due)).await.unwrap();
    processor.enqueue(Reminder::new("a", due)).await.unwrap();

    let (first, first_at) = rx.recv().await.expect("callback channel closed");
    let (second, second_at) = rx.recv().await.expect("callback channel closed");

    // Key order on equal due times, and no intervening sleep between them.
    assert_eq!(first, "a");
    assert_eq!(second, "b");
    assert_eq!(first_at, second_at);

    processor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_never_fires_early() {
    let (processor, mut rx) = recording_processor();
    let due = in_ms(400);

    processor.enqueue(Reminder::new("a", due)).await.unwrap();

    let (_, fired_at) = rx.recv().await.expect("callback channel closed");
    assert!(fired_at >= due, "fired before due time");

    processor.stop().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_with_items_queued_silences_the_queue() {
    let (processor, mut rx) = recording_processor();

    processor.enqueue(Reminder::new("a", in_ms(100))).await.unwrap();
    processor.enqueue(Reminder::new("b", in_ms(200))).await.unwrap();

    // stop() returns only once the waiter has exited, so anything executing
    // would already be in the channel.
    processor.stop().await;

    sleep(Duration::from_millis(500)).await;
    assert!(rx.try_recv().is_err(), "item executed after stop");
    assert!(matches!(
        processor.enqueue(Reminder::new("c", in_ms(100))).await,
        Err(eventqueue::ProcessorError::Closed)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_after_execution_reschedules_same_key() {
    let (processor, mut rx) = recording_processor();

    processor.enqueue(Reminder::new("a", in_ms(100))).await.unwrap();
    let (name, _) = rx.recv().await.expect("callback channel closed");
    assert_eq!(name, "a");

    // Once executed the key is free again; a fresh enqueue schedules anew.
    processor.enqueue(Reminder::new("a", in_ms(100))).await.unwrap();
    let (name, _) = rx.recv().await.expect("callback channel closed");
    assert_eq!(name, "a");

    processor.stop().await;
}

// =============================================================================
// Injected clock
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct FrozenClock(Instant);

impl Clock for FrozenClock {
    fn now(&self) -> Instant {
        self.0
    }
}

#[tokio::test(start_paused = true)]
async fn test_injected_clock_drives_due_comparison() {
    let (tx, mut rx) = unbounded_channel();

    // The injected clock already sits past the item's due time, so the item
    // is due immediately regardless of the runtime clock.
    let clock = FrozenClock(Instant::now() + Duration::from_secs(3600));
    let processor = Processor::with_clock(
        move |item: Reminder| {
            let _ = tx.send(item.name);
        },
        clock,
    );

    processor
        .enqueue(Reminder::new("a", in_ms(600_000)))
        .await
        .unwrap();

    assert_eq!(rx.recv().await.as_deref(), Some("a"));
    processor.stop().await;
}

// =============================================================================
// Concurrent callers
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_enqueuers_share_one_processor() {
    let (processor, mut rx) = recording_processor();
    let processor = Arc::new(processor);

    let mut handles = Vec::new();
    for i in 0..8u64 {
        let processor = Arc::clone(&processor);
        handles.push(tokio::spawn(async move {
            let name = format!("item{i}");
            processor
                .enqueue(Reminder::new(&name, in_ms(100 + i * 10)))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(processor.len().await, 8);

    let mut executed = Vec::new();
    for _ in 0..8 {
        let (name, _) = rx.recv().await.expect("callback channel closed");
        executed.push(name);
    }
    let expected: Vec<String> = (0..8).map(|i| format!("item{i}")).collect();
    assert_eq!(executed, expected);

    processor.stop().await;
}
