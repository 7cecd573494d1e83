//! Debounced change buffering.
//!
//! Raw file events are accumulated and flushed as one batch when the
//! buffer goes idle for `debounce_seconds`, when `max_wait_seconds` have
//! passed since the first buffered event, or when `batch_size` events are
//! buffered, whichever happens first.
//!
//! [`ChangeBuffer`] is the synchronous accumulation; [`DebounceTimer`] is
//! the single cancel-and-reschedule deadline; [`run_change_buffer`] drives
//! both from a channel. The buffer task is the only owner of the pending
//! events, so a drain can never interleave with a new event.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error};

use crate::domain::models::{BufferConfig, ChangeBatch, FileChangeEvent, FlushReason};

/// A single reschedulable deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebounceTimer {
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any pending deadline with `at`.
    pub fn reschedule(&mut self, at: Instant) {
        self.deadline = Some(at);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolves when the current deadline passes; never resolves when the
    /// timer is not armed. The future does not borrow the timer.
    pub fn fired(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        }
    }
}

/// Pending events plus the timestamps that drive the flush rules.
#[derive(Debug)]
pub struct ChangeBuffer {
    debounce: Duration,
    max_wait: Duration,
    batch_size: usize,
    events: Vec<FileChangeEvent>,
    first_at: Option<Instant>,
    last_at: Option<Instant>,
}

impl ChangeBuffer {
    pub fn new(config: &BufferConfig) -> Self {
        Self {
            debounce: Duration::from_secs(config.debounce_seconds),
            max_wait: Duration::from_secs(config.max_wait_seconds),
            batch_size: config.batch_size.max(1),
            events: Vec::new(),
            first_at: None,
            last_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Buffer an event. Returns a full batch when `batch_size` is reached.
    pub fn push(&mut self, event: FileChangeEvent, now: Instant) -> Option<ChangeBatch> {
        self.first_at.get_or_insert(now);
        self.last_at = Some(now);
        self.events.push(event);

        if self.events.len() >= self.batch_size {
            return self.drain(FlushReason::BatchFull);
        }
        None
    }

    /// Earliest instant at which the buffer must flush.
    pub fn deadline(&self) -> Option<Instant> {
        let idle = self.last_at? + self.debounce;
        let absolute = self.first_at? + self.max_wait;
        Some(idle.min(absolute))
    }

    /// Which rule, if any, requires a flush at `now`.
    pub fn due_reason(&self, now: Instant) -> Option<FlushReason> {
        let first = self.first_at?;
        let last = self.last_at?;
        if now >= first + self.max_wait {
            Some(FlushReason::MaxWait)
        } else if now >= last + self.debounce {
            Some(FlushReason::Idle)
        } else {
            None
        }
    }

    /// Take every pending event. Returns `None` when nothing is buffered.
    pub fn drain(&mut self, reason: FlushReason) -> Option<ChangeBatch> {
        self.first_at = None;
        self.last_at = None;
        if self.events.is_empty() {
            return None;
        }
        Some(ChangeBatch {
            events: std::mem::take(&mut self.events),
            reason,
        })
    }
}

/// Drive a [`ChangeBuffer`] from `events`, sending flushed batches to
/// `batches`.
///
/// Runs until the event channel closes, then flushes whatever is left.
/// Observers running on their own OS thread feed it with
/// `Sender::blocking_send`.
pub async fn run_change_buffer(
    config: BufferConfig,
    mut events: mpsc::Receiver<FileChangeEvent>,
    batches: mpsc::Sender<ChangeBatch>,
) {
    let mut buffer = ChangeBuffer::new(&config);
    let mut timer = DebounceTimer::new();

    loop {
        let flushed = tokio::select! {
            received = events.recv() => match received {
                Some(event) => {
                    let full = buffer.push(event, Instant::now());
                    match (&full, buffer.deadline()) {
                        (None, Some(deadline)) => timer.reschedule(deadline),
                        _ => timer.cancel(),
                    }
                    full
                }
                None => {
                    timer.cancel();
                    if let Some(batch) = buffer.drain(FlushReason::Shutdown) {
                        forward(&batches, batch).await;
                    }
                    debug!("change event source closed; buffer stopped");
                    return;
                }
            },
            () = timer.fired() => {
                timer.cancel();
                let reason = buffer.due_reason(Instant::now()).unwrap_or(FlushReason::Idle);
                buffer.drain(reason)
            }
        };

        if let Some(batch) = flushed {
            if !forward(&batches, batch).await {
                return;
            }
        }
    }
}

async fn forward(batches: &mpsc::Sender<ChangeBatch>, batch: ChangeBatch) -> bool {
    let count = batch.len();
    let reason = batch.reason;
    debug!(count, ?reason, "flushing change batch");
    if batches.send(batch).await.is_err() {
        error!(count, "batch consumer closed; dropping flushed changes");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ChangeType;
    use chrono::Utc;

    fn config(debounce: u64, max_wait: u64, batch_size: usize) -> BufferConfig {
        BufferConfig {
            debounce_seconds: debounce,
            max_wait_seconds: max_wait,
            batch_size,
        }
    }

    fn event(path: &str) -> FileChangeEvent {
        FileChangeEvent::new(path, ChangeType::Modified, Utc::now()).with_lines(1, 0)
    }

    fn spawn_buffer(cfg: BufferConfig) -> (mpsc::Sender<FileChangeEvent>, mpsc::Receiver<ChangeBatch>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (batch_tx, batch_rx) = mpsc::channel(64);
        tokio::spawn(run_change_buffer(cfg, event_rx, batch_tx));
        (event_tx, batch_rx)
    }

    #[test]
    fn test_deadline_is_earliest_rule() {
        let mut buffer = ChangeBuffer::new(&config(5, 8, 100));
        let t0 = Instant::now();
        assert!(buffer.deadline().is_none());

        buffer.push(event("a"), t0);
        assert_eq!(buffer.deadline(), Some(t0 + Duration::from_secs(5)));

        buffer.push(event("b"), t0 + Duration::from_secs(4));
        // Idle deadline would be t0+9s; the absolute cap wins.
        assert_eq!(buffer.deadline(), Some(t0 + Duration::from_secs(8)));
        assert_eq!(buffer.due_reason(t0 + Duration::from_secs(8)), Some(FlushReason::MaxWait));
        assert_eq!(buffer.due_reason(t0 + Duration::from_secs(5)), None);
    }

    #[test]
    fn test_drain_empty_is_noop() {
        let mut buffer = ChangeBuffer::new(&config(5, 60, 10));
        assert!(buffer.drain(FlushReason::Idle).is_none());
    }

    #[test]
    fn test_batch_size_flushes_immediately() {
        let mut buffer = ChangeBuffer::new(&config(5, 60, 2));
        let now = Instant::now();
        assert!(buffer.push(event("a"), now).is_none());
        let batch = buffer.push(event("b"), now).expect("full batch");
        assert_eq!(batch.reason, FlushReason::BatchFull);
        assert_eq!(batch.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_flush_after_debounce() {
        let (tx, mut rx) = spawn_buffer(config(5, 60, 100));
        let start = Instant::now();

        tx.send(event("a.rs")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(event("b.rs")).await.unwrap();

        let batch = rx.recv().await.expect("batch");
        assert_eq!(batch.reason, FlushReason::Idle);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.events[0].path, "a.rs");
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_wait_under_continuous_activity() {
        let (tx, mut rx) = spawn_buffer(config(5, 10, 100));
        let start = Instant::now();

        let producer = tokio::spawn(async move {
            for i in 0..10 {
                tx.send(event(&format!("f{i}.rs"))).await.unwrap();
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        });

        let batch = rx.recv().await.expect("batch");
        assert_eq!(batch.reason, FlushReason::MaxWait);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        producer.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_remaining() {
        let (tx, mut rx) = spawn_buffer(config(30, 60, 100));
        tx.send(event("a.rs")).await.unwrap();
        drop(tx);

        let batch = rx.recv().await.expect("batch");
        assert_eq!(batch.reason, FlushReason::Shutdown);
        assert_eq!(batch.len(), 1);
        assert!(rx.recv().await.is_none());
    }
}
