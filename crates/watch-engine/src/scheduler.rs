//! Single-loop scheduler for watcher ticks

use crate::runner::GroupRunner;
use crate::watcher::{TickOutcome, Watcher};
use futures::FutureExt;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::panic::AssertUnwindSafe;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Emitted after every tick
#[derive(Debug, Clone, Serialize)]
pub struct TickEvent {
    pub watcher: String,
    pub outcome: TickOutcome,
    /// Attempt counter after the tick
    pub attempts: u32,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Entry {
    due: Instant,
    /// Insertion order breaks ties between equal due times
    sequence: u64,
    index: usize,
}

/// Time-ordered queue of pending watcher ticks
///
/// Ticks run one at a time on the calling task; a slow tick delays every
/// other watcher.
pub struct Scheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    sequence: u64,
    event_tx: broadcast::Sender<TickEvent>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new scheduler
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            queue: BinaryHeap::new(),
            sequence: 0,
            event_tx,
        }
    }

    /// Subscribe to tick events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TickEvent> {
        self.event_tx.subscribe()
    }

    /// Number of queued ticks
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn schedule(&mut self, index: usize, due: Instant) {
        self.sequence += 1;
        self.queue.push(Reverse(Entry {
            due,
            sequence: self.sequence,
            index,
        }));
    }

    /// Tick every watcher, starting immediately, until `cancel` fires
    ///
    /// A tick that panics is logged, its watcher's attempts are reset, and
    /// it is rescheduled like any other.
    pub async fn run(
        &mut self,
        watchers: &mut [Watcher],
        runner: &GroupRunner,
        cancel: &CancellationToken,
    ) {
        let start = Instant::now();
        for index in 0..watchers.len() {
            self.schedule(index, start);
        }

        while let Some(Reverse(entry)) = self.queue.pop() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep_until(entry.due) => {}
            }

            let watcher = &mut watchers[entry.index];
            let span = tracing::info_span!("watcher", name = %watcher.name());
            let tick = watcher.tick(runner).instrument(span);
            let outcome = match AssertUnwindSafe(tick).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => {
                    tracing::error!(
                        "Tick for watcher '{}' panicked: {}",
                        watcher.name(),
                        crate::executor::panic_message(payload)
                    );
                    watcher.reset();
                    TickOutcome::Panicked
                }
            };

            let _ = self.event_tx.send(TickEvent {
                watcher: watcher.name().to_string(),
                outcome,
                attempts: watcher.attempts(),
            });

            if cancel.is_cancelled() {
                break;
            }

            let next = watcher.next_due(entry.due, Instant::now());
            tracing::debug!(
                "Next tick for watcher '{}' in {:?}",
                watcher.name(),
                next.saturating_duration_since(Instant::now())
            );
            self.schedule(entry.index, next);
        }
    }
}
