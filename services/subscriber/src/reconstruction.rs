//! Fixed-cadence reconstruction of the book mirror
//!
//! The engine wakes on a timer, independent of arrival rate. Each tick
//! drains the whole ingest queue (the only time it takes the queue lock),
//! applies the drained messages to the mirror outside the lock, then
//! publishes a fresh `BookView` and one `RowChanged` per level updated in
//! place.
//!
//! The engine is the sole owner of the `BookMirror`. Readers only ever see
//! the `Arc<BookView>` snapshots sent through the watch channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use book_types::book::MAX_DEPTH;

use crate::cancelled;
use crate::events::{now_nanos, RowChanged};
use crate::metrics::BookMetrics;
use crate::mirror::{BatchOutcome, BookMirror, BookView};
use crate::queue::IngestQueue;

/// Capacity of the row-change broadcast; slow receivers observe a lag.
pub const ROW_EVENT_CAPACITY: usize = 1024;

/// Engine cadence and mirror depth.
#[derive(Debug, Clone)]
pub struct ReconstructionConfig {
    /// Time between ticks.
    pub tick_interval: Duration,
    /// Levels kept per side.
    pub depth: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            depth: MAX_DEPTH,
        }
    }
}

/// Runtime cadence of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub interval: Duration,
    pub paused: bool,
}

/// Pause, resume, and re-time a running engine.
#[derive(Debug, Clone)]
pub struct EngineControl {
    tx: Arc<watch::Sender<Cadence>>,
}

impl EngineControl {
    /// Stop applying batches. The queue keeps filling.
    pub fn pause(&self) {
        self.tx.send_modify(|c| c.paused = true);
    }

    pub fn resume(&self) {
        self.tx.send_modify(|c| c.paused = false);
    }

    /// Change the tick interval. Zero is ignored.
    pub fn set_interval(&self, interval: Duration) {
        if interval.is_zero() {
            return;
        }
        self.tx.send_modify(|c| c.interval = interval);
    }

    /// Set the cadence as ticks per second (interval = 1000 / speed ms).
    pub fn set_speed(&self, speed: u32) {
        self.set_interval(Duration::from_millis(1000 / u64::from(speed.max(1))));
    }

    pub fn current(&self) -> Cadence {
        *self.tx.borrow()
    }
}

/// Receivers a presentation layer subscribes to.
#[derive(Clone)]
pub struct EngineHandles {
    pub view: watch::Receiver<Arc<BookView>>,
    rows: broadcast::Sender<RowChanged>,
    pub control: EngineControl,
}

impl EngineHandles {
    /// New receiver for row-change events.
    pub fn subscribe_rows(&self) -> broadcast::Receiver<RowChanged> {
        self.rows.subscribe()
    }

    /// Latest published view.
    pub fn latest_view(&self) -> Arc<BookView> {
        Arc::clone(&self.view.borrow())
    }
}

/// Drains the ingest queue into the mirror on a fixed cadence.
pub struct ReconstructionEngine {
    mirror: BookMirror,
    queue: Arc<IngestQueue>,
    metrics: Arc<BookMetrics>,
    view_tx: watch::Sender<Arc<BookView>>,
    rows_tx: broadcast::Sender<RowChanged>,
    cadence_rx: watch::Receiver<Cadence>,
}

impl ReconstructionEngine {
    pub fn new(
        config: &ReconstructionConfig,
        queue: Arc<IngestQueue>,
        metrics: Arc<BookMetrics>,
    ) -> (Self, EngineHandles) {
        let mirror = BookMirror::new(config.depth);
        let (view_tx, view_rx) = watch::channel(Arc::new(mirror.view()));
        let (rows_tx, _) = broadcast::channel(ROW_EVENT_CAPACITY);
        let (cadence_tx, cadence_rx) = watch::channel(Cadence {
            interval: config.tick_interval,
            paused: false,
        });

        let handles = EngineHandles {
            view: view_rx,
            rows: rows_tx.clone(),
            control: EngineControl {
                tx: Arc::new(cadence_tx),
            },
        };
        let engine = Self {
            mirror,
            queue,
            metrics,
            view_tx,
            rows_tx,
            cadence_rx,
        };
        (engine, handles)
    }

    pub fn mirror(&self) -> &BookMirror {
        &self.mirror
    }

    /// Drain, apply, and publish once. Returns `None` if the queue was empty.
    pub fn tick(&mut self) -> Option<BatchOutcome> {
        let batch = self.queue.drain();

        if batch.overload_signals > 0 {
            self.metrics.record_dropped(batch.overload_signals);
            warn!(
                signals = batch.overload_signals,
                drained = batch.messages.len(),
                threshold = self.queue.overload_threshold(),
                "Ingest queue above overload threshold"
            );
        }

        if batch.messages.is_empty() {
            return None;
        }

        let started = Instant::now();
        let outcome = self.mirror.apply_batch(&batch.messages);
        let view = Arc::new(self.mirror.view());
        self.view_tx.send_replace(view);

        let timestamp = now_nanos();
        for &(side, id) in &outcome.updated {
            if let Some(rank) = self.mirror.rank_of(side, id) {
                // No receivers is fine
                let _ = self.rows_tx.send(RowChanged::new(side, rank, timestamp));
            }
        }

        self.metrics.record_batch(outcome.messages, started.elapsed());
        debug!(
            messages = outcome.messages,
            entries = outcome.entries,
            updated = outcome.updated.len(),
            evicted = outcome.evicted,
            "Batch applied"
        );
        Some(outcome)
    }

    /// Tick until cancelled, then apply whatever is still queued.
    ///
    /// Returns the mirror so callers can inspect the final state.
    pub async fn run(mut self, mut cancel: watch::Receiver<bool>) -> BookMirror {
        let mut cadence = *self.cadence_rx.borrow_and_update();
        let mut ticker = new_ticker(cadence.interval);
        let mut control_open = true;

        info!(
            interval_ms = cadence.interval.as_millis() as u64,
            depth = self.mirror.depth(),
            "Reconstruction started"
        );

        loop {
            tokio::select! {
                _ = cancelled(&mut cancel) => break,
                changed = self.cadence_rx.changed(), if control_open => {
                    if changed.is_err() {
                        control_open = false;
                        continue;
                    }
                    let next = *self.cadence_rx.borrow_and_update();
                    if next.interval != cadence.interval {
                        ticker = new_ticker(next.interval);
                    }
                    if next.paused != cadence.paused {
                        info!(paused = next.paused, "Reconstruction cadence changed");
                    }
                    cadence = next;
                }
                _ = ticker.tick() => {
                    if !cadence.paused {
                        self.tick();
                    }
                }
            }
        }

        self.tick();
        info!(
            batches = self.mirror.batches_applied(),
            "Reconstruction stopped"
        );
        self.mirror
    }
}

fn new_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

#[cfg(test)]
mod tests {
    use super::*;
    use book_types::book::Side;
    use book_types::message::{UpdateEntry, UpdateMessage};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn engine() -> (ReconstructionEngine, EngineHandles, Arc<IngestQueue>, Arc<BookMetrics>) {
        let queue = Arc::new(IngestQueue::with_defaults());
        let metrics = Arc::new(BookMetrics::new());
        let (engine, handles) = ReconstructionEngine::new(
            &ReconstructionConfig::default(),
            Arc::clone(&queue),
            Arc::clone(&metrics),
        );
        (engine, handles, queue, metrics)
    }

    fn bid(entry: UpdateEntry) -> UpdateMessage {
        UpdateMessage::delta("BTC/USD", Side::Bid, entry)
    }

    #[test]
    fn test_empty_tick_publishes_nothing() {
        let (mut engine, handles, _, metrics) = engine();
        assert!(engine.tick().is_none());
        assert_eq!(handles.latest_view().version, 0);
        assert_eq!(metrics.snapshot().batches_applied, 0);
    }

    #[test]
    fn test_tick_publishes_view_and_row_events() {
        let (mut engine, handles, queue, metrics) = engine();
        let mut rows = handles.subscribe_rows();

        queue.push(bid(UpdateEntry::update(dec("9999.9"), 5)));
        queue.push(bid(UpdateEntry::update(dec("9999.8"), 5)));
        engine.tick();

        queue.push(bid(UpdateEntry::update(dec("9999.8"), 42)));
        engine.tick();

        let view = handles.latest_view();
        assert_eq!(view.version, 2);
        assert_eq!(view.bids[1].quantity, 42);

        let event = rows.try_recv().unwrap();
        assert_eq!(event.side, Side::Bid);
        assert_eq!(event.rank, 1);
        assert!(rows.try_recv().is_err());

        let snap = metrics.snapshot();
        assert_eq!(snap.batches_applied, 2);
        assert_eq!(snap.last_batch_size, 1);
    }

    #[test]
    fn test_overload_counted_but_applied() {
        let (mut engine, _, queue, metrics) = engine();
        queue.push_all((0..1005).map(|i| bid(UpdateEntry::insert(Decimal::from(i + 1), 1))));

        let outcome = engine.tick().unwrap();

        assert_eq!(outcome.messages, 1005);
        assert_eq!(metrics.snapshot().updates_dropped, 4);
        assert_eq!(engine.mirror().len(Side::Bid), 50);
    }

    #[test]
    fn test_engine_control_speed() {
        let (_, handles, _, _) = engine();
        handles.control.set_speed(4);
        assert_eq!(handles.control.current().interval, Duration::from_millis(250));

        handles.control.set_interval(Duration::ZERO);
        assert_eq!(handles.control.current().interval, Duration::from_millis(250));

        handles.control.pause();
        assert!(handles.control.current().paused);
        handles.control.resume();
        assert!(!handles.control.current().paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_on_cadence() {
        let (engine, handles, queue, _) = engine();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(cancel_rx));

        queue.push(bid(UpdateEntry::update(dec("100"), 3)));
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(handles.latest_view().bids.len(), 1);

        cancel_tx.send(true).unwrap();
        let mirror = task.await.unwrap();
        assert_eq!(mirror.level_at(Side::Bid, 0).unwrap().quantity, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_engine_lets_queue_fill() {
        let (engine, handles, queue, _) = engine();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        handles.control.pause();
        let task = tokio::spawn(engine.run(cancel_rx));

        queue.push(bid(UpdateEntry::update(dec("100"), 3)));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(handles.latest_view().version, 0);

        handles.control.resume();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(queue.is_empty());

        cancel_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_tick_on_cancel() {
        let (engine, _, queue, _) = engine();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        queue.push(bid(UpdateEntry::update(dec("7"), 7)));
        cancel_tx.send(true).unwrap();

        let mirror = engine.run(cancel_rx).await;
        assert_eq!(mirror.len(Side::Bid), 1);
    }
}
