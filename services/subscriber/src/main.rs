use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use book_subscriber::metrics::BookMetrics;
use book_subscriber::reconstruction::{EngineHandles, ReconstructionConfig};
use book_subscriber::{Subscriber, SubscriberConfig};
use book_types::book::Side;
use clap::Parser;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "book-subscriber")]
#[command(about = "Mirror an order book streamed by book-publisher")]
struct Args {
    /// Publisher address
    #[arg(long, env = "BOOK_SUBSCRIBER_CONNECT", default_value = "127.0.0.1:8080")]
    connect: SocketAddr,

    /// Reconstruction cadence in milliseconds
    #[arg(long, env = "BOOK_SUBSCRIBER_TICK_MS", default_value_t = 50)]
    tick_ms: u64,

    /// Queue length above which a dequeue counts as overloaded
    #[arg(long, env = "BOOK_SUBSCRIBER_OVERLOAD_THRESHOLD", default_value_t = 1000)]
    overload_threshold: usize,

    /// Levels kept per side
    #[arg(long, env = "BOOK_DEPTH", default_value_t = 50)]
    depth: usize,

    /// Seconds between status reports
    #[arg(long, env = "BOOK_SUBSCRIBER_REPORT_SECS", default_value_t = 1)]
    report_secs: u64,
}

impl Args {
    fn into_config(self) -> SubscriberConfig {
        SubscriberConfig {
            connect_addr: self.connect,
            reconstruction: ReconstructionConfig {
                tick_interval: Duration::from_millis(self.tick_ms),
                depth: self.depth,
            },
            overload_threshold: self.overload_threshold,
            report_interval: Duration::from_secs(self.report_secs),
        }
    }
}

/// Headless stand-in for the book display: logs top of book and metrics.
async fn report_loop(
    handles: EngineHandles,
    metrics: Arc<BookMetrics>,
    every: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut rows = handles.subscribe_rows();
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            row = rows.recv() => match row {
                Ok(row) => tracing::debug!(side = %row.side, rank = row.rank, "Row changed"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Row events lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let view = handles.latest_view();
                let snap = metrics.snapshot();
                tracing::info!(
                    symbol = view.symbol.as_deref().unwrap_or("-"),
                    best_bid = ?view.best_bid,
                    best_ask = ?view.best_ask,
                    spread = ?view.spread,
                    bid_levels = view.bids.len(),
                    ask_levels = view.asks.len(),
                    received = snap.updates_received,
                    dropped = snap.updates_dropped,
                    malformed = snap.frames_malformed,
                    last_batch = snap.last_batch_size,
                    last_apply_us = snap.last_apply_ns / 1_000,
                    ingest_rate = snap.ingest_rate,
                    "Book status"
                );
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Args::parse().into_config();
    tracing::info!(
        addr = %config.connect_addr,
        tick_ms = config.reconstruction.tick_interval.as_millis() as u64,
        "Starting order book subscriber"
    );

    let subscriber = Subscriber::new(&config).context("invalid subscriber configuration")?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = cancel_tx.send(true);
            }
            Err(err) => {
                // Dropping the sender would cancel the session
                tracing::warn!(error = %err, "Ctrl-C handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    });

    let reporter = tokio::spawn(report_loop(
        subscriber.handles(),
        subscriber.metrics(),
        config.report_interval,
        cancel_rx.clone(),
    ));
    let metrics = subscriber.metrics();

    let result = subscriber.connect(cancel_rx).await;
    reporter.abort();
    let report = result.context("subscriber session failed")?;

    tracing::info!(
        stop = ?report.ingestion.stop,
        frames = report.ingestion.frames,
        malformed = report.ingestion.malformed,
        bid_levels = report.mirror.len(Side::Bid),
        ask_levels = report.mirror.len(Side::Ask),
        metrics = ?metrics.export(),
        "Subscriber stopped"
    );
    Ok(())
}
