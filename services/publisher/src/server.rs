//! Rate-controlled publishing over a single subscriber connection
//!
//! Flow: bind → accept one subscriber → full book (bids, then asks) →
//! paced deltas until cancellation or a write failure.
//!
//! `PublisherContext` owns everything a session mutates: the synthetic
//! book, the pacer, and the cancellation signal. The listener and the
//! connection are dropped on every exit path.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use book_types::book::Side;
use book_types::codec::encode;
use book_types::message::UpdateMessage;

use crate::config::PublisherConfig;
use crate::error::PublisherError;
use crate::generator::SyntheticBookGenerator;
use crate::pacer::RatePacer;

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Cancelled before any subscriber connected.
    #[default]
    NoSubscriber,
    /// Cancelled while streaming.
    Cancelled,
}

/// Counts of what a session put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
    pub full_books_sent: u64,
    pub deltas_sent: u64,
    pub stop: StopReason,
}

/// Resolves once the cancellation flag is raised or its sender is dropped.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

/// State owned by one publishing session.
pub struct PublisherContext {
    generator: SyntheticBookGenerator,
    pacer: RatePacer,
    cancel: watch::Receiver<bool>,
    summary: PublishSummary,
}

impl PublisherContext {
    /// Validate `config` and seed the synthetic book.
    pub fn new(config: &PublisherConfig, cancel: watch::Receiver<bool>) -> Result<Self, PublisherError> {
        config.validate()?;
        Ok(Self {
            generator: SyntheticBookGenerator::new(
                config.symbol.clone(),
                config.generator.clone(),
                config.seed,
            ),
            pacer: RatePacer::new(config.rate),
            cancel,
            summary: PublishSummary::default(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Stream the full book and then paced deltas into `conn`.
    ///
    /// Returns the summary on cancellation. Any write failure ends the
    /// session with an error.
    pub async fn run_session<W>(&mut self, conn: &mut W) -> Result<PublishSummary, PublisherError>
    where
        W: AsyncWrite + Unpin,
    {
        let result = self.stream_book(conn).await;
        match &result {
            Ok(summary) => info!(
                full_books_sent = summary.full_books_sent,
                deltas_sent = summary.deltas_sent,
                stop = ?summary.stop,
                "Publishing session finished"
            ),
            Err(err) => warn!(
                error = %err,
                deltas_sent = self.summary.deltas_sent,
                "Publishing session aborted"
            ),
        }
        result
    }

    async fn stream_book<W>(&mut self, conn: &mut W) -> Result<PublishSummary, PublisherError>
    where
        W: AsyncWrite + Unpin,
    {
        // Every non-error exit below is a cancellation
        self.summary.stop = StopReason::Cancelled;

        for side in Side::ALL {
            let book = self.generator.full_book(side);
            if !self.send(conn, &book).await? {
                return Ok(self.summary);
            }
            self.summary.full_books_sent += 1;
            debug!(side = %side, levels = book.entries.len(), "Full book sent");
        }

        self.pacer.reset(Instant::now());
        let interval = self.pacer.interval();

        loop {
            if self.is_cancelled() {
                break;
            }

            let due = self.pacer.updates_due(Instant::now());
            for _ in 0..due {
                let Some(delta) = self.generator.next_delta() else {
                    continue;
                };
                if !self.send(conn, &delta).await? {
                    return Ok(self.summary);
                }
                self.summary.deltas_sent += 1;
            }

            if due == 0 {
                tokio::select! {
                    _ = cancelled(&mut self.cancel) => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        Ok(self.summary)
    }

    /// Write one frame. Returns `false` if cancelled before the write finished.
    async fn send<W>(&mut self, conn: &mut W, message: &UpdateMessage) -> Result<bool, PublisherError>
    where
        W: AsyncWrite + Unpin,
    {
        let frame = encode(message)?;
        tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => Ok(false),
            written = conn.write_all(&frame) => {
                written.map_err(PublisherError::Write)?;
                Ok(true)
            }
        }
    }
}

/// Bind `config.listen_addr` and serve exactly one subscriber.
pub async fn serve(
    config: PublisherConfig,
    cancel: watch::Receiver<bool>,
) -> Result<PublishSummary, PublisherError> {
    config.validate()?;
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| PublisherError::Bind {
            addr: config.listen_addr.to_string(),
            source,
        })?;
    serve_on(listener, &config, cancel).await
}

/// Serve exactly one subscriber on an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    config: &PublisherConfig,
    mut cancel: watch::Receiver<bool>,
) -> Result<PublishSummary, PublisherError> {
    let mut context = PublisherContext::new(config, cancel.clone())?;

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, symbol = %config.symbol, rate = config.rate, "Waiting for a subscriber");
    }

    let (mut stream, peer) = tokio::select! {
        _ = cancelled(&mut cancel) => {
            info!("Cancelled before a subscriber connected");
            return Ok(PublishSummary::default());
        }
        accepted = listener.accept() => accepted.map_err(PublisherError::Accept)?,
    };
    // One subscriber per run
    drop(listener);

    info!(%peer, "Subscriber connected");
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "Could not disable Nagle");
    }

    let result = context.run_session(&mut stream).await;
    if let Err(err) = stream.shutdown().await {
        debug!(error = %err, "Connection shutdown failed");
    }
    result
}
