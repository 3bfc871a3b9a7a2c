//! One subscriber session: connect, ingest, reconstruct
//!
//! `Subscriber` wires the queue, metrics, ingestion pipeline, and
//! reconstruction engine together. Ingestion runs on the caller's task and
//! the engine on a spawned one. When ingestion ends for any reason the
//! engine is stopped, applies what is still queued, and hands its mirror
//! back.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::SubscriberConfig;
use crate::error::SubscriberError;
use crate::ingestion::{IngestionPipeline, IngestionReport};
use crate::metrics::BookMetrics;
use crate::mirror::BookMirror;
use crate::queue::IngestQueue;
use crate::reconstruction::{EngineHandles, ReconstructionEngine};

/// Final state of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub ingestion: IngestionReport,
    pub mirror: BookMirror,
}

/// A configured, not yet running subscriber.
pub struct Subscriber {
    config: SubscriberConfig,
    queue: Arc<IngestQueue>,
    metrics: Arc<BookMetrics>,
    engine: ReconstructionEngine,
    handles: EngineHandles,
}

impl Subscriber {
    pub fn new(config: &SubscriberConfig) -> Result<Self, SubscriberError> {
        config.validate()?;
        let queue = Arc::new(IngestQueue::new(config.overload_threshold));
        let metrics = Arc::new(BookMetrics::new());
        let (engine, handles) = ReconstructionEngine::new(
            &config.reconstruction,
            Arc::clone(&queue),
            Arc::clone(&metrics),
        );
        Ok(Self {
            config: config.clone(),
            queue,
            metrics,
            engine,
            handles,
        })
    }

    /// View, row-event, and cadence handles for a presentation layer.
    pub fn handles(&self) -> EngineHandles {
        self.handles.clone()
    }

    pub fn metrics(&self) -> Arc<BookMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Connect to `config.connect_addr` and run until the stream ends or
    /// `cancel` is raised.
    pub async fn connect(
        self,
        cancel: watch::Receiver<bool>,
    ) -> Result<SessionReport, SubscriberError> {
        let addr = self.config.connect_addr;
        let mut stream = connect_to(addr).await?;
        info!(%addr, "Connected to publisher");
        self.run(&mut stream, cancel).await
    }

    /// Run over an already-open transport.
    pub async fn run<R>(
        self,
        reader: &mut R,
        cancel: watch::Receiver<bool>,
    ) -> Result<SessionReport, SubscriberError>
    where
        R: AsyncRead + Unpin,
    {
        let Self {
            queue,
            metrics,
            engine,
            ..
        } = self;

        // Stopped by ingestion ending or by the outer flag, whichever is first
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut outer = cancel.clone();
        let stop_forward = stop_tx.clone();
        let forwarder = tokio::spawn(async move {
            crate::cancelled(&mut outer).await;
            let _ = stop_forward.send(true);
        });
        let engine_task = tokio::spawn(engine.run(stop_rx));

        let mut pipeline = IngestionPipeline::new(queue, metrics);
        let ingestion = pipeline.run(reader, cancel).await;

        let _ = stop_tx.send(true);
        forwarder.abort();
        let mirror = engine_task
            .await
            .map_err(|err| SubscriberError::EngineTask(err.to_string()))?;

        match &ingestion {
            Ok(report) => debug!(stop = ?report.stop, "Session finished"),
            Err(err) => warn!(error = %err, "Session ended by transport error"),
        }
        Ok(SessionReport {
            ingestion: ingestion?,
            mirror,
        })
    }
}

async fn connect_to(addr: SocketAddr) -> Result<TcpStream, SubscriberError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| SubscriberError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    if let Err(err) = stream.set_nodelay(true) {
        debug!(error = %err, "Could not disable Nagle");
    }
    Ok(stream)
}
