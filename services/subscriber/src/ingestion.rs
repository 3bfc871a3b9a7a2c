//! Byte stream → decoded messages → ingest queue
//!
//! The pipeline owns the read side of the connection. Each read is appended
//! to a `FrameBuffer`; every complete frame is decoded and pushed onto the
//! shared `IngestQueue`. Decoding happens before the queue lock is taken.
//!
//! A malformed frame is counted and skipped. A zero-length read, a read
//! error, or cancellation ends the pipeline. Bytes after the last delimiter
//! are discarded on exit.

use std::sync::Arc;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, info};

use book_types::codec::{decode_frame, is_blank, FrameBuffer};

use crate::cancelled;
use crate::error::SubscriberError;
use crate::metrics::BookMetrics;
use crate::queue::IngestQueue;

/// Size of each read from the transport.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Why ingestion stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStop {
    /// The publisher closed the connection.
    EndOfStream,
    /// The shared cancellation flag was raised.
    Cancelled,
}

/// Counts for one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub stop: IngestionStop,
    pub frames: u64,
    pub messages: u64,
    pub malformed: u64,
}

/// Reads frames from a transport and feeds the ingest queue.
pub struct IngestionPipeline {
    queue: Arc<IngestQueue>,
    metrics: Arc<BookMetrics>,
    buffer: FrameBuffer,
    frames: u64,
    messages: u64,
    malformed: u64,
}

impl IngestionPipeline {
    pub fn new(queue: Arc<IngestQueue>, metrics: Arc<BookMetrics>) -> Self {
        Self {
            queue,
            metrics,
            buffer: FrameBuffer::with_capacity(READ_BUFFER_SIZE),
            frames: 0,
            messages: 0,
            malformed: 0,
        }
    }

    /// Feed one read's worth of bytes. Returns the number of messages queued.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> usize {
        self.buffer.extend(bytes);
        let mut queued = 0;

        while let Some(frame) = self.buffer.next_frame() {
            if is_blank(&frame) {
                continue;
            }
            self.frames += 1;

            match decode_frame(&frame) {
                Ok(messages) => {
                    let count = messages.len();
                    self.metrics.record_received(count as u64);
                    self.queue.push_all(messages);
                    self.messages += count as u64;
                    queued += count;
                }
                Err(err) => {
                    debug!(error = %err, len = frame.len(), "Discarding malformed frame");
                    self.metrics.record_malformed();
                    self.malformed += 1;
                }
            }
        }

        queued
    }

    /// Read until end of stream, a read error, or cancellation.
    pub async fn run<R>(
        &mut self,
        reader: &mut R,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<IngestionReport, SubscriberError>
    where
        R: AsyncRead + Unpin,
    {
        self.metrics.mark_ingest_started();
        let mut chunk = vec![0u8; READ_BUFFER_SIZE];

        let stop = loop {
            if *cancel.borrow() {
                break IngestionStop::Cancelled;
            }

            let read = tokio::select! {
                _ = cancelled(&mut cancel) => break IngestionStop::Cancelled,
                read = reader.read(&mut chunk) => read,
            };

            match read.map_err(SubscriberError::Read)? {
                0 => break IngestionStop::EndOfStream,
                n => {
                    self.handle_bytes(&chunk[..n]);
                }
            }
        };

        if !self.buffer.is_empty() {
            debug!(pending = self.buffer.pending_len(), "Dropping unterminated frame");
        }

        let report = self.report(stop);
        info!(
            stop = ?report.stop,
            frames = report.frames,
            messages = report.messages,
            malformed = report.malformed,
            "Ingestion finished"
        );
        Ok(report)
    }

    /// Counts so far, labelled with `stop`.
    pub fn report(&self, stop: IngestionStop) -> IngestionReport {
        IngestionReport {
            stop,
            frames: self.frames,
            messages: self.messages,
            malformed: self.malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use book_types::book::Side;
    use tokio::io::AsyncWriteExt;

    fn pipeline() -> (IngestionPipeline, Arc<IngestQueue>, Arc<BookMetrics>) {
        let queue = Arc::new(IngestQueue::with_defaults());
        let metrics = Arc::new(BookMetrics::new());
        (
            IngestionPipeline::new(Arc::clone(&queue), Arc::clone(&metrics)),
            queue,
            metrics,
        )
    }

    const DELTA: &str =
        r#"{"Symbol":"BTC/USD","Side":"Bids","Updates":[{"Price":9999.9,"Quantity":42,"action":"update"}]}"#;

    #[test]
    fn test_frame_split_across_reads() {
        let (mut pipeline, queue, metrics) = pipeline();
        let (head, tail) = DELTA.split_at(20);

        assert_eq!(pipeline.handle_bytes(head.as_bytes()), 0);
        assert_eq!(pipeline.handle_bytes(format!("{tail}\n").as_bytes()), 1);

        assert_eq!(queue.len(), 1);
        assert_eq!(metrics.snapshot().updates_received, 1);
    }

    #[test]
    fn test_several_frames_in_one_read() {
        let (mut pipeline, queue, _) = pipeline();
        let bytes = format!("{DELTA}\n{DELTA}\n{DELTA}\n");

        assert_eq!(pipeline.handle_bytes(bytes.as_bytes()), 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_malformed_frame_skipped() {
        let (mut pipeline, queue, metrics) = pipeline();
        let bytes = format!("{{not json\n{DELTA}\n");

        assert_eq!(pipeline.handle_bytes(bytes.as_bytes()), 1);
        assert_eq!(queue.len(), 1);
        let snap = metrics.snapshot();
        assert_eq!(snap.frames_malformed, 1);
        assert_eq!(snap.updates_received, 1);
    }

    #[test]
    fn test_blank_frames_ignored() {
        let (mut pipeline, queue, metrics) = pipeline();
        pipeline.handle_bytes(b"\n  \r\n\n");

        assert!(queue.is_empty());
        assert_eq!(metrics.snapshot().frames_malformed, 0);
        assert_eq!(pipeline.report(IngestionStop::EndOfStream).frames, 0);
    }

    #[test]
    fn test_array_frame_counts_each_message() {
        let (mut pipeline, queue, metrics) = pipeline();
        let bytes = format!(
            r#"[{DELTA},{{"Symbol":"BTC/USD","Side":"Asks","Updates":[]}}]"#
        ) + "\n";

        assert_eq!(pipeline.handle_bytes(bytes.as_bytes()), 2);
        assert_eq!(metrics.snapshot().updates_received, 2);
        let batch = queue.drain();
        assert_eq!(batch.messages[0].side, Side::Bid);
        assert_eq!(batch.messages[1].side, Side::Ask);
    }

    #[tokio::test]
    async fn test_run_until_end_of_stream() {
        let (mut pipeline, queue, _) = pipeline();
        let (mut writer, mut reader) = tokio::io::duplex(256);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let producer = tokio::spawn(async move {
            for _ in 0..5 {
                writer.write_all(format!("{DELTA}\n").as_bytes()).await.unwrap();
            }
            writer.write_all(b"{\"Symbol\":").await.unwrap();
        });

        let report = pipeline.run(&mut reader, cancel_rx).await.unwrap();
        producer.await.unwrap();

        assert_eq!(report.stop, IngestionStop::EndOfStream);
        assert_eq!(report.messages, 5);
        assert_eq!(queue.len(), 5);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_pending_read() {
        let (mut pipeline, _, _) = pipeline();
        let (_writer, mut reader) = tokio::io::duplex(256);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let run = tokio::spawn(async move { pipeline.run(&mut reader, cancel_rx).await });
        tokio::task::yield_now().await;
        cancel_tx.send(true).unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.stop, IngestionStop::Cancelled);
    }
}
