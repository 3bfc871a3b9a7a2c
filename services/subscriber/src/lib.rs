//! Order Book Subscriber
//!
//! Connects to a publisher, ingests its newline-delimited JSON stream, and
//! reconstructs a bounded, sorted mirror of the book.
//!
//! # Architecture
//!
//! ```text
//!   TCP stream
//!       │
//! ┌─────▼──────┐
//! │ Ingestion  │  ← frames, decodes, counts malformed
//! └─────┬──────┘
//!       │ push (lock held only to enqueue)
//! ┌─────▼──────┐
//! │IngestQueue │
//! └─────┬──────┘
//!       │ drain every tick (lock held only to dequeue)
//! ┌─────▼──────────┐
//! │ Reconstruction │  ← apply, sort, truncate to depth
//! └──┬──────────┬──┘
//!    │          │
//! BookView   RowChanged
//!  (watch)   (broadcast)
//! ```
//!
//! Ingestion and reconstruction run as separate tasks and share nothing but
//! the queue and the metrics. One cancellation flag stops both.

pub mod config;
pub mod error;
pub mod events;
pub mod ingestion;
pub mod metrics;
pub mod mirror;
pub mod queue;
pub mod reconstruction;
pub mod session;

pub use config::SubscriberConfig;
pub use error::SubscriberError;
pub use session::{SessionReport, Subscriber};

use tokio::sync::watch;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";

/// Resolves once the cancellation flag is raised or its sender is dropped.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}
