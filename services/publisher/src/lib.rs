//! Order Book Publisher
//!
//! Owns an authoritative synthetic order book and streams it to a single
//! subscriber over TCP as newline-delimited JSON.
//!
//! # Architecture
//!
//! ```text
//!  SyntheticBookGenerator ──► full book (Bids, Asks)
//!          │                        │
//!          ▼                        ▼
//!     next_delta() ◄── RatePacer ──► encode ──► TCP
//! ```
//!
//! The pacer converts elapsed time into a number of due deltas, so a late
//! wake-up is followed by a catch-up burst instead of a lower rate.

pub mod config;
pub mod error;
pub mod generator;
pub mod pacer;
pub mod server;

pub use config::PublisherConfig;
pub use error::PublisherError;
pub use server::{serve, serve_on, PublishSummary, PublisherContext, StopReason};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
