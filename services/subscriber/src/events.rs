//! Events published to the presentation layer
//!
//! The presentation layer never touches the live mirror. It receives a
//! fresh `BookView` after each applied batch and one `RowChanged` per level
//! that an `update` entry modified in place.

use serde::{Deserialize, Serialize};

use book_types::book::Side;

/// A level that was updated in place now sits at `rank` on `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowChanged {
    pub side: Side,
    /// Zero-based position in the side's top-N view
    pub rank: usize,
    /// Unix nanoseconds when the batch was applied
    pub timestamp: i64,
}

impl RowChanged {
    pub fn new(side: Side, rank: usize, timestamp: i64) -> Self {
        Self {
            side,
            rank,
            timestamp,
        }
    }
}

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
