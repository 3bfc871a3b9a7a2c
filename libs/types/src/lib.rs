//! Shared order book types and wire protocol
//!
//! Used by both ends of the book stream: the publisher that owns the
//! authoritative synthetic book and the subscriber that mirrors it.
//!
//! # Modules
//! - `book`: sides, price levels, and the per-side level arena
//! - `message`: update entries and messages as they appear on the wire
//! - `codec`: newline-delimited JSON framing
//! - `errors`: codec error taxonomy

pub mod book;
pub mod codec;
pub mod errors;
pub mod message;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";
