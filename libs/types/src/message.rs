//! Update messages exchanged between publisher and subscriber
//!
//! Field names follow the wire contract exactly:
//!
//! ```text
//! { "Symbol": "BTC/USD", "Side": "Bids",
//!   "Updates": [ { "Price": 9999.9, "Quantity": 42, "action": "update" } ] }
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::book::{PriceLevel, Side};

/// What an entry does to the level it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    /// Add a new level, even if one already exists at the same price
    Insert,
    /// Overwrite the level at the same price, or add one if none exists
    #[default]
    Update,
    /// Remove the level at the same price, if any
    Delete,
}

/// One level change inside an `UpdateMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEntry {
    #[serde(rename = "Price", with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    /// Defaults to `update` when absent on the wire.
    #[serde(default)]
    pub action: UpdateAction,
}

impl UpdateEntry {
    pub fn new(price: Decimal, quantity: i64, action: UpdateAction) -> Self {
        Self {
            price,
            quantity,
            action,
        }
    }

    pub fn update(price: Decimal, quantity: i64) -> Self {
        Self::new(price, quantity, UpdateAction::Update)
    }

    pub fn insert(price: Decimal, quantity: i64) -> Self {
        Self::new(price, quantity, UpdateAction::Insert)
    }

    pub fn delete(price: Decimal) -> Self {
        Self::new(price, 0, UpdateAction::Delete)
    }
}

impl From<PriceLevel> for UpdateEntry {
    fn from(level: PriceLevel) -> Self {
        Self::update(level.price, level.quantity)
    }
}

/// A batch of entries for exactly one side of one symbol.
///
/// Full-book messages and deltas share this shape; a delta carries a single
/// entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Side")]
    pub side: Side,
    #[serde(rename = "Updates")]
    pub entries: Vec<UpdateEntry>,
}

impl UpdateMessage {
    /// Full-book message enumerating `levels` with `update` actions.
    pub fn full_book(
        symbol: impl Into<String>,
        side: Side,
        levels: impl IntoIterator<Item = PriceLevel>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entries: levels.into_iter().map(UpdateEntry::from).collect(),
        }
    }

    /// Single-entry delta.
    pub fn delta(symbol: impl Into<String>, side: Side, entry: UpdateEntry) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entries: vec![entry],
        }
    }

    /// Number of entries carried.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
