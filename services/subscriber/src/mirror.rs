//! Locally reconstructed order book
//!
//! `BookMirror` applies decoded deltas to a `PriceLevelStore`. Matching an
//! entry to an existing level is exact price equality and goes through
//! `PriceLevelStore::find_by_price` only.
//!
//! Apply rules per entry:
//! - `insert` → always a new level, even when the price already exists
//! - `update` → overwrite the matched level in place, or insert if none
//! - `delete` → remove the matched level, no-op if none
//!
//! Sorting and depth truncation happen once per batch, not per entry.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::Serialize;

use book_types::book::{LevelId, PriceLevel, PriceLevelStore, Side, MAX_DEPTH};
use book_types::message::{UpdateAction, UpdateEntry, UpdateMessage};

/// What a single entry did to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted(LevelId),
    Updated(LevelId),
    Deleted(LevelId),
    /// Delete of a price the mirror does not hold
    Ignored,
}

/// Result of applying one drained batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub messages: usize,
    pub entries: usize,
    pub inserted: usize,
    pub deleted: usize,
    pub ignored: usize,
    /// Levels updated in place, deduplicated, in first-touch order
    pub updated: Vec<(Side, LevelId)>,
    /// Levels dropped by depth truncation
    pub evicted: usize,
}

/// Read-only copy of the top of the mirror.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookView {
    pub symbol: Option<String>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub mid_price: Option<Decimal>,
    /// Batches applied when the view was taken
    pub version: u64,
}

impl BookView {
    /// Levels of one side in priority order.
    pub fn side(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }
}

/// Subscriber-side mirror of the publisher's book.
#[derive(Debug, Clone)]
pub struct BookMirror {
    symbol: Option<String>,
    store: PriceLevelStore,
    depth: usize,
    batches_applied: u64,
}

impl BookMirror {
    pub fn new(depth: usize) -> Self {
        Self {
            symbol: None,
            store: PriceLevelStore::new(),
            depth,
            batches_applied: 0,
        }
    }

    /// Mirror keeping `MAX_DEPTH` levels per side.
    pub fn with_defaults() -> Self {
        Self::new(MAX_DEPTH)
    }

    /// Symbol of the first message applied, if any.
    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn store(&self) -> &PriceLevelStore {
        &self.store
    }

    pub fn batches_applied(&self) -> u64 {
        self.batches_applied
    }

    /// Apply one entry to `side` without re-sorting.
    pub fn apply_entry(&mut self, side: Side, entry: &UpdateEntry) -> ApplyOutcome {
        let level = PriceLevel::new(entry.price, entry.quantity);
        match entry.action {
            UpdateAction::Insert => ApplyOutcome::Inserted(self.store.insert(side, level)),
            UpdateAction::Update => match self.store.find_by_price(side, entry.price) {
                Some(id) => {
                    self.store.set(side, id, level);
                    ApplyOutcome::Updated(id)
                }
                None => ApplyOutcome::Inserted(self.store.insert(side, level)),
            },
            UpdateAction::Delete => match self.store.find_by_price(side, entry.price) {
                Some(id) => {
                    self.store.remove(side, id);
                    ApplyOutcome::Deleted(id)
                }
                None => ApplyOutcome::Ignored,
            },
        }
    }

    /// Apply every entry of one message without re-sorting.
    pub fn apply_message(&mut self, message: &UpdateMessage) -> Vec<ApplyOutcome> {
        if self.symbol.is_none() {
            self.symbol = Some(message.symbol.clone());
        }
        message
            .entries
            .iter()
            .map(|entry| self.apply_entry(message.side, entry))
            .collect()
    }

    /// Apply messages in order, then sort each side and truncate to depth.
    pub fn apply_batch<'a, I>(&mut self, messages: I) -> BatchOutcome
    where
        I: IntoIterator<Item = &'a UpdateMessage>,
    {
        let mut outcome = BatchOutcome::default();
        let mut seen = BTreeSet::new();

        for message in messages {
            outcome.messages += 1;
            for applied in self.apply_message(message) {
                outcome.entries += 1;
                match applied {
                    ApplyOutcome::Inserted(_) => outcome.inserted += 1,
                    ApplyOutcome::Deleted(_) => outcome.deleted += 1,
                    ApplyOutcome::Ignored => outcome.ignored += 1,
                    ApplyOutcome::Updated(id) => {
                        if seen.insert((message.side, id)) {
                            outcome.updated.push((message.side, id));
                        }
                    }
                }
            }
        }

        outcome.evicted = self.store.normalize(self.depth);
        self.batches_applied += 1;
        outcome
    }

    /// Current rank of a level, if it survived truncation.
    pub fn rank_of(&self, side: Side, id: LevelId) -> Option<usize> {
        self.store.rank_of(side, id)
    }

    /// Level at `rank` in the current arrangement.
    pub fn level_at(&self, side: Side, rank: usize) -> Option<PriceLevel> {
        self.store.nth(side, rank).map(|(_, level)| level)
    }

    /// First level at exactly `price`.
    pub fn level_at_price(&self, side: Side, price: Decimal) -> Option<PriceLevel> {
        let id = self.store.find_by_price(side, price)?;
        self.store.get(side, id).copied()
    }

    /// Number of levels on one side.
    pub fn len(&self, side: Side) -> usize {
        self.store.len(side)
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Snapshot of the best `depth` levels per side.
    pub fn view(&self) -> BookView {
        let bids = self.store.top(Side::Bid, self.depth);
        let asks = self.store.top(Side::Ask, self.depth);
        let best_bid = bids.first().map(|l| l.price);
        let best_ask = asks.first().map(|l| l.price);

        // Wire prices are unbounded; out-of-range results become None
        let (spread, mid_price) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => (
                ask.checked_sub(bid),
                bid.checked_add(ask).and_then(|sum| sum.checked_div(Decimal::TWO)),
            ),
            _ => (None, None),
        };

        BookView {
            symbol: self.symbol.clone(),
            bids,
            asks,
            best_bid,
            best_ask,
            spread,
            mid_price,
            version: self.batches_applied,
        }
    }
}

impl Default for BookMirror {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn bids(entries: Vec<UpdateEntry>) -> UpdateMessage {
        UpdateMessage {
            symbol: "BTC/USD".to_string(),
            side: Side::Bid,
            entries,
        }
    }

    fn asks(entries: Vec<UpdateEntry>) -> UpdateMessage {
        UpdateMessage {
            symbol: "BTC/USD".to_string(),
            side: Side::Ask,
            entries,
        }
    }

    #[test]
    fn test_update_overwrites_in_place() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("9999.9"), 10)])]);

        let outcome = mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("9999.9"), 42)])]);

        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(mirror.len(Side::Bid), 1);
        assert_eq!(mirror.level_at_price(Side::Bid, dec("9999.9")).unwrap().quantity, 42);
    }

    #[test]
    fn test_update_of_unknown_price_inserts() {
        let mut mirror = BookMirror::with_defaults();
        let outcome = mirror.apply_batch(&[asks(vec![UpdateEntry::update(dec("10000.1"), 3)])]);

        assert_eq!(outcome.inserted, 1);
        assert!(outcome.updated.is_empty());
        assert_eq!(mirror.level_at(Side::Ask, 0).unwrap().quantity, 3);
    }

    #[test]
    fn test_insert_never_overwrites() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("9876.5"), 5)])]);
        mirror.apply_batch(&[bids(vec![UpdateEntry::insert(dec("9876.5"), 7)])]);

        let quantities: Vec<i64> = mirror.store().levels(Side::Bid).map(|(_, l)| l.quantity).collect();
        // Stable sort keeps the older level first
        assert_eq!(quantities, vec![5, 7]);
        assert_eq!(mirror.level_at_price(Side::Bid, dec("9876.5")).unwrap().quantity, 5);
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("9999.9"), 10)])]);
        let before = mirror.view();

        let outcome = mirror.apply_batch(&[bids(vec![UpdateEntry::delete(dec("1.0"))])]);

        assert_eq!(outcome.ignored, 1);
        assert_eq!(mirror.view().bids, before.bids);
    }

    #[test]
    fn test_delete_removes_first_match() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![
            UpdateEntry::update(dec("9999.9"), 10),
            UpdateEntry::delete(dec("9999.9")),
        ])]);
        assert!(mirror.is_empty());
    }

    #[test]
    fn test_quantity_clamped_to_one() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("100"), 8)])]);
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("100"), -4)])]);
        mirror.apply_batch(&[bids(vec![UpdateEntry::insert(dec("99"), 0)])]);

        assert_eq!(mirror.level_at_price(Side::Bid, dec("100")).unwrap().quantity, 1);
        assert_eq!(mirror.level_at_price(Side::Bid, dec("99")).unwrap().quantity, 1);
    }

    #[test]
    fn test_batch_sorts_and_truncates() {
        let mut mirror = BookMirror::new(3);
        let entries = ["5", "9", "1", "7", "3"]
            .iter()
            .map(|p| UpdateEntry::update(dec(p), 1))
            .collect();

        let outcome = mirror.apply_batch(&[bids(entries)]);

        assert_eq!(outcome.evicted, 2);
        let prices: Vec<Decimal> = mirror.view().bids.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![dec("9"), dec("7"), dec("5")]);
    }

    #[test]
    fn test_asks_sorted_ascending() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[asks(vec![
            UpdateEntry::update(dec("10000.3"), 1),
            UpdateEntry::update(dec("10000.1"), 1),
            UpdateEntry::update(dec("10000.2"), 1),
        ])]);

        assert!(mirror.store().is_sorted(Side::Ask));
        assert_eq!(mirror.level_at(Side::Ask, 0).unwrap().price, dec("10000.1"));
    }

    #[test]
    fn test_repeated_updates_reported_once() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("50"), 1)])]);

        let outcome = mirror.apply_batch(&[
            bids(vec![UpdateEntry::update(dec("50"), 2)]),
            bids(vec![UpdateEntry::update(dec("50"), 3)]),
        ]);

        assert_eq!(outcome.updated.len(), 1);
        assert_eq!(outcome.entries, 2);
    }

    #[test]
    fn test_view_top_of_book() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[
            bids(vec![UpdateEntry::update(dec("9999.9"), 4), UpdateEntry::update(dec("9999.8"), 2)]),
            asks(vec![UpdateEntry::update(dec("10000.1"), 6)]),
        ]);

        let view = mirror.view();
        assert_eq!(view.symbol.as_deref(), Some("BTC/USD"));
        assert_eq!(view.best_bid, Some(dec("9999.9")));
        assert_eq!(view.best_ask, Some(dec("10000.1")));
        assert_eq!(view.spread, Some(dec("0.2")));
        assert_eq!(view.mid_price, Some(dec("10000.0")));
        assert_eq!(view.side(Side::Bid).len(), 2);
        assert_eq!(view.version, 1);
    }

    #[test]
    fn test_view_with_extreme_prices() {
        let mut mirror = BookMirror::with_defaults();
        let huge = dec("70000000000000000000000000000");
        mirror.apply_batch(&[
            bids(vec![UpdateEntry::update(huge, 1)]),
            asks(vec![UpdateEntry::update(huge, 1)]),
        ]);

        let view = mirror.view();
        assert_eq!(view.best_bid, Some(huge));
        assert_eq!(view.spread, Some(Decimal::ZERO));
        assert_eq!(view.mid_price, None);

        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[
            bids(vec![UpdateEntry::update(Decimal::MIN, 1)]),
            asks(vec![UpdateEntry::update(Decimal::MAX, 1)]),
        ]);

        let view = mirror.view();
        assert_eq!(view.spread, None);
        assert_eq!(view.mid_price, Some(Decimal::ZERO));
    }

    #[test]
    fn test_view_of_one_sided_book() {
        let mut mirror = BookMirror::with_defaults();
        mirror.apply_batch(&[bids(vec![UpdateEntry::update(dec("1"), 1)])]);

        let view = mirror.view();
        assert_eq!(view.best_ask, None);
        assert_eq!(view.spread, None);
        assert_eq!(view.mid_price, None);
    }
}
