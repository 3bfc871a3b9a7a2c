//! Price level data model shared by the publisher and the subscriber
//!
//! A `PriceLevelStore` is a per-side arena of `PriceLevel` records. Each
//! record gets a `LevelId` when it enters the store and keeps it until it is
//! removed or evicted. Order within a side is an explicit arrangement that is
//! re-sorted on demand (`normalize`), never derived from record identity.
//!
//! Ordering rules:
//! - Bids: descending price (best bid first)
//! - Asks: ascending price (best ask first)

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum number of levels kept per side after a batch is applied.
pub const MAX_DEPTH: usize = 50;

/// Smallest quantity a level may carry after any mutation.
pub const MIN_QUANTITY: i64 = 1;

/// Book side. Serialized with the wire names `"Bids"` / `"Asks"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// Buy side
    #[serde(rename = "Bids")]
    Bid,
    /// Sell side
    #[serde(rename = "Asks")]
    Ask,
}

impl Side {
    /// Both sides, bids first.
    pub const ALL: [Side; 2] = [Side::Bid, Side::Ask];

    /// Wire label of the side.
    pub fn label(&self) -> &'static str {
        match self {
            Side::Bid => "Bids",
            Side::Ask => "Asks",
        }
    }

    /// Compare two prices by priority on this side.
    ///
    /// `Ordering::Less` means `a` ranks ahead of `b`.
    pub fn priority(&self, a: &Decimal, b: &Decimal) -> Ordering {
        match self {
            Side::Bid => b.cmp(a),
            Side::Ask => a.cmp(b),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Clamp a quantity to `MIN_QUANTITY`.
pub fn clamp_quantity(quantity: i64) -> i64 {
    quantity.max(MIN_QUANTITY)
}

/// A single price/quantity pair on one side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: i64,
}

impl PriceLevel {
    /// Create a level, clamping the quantity to `MIN_QUANTITY`.
    pub fn new(price: Decimal, quantity: i64) -> Self {
        Self {
            price,
            quantity: clamp_quantity(quantity),
        }
    }
}

/// Identity of a level inside a `PriceLevelStore`.
///
/// Assigned from a store-wide counter; never reused within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId(u64);

impl LevelId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Slot {
    id: LevelId,
    level: PriceLevel,
}

/// Per-side arena of price levels.
#[derive(Debug, Clone, Default)]
pub struct PriceLevelStore {
    bids: Vec<Slot>,
    asks: Vec<Slot>,
    next_id: u64,
}

impl PriceLevelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new level to `side` and return its id.
    ///
    /// Never merges with an existing level at the same price.
    pub fn insert(&mut self, side: Side, level: PriceLevel) -> LevelId {
        let id = LevelId(self.next_id);
        self.next_id += 1;
        self.slots_mut(side).push(Slot {
            id,
            level: PriceLevel::new(level.price, level.quantity),
        });
        id
    }

    /// Locate the level on `side` whose price equals `price` exactly.
    ///
    /// When several levels share the price, the one earliest in the current
    /// arrangement wins. All price-based matching goes through here.
    pub fn find_by_price(&self, side: Side, price: Decimal) -> Option<LevelId> {
        self.slots(side)
            .iter()
            .find(|slot| slot.level.price == price)
            .map(|slot| slot.id)
    }

    /// Get a level by id.
    pub fn get(&self, side: Side, id: LevelId) -> Option<&PriceLevel> {
        self.slots(side)
            .iter()
            .find(|slot| slot.id == id)
            .map(|slot| &slot.level)
    }

    /// Overwrite price and quantity of an existing level in place.
    ///
    /// Returns `false` if no level with `id` exists on `side`.
    pub fn set(&mut self, side: Side, id: LevelId, level: PriceLevel) -> bool {
        match self.slots_mut(side).iter_mut().find(|slot| slot.id == id) {
            Some(slot) => {
                slot.level = PriceLevel::new(level.price, level.quantity);
                true
            }
            None => false,
        }
    }

    /// Remove a level by id.
    pub fn remove(&mut self, side: Side, id: LevelId) -> Option<PriceLevel> {
        let slots = self.slots_mut(side);
        let pos = slots.iter().position(|slot| slot.id == id)?;
        Some(slots.remove(pos).level)
    }

    /// Level at position `index` of the current arrangement.
    pub fn nth(&self, side: Side, index: usize) -> Option<(LevelId, PriceLevel)> {
        self.slots(side).get(index).map(|slot| (slot.id, slot.level))
    }

    /// Position of a level in the current arrangement.
    pub fn rank_of(&self, side: Side, id: LevelId) -> Option<usize> {
        self.slots(side).iter().position(|slot| slot.id == id)
    }

    /// Iterate one side in its current arrangement.
    pub fn levels(&self, side: Side) -> impl Iterator<Item = (LevelId, &PriceLevel)> + '_ {
        self.slots(side).iter().map(|slot| (slot.id, &slot.level))
    }

    /// Number of levels on one side.
    pub fn len(&self, side: Side) -> usize {
        self.slots(side).len()
    }

    /// Whether both sides are empty.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Drop every level on both sides. Ids are not reused.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Stable-sort one side by its priority rule.
    pub fn sort_side(&mut self, side: Side) {
        self.slots_mut(side)
            .sort_by(|a, b| side.priority(&a.level.price, &b.level.price));
    }

    /// Whether one side is currently in priority order.
    pub fn is_sorted(&self, side: Side) -> bool {
        self.slots(side)
            .windows(2)
            .all(|w| side.priority(&w[0].level.price, &w[1].level.price) != Ordering::Greater)
    }

    /// Sort both sides and evict everything past `depth`.
    ///
    /// Returns the number of evicted levels.
    pub fn normalize(&mut self, depth: usize) -> usize {
        let mut evicted = 0;
        for side in Side::ALL {
            self.sort_side(side);
            let slots = self.slots_mut(side);
            if slots.len() > depth {
                evicted += slots.len() - depth;
                slots.truncate(depth);
            }
        }
        evicted
    }

    /// Best `n` levels of one side in priority order, without mutating the store.
    pub fn top(&self, side: Side, n: usize) -> Vec<PriceLevel> {
        let mut levels: Vec<PriceLevel> = self.slots(side).iter().map(|s| s.level).collect();
        levels.sort_by(|a, b| side.priority(&a.price, &b.price));
        levels.truncate(n);
        levels
    }

    fn slots(&self, side: Side) -> &Vec<Slot> {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    fn slots_mut(&mut self, side: Side) -> &mut Vec<Slot> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }
}
