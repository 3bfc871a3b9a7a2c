//! Synthetic order book generator
//!
//! Owns the authoritative book on the publisher side. The book is seeded
//! with `depth` levels per side spaced evenly around a mid price, then
//! evolved one level at a time by a bounded random walk on price and
//! quantity. Only `update` entries are produced.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::debug;

use book_types::book::{clamp_quantity, PriceLevel, PriceLevelStore, Side};
use book_types::message::{UpdateEntry, UpdateMessage};

/// Decimal places kept on perturbed prices, so they survive a JSON number round-trip.
pub const PRICE_SCALE: u32 = 8;

/// Shape of the synthetic book and its random walk.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Price the book is centered on.
    pub mid_price: Decimal,
    /// Levels created per side.
    pub depth: usize,
    /// Distance between consecutive seeded levels.
    pub level_spacing: Decimal,
    /// Max absolute price change per delta.
    pub price_jitter: Decimal,
    /// Max absolute quantity change per delta.
    pub quantity_jitter: i64,
    /// Seeded quantities are drawn from `[1, max_initial_quantity)`.
    pub max_initial_quantity: i64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            mid_price: Decimal::from(10_000),
            depth: 50,
            level_spacing: Decimal::new(1, 1),   // 0.1
            price_jitter: Decimal::new(25, 3),   // 0.025
            quantity_jitter: 5,
            max_initial_quantity: 100,
        }
    }
}

/// Authoritative synthetic book plus the RNG driving it.
pub struct SyntheticBookGenerator {
    symbol: String,
    config: GeneratorConfig,
    store: PriceLevelStore,
    rng: ChaCha8Rng,
    deltas_generated: u64,
}

impl SyntheticBookGenerator {
    /// Create and seed a generator.
    ///
    /// With `seed = None` the RNG is seeded from OS entropy.
    pub fn new(symbol: impl Into<String>, config: GeneratorConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut generator = Self {
            symbol: symbol.into(),
            config,
            store: PriceLevelStore::new(),
            rng,
            deltas_generated: 0,
        };
        generator.initialize();
        generator
    }

    /// (Re)build the book: asks at `mid + (i+1)*spacing`, bids at
    /// `mid - (i+1)*spacing`, random quantities in `[1, max_initial_quantity)`.
    pub fn initialize(&mut self) {
        self.store.clear();
        let mid = self.config.mid_price;
        for i in 0..self.config.depth {
            let offset = self.config.level_spacing * Decimal::from(i as u64 + 1);
            let ask_qty = self.rng.gen_range(1..self.config.max_initial_quantity.max(2));
            let bid_qty = self.rng.gen_range(1..self.config.max_initial_quantity.max(2));
            self.store.insert(Side::Ask, PriceLevel::new(mid + offset, ask_qty));
            self.store.insert(Side::Bid, PriceLevel::new(mid - offset, bid_qty));
        }
        debug!(
            symbol = %self.symbol,
            mid = %mid,
            depth = self.config.depth,
            "Synthetic book initialized"
        );
    }

    /// Every current level on one side, in storage order (unsorted).
    pub fn snapshot(&self, side: Side) -> Vec<PriceLevel> {
        self.store.levels(side).map(|(_, level)| *level).collect()
    }

    /// Full-book message for one side.
    pub fn full_book(&self, side: Side) -> UpdateMessage {
        UpdateMessage::full_book(self.symbol.clone(), side, self.snapshot(side))
    }

    /// Perturb one random level and return the resulting single-entry delta.
    ///
    /// Returns `None` only if the chosen side has no levels.
    pub fn next_delta(&mut self) -> Option<UpdateMessage> {
        let side = if self.rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
        let len = self.store.len(side);
        if len == 0 {
            return None;
        }

        let index = self.rng.gen_range(0..len);
        let (id, current) = self.store.nth(side, index)?;

        let scale = Decimal::from_f64(self.rng.gen_range(-1.0..=1.0)).unwrap_or(Decimal::ZERO);
        let price = (self.config.price_jitter * scale)
            .checked_add(current.price)
            .unwrap_or(current.price)
            .round_dp(PRICE_SCALE);
        let step = self
            .rng
            .gen_range(-self.config.quantity_jitter..=self.config.quantity_jitter);
        let quantity = clamp_quantity(current.quantity + step);

        let next = PriceLevel::new(price, quantity);
        self.store.set(side, id, next);
        self.deltas_generated += 1;

        Some(UpdateMessage::delta(
            self.symbol.clone(),
            side,
            UpdateEntry::update(next.price, next.quantity),
        ))
    }

    /// Read access to the authoritative store.
    pub fn store(&self) -> &PriceLevelStore {
        &self.store
    }

    /// Total deltas produced since creation.
    pub fn deltas_generated(&self) -> u64 {
        self.deltas_generated
    }
}
