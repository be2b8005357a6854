//! Simulated price generation
//!
//! Advances every ticker's price with a bounded random walk: volatility
//! magnitude uniform in [0.5%, 2%], random sign, and a uniform damping
//! factor in [0.1, 1.0]. Prices are rounded to cents and clamped at a
//! small positive floor so the walk can never go non-positive.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::registry::TickerRegistry;

/// One generated price movement for a single ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerUpdate {
    pub symbol: String,
    /// New price after this step.
    pub price: Decimal,
    /// Change relative to the previous generated price, in percent.
    pub change_percent: Decimal,
    /// Unix nanoseconds.
    pub timestamp: i64,
}

/// Advance a single price by one random-walk step.
pub fn step_price<R: Rng>(rng: &mut R, price: Decimal, floor: Decimal) -> Decimal {
    let volatility = rng.random_range(0.005..=0.02);
    let direction = if rng.random_bool(0.5) { 1.0 } else { -1.0 };
    let damping = rng.random_range(0.1..=1.0);

    // The multiplier stays within [0.98, 1.02], so the f64 round-trip is
    // exact enough to fold into decimal arithmetic.
    let multiplier =
        Decimal::from_f64(1.0 + direction * volatility * damping).unwrap_or(Decimal::ONE);

    let stepped = (price * multiplier).round_dp(2);
    if stepped < floor {
        floor
    } else {
        stepped
    }
}

/// Single-writer random-walk generator over the full ticker set.
#[derive(Debug)]
pub struct PriceGenerator {
    prices: BTreeMap<String, Decimal>,
    rng: StdRng,
    floor: Decimal,
}

impl PriceGenerator {
    /// Seed current prices from the registry's starting prices.
    pub fn new(registry: &TickerRegistry, floor: Decimal) -> Self {
        Self::with_rng(registry, floor, StdRng::from_os_rng())
    }

    /// Deterministic construction for tests.
    pub fn with_rng(registry: &TickerRegistry, floor: Decimal, rng: StdRng) -> Self {
        Self {
            prices: registry.starting_prices(),
            rng,
            floor,
        }
    }

    /// Advance every ticker one step and return the batch, in
    /// deterministic symbol order.
    pub fn tick(&mut self, now: i64) -> Vec<TickerUpdate> {
        let mut updates = Vec::with_capacity(self.prices.len());

        for (symbol, price) in self.prices.iter_mut() {
            let previous = *price;
            let next = step_price(&mut self.rng, previous, self.floor);
            let change_percent = if previous > Decimal::ZERO {
                ((next - previous) / previous * Decimal::ONE_HUNDRED).round_dp(4)
            } else {
                Decimal::ZERO
            };

            *price = next;
            updates.push(TickerUpdate {
                symbol: symbol.clone(),
                price: next,
                change_percent,
                timestamp: now,
            });
        }

        updates
    }

    /// Current price for a symbol.
    pub fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }

    /// Copy of the full current-price map, for connect snapshots.
    pub fn snapshot(&self) -> BTreeMap<String, Decimal> {
        self.prices.clone()
    }
}
