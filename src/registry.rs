//! Ticker registry
//!
//! Static set of tradable symbols with their starting prices. The registry
//! is the source of truth for which tickers exist; the generator, history
//! store, and history queries all resolve symbols against it.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

/// Immutable symbol set with starting prices.
///
/// Uses a `BTreeMap` so iteration order (and therefore update batches)
/// is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerRegistry {
    symbols: BTreeMap<String, Decimal>,
}

impl TickerRegistry {
    /// Build a registry from (symbol, starting price) pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        Self {
            symbols: pairs
                .into_iter()
                .map(|(symbol, price)| (symbol.into(), price))
                .collect(),
        }
    }

    /// Default symbol set with realistic starting prices.
    pub fn with_defaults() -> Self {
        Self::from_pairs([
            ("AAPL", Decimal::new(17550, 2)),
            ("GOOGL", Decimal::new(265000, 2)),
            ("MSFT", Decimal::new(38025, 2)),
            ("TSLA", Decimal::new(84530, 2)),
            ("AMZN", Decimal::new(320075, 2)),
            ("META", Decimal::new(48560, 2)),
            ("NFLX", Decimal::new(38090, 2)),
            ("NVDA", Decimal::new(87540, 2)),
            ("AMD", Decimal::new(16580, 2)),
            ("INTC", Decimal::new(5825, 2)),
        ])
    }

    /// Whether the symbol exists.
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Starting price for a symbol, if registered.
    pub fn starting_price(&self, symbol: &str) -> Option<Decimal> {
        self.symbols.get(symbol).copied()
    }

    /// Iterate registered symbols in deterministic order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    /// Copy of the full (symbol, starting price) map.
    pub fn starting_prices(&self) -> BTreeMap<String, Decimal> {
        self.symbols.clone()
    }

    /// Number of registered symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for TickerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
