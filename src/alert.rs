//! Price-move alerting
//!
//! One-sided threshold detector: compares each new price to the price
//! roughly one minute prior and raises an alert when the increase exceeds
//! the configured threshold. Alerts are rate-limited per ticker by a
//! cooldown window; downward and sub-threshold moves never alert.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::info;

/// A raised alert, ready to be scoped-broadcast to one ticker's
/// subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub ticker: String,
    /// Increase over the lookback price, in percent, rounded to 2 dp.
    pub change_percent: Decimal,
    pub current_price: Decimal,
    pub previous_price: Decimal,
    pub message: String,
    /// Unix nanoseconds.
    pub timestamp: i64,
}

/// Threshold detector with per-ticker cooldown state.
///
/// Cooldown state lives for the process lifetime; there is nothing to
/// persist or prune since the ticker set is static.
#[derive(Debug)]
pub struct AlertEngine {
    threshold_percent: Decimal,
    cooldown_nanos: i64,
    last_alert: BTreeMap<String, i64>,
}

impl AlertEngine {
    pub fn new(threshold_percent: Decimal, cooldown_nanos: i64) -> Self {
        Self {
            threshold_percent,
            cooldown_nanos,
            last_alert: BTreeMap::new(),
        }
    }

    /// Evaluate one ticker against its lookback price.
    ///
    /// Returns an alert when the increase is strictly above the threshold
    /// and the per-ticker cooldown has elapsed; records the alert time on
    /// emission. Callers skip evaluation entirely when no lookback price
    /// is available.
    pub fn evaluate(
        &mut self,
        ticker: &str,
        current_price: Decimal,
        lookback_price: Decimal,
        now: i64,
    ) -> Option<AlertEvent> {
        if lookback_price <= Decimal::ZERO {
            return None;
        }

        let change_percent =
            (current_price - lookback_price) / lookback_price * Decimal::ONE_HUNDRED;
        if change_percent <= self.threshold_percent {
            return None;
        }

        if let Some(last) = self.last_alert.get(ticker) {
            if now - last <= self.cooldown_nanos {
                return None;
            }
        }
        self.last_alert.insert(ticker.to_string(), now);

        let change_percent = change_percent.round_dp(2);
        info!(
            ticker,
            change_percent = %change_percent,
            current_price = %current_price,
            "price alert raised"
        );

        Some(AlertEvent {
            ticker: ticker.to_string(),
            change_percent,
            current_price,
            previous_price: lookback_price,
            message: format!(
                "{ticker} increased by {change_percent}% in the last minute"
            ),
            timestamp: now,
        })
    }

    /// Last alert time for a ticker, if one has been raised.
    pub fn last_alert_time(&self, ticker: &str) -> Option<i64> {
        self.last_alert.get(ticker).copied()
    }
}
