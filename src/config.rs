//! Configuration for the market feed service
//!
//! All tunables in one place: listen address, ticker set, alerting
//! thresholds, task periods, buffer capacities, and the durable-store
//! endpoint. Defaults match the documented behavior; a handful of
//! deployment-specific values can be overridden from the environment.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::registry::TickerRegistry;

/// Runtime configuration for the feed server.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Listen host for the WebSocket endpoint.
    pub host: String,
    /// Listen port for the WebSocket endpoint.
    pub port: u16,
    /// Symbol set with starting prices.
    pub tickers: TickerRegistry,
    /// Alert threshold as a percentage (alert on moves strictly above this).
    pub alert_threshold_percent: Decimal,
    /// How far back the alert comparison looks.
    pub alert_lookback: Duration,
    /// Minimum gap between two alerts for the same ticker.
    pub alert_cooldown: Duration,
    /// Period of the aggregation task.
    pub aggregation_period: Duration,
    /// Trailing window the aggregation mean is computed over.
    pub aggregation_window: Duration,
    /// Period of the retention sweep.
    pub cleanup_period: Duration,
    /// Entries older than this are discarded by the retention sweep.
    pub retention_window: Duration,
    /// Lower bound of the randomized tick interval.
    pub tick_interval_min: Duration,
    /// Upper bound of the randomized tick interval.
    pub tick_interval_max: Duration,
    /// Capacity of the short-window history buffer per ticker.
    pub recent_capacity: usize,
    /// Capacity of the minute-lookback history buffer per ticker.
    pub minute_capacity: usize,
    /// Maximum entries returned in a history reply.
    pub history_reply_limit: usize,
    /// Smallest price the generator will ever produce.
    pub price_floor: Decimal,
    /// Durable-store endpoint; aggregates stay in memory when unset.
    pub store_endpoint: Option<String>,
    /// Timeout applied to every durable-store call.
    pub store_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8765,
            tickers: TickerRegistry::with_defaults(),
            alert_threshold_percent: Decimal::new(2, 0),
            alert_lookback: Duration::from_secs(60),
            alert_cooldown: Duration::from_secs(60),
            aggregation_period: Duration::from_secs(300),
            aggregation_window: Duration::from_secs(300),
            cleanup_period: Duration::from_secs(3600),
            retention_window: Duration::from_secs(24 * 3600),
            tick_interval_min: Duration::from_secs(1),
            tick_interval_max: Duration::from_secs(3),
            recent_capacity: 100,
            minute_capacity: 60,
            history_reply_limit: 20,
            price_floor: Decimal::new(1, 2),
            store_endpoint: None,
            store_timeout: Duration::from_secs(10),
        }
    }
}

impl FeedConfig {
    /// Default configuration with environment overrides applied.
    ///
    /// Recognized variables: `FEED_HOST`, `FEED_PORT`, `FEED_STORE_URL`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("FEED_HOST") {
            config.host = host;
        }
        if let Some(port) = std::env::var("FEED_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            config.port = port;
        }
        if let Ok(url) = std::env::var("FEED_STORE_URL") {
            config.store_endpoint = Some(url);
        }

        config
    }

    /// Alert lookback in Unix nanoseconds.
    pub fn alert_lookback_nanos(&self) -> i64 {
        self.alert_lookback.as_nanos() as i64
    }

    /// Alert cooldown in Unix nanoseconds.
    pub fn alert_cooldown_nanos(&self) -> i64 {
        self.alert_cooldown.as_nanos() as i64
    }

    /// Aggregation window in Unix nanoseconds.
    pub fn aggregation_window_nanos(&self) -> i64 {
        self.aggregation_window.as_nanos() as i64
    }

    /// Retention window in Unix nanoseconds.
    pub fn retention_window_nanos(&self) -> i64 {
        self.retention_window.as_nanos() as i64
    }
}
