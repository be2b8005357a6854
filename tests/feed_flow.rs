//! End-to-end flow tests for the market feed
//!
//! Exercises the pipeline the server runs in production, without sockets:
//! seeded generation ticks feeding history, alert evaluation against the
//! minute lookback, subscription-scoped fan-out, and aggregation cycles
//! into the durable store.
//!
//! Scenarios include:
//! - Lookback comparison below and above the alert threshold
//! - Cooldown suppression and re-arming
//! - Subscription filtering and dead-client eviction
//! - Aggregation means over the trailing window

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;

use market_feed::aggregate::{compute_aggregates, run_cycle};
use market_feed::alert::AlertEngine;
use market_feed::broadcast::ClientRegistry;
use market_feed::config::FeedConfig;
use market_feed::history::{HistoryStore, PricePoint};
use market_feed::protocol::ServerMessage;
use market_feed::server::MarketState;
use market_feed::store::MemoryAggregateStore;

const SECOND: i64 = 1_000_000_000;

fn price(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn point(ts_secs: i64, cents: i64) -> PricePoint {
    PricePoint {
        timestamp: ts_secs * SECOND,
        price: price(cents),
        change_percent: Decimal::ZERO,
    }
}

fn engine() -> AlertEngine {
    let config = FeedConfig::default();
    AlertEngine::new(
        config.alert_threshold_percent,
        config.alert_cooldown_nanos(),
    )
}

fn scope(tickers: &[&str]) -> BTreeSet<String> {
    tickers.iter().map(|t| t.to_string()).collect()
}

/// A small move against the right lookback point stays silent: at t+91s
/// the comparison base is the t+30s point, and 103.00 -> 103.50 is only
/// a 0.49% increase.
#[test]
fn test_small_move_against_lookback_does_not_alert() {
    let mut history = HistoryStore::new(100, 60);
    let mut engine = engine();

    history.append("AAPL", point(0, 10000));
    history.append("AAPL", point(30, 10300));

    let lookback = history
        .lookback("AAPL", 60 * SECOND, 91 * SECOND)
        .expect("lookback point");
    assert_eq!(lookback.timestamp, 30 * SECOND);

    let alert = engine.evaluate("AAPL", price(10350), lookback.price, 91 * SECOND);
    assert!(alert.is_none());
}

/// A qualifying move alerts once, stays silent through the cooldown, and
/// alerts again after it expires.
#[test]
fn test_alert_cooldown_cycle() {
    let mut history = HistoryStore::new(100, 60);
    let mut engine = engine();

    history.append("AAPL", point(0, 10000));

    // +3.5% over the minute: alert
    let lookback = history.lookback("AAPL", 60 * SECOND, 61 * SECOND).unwrap();
    let alert = engine
        .evaluate("AAPL", price(10350), lookback.price, 61 * SECOND)
        .expect("first alert");
    assert_eq!(alert.change_percent, price(350));
    assert_eq!(
        alert.message,
        "AAPL increased by 3.50% in the last minute"
    );

    // Another qualifying move 4s later is suppressed
    assert!(engine
        .evaluate("AAPL", price(10400), price(10000), 65 * SECOND)
        .is_none());

    // Cooldown expired: a qualifying move alerts again
    assert!(engine
        .evaluate("AAPL", price(10500), price(10000), 130 * SECOND)
        .is_some());
}

/// A subscribed client only sees batches naming its tickers; a client
/// with no subscriptions sees everything, including the alert stream.
#[test]
fn test_subscription_scoped_fanout() {
    let mut registry = ClientRegistry::new();

    let (apple_tx, mut apple_rx) = tokio::sync::mpsc::unbounded_channel();
    let (all_tx, mut all_rx) = tokio::sync::mpsc::unbounded_channel();
    let apple_fan = registry.register(apple_tx);
    registry.register(all_tx);
    registry.subscribe(apple_fan, &["AAPL".to_string()]);

    // Full-batch update reaches both
    let full_scope = scope(&["AAPL", "GOOGL", "MSFT"]);
    registry.broadcast(
        &full_scope,
        &ServerMessage::PriceUpdate {
            data: Default::default(),
            timestamp: SECOND,
        },
    );
    assert!(apple_rx.try_recv().is_ok());
    assert!(all_rx.try_recv().is_ok());

    // GOOGL alert reaches only the unfiltered client
    registry.broadcast(
        &scope(&["GOOGL"]),
        &ServerMessage::error("placeholder", 2 * SECOND),
    );
    assert!(apple_rx.try_recv().is_err());
    assert!(all_rx.try_recv().is_ok());
}

/// Dropping a client's receiver makes the next broadcast evict it without
/// disturbing the rest.
#[test]
fn test_dead_client_removed_mid_broadcast() {
    let mut registry = ClientRegistry::new();

    let (dead_tx, dead_rx) = tokio::sync::mpsc::unbounded_channel();
    let (live_tx, mut live_rx) = tokio::sync::mpsc::unbounded_channel();
    let dead = registry.register(dead_tx);
    registry.register(live_tx);
    drop(dead_rx);

    let evicted = registry.broadcast(
        &scope(&["AAPL"]),
        &ServerMessage::PriceUpdate {
            data: Default::default(),
            timestamp: SECOND,
        },
    );

    assert_eq!(evicted, vec![dead]);
    assert_eq!(registry.client_count(), 1);
    assert!(live_rx.try_recv().is_ok());
}

/// Subscribing then unsubscribing restores the receive-everything state.
#[test]
fn test_subscribe_unsubscribe_restores_firehose() {
    let mut registry = ClientRegistry::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let id = registry.register(tx);

    registry.subscribe(id, &["AAPL".to_string()]);
    registry.broadcast(
        &scope(&["GOOGL"]),
        &ServerMessage::error("placeholder", SECOND),
    );
    assert!(rx.try_recv().is_err());

    let remaining = registry.unsubscribe(id, &["AAPL".to_string()]).unwrap();
    assert!(remaining.is_empty());

    registry.broadcast(
        &scope(&["GOOGL"]),
        &ServerMessage::error("placeholder", 2 * SECOND),
    );
    assert!(rx.try_recv().is_ok());
}

/// Aggregation over a trailing window writes one exact mean per ticker.
#[tokio::test]
async fn test_aggregation_cycle_writes_window_means() {
    let mut history = HistoryStore::new(100, 60);
    history.append("AAPL", point(100, 10000));
    history.append("AAPL", point(200, 10200));
    history.append("GOOGL", point(150, 265000));
    // Outside the window ending at t=400s
    history.append("GOOGL", point(50, 1));

    let store = MemoryAggregateStore::new();
    let records = compute_aggregates(&history, 300 * SECOND, 400 * SECOND);
    let written = run_cycle(&store, &records).await.unwrap();

    assert_eq!(written, 2);
    let written = store.records();
    assert_eq!(written[0].ticker, "AAPL");
    assert_eq!(written[0].mean_price, price(10100));
    assert_eq!(written[0].sample_count, 2);
    assert_eq!(written[1].ticker, "GOOGL");
    assert_eq!(written[1].mean_price, price(265000));
    assert_eq!(written[1].sample_count, 1);
}

/// A failed store write aborts the cycle; nothing is half-written after
/// the failure point and the next cycle proceeds normally.
#[tokio::test]
async fn test_aggregation_cycle_failure_skipped() {
    let mut history = HistoryStore::new(100, 60);
    history.append("AAPL", point(100, 10000));

    let store = MemoryAggregateStore::new();
    let records = compute_aggregates(&history, 300 * SECOND, 200 * SECOND);

    store.set_failing(true);
    assert!(run_cycle(&store, &records).await.is_err());
    assert!(store.records().is_empty());

    store.set_failing(false);
    run_cycle(&store, &records).await.unwrap();
    assert_eq!(store.records().len(), 1);
}

/// Seeded full-pipeline run: every tick produces one complete batch, the
/// history grows accordingly, and identical seeds replay identically.
#[test]
fn test_seeded_tick_pipeline_is_deterministic() {
    let config = FeedConfig::default();

    let run = |seed: u64| {
        let mut market = MarketState::with_rng(&config, StdRng::seed_from_u64(seed));
        let mut batches = Vec::new();
        for i in 1..=30 {
            let batch = market.run_tick(i * 2 * SECOND);
            assert_eq!(batch.updates.len(), config.tickers.len());
            batches.push(batch.updates);
        }
        batches
    };

    assert_eq!(run(99), run(99));
}

/// History replies cap at the configured limit and stay chronological.
#[test]
fn test_history_reply_limit() {
    let config = FeedConfig::default();
    let mut market = MarketState::with_rng(&config, StdRng::seed_from_u64(5));

    for i in 1..=40 {
        market.run_tick(i * 2 * SECOND);
    }

    let points = market
        .history()
        .recent("AAPL", config.history_reply_limit)
        .unwrap();
    assert_eq!(points.len(), 20);
    for window in points.windows(2) {
        assert!(window[0].timestamp < window[1].timestamp);
    }
}
