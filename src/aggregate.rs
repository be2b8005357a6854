//! Periodic price aggregation
//!
//! Every aggregation period the server computes each ticker's mean price
//! over the trailing window and writes one record per ticker to the
//! durable store. Computation happens under the market lock; the writes
//! themselves run outside it. A failed write aborts the cycle and the
//! window's data is simply recomputed next period.

use rust_decimal::Decimal;
use tracing::info;

use crate::history::HistoryStore;
use crate::store::{AggregateRecord, AggregateStore, StoreError};

/// Mean price per ticker over `[now - window_nanos, now]`.
///
/// Tickers with no points in the window are skipped. Records come out in
/// deterministic ticker order.
pub fn compute_aggregates(
    history: &HistoryStore,
    window_nanos: i64,
    now: i64,
) -> Vec<AggregateRecord> {
    let cutoff = now - window_nanos;
    let mut records = Vec::new();

    for (ticker, ticker_history) in history.iter() {
        let prices = ticker_history.prices_since(cutoff);
        if prices.is_empty() {
            continue;
        }

        let count = prices.len() as u64;
        let sum: Decimal = prices.iter().copied().sum();
        let mean_price = (sum / Decimal::from(count)).round_dp(2);

        records.push(AggregateRecord {
            ticker: ticker.clone(),
            mean_price,
            sample_count: count,
            timestamp: now,
        });
    }

    records
}

/// Write one cycle's records sequentially; the first failure aborts the
/// cycle. Records written before the failure stay persisted, so a
/// mid-cycle error leaves a partial window in the store; the caller
/// drops the cycle and recomputes the window next period. Returns the
/// number written.
pub async fn run_cycle(
    store: &dyn AggregateStore,
    records: &[AggregateRecord],
) -> Result<usize, StoreError> {
    for record in records {
        store.write_aggregate(record).await?;
    }
    if !records.is_empty() {
        info!(records = records.len(), "aggregation cycle written");
    }
    Ok(records.len())
}
