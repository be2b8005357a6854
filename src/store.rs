//! Durable aggregate storage
//!
//! Aggregation cycles hand their computed per-ticker averages to an
//! [`AggregateStore`]. The production implementation POSTs each record to
//! an external HTTP endpoint; tests use an in-memory store that can be
//! switched into a failing mode.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Errors raised by aggregate writes.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One ticker's mean price over an aggregation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub ticker: String,
    /// Mean of the window's prices, rounded to 2 dp.
    pub mean_price: Decimal,
    /// Number of points the mean covers.
    pub sample_count: u64,
    /// Unix nanoseconds at which the window closed.
    pub timestamp: i64,
}

/// Sink for aggregation results.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn write_aggregate(&self, record: &AggregateRecord) -> Result<(), StoreError>;
}

/// HTTP-backed store: POSTs each record as JSON to a fixed endpoint.
pub struct HttpAggregateStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAggregateStore {
    pub fn new(endpoint: String, timeout: std::time::Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl AggregateStore for HttpAggregateStore {
    async fn write_aggregate(&self, record: &AggregateRecord) -> Result<(), StoreError> {
        self.client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        debug!(
            ticker = %record.ticker,
            mean_price = %record.mean_price,
            "aggregate written"
        );
        Ok(())
    }
}

/// In-memory store for tests and endpoint-less deployments.
#[derive(Default)]
pub struct MemoryAggregateStore {
    records: parking_lot::Mutex<Vec<AggregateRecord>>,
    failing: parking_lot::Mutex<bool>,
}

impl MemoryAggregateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, for error-path tests.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Copy of everything written so far.
    pub fn records(&self) -> Vec<AggregateRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn write_aggregate(&self, record: &AggregateRecord) -> Result<(), StoreError> {
        if *self.failing.lock() {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
