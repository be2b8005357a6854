//! Market Feed Service
//!
//! Simulates a stream of ticker prices and distributes it to many
//! concurrently connected WebSocket subscribers:
//! - Bounded random-walk price generation on a jittered timer
//! - Per-ticker rolling history at two granularities
//! - Rate-limited upward-move alerting against a 1-minute lookback
//! - Subscription-scoped fan-out with dead-client eviction
//! - Periodic mean-price aggregation flushed to a durable store
//!
//! # Architecture
//!
//! ```text
//!        Price Generator (1-3s timer)
//!               │
//!          ┌────▼─────┐
//!          │ History  │  ← dual ring buffers per ticker
//!          └────┬─────┘
//!               │
//!          ┌────▼─────┐
//!          │  Alerts  │  ← 1-minute lookback, 60s cooldown
//!          └────┬─────┘
//!               │
//!     ┌─────────▼──────────┐      ┌─────────────────┐
//!     │ Broadcast Router   │      │ Aggregation     │
//!     │ (subscription map) │      │ (5-minute mean) │
//!     └─────────┬──────────┘      └────────┬────────┘
//!               │                          │
//!        WebSocket clients          Durable store
//! ```

pub mod aggregate;
pub mod alert;
pub mod broadcast;
pub mod config;
pub mod generator;
pub mod history;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod store;

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
