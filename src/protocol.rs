//! Wire protocol for the WebSocket feed
//!
//! Both directions use a closed tagged-variant envelope: UTF-8 JSON with
//! a `type` field selecting the payload shape. Anything outside the known
//! set deserializes to an error and is answered with an `error` reply to
//! the offending client only.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::alert::AlertEvent;
use crate::history::PricePoint;

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full current-price snapshot, sent once on connect.
    CurrentPrices {
        data: BTreeMap<String, Decimal>,
        timestamp: i64,
    },
    /// One generation tick's batch of new prices.
    PriceUpdate {
        data: BTreeMap<String, Decimal>,
        timestamp: i64,
    },
    /// Rate-limited upward-move alert for a single ticker.
    PriceAlert {
        ticker: String,
        change_percent: Decimal,
        current_price: Decimal,
        previous_price: Decimal,
        message: String,
        timestamp: i64,
    },
    /// Echoes the client's resulting full subscription set.
    SubscriptionConfirmed {
        tickers: Vec<String>,
        timestamp: i64,
    },
    /// Echoes the tickers named in the unsubscribe request.
    UnsubscriptionConfirmed {
        tickers: Vec<String>,
        timestamp: i64,
    },
    /// Reply to a history request.
    PriceHistory {
        ticker: String,
        data: Vec<PricePoint>,
        timestamp: i64,
    },
    /// Error reply scoped to the requesting client.
    Error { message: String, timestamp: i64 },
}

/// Messages accepted from clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { tickers: Vec<String> },
    Unsubscribe { tickers: Vec<String> },
    GetHistory { ticker: String },
}

impl ServerMessage {
    /// Error reply helper.
    pub fn error(message: impl Into<String>, timestamp: i64) -> Self {
        Self::Error {
            message: message.into(),
            timestamp,
        }
    }
}

impl From<AlertEvent> for ServerMessage {
    fn from(alert: AlertEvent) -> Self {
        Self::PriceAlert {
            ticker: alert.ticker,
            change_percent: alert.change_percent,
            current_price: alert.current_price,
            previous_price: alert.previous_price,
            message: alert.message,
            timestamp: alert.timestamp,
        }
    }
}
