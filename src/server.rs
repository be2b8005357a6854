//! Feed server: shared state, WebSocket handling, background loops
//!
//! A generation tick runs entirely under the market lock, so every client
//! observes one atomic `price_update` batch per tick. The client registry
//! lives behind its own lock and only ever pushes to per-connection
//! channels; socket writes happen in each connection's writer task so no
//! network I/O runs while either lock is held.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::alert::{AlertEngine, AlertEvent};
use crate::broadcast::{ClientId, ClientRegistry};
use crate::config::FeedConfig;
use crate::generator::PriceGenerator;
use crate::history::{HistoryError, HistoryStore, PricePoint};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::store::AggregateStore;

/// Current wall-clock time in Unix nanoseconds.
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Everything one generation tick produced.
#[derive(Debug)]
pub struct TickBatch {
    /// New price per ticker, in deterministic symbol order.
    pub updates: BTreeMap<String, Decimal>,
    pub alerts: Vec<AlertEvent>,
    pub timestamp: i64,
}

/// Generator, history, and alert state advanced together under one lock.
pub struct MarketState {
    generator: PriceGenerator,
    history: HistoryStore,
    alerts: AlertEngine,
    alert_lookback_nanos: i64,
}

impl MarketState {
    pub fn new(config: &FeedConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Deterministic construction for tests.
    pub fn with_rng(config: &FeedConfig, rng: StdRng) -> Self {
        Self {
            generator: PriceGenerator::with_rng(&config.tickers, config.price_floor, rng),
            history: HistoryStore::new(config.recent_capacity, config.minute_capacity),
            alerts: AlertEngine::new(
                config.alert_threshold_percent,
                config.alert_cooldown_nanos(),
            ),
            alert_lookback_nanos: config.alert_lookback_nanos(),
        }
    }

    /// Advance every ticker one step, record history, and evaluate alerts.
    pub fn run_tick(&mut self, now: i64) -> TickBatch {
        let mut updates = BTreeMap::new();
        let mut alerts = Vec::new();

        for update in self.generator.tick(now) {
            self.history.append(
                &update.symbol,
                PricePoint {
                    timestamp: update.timestamp,
                    price: update.price,
                    change_percent: update.change_percent,
                },
            );

            // Alerting needs a point at least one lookback old; skip the
            // comparison until the buffer spans that far.
            if let Some(lookback) =
                self.history
                    .lookback(&update.symbol, self.alert_lookback_nanos, now)
            {
                if let Some(alert) = self.alerts.evaluate(
                    &update.symbol,
                    update.price,
                    lookback.price,
                    now,
                ) {
                    alerts.push(alert);
                }
            }

            updates.insert(update.symbol, update.price);
        }

        TickBatch {
            updates,
            alerts,
            timestamp: now,
        }
    }

    /// Full current-price snapshot for connect-time delivery.
    pub fn snapshot(&self) -> BTreeMap<String, Decimal> {
        self.generator.snapshot()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryStore {
        &mut self.history
    }
}

/// Shared server state handed to every connection and background loop.
pub struct FeedState {
    pub config: FeedConfig,
    pub market: parking_lot::Mutex<MarketState>,
    pub clients: parking_lot::Mutex<ClientRegistry>,
    pub store: Arc<dyn AggregateStore>,
    pub shutdown: watch::Receiver<bool>,
}

impl FeedState {
    pub fn new(
        config: FeedConfig,
        store: Arc<dyn AggregateStore>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let market = MarketState::new(&config);
        Self {
            config,
            market: parking_lot::Mutex::new(market),
            clients: parking_lot::Mutex::new(ClientRegistry::new()),
            store,
            shutdown,
        }
    }
}

/// Register a client and queue its `current_prices` snapshot under a
/// single registry lock acquisition. Holding the lock across both steps
/// is what guarantees the snapshot lands in the channel ahead of any
/// concurrent tick broadcast.
pub fn connect_client(
    state: &FeedState,
    sender: mpsc::UnboundedSender<ServerMessage>,
) -> ClientId {
    let snapshot = ServerMessage::CurrentPrices {
        data: state.market.lock().snapshot(),
        timestamp: now_nanos(),
    };

    let mut clients = state.clients.lock();
    let client_id = clients.register(sender);
    clients.send_to(client_id, snapshot);
    client_id
}

/// Build the HTTP router exposing the WebSocket endpoint.
pub fn router(state: Arc<FeedState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<FeedState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection lifecycle: register, snapshot, then pump frames until
/// either side closes.
async fn handle_socket(socket: WebSocket, state: Arc<FeedState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let mut shutdown = state.shutdown.clone();

    let client_id = connect_client(&state, tx);
    info!(client_id, "client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(error) => {
                    warn!(%error, "dropping unserializable message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json)).await.is_err() {
                return;
            }
        }
        // Channel closed: session is over, say goodbye cleanly.
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            _ = &mut writer => {
                writer_done = true;
                break;
            }
            _ = shutdown.changed() => {
                debug!(client_id, "closing session on shutdown");
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(&state, client_id, &text);
                }
                Some(Ok(Message::Binary(_))) => {
                    let reply =
                        ServerMessage::error("binary frames not supported", now_nanos());
                    state.clients.lock().send_to(client_id, reply);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // ping/pong handled by axum
                Some(Err(error)) => {
                    debug!(client_id, %error, "read error, closing");
                    break;
                }
            },
        }
    }

    // Dropping the registry entry closes the channel, which lets the
    // writer drain queued messages and send the Close frame.
    state.clients.lock().disconnect(client_id);
    if !writer_done {
        let _ = writer.await;
    }
    info!(client_id, "client disconnected");
}

/// Dispatch one inbound frame; every reply goes to this client only.
fn handle_client_message(state: &FeedState, client_id: ClientId, text: &str) {
    let now = now_nanos();

    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(error) => {
            debug!(client_id, %error, "rejecting malformed frame");
            let reply = ServerMessage::error("invalid message format", now);
            state.clients.lock().send_to(client_id, reply);
            return;
        }
    };

    match message {
        ClientMessage::Subscribe { tickers } => {
            let mut clients = state.clients.lock();
            if let Some(resulting) = clients.subscribe(client_id, &tickers) {
                debug!(client_id, tickers = ?resulting, "subscription updated");
                clients.send_to(
                    client_id,
                    ServerMessage::SubscriptionConfirmed {
                        tickers: resulting,
                        timestamp: now,
                    },
                );
            }
        }
        ClientMessage::Unsubscribe { tickers } => {
            let mut clients = state.clients.lock();
            if clients.unsubscribe(client_id, &tickers).is_some() {
                // The confirmation echoes the requested tickers, not the
                // remaining set.
                clients.send_to(
                    client_id,
                    ServerMessage::UnsubscriptionConfirmed {
                        tickers,
                        timestamp: now,
                    },
                );
            }
        }
        ClientMessage::GetHistory { ticker } => {
            let result = state
                .market
                .lock()
                .history()
                .recent(&ticker, state.config.history_reply_limit);
            let reply = match result {
                Ok(data) => ServerMessage::PriceHistory {
                    ticker,
                    data,
                    timestamp: now,
                },
                Err(HistoryError::UnknownTicker(ticker)) => ServerMessage::error(
                    format!("no history for ticker: {ticker}"),
                    now,
                ),
            };
            state.clients.lock().send_to(client_id, reply);
        }
    }
}

/// Price-generation loop: tick at a randomized interval, then fan out the
/// batch and any alerts.
pub async fn run_generator_loop(state: Arc<FeedState>, mut shutdown: watch::Receiver<bool>) {
    let min_ms = state.config.tick_interval_min.as_millis() as u64;
    let max_ms = state.config.tick_interval_max.as_millis() as u64;

    loop {
        let delay_ms = rand::rng().random_range(min_ms..=max_ms);
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => {}
            _ = shutdown.changed() => break,
        }

        let batch = state.market.lock().run_tick(now_nanos());

        let scope: BTreeSet<String> = batch.updates.keys().cloned().collect();
        let update = ServerMessage::PriceUpdate {
            data: batch.updates,
            timestamp: batch.timestamp,
        };

        let mut clients = state.clients.lock();
        clients.broadcast(&scope, &update);
        for alert in batch.alerts {
            let scope = BTreeSet::from([alert.ticker.clone()]);
            clients.broadcast(&scope, &ServerMessage::from(alert));
        }
    }

    info!("generator loop stopped");
}

/// Aggregation loop: every period, average the trailing window and write
/// the records to the durable store.
pub async fn run_aggregation_loop(state: Arc<FeedState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(state.config.aggregation_period) => {}
            _ = shutdown.changed() => break,
        }

        let now = now_nanos();
        let records = {
            let market = state.market.lock();
            aggregate::compute_aggregates(
                market.history(),
                state.config.aggregation_window_nanos(),
                now,
            )
        };

        // Store I/O runs outside the lock; a failed cycle is dropped and
        // the window recomputed next period.
        if let Err(error) = aggregate::run_cycle(state.store.as_ref(), &records).await {
            warn!(%error, "aggregation cycle failed, skipping");
        }
    }

    info!("aggregation loop stopped");
}

/// Retention loop: every period, discard history entries older than the
/// retention window.
pub async fn run_cleanup_loop(state: Arc<FeedState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(state.config.cleanup_period) => {}
            _ = shutdown.changed() => break,
        }

        let cutoff = now_nanos() - state.config.retention_window_nanos();
        let removed = state.market.lock().history_mut().prune_older_than(cutoff);
        if removed > 0 {
            info!(removed, "retention sweep completed");
        }
    }

    info!("cleanup loop stopped");
}
