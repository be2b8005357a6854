//! Subscription registry and broadcast router
//!
//! Maps each connected client to the set of tickers it cares about (the
//! empty set means "all tickers") and fans out updates and alerts to the
//! interested clients only. The router never performs network I/O: each
//! client owns an unbounded channel drained by its connection's writer
//! task, so a failed push means the connection is gone and the client is
//! evicted after the broadcast pass completes.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::protocol::ServerMessage;

/// Unique client identifier.
pub type ClientId = u64;

/// A connected client: its outbound channel and subscription set.
#[derive(Debug)]
struct ClientHandle {
    sender: UnboundedSender<ServerMessage>,
    /// Empty set = receive all tickers.
    subscriptions: BTreeSet<String>,
}

impl ClientHandle {
    /// Whether this client wants a message scoped to `tickers`.
    fn wants(&self, tickers: &BTreeSet<String>) -> bool {
        self.subscriptions.is_empty()
            || self.subscriptions.intersection(tickers).next().is_some()
    }
}

/// Tracks all connected clients and their subscriptions.
///
/// Uses a `BTreeMap` for deterministic iteration. Each registered client
/// has exactly one entry, so eviction removes its subscription state in
/// the same step.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ClientId, ClientHandle>,
    next_id: ClientId,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a new client with an empty subscription set and return
    /// its ID.
    pub fn register(&mut self, sender: UnboundedSender<ServerMessage>) -> ClientId {
        let id = self.next_id;
        self.next_id += 1;
        self.clients.insert(
            id,
            ClientHandle {
                sender,
                subscriptions: BTreeSet::new(),
            },
        );
        id
    }

    /// Remove a client. Returns whether it was present.
    pub fn disconnect(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    /// Union `tickers` into the client's subscription set; returns the
    /// resulting full set, or `None` if the client is gone.
    pub fn subscribe(&mut self, id: ClientId, tickers: &[String]) -> Option<Vec<String>> {
        let client = self.clients.get_mut(&id)?;
        client
            .subscriptions
            .extend(tickers.iter().cloned());
        Some(client.subscriptions.iter().cloned().collect())
    }

    /// Remove `tickers` from the client's subscription set; returns the
    /// resulting full set, or `None` if the client is gone.
    pub fn unsubscribe(&mut self, id: ClientId, tickers: &[String]) -> Option<Vec<String>> {
        let client = self.clients.get_mut(&id)?;
        for ticker in tickers {
            client.subscriptions.remove(ticker);
        }
        Some(client.subscriptions.iter().cloned().collect())
    }

    /// Push a message to one client. A failed push means its connection
    /// is gone; the client is evicted immediately.
    pub fn send_to(&mut self, id: ClientId, message: ServerMessage) -> bool {
        let delivered = match self.clients.get(&id) {
            Some(client) => client.sender.send(message).is_ok(),
            None => false,
        };
        if !delivered && self.clients.remove(&id).is_some() {
            warn!(client_id = id, "evicting client after failed send");
        }
        delivered
    }

    /// Fan a message out to every client whose subscription set is empty
    /// or intersects `scope`. Push failures are collected during the pass
    /// and the dead clients evicted afterwards; returns the evicted IDs.
    pub fn broadcast(
        &mut self,
        scope: &BTreeSet<String>,
        message: &ServerMessage,
    ) -> Vec<ClientId> {
        let mut dead = Vec::new();

        for (id, client) in self.clients.iter() {
            if !client.wants(scope) {
                continue;
            }
            if client.sender.send(message.clone()).is_err() {
                dead.push(*id);
            }
        }

        for id in &dead {
            self.clients.remove(id);
            warn!(client_id = id, "evicting dead client after broadcast");
        }
        if !dead.is_empty() {
            debug!(
                evicted = dead.len(),
                remaining = self.clients.len(),
                "broadcast pass completed with evictions"
            );
        }

        dead
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Whether a client is registered.
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Copy of a client's subscription set.
    pub fn subscriptions(&self, id: ClientId) -> Option<BTreeSet<String>> {
        self.clients.get(&id).map(|c| c.subscriptions.clone())
    }
}
