//! Application state shared across routes

use std::sync::Arc;

use dashmap::DashSet;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::game::{Action, BusHandle, PlayerId, StoreReader};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Intents go in here
    pub bus: BusHandle,
    /// Replicated actions come out here
    pub replication: broadcast::Sender<Action>,
    pub store: StoreReader,
    /// Players with an open WebSocket
    connections: Arc<DashSet<PlayerId>>,
}

impl AppState {
    pub fn new(
        config: Config,
        bus: BusHandle,
        replication: broadcast::Sender<Action>,
        store: StoreReader,
    ) -> Self {
        Self {
            config: Arc::new(config),
            bus,
            replication,
            store,
            connections: Arc::new(DashSet::new()),
        }
    }

    pub fn open_connection(&self, player_id: PlayerId) {
        self.connections.insert(player_id);
    }

    pub fn close_connection(&self, player_id: &PlayerId) {
        self.connections.remove(player_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
