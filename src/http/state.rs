//! Application state injected into handlers.

use std::sync::Arc;

use crate::config::SpeedtestConfig;
use crate::geo::{Coordinate, IpInfoClient};
use crate::measure::RandomChunk;
use crate::security::{PasswordGate, StatsGate};
use crate::storage::SharedStore;

/// Everything a handler may read. Built once before serving, never mutated.
#[derive(Clone)]
pub struct AppState {
    pub chunk: RandomChunk,
    pub default_chunks: u32,
    pub server_coordinate: Coordinate,
    pub ipinfo: Arc<IpInfoClient>,
    pub store: SharedStore,
    pub stats_gate: Arc<dyn StatsGate>,
    pub stats_enabled: bool,
    pub redact_ip_addresses: bool,
    pub trust_forwarded_headers: bool,
}

impl AppState {
    /// Assemble the state from resolved startup values.
    pub fn new(
        config: &SpeedtestConfig,
        chunk: RandomChunk,
        server_coordinate: Coordinate,
        ipinfo: IpInfoClient,
        store: SharedStore,
    ) -> Self {
        Self {
            chunk,
            default_chunks: config.download_chunks,
            server_coordinate,
            ipinfo: Arc::new(ipinfo),
            store,
            stats_gate: Arc::new(PasswordGate::new(config.statistics_password.clone())),
            stats_enabled: config.database_type != "none",
            redact_ip_addresses: config.redact_ip_addresses,
            trust_forwarded_headers: config.trust_forwarded_headers,
        }
    }

    /// Replace the stats gate.
    pub fn with_stats_gate(mut self, gate: Arc<dyn StatsGate>) -> Self {
        self.stats_gate = gate;
        self
    }
}
