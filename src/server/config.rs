//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::broadcast::BroadcastConfig;
use crate::call::CallConfig;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent WebSocket connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound queue capacity per connection; frames beyond it are dropped
    pub outbound_capacity: usize,

    /// Subscribe connections to the audio broadcast when they attach
    pub auto_subscribe_audio: bool,

    /// How long a stream slot may wait for its room before it is reclaimed
    pub slot_ttl: Duration,

    /// Call registry settings
    pub calls: CallConfig,

    /// Audio broadcast settings (None = no broadcast task)
    pub broadcast: Option<BroadcastConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 0, // Unlimited
            outbound_capacity: 64,
            auto_subscribe_audio: true,
            slot_ttl: Duration::from_secs(600),
            calls: CallConfig::default(),
            broadcast: None,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the per-connection outbound queue capacity
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Do not subscribe to audio on attach; clients opt in explicitly
    pub fn disable_auto_subscribe(mut self) -> Self {
        self.auto_subscribe_audio = false;
        self
    }

    /// Set the grace period for stream slots that never went live
    pub fn slot_ttl(mut self, ttl: Duration) -> Self {
        self.slot_ttl = ttl;
        self
    }

    /// Set call registry settings
    pub fn calls(mut self, calls: CallConfig) -> Self {
        self.calls = calls;
        self
    }

    /// Enable the audio broadcast
    pub fn broadcast(mut self, broadcast: BroadcastConfig) -> Self {
        self.broadcast = Some(broadcast);
        self
    }
}
