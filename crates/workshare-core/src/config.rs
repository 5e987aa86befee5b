//! Engine configuration
//!
//! All settings have defaults matching the discovery protocol constants, so a
//! config file only needs to name what it changes. Durations are written in
//! milliseconds (`*_ms` keys).
//!
//! ```json
//! {
//!   "username": "alice",
//!   "discovery": { "port": 51234, "static_peers": ["10.0.4.17:51234"] },
//!   "monitor": { "ledger_capacity": 5000 }
//! }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CollabError, CollabResult};

/// Fixed UDP port the discovery protocol listens and broadcasts on
pub const DEFAULT_DISCOVERY_PORT: u16 = 51234;
/// Port advertised for the collaboration transport
pub const DEFAULT_SERVICE_PORT: u16 = 51235;
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_millis(15000);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(2000);

pub const DEFAULT_LEDGER_CAPACITY: usize = 1000;
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CONFLICT_WINDOW: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_HOTSPOT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_HOTSPOT_MIN_ACTIVITY: usize = 5;
pub const DEFAULT_HOTSPOT_USER_THRESHOLD: usize = 2;

/// Settings for the LAN discovery protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// UDP port to bind and broadcast to. 0 binds an ephemeral port.
    pub port: u16,
    /// Port peers should use to reach our collaboration transport
    pub service_port: u16,
    #[serde(rename = "broadcast_interval_ms", with = "duration_ms")]
    pub broadcast_interval: Duration,
    #[serde(rename = "peer_timeout_ms", with = "duration_ms")]
    pub peer_timeout: Duration,
    #[serde(rename = "shutdown_grace_ms", with = "duration_ms")]
    pub shutdown_grace: Duration,
    /// Send to interface broadcast addresses
    pub broadcast: bool,
    /// Extra unicast targets for networks that drop broadcast traffic
    pub static_peers: Vec<SocketAddr>,
}

impl DiscoveryConfig {
    /// How often stale peers are swept: half the peer timeout.
    pub fn cleanup_interval(&self) -> Duration {
        self.peer_timeout / 2
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            service_port: DEFAULT_SERVICE_PORT,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            broadcast: true,
            static_peers: Vec::new(),
        }
    }
}

/// Settings for the conflict monitor and its scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,
    /// Maximum activities kept before FIFO eviction
    pub ledger_capacity: usize,
    #[serde(rename = "conflict_window_ms", with = "duration_ms")]
    pub conflict_window: Duration,
    #[serde(rename = "hotspot_window_ms", with = "duration_ms")]
    pub hotspot_window: Duration,
    /// Activities on one level needed to call it a hotspot
    pub hotspot_min_activity: usize,
    /// A hotspot is high risk above this many distinct users
    pub hotspot_user_threshold: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_MONITOR_INTERVAL,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            conflict_window: DEFAULT_CONFLICT_WINDOW,
            hotspot_window: DEFAULT_HOTSPOT_WINDOW,
            hotspot_min_activity: DEFAULT_HOTSPOT_MIN_ACTIVITY,
            hotspot_user_threshold: DEFAULT_HOTSPOT_USER_THRESHOLD,
        }
    }
}

/// Top-level configuration for a [`CollabEngine`](crate::CollabEngine)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overrides the OS account name
    pub username: Option<String>,
    /// Overrides the machine name
    pub hostname: Option<String>,
    pub discovery: DiscoveryConfig,
    pub monitor: MonitorConfig,
}

impl EngineConfig {
    /// Load a JSON config file. Missing keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> CollabResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Reject settings the loops cannot run with.
    pub fn validate(&self) -> CollabResult<()> {
        if self.discovery.broadcast_interval.is_zero() {
            return Err(CollabError::Config(
                "broadcast_interval_ms must be greater than zero".into(),
            ));
        }
        if self.discovery.peer_timeout <= self.discovery.broadcast_interval {
            return Err(CollabError::Config(
                "peer_timeout_ms must exceed broadcast_interval_ms".into(),
            ));
        }
        if self.monitor.interval.is_zero() {
            return Err(CollabError::Config("interval_ms must be greater than zero".into()));
        }
        if self.monitor.ledger_capacity == 0 {
            return Err(CollabError::Config("ledger_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
