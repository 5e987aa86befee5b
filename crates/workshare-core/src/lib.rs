//! Workshare Core Library
//!
//! LAN peer discovery and conflict prediction for teams sharing one
//! central building model.
//!
//! ## Overview
//!
//! Each workstation runs a [`CollabEngine`]. It announces itself over UDP
//! broadcast, keeps a registry of the other workstations it hears from, and
//! watches element activity from the host editor. When someone else touches
//! an element you still have pending changes on, the engine predicts the
//! conflict before either of you syncs.
//!
//! ## Core Principles
//!
//! - **Serverless**: Discovery is plain UDP broadcast on the local subnet
//! - **Advisory**: Predictions and recommendations never lock anything
//! - **Event-driven**: Callers subscribe to broadcast channels instead of
//!   registering callbacks
//!
//! ## Quick Start
//!
//! ```ignore
//! use workshare_core::{CollabEngine, EngineConfig, ProjectInfo};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = CollabEngine::new(EngineConfig::default())?;
//!     let mut events = engine.subscribe_discovery();
//!
//!     engine.start(ProjectInfo::new("Tower A", "5f1c")).await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod events;
pub mod identity;
pub mod monitor;
pub mod types;

// Re-exports
pub use config::{DiscoveryConfig, EngineConfig, MonitorConfig};
pub use discovery::{
    DiscoveredPeer, DiscoveryPacket, DiscoveryService, DiscoveryState, PeerRegistry,
    UpsertOutcome, PACKET_MAGIC, PROTOCOL_VERSION,
};
pub use engine::{CollabEngine, NodeInfo};
pub use error::{CollabError, CollabResult};
pub use events::{DiscoveryEvent, MonitorEvent, EVENT_CHANNEL_CAPACITY};
pub use identity::{LocalIdentity, PeerId};
pub use monitor::{
    is_urgent, ActivityHotspot, ActivityLedger, ConflictPrediction, ConflictPredictor, ConflictRisk,
    ConflictSeverity, HotspotAnalyzer, MonitoringScheduler, Recommendation, SyncAdvisor,
    SyncState, SyncStatus, TickReport, WorkshareMonitor,
};
pub use types::*;
