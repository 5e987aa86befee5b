//! Engine facade: one discovery service, one monitor, one scheduler
//!
//! Construct a [`CollabEngine`] once per process and hand out references to
//! it; nothing in this crate keeps global state.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::EngineConfig;
use crate::discovery::{DiscoveredPeer, DiscoveryService};
use crate::error::CollabResult;
use crate::events::{DiscoveryEvent, MonitorEvent};
use crate::identity::LocalIdentity;
use crate::monitor::{MonitoringScheduler, WorkshareMonitor};
use crate::types::ProjectInfo;

/// Summary of a running node, for status displays
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub identity: LocalIdentity,
    pub project: ProjectInfo,
    pub discovery_state: crate::discovery::DiscoveryState,
    pub peer_count: usize,
    pub tracked_users: usize,
    pub ledger_len: usize,
}

pub struct CollabEngine {
    config: EngineConfig,
    discovery: DiscoveryService,
    monitor: Arc<WorkshareMonitor>,
    scheduler: MonitoringScheduler,
}

impl CollabEngine {
    /// Build the engine. Identity comes from the config overrides or the OS.
    pub fn new(config: EngineConfig) -> CollabResult<Self> {
        config.validate()?;
        let identity = LocalIdentity::detect(config.username.clone(), config.hostname.clone());
        Ok(Self::with_identity(config, identity))
    }

    pub fn with_identity(config: EngineConfig, identity: LocalIdentity) -> Self {
        let discovery = DiscoveryService::new(config.discovery.clone(), identity);
        let monitor = WorkshareMonitor::new(&config.monitor);
        let scheduler = MonitoringScheduler::new(monitor.clone(), config.monitor.interval);
        Self {
            config,
            discovery,
            monitor,
            scheduler,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn identity(&self) -> &LocalIdentity {
        self.discovery.identity()
    }

    pub fn discovery(&self) -> &DiscoveryService {
        &self.discovery
    }

    pub fn monitor(&self) -> &Arc<WorkshareMonitor> {
        &self.monitor
    }

    pub fn scheduler(&self) -> &MonitoringScheduler {
        &self.scheduler
    }

    pub fn subscribe_discovery(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.discovery.subscribe()
    }

    pub fn subscribe_monitor(&self) -> broadcast::Receiver<MonitorEvent> {
        self.monitor.subscribe()
    }

    /// Start discovery, then the monitoring loop.
    ///
    /// # Errors
    ///
    /// Fails if the discovery sockets cannot be bound or discovery is
    /// already running; the scheduler is not started in that case.
    pub async fn start(&self, project: ProjectInfo) -> CollabResult<()> {
        self.discovery.start(project).await?;
        self.scheduler.start();
        info!(peer_id = %self.identity().peer_id.short(), "Engine started");
        Ok(())
    }

    /// Stop the monitoring loop and discovery.
    pub async fn shutdown(&self) {
        self.scheduler.stop(self.config.discovery.shutdown_grace).await;
        self.discovery.stop().await;
        info!("Engine shutdown complete");
    }

    pub async fn update_project(&self, project: ProjectInfo) {
        self.discovery.update_project(project).await;
    }

    /// Peers announcing the same project as this node
    pub fn project_peers(&self) -> Vec<DiscoveredPeer> {
        self.discovery.project_peers()
    }

    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            identity: self.identity().clone(),
            project: self.discovery.project(),
            discovery_state: self.discovery.state(),
            peer_count: self.discovery.registry().len(),
            tracked_users: self.monitor.tracked_users().len(),
            ledger_len: self.monitor.ledger().len(),
        }
    }
}
