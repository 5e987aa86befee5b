//! Discovery service: the listen, broadcast and cleanup loops
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  DiscoveryService                                               │
//! │  ├── listen loop     recv_from → decode → registry.upsert       │
//! │  │                   → PeerDiscovered / PeerUpdated             │
//! │  ├── broadcast loop  every 5s → packet → each broadcast target  │
//! │  ├── cleanup loop    every timeout/2 → registry.remove_stale    │
//! │  │                   → PeerLost                                 │
//! │  └── CancellationToken shared by all three                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! State machine: `Stopped → Starting → Running → Stopping → Stopped`.
//! If the listen loop dies the state moves to `Faulted`; the broadcast and
//! cleanup loops keep running until `stop()`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::net::{announcement_targets, bind_listener, bind_sender};
use super::packet::{DiscoveryPacket, MAX_PACKET_SIZE};
use super::registry::{DiscoveredPeer, PeerRegistry, UpsertOutcome};
use crate::config::DiscoveryConfig;
use crate::error::{CollabError, CollabResult};
use crate::events::{DiscoveryEvent, EVENT_CHANNEL_CAPACITY};
use crate::identity::LocalIdentity;
use crate::types::ProjectInfo;

/// Lifecycle state of the discovery service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Listen loop terminated on a socket error; announcing still works
    Faulted,
}

impl fmt::Display for DiscoveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryState::Stopped => write!(f, "stopped"),
            DiscoveryState::Starting => write!(f, "starting"),
            DiscoveryState::Running => write!(f, "running"),
            DiscoveryState::Stopping => write!(f, "stopping"),
            DiscoveryState::Faulted => write!(f, "faulted"),
        }
    }
}

/// State shared between the service handle and its loops
struct Shared {
    config: DiscoveryConfig,
    identity: LocalIdentity,
    project: RwLock<ProjectInfo>,
    registry: PeerRegistry,
    state: Mutex<DiscoveryState>,
    local_addr: Mutex<Option<SocketAddr>>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

/// Handles owned while the loops are alive
struct RunningLoops {
    cancel: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    sender: Arc<UdpSocket>,
}

/// LAN presence protocol
///
/// # Example
///
/// ```ignore
/// let service = DiscoveryService::new(DiscoveryConfig::default(), LocalIdentity::detect(None, None));
/// let mut events = service.subscribe();
///
/// service.start(ProjectInfo::new("Tower A", guid)).await?;
///
/// while let Ok(event) = events.recv().await {
///     if let DiscoveryEvent::PeerDiscovered(peer) = event {
///         println!("{} is online at {}", peer.username, peer.service_addr());
///     }
/// }
/// ```
pub struct DiscoveryService {
    shared: Arc<Shared>,
    running: tokio::sync::Mutex<Option<RunningLoops>>,
}

impl DiscoveryService {
    pub fn new(config: DiscoveryConfig, identity: LocalIdentity) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                identity,
                project: RwLock::new(ProjectInfo::default()),
                registry: PeerRegistry::new(),
                state: Mutex::new(DiscoveryState::Stopped),
                local_addr: Mutex::new(None),
                event_tx,
            }),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Subscribe to peer events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn state(&self) -> DiscoveryState {
        *self.shared.state.lock()
    }

    /// True only while all three loops are alive
    pub fn is_running(&self) -> bool {
        self.state() == DiscoveryState::Running
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.shared.identity
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.shared.registry
    }

    pub fn project(&self) -> ProjectInfo {
        self.shared.project.read().clone()
    }

    /// Address the receive socket is bound to, while started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.lock()
    }

    /// Snapshot of peers on the same project as this instance
    pub fn project_peers(&self) -> Vec<DiscoveredPeer> {
        let project = self.project();
        self.shared.registry.list_for_project(&project)
    }

    /// Bind sockets, spawn the loops and announce once.
    ///
    /// # Errors
    ///
    /// Returns `CollabError::AlreadyRunning` unless the service is stopped.
    /// Returns `CollabError::Bind` if either socket cannot be bound; no loop
    /// is started in that case.
    pub async fn start(&self, project: ProjectInfo) -> CollabResult<()> {
        let mut running = self.running.lock().await;

        {
            let mut state = self.shared.state.lock();
            if *state != DiscoveryState::Stopped {
                return Err(CollabError::AlreadyRunning(*state));
            }
            *state = DiscoveryState::Starting;
        }

        *self.shared.project.write() = project;

        let sockets = bind_listener(self.shared.config.port)
            .and_then(|listener| Ok((listener, bind_sender()?)));
        let (listener, sender, local_addr) = match sockets.and_then(|(listener, sender)| {
            let local_addr = listener.local_addr()?;
            Ok((listener, sender, local_addr))
        }) {
            Ok(bound) => bound,
            Err(e) => {
                error!(port = self.shared.config.port, error = %e, "Discovery bind failed");
                self.shared.set_state(DiscoveryState::Stopped);
                return Err(e);
            }
        };
        *self.shared.local_addr.lock() = Some(local_addr);

        let listener = Arc::new(listener);
        let sender = Arc::new(sender);
        let cancel = CancellationToken::new();

        self.shared.set_state(DiscoveryState::Running);

        let tasks = vec![
            (
                "listen",
                tokio::spawn(listen_loop(self.shared.clone(), listener, cancel.clone())),
            ),
            (
                "broadcast",
                tokio::spawn(broadcast_loop(self.shared.clone(), sender.clone(), cancel.clone())),
            ),
            (
                "cleanup",
                tokio::spawn(cleanup_loop(self.shared.clone(), cancel.clone())),
            ),
        ];

        info!(
            peer_id = %self.shared.identity.peer_id.short(),
            %local_addr,
            project = %self.shared.project.read().name,
            "Discovery started"
        );

        self.shared.announce(&sender).await;

        *running = Some(RunningLoops {
            cancel,
            tasks,
            sender,
        });
        Ok(())
    }

    /// Cancel the loops, wait up to the grace period, and clear all peers.
    ///
    /// Loops still busy when the grace period ends are abandoned, not
    /// aborted. Calling `stop` on a stopped service does nothing.
    pub async fn stop(&self) {
        let Some(loops) = self.running.lock().await.take() else {
            debug!("Discovery not running");
            return;
        };

        self.shared.set_state(DiscoveryState::Stopping);
        loops.cancel.cancel();

        let deadline = Instant::now() + self.shared.config.shutdown_grace;
        for (name, handle) in loops.tasks {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => debug!(task = name, "Discovery loop stopped"),
                Ok(Err(e)) => warn!(task = name, error = ?e, "Discovery loop ended abnormally"),
                Err(_) => warn!(task = name, "Discovery loop did not stop within grace period, abandoning"),
            }
        }

        drop(loops.sender);
        *self.shared.local_addr.lock() = None;
        self.shared.registry.clear();
        self.shared.set_state(DiscoveryState::Stopped);
        info!("Discovery stopped");
    }

    /// Switch project and, when running, announce the change immediately.
    pub async fn update_project(&self, project: ProjectInfo) {
        info!(project = %project.name, "Project changed");
        *self.shared.project.write() = project;

        let running = self.running.lock().await;
        if let Some(loops) = running.as_ref() {
            self.shared.announce(&loops.sender).await;
        }
    }

    /// Feed one received datagram through the protocol.
    ///
    /// This is what the listen loop does with every packet; the returned event
    /// has already been published to subscribers.
    pub fn process_datagram(
        &self,
        bytes: &[u8],
        from: SocketAddr,
        now: DateTime<Utc>,
    ) -> Option<DiscoveryEvent> {
        self.shared.handle_datagram(bytes, from, now)
    }

    /// Remove peers whose heartbeat is older than the timeout, publishing
    /// `PeerLost` for each. This is one cleanup loop pass.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<DiscoveredPeer> {
        self.shared.sweep(now)
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        if let Some(loops) = self.running.get_mut().as_ref() {
            loops.cancel.cancel();
        }
    }
}

impl Shared {
    fn set_state(&self, state: DiscoveryState) {
        *self.state.lock() = state;
    }

    fn handle_datagram(
        &self,
        bytes: &[u8],
        from: SocketAddr,
        now: DateTime<Utc>,
    ) -> Option<DiscoveryEvent> {
        let packet = match DiscoveryPacket::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                trace!(%from, error = %e, "Dropping foreign datagram");
                return None;
            }
        };

        if packet.is_from(&self.identity.peer_id) {
            trace!("Ignoring own announcement");
            return None;
        }

        let event = match self.registry.upsert(&packet, from, now) {
            UpsertOutcome::New(peer) => {
                info!(
                    peer_id = %peer.peer_id.short(),
                    username = %peer.username,
                    hostname = %peer.hostname,
                    ip = %peer.ip_address,
                    project = %peer.project_name,
                    "Peer discovered"
                );
                DiscoveryEvent::PeerDiscovered(peer)
            }
            UpsertOutcome::Updated(peer) => {
                info!(
                    peer_id = %peer.peer_id.short(),
                    username = %peer.username,
                    project = %peer.project_name,
                    "Peer switched project"
                );
                DiscoveryEvent::PeerUpdated(peer)
            }
            UpsertOutcome::Unchanged => {
                trace!(peer_id = %packet.peer_id.short(), "Heartbeat");
                return None;
            }
        };

        let _ = self.event_tx.send(event.clone());
        Some(event)
    }

    fn sweep(&self, now: DateTime<Utc>) -> Vec<DiscoveredPeer> {
        let lost = self.registry.remove_stale(now, self.config.peer_timeout);
        for peer in &lost {
            info!(
                peer_id = %peer.peer_id.short(),
                username = %peer.username,
                silent_for = ?peer.heartbeat_age(now),
                "Peer lost"
            );
            let _ = self.event_tx.send(DiscoveryEvent::PeerLost(peer.clone()));
        }
        lost
    }

    /// Send the current announcement to every target. Returns how many
    /// sends succeeded.
    async fn announce(&self, sender: &UdpSocket) -> usize {
        let project = self.project.read().clone();
        let packet = DiscoveryPacket::announce(&self.identity, &project, self.config.service_port);
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode announcement");
                return 0;
            }
        };

        // An ephemeral discovery port has no well-known broadcast destination
        let broadcast = self.config.broadcast && self.config.port != 0;
        let targets = announcement_targets(self.config.port, broadcast, &self.config.static_peers);

        let mut sent = 0;
        for target in targets {
            match sender.send_to(&bytes, target).await {
                Ok(_) => sent += 1,
                Err(e) => warn!(%target, error = ?e, "Failed to send announcement"),
            }
        }
        trace!(sent, "Announcement round complete");
        sent
    }

    fn listener_failed(&self, message: String) {
        {
            let mut state = self.state.lock();
            if *state == DiscoveryState::Running {
                *state = DiscoveryState::Faulted;
            }
        }
        let _ = self
            .event_tx
            .send(DiscoveryEvent::ListenerFailed { message });
    }
}

async fn listen_loop(shared: Arc<Shared>, socket: Arc<UdpSocket>, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    shared.handle_datagram(&buf[..len], from, Utc::now());
                }
                Err(e) => {
                    error!(error = ?e, "Discovery listener failed, no new peers will be discovered");
                    shared.listener_failed(e.to_string());
                    break;
                }
            }
        }
    }
    debug!("Listen loop exited");
}

async fn broadcast_loop(shared: Arc<Shared>, sender: Arc<UdpSocket>, cancel: CancellationToken) {
    let period = shared.config.broadcast_interval;
    // start() already announced once
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                shared.announce(&sender).await;
            }
        }
    }
    debug!("Broadcast loop exited");
}

async fn cleanup_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let period = shared.config.cleanup_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                shared.sweep(Utc::now());
            }
        }
    }
    debug!("Cleanup loop exited");
}
