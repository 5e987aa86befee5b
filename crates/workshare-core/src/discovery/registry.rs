//! Peer registry for tracking instances seen on the LAN
//!
//! The registry is the single owner of [`DiscoveredPeer`] records. Every
//! mutation is one critical section over one key (or one sweep for stale
//! peers), so the listen and cleanup loops can share it without any other
//! coordination. Readers always get owned snapshots.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Peer Lifecycle                                                 │
//! │  1. First packet from PeerId  → upsert → New      (Discovered)  │
//! │  2. Heartbeat, same project   → upsert → Unchanged              │
//! │  3. Heartbeat, new project    → upsert → Updated  (Updated)     │
//! │  4. now - last_heartbeat > T  → remove_stale      (Lost)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::packet::DiscoveryPacket;
use crate::identity::PeerId;
use crate::types::ProjectInfo;

/// Information about a peer currently announcing on the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPeer {
    pub peer_id: PeerId,
    pub hostname: String,
    /// Source address of the last announcement
    pub ip_address: IpAddr,
    /// Collaboration transport port the peer advertised
    pub port: u16,
    pub username: String,
    pub project_name: String,
    pub project_guid: String,
    pub discovered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_connected: bool,
}

impl DiscoveredPeer {
    fn from_packet(packet: &DiscoveryPacket, sender: SocketAddr, now: DateTime<Utc>) -> Self {
        Self {
            peer_id: packet.peer_id.clone(),
            hostname: packet.hostname.clone(),
            ip_address: sender.ip(),
            port: packet.listen_port,
            username: packet.username.clone(),
            project_name: packet.project_name.clone(),
            project_guid: packet.project_guid.clone(),
            discovered_at: now,
            last_heartbeat: now,
            is_connected: true,
        }
    }

    /// Address of the peer's collaboration transport
    pub fn service_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }

    /// Time since the last announcement (zero if the clock went backwards)
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_heartbeat).to_std().unwrap_or_default()
    }

    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.heartbeat_age(now) > timeout
    }

    pub fn is_in_project(&self, project: &ProjectInfo) -> bool {
        project.matches(&self.project_name, &self.project_guid)
    }
}

/// Result of feeding one announcement into the registry
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// First announcement from this peer
    New(DiscoveredPeer),
    /// Known peer whose project name changed
    Updated(DiscoveredPeer),
    /// Plain heartbeat
    Unchanged,
}

/// Concurrent store of known peers keyed by peer id
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, DiscoveredPeer>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or refresh a peer from an announcement received at `now`.
    ///
    /// `discovered_at` is preserved across heartbeats. The outcome is
    /// `Updated` only when the project name changed, so callers can raise an
    /// update notification without firing one per heartbeat.
    pub fn upsert(
        &self,
        packet: &DiscoveryPacket,
        sender: SocketAddr,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let mut peers = self.peers.write();

        match peers.get_mut(&packet.peer_id) {
            Some(existing) => {
                let project_changed = existing.project_name != packet.project_name;

                existing.last_heartbeat = now;
                existing.ip_address = sender.ip();
                existing.port = packet.listen_port;
                existing.username = packet.username.clone();
                existing.hostname = packet.hostname.clone();
                existing.project_name = packet.project_name.clone();
                existing.project_guid = packet.project_guid.clone();
                existing.is_connected = true;

                if project_changed {
                    UpsertOutcome::Updated(existing.clone())
                } else {
                    UpsertOutcome::Unchanged
                }
            }
            None => {
                let peer = DiscoveredPeer::from_packet(packet, sender, now);
                peers.insert(peer.peer_id.clone(), peer.clone());
                UpsertOutcome::New(peer)
            }
        }
    }

    /// Remove a peer, returning it if it was known
    pub fn remove(&self, peer_id: &PeerId) -> Option<DiscoveredPeer> {
        self.peers.write().remove(peer_id)
    }

    /// Remove and return every peer whose heartbeat is older than `timeout`.
    ///
    /// Runs as one critical section: a peer is returned by at most one sweep.
    pub fn remove_stale(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<DiscoveredPeer> {
        let mut peers = self.peers.write();
        let stale: Vec<PeerId> = peers
            .values()
            .filter(|p| p.is_stale(now, timeout))
            .map(|p| p.peer_id.clone())
            .collect();

        stale.iter().filter_map(|id| peers.remove(id)).collect()
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<DiscoveredPeer> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Snapshot of all known peers
    pub fn list(&self) -> Vec<DiscoveredPeer> {
        self.peers.read().values().cloned().collect()
    }

    /// Snapshot of peers working on `project` (name or guid match)
    pub fn list_for_project(&self, project: &ProjectInfo) -> Vec<DiscoveredPeer> {
        self.peers
            .read()
            .values()
            .filter(|p| p.is_in_project(project))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    pub fn clear(&self) {
        self.peers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentity;

    fn sender() -> SocketAddr {
        "192.168.1.20:51234".parse().unwrap()
    }

    fn packet(identity: &LocalIdentity, project: &str) -> DiscoveryPacket {
        DiscoveryPacket::announce(identity, &ProjectInfo::new(project, ""), 51235)
    }

    #[test]
    fn test_first_announcement_is_new() {
        let registry = PeerRegistry::new();
        let bob = LocalIdentity::new("bob", "cad-04");
        let now = Utc::now();

        let outcome = registry.upsert(&packet(&bob, "Tower A"), sender(), now);

        let UpsertOutcome::New(peer) = outcome else {
            panic!("expected New, got {outcome:?}");
        };
        assert_eq!(peer.peer_id, bob.peer_id);
        assert_eq!(peer.ip_address, sender().ip());
        assert_eq!(peer.port, 51235);
        assert_eq!(peer.discovered_at, now);
        assert!(peer.is_connected);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_heartbeat_preserves_discovered_at() {
        let registry = PeerRegistry::new();
        let bob = LocalIdentity::new("bob", "cad-04");
        let first = Utc::now();
        let later = first + chrono::Duration::seconds(5);

        registry.upsert(&packet(&bob, "Tower A"), sender(), first);
        let outcome = registry.upsert(&packet(&bob, "Tower A"), sender(), later);

        assert_eq!(outcome, UpsertOutcome::Unchanged);
        let peer = registry.get(&bob.peer_id).unwrap();
        assert_eq!(peer.discovered_at, first);
        assert_eq!(peer.last_heartbeat, later);
    }

    #[test]
    fn test_project_change_reports_updated_once() {
        let registry = PeerRegistry::new();
        let bob = LocalIdentity::new("bob", "cad-04");
        let now = Utc::now();

        registry.upsert(&packet(&bob, "Tower A"), sender(), now);
        let changed = registry.upsert(&packet(&bob, "Tower B"), sender(), now);
        let again = registry.upsert(&packet(&bob, "Tower B"), sender(), now);

        assert!(matches!(changed, UpsertOutcome::Updated(ref p) if p.project_name == "Tower B"));
        assert_eq!(again, UpsertOutcome::Unchanged);
    }

    #[test]
    fn test_remove_stale_only_removes_expired() {
        let registry = PeerRegistry::new();
        let timeout = Duration::from_secs(15);
        let now = Utc::now();
        let old = LocalIdentity::new("old", "cad-01");
        let fresh = LocalIdentity::new("fresh", "cad-02");

        registry.upsert(&packet(&old, "P"), sender(), now - chrono::Duration::seconds(16));
        registry.upsert(&packet(&fresh, "P"), sender(), now - chrono::Duration::seconds(3));

        let removed = registry.remove_stale(now, timeout);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].peer_id, old.peer_id);
        assert!(registry.get(&fresh.peer_id).is_some());

        // A second sweep never reports the same peer again
        assert!(registry.remove_stale(now, timeout).is_empty());
    }

    #[test]
    fn test_heartbeat_exactly_at_timeout_is_kept() {
        let registry = PeerRegistry::new();
        let now = Utc::now();
        let bob = LocalIdentity::new("bob", "cad-04");

        registry.upsert(&packet(&bob, "P"), sender(), now - chrono::Duration::seconds(15));
        assert!(registry.remove_stale(now, Duration::from_secs(15)).is_empty());
    }

    #[test]
    fn test_list_for_project_by_name_or_guid() {
        let registry = PeerRegistry::new();
        let now = Utc::now();
        let a = LocalIdentity::new("a", "h1");
        let b = LocalIdentity::new("b", "h2");
        let c = LocalIdentity::new("c", "h3");

        registry.upsert(&packet(&a, "Tower A"), sender(), now);
        let by_guid = DiscoveryPacket::announce(&b, &ProjectInfo::new("Tower A (local copy)", "G-1"), 1);
        registry.upsert(&by_guid, sender(), now);
        registry.upsert(&packet(&c, "Tower B"), sender(), now);

        let peers = registry.list_for_project(&ProjectInfo::new("Tower A", "G-1"));
        let mut names: Vec<_> = peers.iter().map(|p| p.username.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let registry = PeerRegistry::new();
        let bob = LocalIdentity::new("bob", "cad-04");
        registry.upsert(&packet(&bob, "P"), sender(), Utc::now());

        assert!(registry.remove(&bob.peer_id).is_some());
        assert!(registry.remove(&bob.peer_id).is_none());

        registry.upsert(&packet(&bob, "P"), sender(), Utc::now());
        registry.clear();
        assert!(registry.is_empty());
    }
}
