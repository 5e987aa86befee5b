//! Event types raised by the discovery and monitoring loops
//!
//! Events are published on `tokio::sync::broadcast` channels owned by the
//! component that raises them. `send` never blocks, so delivery happens
//! synchronously on the raising loop; a subscriber that falls behind sees
//! `RecvError::Lagged` instead of stalling the loop.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  DiscoveryEvent (DiscoveryService)                              │
//! │  ├── PeerDiscovered: first announcement from a peer             │
//! │  ├── PeerUpdated: known peer switched project                   │
//! │  ├── PeerLost: heartbeat older than the peer timeout            │
//! │  └── ListenerFailed: receive socket died, no new peers          │
//! │                                                                 │
//! │  MonitorEvent (WorkshareMonitor)                                │
//! │  ├── ConflictPredicted: pending change collides with activity   │
//! │  ├── SyncRecommended: new urgent advice for a user              │
//! │  └── HotspotDetected: high-risk multi-user concentration        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::discovery::DiscoveredPeer;
use crate::monitor::{ActivityHotspot, ConflictPrediction};
use crate::types::UserId;

/// Capacity of every event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Peer liveness notifications
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A peer announced itself for the first time (or again after being lost)
    PeerDiscovered(DiscoveredPeer),
    /// A known peer announced a different project
    PeerUpdated(DiscoveredPeer),
    /// A peer stopped announcing and was removed
    PeerLost(DiscoveredPeer),
    /// The listen loop terminated; peers will age out and none will be found
    ListenerFailed {
        /// Error message
        message: String,
    },
}

impl DiscoveryEvent {
    /// Get the peer associated with this event, if any
    pub fn peer(&self) -> Option<&DiscoveredPeer> {
        match self {
            DiscoveryEvent::PeerDiscovered(peer)
            | DiscoveryEvent::PeerUpdated(peer)
            | DiscoveryEvent::PeerLost(peer) => Some(peer),
            DiscoveryEvent::ListenerFailed { .. } => None,
        }
    }
}

/// Conflict and advisory notifications
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    ConflictPredicted(ConflictPrediction),
    SyncRecommended {
        user_id: UserId,
        text: String,
    },
    HotspotDetected(ActivityHotspot),
}

impl MonitorEvent {
    /// Get the user this event is addressed to, if any
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            MonitorEvent::ConflictPredicted(prediction) => Some(&prediction.local_user_id),
            MonitorEvent::SyncRecommended { user_id, .. } => Some(user_id),
            MonitorEvent::HotspotDetected(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ConflictRisk;
    use std::collections::BTreeSet;

    #[test]
    fn test_listener_failed_has_no_peer() {
        let event = DiscoveryEvent::ListenerFailed {
            message: "socket closed".to_string(),
        };
        assert!(event.peer().is_none());
    }

    #[test]
    fn test_monitor_event_user_id() {
        let event = MonitorEvent::SyncRecommended {
            user_id: UserId::from("alice"),
            text: "Up to date".to_string(),
        };
        assert_eq!(event.user_id(), Some(&UserId::from("alice")));

        let event = MonitorEvent::HotspotDetected(ActivityHotspot {
            area_name: "Level 2".to_string(),
            level: "Level 2".to_string(),
            activity_count: 6,
            active_users: BTreeSet::new(),
            conflict_risk: ConflictRisk::High,
        });
        assert_eq!(event.user_id(), None);
    }
}
