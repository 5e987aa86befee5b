//! LAN peer discovery
//!
//! Every instance broadcasts a small JSON presence packet on a fixed UDP
//! port and listens for everyone else's. Peers that stop announcing are
//! dropped after the peer timeout.
//!
//! ## Protocol
//!
//! - **Announce**: every 5 s to each interface broadcast address, plus once
//!   immediately on start and on every project change
//! - **Timeout**: a peer silent for 15 s is lost
//! - **Cleanup**: stale peers are swept every 7.5 s (half the timeout)
//!
//! Packets with the wrong magic and our own echoed broadcasts are dropped
//! without logging above trace level.

pub mod net;
pub mod packet;
pub mod registry;
pub mod service;

pub use net::broadcast_address;
pub use packet::{DiscoveryPacket, PACKET_MAGIC, PROTOCOL_VERSION};
pub use registry::{DiscoveredPeer, PeerRegistry, UpsertOutcome};
pub use service::{DiscoveryService, DiscoveryState};
