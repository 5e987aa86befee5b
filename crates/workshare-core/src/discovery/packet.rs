//! Discovery wire format
//!
//! One UDP datagram carries one JSON object with PascalCase keys:
//!
//! ```json
//! {
//!   "PacketType": "WORKSHARE_DISCOVERY_V1",
//!   "Version": "1.0",
//!   "PeerId": "3f1c…",
//!   "Username": "alice",
//!   "Hostname": "cad-03",
//!   "ListenPort": 51235,
//!   "ProjectName": "Tower A",
//!   "ProjectGuid": "6f9619ff-…",
//!   "Timestamp": "2026-10-18T09:12:44.120Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CollabError, CollabResult};
use crate::identity::{LocalIdentity, PeerId};
use crate::types::ProjectInfo;

/// Magic + version string every packet must carry
pub const PACKET_MAGIC: &str = "WORKSHARE_DISCOVERY_V1";
pub const PROTOCOL_VERSION: &str = "1.0";

/// Datagrams above this size are not ours
pub const MAX_PACKET_SIZE: usize = 4096;

/// Presence announcement broadcast by every instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoveryPacket {
    pub packet_type: String,
    #[serde(default)]
    pub version: String,
    pub peer_id: PeerId,
    pub username: String,
    pub hostname: String,
    pub listen_port: u16,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_guid: String,
    pub timestamp: DateTime<Utc>,
}

impl DiscoveryPacket {
    /// Build the announcement for the local instance.
    pub fn announce(identity: &LocalIdentity, project: &ProjectInfo, listen_port: u16) -> Self {
        Self {
            packet_type: PACKET_MAGIC.to_string(),
            version: PROTOCOL_VERSION.to_string(),
            peer_id: identity.peer_id.clone(),
            username: identity.username.clone(),
            hostname: identity.hostname.clone(),
            listen_port,
            project_name: project.name.clone(),
            project_guid: project.guid.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn encode(&self) -> CollabResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a datagram and check the magic.
    pub fn decode(bytes: &[u8]) -> CollabResult<Self> {
        let packet: DiscoveryPacket = serde_json::from_slice(bytes)?;
        if packet.packet_type != PACKET_MAGIC {
            return Err(CollabError::InvalidPacket(format!(
                "unexpected packet type {:?}",
                packet.packet_type
            )));
        }
        Ok(packet)
    }

    /// Whether this packet was sent by `local` (our own broadcast echoed back).
    pub fn is_from(&self, local: &PeerId) -> bool {
        &self.peer_id == local
    }

    pub fn project(&self) -> ProjectInfo {
        ProjectInfo::new(self.project_name.clone(), self.project_guid.clone())
    }
}
