//! Local instance identity
//!
//! Every running instance announces itself under a [`PeerId`]: a fixed-width
//! token hashed from host name, user name and a nanosecond timestamp taken at
//! startup. The token is stable for the lifetime of the process and two
//! instances on the same machine and account still get different ids.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Number of hash bytes kept in a peer id (32 hex chars).
const PEER_ID_BYTES: usize = 16;

/// Opaque identifier of one running instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Derive a fresh peer id for `hostname`/`username`.
    pub fn generate(hostname: &str, username: &str) -> Self {
        let nanos = Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or_else(|| Utc::now().timestamp_micros().saturating_mul(1000));

        let mut hasher = blake3::Hasher::new();
        hasher.update(hostname.as_bytes());
        hasher.update(b"|");
        hasher.update(username.as_bytes());
        hasher.update(b"|");
        hasher.update(&nanos.to_le_bytes());
        let hash = hasher.finalize();

        Self(hex::encode(&hash.as_bytes()[..PEER_ID_BYTES]))
    }

    /// Wrap an id received from the wire.
    pub fn from_wire(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 chars, for log lines and tables
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who this instance is on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub peer_id: PeerId,
    pub username: String,
    pub hostname: String,
}

impl LocalIdentity {
    /// Build an identity from explicit names.
    pub fn new(username: impl Into<String>, hostname: impl Into<String>) -> Self {
        let username = username.into();
        let hostname = hostname.into();
        Self {
            peer_id: PeerId::generate(&hostname, &username),
            username,
            hostname,
        }
    }

    /// Build an identity from the OS account and machine name.
    ///
    /// Either value can be overridden; a host name that cannot be read
    /// falls back to `"localhost"`.
    pub fn detect(username: Option<String>, hostname: Option<String>) -> Self {
        let username = username.unwrap_or_else(whoami::username);
        let hostname = hostname.unwrap_or_else(|| match whoami::fallible::hostname() {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(error = ?e, "Could not read host name");
                "localhost".to_string()
            }
        });
        Self::new(username, hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_is_fixed_width_hex() {
        let id = PeerId::generate("workstation-7", "alice");
        assert_eq!(id.as_str().len(), PEER_ID_BYTES * 2);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_peer_ids_differ_between_instances() {
        let a = LocalIdentity::new("alice", "workstation-7");
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = LocalIdentity::new("alice", "workstation-7");
        assert_ne!(a.peer_id, b.peer_id);
    }

    #[test]
    fn test_short_id() {
        let id = PeerId::from_wire("0123456789abcdef");
        assert_eq!(id.short(), "01234567");
        assert_eq!(PeerId::from_wire("abc").short(), "abc");
    }

    #[test]
    fn test_detect_respects_overrides() {
        let identity = LocalIdentity::detect(Some("bob".into()), Some("cad-03".into()));
        assert_eq!(identity.username, "bob");
        assert_eq!(identity.hostname, "cad-03");
    }
}
