use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Unique identifier for a peer on the overlay.
/// Wrapper around a string (hex or UUID) so ordering is lexicographic and
/// stable across every node — bootstrap leader selection depends on that.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PeerName(pub String);

impl PeerName {
    /// Generates a random UUID v4-based PeerName.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A known peer on the overlay, as seen by the local node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Unique name of the peer.
    pub name: PeerName,
    /// Optional human-friendly nickname (admin commands accept either).
    pub nickname: Option<String>,
    /// UDP address the peer gossips from.
    pub addr: SocketAddr,
}

/// The transport the allocator sends through. Implementations provide their
/// own synchronization; both methods are safe to call from the actor loop.
pub trait Gossip: Send + Sync {
    /// Sends a payload to every known peer.
    fn broadcast(&self, payload: Vec<u8>);
    /// Sends a payload to one peer. Delivery is best-effort; the protocol
    /// self-heals around lost messages.
    fn unicast(&self, dst: &PeerName, payload: Vec<u8>);
}

/// Name resolution for admin commands: accepts a peer name or a nickname.
pub trait Directory: Send + Sync {
    fn resolve(&self, name_or_nickname: &str) -> Option<PeerName>;
}

/// The wire protocol between mesh nodes via UDP.
///
/// `Broadcast` and `Unicast` payloads are opaque to the fabric; the allocator
/// encodes and decodes them (see `allocator::protocol`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MeshMessage {
    /// Announces the sender to a peer, carrying its identity.
    /// Sent to seeds on startup and replied to on first contact.
    Hello { peer: Peer, known: Vec<Peer> },
    /// A payload addressed to every peer.
    Broadcast { from: PeerName, payload: Vec<u8> },
    /// A payload addressed to one peer.
    Unicast { from: PeerName, payload: Vec<u8> },
}
