//! Allocator Wire & API Protocol
//!
//! Defines the gossip message framing between peers and the HTTP endpoints
//! the frontend calls.
//!
//! Every gossip payload is one tag byte followed by a body. Unicasts carry
//! the sender's encoded ring; broadcasts carry either a ring or, while the
//! overlay is still bootstrapping, the Paxos gossip state.

use crate::ring::ring::RingError;

// --- Message tags ---

/// The sender wants space; the body is the sender's ring.
pub const MSG_SPACE_REQUEST: u8 = 0;
/// The sender elected the receiver as bootstrap leader; body is its ring.
pub const MSG_LEADER_ELECTED: u8 = 1;
/// Plain ring update: a donor's reply or an anti-entropy broadcast.
pub const MSG_RING_UPDATE: u8 = 2;
/// Paxos gossip state, broadcast while the ring is still empty.
pub const MSG_PAXOS: u8 = 3;

/// Frames a body with its tag byte.
pub fn encode_message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(1 + body.len());
    msg.push(tag);
    msg.extend_from_slice(body);
    msg
}

/// Splits a framed message back into tag and body.
pub fn split_message(msg: &[u8]) -> Result<(u8, &[u8]), RingError> {
    match msg.split_first() {
        Some((&tag, body)) => Ok((tag, body)),
        None => Err(RingError::Decode("empty message".to_string())),
    }
}

// --- HTTP endpoints ---

/// POST allocates an address for a container; DELETE frees all of them.
pub const ENDPOINT_IP: &str = "/ip/:ident";
/// PUT claims a specific address for a container.
pub const ENDPOINT_IP_ADDR: &str = "/ip/:ident/:addr";
/// DELETE takes over the ranges of a dead peer (name or nickname).
pub const ENDPOINT_PEER: &str = "/peer/:ident";
/// GET returns a human-readable dump of ring, spaces and pending requests.
pub const ENDPOINT_STATUS: &str = "/status";
/// POST transfers our ranges away and stops the allocator.
pub const ENDPOINT_SHUTDOWN: &str = "/shutdown";
