//! Decentralized IPAM Library
//!
//! This library crate defines the core modules of a decentralized IP address
//! manager for a peer-to-peer overlay network. Every peer serves allocation
//! requests for its local containers out of one shared subnet, with no
//! central coordinator anywhere.
//!
//! ## Architecture Modules
//! The system is composed of six loosely coupled subsystems:
//!
//! - **`addrs`**: IPv4 addresses as 32-bit integers, range arithmetic and
//!   CIDR subnet parsing.
//! - **`ring`**: the CRDT at the center of the design. A sorted token
//!   sequence maps every address to exactly one owning peer and stays
//!   convergent under gossip in any delivery order.
//! - **`space`**: per-peer free/in-use bookkeeping for the owned ranges,
//!   including the chunk-carving logic behind space donation.
//! - **`paxos`**: single-decree consensus over gossip, used once at
//!   bootstrap to agree which peers seed the ring.
//! - **`allocator`**: the single-threaded actor serializing all state
//!   changes: command surface, pending-request queues, the request/donate
//!   protocol and the HTTP handlers.
//! - **`gossip`**: the UDP overlay fabric and peer directory the allocator
//!   gossips through.

pub mod addrs;
pub mod allocator;
pub mod gossip;
pub mod paxos;
pub mod ring;
pub mod space;
