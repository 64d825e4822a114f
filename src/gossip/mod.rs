//! Gossip & Peer Membership Module
//!
//! The overlay fabric the allocator runs on. Peers exchange state over UDP:
//! periodic broadcasts spread the ring epidemically, and unicasts carry the
//! request/donate protocol between specific peers.
//!
//! ## Core Mechanisms
//! - **Transport trait**: the allocator only sees the [`Gossip`] trait
//!   (broadcast + unicast), so tests can swap the UDP fabric for an in-memory
//!   router.
//! - **Peer table**: every node keeps a map of known peers (name, nickname,
//!   address), seeded via `--seed` and extended as hellos arrive.
//! - **Anti-entropy**: a periodic timer re-broadcasts our full state so that
//!   lost packets and late joiners converge without any retry logic in the
//!   core.

pub mod service;
pub mod types;
