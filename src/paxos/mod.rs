//! Bootstrap Consensus Module
//!
//! Single-decree Paxos, run over gossip, to agree on the initial set of
//! peers that will divide the ring between them. Safe under partition: a
//! minority component can never seed a conflicting ring.
//!
//! ## Core Mechanisms
//! - **Gossip, not RPC**: every node gossips everything it knows about every
//!   node's promises and accepted proposals. Prepare, promise, accept-request
//!   and accept all fall out of re-running `think` after each update.
//! - **One decree**: the allocator reads the consensus exactly once to seed
//!   the ring; after that the node is dormant.

pub mod node;
