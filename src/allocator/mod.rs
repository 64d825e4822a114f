//! Allocator Module
//!
//! The heart of the system: a single-threaded actor that serializes every
//! state change to the ring, the owned spaces and the container table.
//!
//! ## Architecture Overview
//! 1. **Commands**: external callers (HTTP handlers, the mesh fabric) submit
//!    commands over a channel; synchronous ones carry a oneshot reply. All
//!    state lives inside the actor task, so there are no locks anywhere.
//! 2. **Pending operations**: an allocate or claim that cannot complete yet
//!    is queued, not blocked on. Every wake-up re-drives the queues; ring
//!    updates are what eventually unblock them.
//! 3. **Bootstrap**: the first allocation on an empty ring starts a Paxos
//!    round over gossip; the lowest-named peer of the agreed set divides the
//!    ring and broadcasts it.
//! 4. **Donation**: a peer that is out of space asks the ring for a donor and
//!    sends it a space request; the donor carves off a chunk, re-assigns it
//!    on the ring and sends its ring back.
//!
//! ## Submodules
//! - **`allocator`**: the state machine itself and the protocol logic.
//! - **`actor`**: the command enum, the event loop and the caller handle.
//! - **`pending`**: queued operations and cancellation.
//! - **`protocol`**: message tags and HTTP endpoint contracts.
//! - **`handlers`**: the axum HTTP surface.

pub mod actor;
pub mod allocator;
pub mod handlers;
pub mod pending;
pub mod protocol;
pub mod types;
