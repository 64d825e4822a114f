//! Ring CRDT Module
//!
//! Divides the subnet into contiguous ranges, each owned by exactly one peer,
//! and keeps every node's view convergent under gossip-only communication.
//!
//! ## Core Mechanisms
//! - **Tokens**: a sorted sequence of entries, each placed at the start of a
//!   range and carrying the owner, a per-token version and the owner's
//!   advertised free-address count. The range runs to the next token,
//!   wrapping past the end of the subnet back to the first.
//! - **Merge**: a lockstep walk over two sorted entry lists. Only the owner
//!   of a range may insert or update tokens inside it, and versions only move
//!   forward, which makes the merge commutative, associative and idempotent.
//! - **Ownership changes**: ranges are granted (donation) or transferred
//!   (admin takeover of a dead peer); entries are never deleted.

pub mod entry;
pub mod ring;

#[cfg(test)]
mod tests;
