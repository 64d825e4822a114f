//! Space Tracking Module
//!
//! Per-peer bookkeeping of which addresses are free and which are assigned,
//! inside the ranges the ring says we own.
//!
//! ## Core Concepts
//! - **Space**: one contiguous range with a sparse in-use set of offsets.
//!   Allocation hands out the lowest free address; donation carves off the
//!   biggest free chunk.
//! - **SpaceSet**: the sorted collection of this peer's spaces. It always
//!   mirrors the ring's owned ranges exactly; the allocator checks that
//!   invariant on every wake-up.

pub mod space;
pub mod space_set;

#[cfg(test)]
mod tests;
