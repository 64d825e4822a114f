//! Address Arithmetic Module
//!
//! Represents IPv4 addresses as 32-bit integers and provides the range
//! arithmetic the rest of the system is built on.
//!
//! ## Core Concepts
//! - **Address/Offset**: an address is a `u32`; an offset is a `u32` difference
//!   between two addresses. Addition only ever happens inside the subnet, so
//!   plain integer arithmetic is safe.
//! - **Subnet**: parsed from CIDR (`a.b.c.d/n`) into a half-open interval
//!   `[start, end)`. The network and broadcast addresses (RFC 1122) are
//!   reserved and never handed out.

pub mod types;
