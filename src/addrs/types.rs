use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The Space bookkeeping indexes offsets within a range, so a subnet may not
/// span more than half the IPv4 address space.
pub const MAX_SUBNET_SIZE: u64 = 1 << 31;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubnetError {
    #[error("invalid subnet: {0}")]
    InvalidSubnet(String),
    #[error("subnet too small: must contain at least 4 addresses")]
    SubnetTooSmall,
    #[error("subnet too large: must contain at most 2^31 addresses")]
    SubnetTooLarge,
    #[error("IPv6 subnets are not supported")]
    Ipv6NotSupported,
}

/// A single IPv4 address, stored as its 32-bit integer value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Address(pub u32);

/// A difference between two addresses.
pub type Offset = u32;

impl Address {
    pub fn add(self, offset: Offset) -> Address {
        Address(self.0 + offset)
    }

    /// `b - a`. Callers must ensure `b >= a`; ring-wrapping differences go
    /// through `Ring::distance` instead.
    pub fn subtract(b: Address, a: Address) -> Offset {
        assert!(b >= a, "subtract under flow: {} < {}", b, a);
        b.0 - a.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{}.{}.{}.{}",
            (v >> 24) & 0xff,
            (v >> 16) & 0xff,
            (v >> 8) & 0xff,
            v & 0xff
        )
    }
}

impl FromStr for Address {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(':') {
            return Err(SubnetError::Ipv6NotSupported);
        }
        let octets: Vec<&str> = s.split('.').collect();
        if octets.len() != 4 {
            return Err(SubnetError::InvalidSubnet(s.to_string()));
        }
        let mut value: u32 = 0;
        for octet in octets {
            let b: u8 = octet
                .parse()
                .map_err(|_| SubnetError::InvalidSubnet(s.to_string()))?;
            value = (value << 8) | u32::from(b);
        }
        Ok(Address(value))
    }
}

/// A half-open interval `[start, end)` of contiguous addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Address,
    pub end: Address,
}

impl Range {
    pub fn new(start: Address, end: Address) -> Range {
        Range { start, end }
    }

    pub fn size(&self) -> Offset {
        Address::subtract(self.end, self.start)
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// The managed subnet, `[start, end)` with the prefix length kept around so
/// allocation results can be rendered in CIDR form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub start: Address,
    pub end: Address,
    pub prefix_len: u8,
}

impl Subnet {
    /// Parses `a.b.c.d/n`. Rejects malformed input, IPv6, subnets with fewer
    /// than 4 addresses and subnets the Space bookkeeping cannot index.
    pub fn parse(cidr: &str) -> Result<Subnet, SubnetError> {
        let (addr_part, len_part) = cidr
            .split_once('/')
            .ok_or_else(|| SubnetError::InvalidSubnet(cidr.to_string()))?;
        let addr: Address = addr_part.parse()?;
        let prefix_len: u8 = len_part
            .parse()
            .map_err(|_| SubnetError::InvalidSubnet(cidr.to_string()))?;
        if prefix_len > 32 {
            return Err(SubnetError::InvalidSubnet(cidr.to_string()));
        }

        let size: u64 = 1u64 << (32 - prefix_len);
        if size < 4 {
            return Err(SubnetError::SubnetTooSmall);
        }
        if size > MAX_SUBNET_SIZE {
            return Err(SubnetError::SubnetTooLarge);
        }

        // Mask off host bits so "10.0.3.7/30" and "10.0.3.4/30" name the same subnet
        let mask: u32 = !((size - 1) as u32);
        let start = Address(addr.0 & mask);
        // The range arithmetic relies on end > start, so the subnet may not
        // butt up against the top of the address space
        let end = start
            .0
            .checked_add(size as u32)
            .ok_or_else(|| SubnetError::InvalidSubnet(cidr.to_string()))?;
        Ok(Subnet {
            start,
            end: Address(end),
            prefix_len,
        })
    }

    pub fn size(&self) -> Offset {
        Address::subtract(self.end, self.start)
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.start <= addr && addr < self.end
    }

    /// The allocatable interval: everything except the reserved network and
    /// broadcast addresses.
    pub fn ring_range(&self) -> Range {
        Range::new(self.start.add(1), Address(self.end.0 - 1))
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.start, self.prefix_len)
    }
}
