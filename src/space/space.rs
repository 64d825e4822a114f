use crate::addrs::types::{Address, Offset};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpaceError {
    #[error("address is outside this space")]
    OutOfRange,
    #[error("address is not in use")]
    AddressNotInUse,
    #[error("address is not in any owned range")]
    NotInRange,
}

/// One contiguous owned range and the set of addresses assigned within it.
///
/// `inuse` holds offsets from `start`; the sparse set keeps small subnets and
/// lightly-used large ones cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    pub start: Address,
    pub size: Offset,
    inuse: BTreeSet<Offset>,
}

impl Space {
    pub fn new(start: Address, size: Offset) -> Space {
        Space {
            start,
            size,
            inuse: BTreeSet::new(),
        }
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && Address::subtract(addr, self.start) < self.size
    }

    pub fn end(&self) -> Address {
        self.start.add(self.size)
    }

    pub fn num_free_addresses(&self) -> Offset {
        self.size - self.inuse.len() as Offset
    }

    /// Hands out the lowest free address, or `None` when full.
    pub fn allocate(&mut self) -> Option<Address> {
        let mut candidate: Offset = 0;
        for &used in &self.inuse {
            if used != candidate {
                break;
            }
            candidate += 1;
        }
        if candidate >= self.size {
            return None;
        }
        self.inuse.insert(candidate);
        Some(self.start.add(candidate))
    }

    /// Marks `addr` as in use. Returns whether the address lies inside this
    /// space; an out-of-range address is not an error here, the caller knows
    /// which space should hold it.
    pub fn claim(&mut self, addr: Address) -> bool {
        if !self.contains(addr) {
            return false;
        }
        self.inuse.insert(Address::subtract(addr, self.start));
        true
    }

    pub fn free(&mut self, addr: Address) -> Result<(), SpaceError> {
        if !self.contains(addr) {
            return Err(SpaceError::OutOfRange);
        }
        if !self.inuse.remove(&Address::subtract(addr, self.start)) {
            return Err(SpaceError::AddressNotInUse);
        }
        Ok(())
    }

    /// The longest run of free addresses, as `(start, length)`.
    /// `None` when the space is completely full.
    pub fn biggest_free_chunk(&self) -> Option<(Address, Offset)> {
        let mut best_start: Offset = 0;
        let mut best_len: Offset = 0;
        let mut run_start: Offset = 0;

        for &used in self.inuse.iter().chain(std::iter::once(&self.size)) {
            let len = used - run_start;
            if len > best_len {
                best_start = run_start;
                best_len = len;
            }
            run_start = used + 1;
        }

        if best_len == 0 {
            None
        } else {
            Some((self.start.add(best_start), best_len))
        }
    }

    /// Divides this space at `addr` into `[start, addr)` and
    /// `[addr, start+size)`, distributing the in-use set between the halves.
    pub fn split(&self, addr: Address) -> (Space, Space) {
        assert!(
            self.contains(addr) || addr == self.end(),
            "split point outside space"
        );
        let breakpoint = Address::subtract(addr, self.start);

        let mut low = Space::new(self.start, breakpoint);
        let mut high = Space::new(addr, self.size - breakpoint);
        for &used in &self.inuse {
            if used < breakpoint {
                low.inuse.insert(used);
            } else {
                high.inuse.insert(used - breakpoint);
            }
        }
        (low, high)
    }

    /// Extends the space. Ranges only ever grow; the ring never takes space
    /// back without a donation, which removes the whole chunk instead.
    pub fn grow(&mut self, new_size: Offset) {
        assert!(new_size >= self.size, "spaces never shrink");
        self.size = new_size;
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}+{} ({} free)",
            self.start,
            self.size,
            self.num_free_addresses()
        )
    }
}
