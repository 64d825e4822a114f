use crate::addrs::types::{Address, Offset};
use crate::space::space::{Space, SpaceError};
use std::fmt;

/// The sorted, disjoint collection of spaces this peer owns.
#[derive(Debug, Clone, Default)]
pub struct SpaceSet {
    spaces: Vec<Space>,
}

impl SpaceSet {
    pub fn new() -> SpaceSet {
        SpaceSet::default()
    }

    pub fn spaces(&self) -> &[Space] {
        &self.spaces
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    fn assert_invariants(&self) {
        for pair in self.spaces.windows(2) {
            assert!(
                pair[0].end() <= pair[1].start,
                "spaces must be sorted and disjoint"
            );
        }
    }

    pub fn add(&mut self, start: Address, size: Offset) {
        self.add_space(Space::new(start, size));
    }

    pub fn add_space(&mut self, space: Space) {
        let i = self.spaces.partition_point(|s| s.start < space.start);
        assert!(
            i >= self.spaces.len() || self.spaces[i].start != space.start,
            "inserting a space that already exists: {}",
            space.start
        );
        self.spaces.insert(i, space);
        self.assert_invariants();
    }

    /// The space with exactly this start address, if any.
    pub fn get_mut(&mut self, start: Address) -> Option<&mut Space> {
        self.spaces.iter_mut().find(|s| s.start == start)
    }

    pub fn num_free_addresses(&self) -> Offset {
        self.spaces.iter().map(|s| s.num_free_addresses()).sum()
    }

    /// Allocates from the first space with room.
    pub fn allocate(&mut self) -> Option<Address> {
        self.spaces.iter_mut().find_map(|s| s.allocate())
    }

    pub fn free(&mut self, addr: Address) -> Result<(), SpaceError> {
        match self.spaces.iter_mut().find(|s| s.contains(addr)) {
            Some(space) => space.free(addr),
            None => Err(SpaceError::NotInRange),
        }
    }

    pub fn claim(&mut self, addr: Address) -> Result<(), SpaceError> {
        match self.spaces.iter_mut().find(|s| s.contains(addr)) {
            Some(space) => {
                space.claim(addr);
                Ok(())
            }
            None => Err(SpaceError::NotInRange),
        }
    }

    /// Removes everything. Used on shutdown after our ranges are transferred
    /// away.
    pub fn clear(&mut self) {
        self.spaces.clear();
    }

    /// Carves a chunk off our free addresses to donate to another peer.
    ///
    /// Picks the biggest free chunk across all spaces, capped at half of the
    /// total free count (but at least one address). The donation is
    /// right-aligned inside the chunk, the containing space is split around
    /// it and the non-empty remainders are kept.
    pub fn give_up_space(&mut self) -> Option<(Address, Offset)> {
        let total_free = self.num_free_addresses();
        if total_free == 0 {
            return None;
        }

        let (index, chunk_start, chunk_size) = self
            .spaces
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.biggest_free_chunk().map(|(start, size)| (i, start, size)))
            .max_by_key(|&(_, _, size)| size)?;

        let max_donation = (total_free / 2).max(1);
        let (donation_start, donation_size) = if chunk_size > max_donation {
            // Right-align so the donation ends at the chunk's high address
            (chunk_start.add(chunk_size - max_donation), max_donation)
        } else {
            (chunk_start, chunk_size)
        };
        let donation_end = donation_start.add(donation_size);

        let old = self.spaces.remove(index);
        let (low, rest) = old.split(donation_start);
        let (donated, high) = rest.split(donation_end);
        assert!(
            donated.num_free_addresses() == donation_size,
            "donating addresses that are in use"
        );

        if low.size > 0 {
            self.add_space(low);
        }
        if high.size > 0 {
            self.add_space(high);
        }

        tracing::debug!(
            "Giving up {}+{} ({} free remain)",
            donation_start,
            donation_size,
            self.num_free_addresses()
        );
        Some((donation_start, donation_size))
    }
}

impl fmt::Display for SpaceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.spaces.is_empty() {
            return write!(f, "  no owned ranges");
        }
        for space in &self.spaces {
            writeln!(f, "  {}", space)?;
        }
        Ok(())
    }
}
