#[cfg(test)]
mod tests {
    use crate::addrs::types::Address;
    use crate::space::space::{Space, SpaceError};
    use crate::space::space_set::SpaceSet;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    // ============================================================
    // SPACE TESTS
    // ============================================================

    #[test]
    fn test_allocate_lowest_first() {
        let mut space = Space::new(addr("10.0.0.1"), 4);
        assert_eq!(space.allocate(), Some(addr("10.0.0.1")));
        assert_eq!(space.allocate(), Some(addr("10.0.0.2")));
        assert_eq!(space.allocate(), Some(addr("10.0.0.3")));
        assert_eq!(space.allocate(), Some(addr("10.0.0.4")));
        assert_eq!(space.allocate(), None);
    }

    #[test]
    fn test_free_then_reallocate() {
        let mut space = Space::new(addr("10.0.0.1"), 4);
        let a = space.allocate().unwrap();
        let _b = space.allocate().unwrap();
        assert_eq!(space.num_free_addresses(), 2);

        space.free(a).unwrap();
        assert_eq!(space.num_free_addresses(), 3);
        // The lowest free address comes back first
        assert_eq!(space.allocate(), Some(a));
    }

    #[test]
    fn test_free_errors() {
        let mut space = Space::new(addr("10.0.0.1"), 4);
        assert_eq!(space.free(addr("10.0.0.9")), Err(SpaceError::OutOfRange));
        assert_eq!(
            space.free(addr("10.0.0.2")),
            Err(SpaceError::AddressNotInUse)
        );
        let a = space.allocate().unwrap();
        space.free(a).unwrap();
        assert_eq!(space.free(a), Err(SpaceError::AddressNotInUse));
    }

    #[test]
    fn test_claim_fills_gap() {
        let mut space = Space::new(addr("10.0.0.1"), 8);
        assert!(space.claim(addr("10.0.0.1")));
        assert!(space.claim(addr("10.0.0.5")));
        assert!(!space.claim(addr("10.0.0.20")));
        assert_eq!(space.num_free_addresses(), 6);
        // Allocation skips the claimed addresses
        assert_eq!(space.allocate(), Some(addr("10.0.0.2")));
    }

    #[test]
    fn test_biggest_free_chunk() {
        let mut space = Space::new(addr("10.0.0.0"), 16);
        assert_eq!(space.biggest_free_chunk(), Some((addr("10.0.0.0"), 16)));

        // Occupy offsets 4 and 5: runs are [0,4), [6,16)
        space.claim(addr("10.0.0.4"));
        space.claim(addr("10.0.0.5"));
        assert_eq!(space.biggest_free_chunk(), Some((addr("10.0.0.6"), 10)));

        // Fill everything
        while space.allocate().is_some() {}
        assert_eq!(space.biggest_free_chunk(), None);
    }

    #[test]
    fn test_split_distributes_in_use() {
        let mut space = Space::new(addr("10.0.0.0"), 8);
        space.claim(addr("10.0.0.1"));
        space.claim(addr("10.0.0.6"));

        let (low, high) = space.split(addr("10.0.0.4"));
        assert_eq!(low.start, addr("10.0.0.0"));
        assert_eq!(low.size, 4);
        assert_eq!(low.num_free_addresses(), 3);
        assert_eq!(high.start, addr("10.0.0.4"));
        assert_eq!(high.size, 4);
        assert_eq!(high.num_free_addresses(), 3);
    }

    #[test]
    fn test_grow() {
        let mut space = Space::new(addr("10.0.0.0"), 4);
        while space.allocate().is_some() {}
        assert_eq!(space.num_free_addresses(), 0);

        space.grow(10);
        assert_eq!(space.num_free_addresses(), 6);
        assert_eq!(space.allocate(), Some(addr("10.0.0.4")));
    }

    // ============================================================
    // SPACE SET TESTS
    // ============================================================

    #[test]
    fn test_set_allocates_across_spaces() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.1"), 2);
        set.add(addr("10.0.0.100"), 2);

        assert_eq!(set.allocate(), Some(addr("10.0.0.1")));
        assert_eq!(set.allocate(), Some(addr("10.0.0.2")));
        // First space exhausted, moves on
        assert_eq!(set.allocate(), Some(addr("10.0.0.100")));
        assert_eq!(set.num_free_addresses(), 1);
    }

    #[test]
    fn test_set_free_and_claim_route_to_containing_space() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.1"), 10);
        set.add(addr("10.0.0.100"), 10);

        set.claim(addr("10.0.0.105")).unwrap();
        assert_eq!(set.num_free_addresses(), 19);
        set.free(addr("10.0.0.105")).unwrap();
        assert_eq!(set.num_free_addresses(), 20);

        assert_eq!(set.claim(addr("10.0.0.50")), Err(SpaceError::NotInRange));
        assert_eq!(set.free(addr("10.0.0.50")), Err(SpaceError::NotInRange));
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_set_rejects_duplicate_start() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.1"), 10);
        set.add(addr("10.0.0.1"), 4);
    }

    // ============================================================
    // DONATION TESTS
    // ============================================================

    #[test]
    fn test_give_up_space_donates_half_right_aligned() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.0"), 100);

        let (start, size) = set.give_up_space().unwrap();
        assert_eq!(size, 50);
        assert_eq!(start, addr("10.0.0.50"));
        assert_eq!(set.num_free_addresses(), 50);
        assert_eq!(set.spaces().len(), 1);
    }

    #[test]
    fn test_give_up_space_never_exceeds_half() {
        for total in [1u32, 2, 3, 7, 100, 101] {
            let mut set = SpaceSet::new();
            set.add(addr("10.0.0.0"), total);
            let (_, size) = set.give_up_space().unwrap();
            assert!(
                size <= (total + 1) / 2,
                "donated {} of {} free addresses",
                size,
                total
            );
            assert!(size >= 1);
        }
    }

    #[test]
    fn test_give_up_space_skips_in_use_addresses() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.0"), 16);
        // Occupy the middle: free runs [0,6) and [10,16)
        for i in 6..10 {
            set.claim(addr("10.0.0.0").add(i)).unwrap();
        }

        let (start, size) = set.give_up_space().unwrap();
        // 12 free in total, cap 6; both runs are 6 long, donation right-aligned
        assert_eq!(size, 6);
        assert!(start == addr("10.0.0.0") || start == addr("10.0.0.10"));
        assert_eq!(set.num_free_addresses(), 6);
    }

    #[test]
    fn test_give_up_space_with_nothing_free() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.0"), 2);
        while set.allocate().is_some() {}
        assert!(set.give_up_space().is_none());
    }

    #[test]
    fn test_give_up_space_splits_around_donation() {
        let mut set = SpaceSet::new();
        set.add(addr("10.0.0.0"), 32);
        // Pin down the first two addresses so the free chunk sits at [2, 32)
        set.claim(addr("10.0.0.0")).unwrap();
        set.claim(addr("10.0.0.1")).unwrap();

        let (start, size) = set.give_up_space().unwrap();
        // 30 free, cap 15, right-aligned: [17, 32)
        assert_eq!(size, 15);
        assert_eq!(start, addr("10.0.0.17"));

        // Left piece [0, 17) survives with its claims intact
        assert_eq!(set.spaces().len(), 1);
        assert_eq!(set.spaces()[0].start, addr("10.0.0.0"));
        assert_eq!(set.spaces()[0].size, 17);
        assert_eq!(set.num_free_addresses(), 15);
    }
}
