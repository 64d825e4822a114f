#[cfg(test)]
mod tests {
    use crate::addrs::types::{Address, Subnet};
    use crate::gossip::types::PeerName;
    use crate::ring::entry::{Entries, Entry};
    use crate::ring::ring::{now_secs, Ring, RingError};
    use std::collections::BTreeMap;

    fn peer(name: &str) -> PeerName {
        PeerName(name.to_string())
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn test_ring(name: &str) -> Ring {
        // 10.0.0.0/24 -> ring interval [10.0.0.1, 10.0.0.255)
        let subnet = Subnet::parse("10.0.0.0/24").unwrap();
        let range = subnet.ring_range();
        let mut ring = Ring::new(range.start, range.end, peer(name));
        ring.now = now_secs();
        ring
    }

    // Simulates receiving the other ring over gossip
    fn merge_from(dst: &mut Ring, src: &Ring) -> Result<(), RingError> {
        dst.update(&src.gossip_state())
    }

    // ============================================================
    // CLAIM / OWNED RANGES
    // ============================================================

    #[test]
    fn test_claim_it_all() {
        let mut ring = test_ring("a");
        ring.claim_it_all();

        let ranges = ring.owned_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start, addr("10.0.0.1"));
        assert_eq!(ranges[0].end, addr("10.0.0.255"));
        assert_eq!(ranges[0].size(), 254);
    }

    #[test]
    fn test_owner_lookup() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));

        assert_eq!(ring.owner(addr("10.0.0.1")), peer("a"));
        assert_eq!(ring.owner(addr("10.0.0.127")), peer("a"));
        assert_eq!(ring.owner(addr("10.0.0.128")), peer("b"));
        assert_eq!(ring.owner(addr("10.0.0.254")), peer("b"));
    }

    #[test]
    fn test_owned_ranges_split_wrapping_range() {
        let mut ring = test_ring("a");
        // b owns [64, 128); a owns [128, end) wrapping to [start, 64)
        ring.entries = Entries(vec![
            Entry {
                token: addr("10.0.0.64"),
                peer: peer("b"),
                version: 0,
                free: 64,
            },
            Entry {
                token: addr("10.0.0.128"),
                peer: peer("a"),
                version: 0,
                free: 100,
            },
        ]);
        ring.assert_invariants();

        let ranges = ring.owned_ranges();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start, addr("10.0.0.1"));
        assert_eq!(ranges[0].end, addr("10.0.0.64"));
        assert_eq!(ranges[1].start, addr("10.0.0.128"));
        assert_eq!(ranges[1].end, addr("10.0.0.255"));
    }

    // ============================================================
    // GRANT
    // ============================================================

    #[test]
    fn test_grant_splits_our_range() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));

        // Our entry shrank, a new entry for b appeared
        assert_eq!(ring.entries.len(), 2);
        assert_eq!(ring.owner(addr("10.0.0.127")), peer("a"));
        assert_eq!(ring.owner(addr("10.0.0.128")), peer("b"));

        let ours = ring.owned_ranges();
        assert_eq!(ours.len(), 1);
        assert_eq!(ours[0].size(), 127);
    }

    #[test]
    fn test_grant_in_middle_keeps_tail() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.64"), addr("10.0.0.128"), peer("b"));

        // Tokens at .1 (ours), .64 (b), .128 (ours again)
        assert_eq!(ring.entries.len(), 3);
        assert_eq!(ring.owner(addr("10.0.0.63")), peer("a"));
        assert_eq!(ring.owner(addr("10.0.0.64")), peer("b"));
        assert_eq!(ring.owner(addr("10.0.0.127")), peer("b"));
        assert_eq!(ring.owner(addr("10.0.0.128")), peer("a"));

        let ours = ring.owned_ranges();
        assert_eq!(ours.len(), 2);
    }

    #[test]
    fn test_grant_whole_range_updates_in_place() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));
        // Now grant b's exact range onward to c, from b's point of view
        let mut ring_b = test_ring("b");
        merge_from(&mut ring_b, &ring).unwrap();
        ring_b.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("c"));

        assert_eq!(ring_b.owner(addr("10.0.0.200")), peer("c"));
        // In-place update must bump the version
        let i = ring_b.entries.get(addr("10.0.0.128")).unwrap();
        assert_eq!(ring_b.entries.0[i].version, 1);
    }

    #[test]
    #[should_panic(expected = "granting a range we do not own")]
    fn test_grant_foreign_range_panics() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));
        ring.grant_range(addr("10.0.0.130"), addr("10.0.0.140"), peer("c"));
    }

    // ============================================================
    // MERGE
    // ============================================================

    #[test]
    fn test_merge_empty_into_claimed() {
        let ring_a = {
            let mut r = test_ring("a");
            r.claim_it_all();
            r
        };
        let mut ring_b = test_ring("b");
        merge_from(&mut ring_b, &ring_a).unwrap();
        assert_eq!(ring_b.entries, ring_a.entries);
        assert!(ring_b.owned_ranges().is_empty());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.100"), addr("10.0.0.200"), peer("b"));

        let before = ring.entries.clone();
        let state = ring.gossip_state();
        ring.update(&state).unwrap();
        assert_eq!(ring.entries, before);
    }

    #[test]
    fn test_merge_different_subnets_rejected() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        let other_subnet = Subnet::parse("10.9.0.0/24").unwrap().ring_range();
        let mut other = Ring::new(other_subnet.start, other_subnet.end, peer("b"));
        other.claim_it_all();

        assert_eq!(merge_from(&mut ring, &other), Err(RingError::DifferentSubnets));
    }

    #[test]
    fn test_merge_rejects_stale_clock() {
        let mut ring = test_ring("a");
        let mut stale = test_ring("b");
        stale.claim_it_all();
        stale.now = now_secs() - 2 * 60 * 60;
        // Bypass gossip_state, which would re-stamp the clock
        let msg = bincode::serialize(&stale).unwrap();
        assert_eq!(ring.update(&msg), Err(RingError::ClockSkew));
    }

    #[test]
    fn test_merge_equal_version_conflict_is_invalid() {
        let mut ring_a = test_ring("a");
        ring_a.claim_it_all();
        let mut ring_b = test_ring("b");
        merge_from(&mut ring_b, &ring_a).unwrap();

        // Same token, same version, different free count
        let mut forged = ring_b.clone();
        let i = forged.entries.get(addr("10.0.0.1")).unwrap();
        forged.entries.0[i].free -= 1;

        assert_eq!(merge_from(&mut ring_b, &forged), Err(RingError::InvalidEntry));
    }

    #[test]
    fn test_merge_rejects_update_to_our_token() {
        let mut ring_a = test_ring("a");
        ring_a.claim_it_all();

        // Someone claims to have a newer version of a's entry
        let mut forged = ring_a.clone();
        forged.peer = peer("b");
        let i = forged.entries.get(addr("10.0.0.1")).unwrap();
        forged.entries.0[i].version += 1;
        forged.entries.0[i].free -= 1;

        assert_eq!(merge_from(&mut ring_a, &forged), Err(RingError::NewerVersion));
    }

    #[test]
    fn test_merge_rejects_entry_inside_our_range() {
        let mut ring_a = test_ring("a");
        ring_a.claim_it_all();
        let mut frees = BTreeMap::new();
        frees.insert(addr("10.0.0.1"), 90u32);
        ring_a.report_free(&frees);

        // b fabricates a token in the middle of a's range
        let mut forged = ring_a.clone();
        forged.peer = peer("b");
        forged.entries.insert(Entry {
            token: addr("10.0.0.100"),
            peer: peer("b"),
            version: 0,
            free: 10,
        });

        assert_eq!(merge_from(&mut ring_a, &forged), Err(RingError::EntryInMyRange));
    }

    #[test]
    fn test_merge_converges_under_churn() {
        // a claims all, grants [128, end) to b; b grants [192, end) to c;
        // a concurrently grants [64, 128) to c. All orders converge.
        let mut ring_a = test_ring("a");
        ring_a.claim_it_all();
        ring_a.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));

        let mut ring_b = test_ring("b");
        merge_from(&mut ring_b, &ring_a).unwrap();
        ring_b.grant_range(addr("10.0.0.192"), addr("10.0.0.255"), peer("c"));

        let mut ring_c = test_ring("c");
        ring_a.grant_range(addr("10.0.0.64"), addr("10.0.0.128"), peer("c"));

        // Deliver updates in a different order to every peer
        merge_from(&mut ring_c, &ring_b).unwrap();
        merge_from(&mut ring_c, &ring_a).unwrap();
        merge_from(&mut ring_a, &ring_b).unwrap();
        merge_from(&mut ring_b, &ring_a).unwrap();
        merge_from(&mut ring_b, &ring_c).unwrap();
        merge_from(&mut ring_a, &ring_c).unwrap();

        assert_eq!(ring_a.entries, ring_b.entries);
        assert_eq!(ring_b.entries, ring_c.entries);

        // Disjoint ownership covering the whole interval
        let mut all: Vec<_> = ring_a.owned_ranges();
        all.extend(ring_b.owned_ranges());
        all.extend(ring_c.owned_ranges());
        all.sort_by_key(|r| r.start);
        let mut pos = ring_a.start;
        for r in &all {
            assert_eq!(r.start, pos, "ranges must tile the ring without gaps");
            pos = r.end;
        }
        assert_eq!(pos, ring_a.end);
    }

    // ============================================================
    // FREE SPACE / DONOR SELECTION
    // ============================================================

    #[test]
    fn test_report_free_is_idempotent() {
        let mut ring = test_ring("a");
        ring.claim_it_all();

        let mut frees = BTreeMap::new();
        frees.insert(addr("10.0.0.1"), 100u32);
        ring.report_free(&frees);

        let i = ring.entries.get(addr("10.0.0.1")).unwrap();
        let version = ring.entries.0[i].version;
        assert_eq!(ring.entries.0[i].free, 100);

        // Same value again: no version bump
        ring.report_free(&frees);
        assert_eq!(ring.entries.0[i].version, version);

        // New value: bumped
        frees.insert(addr("10.0.0.1"), 90u32);
        ring.report_free(&frees);
        assert_eq!(ring.entries.0[i].version, version + 1);
    }

    #[test]
    fn test_choose_peer_ignores_self_and_empty() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        assert_eq!(
            ring.choose_peer_to_ask_for_space(),
            Err(RingError::NoFreeSpace)
        );

        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));
        // Only b is a candidate, whatever the weights
        for _ in 0..10 {
            assert_eq!(ring.choose_peer_to_ask_for_space().unwrap(), peer("b"));
        }
    }

    #[test]
    fn test_choose_peer_skips_peers_with_no_free_space() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.192"), peer("b"));
        ring.grant_range(addr("10.0.0.192"), addr("10.0.0.255"), peer("c"));

        let mut ring_b = test_ring("b");
        merge_from(&mut ring_b, &ring).unwrap();
        let mut frees = BTreeMap::new();
        frees.insert(addr("10.0.0.128"), 0u32);
        ring_b.report_free(&frees);
        merge_from(&mut ring, &ring_b).unwrap();

        for _ in 0..10 {
            assert_eq!(ring.choose_peer_to_ask_for_space().unwrap(), peer("c"));
        }
    }

    // ============================================================
    // TRANSFER
    // ============================================================

    #[test]
    fn test_transfer_reowns_and_returns_ranges() {
        let mut ring = test_ring("a");
        ring.claim_it_all();
        ring.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));

        let acquired = ring.transfer(&peer("b"), &peer("a"));
        assert_eq!(acquired.len(), 1);
        assert_eq!(acquired[0].start, addr("10.0.0.128"));
        assert_eq!(acquired[0].end, addr("10.0.0.255"));

        assert_eq!(ring.owned_ranges().len(), 2);
        assert_eq!(ring.peers(), vec![peer("a")]);
    }

    #[test]
    fn test_transfer_bumps_versions_so_merge_propagates() {
        let mut ring_a = test_ring("a");
        ring_a.claim_it_all();
        ring_a.grant_range(addr("10.0.0.128"), addr("10.0.0.255"), peer("b"));

        let mut ring_c = test_ring("c");
        merge_from(&mut ring_c, &ring_a).unwrap();

        ring_a.transfer(&peer("b"), &peer("a"));
        merge_from(&mut ring_c, &ring_a).unwrap();
        assert_eq!(ring_c.owner(addr("10.0.0.200")), peer("a"));
    }

    // ============================================================
    // DIVISION AMONG PEERS
    // ============================================================

    #[test]
    fn test_claim_for_peers_is_deterministic_and_covers_ring() {
        let peers = vec![peer("a"), peer("b"), peer("c")];
        let mut ring1 = test_ring("a");
        let mut ring2 = test_ring("b");
        ring1.claim_for_peers(&peers);
        ring2.claim_for_peers(&peers);

        assert_eq!(ring1.entries, ring2.entries);
        assert_eq!(ring1.entries.len(), 3);

        // 254 addresses over 3 peers: shares 85, 85, 84
        let sizes: Vec<u32> = (0..3)
            .map(|i| {
                let e = ring1.entries.entry(i);
                ring1.distance(e.token, ring1.entries.entry(i + 1).token)
            })
            .collect();
        assert_eq!(sizes, vec![85, 85, 84]);
    }
}
