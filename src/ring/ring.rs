use crate::addrs::types::{Address, Offset, Range};
use crate::gossip::types::PeerName;
use crate::ring::entry::{Entries, Entry};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Gossip carrying a timestamp further than this from our own clock is
/// rejected rather than merged.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("ring entries are not sorted")]
    NotSorted,
    #[error("token appears twice in ring")]
    TokenRepeated,
    #[error("token is out of range")]
    TokenOutOfRange,
    #[error("entry advertises more free space than its range holds")]
    TooMuchFreeSpace,
    #[error("cannot merge gossip for a different subnet")]
    DifferentSubnets,
    #[error("received an update to an entry we own")]
    NewerVersion,
    #[error("received conflicting entries with equal versions")]
    InvalidEntry,
    #[error("received a new entry inside a range we own")]
    EntryInMyRange,
    #[error("gossip clock skew exceeds {MAX_CLOCK_SKEW_SECS}s")]
    ClockSkew,
    #[error("no peer advertises free space")]
    NoFreeSpace,
    #[error("undecodable ring gossip: {0}")]
    Decode(String),
}

pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The ring itself: a sorted token sequence over the allocatable interval
/// `[start, end)` of the subnet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ring {
    pub start: Address,
    pub end: Address,
    /// The local peer. Merge rules treat ranges owned by this peer specially.
    pub peer: PeerName,
    pub entries: Entries,
    /// Wall-clock seconds, refreshed on encode; used only for skew rejection.
    pub now: i64,
}

impl Ring {
    /// Creates an empty ring covering `[start, end)`, owned-view of `peer`.
    pub fn new(start: Address, end: Address, peer: PeerName) -> Ring {
        assert!(start < end, "ring start must precede end");
        Ring {
            start,
            end,
            peer,
            entries: Entries::default(),
            now: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distance from `a` to `b` going clockwise, wrapping past `end` back to
    /// `start`.
    pub fn distance(&self, a: Address, b: Address) -> Offset {
        if b > a {
            Address::subtract(b, a)
        } else {
            Address::subtract(self.end, a) + Address::subtract(b, self.start)
        }
    }

    pub fn assert_invariants(&self) {
        if let Err(e) = self.check_invariants() {
            panic!("ring invariant violated: {}", e);
        }
    }

    pub fn check_invariants(&self) -> Result<(), RingError> {
        let es = &self.entries.0;
        for pair in es.windows(2) {
            if pair[0].token > pair[1].token {
                return Err(RingError::NotSorted);
            }
            if pair[0].token == pair[1].token {
                return Err(RingError::TokenRepeated);
            }
        }

        if es.is_empty() {
            return Ok(());
        }

        if es[0].token < self.start || es[es.len() - 1].token >= self.end {
            return Err(RingError::TokenOutOfRange);
        }

        for (i, e) in es.iter().enumerate() {
            let next = self.entries.entry(i as isize + 1);
            if e.free > self.distance(e.token, next.token) {
                return Err(RingError::TooMuchFreeSpace);
            }
        }

        Ok(())
    }

    /// Merges a gossiped ring into this one. On error the local ring is left
    /// untouched and the gossip should be dropped.
    pub fn merge(&mut self, gossip: Ring) -> Result<(), RingError> {
        self.assert_invariants();

        gossip.check_invariants()?;
        if self.start != gossip.start || self.end != gossip.end {
            return Err(RingError::DifferentSubnets);
        }
        if (now_secs() - gossip.now).abs() > MAX_CLOCK_SKEW_SECS {
            return Err(RingError::ClockSkew);
        }

        let mine = &self.entries.0;
        let theirs = &gossip.entries.0;
        let mut result: Vec<Entry> = Vec::with_capacity(mine.len().max(theirs.len()));
        // Owner of the range the merge cursor is currently inside, reset when
        // a remote-only entry is taken (we no longer know what preceded it
        // from our side).
        let mut previous_owner: Option<&PeerName> = None;

        let (mut i, mut j) = (0, 0);
        while i < mine.len() && j < theirs.len() {
            let m = &mine[i];
            let t = &theirs[j];
            if m.token < t.token {
                result.push(m.clone());
                previous_owner = Some(&m.peer);
                i += 1;
            } else if m.token > t.token {
                // A token we have never seen; it may not split a range we own
                if previous_owner == Some(&self.peer) && t.peer != self.peer {
                    return Err(RingError::EntryInMyRange);
                }
                result.push(t.clone());
                previous_owner = None;
                j += 1;
            } else {
                if m.version >= t.version {
                    if m.version == t.version && m != t {
                        return Err(RingError::InvalidEntry);
                    }
                    result.push(m.clone());
                    previous_owner = Some(&m.peer);
                } else {
                    // Nobody else may advance tokens we own
                    if m.peer == self.peer {
                        return Err(RingError::NewerVersion);
                    }
                    result.push(t.clone());
                    previous_owner = None;
                }
                i += 1;
                j += 1;
            }
        }

        while i < mine.len() {
            result.push(mine[i].clone());
            i += 1;
        }
        while j < theirs.len() {
            let t = &theirs[j];
            if previous_owner == Some(&self.peer) && t.peer != self.peer {
                return Err(RingError::EntryInMyRange);
            }
            result.push(t.clone());
            previous_owner = None;
            j += 1;
        }

        self.entries = Entries(result);
        self.assert_invariants();
        Ok(())
    }

    /// Decodes and merges gossiped ring state.
    pub fn update(&mut self, msg: &[u8]) -> Result<(), RingError> {
        let gossip: Ring = bincode::deserialize(msg).map_err(|e| RingError::Decode(e.to_string()))?;
        self.merge(gossip)
    }

    /// Encodes the ring for gossip, stamping the current wall-clock time.
    pub fn gossip_state(&self) -> Vec<u8> {
        let mut snapshot = self.clone();
        snapshot.now = now_secs();
        bincode::serialize(&snapshot).expect("ring state is always encodable")
    }

    /// Index of the rightmost entry with `token <= target`, wrapping to the
    /// last entry when every token is greater.
    fn preceding_index(&self, target: Address) -> usize {
        let i = self.entries.0.partition_point(|e| e.token <= target);
        if i == 0 {
            self.entries.len() - 1
        } else {
            i - 1
        }
    }

    /// The peer owning the range containing `addr`.
    pub fn owner(&self, addr: Address) -> PeerName {
        assert!(!self.is_empty(), "ownership query on an empty ring");
        self.entries.0[self.preceding_index(addr)].peer.clone()
    }

    /// Assigns `[start, end)` to `peer`. The caller must currently own the
    /// whole range; violations are programmer errors and panic.
    pub fn grant_range(&mut self, start: Address, end: Address, peer: PeerName) {
        self.assert_invariants();

        assert!(start < end, "cannot grant an empty or inverted range");
        assert!(
            self.start <= start && end <= self.end,
            "granting a range outside the ring"
        );
        assert!(!self.is_empty(), "cannot grant on an empty ring");

        let range_size = self.distance(start, end);
        let preceding = &self.entries.0[self.preceding_index(start)];
        assert!(
            preceding.peer == self.peer,
            "granting a range we do not own (owner {})",
            preceding.peer
        );

        // There is never a token at self.end; a grant running to the end of
        // the ring is delimited by a token at the origin instead.
        let expected_next = if end == self.end { self.start } else { end };

        // Token at the start of the grant: update in place or insert.
        if let Some(i) = self.entries.get(start) {
            let next_token = self.entries.entry(i as isize + 1).token;
            let cap = self.distance(start, next_token);
            let e = &mut self.entries.0[i];
            assert!(e.peer == self.peer, "granting a token we do not own");
            e.peer = peer.clone();
            e.version += 1;
            e.free = range_size.min(cap);
        } else {
            let i = self.entries.insertion_point(start);
            let next_token = self.entries.entry(i as isize).token;
            let cap = self.distance(start, next_token);
            self.entries.insert(Entry {
                token: start,
                peer: peer.clone(),
                version: 0,
                free: range_size.min(cap),
            });
            // The preceding entry's range just shrank
            let prev_idx = self.preceding_index(start) as isize - 1;
            let prev_token = self.entries.entry(prev_idx).token;
            let free = self.distance(prev_token, start);
            let n = self.entries.len() as isize;
            let prev = &mut self.entries.0[(((prev_idx % n) + n) % n) as usize];
            prev.free = free;
            prev.version += 1;
        }

        // Hand over any of our tokens strictly inside the granted range.
        let transfers: Vec<usize> = self
            .entries
            .0
            .iter()
            .enumerate()
            .filter(|(_, e)| e.token > start && e.token < end && e.token != expected_next)
            .map(|(i, _)| i)
            .collect();
        for i in transfers {
            let e = &mut self.entries.0[i];
            assert!(e.peer == self.peer, "grant range spans a foreign token");
            e.peer = peer.clone();
            e.version += 1;
        }

        // Make sure the addresses past the grant remain ours.
        if self.entries.get(expected_next).is_none() {
            let i = self.entries.insertion_point(expected_next);
            let next_token = self.entries.entry(i as isize).token;
            let free = self.distance(expected_next, next_token);
            self.entries.insert(Entry {
                token: expected_next,
                peer: self.peer.clone(),
                version: 0,
                free,
            });
        }

        self.assert_invariants();
    }

    /// The ranges a given peer owns, in address order, with any range that
    /// wraps the origin split in two.
    fn ranges_owned_by(&self, peer: &PeerName) -> Vec<Range> {
        let mut result = Vec::new();
        for (i, e) in self.entries.iter().enumerate() {
            if &e.peer != peer {
                continue;
            }
            let next = self.entries.entry(i as isize + 1);
            if next.token == self.start {
                // Last range on the ring, running to the end
                result.push(Range::new(e.token, self.end));
            } else if next.token <= e.token {
                // Wraps the origin: split, keeping the result sorted
                result.insert(0, Range::new(self.start, next.token));
                result.push(Range::new(e.token, self.end));
            } else {
                result.push(Range::new(e.token, next.token));
            }
        }
        result
    }

    /// The ranges we own, ordered, wrap-split at the origin.
    pub fn owned_ranges(&self) -> Vec<Range> {
        self.ranges_owned_by(&self.peer)
    }

    /// Claims the entire ring for ourselves. Only valid on an empty ring.
    pub fn claim_it_all(&mut self) {
        assert!(self.is_empty(), "cannot bootstrap a ring with entries in it");
        let free = Address::subtract(self.end, self.start);
        self.entries.insert(Entry {
            token: self.start,
            peer: self.peer.clone(),
            version: 0,
            free,
        });
        self.assert_invariants();
    }

    /// Divides the empty ring into equal shares for `peers` (sorted,
    /// deduplicated). Deterministic: every node observing the same peer set
    /// produces an identical ring. The remainder goes to the first peers.
    pub fn claim_for_peers(&mut self, peers: &[PeerName]) {
        assert!(self.is_empty(), "cannot bootstrap a ring with entries in it");
        assert!(!peers.is_empty(), "cannot divide a ring among no peers");

        let total = Address::subtract(self.end, self.start);
        let share = total / peers.len() as u32;
        let remainder = total % peers.len() as u32;
        let mut pos = self.start;

        for (i, peer) in peers.iter().enumerate() {
            let size = share + if (i as u32) < remainder { 1 } else { 0 };
            if size == 0 {
                // More peers than addresses; latecomers ask for space instead
                break;
            }
            self.entries.insert(Entry {
                token: pos,
                peer: peer.clone(),
                version: 0,
                free: size,
            });
            pos = pos.add(size);
        }

        self.assert_invariants();
    }

    /// Updates the advertised free count on the entries we own. No version
    /// bump when the value is unchanged, so repeated reports are no-ops.
    pub fn report_free(&mut self, frees: &BTreeMap<Address, Offset>) {
        let n = self.entries.len();
        for i in 0..n {
            let (token, owned) = {
                let e = &self.entries.0[i];
                (e.token, e.peer == self.peer)
            };
            if !owned {
                continue;
            }
            let Some(&free) = frees.get(&token) else {
                continue;
            };
            let next = self.entries.entry(i as isize + 1).token;
            let capped = free.min(self.distance(token, next));
            let e = &mut self.entries.0[i];
            if e.free != capped {
                e.free = capped;
                e.version += 1;
            }
        }
    }

    /// Picks a peer to ask for space, weighted by advertised free counts.
    pub fn choose_peer_to_ask_for_space(&self) -> Result<PeerName, RingError> {
        let mut total: u64 = 0;
        let mut per_peer: BTreeMap<&PeerName, u64> = BTreeMap::new();

        for e in self.entries.iter() {
            if e.free == 0 || e.peer == self.peer {
                continue;
            }
            *per_peer.entry(&e.peer).or_insert(0) += u64::from(e.free);
            total += u64::from(e.free);
        }

        if total == 0 {
            return Err(RingError::NoFreeSpace);
        }

        let mut rn = rand::thread_rng().gen_range(0..total) as i64;
        for (peer, weight) in &per_peer {
            rn -= *weight as i64;
            if rn < 0 {
                return Ok((*peer).clone());
            }
        }
        unreachable!("weighted choice fell off the end");
    }

    /// Re-owns every entry of `from` to `to`, bumping versions. Returns the
    /// ranges that changed hands so the caller can grow its spaces.
    pub fn transfer(&mut self, from: &PeerName, to: &PeerName) -> Vec<Range> {
        let acquired = self.ranges_owned_by(from);
        for e in self.entries.iter_mut() {
            if &e.peer == from {
                e.peer = to.clone();
                e.version += 1;
            }
        }
        self.assert_invariants();
        acquired
    }

    /// Every peer that owns at least one entry, ourselves included.
    pub fn peers(&self) -> Vec<PeerName> {
        let mut peers: Vec<PeerName> = self.entries.iter().map(|e| e.peer.clone()).collect();
        peers.sort();
        peers.dedup();
        peers
    }

    /// Free addresses per owning peer, as advertised.
    pub fn free_by_peer(&self) -> BTreeMap<PeerName, u64> {
        let mut result = BTreeMap::new();
        for e in self.entries.iter() {
            *result.entry(e.peer.clone()).or_insert(0) += u64::from(e.free);
        }
        result
    }
}

impl fmt::Display for Ring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ring [{}, {})", self.start, self.end)?;
        write!(f, "{}", self.entries)
    }
}
