use crate::addrs::types::{Address, Subnet};
use crate::allocator::pending::{AllocateOp, ClaimOp};
use crate::allocator::protocol::{
    encode_message, split_message, MSG_LEADER_ELECTED, MSG_PAXOS, MSG_RING_UPDATE,
    MSG_SPACE_REQUEST,
};
use crate::allocator::types::AllocError;
use crate::gossip::types::{Directory, Gossip, PeerName};
use crate::paxos;
use crate::ring::ring::{Ring, RingError};
use crate::space::space_set::SpaceSet;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;

/// A point-in-time view of the allocator, for the status surface and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub free_addresses: u32,
    pub owned_containers: usize,
    pub ring_entries: usize,
    pub pending_allocates: usize,
    pub pending_claims: usize,
}

/// All allocator state. Only ever touched from the actor loop.
pub struct Allocator {
    pub our_name: PeerName,
    pub subnet: Subnet,
    pub ring: Ring,
    pub space_set: SpaceSet,
    /// Which container owns which address. One address per container.
    pub owned: HashMap<String, Address>,
    pub pending_allocates: VecDeque<AllocateOp>,
    pub pending_claims: VecDeque<ClaimOp>,
    paxos: Option<paxos::node::Node>,
    quorum: u32,
    gossip: Arc<dyn Gossip>,
    directory: Arc<dyn Directory>,
    pub shutting_down: bool,
}

impl Allocator {
    pub fn new(
        our_name: PeerName,
        subnet: Subnet,
        quorum: u32,
        gossip: Arc<dyn Gossip>,
        directory: Arc<dyn Directory>,
    ) -> Allocator {
        let range = subnet.ring_range();
        Allocator {
            ring: Ring::new(range.start, range.end, our_name.clone()),
            our_name,
            subnet,
            space_set: SpaceSet::new(),
            owned: HashMap::new(),
            pending_allocates: VecDeque::new(),
            pending_claims: VecDeque::new(),
            paxos: None,
            quorum: quorum.max(1),
            gossip,
            directory,
            shutting_down: false,
        }
    }

    // --- Bootstrap ---

    /// Kicks off the Paxos round the first time an operation needs an owned
    /// ring. A single node with quorum 1 decides immediately.
    pub fn elect_leader_if_necessary(&mut self) {
        if !self.ring.is_empty() || self.paxos.is_some() {
            return;
        }
        tracing::info!("Ring is empty; starting consensus (quorum {})", self.quorum);
        let mut node = paxos::node::Node::new(self.our_name.clone(), self.quorum);
        node.propose();
        node.think();
        self.paxos = Some(node);
        self.broadcast_paxos();
        self.consider_paxos();
    }

    fn broadcast_paxos(&self) {
        let Some(node) = &self.paxos else { return };
        match bincode::serialize(node.gossip_state()) {
            Ok(body) => self.gossip.broadcast(encode_message(MSG_PAXOS, &body)),
            Err(e) => tracing::error!("Failed to serialize consensus state: {}", e),
        }
    }

    fn handle_paxos(&mut self, body: &[u8]) -> Result<(), RingError> {
        if !self.ring.is_empty() {
            // Consensus already happened; the sender will learn the ring
            // from our broadcasts instead
            return Ok(());
        }
        let state: paxos::node::GossipState =
            bincode::deserialize(body).map_err(|e| RingError::Decode(e.to_string()))?;

        let node = self
            .paxos
            .get_or_insert_with(|| paxos::node::Node::new(self.our_name.clone(), self.quorum));
        let learned = node.update(&state);
        let changed = node.think();
        if learned || changed {
            self.broadcast_paxos();
        }
        self.consider_paxos();
        Ok(())
    }

    /// Seeds the ring once consensus is reached. The lowest-named peer of the
    /// agreed set performs the division; everyone else waits for its ring.
    fn consider_paxos(&mut self) {
        if !self.ring.is_empty() {
            return;
        }
        let Some(value) = self.paxos.as_ref().and_then(|n| n.consensus()) else {
            return;
        };
        let peers: Vec<PeerName> = value.into_iter().collect();
        let Some(winner) = peers.first() else { return };

        if winner != &self.our_name {
            tracing::info!("Consensus reached; waiting for {:?} to seed the ring", winner);
            return;
        }

        tracing::info!("Consensus reached; seeding ring across {} peers", peers.len());
        self.ring.claim_for_peers(&peers);
        self.consider_new_spaces();
        self.broadcast_ring();
    }

    // --- Gossip plumbing ---

    /// Our current state for gossip: the ring once it exists, the Paxos
    /// state while we are still bootstrapping.
    pub fn encode_state(&self) -> Vec<u8> {
        if self.ring.is_empty() {
            if let Some(node) = &self.paxos {
                if let Ok(body) = bincode::serialize(node.gossip_state()) {
                    return encode_message(MSG_PAXOS, &body);
                }
            }
        }
        encode_message(MSG_RING_UPDATE, &self.ring.gossip_state())
    }

    pub fn broadcast_ring(&self) {
        self.gossip
            .broadcast(encode_message(MSG_RING_UPDATE, &self.ring.gossip_state()));
    }

    fn unicast_ring(&self, dst: &PeerName, tag: u8) {
        self.gossip
            .unicast(dst, encode_message(tag, &self.ring.gossip_state()));
    }

    pub fn send_space_request(&self, donor: &PeerName) {
        self.unicast_ring(donor, MSG_SPACE_REQUEST);
    }

    fn update_ring(&mut self, body: &[u8]) -> Result<(), RingError> {
        self.ring.update(body)?;
        self.consider_new_spaces();
        Ok(())
    }

    /// Tag-dispatched handler for broadcast payloads.
    pub fn on_broadcast(&mut self, msg: &[u8]) -> Result<(), RingError> {
        let (tag, body) = split_message(msg)?;
        match tag {
            MSG_PAXOS => self.handle_paxos(body),
            MSG_RING_UPDATE => self.update_ring(body),
            other => Err(RingError::Decode(format!(
                "unexpected broadcast tag {}",
                other
            ))),
        }
    }

    /// Tag-dispatched handler for unicast payloads.
    pub fn on_unicast(&mut self, sender: &PeerName, msg: &[u8]) -> Result<(), RingError> {
        let (tag, body) = split_message(msg)?;
        match tag {
            MSG_SPACE_REQUEST => {
                self.update_ring(body)?;
                self.donate_space(sender);
                Ok(())
            }
            MSG_LEADER_ELECTED => {
                // A peer running the simpler highest-name election chose us
                self.update_ring(body)?;
                if self.ring.is_empty() {
                    self.ring.claim_it_all();
                    self.consider_new_spaces();
                    tracing::info!("Elected bootstrap leader; claimed the whole ring");
                }
                self.broadcast_ring();
                Ok(())
            }
            MSG_RING_UPDATE => self.update_ring(body),
            other => Err(RingError::Decode(format!("unexpected unicast tag {}", other))),
        }
    }

    // --- Donation ---

    fn donate_space(&mut self, to: &PeerName) {
        if let Some((start, size)) = self.space_set.give_up_space() {
            let end = start.add(size);
            tracing::info!("Donating {}+{} to {:?}", start, size, to);
            self.ring.grant_range(start, end, to.clone());
        }
        // Reply even with nothing to give: our ring tells the requester the
        // state has moved on so it can pick another donor
        self.unicast_ring(to, MSG_RING_UPDATE);
    }

    /// Brings the space set up to date with the ranges the ring says we own.
    /// New ranges appear as empty spaces; extended ranges grow. Never shrinks.
    pub fn consider_new_spaces(&mut self) {
        for range in self.ring.owned_ranges() {
            match self.space_set.get_mut(range.start) {
                Some(space) => {
                    if range.size() > space.size {
                        tracing::debug!("Growing {} to {} addresses", range.start, range.size());
                        space.grow(range.size());
                    }
                }
                None => {
                    tracing::debug!("New owned range {}", range);
                    self.space_set.add(range.start, range.size());
                }
            }
        }
    }

    // --- Commands ---

    pub fn do_claim(&mut self, ident: &str, addr: Address) -> Result<(), AllocError> {
        if let Some(&existing) = self.owned.get(ident) {
            if existing == addr {
                return Ok(());
            }
            return Err(AllocError::AlreadyOwns(existing));
        }

        let owner = self.ring.owner(addr);
        if owner != self.our_name {
            return Err(AllocError::OwnedByAnotherPeer(addr, owner));
        }

        self.space_set.claim(addr)?;
        tracing::debug!("Claimed {} for {}", addr, ident);
        self.owned.insert(ident.to_string(), addr);
        Ok(())
    }

    pub fn free(&mut self, ident: &str) -> Result<Address, AllocError> {
        self.cancel_ops_for(ident);
        match self.owned.remove(ident) {
            Some(addr) => {
                self.space_set.free(addr)?;
                tracing::debug!("Freed {} of {}", addr, ident);
                Ok(addr)
            }
            None => Err(AllocError::NoAddresses),
        }
    }

    pub fn container_died(&mut self, ident: &str) {
        match self.free(ident) {
            Ok(addr) => tracing::info!("Container {} died; freed {}", ident, addr),
            Err(_) => tracing::debug!("Container {} died owning no addresses", ident),
        }
    }

    pub fn admin_takeover(&mut self, ident: &str) -> Result<(), AllocError> {
        let peer = self
            .directory
            .resolve(ident)
            .or_else(|| self.ring.peers().into_iter().find(|p| p.0 == ident))
            .ok_or(AllocError::PeerNotFound)?;
        if peer == self.our_name {
            return Err(AllocError::CannotTakeoverSelf);
        }

        tracing::warn!("Taking over ranges of {:?}", peer);
        let our_name = self.our_name.clone();
        let acquired = self.ring.transfer(&peer, &our_name);
        tracing::info!("Acquired {} range(s) from {:?}", acquired.len(), peer);
        self.consider_new_spaces();
        self.broadcast_ring();
        Ok(())
    }

    pub fn shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;

        if !self.ring.is_empty() {
            let our_name = self.our_name.clone();
            match self.ring.peers().into_iter().find(|p| p != &our_name) {
                Some(heir) => {
                    tracing::info!("Shutting down; transferring our ranges to {:?}", heir);
                    self.ring.transfer(&our_name, &heir);
                }
                None => tracing::info!("Shutting down as the last peer; ranges die with us"),
            }
            self.broadcast_ring();
        }

        for mut op in self.pending_allocates.drain(..) {
            op.cancel();
        }
        for mut op in self.pending_claims.drain(..) {
            op.cancel();
        }
        self.space_set.clear();
    }

    fn cancel_ops_for(&mut self, ident: &str) {
        let mut allocates = std::mem::take(&mut self.pending_allocates);
        allocates.retain_mut(|op| {
            if op.for_container(ident) {
                op.cancel();
                false
            } else {
                true
            }
        });
        self.pending_allocates = allocates;

        let mut claims = std::mem::take(&mut self.pending_claims);
        claims.retain_mut(|op| {
            if op.for_container(ident) {
                op.cancel();
                false
            } else {
                true
            }
        });
        self.pending_claims = claims;
    }

    // --- Per-wakeup housekeeping ---

    /// Re-drives the queues: every claim in order, then allocates until the
    /// first that stays stuck (more tries would only repeat the same space
    /// request at the same donor).
    pub fn try_pending_ops(&mut self) {
        let mut claims = std::mem::take(&mut self.pending_claims);
        let mut still_pending = VecDeque::new();
        for mut op in claims.drain(..) {
            if !op.try_op(self) {
                still_pending.push_back(op);
            }
        }
        self.pending_claims = still_pending;

        let mut allocates = std::mem::take(&mut self.pending_allocates);
        while let Some(mut op) = allocates.pop_front() {
            if !op.try_op(self) {
                allocates.push_front(op);
                break;
            }
        }
        self.pending_allocates = allocates;
    }

    /// Pushes our spaces' free counts into the ring so other peers pick
    /// donors sensibly. Version bumps only happen on change.
    pub fn report_free_space(&mut self) {
        if self.ring.is_empty() {
            return;
        }
        let frees: BTreeMap<Address, u32> = self
            .space_set
            .spaces()
            .iter()
            .map(|s| (s.start, s.num_free_addresses()))
            .collect();
        self.ring.report_free(&frees);
    }

    /// The ring and the space set must agree about what we own, and the
    /// books must balance. Violations are bugs, not runtime errors.
    pub fn assert_invariants(&self) {
        let ranges = self.ring.owned_ranges();
        let spaces = self.space_set.spaces();
        assert_eq!(
            ranges.len(),
            spaces.len(),
            "ring and space set disagree on range count"
        );
        for (range, space) in ranges.iter().zip(spaces) {
            assert_eq!(range.start, space.start, "ring and space set diverged");
            assert_eq!(range.size(), space.size, "ring and space set diverged");
        }

        let total: u64 = ranges.iter().map(|r| u64::from(r.size())).sum();
        assert!(
            u64::from(self.space_set.num_free_addresses()) + self.owned.len() as u64 <= total,
            "more addresses in play than we own"
        );
    }

    pub fn stats(&self) -> Stats {
        Stats {
            free_addresses: self.space_set.num_free_addresses(),
            owned_containers: self.owned.len(),
            ring_entries: self.ring.entries.len(),
            pending_allocates: self.pending_allocates.len(),
            pending_claims: self.pending_claims.len(),
        }
    }

    pub fn status(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Allocator {:?} subnet {}", self.our_name, self.subnet);
        let _ = writeln!(out, "{}", self.ring);
        let _ = writeln!(out, "Owned spaces:");
        let _ = writeln!(out, "{}", self.space_set);
        let _ = writeln!(
            out,
            "{} container(s), {} free address(es)",
            self.owned.len(),
            self.space_set.num_free_addresses()
        );
        if self.paxos.is_some() && self.ring.is_empty() {
            let _ = writeln!(out, "Bootstrap consensus in progress");
        }
        let pending: Vec<&str> = self
            .pending_claims
            .iter()
            .map(|op| op.ident.as_str())
            .chain(self.pending_allocates.iter().map(|op| op.ident.as_str()))
            .collect();
        if !pending.is_empty() {
            let _ = writeln!(out, "Pending requests for: {}", pending.join(", "));
        }
        out
    }
}
