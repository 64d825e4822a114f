use crate::gossip::types::PeerName;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Identifies one proposal. Ordering is lexicographic on `(round, proposer)`;
/// round 0 is the uninitialized id that precedes all real proposals.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ProposalId {
    pub round: u32,
    pub proposer: PeerName,
}

impl ProposalId {
    pub fn valid(&self) -> bool {
        self.round > 0
    }
}

/// The value we want consensus on: the set of peers that will seed the ring.
pub type Value = BTreeSet<PeerName>;

/// A value plus the proposal that originated it. Comparing origins is how we
/// compare accepted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AcceptedValue {
    pub value: Value,
    pub origin: ProposalId,
}

/// Everything one node claims: its promise and, if valid, its accepted
/// proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeClaims {
    pub promise: ProposalId,
    pub accepted: ProposalId,
    pub accepted_val: AcceptedValue,
}

/// What this node knows about every node's claims; the unit of gossip.
pub type GossipState = HashMap<PeerName, NodeClaims>;

/// A participant in the bootstrap consensus.
#[derive(Debug, Clone)]
pub struct Node {
    id: PeerName,
    quorum: u32,
    knows: GossipState,
}

impl Node {
    pub fn new(id: PeerName, quorum: u32) -> Node {
        Node {
            id,
            quorum,
            knows: GossipState::new(),
        }
    }

    pub fn gossip_state(&self) -> &GossipState {
        &self.knows
    }

    /// Folds in another node's view. Per-peer, later promises and later
    /// accepted proposals win. Returns true if anything was new to us.
    pub fn update(&mut self, from: &GossipState) -> bool {
        let mut changed = false;

        for (peer, from_claims) in from {
            match self.knows.get_mut(peer) {
                Some(claims) => {
                    if claims.promise < from_claims.promise {
                        claims.promise = from_claims.promise.clone();
                        changed = true;
                    }
                    if claims.accepted < from_claims.accepted {
                        claims.accepted = from_claims.accepted.clone();
                        claims.accepted_val = from_claims.accepted_val.clone();
                        changed = true;
                    }
                }
                None => {
                    self.knows.insert(peer.clone(), from_claims.clone());
                    changed = true;
                }
            }
        }

        changed
    }

    /// The Paxos "Prepare" step: gossip a proposal that supersedes every
    /// round we have seen.
    pub fn propose(&mut self) {
        let mut round = 0;
        for claims in self.knows.values() {
            round = round.max(claims.promise.round).max(claims.accepted.round);
        }

        let ours = self.knows.entry(self.id.clone()).or_default();
        ours.promise = ProposalId {
            round: round + 1,
            proposer: self.id.clone(),
        };
    }

    /// Re-derives our own claims from what we know. Returns true if they
    /// changed, in which case the caller should gossip our state.
    pub fn think(&mut self) -> bool {
        let mut ours = self.knows.get(&self.id).cloned().unwrap_or_default();

        // Promise: adopt the highest promise visible.
        for claims in self.knows.values() {
            if ours.promise < claims.promise {
                ours.promise = claims.promise.clone();
            }
        }

        // Accept-request: as a proposer, our proposal is only in the running
        // while it is also our own promise; anyone who promised higher will
        // ignore it anyway.
        if ours.promise.proposer == self.id {
            let mut count = 0;
            let mut accepted = ProposalId::default();
            let mut accepted_val = AcceptedValue::default();

            for claims in self.knows.values() {
                if claims.promise == ours.promise {
                    count += 1;
                    if accepted < claims.accepted {
                        accepted = claims.accepted.clone();
                        accepted_val = claims.accepted_val.clone();
                    }
                }
            }

            if count >= self.quorum {
                if !accepted.valid() {
                    // Free to invent a value: the set of peers we know of.
                    // At least a quorum, which is enough to seed the ring.
                    accepted_val.value = self.knows.keys().cloned().collect();
                    accepted_val.origin = ours.promise.clone();
                }
                // Accepting our own proposal is what communicates the
                // accept-request to everyone else.
                ours.accepted = ours.promise.clone();
                ours.accepted_val = accepted_val;
            }
        }

        // Accept: if the proposal we promised on was accepted somewhere,
        // accept it too.
        for claims in self.knows.values() {
            if claims.accepted == ours.promise {
                ours.accepted = claims.accepted.clone();
                ours.accepted_val = claims.accepted_val.clone();
                break;
            }
        }

        if self.knows.get(&self.id) == Some(&ours) {
            return false;
        }
        self.knows.insert(self.id.clone(), ours);
        true
    }

    /// The agreed peer set, once any proposal has been accepted by a quorum.
    pub fn consensus(&self) -> Option<Value> {
        let mut counts: HashMap<&ProposalId, u32> = HashMap::new();

        for claims in self.knows.values() {
            if claims.accepted.valid() {
                let origin = &claims.accepted_val.origin;
                let count = counts.entry(origin).or_insert(0);
                *count += 1;
                if *count >= self.quorum {
                    return Some(claims.accepted_val.value.clone());
                }
            }
        }

        None
    }
}
