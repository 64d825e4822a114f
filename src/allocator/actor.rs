use crate::addrs::types::Address;
use crate::allocator::allocator::{Allocator, Stats};
use crate::allocator::pending::{AllocateOp, CancelToken, ClaimOp};
use crate::allocator::types::AllocError;
use crate::gossip::types::PeerName;
use crate::ring::ring::RingError;
use tokio::sync::{mpsc, oneshot};

/// Everything the actor can be asked to do. Synchronous commands carry their
/// reply channel; notifications are fire-and-forget.
pub enum Command {
    Allocate {
        ident: String,
        reply: oneshot::Sender<Result<Option<Address>, AllocError>>,
        cancel: CancelToken,
    },
    Claim {
        ident: String,
        addr: Address,
        reply: oneshot::Sender<Result<Option<()>, AllocError>>,
        cancel: CancelToken,
    },
    Free {
        ident: String,
        reply: oneshot::Sender<Result<Address, AllocError>>,
    },
    ContainerDied {
        ident: String,
    },
    AdminTakeover {
        ident: String,
        reply: oneshot::Sender<Result<(), AllocError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<String>,
    },
    Stats {
        reply: oneshot::Sender<Stats>,
    },
    /// Our encoded state, for anti-entropy gossip.
    Encode {
        reply: oneshot::Sender<Vec<u8>>,
    },
    GossipBroadcast {
        from: PeerName,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<u8>, RingError>>,
    },
    GossipUnicast {
        from: PeerName,
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), RingError>>,
    },
    /// Merge-only gossip, nothing returned.
    Gossip {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), RingError>>,
    },
}

/// Cloneable front door to the actor. Every method submits a command and
/// waits on its private reply channel; a closed channel means the actor has
/// shut down.
#[derive(Clone)]
pub struct AllocatorHandle {
    tx: mpsc::UnboundedSender<Command>,
    prefix_len: u8,
}

/// Spawns the actor task and returns the handle callers use.
pub fn start(alloc: Allocator) -> AllocatorHandle {
    let prefix_len = alloc.subnet.prefix_len;
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(alloc, rx));
    AllocatorHandle { tx, prefix_len }
}

/// The event loop. One command per iteration, run to completion, then the
/// housekeeping pass: invariants, free-space reporting, pending retries.
async fn run(mut alloc: Allocator, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(cmd) = rx.recv().await {
        let stop = matches!(cmd, Command::Shutdown { .. });
        alloc.dispatch(cmd);
        if !alloc.shutting_down {
            alloc.assert_invariants();
            alloc.report_free_space();
            alloc.try_pending_ops();
        }
        if stop {
            break;
        }
    }
    tracing::info!("Allocator actor stopped");
}

impl Allocator {
    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Allocate {
                ident,
                reply,
                cancel,
            } => {
                if self.shutting_down {
                    let _ = reply.send(Err(AllocError::ShuttingDown));
                    return;
                }
                self.elect_leader_if_necessary();
                // Repeat requests answer straight away, everything else
                // queues behind older requests
                if let Some(&addr) = self.owned.get(&ident) {
                    let _ = reply.send(Ok(Some(addr)));
                    return;
                }
                self.pending_allocates
                    .push_back(AllocateOp::new(ident, reply, cancel));
            }
            Command::Claim {
                ident,
                addr,
                reply,
                cancel,
            } => {
                if self.shutting_down {
                    let _ = reply.send(Err(AllocError::ShuttingDown));
                    return;
                }
                // An address outside our subnet is not ours to manage
                if !self.subnet.contains(addr) {
                    let _ = reply.send(Ok(Some(())));
                    return;
                }
                self.elect_leader_if_necessary();
                self.pending_claims
                    .push_back(ClaimOp::new(ident, addr, reply, cancel));
            }
            Command::Free { ident, reply } => {
                let _ = reply.send(self.free(&ident));
            }
            Command::ContainerDied { ident } => {
                self.container_died(&ident);
            }
            Command::AdminTakeover { ident, reply } => {
                let _ = reply.send(self.admin_takeover(&ident));
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.status());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Encode { reply } => {
                let _ = reply.send(self.encode_state());
            }
            Command::GossipBroadcast {
                from,
                payload,
                reply,
            } => {
                let result = self.on_broadcast(&payload);
                if let Err(e) = &result {
                    tracing::warn!("Bad broadcast from {:?}: {}", from, e);
                }
                let _ = reply.send(result.map(|_| self.encode_state()));
            }
            Command::GossipUnicast {
                from,
                payload,
                reply,
            } => {
                let result = self.on_unicast(&from, &payload);
                if let Err(e) = &result {
                    tracing::warn!("Bad unicast from {:?}: {}", from, e);
                }
                let _ = reply.send(result);
            }
            Command::Gossip { payload, reply } => {
                let result = self.on_broadcast(&payload);
                if let Err(e) = &result {
                    tracing::warn!("Bad gossip: {}", e);
                }
                let _ = reply.send(result);
            }
        }
    }
}

impl AllocatorHandle {
    /// Network prefix length, for rendering results in CIDR form.
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn submit(&self, cmd: Command) -> Result<(), AllocError> {
        self.tx.send(cmd).map_err(|_| AllocError::ShuttingDown)
    }

    /// Gets an address for the container, waiting for donations if we are
    /// out of space. `Ok(None)` means the request was cancelled.
    pub async fn allocate(
        &self,
        ident: &str,
        cancel: CancelToken,
    ) -> Result<Option<Address>, AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Allocate {
            ident: ident.to_string(),
            reply,
            cancel,
        })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)?
    }

    /// Claims a specific address for the container. A no-op for addresses
    /// outside the managed subnet. `Ok(None)` means cancelled.
    pub async fn claim(
        &self,
        ident: &str,
        addr: Address,
        cancel: CancelToken,
    ) -> Result<Option<()>, AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Claim {
            ident: ident.to_string(),
            addr,
            reply,
            cancel,
        })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)?
    }

    /// Releases the container's address.
    pub async fn free(&self, ident: &str) -> Result<Address, AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Free {
            ident: ident.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)?
    }

    /// Fire-and-forget: the container runtime saw this container die.
    pub fn container_died(&self, ident: &str) {
        let _ = self.submit(Command::ContainerDied {
            ident: ident.to_string(),
        });
    }

    /// Takes over all ranges of a dead peer. Unsafe if the peer is alive.
    pub async fn admin_takeover(&self, ident: &str) -> Result<(), AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::AdminTakeover {
            ident: ident.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)?
    }

    /// Hands our ranges to another peer and stops the actor.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.submit(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    pub async fn status(&self) -> Result<String, AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Status { reply })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)
    }

    pub async fn stats(&self) -> Result<Stats, AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Stats { reply })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)
    }

    /// Our encoded state for anti-entropy gossip.
    pub async fn encode(&self) -> Result<Vec<u8>, AllocError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Encode { reply })?;
        rx.await.map_err(|_| AllocError::ShuttingDown)
    }

    /// A broadcast arrived; merge it and return our state for propagation.
    pub async fn on_gossip_broadcast(
        &self,
        from: PeerName,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, RingError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::GossipBroadcast {
                from,
                payload,
                reply,
            })
            .is_err()
        {
            return Err(RingError::Decode("allocator stopped".to_string()));
        }
        rx.await
            .unwrap_or_else(|_| Err(RingError::Decode("allocator stopped".to_string())))
    }

    /// A unicast arrived; dispatch on its tag.
    pub async fn on_gossip_unicast(
        &self,
        from: PeerName,
        payload: Vec<u8>,
    ) -> Result<(), RingError> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::GossipUnicast {
                from,
                payload,
                reply,
            })
            .is_err()
        {
            return Err(RingError::Decode("allocator stopped".to_string()));
        }
        rx.await
            .unwrap_or_else(|_| Err(RingError::Decode("allocator stopped".to_string())))
    }

    /// Merge-only gossip entry point.
    pub async fn on_gossip(&self, payload: Vec<u8>) -> Result<(), RingError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Gossip { payload, reply }).is_err() {
            return Err(RingError::Decode("allocator stopped".to_string()));
        }
        rx.await
            .unwrap_or_else(|_| Err(RingError::Decode("allocator stopped".to_string())))
    }
}
