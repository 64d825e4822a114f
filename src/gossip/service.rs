use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

use super::types::{Directory, Gossip, MeshMessage, Peer, PeerName};
use crate::allocator::actor::AllocatorHandle;

const ANTI_ENTROPY_INTERVAL: Duration = Duration::from_secs(2);

/// The UDP overlay fabric: keeps the peer table and moves allocator payloads
/// between nodes.
pub struct MeshService {
    pub local: Peer,
    pub members: Arc<DashMap<PeerName, Peer>>,
    socket: Arc<UdpSocket>,
}

impl MeshService {
    pub async fn new(
        bind_addr: SocketAddr,
        name: PeerName,
        nickname: Option<String>,
        seeds: Vec<SocketAddr>,
    ) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        let local = Peer {
            name,
            nickname,
            addr: socket.local_addr()?,
        };

        let members = Arc::new(DashMap::new());
        members.insert(local.name.clone(), local.clone());

        let service = Arc::new(Self {
            local,
            members,
            socket: Arc::new(socket),
        });

        if !seeds.is_empty() {
            tracing::info!("Joining overlay via {} seed(s)", seeds.len());
            for seed in seeds {
                service.send_hello(seed).await;
            }
        } else {
            tracing::info!("Starting as a founding peer");
        }

        Ok(service)
    }

    /// Spawns the receive and anti-entropy loops, delivering payloads into
    /// the allocator.
    pub fn start(self: &Arc<Self>, handle: AllocatorHandle) {
        let service = self.clone();
        let h = handle.clone();
        tokio::spawn(async move {
            service.receive_loop(h).await;
        });

        let service = self.clone();
        tokio::spawn(async move {
            service.anti_entropy_loop(handle).await;
        });

        tracing::info!("Mesh fabric started as {:?}", self.local.name);
    }

    async fn send_hello(&self, dst: SocketAddr) {
        let known: Vec<Peer> = self.members.iter().map(|e| e.value().clone()).collect();
        let msg = MeshMessage::Hello {
            peer: self.local.clone(),
            known,
        };
        self.send(dst, &msg).await;
    }

    async fn send(&self, dst: SocketAddr, msg: &MeshMessage) {
        match bincode::serialize(msg) {
            Ok(encoded) => {
                if let Err(e) = self.socket.send_to(&encoded, dst).await {
                    tracing::warn!("Failed to send to {}: {}", dst, e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize mesh message: {}", e),
        }
    }

    async fn receive_loop(self: Arc<Self>, handle: AllocatorHandle) {
        let mut buf = vec![0u8; 65536];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<MeshMessage>(&buf[..len]) {
                    Ok(msg) => self.handle_message(msg, src, &handle).await,
                    Err(e) => {
                        tracing::warn!("Undecodable packet from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: MeshMessage, src: SocketAddr, handle: &AllocatorHandle) {
        match msg {
            MeshMessage::Hello { mut peer, known } => {
                // Trust the socket over whatever address the peer thinks it has
                peer.addr = src;
                let newcomer = !self.members.contains_key(&peer.name);
                self.members.insert(peer.name.clone(), peer.clone());
                for p in known {
                    if p.name != self.local.name {
                        self.members.entry(p.name.clone()).or_insert(p);
                    }
                }
                if newcomer {
                    tracing::info!("Discovered peer {:?} at {}", peer.name, src);
                    self.send_hello(src).await;
                }
            }
            MeshMessage::Broadcast { from, payload } => {
                self.note_sender(&from, src);
                if let Err(e) = handle.on_gossip_broadcast(from.clone(), payload).await {
                    tracing::warn!("Dropped broadcast from {:?}: {}", from, e);
                }
            }
            MeshMessage::Unicast { from, payload } => {
                self.note_sender(&from, src);
                if let Err(e) = handle.on_gossip_unicast(from.clone(), payload).await {
                    tracing::warn!("Dropped unicast from {:?}: {}", from, e);
                }
            }
        }
    }

    /// A payload from an unknown peer still teaches us its address.
    fn note_sender(&self, from: &PeerName, src: SocketAddr) {
        if from != &self.local.name {
            self.members.entry(from.clone()).or_insert_with(|| Peer {
                name: from.clone(),
                nickname: None,
                addr: src,
            });
        }
    }

    /// Periodically pushes our full state to one random peer, so lost
    /// packets and late joiners converge without explicit retries.
    async fn anti_entropy_loop(self: Arc<Self>, handle: AllocatorHandle) {
        let mut interval = tokio::time::interval(ANTI_ENTROPY_INTERVAL);

        loop {
            interval.tick().await;

            let others: Vec<Peer> = self
                .members
                .iter()
                .filter(|e| e.key() != &self.local.name)
                .map(|e| e.value().clone())
                .collect();
            if others.is_empty() {
                continue;
            }

            let state = match handle.encode().await {
                Ok(state) => state,
                Err(_) => return, // allocator has shut down
            };

            use rand::Rng;
            let target = &others[rand::thread_rng().gen_range(0..others.len())];
            let msg = MeshMessage::Broadcast {
                from: self.local.name.clone(),
                payload: state,
            };
            self.send(target.addr, &msg).await;
        }
    }
}

impl Gossip for MeshService {
    fn broadcast(&self, payload: Vec<u8>) {
        let members = self.members.clone();
        let socket = self.socket.clone();
        let msg = MeshMessage::Broadcast {
            from: self.local.name.clone(),
            payload,
        };
        let local = self.local.name.clone();
        tokio::spawn(async move {
            match bincode::serialize(&msg) {
                Ok(encoded) => {
                    for entry in members.iter() {
                        if entry.key() == &local {
                            continue;
                        }
                        if let Err(e) = socket.send_to(&encoded, entry.value().addr).await {
                            tracing::warn!("Broadcast to {:?} failed: {}", entry.key(), e);
                        }
                    }
                }
                Err(e) => tracing::error!("Failed to serialize broadcast: {}", e),
            }
        });
    }

    fn unicast(&self, dst: &PeerName, payload: Vec<u8>) {
        let Some(peer) = self.members.get(dst).map(|e| e.value().clone()) else {
            tracing::warn!("Unicast to unknown peer {:?} dropped", dst);
            return;
        };
        let socket = self.socket.clone();
        let msg = MeshMessage::Unicast {
            from: self.local.name.clone(),
            payload,
        };
        let dst = dst.clone();
        tokio::spawn(async move {
            match bincode::serialize(&msg) {
                Ok(encoded) => {
                    if let Err(e) = socket.send_to(&encoded, peer.addr).await {
                        tracing::warn!("Unicast to {:?} failed: {}", dst, e);
                    }
                }
                Err(e) => tracing::error!("Failed to serialize unicast: {}", e),
            }
        });
    }
}

impl Directory for MeshService {
    fn resolve(&self, name_or_nickname: &str) -> Option<PeerName> {
        for entry in self.members.iter() {
            let peer = entry.value();
            if peer.name.0 == name_or_nickname
                || peer.nickname.as_deref() == Some(name_or_nickname)
            {
                return Some(peer.name.clone());
            }
        }
        None
    }
}
