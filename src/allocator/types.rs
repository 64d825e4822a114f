use crate::addrs::types::Address;
use crate::gossip::types::PeerName;
use crate::ring::ring::RingError;
use crate::space::space::SpaceError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocError {
    #[error("no free addresses")]
    NoAddresses,
    #[error("container already owns {0}")]
    AlreadyOwns(Address),
    #[error("address {0} belongs to peer {1}")]
    OwnedByAnotherPeer(Address, PeerName),
    #[error("cannot take over our own ranges")]
    CannotTakeoverSelf,
    #[error("no such peer")]
    PeerNotFound,
    #[error("allocator is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error(transparent)]
    Space(#[from] SpaceError),
}
