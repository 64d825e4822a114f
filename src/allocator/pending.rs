use crate::addrs::types::Address;
use crate::allocator::allocator::Allocator;
use crate::allocator::types::AllocError;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Cancellation signal a pending operation polls before every try.
/// Both an explicit signal and a dropped sender (caller went away) count.
pub struct CancelToken(Option<oneshot::Receiver<()>>);

impl CancelToken {
    pub fn none() -> CancelToken {
        CancelToken(None)
    }

    pub fn new() -> (oneshot::Sender<()>, CancelToken) {
        let (tx, rx) = oneshot::channel();
        (tx, CancelToken(Some(rx)))
    }

    pub fn cancelled(&mut self) -> bool {
        match &mut self.0 {
            None => false,
            Some(rx) => !matches!(rx.try_recv(), Err(TryRecvError::Empty)),
        }
    }
}

/// A queued address request. Completion is reported over the reply channel
/// exactly once; a `None` result means the operation was cancelled.
pub struct AllocateOp {
    pub ident: String,
    reply: Option<oneshot::Sender<Result<Option<Address>, AllocError>>>,
    cancel: CancelToken,
}

impl AllocateOp {
    pub fn new(
        ident: String,
        reply: oneshot::Sender<Result<Option<Address>, AllocError>>,
        cancel: CancelToken,
    ) -> AllocateOp {
        AllocateOp {
            ident,
            reply: Some(reply),
            cancel,
        }
    }

    fn send(&mut self, result: Result<Option<Address>, AllocError>) {
        if let Some(reply) = self.reply.take() {
            // The caller may have gone away; nothing to do about it
            let _ = reply.send(result);
        }
    }

    /// Attempts to satisfy the request. Returns true when the operation is
    /// finished (fulfilled, failed or cancelled) and can be dequeued.
    pub fn try_op(&mut self, alloc: &mut Allocator) -> bool {
        if self.cancel.cancelled() {
            self.send(Ok(None));
            return true;
        }

        if let Some(&addr) = alloc.owned.get(&self.ident) {
            self.send(Ok(Some(addr)));
            return true;
        }

        if let Some(addr) = alloc.space_set.allocate() {
            tracing::debug!("Allocated {} for {}", addr, self.ident);
            alloc.owned.insert(self.ident.clone(), addr);
            self.send(Ok(Some(addr)));
            return true;
        }

        // Out of local space. While the ring is still being seeded we just
        // wait; once it exists, ask a donor or give up if nobody has space.
        if alloc.ring.is_empty() {
            return false;
        }
        match alloc.ring.choose_peer_to_ask_for_space() {
            Ok(donor) => {
                tracing::debug!("Asking {:?} for space for {}", donor, self.ident);
                alloc.send_space_request(&donor);
                false
            }
            Err(e) => {
                tracing::debug!("Cannot allocate for {}: {}", self.ident, e);
                self.send(Err(AllocError::NoAddresses));
                true
            }
        }
    }

    pub fn cancel(&mut self) {
        self.send(Ok(None));
    }

    pub fn for_container(&self, ident: &str) -> bool {
        self.ident == ident
    }
}

/// A queued claim of a specific address, waiting for the ring to tell us
/// who owns it.
pub struct ClaimOp {
    pub ident: String,
    pub addr: Address,
    reply: Option<oneshot::Sender<Result<Option<()>, AllocError>>>,
    cancel: CancelToken,
}

impl ClaimOp {
    pub fn new(
        ident: String,
        addr: Address,
        reply: oneshot::Sender<Result<Option<()>, AllocError>>,
        cancel: CancelToken,
    ) -> ClaimOp {
        ClaimOp {
            ident,
            addr,
            reply: Some(reply),
            cancel,
        }
    }

    fn send(&mut self, result: Result<Option<()>, AllocError>) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(result);
        }
    }

    pub fn try_op(&mut self, alloc: &mut Allocator) -> bool {
        if self.cancel.cancelled() {
            self.send(Ok(None));
            return true;
        }

        // Until the ring is seeded we do not know who owns the address
        if alloc.ring.is_empty() {
            return false;
        }

        let result = alloc.do_claim(&self.ident, self.addr);
        self.send(result.map(Some));
        true
    }

    pub fn cancel(&mut self) {
        self.send(Ok(None));
    }

    pub fn for_container(&self, ident: &str) -> bool {
        self.ident == ident
    }
}
