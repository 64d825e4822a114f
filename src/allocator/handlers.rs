use crate::addrs::types::Address;
use crate::allocator::actor::AllocatorHandle;
use crate::allocator::pending::CancelToken;
use crate::allocator::types::AllocError;
use axum::extract::{Extension, Path};
use axum::http::StatusCode;

/// POST /ip/{ident} - allocate an address for a container.
///
/// Blocks until an address is available (or the request is abandoned); the
/// response is CIDR-formatted, ready to be put on an interface. Dropping the
/// connection cancels a queued request on the next actor wake-up.
pub async fn handle_allocate(
    Path(ident): Path<String>,
    Extension(handle): Extension<AllocatorHandle>,
) -> (StatusCode, String) {
    let (_cancel_tx, cancel) = CancelToken::new();
    match handle.allocate(&ident, cancel).await {
        Ok(Some(addr)) => (
            StatusCode::OK,
            format!("{}/{}", addr, handle.prefix_len()),
        ),
        Ok(None) => (StatusCode::SERVICE_UNAVAILABLE, "cancelled".to_string()),
        Err(e) => error_response(e),
    }
}

/// PUT /ip/{ident}/{addr} - claim a specific address for a container.
/// Addresses outside the managed subnet are silently accepted.
pub async fn handle_claim(
    Path((ident, addr)): Path<(String, String)>,
    Extension(handle): Extension<AllocatorHandle>,
) -> (StatusCode, String) {
    let addr: Address = match addr.parse() {
        Ok(addr) => addr,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("invalid address: {}", e)),
    };

    let (_cancel_tx, cancel) = CancelToken::new();
    match handle.claim(&ident, addr, cancel).await {
        Ok(Some(())) => (StatusCode::OK, "ok".to_string()),
        Ok(None) => (StatusCode::SERVICE_UNAVAILABLE, "cancelled".to_string()),
        Err(e) => error_response(e),
    }
}

/// DELETE /ip/{ident} - free the container's address.
pub async fn handle_free(
    Path(ident): Path<String>,
    Extension(handle): Extension<AllocatorHandle>,
) -> (StatusCode, String) {
    match handle.free(&ident).await {
        Ok(addr) => (StatusCode::OK, format!("freed {}", addr)),
        Err(AllocError::NoAddresses) => {
            (StatusCode::NOT_FOUND, "no addresses owned".to_string())
        }
        Err(e) => error_response(e),
    }
}

/// DELETE /peer/{ident} - take over all ranges of a (dead) peer, by name or
/// nickname.
pub async fn handle_takeover(
    Path(ident): Path<String>,
    Extension(handle): Extension<AllocatorHandle>,
) -> (StatusCode, String) {
    match handle.admin_takeover(&ident).await {
        Ok(()) => (StatusCode::NO_CONTENT, String::new()),
        Err(AllocError::PeerNotFound) => (StatusCode::NOT_FOUND, "no such peer".to_string()),
        Err(e) => error_response(e),
    }
}

/// GET /status - human-readable dump of the allocator state.
pub async fn handle_status(
    Extension(handle): Extension<AllocatorHandle>,
) -> (StatusCode, String) {
    match handle.status().await {
        Ok(status) => (StatusCode::OK, status),
        Err(e) => error_response(e),
    }
}

/// POST /shutdown - transfer our ranges away and stop serving.
pub async fn handle_shutdown(
    Extension(handle): Extension<AllocatorHandle>,
) -> (StatusCode, String) {
    handle.shutdown().await;
    (StatusCode::OK, "shutting down".to_string())
}

fn error_response(e: AllocError) -> (StatusCode, String) {
    let code = match e {
        AllocError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        AllocError::NoAddresses => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    (code, e.to_string())
}
