pub mod gateway;
pub mod http;
pub mod identity;
pub mod presence;
pub mod websocket;

pub use gateway::{Delivery, Gateway, Session, SessionState};
pub use http::{AppState, router};
pub use identity::AuthenticatedUser;
pub use presence::{ConnectionHandle, PresenceRegistry};

use std::future::Future;

use tokio::net::TcpListener;

/// Serve the HTTP + WebSocket surface until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        log::info!("Chat server listening on {addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
