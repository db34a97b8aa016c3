use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::gateway::Gateway;
use super::http::AppState;
use super::identity::AuthenticatedUser;
use crate::common::{ClientEvent, ServerEvent, UserId};

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
) -> Response {
    let verified = user.map(|user| user.id);
    ws.on_upgrade(move |socket| serve_connection(socket, state.gateway, verified))
}

/// Drive one WebSocket: inbound frames feed the session in order, outbound
/// events are drained by a writer task.
async fn serve_connection(socket: WebSocket, gateway: Arc<Gateway>, verified: Option<UserId>) {
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut session = gateway.open_session(event_tx);
    if let Some(user_id) = verified {
        session.bind_identity(user_id);
    }
    let connection = session.handle().id();

    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("Failed to serialize event for connection {connection}: {err}");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => {
                    session.handle_event(event).await;
                }
                Err(err) => log::debug!("Connection {connection}: malformed event ignored: {err}"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                log::debug!("Connection {connection}: transport error: {err}");
                break;
            }
        }
    }

    // Dropping the session releases the last sender, so the writer flushes
    // whatever is queued and then ends.
    drop(session);
    if let Err(err) = writer.await {
        log::debug!("Connection {connection}: writer task failed: {err}");
    }
}
