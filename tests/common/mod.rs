//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use portal_chat::common::{ClientEvent, DraftMessage, Role, ServerEvent, TempId, UserId, UserProfile};
use portal_chat::network::{self, AppState, PresenceRegistry};
use portal_chat::storage::SqliteStore;

pub fn join(user: &str) -> ClientEvent {
    ClientEvent::Join {
        user_id: UserId::new(user),
    }
}

pub fn send(receiver: &str, content: &str, temp_id: &str) -> ClientEvent {
    ClientEvent::SendMessage {
        receiver_id: UserId::new(receiver),
        message: DraftMessage {
            sender_id: None,
            receiver_id: Some(UserId::new(receiver)),
            content: content.to_string(),
            temp_id: TempId::from(temp_id),
        },
    }
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn profile(id: &str, name: &str, role: Role) -> UserProfile {
    UserProfile {
        id: UserId::new(id),
        name: name.to_string(),
        avatar: None,
        role,
    }
}

pub struct TestApp {
    pub address: SocketAddr,
    pub store: Arc<SqliteStore>,
    pub presence: Arc<PresenceRegistry>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.address)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.address)
    }

    /// `join` has no acknowledgement, so poll presence instead.
    pub async fn wait_until_online(&self, user: &str) {
        let user = UserId::new(user);
        for _ in 0..200 {
            if self.presence.is_online(&user) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("{user} never came online");
    }
}

/// Spawn the full server on an ephemeral port with an in-memory database
/// and users `alice`, `bob` and `acme` already registered.
pub async fn spawn_app() -> TestApp {
    let store = Arc::new(SqliteStore::in_memory().expect("in-memory store"));
    for user in [
        profile("alice", "Alice", Role::Student),
        profile("bob", "Bob", Role::Student),
        profile("acme", "Acme Corp", Role::Company),
    ] {
        store.upsert_user(user).await.expect("seed user");
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr");
    let state = AppState::new(store.clone(), store.clone());
    let presence = state.gateway.presence().clone();
    tokio::spawn(network::serve(listener, state, std::future::pending()));

    TestApp {
        address,
        store,
        presence,
    }
}
