//! Realtime chat channel management
//!
//! Each event exposes one WebSocket chat channel. The manager owns at most
//! one live session per event: entering an event supersedes any session
//! already open for it, and leaving tears the session down. The session
//! driver itself lives in [`session`]; wire shapes in [`envelope`].

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::NetConfig;
use crate::token::TokenStore;

pub mod buffer;
pub mod envelope;
pub mod session;

pub use buffer::MessageBuffer;
pub use envelope::{ChatMessage, Inbound, MessageKind, Outbound};
pub use session::ChatSession;

/// Connection lifecycle for one chat session.
///
/// `Closed` and `Failed` are terminal: a new session must be spawned to
/// rejoin. `Failed` means the reconnect budget was exhausted or the session
/// could not start at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    ReconnectWait,
    Closed,
    Failed,
}

/// Events surfaced to the UI layer for one session.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StateChanged(ConnState),
    /// A displayable chat message (membership churn is filtered out)
    Message(ChatMessage),
    /// Authoritative presence count; replaces any local value
    Presence(u64),
    /// Authoritative participant roster; replaces any local value
    Roster(Vec<String>),
    /// User-visible channel error; does not change the connection state
    ChannelError(String),
}

/// Owns the live chat sessions, keyed by event id.
pub struct ChatSessionManager {
    config: Arc<NetConfig>,
    store: Arc<TokenStore>,
    sessions: DashMap<String, Arc<ChatSession>>,
}

impl ChatSessionManager {
    pub fn new(config: Arc<NetConfig>, store: Arc<TokenStore>) -> Self {
        Self {
            config,
            store,
            sessions: DashMap::new(),
        }
    }

    /// Join an event's chat. Any session already open for this event is
    /// closed first, so at most one transport per event is ever live.
    pub fn enter(
        &self,
        event_id: &str,
    ) -> (Arc<ChatSession>, mpsc::UnboundedReceiver<ChatEvent>) {
        if let Some((_, old)) = self.sessions.remove(event_id) {
            info!(event = %event_id, "Superseding existing chat session");
            old.close();
        }

        let (session, events) = ChatSession::spawn(
            event_id,
            Arc::clone(&self.config),
            Arc::clone(&self.store),
        );
        self.sessions.insert(event_id.to_string(), Arc::clone(&session));
        (session, events)
    }

    /// Leave an event's chat. A no-op when no session is open for it.
    pub fn leave(&self, event_id: &str) {
        if let Some((_, session)) = self.sessions.remove(event_id) {
            info!(event = %event_id, "Leaving chat");
            session.close();
        }
    }

    /// Handle to the live session for an event, if any.
    pub fn session(&self, event_id: &str) -> Option<Arc<ChatSession>> {
        self.sessions.get(event_id).map(|s| Arc::clone(&s))
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every live session. Used on logout and app shutdown.
    pub fn close_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().close();
        }
        self.sessions.clear();
    }
}
