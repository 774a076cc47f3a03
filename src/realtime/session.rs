//! Per-event chat session driver
//!
//! One task owns the socket for one event. The lifecycle is an explicit
//! loop: connect through the candidate list, pump frames while connected,
//! then either stop (deliberate closure) or wait out one cancellable
//! reconnect delay and go again, up to the attempt ceiling.
//!
//! There is deliberately no send queue: sends outside CONNECTED are
//! rejected back to the caller, and nothing is retransmitted.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{frame::coding::CloseCode, CloseFrame},
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use super::buffer::MessageBuffer;
use super::envelope::{ChatMessage, Inbound, Outbound};
use super::{ChatEvent, ConnState};
use crate::config::NetConfig;
use crate::token::TokenStore;
use crate::types::{NetError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How one connected stretch ended
enum CloseOutcome {
    /// Local teardown: we issued the normal closure
    Local,
    /// Server sent a normal closure
    Normal,
    /// Anything else: transport error, abnormal close, dropped stream
    Abnormal(String),
}

/// State shared between the driver task and the session handle
struct Shared {
    event_id: String,
    state: Mutex<ConnState>,
    /// Reconnection attempts since the last successful open
    attempts: AtomicU32,
    /// Authoritative presence count, replaced wholesale by server snapshots
    presence: AtomicU64,
    buffer: Mutex<MessageBuffer>,
    last_error: Mutex<Option<String>>,
    events: mpsc::UnboundedSender<ChatEvent>,
}

impl Shared {
    /// Transition and notify; emits nothing when the state is unchanged,
    /// which is what makes teardown idempotent from the outside.
    fn set_state(&self, next: ConnState) {
        let mut state = self.state.lock().expect("chat state lock poisoned");
        if *state == next {
            return;
        }
        debug!(event = %self.event_id, from = ?*state, to = ?next, "Chat state transition");
        *state = next;
        drop(state);
        let _ = self.events.send(ChatEvent::StateChanged(next));
    }

    fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(event = %self.event_id, "Chat error: {}", message);
        *self.last_error.lock().expect("chat error lock poisoned") = Some(message);
    }
}

/// Handle to one live chat session.
pub struct ChatSession {
    shared: Arc<Shared>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    shutdown_tx: watch::Sender<bool>,
}

impl ChatSession {
    /// Spawn the driver task for one event's channel. Returns the handle
    /// and the event stream for the UI.
    pub fn spawn(
        event_id: impl Into<String>,
        config: Arc<NetConfig>,
        store: Arc<TokenStore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ChatEvent>) {
        let event_id = event_id.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            event_id,
            state: Mutex::new(ConnState::Idle),
            attempts: AtomicU32::new(0),
            presence: AtomicU64::new(0),
            buffer: Mutex::new(MessageBuffer::new(config.message_buffer_cap)),
            last_error: Mutex::new(None),
            events: events_tx,
        });

        tokio::spawn(drive(
            Arc::clone(&shared),
            config,
            store,
            outbound_rx,
            shutdown_rx,
        ));

        (
            Arc::new(Self {
                shared,
                outbound_tx,
                shutdown_tx,
            }),
            events_rx,
        )
    }

    pub fn state(&self) -> ConnState {
        *self.shared.state.lock().expect("chat state lock poisoned")
    }

    /// Reconnection attempts since the last successful open
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Latest authoritative presence count
    pub fn presence(&self) -> u64 {
        self.shared.presence.load(Ordering::SeqCst)
    }

    /// Ordered snapshot of buffered messages, oldest first
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared
            .buffer
            .lock()
            .expect("chat buffer lock poisoned")
            .snapshot()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared
            .last_error
            .lock()
            .expect("chat error lock poisoned")
            .clone()
    }

    /// Send one chat message. Permitted only while connected; there is no
    /// queue and no delivery guarantee.
    pub fn send(&self, content: impl Into<String>) -> Result<()> {
        if self.state() != ConnState::Connected {
            return Err(NetError::Network(
                "Chat is not connected; the message was not sent".to_string(),
            ));
        }
        self.outbound_tx
            .send(Outbound::Message {
                content: content.into(),
            })
            .map_err(|_| NetError::Network("Chat session is shutting down".to_string()))
    }

    /// Tear the session down: cancels any pending reconnect wait and issues
    /// a normal closure. Idempotent; a second call is a no-op.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Driver loop: connect, pump, maybe reconnect.
async fn drive(
    shared: Arc<Shared>,
    config: Arc<NetConfig>,
    store: Arc<TokenStore>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            shared.set_state(ConnState::Closed);
            return;
        }

        shared.set_state(ConnState::Connecting);

        // The token is re-read on every attempt so a refresh that happened
        // while we were disconnected is picked up.
        let Some(token) = store.access() else {
            shared.record_error("auth/required: sign in to join the chat");
            let _ = shared.events.send(ChatEvent::ChannelError(
                "Sign in to join the chat.".to_string(),
            ));
            shared.set_state(ConnState::Failed);
            return;
        };

        match connect_candidates(&config, &shared.event_id, &token).await {
            Ok(ws) => {
                // Anything admitted against an earlier connection is stale;
                // delivery is fire and forget, so it is dropped, not
                // replayed. Drained before Connected is published so sends
                // observing the new state always survive.
                while outbound_rx.try_recv().is_ok() {}

                shared.set_state(ConnState::Connected);
                shared.attempts.store(0, Ordering::SeqCst);
                info!(event = %shared.event_id, "Chat connected");

                match run_connected(ws, &shared, &mut outbound_rx, &mut shutdown_rx).await {
                    CloseOutcome::Local => {
                        shared.set_state(ConnState::Closed);
                        return;
                    }
                    CloseOutcome::Normal => {
                        info!(event = %shared.event_id, "Chat closed by server (normal)");
                        shared.set_state(ConnState::Closed);
                        return;
                    }
                    CloseOutcome::Abnormal(e) => shared.record_error(e),
                }
            }
            Err(e) => shared.record_error(e),
        }

        shared.set_state(ConnState::Disconnected);

        let made = shared.attempts.load(Ordering::SeqCst);
        if made >= config.max_reconnect_attempts {
            let _ = shared.events.send(ChatEvent::ChannelError(format!(
                "Chat connection lost after {} attempts. Re-enter the event to retry.",
                made
            )));
            shared.set_state(ConnState::Failed);
            return;
        }

        shared.attempts.fetch_add(1, Ordering::SeqCst);
        shared.set_state(ConnState::ReconnectWait);

        // One named timer for one purpose: the reconnect wait. Teardown
        // cancels it here; there is never a second live timer.
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay()) => {}
            _ = shutdown_rx.changed() => {
                shared.set_state(ConnState::Closed);
                return;
            }
        }
    }
}

/// Try the transport candidates in priority order within one logical
/// attempt: secure scheme first, insecure fallback second. Each candidate
/// is independently timeout-guarded; the first to open wins.
async fn connect_candidates(
    config: &NetConfig,
    event_id: &str,
    token: &str,
) -> std::result::Result<WsStream, String> {
    let path = format!("/events/{}/chat?token={}", event_id, token);
    let mut candidates = vec![format!("wss://{}{}", config.realtime_host, path)];
    if config.allow_insecure_fallback {
        candidates.push(format!("ws://{}{}", config.realtime_host, path));
    }

    for url in &candidates {
        let shown = without_query(url);
        match tokio::time::timeout(config.connect_timeout(), connect_async(url.as_str())).await {
            Ok(Ok((ws, _))) => {
                debug!(event = %event_id, candidate = %shown, "Candidate opened");
                return Ok(ws);
            }
            Ok(Err(e)) => {
                debug!(event = %event_id, candidate = %shown, "Candidate failed: {}", e);
            }
            Err(_) => {
                debug!(
                    event = %event_id,
                    candidate = %shown,
                    "Candidate timed out after {:?}",
                    config.connect_timeout()
                );
            }
        }
    }

    Err("All chat transport candidates failed to open".to_string())
}

/// Strip the query string so the access token never reaches the logs.
fn without_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Pump one connected socket until it closes, a transport error occurs, or
/// teardown is requested.
async fn run_connected(
    ws: WsStream,
    shared: &Shared,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> CloseOutcome {
    let (mut write, mut read) = ws.split();

    // Presence is pulled, not pushed unprompted: ask right after opening
    if let Err(e) = write
        .send(Message::Text(Outbound::ParticipantCount.encode()))
        .await
    {
        return CloseOutcome::Abnormal(format!("Failed to request presence: {}", e));
    }

    let mut outbound_open = true;
    loop {
        tokio::select! {
            // A dropped sender also means the handle is gone: tear down
            _ = shutdown_rx.changed() => {
                let _ = write
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "leaving".into(),
                    })))
                    .await;
                return CloseOutcome::Local;
            }
            out = outbound_rx.recv(), if outbound_open => {
                match out {
                    Some(frame) => {
                        if let Err(e) = write.send(Message::Text(frame.encode())).await {
                            return CloseOutcome::Abnormal(format!("Send failed: {}", e));
                        }
                    }
                    None => outbound_open = false,
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_frame(shared, &text),
                Some(Ok(Message::Close(frame))) => {
                    let normal = frame
                        .as_ref()
                        .is_some_and(|f| f.code == CloseCode::Normal);
                    return if normal {
                        CloseOutcome::Normal
                    } else {
                        CloseOutcome::Abnormal("Connection closed abnormally".to_string())
                    };
                }
                // Binary, ping, and pong frames carry nothing for us
                Some(Ok(_)) => {}
                Some(Err(e)) => return CloseOutcome::Abnormal(format!("Transport error: {}", e)),
                None => return CloseOutcome::Abnormal("Connection dropped".to_string()),
            }
        }
    }
}

/// Dispatch one inbound frame by its tag.
fn handle_frame(shared: &Shared, text: &str) {
    match serde_json::from_str::<Inbound>(text) {
        Ok(Inbound::Message(message)) => {
            if message.message_type.is_displayable() {
                shared
                    .buffer
                    .lock()
                    .expect("chat buffer lock poisoned")
                    .push(message.clone());
                let _ = shared.events.send(ChatEvent::Message(message));
            } else {
                // Membership churn arrives on the channel but is never shown
                debug!(event = %shared.event_id, kind = ?message.message_type, "Filtered churn frame");
            }
        }
        Ok(Inbound::ParticipantCount { count }) => {
            shared.presence.store(count, Ordering::SeqCst);
            let _ = shared.events.send(ChatEvent::Presence(count));
        }
        Ok(Inbound::UserList { users }) => {
            let _ = shared.events.send(ChatEvent::Roster(users));
        }
        Ok(Inbound::Error { message }) => {
            // Surfaced to the user; the connection state does not change
            let _ = shared.events.send(ChatEvent::ChannelError(message));
        }
        Err(e) => {
            debug!(event = %shared.event_id, "Ignoring unknown frame: {}", e);
        }
    }
}
