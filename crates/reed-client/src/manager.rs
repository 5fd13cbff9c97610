//! Connection manager
//!
//! Owns the lifecycle of one WebSocket channel: open it with a token,
//! decode inbound frames onto the bus, expose a fire-and-forget send, and
//! fold every transport failure into a status transition. There is no
//! retry and no connect timeout in here; the embedder decides whether and
//! when to call `connect` again, and may race `connect` against a timer by
//! calling `disconnect` on expiry.

use std::fmt;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reed_protocol::{decode_frame, DecodeError, OutgoingMessage, SocketEvent};

use crate::bus::{BusConfig, BusSubscription, MessageBus};
use crate::error::ConnectionError;

const EVENT_FANOUT_CAPACITY: usize = 256;

/// Connectivity of the managed channel. Owned exclusively by the manager;
/// consumers observe it through [`ConnectionManager::watch_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Entered only while `connect` tears down a previous live channel.
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Manager configuration. The auth token is passed to [`connect`] by the
/// embedder's credential store, never held here.
///
/// [`connect`]: ConnectionManager::connect
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket base URL, e.g. `ws://localhost:3000`.
    pub base_url: String,
    /// Bus behavior for decoded events.
    pub bus: BusConfig,
}

struct ActiveChannel {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    config: ClientConfig,
    bus: MessageBus,
    status_tx: watch::Sender<ConnectionStatus>,
    events_tx: broadcast::Sender<SocketEvent>,
    /// Writer half of the live channel; `Some` only while connected.
    outbound: Mutex<Option<mpsc::UnboundedSender<OutgoingMessage>>>,
    active: tokio::sync::Mutex<Option<ActiveChannel>>,
}

impl Inner {
    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status_tx.send_replace(status);
        if previous != status {
            debug!(%previous, %status, "connection status changed");
        }
    }

    fn clear_outbound(&self) {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        *outbound = None;
    }
}

/// Maintains at most one live WebSocket channel and translates its frames
/// into [`SocketEvent`] values on the shared [`MessageBus`].
///
/// Cheap to clone; clones share the same channel, status, and bus.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> Self {
        let bus = MessageBus::new(config.bus.clone());
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_FANOUT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                bus,
                status_tx,
                events_tx,
                outbound: Mutex::new(None),
                active: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// The bus this manager appends decoded events to.
    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    /// Current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status_tx.borrow()
    }

    /// Watch status transitions. Drives connectivity indicators in views.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Live-only event tap: delivers events decoded after the call, never
    /// a replay. Replay is the bus's job, via [`subscribe`](Self::subscribe).
    pub fn events(&self) -> broadcast::Receiver<SocketEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Subscribe to the bus, honoring its replay configuration.
    pub fn subscribe(&self) -> BusSubscription {
        self.inner.bus.subscribe()
    }

    /// Open a channel to `<base_url>/chat` authenticated by `token`.
    ///
    /// An empty token is a configuration error and is rejected without
    /// touching the transport. If a channel already exists it is torn down
    /// first; at most one channel is live at a time. The call returns once
    /// the channel task is launched; the handshake outcome is observable
    /// as a `Connecting` -> `Connected` (or back to `Disconnected`)
    /// transition.
    pub async fn connect(&self, token: &str) -> Result<(), ConnectionError> {
        if token.is_empty() {
            warn!("connect called with an empty token");
            return Err(ConnectionError::EmptyToken);
        }

        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            if !previous.task.is_finished() {
                self.inner.set_status(ConnectionStatus::Reconnecting);
            }
            previous.cancel.cancel();
            let _ = previous.task.await;
            self.inner.clear_outbound();
        }

        if !self.inner.config.bus.retain_on_reconnect {
            self.inner.bus.clear();
        }

        let url = chat_url(&self.inner.config.base_url, token);
        self.inner.set_status(ConnectionStatus::Connecting);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_channel(Arc::clone(&self.inner), url, cancel.clone()));
        *active = Some(ActiveChannel { cancel, task });
        Ok(())
    }

    /// Close the channel, if any, and land on `Disconnected`.
    ///
    /// Idempotent and safe from every state, including never-connected and
    /// mid-handshake; the channel task is awaited so the transport is
    /// released before this returns.
    pub async fn disconnect(&self) {
        let mut active = self.inner.active.lock().await;
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            let _ = previous.task.await;
        }
        self.inner.clear_outbound();
        self.inner.set_status(ConnectionStatus::Disconnected);
    }

    /// Hand a message to the live channel for transmission.
    ///
    /// Fire-and-forget: returns as soon as the frame is queued with the
    /// writer. While not connected the message is dropped and
    /// [`ConnectionError::NotConnected`] returned so the caller can
    /// surface feedback. No delivery receipt is implied.
    pub fn send(&self, message: OutgoingMessage) -> Result<(), ConnectionError> {
        if self.status() != ConnectionStatus::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let outbound = self
            .inner
            .outbound
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        match outbound.as_ref() {
            Some(tx) => tx.send(message).map_err(|_| ConnectionError::NotConnected),
            None => Err(ConnectionError::NotConnected),
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("base_url", &self.inner.config.base_url)
            .field("status", &self.status())
            .finish()
    }
}

/// Token travels as a query parameter, mirroring the server's
/// `ws(s)://<host>/chat?token=<token>` contract.
fn chat_url(base_url: &str, token: &str) -> String {
    format!(
        "{}/chat?token={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(token)
    )
}

/// One channel's lifetime: handshake, pump, cleanup.
///
/// Sets `Connected` on open and `Disconnected` when the transport ends on
/// its own. When cancelled, the canceller owns the follow-up status, so
/// `connect`-driven teardown can go straight to `Connecting`.
async fn run_channel(inner: Arc<Inner>, url: String, cancel: CancellationToken) {
    let ws = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("channel cancelled before the handshake completed");
            return;
        }
        result = connect_async(&url) => match result {
            Ok((ws, _response)) => ws,
            Err(err) => {
                warn!(error = %err, "websocket handshake failed");
                if !cancel.is_cancelled() {
                    inner.set_status(ConnectionStatus::Disconnected);
                }
                return;
            }
        }
    };

    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<OutgoingMessage>();
    {
        let mut outbound = inner.outbound.lock().unwrap_or_else(|e| e.into_inner());
        *outbound = Some(outbound_tx);
    }
    inner.set_status(ConnectionStatus::Connected);
    info!("websocket channel open");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.close().await;
                break;
            }
            Some(message) = outbound_rx.recv() => {
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if let Err(err) = sink.send(Message::Text(json)).await {
                            warn!(error = %err, "failed to write frame, closing channel");
                            break;
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to serialize outgoing frame"),
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text_frame(&inner, &text),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("websocket channel closed by peer");
                    break;
                }
                Some(Err(err)) => {
                    warn!(error = %err, "websocket transport error");
                    break;
                }
                Some(Ok(_)) => {} // binary and pong frames are ignored
            }
        }
    }

    inner.clear_outbound();
    if !cancel.is_cancelled() {
        inner.set_status(ConnectionStatus::Disconnected);
    }
}

/// Decode one inbound text frame and publish it. Malformed frames and
/// unknown kinds are logged and dropped; neither closes the channel.
fn handle_text_frame(inner: &Inner, text: &str) {
    match decode_frame(text) {
        Ok(event) => {
            debug!(kind = event.kind(), "event received");
            inner.bus.append(event.clone());
            let _ = inner.events_tx.send(event);
        }
        Err(DecodeError::UnknownKind(kind)) => {
            debug!(kind, "dropping frame with unknown kind");
        }
        Err(DecodeError::Malformed(err)) => {
            warn!(error = %err, "dropping malformed frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_appends_token_and_trims_trailing_slash() {
        assert_eq!(
            chat_url("ws://localhost:3000/", "abc"),
            "ws://localhost:3000/chat?token=abc"
        );
    }

    #[test]
    fn chat_url_percent_encodes_the_token() {
        assert_eq!(
            chat_url("ws://host", "a b/c"),
            "ws://host/chat?token=a%20b%2Fc"
        );
    }
}
