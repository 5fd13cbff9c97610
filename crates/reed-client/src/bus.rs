//! Message bus
//!
//! An append-only, arrival-ordered log of decoded events with broadcast
//! fan-out to live subscribers. Replay-on-subscribe is a construction-time
//! choice; the log itself performs no deduplication or reordering.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::warn;

use reed_protocol::SocketEvent;

/// Bus behavior, fixed at construction.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Deliver the existing log to new subscribers before live events.
    pub replay: bool,
    /// Keep the log across disconnect/connect cycles. Conversation history
    /// is conceptually independent of transport lifetime, so this defaults
    /// to true.
    pub retain_on_reconnect: bool,
    /// Live fan-out channel capacity per subscriber.
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            replay: false,
            retain_on_reconnect: true,
            capacity: 256,
        }
    }
}

#[derive(Debug)]
struct Shared {
    log: Vec<SocketEvent>,
    live: broadcast::Sender<SocketEvent>,
}

/// Ordered event log shared between the connection manager and its views.
#[derive(Debug, Clone)]
pub struct MessageBus {
    shared: Arc<Mutex<Shared>>,
    config: BusConfig,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        let (live, _) = broadcast::channel(config.capacity);
        Self {
            shared: Arc::new(Mutex::new(Shared {
                log: Vec::new(),
                live,
            })),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        // Appends and subscribes never panic while holding the lock, but
        // recover rather than poison-cascade if a consumer ever does.
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Append an event to the end of the log and fan it out to live
    /// subscribers. Always succeeds; subscribers without capacity lag.
    pub fn append(&self, event: SocketEvent) {
        let mut shared = self.lock();
        shared.log.push(event.clone());
        // No receivers is fine; the log still grows.
        let _ = shared.live.send(event);
    }

    /// Register a subscriber.
    ///
    /// With replay enabled the subscription yields the full existing log
    /// first, then live appends. Snapshot and registration happen under
    /// one lock, so no event is delivered twice or skipped in between.
    pub fn subscribe(&self) -> BusSubscription {
        let shared = self.lock();
        let backlog = if self.config.replay {
            shared.log.iter().cloned().collect()
        } else {
            VecDeque::new()
        };
        BusSubscription {
            backlog,
            live: shared.live.subscribe(),
        }
    }

    /// Number of events appended so far.
    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current log, in arrival order.
    pub fn snapshot(&self) -> Vec<SocketEvent> {
        self.lock().log.clone()
    }

    /// Drop the log. Live subscriptions stay registered.
    pub fn clear(&self) {
        self.lock().log.clear();
    }
}

/// One subscriber's view of the bus: replayed backlog first, then live.
pub struct BusSubscription {
    backlog: VecDeque<SocketEvent>,
    live: broadcast::Receiver<SocketEvent>,
}

impl BusSubscription {
    /// Next event, or `None` once the bus is gone and the backlog drained.
    pub async fn recv(&mut self) -> Option<SocketEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.live.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus subscriber lagged behind live events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<SocketEvent> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.live.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "bus subscriber lagged behind live events");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reed_protocol::{ChatMessage, UserRef};

    fn message(content: &str) -> SocketEvent {
        SocketEvent::ChatMessage(ChatMessage {
            conversation_id: 1,
            author: UserRef::new(2, "bob"),
            content: content.to_string(),
        })
    }

    #[tokio::test]
    async fn replay_subscriber_sees_backlog_then_live_in_order() {
        let bus = MessageBus::new(BusConfig {
            replay: true,
            ..BusConfig::default()
        });
        bus.append(message("one"));
        bus.append(message("two"));

        let mut sub = bus.subscribe();
        bus.append(message("three"));

        for expected in ["one", "two", "three"] {
            match sub.recv().await {
                Some(SocketEvent::ChatMessage(msg)) => assert_eq!(msg.content, expected),
                other => panic!("expected chat message, got {other:?}"),
            }
        }
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn non_replay_subscriber_only_sees_later_events() {
        let bus = MessageBus::new(BusConfig::default());
        bus.append(message("missed"));

        let mut sub = bus.subscribe();
        bus.append(message("seen"));

        match sub.recv().await {
            Some(SocketEvent::ChatMessage(msg)) => assert_eq!(msg.content, "seen"),
            other => panic!("expected chat message, got {other:?}"),
        }
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn log_grows_monotonically_and_clear_resets_it() {
        let bus = MessageBus::new(BusConfig::default());
        assert!(bus.is_empty());
        bus.append(message("a"));
        bus.append(message("b"));
        assert_eq!(bus.len(), 2);
        assert_eq!(bus.snapshot().len(), 2);
        bus.clear();
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn clearing_does_not_break_live_subscriptions() {
        let bus = MessageBus::new(BusConfig::default());
        let mut sub = bus.subscribe();
        bus.clear();
        bus.append(message("after"));
        match sub.recv().await {
            Some(SocketEvent::ChatMessage(msg)) => assert_eq!(msg.content, "after"),
            other => panic!("expected chat message, got {other:?}"),
        }
    }
}
