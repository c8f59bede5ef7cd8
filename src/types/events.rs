use crate::types::jid::Jid;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub id: String,
    pub chat: Jid,
    pub sender: Jid,
    pub from_me: bool,
    pub push_name: String,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptEvent {
    pub message_ids: Vec<String>,
    pub chat: Jid,
    pub sender: Jid,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub from: Jid,
    pub unavailable: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Events surfaced by a protocol client once it is wired to the gateway.
#[derive(Debug, Clone)]
pub enum Event {
    Connected,
    Disconnected,
    LoggedOut { on_connect: bool, reason: String },
    StreamReplaced,
    Message(Box<MessageEvent>),
    Receipt(ReceiptEvent),
    Presence(PresenceEvent),
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

/// Handler list shared by a client and whoever registers on it.
#[derive(Default, Clone)]
pub struct CoreEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    pub fn clear_handlers(&self) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn dispatch(&self, event: &Event) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers {
            handler.handle_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl EventHandler for Counter {
        fn handle_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispatch_reaches_every_handler_until_cleared() {
        let bus = CoreEventBus::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        bus.add_handler(counter.clone());
        bus.add_handler(counter.clone());

        bus.dispatch(&Event::Connected);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        bus.clear_handlers();
        assert_eq!(bus.handler_count(), 0);
        bus.dispatch(&Event::Disconnected);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
